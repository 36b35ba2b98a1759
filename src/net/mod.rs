//! Network collaborator used by the worker.
//!
//! The worker never talks to `reqwest` directly; it goes through the
//! [`Network`] trait so tests can substitute a scripted network.

mod client;
mod error;
mod types;

pub use client::{HttpNetwork, Network};
pub use error::FetchError;
pub use types::{Destination, Request, Response};
