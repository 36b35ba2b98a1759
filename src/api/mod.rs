//! Client for the time tracking backend.

mod client;
mod error;
mod types;

pub use client::{create_write, delete_write, update_write, ApiClient};
pub use types::{
  local_datetime, CreatedEntry, EntryInput, EntryQuery, EntryType, OcrEntry, OcrRequest,
  ReportRequest, ReportType, Stats, TimeEntry,
};
