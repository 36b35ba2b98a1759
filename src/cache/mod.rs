//! Versioned request cache.
//!
//! This module provides the storage side of the offline layer:
//! - Named cache stores, one per cache version, holding captured responses
//! - Request identity normalization (`METHOD URL`, hashed for storage)
//! - A cache layer that applies a cache-first or network-first strategy

mod layer;
mod storage;
mod traits;

pub use layer::{CacheLayer, CacheStrategy};
pub use storage::{CacheStorage, CachedEntry, SqliteStorage};
pub use traits::{CacheResult, CacheSource, CacheVersion, RequestKey};
