//! Partitioned response cache.
//!
//! This module provides the storage side of the offline agent:
//! - Named partitions of request → response records
//! - Atomic per-key put/get/delete, plus atomic batch writes for installs
//! - The freshness strategies (network-first, cache-first, stale-while-revalidate)

mod layer;
mod memory;
mod storage;
mod traits;

pub use layer::CacheLayer;
pub use memory::MemoryStore;
pub use storage::{CacheStore, SqliteStore};
pub use traits::{CacheKey, Served};

#[cfg(test)]
pub use traits::{CachedResponse, ServedFrom};
