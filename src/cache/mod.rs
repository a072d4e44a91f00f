//! Named-cache storage and the policy deciding what goes into it.
//!
//! This module provides:
//! - A storage trait for named caches keyed by request identity
//! - SQLite and in-memory backends
//! - The cache policy: what is intercepted, what is cacheable, which cache
//!   a response belongs to and which caches survive activation

mod memory;
mod policy;
mod storage;
mod traits;

pub use memory::MemoryStorage;
pub use policy::{CacheNames, CachePolicy};
pub use storage::SqliteStorage;
pub use traits::{Served, WorkerStorage};

#[cfg(test)]
pub use traits::{CacheStorage, EntrySummary, QueuedSubmission, ResponseSource, SyncQueue};
