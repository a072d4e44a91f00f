//! Core traits and types for the caching system.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use reqwest::Method;

use crate::http::{Request, Response};

/// Trait for named-cache storage backends.
///
/// A backend holds any number of named caches, each mapping request identity
/// (method + URL) to a response snapshot. Only GET requests are stored or
/// matched. Single-entry writes are atomic; `put_all` is atomic as a whole.
pub trait CacheStorage: Send + Sync {
  /// Create the named cache if it does not exist yet. Writes open their
  /// target cache themselves.
  #[cfg(test)]
  fn open(&self, cache_name: &str) -> Result<()>;

  /// Whether a cache with this name exists.
  fn has(&self, cache_name: &str) -> Result<bool>;

  /// Names of all caches, in creation order.
  fn keys(&self) -> Result<Vec<String>>;

  /// Delete a cache and all of its entries. Returns false if it did not exist.
  fn delete(&self, cache_name: &str) -> Result<bool>;

  /// Store a single entry, replacing any previous entry for the request.
  fn put(&self, cache_name: &str, request: &Request, response: &Response) -> Result<()>;

  /// Store all entries or none of them.
  fn put_all(&self, cache_name: &str, entries: &[(Request, Response)]) -> Result<()>;

  /// Look up a request in one cache.
  fn match_in(&self, cache_name: &str, request: &Request) -> Result<Option<Response>>;

  /// Look up a request across all caches, oldest cache first.
  fn match_any(&self, request: &Request) -> Result<Option<Response>>;

  /// Summaries of the entries of one cache, ordered by URL.
  fn entries(&self, cache_name: &str) -> Result<Vec<EntrySummary>>;
}

/// Trait for the queue behind background sync.
pub trait SyncQueue: Send + Sync {
  /// Queue a payload under a sync tag. Returns the submission id.
  fn enqueue(&self, tag: &str, payload: &serde_json::Value) -> Result<i64>;

  /// Queued submissions for a tag, oldest first.
  fn pending(&self, tag: &str) -> Result<Vec<QueuedSubmission>>;

  /// Drop a submission once it has been delivered.
  fn remove(&self, id: i64) -> Result<()>;
}

/// Everything a worker needs from its storage backend.
pub trait WorkerStorage: CacheStorage + SyncQueue {}

impl<T: CacheStorage + SyncQueue> WorkerStorage for T {}

/// Listing information about a cached entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySummary {
  pub method: String,
  pub url: String,
  pub status: u16,
  pub size: usize,
  pub cached_at: DateTime<Utc>,
}

/// A payload waiting for background sync.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedSubmission {
  pub id: i64,
  pub tag: String,
  pub payload: serde_json::Value,
  pub queued_at: DateTime<Utc>,
}

/// A response handed back to the page, with where it came from.
#[derive(Debug, Clone)]
pub struct Served {
  pub response: Response,
  pub source: ResponseSource,
}

impl Served {
  pub fn from_cache(response: Response) -> Self {
    Self {
      response,
      source: ResponseSource::Cache,
    }
  }

  pub fn from_network(response: Response) -> Self {
    Self {
      response,
      source: ResponseSource::Network,
    }
  }

  pub fn offline_fallback(response: Response) -> Self {
    Self {
      response,
      source: ResponseSource::OfflineFallback,
    }
  }

  /// The 408 placeholder used when nothing else can answer.
  pub fn timeout() -> Self {
    Self {
      response: Response::request_timeout(),
      source: ResponseSource::Timeout,
    }
  }
}

/// Indicates where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
  /// Found in one of the named caches
  Cache,
  /// Fresh from the network
  Network,
  /// Network failed during a navigation, cached root document served
  OfflineFallback,
  /// Network failed and nothing cached could stand in
  Timeout,
}

impl std::fmt::Display for ResponseSource {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::Cache => write!(f, "cache"),
      Self::Network => write!(f, "network"),
      Self::OfflineFallback => write!(f, "offline-fallback"),
      Self::Timeout => write!(f, "timeout"),
    }
  }
}

/// Reject requests the cache cannot hold.
pub(crate) fn ensure_storable(request: &Request) -> Result<()> {
  if request.method != Method::GET {
    return Err(eyre!(
      "Cannot cache {} {}: only GET requests are cacheable",
      request.method,
      request.url
    ));
  }
  Ok(())
}
