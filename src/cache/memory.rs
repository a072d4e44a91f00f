//! In-memory cache storage.

use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use super::traits::{ensure_storable, CacheStorage, EntrySummary, QueuedSubmission, SyncQueue};
use crate::http::{Request, Response};

#[derive(Debug, Clone)]
struct StoredEntry {
  method: String,
  url: String,
  response: Response,
  cached_at: chrono::DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Inner {
  /// Named caches in creation order
  caches: Vec<(String, BTreeMap<String, StoredEntry>)>,
  queue: Vec<QueuedSubmission>,
  next_id: i64,
}

impl Inner {
  fn cache(&self, name: &str) -> Option<&BTreeMap<String, StoredEntry>> {
    self.caches.iter().find(|(n, _)| n == name).map(|(_, c)| c)
  }

  fn cache_mut(&mut self, name: &str) -> &mut BTreeMap<String, StoredEntry> {
    let index = match self.caches.iter().position(|(n, _)| n == name) {
      Some(index) => index,
      None => {
        self.caches.push((name.to_string(), BTreeMap::new()));
        self.caches.len() - 1
      }
    };
    &mut self.caches[index].1
  }
}

/// Mapping-based storage that lives as long as the process.
#[derive(Debug, Default)]
pub struct MemoryStorage {
  inner: Mutex<Inner>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }

  fn inner(&self) -> Result<MutexGuard<'_, Inner>> {
    self
      .inner
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

fn stored(request: &Request, response: &Response) -> StoredEntry {
  StoredEntry {
    method: request.method.to_string(),
    url: request.cache_url().to_string(),
    response: response.clone(),
    cached_at: Utc::now(),
  }
}

impl CacheStorage for MemoryStorage {
  #[cfg(test)]
  fn open(&self, cache_name: &str) -> Result<()> {
    self.inner()?.cache_mut(cache_name);
    Ok(())
  }

  fn has(&self, cache_name: &str) -> Result<bool> {
    Ok(self.inner()?.cache(cache_name).is_some())
  }

  fn keys(&self) -> Result<Vec<String>> {
    Ok(self.inner()?.caches.iter().map(|(n, _)| n.clone()).collect())
  }

  fn delete(&self, cache_name: &str) -> Result<bool> {
    let mut inner = self.inner()?;
    let before = inner.caches.len();
    inner.caches.retain(|(n, _)| n != cache_name);
    Ok(inner.caches.len() != before)
  }

  fn put(&self, cache_name: &str, request: &Request, response: &Response) -> Result<()> {
    ensure_storable(request)?;
    self
      .inner()?
      .cache_mut(cache_name)
      .insert(request.cache_key(), stored(request, response));
    Ok(())
  }

  fn put_all(&self, cache_name: &str, entries: &[(Request, Response)]) -> Result<()> {
    // Validate everything before touching the map
    for (request, _) in entries {
      ensure_storable(request)?;
    }

    let mut inner = self.inner()?;
    let cache = inner.cache_mut(cache_name);
    for (request, response) in entries {
      cache.insert(request.cache_key(), stored(request, response));
    }
    Ok(())
  }

  fn match_in(&self, cache_name: &str, request: &Request) -> Result<Option<Response>> {
    if ensure_storable(request).is_err() {
      return Ok(None);
    }
    let inner = self.inner()?;
    Ok(
      inner
        .cache(cache_name)
        .and_then(|c| c.get(&request.cache_key()))
        .map(|e| e.response.clone()),
    )
  }

  fn match_any(&self, request: &Request) -> Result<Option<Response>> {
    if ensure_storable(request).is_err() {
      return Ok(None);
    }
    let key = request.cache_key();
    let inner = self.inner()?;
    Ok(
      inner
        .caches
        .iter()
        .find_map(|(_, c)| c.get(&key))
        .map(|e| e.response.clone()),
    )
  }

  fn entries(&self, cache_name: &str) -> Result<Vec<EntrySummary>> {
    let inner = self.inner()?;
    let mut entries: Vec<EntrySummary> = inner
      .cache(cache_name)
      .map(|c| {
        c.values()
          .map(|e| EntrySummary {
            method: e.method.clone(),
            url: e.url.clone(),
            status: e.response.status,
            size: e.response.body.len(),
            cached_at: e.cached_at,
          })
          .collect()
      })
      .unwrap_or_default();
    entries.sort_by(|a, b| a.url.cmp(&b.url));
    Ok(entries)
  }
}

impl SyncQueue for MemoryStorage {
  fn enqueue(&self, tag: &str, payload: &serde_json::Value) -> Result<i64> {
    let mut inner = self.inner()?;
    inner.next_id += 1;
    let id = inner.next_id;
    inner.queue.push(QueuedSubmission {
      id,
      tag: tag.to_string(),
      payload: payload.clone(),
      queued_at: Utc::now(),
    });
    Ok(id)
  }

  fn pending(&self, tag: &str) -> Result<Vec<QueuedSubmission>> {
    Ok(
      self
        .inner()?
        .queue
        .iter()
        .filter(|s| s.tag == tag)
        .cloned()
        .collect(),
    )
  }

  fn remove(&self, id: i64) -> Result<()> {
    self.inner()?.queue.retain(|s| s.id != id);
    Ok(())
  }
}
