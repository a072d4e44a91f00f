//! Fetch interception: cache first, then network, then offline fallbacks.

use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::events::{EventKind, EventOutcome};
use super::lifecycle::ServiceWorker;
use crate::cache::{Served, WorkerStorage};
use crate::http::{Destination, Request, Response};
use crate::network::Network;

impl<S, N> ServiceWorker<S, N>
where
  S: WorkerStorage + ?Sized + 'static,
  N: Network + ?Sized + 'static,
{
  /// Handle a fetch event. Takes `&self` so concurrent requests can be served
  /// by the same worker.
  ///
  /// Intercepted requests always produce exactly one response; requests the
  /// worker does not intercept come back as `Passthrough`.
  pub async fn handle_fetch(&self, request: Request) -> Result<EventOutcome> {
    self.ensure_accepts(EventKind::Fetch)?;

    if !self.policy.should_intercept(&request) {
      debug!(method = %request.method, url = %request.url, "Not intercepted");
      return Ok(EventOutcome::Passthrough);
    }

    Ok(EventOutcome::Fetched(self.respond(request).await))
  }

  async fn respond(&self, request: Request) -> Served {
    match self.lookup(None, &request).await {
      Ok(Some(response)) => {
        debug!(url = %request.url, "Serving from cache");
        return Served::from_cache(response);
      }
      Ok(None) => {}
      Err(e) => warn!(url = %request.url, "Cache lookup failed: {:#}", e),
    }

    match self.network.fetch(&request).await {
      Ok(response) => self.network_response(request, response),
      Err(e) => {
        error!(url = %request.url, "Fetch failed: {:#}", e);
        self.offline_response(&request).await
      }
    }
  }

  fn network_response(&self, request: Request, response: Response) -> Served {
    if !self.policy.is_cacheable(&response) {
      return Served::from_network(response);
    }

    if let Some(cache_name) = self.policy.target_cache(&request) {
      self.store_in_background(cache_name.to_string(), request, response.clone());
    }

    Served::from_network(response)
  }

  /// Persist a response clone without holding up the page.
  fn store_in_background(&self, cache_name: String, request: Request, response: Response) {
    let storage = Arc::clone(&self.storage);
    let handle = tokio::task::spawn_blocking(move || {
      info!(cache = %cache_name, url = %request.url, "Caching dynamic asset");
      if let Err(e) = storage.put(&cache_name, &request, &response) {
        warn!(cache = %cache_name, url = %request.url, "Failed to cache response: {:#}", e);
      }
    });
    self.track_write(handle);
  }

  /// Run a cache lookup on the blocking pool, in one named cache or across
  /// all of them.
  async fn lookup(&self, cache_name: Option<&str>, request: &Request) -> Result<Option<Response>> {
    let storage = Arc::clone(&self.storage);
    let cache_name = cache_name.map(str::to_string);
    let request = request.clone();

    tokio::task::spawn_blocking(move || match cache_name {
      Some(name) => storage.match_in(&name, &request),
      None => storage.match_any(&request),
    })
    .await
    .map_err(|e| eyre!("Cache lookup task failed: {}", e))?
  }

  async fn offline_response(&self, request: &Request) -> Served {
    if request.destination != Destination::Document {
      return Served::timeout();
    }

    let fallback = match self.offline_fallback_request() {
      Ok(fallback) => fallback,
      Err(e) => {
        warn!("Offline fallback unavailable: {:#}", e);
        return Served::timeout();
      }
    };

    // The fallback document is pre-cached with the static assets
    let static_name = &self.policy.names().static_name;
    match self.lookup(Some(static_name), &fallback).await {
      Ok(Some(response)) => Served::offline_fallback(response),
      Ok(None) => {
        warn!(url = %fallback.url, "Offline fallback document is not cached");
        Served::timeout()
      }
      Err(e) => {
        warn!(url = %fallback.url, "Offline fallback lookup failed: {:#}", e);
        Served::timeout()
      }
    }
  }
}
