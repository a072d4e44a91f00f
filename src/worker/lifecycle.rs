//! Lifecycle controller: drives install, activate and the functional events
//! of one worker version against its storage and network.

use chrono::Utc;
use color_eyre::{eyre::bail, eyre::eyre, Result};
use futures::future::try_join_all;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use url::Url;

use super::events::{Event, EventKind, EventOutcome, WorkerState};
use super::notification::{Notification, PushPayload, EXPLORE_ACTION};
use crate::cache::{CachePolicy, WorkerStorage};
use crate::config::Config;
use crate::http::Request;
use crate::network::Network;

/// One version of the offline cache worker.
///
/// Cache names, asset lists and endpoints are fixed at construction; the
/// storage backend and network are injected so the whole lifecycle can run
/// outside a browser.
pub struct ServiceWorker<S: ?Sized, N: ?Sized> {
  version: String,
  origin: Url,
  static_assets: Vec<String>,
  offline_fallback: String,
  pub(super) contact_endpoint: String,
  pub(super) policy: CachePolicy,
  pub(super) storage: Arc<S>,
  pub(super) network: Arc<N>,
  state: WorkerState,
  skip_waiting: bool,
  clients_claimed: bool,
  /// Cache writes still running after their response was returned
  pending_writes: Mutex<Vec<JoinHandle<()>>>,
}

impl<S, N> ServiceWorker<S, N>
where
  S: WorkerStorage + ?Sized + 'static,
  N: Network + ?Sized + 'static,
{
  /// A freshly evaluated worker, waiting for its install event.
  pub fn new(config: &Config, storage: Arc<S>, network: Arc<N>) -> Self {
    Self {
      version: config.version.clone(),
      origin: config.origin.clone(),
      static_assets: config.static_assets.clone(),
      offline_fallback: config.offline_fallback.clone(),
      contact_endpoint: config.contact_endpoint.clone(),
      policy: CachePolicy::new(config.cache_names(), config.dynamic_assets.clone()),
      storage,
      network,
      state: WorkerState::Parsed,
      skip_waiting: false,
      clients_claimed: false,
      pending_writes: Mutex::new(Vec::new()),
    }
  }

  /// Restart a version that was installed and activated in an earlier run.
  ///
  /// Fails when the static cache of this version does not exist.
  pub fn revive(config: &Config, storage: Arc<S>, network: Arc<N>) -> Result<Self> {
    let mut worker = Self::new(config, storage, network);
    let static_name = &worker.policy.names().static_name;
    if !worker.storage.has(static_name)? {
      bail!(
        "Version {} is not installed (cache {} missing); run install first",
        worker.version,
        static_name
      );
    }

    worker.state = WorkerState::Activated;
    worker.clients_claimed = true;
    debug!(version = %worker.version, "Service worker revived");
    Ok(worker)
  }

  pub fn state(&self) -> WorkerState {
    self.state
  }

  pub fn version(&self) -> &str {
    &self.version
  }

  /// Whether install asked to activate without waiting for old clients.
  pub fn skipped_waiting(&self) -> bool {
    self.skip_waiting
  }

  /// Whether activation took control of already open pages.
  pub fn claimed_clients(&self) -> bool {
    self.clients_claimed
  }

  /// Deliver one event and wait until its handler has settled.
  pub async fn dispatch(&mut self, event: Event) -> Result<EventOutcome> {
    self.ensure_accepts(event.kind())?;

    match event {
      Event::Install => self.install().await,
      Event::Activate => self.activate().await,
      Event::Fetch(request) => self.handle_fetch(request).await,
      Event::Sync { tag } => self.handle_sync(&tag).await,
      Event::Push { data } => self.handle_push(data.as_deref()),
      Event::NotificationClick { action } => self.handle_notification_click(action.as_deref()),
    }
  }

  /// Await every background cache write started so far.
  pub async fn settle(&self) {
    loop {
      let handles = match self.pending_writes.lock() {
        Ok(mut pending) => std::mem::take(&mut *pending),
        Err(e) => {
          warn!("Pending write list poisoned: {}", e);
          return;
        }
      };
      if handles.is_empty() {
        return;
      }
      for handle in handles {
        if let Err(e) = handle.await {
          warn!("Background cache write did not complete: {}", e);
        }
      }
    }
  }

  pub(super) fn ensure_accepts(&self, kind: EventKind) -> Result<()> {
    if !self.state.accepts(kind) {
      bail!(
        "Cannot handle {} event while worker {} is {}",
        kind,
        self.version,
        self.state
      );
    }
    Ok(())
  }

  pub(super) fn track_write(&self, handle: JoinHandle<()>) {
    match self.pending_writes.lock() {
      Ok(mut pending) => {
        pending.retain(|h| !h.is_finished());
        pending.push(handle);
      }
      Err(e) => warn!("Pending write list poisoned: {}", e),
    }
  }

  /// Resolve a root-relative path against the origin.
  pub(super) fn resolve(&self, path: &str) -> Result<Url> {
    self
      .origin
      .join(path)
      .map_err(|e| eyre!("Invalid URL '{}': {}", path, e))
  }

  pub(super) fn offline_fallback_request(&self) -> Result<Request> {
    Ok(Request::get(self.resolve(&self.offline_fallback)?))
  }

  fn transition(&mut self, next: WorkerState) {
    debug!(version = %self.version, from = %self.state, to = %next, "Worker state change");
    self.state = next;
  }

  async fn install(&mut self) -> Result<EventOutcome> {
    info!(version = %self.version, "Installing service worker");
    self.transition(WorkerState::Installing);

    match self.precache().await {
      Ok(cached) => {
        info!(cached, "Static assets cached");
        self.skip_waiting = true;
        self.transition(WorkerState::Installed);
        Ok(EventOutcome::Installed { cached })
      }
      Err(e) => {
        error!("Failed to cache static assets: {:#}", e);
        self.transition(WorkerState::Redundant);
        Err(e)
      }
    }
  }

  /// Fetch every static asset, then commit them all at once.
  async fn precache(&self) -> Result<usize> {
    let requests = self
      .static_assets
      .iter()
      .map(|path| self.resolve(path).map(Request::get))
      .collect::<Result<Vec<_>>>()?;

    let network = &self.network;
    let entries = try_join_all(requests.into_iter().map(|request| async move {
      let response = network.fetch(&request).await?;
      if !response.ok() {
        bail!(
          "Static asset {} returned status {}",
          request.url,
          response.status
        );
      }
      Ok::<_, color_eyre::Report>((request, response))
    }))
    .await?;

    let static_name = &self.policy.names().static_name;
    self.storage.put_all(static_name, &entries)?;
    Ok(entries.len())
  }

  async fn activate(&mut self) -> Result<EventOutcome> {
    info!(version = %self.version, "Activating service worker");
    self.transition(WorkerState::Activating);

    let existing = match self.storage.keys() {
      Ok(existing) => existing,
      Err(e) => {
        self.transition(WorkerState::Installed);
        return Err(e.wrap_err("Failed to enumerate caches"));
      }
    };

    let mut purged = Vec::new();
    for name in self.policy.stale_caches(&existing) {
      info!(cache = %name, "Deleting old cache");
      match self.storage.delete(&name) {
        Ok(_) => purged.push(name),
        Err(e) => warn!(cache = %name, "Failed to delete old cache: {:#}", e),
      }
    }

    self.clients_claimed = true;
    self.transition(WorkerState::Activated);
    info!(version = %self.version, "Service worker activated");
    Ok(EventOutcome::Activated { purged })
  }

  fn handle_push(&self, data: Option<&str>) -> Result<EventOutcome> {
    let Some(data) = data else {
      debug!("Push message without data ignored");
      return Ok(EventOutcome::Ignored);
    };

    let payload = PushPayload::parse(data)?;
    Ok(EventOutcome::ShowNotification(Notification::from_push(
      payload,
      Utc::now(),
    )))
  }

  fn handle_notification_click(&self, action: Option<&str>) -> Result<EventOutcome> {
    debug!(action = ?action, "Notification closed");
    if action == Some(EXPLORE_ACTION) {
      return Ok(EventOutcome::OpenWindow(self.resolve("/")?));
    }
    Ok(EventOutcome::Ignored)
  }
}
