//! Scripted network for tests.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::Network;
use crate::http::{Request, Response};

/// Serves canned responses by URL and counts every fetch it sees.
#[derive(Debug, Default)]
pub struct StubNetwork {
  routes: Mutex<HashMap<String, Response>>,
  calls: Mutex<Vec<String>>,
  offline: AtomicBool,
  latency: Option<Duration>,
}

impl StubNetwork {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn route(self, url: &str, response: Response) -> Self {
    self
      .routes
      .lock()
      .unwrap()
      .insert(url.to_string(), response);
    self
  }

  /// Delay every fetch, so concurrent requests overlap.
  pub fn with_latency(mut self, latency: Duration) -> Self {
    self.latency = Some(latency);
    self
  }

  pub fn set_offline(&self, offline: bool) {
    self.offline.store(offline, Ordering::SeqCst);
  }

  /// URLs fetched so far, in order. Rejected fetches count too.
  pub fn calls(&self) -> Vec<String> {
    self.calls.lock().unwrap().clone()
  }

  pub fn call_count(&self, url: &str) -> usize {
    self.calls().iter().filter(|u| u.as_str() == url).count()
  }
}

#[async_trait]
impl Network for StubNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    let url = request.url.to_string();
    self.calls.lock().unwrap().push(url.clone());

    if let Some(latency) = self.latency {
      tokio::time::sleep(latency).await;
    }

    if self.offline.load(Ordering::SeqCst) {
      return Err(eyre!("Failed to fetch {}: offline", url));
    }

    self
      .routes
      .lock()
      .unwrap()
      .get(&url)
      .cloned()
      .ok_or_else(|| eyre!("Failed to fetch {}: connection refused", url))
  }
}
