//! The page side of the worker: registration and update notices.

use color_eyre::Result;
use tracing::{debug, info};
use url::Url;

use crate::config::{Config, RuntimeMode};
use crate::worker::WorkerState;

/// Reported when a new version finished installing while an older one still
/// controls the page. Nothing reloads; the page only learns about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateNotice {
  pub version: String,
  pub replaces: String,
}

/// A worker registration for one scope.
#[derive(Debug, Clone)]
pub struct Registration {
  script_url: Url,
  scope: Url,
  /// Version currently controlling the page
  controller: Option<String>,
  /// Version whose install is in progress
  installing: Option<String>,
}

impl Registration {
  /// Register the worker script. Only production builds register; in any
  /// other mode this returns `None`.
  pub fn register(config: &Config) -> Result<Option<Self>> {
    if config.mode != RuntimeMode::Production {
      info!("Skipping service worker registration outside production mode");
      return Ok(None);
    }

    let script_url = config.resolve(&config.script_path)?;
    let scope = config.resolve(&config.scope)?;
    info!(scope = %scope, script = %script_url, "Service worker registered successfully");

    Ok(Some(Self {
      script_url,
      scope,
      controller: None,
      installing: None,
    }))
  }

  /// The page is already controlled by `version`.
  pub fn with_controller(mut self, version: impl Into<String>) -> Self {
    self.controller = Some(version.into());
    self
  }

  pub fn script_url(&self) -> &Url {
    &self.script_url
  }

  pub fn scope(&self) -> &Url {
    &self.scope
  }

  pub fn controller(&self) -> Option<&str> {
    self.controller.as_deref()
  }

  /// Feed a state change of worker `version`.
  pub fn observe(&mut self, version: &str, state: WorkerState) -> Option<UpdateNotice> {
    match state {
      WorkerState::Installing => {
        debug!(version, "Update found");
        self.installing = Some(version.to_string());
        None
      }
      WorkerState::Installed => {
        // Only an install seen from its start counts as an update
        if self.installing.as_deref() != Some(version) {
          debug!(version, "Installed version was not installing");
          return None;
        }
        self.installing = None;
        match &self.controller {
          Some(current) if current != version => {
            info!(version, replaces = %current, "New content available! Please refresh.");
            Some(UpdateNotice {
              version: version.to_string(),
              replaces: current.clone(),
            })
          }
          _ => None,
        }
      }
      WorkerState::Activated => {
        self.controller = Some(version.to_string());
        None
      }
      WorkerState::Redundant => {
        if self.installing.as_deref() == Some(version) {
          self.installing = None;
        }
        None
      }
      WorkerState::Parsed | WorkerState::Activating => None,
    }
  }
}
