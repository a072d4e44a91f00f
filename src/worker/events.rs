//! Events the platform delivers to a worker and what handling them produced.

use url::Url;

use super::notification::Notification;
use crate::cache::Served;
use crate::http::Request;

/// Lifecycle states of one worker version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  /// Script evaluated, install not dispatched yet
  Parsed,
  /// Install event running
  Installing,
  /// Installed and allowed to activate
  Installed,
  /// Activate event running
  Activating,
  /// Controlling pages and serving fetches
  Activated,
  /// Install failed; this version will never activate
  Redundant,
}

impl WorkerState {
  /// Whether an event of this kind may be dispatched in this state.
  pub fn accepts(&self, kind: EventKind) -> bool {
    match kind {
      EventKind::Install => *self == WorkerState::Parsed,
      EventKind::Activate => *self == WorkerState::Installed,
      EventKind::Fetch | EventKind::Sync | EventKind::Push | EventKind::NotificationClick => {
        *self == WorkerState::Activated
      }
    }
  }
}

impl std::fmt::Display for WorkerState {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      WorkerState::Parsed => write!(f, "parsed"),
      WorkerState::Installing => write!(f, "installing"),
      WorkerState::Installed => write!(f, "installed"),
      WorkerState::Activating => write!(f, "activating"),
      WorkerState::Activated => write!(f, "activated"),
      WorkerState::Redundant => write!(f, "redundant"),
    }
  }
}

/// An event delivered to the worker.
#[derive(Debug, Clone)]
pub enum Event {
  Install,
  Activate,
  Fetch(Request),
  /// Background sync fired for a tag
  Sync { tag: String },
  /// Push message with its raw text payload, if any
  Push { data: Option<String> },
  /// User clicked a notification, optionally on one of its actions
  NotificationClick { action: Option<String> },
}

impl Event {
  pub fn kind(&self) -> EventKind {
    match self {
      Event::Install => EventKind::Install,
      Event::Activate => EventKind::Activate,
      Event::Fetch(_) => EventKind::Fetch,
      Event::Sync { .. } => EventKind::Sync,
      Event::Push { .. } => EventKind::Push,
      Event::NotificationClick { .. } => EventKind::NotificationClick,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
  Install,
  Activate,
  Fetch,
  Sync,
  Push,
  NotificationClick,
}

impl std::fmt::Display for EventKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      EventKind::Install => write!(f, "install"),
      EventKind::Activate => write!(f, "activate"),
      EventKind::Fetch => write!(f, "fetch"),
      EventKind::Sync => write!(f, "sync"),
      EventKind::Push => write!(f, "push"),
      EventKind::NotificationClick => write!(f, "notificationclick"),
    }
  }
}

/// Result of handling one event.
#[derive(Debug, Clone)]
pub enum EventOutcome {
  /// Static assets pre-cached
  Installed { cached: usize },
  /// Caches of other versions removed
  Activated { purged: Vec<String> },
  /// The response for an intercepted request
  Fetched(Served),
  /// Request not intercepted; the network handles it natively
  Passthrough,
  Synced { submitted: usize, remaining: usize },
  ShowNotification(Notification),
  OpenWindow(Url),
  /// Nothing to do for this event
  Ignored,
}
