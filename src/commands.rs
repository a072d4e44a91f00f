//! Command-line subcommands and their handlers.

use clap::Subcommand;
use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use std::io::Write;
use std::sync::Arc;
use tracing::warn;

use crate::cache::{CacheNames, MemoryStorage, Served, SqliteStorage, WorkerStorage};
use crate::config::{Config, StorageBackend};
use crate::http::Request;
use crate::network::{HttpNetwork, Network, OfflineNetwork};
use crate::registration::Registration;
use crate::worker::{Event, EventOutcome, ServiceWorker, WorkerState, CONTACT_FORM_TAG};

type Worker = ServiceWorker<dyn WorkerStorage, dyn Network>;

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Register, pre-cache static assets and activate the configured version
  Install,
  /// Route requests through the activated worker
  Fetch {
    /// Paths (resolved against the origin) or absolute URLs
    #[arg(required = true)]
    urls: Vec<String>,
    /// Treat requests as page navigations
    #[arg(long)]
    navigate: bool,
    /// Act as if the network were down
    #[arg(long)]
    offline: bool,
    #[arg(long, default_value = "GET")]
    method: String,
    /// Write the body of the last response to stdout
    #[arg(long)]
    body: bool,
  },
  /// List named caches and their entries
  Caches,
  /// Queue a JSON payload for background sync
  Queue {
    payload: String,
    #[arg(long, default_value = CONTACT_FORM_TAG)]
    tag: String,
  },
  /// Replay queued submissions for a sync tag
  Sync {
    #[arg(default_value = CONTACT_FORM_TAG)]
    tag: String,
  },
  /// Deliver a push message and print the resulting notification
  Push { data: Option<String> },
  /// Click a notification, optionally on one of its actions
  Click { action: Option<String> },
}

pub async fn run(command: Command, config: &Config) -> Result<()> {
  match command {
    Command::Install => install(config).await,
    Command::Fetch {
      urls,
      navigate,
      offline,
      method,
      body,
    } => fetch(config, &urls, navigate, offline, &method, body).await,
    Command::Caches => list_caches(config),
    Command::Queue { payload, tag } => queue(config, &payload, &tag),
    Command::Sync { tag } => {
      let outcome = revive(config)?.dispatch(Event::Sync { tag }).await?;
      report(outcome)
    }
    Command::Push { data } => {
      let outcome = revive(config)?.dispatch(Event::Push { data }).await?;
      report(outcome)
    }
    Command::Click { action } => {
      let outcome = revive(config)?
        .dispatch(Event::NotificationClick { action })
        .await?;
      report(outcome)
    }
  }
}

fn open_storage(config: &Config) -> Result<Arc<dyn WorkerStorage>> {
  match config.storage.backend {
    StorageBackend::Sqlite => {
      let storage = match &config.storage.path {
        Some(path) => SqliteStorage::open_at(path)?,
        None => SqliteStorage::open()?,
      };
      Ok(Arc::new(storage))
    }
    StorageBackend::Memory => {
      warn!("Using in-memory storage; caches are dropped on exit");
      Ok(Arc::new(MemoryStorage::new()))
    }
  }
}

fn http_network(config: &Config) -> Result<Arc<dyn Network>> {
  Ok(Arc::new(HttpNetwork::new(config.origin.clone())?))
}

fn revive(config: &Config) -> Result<Worker> {
  ServiceWorker::revive(config, open_storage(config)?, http_network(config)?)
}

/// Version of the worker that controlled the page before this one, judged
/// from the static caches left behind.
fn previous_version(existing: &[String], names: &CacheNames) -> Option<String> {
  existing
    .iter()
    .filter(|name| !names.is_current(name))
    .find_map(|name| name.strip_prefix("static-"))
    .map(String::from)
}

async fn install(config: &Config) -> Result<()> {
  let Some(mut registration) = Registration::register(config)? else {
    println!("Registration skipped in {:?} mode", config.mode);
    return Ok(());
  };
  println!(
    "Registered {} for scope {}",
    registration.script_url(),
    registration.scope()
  );

  let storage = open_storage(config)?;
  if let Some(previous) = previous_version(&storage.keys()?, &config.cache_names()) {
    registration = registration.with_controller(previous);
  }
  if let Some(current) = registration.controller() {
    println!("Page currently controlled by {}", current);
  }

  let mut worker: Worker = ServiceWorker::new(config, storage, http_network(config)?);
  let version = worker.version().to_string();

  registration.observe(&version, WorkerState::Installing);
  let installed = worker.dispatch(Event::Install).await;
  if let Some(notice) = registration.observe(&version, worker.state()) {
    println!(
      "New content available: {} replaces {}",
      notice.version, notice.replaces
    );
  }
  if let EventOutcome::Installed { cached } = installed? {
    println!("Installed {}: {} static assets cached", version, cached);
  }
  if worker.skipped_waiting() {
    println!("Skipping wait for old clients");
  }

  let activated = worker.dispatch(Event::Activate).await?;
  registration.observe(&version, worker.state());
  if let EventOutcome::Activated { purged } = activated {
    for name in &purged {
      println!("Deleted old cache {}", name);
    }
  }
  let claimed = if worker.claimed_clients() {
    " (clients claimed)"
  } else {
    ""
  };
  println!(
    "Activated {} for scope {}{}",
    version,
    registration.scope(),
    claimed
  );

  Ok(())
}

async fn fetch(
  config: &Config,
  targets: &[String],
  navigate: bool,
  offline: bool,
  method: &str,
  dump_body: bool,
) -> Result<()> {
  let method =
    Method::from_bytes(method.as_bytes()).map_err(|e| eyre!("Invalid method '{}': {}", method, e))?;
  let network: Arc<dyn Network> = if offline {
    Arc::new(OfflineNetwork)
  } else {
    http_network(config)?
  };
  let mut worker: Worker = ServiceWorker::revive(config, open_storage(config)?, network.clone())?;

  let mut last_body = Vec::new();
  for target in targets {
    let url = config.resolve(target)?;
    let mut request = if navigate {
      Request::navigate(url)
    } else {
      Request::get(url)
    };
    request.method = method.clone();

    let (served, label) = match worker.dispatch(Event::Fetch(request.clone())).await? {
      EventOutcome::Fetched(served) => {
        let label = served.source.to_string();
        (served, label)
      }
      EventOutcome::Passthrough => (
        Served::from_network(network.fetch(&request).await?),
        "passthrough".to_string(),
      ),
      other => return Err(eyre!("Unexpected outcome for fetch: {:?}", other)),
    };

    println!(
      "{} {} {:<16} {} ({} bytes, {})",
      served.response.status,
      request.method,
      label,
      request.url,
      served.response.body.len(),
      served.response.header("content-type").unwrap_or("no content type")
    );
    last_body = served.response.body;
  }

  worker.settle().await;

  if dump_body {
    std::io::stdout()
      .write_all(&last_body)
      .map_err(|e| eyre!("Failed to write body: {}", e))?;
  }
  Ok(())
}

fn list_caches(config: &Config) -> Result<()> {
  let storage = open_storage(config)?;
  let names = config.cache_names();

  for name in storage.keys()? {
    let marker = if names.is_current(&name) { "" } else { " (stale)" };
    println!("{}{}", name, marker);
    for entry in storage.entries(&name)? {
      println!(
        "  {} {} {:>8}B {} {}",
        entry.status,
        entry.method,
        entry.size,
        entry.cached_at.format("%Y-%m-%d %H:%M:%S"),
        entry.url
      );
    }
  }
  Ok(())
}

fn queue(config: &Config, payload: &str, tag: &str) -> Result<()> {
  let payload: serde_json::Value =
    serde_json::from_str(payload).map_err(|e| eyre!("Payload is not valid JSON: {}", e))?;
  let id = open_storage(config)?.enqueue(tag, &payload)?;
  println!("Queued submission {} for {}", id, tag);
  Ok(())
}

fn report(outcome: EventOutcome) -> Result<()> {
  match outcome {
    EventOutcome::Synced {
      submitted,
      remaining,
    } => println!("Submitted {}, {} still queued", submitted, remaining),
    EventOutcome::ShowNotification(notification) => println!(
      "{}",
      serde_json::to_string_pretty(&notification)
        .map_err(|e| eyre!("Failed to encode notification: {}", e))?
    ),
    EventOutcome::OpenWindow(url) => println!("Open {}", url),
    EventOutcome::Ignored => println!("Nothing to do"),
    other => println!("{:?}", other),
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_previous_version_from_stale_static_cache() {
    let names = CacheNames::for_version("v2");
    let existing = vec![
      "dynamic-v1".to_string(),
      "static-v1".to_string(),
      "static-v2".to_string(),
    ];
    assert_eq!(previous_version(&existing, &names), Some("v1".to_string()));
  }

  #[test]
  fn test_no_previous_version() {
    let names = CacheNames::for_version("v1");
    let existing = vec!["static-v1".to_string(), "dynamic-v1".to_string()];
    assert_eq!(previous_version(&existing, &names), None);
    assert_eq!(previous_version(&[], &names), None);
  }
}
