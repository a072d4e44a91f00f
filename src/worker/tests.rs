//! Lifecycle scenarios run phase by phase against in-memory fakes.

use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

use super::*;
use crate::cache::{
  CacheStorage, EntrySummary, MemoryStorage, QueuedSubmission, ResponseSource, Served, SyncQueue,
};
use crate::config::Config;
use crate::http::{Request, Response, ResponseType};
use crate::network::stub::StubNetwork;

const ORIGIN: &str = "https://site.test/";
const INDEX: &str = "<!doctype html><title>Portfolio</title>";

fn url(path: &str) -> Url {
  Url::parse(ORIGIN).unwrap().join(path).unwrap()
}

fn abs(path: &str) -> String {
  url(path).to_string()
}

fn config(static_assets: &[&str]) -> Config {
  Config {
    origin: Url::parse(ORIGIN).unwrap(),
    static_assets: static_assets.iter().map(|s| s.to_string()).collect(),
    ..Config::default()
  }
}

fn basic(body: &str) -> Response {
  Response::new(200, ResponseType::Basic, body)
}

fn site() -> StubNetwork {
  StubNetwork::new()
    .route(&abs("/"), basic(INDEX))
    .route(&abs("/index.html"), basic(INDEX))
    .route(&abs("/manifest.json"), basic("{}"))
    .route(&abs("/assets/app.js"), basic("console.log('app')"))
    .route(&abs("/about"), basic("about"))
}

type TestWorker<S = MemoryStorage> = ServiceWorker<S, StubNetwork>;

async fn activated(
  config: &Config,
  storage: Arc<MemoryStorage>,
  network: Arc<StubNetwork>,
) -> TestWorker {
  let mut worker = ServiceWorker::new(config, storage, network);
  worker.dispatch(Event::Install).await.unwrap();
  worker.dispatch(Event::Activate).await.unwrap();
  worker
}

async fn fetch<S: crate::cache::WorkerStorage + 'static>(
  worker: &mut TestWorker<S>,
  request: Request,
) -> Served {
  match worker.dispatch(Event::Fetch(request)).await.unwrap() {
    EventOutcome::Fetched(served) => served,
    other => panic!("expected a response, got {:?}", other),
  }
}

#[tokio::test]
async fn test_install_then_serve_static_assets_without_network() {
  let storage = Arc::new(MemoryStorage::new());
  let network = Arc::new(site());
  let config = config(&["/", "/index.html", "/manifest.json"]);

  let mut worker = ServiceWorker::new(&config, storage.clone(), network.clone());
  let outcome = worker.dispatch(Event::Install).await.unwrap();
  assert!(matches!(outcome, EventOutcome::Installed { cached: 3 }));
  assert_eq!(worker.state(), WorkerState::Installed);
  assert!(worker.skipped_waiting());

  // Between phases: everything is already in the static cache
  for path in ["/", "/index.html", "/manifest.json"] {
    let cached = storage.match_in("static-v1", &Request::get(url(path))).unwrap();
    assert!(cached.is_some(), "{} not pre-cached", path);
  }

  worker.dispatch(Event::Activate).await.unwrap();
  assert_eq!(worker.state(), WorkerState::Activated);
  assert!(worker.claimed_clients());

  let calls_after_install = network.calls().len();
  let served = fetch(&mut worker, Request::get(url("/manifest.json"))).await;
  assert_eq!(served.source, ResponseSource::Cache);
  assert_eq!(served.response.body, b"{}");
  assert_eq!(network.calls().len(), calls_after_install);
}

#[tokio::test]
async fn test_install_failure_commits_nothing() {
  let storage = Arc::new(MemoryStorage::new());
  let network = Arc::new(site());
  // No route for the favicon: the fetch is rejected
  let config = config(&["/index.html", "/favicon.svg"]);

  let mut worker = ServiceWorker::new(&config, storage.clone(), network);
  assert!(worker.dispatch(Event::Install).await.is_err());
  assert_eq!(worker.state(), WorkerState::Redundant);
  assert!(!storage.has("static-v1").unwrap());
  assert_eq!(
    storage.match_any(&Request::get(url("/index.html"))).unwrap(),
    None
  );

  // A redundant version never activates
  assert!(worker.dispatch(Event::Activate).await.is_err());
}

#[tokio::test]
async fn test_install_fails_on_error_status() {
  let storage = Arc::new(MemoryStorage::new());
  let network = Arc::new(site().route(
    &abs("/favicon.svg"),
    Response::new(404, ResponseType::Basic, "missing"),
  ));
  let config = config(&["/index.html", "/favicon.svg"]);

  let mut worker = ServiceWorker::new(&config, storage.clone(), network);
  assert!(worker.dispatch(Event::Install).await.is_err());
  assert!(storage.keys().unwrap().is_empty());
}

#[tokio::test]
async fn test_events_rejected_in_wrong_state() {
  let storage = Arc::new(MemoryStorage::new());
  let network = Arc::new(site());
  let config = config(&["/index.html"]);
  let mut worker = ServiceWorker::new(&config, storage, network.clone());

  assert!(worker
    .dispatch(Event::Fetch(Request::get(url("/index.html"))))
    .await
    .is_err());
  assert!(worker.dispatch(Event::Activate).await.is_err());
  assert_eq!(worker.state(), WorkerState::Parsed);
  assert!(network.calls().is_empty());

  worker.dispatch(Event::Install).await.unwrap();
  assert!(worker.dispatch(Event::Install).await.is_err());
  assert!(worker
    .dispatch(Event::Push { data: None })
    .await
    .is_err());
  assert_eq!(worker.state(), WorkerState::Installed);
}

#[tokio::test]
async fn test_activate_purges_previous_versions() {
  let storage = Arc::new(MemoryStorage::new());
  let old = basic("old");
  storage.put("static-v0", &Request::get(url("/index.html")), &old).unwrap();
  storage.put("dynamic-v0", &Request::get(url("/assets/app.js")), &old).unwrap();
  storage.open("zwe-htet-naing-portfolio-v1").unwrap();

  let network = Arc::new(site());
  let config = config(&["/index.html"]);
  let mut worker = ServiceWorker::new(&config, storage.clone(), network);

  worker.dispatch(Event::Install).await.unwrap();
  // Old versions are still around until activation
  assert_eq!(storage.keys().unwrap().len(), 4);

  let outcome = worker.dispatch(Event::Activate).await.unwrap();
  match outcome {
    EventOutcome::Activated { purged } => assert_eq!(
      purged,
      vec!["static-v0", "dynamic-v0", "zwe-htet-naing-portfolio-v1"]
    ),
    other => panic!("unexpected outcome {:?}", other),
  }
  assert_eq!(storage.keys().unwrap(), vec!["static-v1"]);

  // The old copy of /assets/app.js is gone, so this goes to the network
  let served = fetch(&mut worker, Request::get(url("/assets/app.js"))).await;
  assert_eq!(served.source, ResponseSource::Network);
  worker.settle().await;
  assert_eq!(storage.keys().unwrap(), vec!["static-v1", "dynamic-v1"]);
}

#[tokio::test]
async fn test_dynamic_asset_served_from_cache_when_offline() {
  let storage = Arc::new(MemoryStorage::new());
  let network = Arc::new(site());
  let config = config(&["/index.html"]);
  let mut worker = activated(&config, storage.clone(), network.clone()).await;

  let first = fetch(&mut worker, Request::get(url("/assets/app.js"))).await;
  assert_eq!(first.source, ResponseSource::Network);
  worker.settle().await;

  let stored = storage
    .match_in("dynamic-v1", &Request::get(url("/assets/app.js")))
    .unwrap();
  assert_eq!(stored.as_ref(), Some(&first.response));

  network.set_offline(true);
  let second = fetch(&mut worker, Request::get(url("/assets/app.js"))).await;
  assert_eq!(second.source, ResponseSource::Cache);
  assert_eq!(second.response.body, first.response.body);
  assert_eq!(network.call_count(&abs("/assets/app.js")), 1);
}

#[tokio::test]
async fn test_uncacheable_responses_never_stored() {
  let storage = Arc::new(MemoryStorage::new());
  let network = Arc::new(
    site()
      .route(
        &abs("/assets/missing.js"),
        Response::new(404, ResponseType::Basic, "nope"),
      )
      .route(
        &abs("/assets/partial.js"),
        Response::new(206, ResponseType::Basic, "part"),
      )
      .route(
        "https://fonts.gstatic.com/s/inter.woff2",
        Response::new(200, ResponseType::Cors, "font"),
      ),
  );
  let config = config(&["/index.html"]);
  let mut worker = activated(&config, storage.clone(), network.clone()).await;

  let requests = [
    Request::get(url("/assets/missing.js")),
    Request::get(url("/assets/partial.js")),
    Request::get(Url::parse("https://fonts.gstatic.com/s/inter.woff2").unwrap()),
  ];
  for request in &requests {
    let served = fetch(&mut worker, request.clone()).await;
    assert_eq!(served.source, ResponseSource::Network);
  }
  worker.settle().await;

  assert!(!storage.has("dynamic-v1").unwrap());
  assert_eq!(
    fetch(&mut worker, Request::get(url("/assets/missing.js")))
      .await
      .response
      .status,
    404
  );
  assert_eq!(network.call_count(&abs("/assets/missing.js")), 2);
}

#[tokio::test]
async fn test_cacheable_response_outside_matchers_not_stored() {
  let storage = Arc::new(MemoryStorage::new());
  let network = Arc::new(site());
  let config = config(&["/index.html"]);
  let mut worker = activated(&config, storage.clone(), network.clone()).await;

  fetch(&mut worker, Request::get(url("/about"))).await;
  worker.settle().await;
  fetch(&mut worker, Request::get(url("/about"))).await;

  assert_eq!(network.call_count(&abs("/about")), 2);
  assert!(!storage.has("dynamic-v1").unwrap());
}

#[tokio::test]
async fn test_cached_index_served_while_offline() {
  let storage = Arc::new(MemoryStorage::new());
  let network = Arc::new(site());
  let config = config(&["/index.html"]);
  let mut worker = activated(&config, storage, network.clone()).await;

  network.set_offline(true);
  let served = fetch(&mut worker, Request::get(url("/index.html"))).await;

  assert_eq!(served.source, ResponseSource::Cache);
  assert_eq!(served.response.status, 200);
  assert_eq!(served.response.body, INDEX.as_bytes());
}

#[tokio::test]
async fn test_fragment_does_not_affect_cache_match() {
  let storage = Arc::new(MemoryStorage::new());
  let network = Arc::new(site());
  let config = config(&["/index.html"]);
  let mut worker = activated(&config, storage, network.clone()).await;

  network.set_offline(true);
  let served = fetch(&mut worker, Request::get(url("/index.html#about"))).await;

  assert_eq!(served.source, ResponseSource::Cache);
  assert_eq!(served.response.status, 200);
  assert_eq!(served.response.body, INDEX.as_bytes());
}

#[tokio::test]
async fn test_offline_navigation_gets_root_document() {
  let storage = Arc::new(MemoryStorage::new());
  let network = Arc::new(site());
  let config = config(&["/index.html"]);
  let mut worker = activated(&config, storage, network.clone()).await;

  network.set_offline(true);
  let served = fetch(&mut worker, Request::navigate(url("/projects"))).await;

  assert_eq!(served.source, ResponseSource::OfflineFallback);
  assert_eq!(served.response.body, INDEX.as_bytes());
}

#[tokio::test]
async fn test_offline_subresource_gets_timeout() {
  let storage = Arc::new(MemoryStorage::new());
  let network = Arc::new(site());
  let config = config(&["/index.html"]);
  let mut worker = activated(&config, storage, network.clone()).await;

  network.set_offline(true);
  let served = fetch(&mut worker, Request::get(url("/assets/other.js"))).await;

  assert_eq!(served.source, ResponseSource::Timeout);
  assert_eq!(served.response.status, 408);
  assert!(served.response.body.is_empty());
}

#[tokio::test]
async fn test_offline_navigation_without_cached_root_gets_timeout() {
  let storage = Arc::new(MemoryStorage::new());
  let network = Arc::new(site());
  let config = Config {
    offline_fallback: "/offline.html".to_string(),
    ..config(&["/index.html"])
  };
  let mut worker = activated(&config, storage, network.clone()).await;

  network.set_offline(true);
  let served = fetch(&mut worker, Request::navigate(url("/projects"))).await;
  assert_eq!(served.response.status, 408);
}

#[tokio::test]
async fn test_non_get_and_non_http_pass_through() {
  let storage = Arc::new(MemoryStorage::new());
  let network = Arc::new(site());
  let config = config(&["/index.html"]);
  let mut worker = activated(&config, storage.clone(), network.clone()).await;
  let calls = network.calls().len();

  let post = Request::post_json(url("/api/contact"), &serde_json::json!({"a": 1})).unwrap();
  let extension = Request::get(Url::parse("chrome-extension://abcdef/script.js").unwrap());

  for request in [post, extension] {
    let outcome = worker.dispatch(Event::Fetch(request)).await.unwrap();
    assert!(matches!(outcome, EventOutcome::Passthrough));
  }
  assert_eq!(network.calls().len(), calls);
  assert_eq!(storage.keys().unwrap(), vec!["static-v1"]);
}

#[tokio::test]
async fn test_concurrent_misses_each_hit_network() {
  let storage = Arc::new(MemoryStorage::new());
  let network = Arc::new(site().with_latency(Duration::from_millis(20)));
  let config = config(&["/index.html"]);
  let worker = activated(&config, storage.clone(), network.clone()).await;

  let (a, b) = tokio::join!(
    worker.handle_fetch(Request::get(url("/assets/app.js"))),
    worker.handle_fetch(Request::get(url("/assets/app.js"))),
  );
  assert!(matches!(a.unwrap(), EventOutcome::Fetched(_)));
  assert!(matches!(b.unwrap(), EventOutcome::Fetched(_)));
  worker.settle().await;

  assert_eq!(network.call_count(&abs("/assets/app.js")), 2);
  assert_eq!(storage.entries("dynamic-v1").unwrap().len(), 1);
}

/// Storage whose cache reads and single writes always fail.
#[derive(Default)]
struct BrokenStorage {
  inner: MemoryStorage,
}

impl CacheStorage for BrokenStorage {
  fn open(&self, cache_name: &str) -> Result<()> {
    self.inner.open(cache_name)
  }
  fn has(&self, cache_name: &str) -> Result<bool> {
    self.inner.has(cache_name)
  }
  fn keys(&self) -> Result<Vec<String>> {
    self.inner.keys()
  }
  fn delete(&self, cache_name: &str) -> Result<bool> {
    self.inner.delete(cache_name)
  }
  fn put(&self, _cache_name: &str, _request: &Request, _response: &Response) -> Result<()> {
    Err(eyre!("quota exceeded"))
  }
  fn put_all(&self, cache_name: &str, entries: &[(Request, Response)]) -> Result<()> {
    self.inner.put_all(cache_name, entries)
  }
  fn match_in(&self, _cache_name: &str, _request: &Request) -> Result<Option<Response>> {
    Err(eyre!("disk I/O error"))
  }
  fn match_any(&self, _request: &Request) -> Result<Option<Response>> {
    Err(eyre!("disk I/O error"))
  }
  fn entries(&self, cache_name: &str) -> Result<Vec<EntrySummary>> {
    self.inner.entries(cache_name)
  }
}

impl SyncQueue for BrokenStorage {
  fn enqueue(&self, tag: &str, payload: &serde_json::Value) -> Result<i64> {
    self.inner.enqueue(tag, payload)
  }
  fn pending(&self, tag: &str) -> Result<Vec<QueuedSubmission>> {
    self.inner.pending(tag)
  }
  fn remove(&self, id: i64) -> Result<()> {
    self.inner.remove(id)
  }
}

#[tokio::test]
async fn test_storage_failures_do_not_break_responses() {
  let storage = Arc::new(BrokenStorage::default());
  let network = Arc::new(site());
  let config = config(&["/index.html"]);
  let mut worker: TestWorker<BrokenStorage> =
    ServiceWorker::new(&config, storage.clone(), network.clone());
  worker.dispatch(Event::Install).await.unwrap();
  worker.dispatch(Event::Activate).await.unwrap();

  let served = fetch(&mut worker, Request::get(url("/assets/app.js"))).await;
  assert_eq!(served.source, ResponseSource::Network);
  assert_eq!(served.response.body, b"console.log('app')");
  worker.settle().await;

  network.set_offline(true);
  let served = fetch(&mut worker, Request::navigate(url("/"))).await;
  assert_eq!(served.source, ResponseSource::Timeout);
}

#[tokio::test]
async fn test_revive_activated_version() {
  let storage = Arc::new(MemoryStorage::new());
  let network = Arc::new(site());
  let config = config(&["/index.html"]);
  activated(&config, storage.clone(), network.clone()).await;

  let mut revived = ServiceWorker::revive(&config, storage.clone(), network.clone()).unwrap();
  assert_eq!(revived.state(), WorkerState::Activated);
  let served = fetch(&mut revived, Request::get(url("/index.html"))).await;
  assert_eq!(served.source, ResponseSource::Cache);

  let next = Config {
    version: "v2".to_string(),
    ..config
  };
  assert!(ServiceWorker::revive(&next, storage, network).is_err());
}

#[tokio::test]
async fn test_sync_replays_queued_submissions() {
  let storage = Arc::new(MemoryStorage::new());
  let network = Arc::new(site().route(&abs("/api/contact"), basic("thanks")));
  let config = config(&["/index.html"]);
  let mut worker = activated(&config, storage.clone(), network.clone()).await;

  storage
    .enqueue(CONTACT_FORM_TAG, &serde_json::json!({"email": "a@b.c"}))
    .unwrap();
  storage
    .enqueue(CONTACT_FORM_TAG, &serde_json::json!({"email": "d@e.f"}))
    .unwrap();

  network.set_offline(true);
  let outcome = worker
    .dispatch(Event::Sync {
      tag: CONTACT_FORM_TAG.to_string(),
    })
    .await
    .unwrap();
  assert!(matches!(
    outcome,
    EventOutcome::Synced {
      submitted: 0,
      remaining: 2
    }
  ));

  network.set_offline(false);
  let outcome = worker
    .dispatch(Event::Sync {
      tag: CONTACT_FORM_TAG.to_string(),
    })
    .await
    .unwrap();
  assert!(matches!(
    outcome,
    EventOutcome::Synced {
      submitted: 2,
      remaining: 0
    }
  ));
  assert!(storage.pending(CONTACT_FORM_TAG).unwrap().is_empty());

  let outcome = worker
    .dispatch(Event::Sync {
      tag: "newsletter".to_string(),
    })
    .await
    .unwrap();
  assert!(matches!(outcome, EventOutcome::Ignored));
}

#[tokio::test]
async fn test_sync_keeps_rejected_submissions() {
  let storage = Arc::new(MemoryStorage::new());
  let network = Arc::new(site().route(
    &abs("/api/contact"),
    Response::new(500, ResponseType::Basic, "boom"),
  ));
  let config = config(&["/index.html"]);
  let mut worker = activated(&config, storage.clone(), network).await;

  storage
    .enqueue(CONTACT_FORM_TAG, &serde_json::json!({"email": "a@b.c"}))
    .unwrap();
  worker
    .dispatch(Event::Sync {
      tag: CONTACT_FORM_TAG.to_string(),
    })
    .await
    .unwrap();
  assert_eq!(storage.pending(CONTACT_FORM_TAG).unwrap().len(), 1);
}

#[tokio::test]
async fn test_push_and_notification_click() {
  let storage = Arc::new(MemoryStorage::new());
  let network = Arc::new(site());
  let config = config(&["/index.html"]);
  let mut worker = activated(&config, storage, network).await;

  let outcome = worker.dispatch(Event::Push { data: None }).await.unwrap();
  assert!(matches!(outcome, EventOutcome::Ignored));

  let outcome = worker
    .dispatch(Event::Push {
      data: Some(r#"{"title":"New post","body":"Read it","primaryKey":1}"#.to_string()),
    })
    .await
    .unwrap();
  match outcome {
    EventOutcome::ShowNotification(notification) => {
      assert_eq!(notification.title, "New post");
      assert_eq!(notification.actions.len(), 2);
    }
    other => panic!("unexpected outcome {:?}", other),
  }

  assert!(worker
    .dispatch(Event::Push {
      data: Some("garbage".to_string()),
    })
    .await
    .is_err());

  let outcome = worker
    .dispatch(Event::NotificationClick {
      action: Some("explore".to_string()),
    })
    .await
    .unwrap();
  match outcome {
    EventOutcome::OpenWindow(target) => assert_eq!(target.as_str(), ORIGIN),
    other => panic!("unexpected outcome {:?}", other),
  }

  let outcome = worker
    .dispatch(Event::NotificationClick {
      action: Some("close".to_string()),
    })
    .await
    .unwrap();
  assert!(matches!(outcome, EventOutcome::Ignored));
}

/// Memory storage with targeted faults.
#[derive(Default)]
struct FaultyStorage {
  inner: MemoryStorage,
  /// `delete` fails for this cache
  undeletable: Option<String>,
  /// `put` blocks this long before writing
  put_delay: Option<Duration>,
  /// `remove` fails for this submission
  unremovable: Option<i64>,
}

impl CacheStorage for FaultyStorage {
  fn open(&self, cache_name: &str) -> Result<()> {
    self.inner.open(cache_name)
  }
  fn has(&self, cache_name: &str) -> Result<bool> {
    self.inner.has(cache_name)
  }
  fn keys(&self) -> Result<Vec<String>> {
    self.inner.keys()
  }
  fn delete(&self, cache_name: &str) -> Result<bool> {
    if self.undeletable.as_deref() == Some(cache_name) {
      return Err(eyre!("cache {} is locked", cache_name));
    }
    self.inner.delete(cache_name)
  }
  fn put(&self, cache_name: &str, request: &Request, response: &Response) -> Result<()> {
    if let Some(delay) = self.put_delay {
      std::thread::sleep(delay);
    }
    self.inner.put(cache_name, request, response)
  }
  fn put_all(&self, cache_name: &str, entries: &[(Request, Response)]) -> Result<()> {
    self.inner.put_all(cache_name, entries)
  }
  fn match_in(&self, cache_name: &str, request: &Request) -> Result<Option<Response>> {
    self.inner.match_in(cache_name, request)
  }
  fn match_any(&self, request: &Request) -> Result<Option<Response>> {
    self.inner.match_any(request)
  }
  fn entries(&self, cache_name: &str) -> Result<Vec<EntrySummary>> {
    self.inner.entries(cache_name)
  }
}

impl SyncQueue for FaultyStorage {
  fn enqueue(&self, tag: &str, payload: &serde_json::Value) -> Result<i64> {
    self.inner.enqueue(tag, payload)
  }
  fn pending(&self, tag: &str) -> Result<Vec<QueuedSubmission>> {
    self.inner.pending(tag)
  }
  fn remove(&self, id: i64) -> Result<()> {
    if self.unremovable == Some(id) {
      return Err(eyre!("database is locked"));
    }
    self.inner.remove(id)
  }
}

async fn activated_with(
  config: &Config,
  storage: Arc<FaultyStorage>,
  network: Arc<StubNetwork>,
) -> (TestWorker<FaultyStorage>, EventOutcome) {
  let mut worker = ServiceWorker::new(config, storage, network);
  worker.dispatch(Event::Install).await.unwrap();
  let outcome = worker.dispatch(Event::Activate).await.unwrap();
  (worker, outcome)
}

#[tokio::test]
async fn test_failed_delete_does_not_stop_activation() {
  let inner = MemoryStorage::new();
  let old = basic("old");
  inner.put("static-v0", &Request::get(url("/index.html")), &old).unwrap();
  inner.put("dynamic-v0", &Request::get(url("/assets/app.js")), &old).unwrap();
  let storage = Arc::new(FaultyStorage {
    inner,
    undeletable: Some("static-v0".to_string()),
    ..FaultyStorage::default()
  });

  let config = config(&["/index.html"]);
  let (worker, outcome) = activated_with(&config, storage.clone(), Arc::new(site())).await;

  assert_eq!(worker.state(), WorkerState::Activated);
  assert!(worker.claimed_clients());
  match outcome {
    EventOutcome::Activated { purged } => assert_eq!(purged, vec!["dynamic-v0"]),
    other => panic!("unexpected outcome {:?}", other),
  }
  assert_eq!(storage.keys().unwrap(), vec!["static-v0", "static-v1"]);
}

#[tokio::test]
async fn test_slow_cache_write_does_not_delay_response() {
  let delay = Duration::from_millis(500);
  let storage = Arc::new(FaultyStorage {
    put_delay: Some(delay),
    ..FaultyStorage::default()
  });
  let config = config(&["/index.html"]);
  let (mut worker, _) = activated_with(&config, storage.clone(), Arc::new(site())).await;

  let started = Instant::now();
  let served = fetch(&mut worker, Request::get(url("/assets/app.js"))).await;
  assert!(started.elapsed() < delay);
  assert_eq!(served.source, ResponseSource::Network);
  assert!(!storage.has("dynamic-v1").unwrap());

  worker.settle().await;
  let stored = storage
    .match_in("dynamic-v1", &Request::get(url("/assets/app.js")))
    .unwrap();
  assert_eq!(stored, Some(served.response));
}

#[tokio::test]
async fn test_sync_continues_after_dequeue_failure() {
  let inner = MemoryStorage::new();
  let first = inner
    .enqueue(CONTACT_FORM_TAG, &serde_json::json!({"email": "a@b.c"}))
    .unwrap();
  inner
    .enqueue(CONTACT_FORM_TAG, &serde_json::json!({"email": "d@e.f"}))
    .unwrap();
  let storage = Arc::new(FaultyStorage {
    inner,
    unremovable: Some(first),
    ..FaultyStorage::default()
  });
  let network = Arc::new(site().route(&abs("/api/contact"), basic("thanks")));
  let config = config(&["/index.html"]);
  let (mut worker, _) = activated_with(&config, storage.clone(), network.clone()).await;

  let outcome = worker
    .dispatch(Event::Sync {
      tag: CONTACT_FORM_TAG.to_string(),
    })
    .await
    .unwrap();

  assert!(matches!(
    outcome,
    EventOutcome::Synced {
      submitted: 2,
      remaining: 1
    }
  ));
  assert_eq!(network.call_count(&abs("/api/contact")), 2);
  let pending = storage.pending(CONTACT_FORM_TAG).unwrap();
  assert_eq!(pending.len(), 1);
  assert_eq!(pending[0].id, first);
}
