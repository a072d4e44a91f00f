//! Decisions about which requests the worker handles and where responses go.

use reqwest::Method;

use crate::http::{Request, Response, ResponseType};

/// Names of the two caches owned by one worker version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheNames {
  pub static_name: String,
  pub dynamic_name: String,
}

impl CacheNames {
  /// `static-<version>` and `dynamic-<version>`.
  pub fn for_version(version: &str) -> Self {
    Self {
      static_name: format!("static-{}", version),
      dynamic_name: format!("dynamic-{}", version),
    }
  }

  /// Whether a cache survives activation of this version.
  pub fn is_current(&self, cache_name: &str) -> bool {
    cache_name == self.static_name || cache_name == self.dynamic_name
  }
}

/// Cache policy for one worker version.
#[derive(Debug, Clone)]
pub struct CachePolicy {
  names: CacheNames,
  /// URL substrings eligible for runtime caching
  dynamic_matchers: Vec<String>,
}

impl CachePolicy {
  pub fn new(names: CacheNames, dynamic_matchers: Vec<String>) -> Self {
    Self {
      names,
      dynamic_matchers,
    }
  }

  pub fn names(&self) -> &CacheNames {
    &self.names
  }

  /// Only GET requests over http(s) are intercepted; the rest go straight
  /// to the network.
  pub fn should_intercept(&self, request: &Request) -> bool {
    request.method == Method::GET && request.is_http()
  }

  /// Only complete same-origin responses may be persisted.
  pub fn is_cacheable(&self, response: &Response) -> bool {
    response.status == 200 && response.kind == ResponseType::Basic
  }

  /// The cache a network response for `request` should be written to, if any.
  pub fn target_cache(&self, request: &Request) -> Option<&str> {
    let url = request.url.as_str();
    self
      .dynamic_matchers
      .iter()
      .any(|m| url.contains(m.as_str()))
      .then_some(self.names.dynamic_name.as_str())
  }

  /// Caches left over from other versions.
  pub fn stale_caches(&self, existing: &[String]) -> Vec<String> {
    existing
      .iter()
      .filter(|name| !self.names.is_current(name))
      .cloned()
      .collect()
  }
}
