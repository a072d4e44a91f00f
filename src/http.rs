//! Request and response snapshots exchanged between the page, the worker,
//! the cache backend and the network.

use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

/// What the page intends to do with a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
  /// Full-page navigation
  Document,
  Script,
  Style,
  Image,
  Font,
  Manifest,
  /// fetch() / XHR from script
  #[default]
  Empty,
}

/// Response type as seen by the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
  /// Same-origin, fully readable
  Basic,
  /// Cross-origin with CORS headers
  Cors,
  /// Cross-origin without CORS, body unreadable
  Opaque,
  /// Synthesized locally
  Default,
}

impl ResponseType {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Basic => "basic",
      Self::Cors => "cors",
      Self::Opaque => "opaque",
      Self::Default => "default",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "basic" => Ok(Self::Basic),
      "cors" => Ok(Self::Cors),
      "opaque" => Ok(Self::Opaque),
      "default" => Ok(Self::Default),
      other => Err(eyre!("Unknown response type '{}'", other)),
    }
  }
}

/// An intercepted request.
#[derive(Debug, Clone)]
pub struct Request {
  pub method: Method,
  pub url: Url,
  pub destination: Destination,
  pub headers: Vec<(String, String)>,
  pub body: Option<Vec<u8>>,
}

impl Request {
  /// A plain GET for `url`.
  pub fn get(url: Url) -> Self {
    Self {
      method: Method::GET,
      url,
      destination: Destination::Empty,
      headers: Vec::new(),
      body: None,
    }
  }

  /// A GET that navigates the page to `url`.
  pub fn navigate(url: Url) -> Self {
    Self {
      destination: Destination::Document,
      ..Self::get(url)
    }
  }

  /// A POST carrying a JSON body.
  pub fn post_json(url: Url, body: &serde_json::Value) -> Result<Self> {
    let body = serde_json::to_vec(body).map_err(|e| eyre!("Failed to encode body: {}", e))?;
    Ok(Self {
      method: Method::POST,
      url,
      destination: Destination::Empty,
      headers: vec![("Content-Type".to_string(), "application/json".to_string())],
      body: Some(body),
    })
  }

  /// Whether the scheme is http or https.
  pub fn is_http(&self) -> bool {
    self.url.scheme().starts_with("http")
  }

  /// The URL caches see: fragments never take part in matching.
  pub fn cache_url(&self) -> Url {
    let mut url = self.url.clone();
    url.set_fragment(None);
    url
  }

  /// Stable identity of this request for cache lookups (method + URL).
  pub fn cache_key(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.method.as_str().as_bytes());
    hasher.update(b" ");
    hasher.update(self.cache_url().as_str().as_bytes());
    hex::encode(hasher.finalize())
  }
}

/// A response snapshot. `Clone` yields an independent copy, so a response can
/// be handed to the page while its clone is persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
  pub status: u16,
  pub status_text: String,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
  pub kind: ResponseType,
}

impl Response {
  pub fn new(status: u16, kind: ResponseType, body: impl Into<Vec<u8>>) -> Self {
    Self {
      status,
      status_text: reason_phrase(status).to_string(),
      headers: Vec::new(),
      body: body.into(),
      kind,
    }
  }

  /// Placeholder returned when neither the cache nor the network can answer.
  pub fn request_timeout() -> Self {
    Self {
      status: 408,
      status_text: "Request timeout".to_string(),
      headers: Vec::new(),
      body: Vec::new(),
      kind: ResponseType::Default,
    }
  }

  /// Status in the 200-299 range.
  pub fn ok(&self) -> bool {
    (200..300).contains(&self.status)
  }

  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(n, _)| n.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }
}

fn reason_phrase(status: u16) -> &'static str {
  reqwest::StatusCode::from_u16(status)
    .ok()
    .and_then(|s| s.canonical_reason())
    .unwrap_or("")
}
