use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

use crate::cache::CacheNames;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Version tag appended to the cache names; bump it on redeploy
  pub version: String,
  /// Origin the worker is registered for
  pub origin: Url,
  pub mode: RuntimeMode,
  /// Well-known path of the worker script
  pub script_path: String,
  pub scope: String,
  /// Root-relative paths pre-cached at install time
  pub static_assets: Vec<String>,
  /// URL substrings cached on first successful fetch
  pub dynamic_assets: Vec<String>,
  /// Document served for navigations while offline
  pub offline_fallback: String,
  /// Where background sync replays contact form submissions
  pub contact_endpoint: String,
  pub storage: StorageConfig,
  /// Write logs to this file instead of stderr
  pub log_file: Option<PathBuf>,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      version: "v1".to_string(),
      origin: Url::parse("http://localhost:5173/").expect("static URL is valid"),
      mode: RuntimeMode::Production,
      script_path: "/sw.js".to_string(),
      scope: "/".to_string(),
      static_assets: [
        "/",
        "/index.html",
        "/manifest.json",
        "/favicon.svg",
        "/favicon-32x32.png",
        "/favicon-16x16.png",
        "/apple-touch-icon.png",
      ]
      .into_iter()
      .map(String::from)
      .collect(),
      dynamic_assets: [
        "/assets/",
        "https://fonts.googleapis.com/",
        "https://fonts.gstatic.com/",
      ]
      .into_iter()
      .map(String::from)
      .collect(),
      offline_fallback: "/index.html".to_string(),
      contact_endpoint: "/api/contact".to_string(),
      storage: StorageConfig::default(),
      log_file: None,
    }
  }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeMode {
  /// Worker is registered
  #[default]
  Production,
  /// Dev server: registration is skipped
  Development,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
  pub backend: StorageBackend,
  /// Database path (defaults to the user data directory)
  pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
  #[default]
  Sqlite,
  /// Nothing survives the process
  Memory,
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./portfolio-sw.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/portfolio-sw/config.yaml
  ///
  /// Falls back to the built-in defaults when no file is found.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("portfolio-sw.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("portfolio-sw").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    config.validate()?;
    Ok(config)
  }

  fn validate(&self) -> Result<()> {
    if self.version.trim().is_empty() {
      return Err(eyre!("version must not be empty"));
    }
    if !self.origin.scheme().starts_with("http") {
      return Err(eyre!("origin must be an http(s) URL, got {}", self.origin));
    }
    Ok(())
  }

  pub fn cache_names(&self) -> CacheNames {
    CacheNames::for_version(&self.version)
  }

  /// Resolve a root-relative path against the origin.
  pub fn resolve(&self, path: &str) -> Result<Url> {
    self
      .origin
      .join(path)
      .map_err(|e| eyre!("Invalid URL '{}': {}", path, e))
  }
}
