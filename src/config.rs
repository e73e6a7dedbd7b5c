use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::shell::ShellSettings;
use crate::store::StoreFallback;
use crate::sync::DEFAULT_MAX_RETRIES;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub server: ServerConfig,
  #[serde(default)]
  pub sync: SyncConfig,
  #[serde(default)]
  pub store: StoreConfig,
  #[serde(default)]
  pub shell: ShellConfig,
  #[serde(default)]
  pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
  /// Base URL that request paths like `/api/fences` are resolved against
  pub base_url: String,
  /// Lightweight endpoint used by the connectivity probe
  pub health_path: String,
  /// Upper bound for any single request, replay included
  pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      base_url: "http://localhost:3000".to_string(),
      health_path: "/api/health".to_string(),
      request_timeout_secs: 30,
    }
  }
}

impl ServerConfig {
  pub fn request_timeout(&self) -> Duration {
    Duration::from_secs(self.request_timeout_secs.max(1))
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
  /// Failed replay attempts before a queued mutation is dropped
  pub max_retries: u32,
  pub probe_timeout_ms: u64,
  /// How often `watch` re-checks connectivity
  pub probe_interval_secs: u64,
  /// Connectivity belief before the first probe
  pub assume_online: bool,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      max_retries: DEFAULT_MAX_RETRIES,
      probe_timeout_ms: 3000,
      probe_interval_secs: 30,
      assume_online: true,
    }
  }
}

impl SyncConfig {
  pub fn probe_timeout(&self) -> Duration {
    Duration::from_millis(self.probe_timeout_ms)
  }

  pub fn probe_interval(&self) -> Duration {
    Duration::from_secs(self.probe_interval_secs.max(1))
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
  /// SQLite file (default: $XDG_DATA_HOME/ghs-sync/sync.db)
  pub path: Option<PathBuf>,
  /// What to do when the database cannot be opened: fail or memory
  pub fallback: StoreFallback,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
  /// Cache generation; bump to invalidate previously installed assets
  pub generation: String,
  pub precache: Vec<String>,
  /// Path prefixes of immutable, content-hashed assets (served cache-first)
  pub static_prefixes: Vec<String>,
  /// Page served for offline navigations that have no cached copy
  pub offline_page: String,
}

impl Default for ShellConfig {
  fn default() -> Self {
    Self {
      generation: "ghs-hinder-v1".to_string(),
      precache: vec!["/".into(), "/login".into(), "/manifest.json".into()],
      static_prefixes: vec!["/_next/static/".into()],
      offline_page: "/".to_string(),
    }
  }
}

impl From<&ShellConfig> for ShellSettings {
  fn from(c: &ShellConfig) -> Self {
    ShellSettings {
      generation: c.generation.clone(),
      precache: c.precache.clone(),
      static_prefixes: c.static_prefixes.clone(),
      offline_page: c.offline_page.clone(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
  /// Filter used when RUST_LOG is not set
  pub level: String,
  /// Log directory (default: $XDG_DATA_HOME/ghs-sync/logs)
  pub dir: Option<PathBuf>,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: "info".to_string(),
      dir: None,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./ghs-sync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/ghs-sync/config.yaml
  ///
  /// With no file anywhere the defaults are used. `GHS_SYNC_URL` overrides
  /// the server base URL either way.
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

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Config::default(),
    };

    if let Ok(url) = std::env::var("GHS_SYNC_URL") {
      config.server.base_url = url;
    }

    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("ghs-sync.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("ghs-sync").join("config.yaml");
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

  fn parse(contents: &str) -> std::result::Result<Self, serde_yaml::Error> {
    serde_yaml::from_str(contents)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_partial_config_uses_defaults() {
    let config = Config::parse(
      r#"
server:
  base_url: https://hinder.example.se
sync:
  max_retries: 5
store:
  fallback: memory
"#,
    )
    .unwrap();

    assert_eq!(config.server.base_url, "https://hinder.example.se");
    assert_eq!(config.server.health_path, "/api/health");
    assert_eq!(config.sync.max_retries, 5);
    assert_eq!(config.sync.probe_timeout(), Duration::from_secs(3));
    assert!(config.sync.assume_online);
    assert_eq!(config.store.fallback, StoreFallback::Memory);
    assert_eq!(config.shell.generation, "ghs-hinder-v1");
  }

  #[test]
  fn test_empty_document_is_default() {
    let config = Config::parse("{}").unwrap();
    assert_eq!(config.sync.max_retries, 3);
    assert_eq!(config.store.fallback, StoreFallback::Fail);
    assert_eq!(config.log.level, "info");
  }

  #[test]
  fn test_unknown_fallback_rejected() {
    assert!(Config::parse("store:\n  fallback: sometimes\n").is_err());
  }

  #[test]
  fn test_missing_explicit_path_is_error() {
    assert!(Config::load(Some(Path::new("/definitely/not/here.yaml"))).is_err());
  }
}
