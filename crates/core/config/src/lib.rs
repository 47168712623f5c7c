use std::time::Duration;
use std::{env, fs};

use cached::proc_macro::cached;
use futures_locks::RwLock;
use once_cell::sync::Lazy;
use serde::Deserialize;
use tracing::warn;

#[derive(Deserialize, Debug, Clone)]
pub struct Database {
  pub postgres: String,
}

impl Default for Database {
  fn default() -> Self {
    Self { postgres: "postgres://postgres@localhost:5432/fold-finance".to_string() }
  }
}

#[derive(Deserialize, Debug, Clone)]
pub struct Search {
  /// Base URL of the Elasticsearch node
  pub host: String,
  /// Optional API key sent as a bearer token; empty disables auth
  pub api_key: String,
  /// Index holding the project documents
  pub index_projects: String,
}

impl Default for Search {
  fn default() -> Self {
    Self {
      host: "http://localhost:9200".to_string(),
      api_key: String::new(),
      index_projects: "projects_index".to_string(),
    }
  }
}

#[derive(Deserialize, Debug, Clone)]
pub struct Hosts {
  pub sync_metrics: String,
}

impl Default for Hosts {
  fn default() -> Self {
    Self { sync_metrics: "0.0.0.0:9464".to_string() }
  }
}

#[derive(Deserialize, Debug, Clone)]
pub struct Worker {
  /// Notification channel the relational triggers publish on
  pub channel: String,
  /// Attempts for an attach event whose target document is not indexed yet
  pub attach_max_retries: u32,
  /// Initial backoff between those attempts; doubles per try
  pub attach_backoff_ms: u64,
  /// Install the pg_notify trigger functions at startup
  pub install_triggers: bool,
}

impl Default for Worker {
  fn default() -> Self {
    Self {
      channel: "data_changes".to_string(),
      attach_max_retries: 3,
      attach_backoff_ms: 100,
      install_triggers: true,
    }
  }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct Settings {
  #[serde(default)]
  pub database: Database,
  #[serde(default)]
  pub search: Search,
  #[serde(default)]
  pub hosts: Hosts,
  #[serde(default)]
  pub worker: Worker,
  #[serde(default)]
  pub production: bool,
}

impl Settings {
  pub fn preflight_checks(&self) {
    if self.search.host.is_empty() {
      warn!("No search host specified! The sync worker has nothing to write to.");
    }

    if self.search.api_key.is_empty() && self.production {
      warn!("No search API key specified in production mode.");
    }
  }
}

/// Configuration builder
static CONFIG_BUILDER: Lazy<RwLock<Settings>> = Lazy::new(|| {
  RwLock::new({
    let env_mode = env::var("ENV").unwrap_or("dev".to_string());
    let path = format!("/foldsync.{}.yaml", env_mode);
    let mut settings = Settings::default();

    if std::path::Path::new(&path).exists() {
      let settings_str = fs::read_to_string(path).expect("Should read config file");
      settings = serde_yaml::from_str(&settings_str).expect("Should deserialize config file");
    }
    settings
  })
});

pub async fn read() -> Settings {
  CONFIG_BUILDER.read().await.clone()
}

#[cached(time = 300)]
pub async fn config() -> Settings {
  let mut config = read().await;

  // auto-detect production nodes
  if config.search.host.contains("https") {
    config.production = true;
  }

  config
}
