//! TOML configuration.
//!
//! Every section is optional; a missing file section falls back to the
//! defaults below, so an empty config file is valid.
//!
//! ```toml
//! [db]
//! path = "./data/nsync.sqlite"
//!
//! [server]
//! bind = "127.0.0.1:7340"
//!
//! [client]
//! transport = "http"            # or "local" to talk to the SQLite file directly
//! base_url = "http://127.0.0.1:7340"
//! timeout_secs = 10
//! max_retries = 0
//! pointer_path = "./data/pointers.json"
//!
//! [sync]
//! debounce_ms = 500
//! watch_poll_ms = 250
//!
//! [extractor]
//! transient_attributes = ["data-id", "data-node-id", "data-block-id"]
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use note_sync_core::extract::{ContentExtractor, DEFAULT_TRANSIENT_ATTRIBUTES};

/// Upper bound for `client.max_retries`; backoff doubles per attempt.
pub const MAX_RETRIES_CAP: u32 = 5;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub extractor: ExtractorConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/nsync.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7340".to_string()
}

/// How the client reaches the block store.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// `PUT /blocks` and friends against `client.base_url`.
    #[default]
    Http,
    /// Direct access to the SQLite database at `db.path`.
    Local,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClientConfig {
    #[serde(default)]
    pub transport: Transport,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_pointer_path")]
    pub pointer_path: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            transport: Transport::default(),
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            max_retries: 0,
            pointer_path: default_pointer_path(),
        }
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:7340".to_string()
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_pointer_path() -> PathBuf {
    PathBuf::from("./data/pointers.json")
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    /// Quiescence window before a change is saved.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Poll interval of `nsync watch`.
    #[serde(default = "default_watch_poll_ms")]
    pub watch_poll_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            watch_poll_ms: default_watch_poll_ms(),
        }
    }
}

impl SyncConfig {
    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn watch_interval(&self) -> Duration {
        Duration::from_millis(self.watch_poll_ms)
    }
}

fn default_debounce_ms() -> u64 {
    500
}
fn default_watch_poll_ms() -> u64 {
    250
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractorConfig {
    #[serde(default = "default_transient_attributes")]
    pub transient_attributes: Vec<String>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            transient_attributes: default_transient_attributes(),
        }
    }
}

impl ExtractorConfig {
    pub fn build(&self) -> ContentExtractor {
        ContentExtractor::new(self.transient_attributes.iter().cloned())
    }
}

fn default_transient_attributes() -> Vec<String> {
    DEFAULT_TRANSIENT_ATTRIBUTES
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Reads, parses, and validates a config file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parses and validates config text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.sync.debounce_ms == 0 {
        anyhow::bail!("sync.debounce_ms must be > 0");
    }
    if config.sync.watch_poll_ms == 0 {
        anyhow::bail!("sync.watch_poll_ms must be > 0");
    }
    if config.client.timeout_secs == 0 {
        anyhow::bail!("client.timeout_secs must be > 0");
    }
    if config.client.max_retries > MAX_RETRIES_CAP {
        anyhow::bail!("client.max_retries must be <= {}", MAX_RETRIES_CAP);
    }

    if config.client.transport == Transport::Http {
        let url = reqwest::Url::parse(&config.client.base_url)
            .with_context(|| format!("client.base_url is not a URL: {}", config.client.base_url))?;
        match url.scheme() {
            "http" | "https" => {}
            other => anyhow::bail!("client.base_url must be http(s), got '{}'", other),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.sync.debounce_ms, 500);
        assert_eq!(config.client.transport, Transport::Http);
        assert_eq!(config.client.max_retries, 0);
        assert_eq!(config.server.bind, "127.0.0.1:7340");
        assert_eq!(config.extractor.transient_attributes.len(), 3);
    }

    #[test]
    fn test_local_transport_skips_url_check() {
        let config = parse_config(
            r#"
            [client]
            transport = "local"
            base_url = "not a url"
            "#,
        )
        .unwrap();
        assert_eq!(config.client.transport, Transport::Local);
    }

    #[test]
    fn test_rejects_zero_debounce() {
        let err = parse_config("[sync]\ndebounce_ms = 0\n").unwrap_err();
        assert!(err.to_string().contains("debounce_ms"));
    }

    #[test]
    fn test_rejects_bad_scheme() {
        let err = parse_config("[client]\nbase_url = \"ftp://x\"\n").unwrap_err();
        assert!(err.to_string().contains("http"));
    }

    #[test]
    fn test_rejects_excessive_retries() {
        assert!(parse_config("[client]\nmax_retries = 9\n").is_err());
    }

    #[test]
    fn test_unknown_transport_fails_to_parse() {
        assert!(parse_config("[client]\ntransport = \"carrier-pigeon\"\n").is_err());
    }
}
