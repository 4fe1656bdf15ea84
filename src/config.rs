//! Configuration loading for gowon-markov.
//!
//! Settings come from an optional TOML file; the binary overlays CLI
//! flags and `GOWON_*` environment variables on top. Every field has a
//! default, so an empty file (or no file) is a valid configuration.
//!
//! ```toml
//! [broker]
//! host = "localhost"
//! port = 1883
//!
//! [corpus]
//! bindings = "quote:quotes.txt,bob:bob.json"
//! data_dir = "/data"
//! default_command = "quote"
//! msg_chance = 0.05
//!
//! [cache]
//! max_entries = 2
//! ttl_secs = 600
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::cache::CacheConfig;
use crate::router::RouterConfig;
use crate::transport::ConnectionConfig;
use crate::{MarkovError, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub cache: CacheSettings,
}

/// Broker connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    /// Broker host (default: localhost).
    #[serde(default = "default_host")]
    pub host: String,
    /// Broker port (default: 1883).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Client id presented to the broker (default: gowon_markov).
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// Topic requests arrive on (default: /gowon/input).
    #[serde(default = "default_input_topic")]
    pub input_topic: String,
    /// Topic replies go to (default: /gowon/output).
    #[serde(default = "default_output_topic")]
    pub output_topic: String,
    /// Connect attempts before giving up (default: 12).
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
    /// Seconds between connect attempts (default: 5).
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
    /// MQTT keep-alive in seconds (default: 30).
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            client_id: default_client_id(),
            input_topic: default_input_topic(),
            output_topic: default_output_topic(),
            connect_attempts: default_connect_attempts(),
            retry_delay_secs: default_retry_delay(),
            keep_alive_secs: default_keep_alive(),
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    "gowon_markov".to_string()
}

fn default_input_topic() -> String {
    crate::transport::connection::DEFAULT_INPUT_TOPIC.to_string()
}

fn default_output_topic() -> String {
    crate::transport::connection::DEFAULT_OUTPUT_TOPIC.to_string()
}

fn default_connect_attempts() -> u32 {
    crate::transport::connection::DEFAULT_CONNECT_ATTEMPTS
}

fn default_retry_delay() -> u64 {
    5
}

fn default_keep_alive() -> u64 {
    30
}

/// Corpus and generation settings.
#[derive(Debug, Clone, Deserialize)]
pub struct CorpusConfig {
    /// Comma-separated `command:path` pairs (default: empty).
    #[serde(default)]
    pub bindings: String,
    /// Root the binding paths are resolved against (default: empty).
    #[serde(default)]
    pub data_dir: PathBuf,
    /// Command whose model answers unmatched messages.
    #[serde(default)]
    pub default_command: Option<String>,
    /// Chance in `[0, 1]` that an unmatched message is answered (default: 0).
    #[serde(default)]
    pub msg_chance: f64,
    /// Generation attempts per reply (default: 100).
    #[serde(default = "default_max_tries")]
    pub max_tries: usize,
    /// Words per chain state for text corpora (default: 2).
    #[serde(default = "default_state_size")]
    pub state_size: usize,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            bindings: String::new(),
            data_dir: PathBuf::new(),
            default_command: None,
            msg_chance: 0.0,
            max_tries: default_max_tries(),
            state_size: default_state_size(),
        }
    }
}

fn default_max_tries() -> usize {
    crate::router::DEFAULT_MAX_TRIES
}

fn default_state_size() -> usize {
    crate::model::markov::DEFAULT_STATE_SIZE
}

/// Model cache settings.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    /// Maximum loaded models (default: 1).
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    /// Seconds a loaded model is kept (default: 60).
    #[serde(default = "default_ttl")]
    pub ttl_secs: u64,
    /// Seconds between expiry sweeps (default: 60).
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            ttl_secs: default_ttl(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_max_entries() -> usize {
    1
}

fn default_ttl() -> u64 {
    60
}

fn default_sweep_interval() -> u64 {
    60
}

/// A command bound to the file its model is loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusBinding {
    pub command: String,
    pub path: PathBuf,
}

impl CorpusBinding {
    pub fn new(command: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            path: path.into(),
        }
    }
}

/// Parse a `command:path,command:path` list, resolving paths against `root`.
///
/// Entries without a `:` are skipped; segments after the second `:` are
/// ignored. An empty command or path, or a command listed twice, is a
/// configuration error.
pub fn parse_bindings(list: &str, root: &Path) -> Result<Vec<CorpusBinding>> {
    let mut seen = HashSet::new();
    let mut bindings = Vec::new();

    for entry in list.split(',') {
        let mut parts = entry.split(':');
        let (Some(command), Some(path)) = (parts.next(), parts.next()) else {
            if !entry.trim().is_empty() {
                warn!(entry, "ignoring corpus entry without a path");
            }
            continue;
        };

        let (command, path) = (command.trim(), path.trim());
        if command.is_empty() || path.is_empty() {
            return Err(MarkovError::Configuration(format!(
                "corpus entry '{entry}' needs both a command and a path"
            )));
        }
        if !seen.insert(command.to_owned()) {
            return Err(MarkovError::Configuration(format!(
                "command '{command}' is bound more than once"
            )));
        }

        bindings.push(CorpusBinding::new(command, root.join(path)));
    }

    Ok(bindings)
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            MarkovError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        Self::from_toml(&content).map_err(|e| {
            MarkovError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
        })
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| MarkovError::Configuration(e.to_string()))
    }

    /// The parsed corpus bindings.
    pub fn bindings(&self) -> Result<Vec<CorpusBinding>> {
        parse_bindings(&self.corpus.bindings, &self.corpus.data_dir)
    }

    /// Check values that cannot be expressed in the types.
    pub fn validate(&self) -> Result<()> {
        let bindings = self.bindings()?;

        if !(0.0..=1.0).contains(&self.corpus.msg_chance) {
            return Err(MarkovError::Configuration(format!(
                "msg_chance must be between 0 and 1, got {}",
                self.corpus.msg_chance
            )));
        }
        if self.corpus.state_size == 0 {
            return Err(MarkovError::Configuration(
                "state_size must be at least 1".into(),
            ));
        }
        if self.cache.sweep_interval_secs == 0 {
            return Err(MarkovError::Configuration(
                "sweep_interval_secs must be at least 1".into(),
            ));
        }
        if let Some(default) = &self.corpus.default_command {
            if !bindings.iter().any(|b| &b.command == default) {
                return Err(MarkovError::Configuration(format!(
                    "default command '{default}' has no corpus binding"
                )));
            }
        }
        Ok(())
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::new()
            .max_entries(self.cache.max_entries)
            .ttl(Duration::from_secs(self.cache.ttl_secs))
            .sweep_interval(Duration::from_secs(self.cache.sweep_interval_secs))
    }

    pub fn router_config(&self) -> RouterConfig {
        let config = RouterConfig::new()
            .msg_chance(self.corpus.msg_chance)
            .max_tries(self.corpus.max_tries);
        match &self.corpus.default_command {
            Some(command) => config.default_command(command.clone()),
            None => config,
        }
    }

    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig::new()
            .input_topic(self.broker.input_topic.clone())
            .output_topic(self.broker.output_topic.clone())
            .max_attempts(self.broker.connect_attempts)
            .retry_delay(Duration::from_secs(self.broker.retry_delay_secs))
    }
}
