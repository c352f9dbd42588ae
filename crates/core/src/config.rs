//! Store configuration via `forest.toml`
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working local-provider store. On first use a commented default
//! `forest.toml` is written; to change settings, edit the file and reopen the
//! store.

use crate::backoff::BackoffPolicy;
use crate::classify::SignatureSet;
use crate::error::{StoreError, StoreResult};
use crate::record::validate_collection_name;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Config file name placed in the store's working directory.
pub const CONFIG_FILE_NAME: &str = "forest.toml";

/// Default collection name
pub const DEFAULT_COLLECTION: &str = "forest_vectors";

/// Which provider backs the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// In-process provider, optionally persisted to a data directory
    #[default]
    Local,
    /// Chroma-compatible HTTP service
    Chroma,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Local => f.write_str("local"),
            ProviderKind::Chroma => f.write_str("chroma"),
        }
    }
}

/// Backend process log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    /// Verbose
    Debug,
    /// Default
    #[default]
    Info,
    /// Warnings and errors only
    Warning,
    /// Errors only
    Error,
}

impl LogLevel {
    /// Level as passed on the backend command line
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARNING" | "WARN" => Ok(LogLevel::Warning),
            "ERROR" => Ok(LogLevel::Error),
            other => Err(StoreError::Config(format!(
                "Invalid log level '{}'. Expected DEBUG, INFO, WARNING or ERROR.",
                other
            ))),
        }
    }
}

/// `[chroma]` section: server-backed provider settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChromaConfig {
    /// Base URL of the Chroma service
    pub url: String,
    /// Per-request timeout in milliseconds
    pub timeout_ms: u64,
    /// Heartbeat interval for the keep-alive task; unset disables it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep_alive_ms: Option<u64>,
}

impl Default for ChromaConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8000".to_string(),
            timeout_ms: 30_000,
            keep_alive_ms: None,
        }
    }
}

impl ChromaConfig {
    /// Request timeout as a `Duration`
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Keep-alive interval, if enabled
    pub fn keep_alive(&self) -> Option<Duration> {
        self.keep_alive_ms.map(Duration::from_millis)
    }
}

/// `[lifecycle]` section: backend process management
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Start the backend process when the store opens
    pub enabled: bool,
    /// Host the backend binds to
    pub host: String,
    /// Port the backend binds to
    pub port: u16,
    /// Backend data directory; defaults to `~/.forest-data/.chromadb`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    /// Program to spawn
    pub command: String,
    /// Argument templates; `{host}`, `{port}`, `{data_dir}` and `{log_level}`
    /// are substituted
    pub args: Vec<String>,
    /// Backend log level
    pub log_level: LogLevel,
    /// Liveness path polled for readiness and health
    pub health_path: String,
    /// Give up on readiness after this long
    pub startup_timeout_ms: u64,
    /// Readiness poll interval
    pub startup_poll_ms: u64,
    /// Periodic health check interval
    pub health_check_interval_ms: u64,
    /// Wait this long after SIGTERM before killing
    pub shutdown_grace_ms: u64,
    /// Timeout for a single health probe
    pub probe_timeout_ms: u64,
    /// Restart on failed health check or unexpected exit
    pub auto_restart: bool,
    /// Delay before an automatic restart
    pub restart_delay_ms: u64,
    /// Startup retry policy
    pub start_retry: BackoffPolicy,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "0.0.0.0".to_string(),
            port: 8000,
            data_dir: None,
            command: "python3".to_string(),
            args: [
                "start-chromadb-server.py",
                "--host",
                "{host}",
                "--port",
                "{port}",
                "--data-dir",
                "{data_dir}",
                "--log-level",
                "{log_level}",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            log_level: LogLevel::Info,
            health_path: "/api/v1/heartbeat".to_string(),
            startup_timeout_ms: 30_000,
            startup_poll_ms: 500,
            health_check_interval_ms: 30_000,
            shutdown_grace_ms: 5_000,
            probe_timeout_ms: 2_000,
            auto_restart: true,
            restart_delay_ms: 2_000,
            start_retry: BackoffPolicy::new()
                .with_max_attempts(3)
                .with_base_delay_ms(1_000)
                .with_max_delay_ms(10_000),
        }
    }
}

impl LifecycleConfig {
    /// Data directory with the home-relative default applied
    pub fn resolved_data_dir(&self) -> PathBuf {
        if let Some(dir) = &self.data_dir {
            return dir.clone();
        }
        let home = std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        home.join(".forest-data").join(".chromadb")
    }

    /// Argument list with templates substituted
    pub fn render_args(&self) -> Vec<String> {
        let data_dir = self.resolved_data_dir();
        let data_dir = data_dir.to_string_lossy();
        let port = self.port.to_string();
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{host}", &self.host)
                    .replace("{port}", &port)
                    .replace("{data_dir}", &data_dir)
                    .replace("{log_level}", self.log_level.as_str())
            })
            .collect()
    }

    /// Host to probe; a wildcard bind address is probed on loopback
    pub fn probe_host(&self) -> &str {
        match self.host.as_str() {
            "0.0.0.0" | "::" | "" => "127.0.0.1",
            host => host,
        }
    }

    /// URL polled for readiness and health
    pub fn health_url(&self) -> String {
        let path = if self.health_path.starts_with('/') {
            self.health_path.clone()
        } else {
            format!("/{}", self.health_path)
        };
        format!("http://{}:{}{}", self.probe_host(), self.port, path)
    }

    /// Startup timeout as a `Duration`
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    /// Readiness poll interval as a `Duration`
    pub fn startup_poll(&self) -> Duration {
        Duration::from_millis(self.startup_poll_ms)
    }

    /// Health check interval as a `Duration`
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }

    /// Shutdown grace period as a `Duration`
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Single probe timeout as a `Duration`
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Restart delay as a `Duration`
    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }
}

/// `[recovery]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Reset the collection on corruption-classified errors
    pub enabled: bool,
    /// Additional corruption signatures (case-insensitive substrings)
    pub extra_signatures: Vec<String>,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            extra_signatures: Vec::new(),
        }
    }
}

impl RecoveryConfig {
    /// Signature set used to classify backend failures
    pub fn signatures(&self) -> SignatureSet {
        SignatureSet::default().with_corruption_signatures(&self.extra_signatures)
    }
}

/// Store configuration loaded from `forest.toml`.
///
/// # Example
///
/// ```toml
/// provider = "chroma"
/// collection = "forest_vectors"
///
/// [chroma]
/// url = "http://localhost:8000"
///
/// [lifecycle]
/// enabled = true
/// port = 8000
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Provider backing the store
    pub provider: ProviderKind,
    /// Active collection name
    pub collection: String,
    /// Persistence directory for the local provider; unset keeps it in memory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    /// Maximum number of cached query results (0 disables the cache)
    pub query_cache_capacity: usize,
    /// Server-backed provider settings
    pub chroma: ChromaConfig,
    /// Reconnect backoff
    pub reconnect: BackoffPolicy,
    /// Backend process management
    pub lifecycle: LifecycleConfig,
    /// Corruption recovery
    pub recovery: RecoveryConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Local,
            collection: DEFAULT_COLLECTION.to_string(),
            data_dir: None,
            query_cache_capacity: 256,
            chroma: ChromaConfig::default(),
            reconnect: BackoffPolicy::default(),
            lifecycle: LifecycleConfig::default(),
            recovery: RecoveryConfig::default(),
        }
    }
}

impl StoreConfig {
    /// In-memory local provider config
    pub fn local() -> Self {
        Self::default()
    }

    /// Local provider persisted under `dir`
    pub fn local_at(dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: Some(dir.into()),
            ..Self::default()
        }
    }

    /// Chroma provider at `url`
    pub fn chroma(url: impl Into<String>) -> Self {
        Self {
            provider: ProviderKind::Chroma,
            chroma: ChromaConfig {
                url: url.into(),
                ..ChromaConfig::default()
            },
            ..Self::default()
        }
    }

    /// Set the collection name
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    /// Set the reconnect policy
    pub fn with_reconnect(mut self, policy: BackoffPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Check values that serde cannot.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Config` naming the first invalid setting.
    pub fn validate(&self) -> StoreResult<()> {
        validate_collection_name(&self.collection)
            .map_err(|e| StoreError::Config(format!("collection: {}", e)))?;

        if self.provider == ProviderKind::Chroma {
            let url = self.chroma.url.as_str();
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(StoreError::Config(format!(
                    "chroma.url '{}' must start with http:// or https://",
                    url
                )));
            }
            if self.chroma.timeout_ms == 0 {
                return Err(StoreError::Config(
                    "chroma.timeout_ms must be greater than 0".to_string(),
                ));
            }
            if self.chroma.keep_alive_ms == Some(0) {
                return Err(StoreError::Config(
                    "chroma.keep_alive_ms must be greater than 0 when set".to_string(),
                ));
            }
        }

        if self.reconnect.base_delay_ms > self.reconnect.max_delay_ms {
            return Err(StoreError::Config(
                "reconnect.base_delay_ms cannot exceed reconnect.max_delay_ms".to_string(),
            ));
        }

        let lc = &self.lifecycle;
        if lc.enabled {
            if lc.command.trim().is_empty() {
                return Err(StoreError::Config(
                    "lifecycle.command cannot be empty".to_string(),
                ));
            }
            if lc.port == 0 {
                return Err(StoreError::Config(
                    "lifecycle.port must be greater than 0".to_string(),
                ));
            }
            if lc.startup_poll_ms == 0 || lc.health_check_interval_ms == 0 {
                return Err(StoreError::Config(
                    "lifecycle poll and health intervals must be greater than 0".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Forest knowledge store configuration
#
# Provider: "local" (default, in-process) or "chroma" (HTTP service)
provider = "local"
collection = "forest_vectors"

# Local provider persistence directory. Unset keeps vectors in memory only.
# data_dir = "/var/lib/forest/vectors"

# Cached query results, cleared on every write (0 disables)
query_cache_capacity = 256

[chroma]
url = "http://localhost:8000"
timeout_ms = 30000
# keep_alive_ms = 60000

# Reconnect backoff: base_delay_ms * 2^(attempt - 1), capped at max_delay_ms
[reconnect]
max_attempts = 5
base_delay_ms = 1000
max_delay_ms = 30000

# Backend process management (chroma provider only)
[lifecycle]
enabled = false
host = "0.0.0.0"
port = 8000
# data_dir = "~/.forest-data/.chromadb"
command = "python3"
args = ["start-chromadb-server.py", "--host", "{host}", "--port", "{port}", "--data-dir", "{data_dir}", "--log-level", "{log_level}"]
log_level = "INFO"
health_path = "/api/v1/heartbeat"
startup_timeout_ms = 30000
startup_poll_ms = 500
health_check_interval_ms = 30000
shutdown_grace_ms = 5000
probe_timeout_ms = 2000
auto_restart = true
restart_delay_ms = 2000

[lifecycle.start_retry]
max_attempts = 3
base_delay_ms = 1000
max_delay_ms = 10000

# Corruption recovery: reset the collection when a backend error matches a
# corruption signature. Extra signatures are matched case-insensitively.
[recovery]
enabled = true
extra_signatures = []
"#
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> StoreResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            StoreError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config = Self::from_toml(&content).map_err(|e| match e {
            StoreError::Config(msg) => {
                StoreError::Config(format!("'{}': {}", path.display(), msg))
            }
            other => other,
        })?;
        tracing::debug!(target: "forest::store", path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Parse and validate config text.
    pub fn from_toml(content: &str) -> StoreResult<Self> {
        let config: StoreConfig = toml::from_str(content)
            .map_err(|e| StoreError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> StoreResult<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                StoreError::Config(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> StoreResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| StoreError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            StoreError::Config(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}
