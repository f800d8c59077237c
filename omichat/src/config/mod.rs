//! Configuration system for the OMI Chat client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/omichat/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use omichat_proto::message::MAX_USERNAME_LEN;
use omichat_proto::snapshot::SNAPSHOT_MESSAGE_LIMIT;

use crate::chat::connection::DEFAULT_MAX_RETRIES;
use crate::chat::history::DEFAULT_HISTORY_CAPACITY;
use crate::chat::presence::DEFAULT_PRESENCE_KEEP;
use crate::session::{DEFAULT_CLIENT_VERSION, DEFAULT_SESSION_ID, SessionConfig};

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// The store endpoint is not a valid URL.
    #[error("invalid endpoint {value:?}: {source}")]
    InvalidEndpoint {
        /// The rejected value.
        value: String,
        /// Parse failure.
        source: url::ParseError,
    },

    /// A value is out of range.
    #[error("invalid value for {field}: {reason}")]
    InvalidValue {
        /// Config key.
        field: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    remote: RemoteFileConfig,
    sync: SyncFileConfig,
    storage: StorageFileConfig,
    ui: UiFileConfig,
}

/// `[remote]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct RemoteFileConfig {
    endpoint: Option<String>,
    request_timeout_secs: Option<u64>,
    session_id: Option<String>,
    client_version: Option<String>,
}

/// `[sync]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct SyncFileConfig {
    poll_interval_ms: Option<u64>,
    max_retries: Option<u32>,
    prune_interval_secs: Option<u64>,
    presence_keep: Option<usize>,
    history_capacity: Option<usize>,
}

/// `[storage]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct StorageFileConfig {
    data_dir: Option<PathBuf>,
    export_dir: Option<PathBuf>,
    snapshot_limit: Option<usize>,
}

/// `[ui]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct UiFileConfig {
    user: Option<String>,
    poll_timeout_ms: Option<u64>,
    timestamp_format: Option<String>,
    max_username_len: Option<usize>,
    channel_capacity: Option<usize>,
}

// ---------------------------------------------------------------------------
// Resolved configuration (concrete types, all fields populated)
// ---------------------------------------------------------------------------

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    // -- Remote --
    /// Remote message store endpoint. `None` runs the offline demo store.
    pub endpoint: Option<Url>,
    /// Timeout for a single HTTP request.
    pub request_timeout: Duration,
    /// Session identifier sent with writes.
    pub session_id: String,
    /// Client version sent with writes.
    pub client_version: String,

    // -- Sync --
    /// Delay between automatic polls.
    pub poll_interval: Duration,
    /// Consecutive failed polls before the sync loop halts.
    pub max_retries: u32,
    /// Delay between presence prunes.
    pub prune_interval: Duration,
    /// Non-self senders kept by pruning.
    pub presence_keep: usize,
    /// Maximum local history length.
    pub history_capacity: usize,

    // -- Storage --
    /// Directory for persisted state. `None` uses the platform data dir.
    pub data_dir: Option<PathBuf>,
    /// Directory for exports.
    pub export_dir: PathBuf,
    /// Maximum history entries persisted in a snapshot.
    pub snapshot_limit: usize,

    // -- UI --
    /// Username to log in as without prompting.
    pub user: Option<String>,
    /// Poll timeout for the TUI event loop.
    pub poll_timeout: Duration,
    /// Timestamp display format string (chrono).
    pub timestamp_format: String,
    /// Maximum username length in characters.
    pub max_username_len: usize,
    /// Channel capacity for command/event mpsc channels.
    pub channel_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            request_timeout: Duration::from_secs(10),
            session_id: DEFAULT_SESSION_ID.to_string(),
            client_version: DEFAULT_CLIENT_VERSION.to_string(),
            poll_interval: Duration::from_secs(2),
            max_retries: DEFAULT_MAX_RETRIES,
            prune_interval: Duration::from_secs(60),
            presence_keep: DEFAULT_PRESENCE_KEEP,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            data_dir: None,
            export_dir: PathBuf::from("."),
            snapshot_limit: SNAPSHOT_MESSAGE_LIMIT,
            user: None,
            poll_timeout: Duration::from_millis(50),
            timestamp_format: "%H:%M".to_string(),
            max_username_len: MAX_USERNAME_LEN,
            channel_capacity: 256,
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// CLI args and env vars are parsed via `clap`. If `--config` is given
    /// and the file does not exist, returns an error. If no `--config` is
    /// given, the default path (`~/.config/omichat/config.toml`) is tried
    /// and silently ignored if missing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read
    /// or parsed, if the endpoint is not a URL, or if a value is out of
    /// range.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Self::resolve(cli, &file)
    }

    /// Resolve a `ClientConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default. This is separated from `load()` to
    /// enable unit testing without CLI parsing.
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let endpoint = cli
            .endpoint
            .clone()
            .or_else(|| file.remote.endpoint.clone())
            .filter(|raw| !raw.trim().is_empty())
            .map(|raw| {
                Url::parse(raw.trim())
                    .map_err(|source| ConfigError::InvalidEndpoint { value: raw, source })
            })
            .transpose()?;

        let config = Self {
            endpoint,
            request_timeout: file
                .remote
                .request_timeout_secs
                .map_or(defaults.request_timeout, Duration::from_secs),
            session_id: file
                .remote
                .session_id
                .clone()
                .unwrap_or(defaults.session_id),
            client_version: file
                .remote
                .client_version
                .clone()
                .unwrap_or(defaults.client_version),
            poll_interval: cli
                .poll_interval_ms
                .or(file.sync.poll_interval_ms)
                .map_or(defaults.poll_interval, Duration::from_millis),
            max_retries: file.sync.max_retries.unwrap_or(defaults.max_retries),
            prune_interval: file
                .sync
                .prune_interval_secs
                .map_or(defaults.prune_interval, Duration::from_secs),
            presence_keep: file.sync.presence_keep.unwrap_or(defaults.presence_keep),
            history_capacity: file
                .sync
                .history_capacity
                .unwrap_or(defaults.history_capacity),
            data_dir: cli
                .data_dir
                .clone()
                .or_else(|| file.storage.data_dir.clone()),
            export_dir: cli
                .export_dir
                .clone()
                .or_else(|| file.storage.export_dir.clone())
                .unwrap_or(defaults.export_dir),
            snapshot_limit: file
                .storage
                .snapshot_limit
                .unwrap_or(defaults.snapshot_limit),
            user: cli.user.clone().or_else(|| file.ui.user.clone()),
            poll_timeout: file
                .ui
                .poll_timeout_ms
                .map_or(defaults.poll_timeout, Duration::from_millis),
            timestamp_format: cli
                .timestamp_format
                .clone()
                .or_else(|| file.ui.timestamp_format.clone())
                .unwrap_or(defaults.timestamp_format),
            max_username_len: file
                .ui
                .max_username_len
                .unwrap_or(defaults.max_username_len),
            channel_capacity: file
                .ui
                .channel_capacity
                .unwrap_or(defaults.channel_capacity),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            (self.poll_interval.is_zero(), "poll_interval_ms", "must be positive"),
            (self.prune_interval.is_zero(), "prune_interval_secs", "must be positive"),
            (self.max_retries == 0, "max_retries", "must be at least 1"),
            (self.history_capacity == 0, "history_capacity", "must be at least 1"),
            (self.max_username_len == 0, "max_username_len", "must be at least 1"),
            (self.channel_capacity == 0, "channel_capacity", "must be at least 1"),
        ];
        match checks.into_iter().find(|(bad, _, _)| *bad) {
            Some((_, field, reason)) => Err(ConfigError::InvalidValue { field, reason }),
            None => Ok(()),
        }
    }

    /// Build the [`SessionConfig`] for this configuration.
    #[must_use]
    pub fn to_session_config(&self) -> SessionConfig {
        SessionConfig {
            poll_interval: self.poll_interval,
            max_retries: self.max_retries,
            prune_interval: self.prune_interval,
            presence_keep: self.presence_keep,
            history_capacity: self.history_capacity,
            snapshot_limit: self.snapshot_limit,
            session_id: self.session_id.clone(),
            client_version: self.client_version.clone(),
            max_username_len: self.max_username_len,
            event_buffer: self.channel_capacity,
        }
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Terminal chat client for a polled HTTP message store")]
pub struct CliArgs {
    /// URL of the remote message store. Without one, an offline demo store
    /// is used.
    #[arg(long, env = "OMICHAT_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Username to log in as (skips the login prompt).
    #[arg(long, short, env = "OMICHAT_USER")]
    pub user: Option<String>,

    /// Path to config file (default: `~/.config/omichat/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory for persisted state (default: platform data dir).
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Directory exports are written to (default: current directory).
    #[arg(long)]
    pub export_dir: Option<PathBuf>,

    /// Delay between polls in milliseconds.
    #[arg(long)]
    pub poll_interval_ms: Option<u64>,

    /// Timestamp display format (chrono format string).
    #[arg(long)]
    pub timestamp_format: Option<String>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "OMICHAT_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/omichat.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and missing file
/// is treated as empty config.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(ConfigFile::default());
        };
        config_dir.join("omichat").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
