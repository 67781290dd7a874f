//! Configuration for the `lentil` command-line client.

use std::path::Path;

use lentil_core::{ClientConfig, DEFAULT_TUBE};
use serde::{Deserialize, Serialize};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Which server to talk to.
    pub server: ServerConfig,
    /// Connection settings passed to the core client.
    pub client: ClientConfig,
    /// Values for `put` and friends when not given on the command line.
    pub defaults: JobDefaults,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Server address.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// `host:port` of the beanstalkd instance.
    pub address: String,
}

/// Job parameters used when a flag is omitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobDefaults {
    /// Tube for `put`, `peek-buried`, `peek-delayed` and `kick`.
    pub tube: String,
    pub priority: u32,
    /// Seconds before a new job becomes ready.
    pub delay: u32,
    /// Time to run in seconds.
    pub ttr: u32,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    /// `trace` also logs every protocol line.
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:11300".into(),
        }
    }
}

impl Default for JobDefaults {
    fn default() -> Self {
        Self {
            tube: DEFAULT_TUBE.into(),
            priority: 0,
            delay: 0,
            ttr: 360,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl CliConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::parse(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::debug!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// The default configuration as TOML (for bootstrapping).
    pub fn default_toml() -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(&Self::default())
    }
}

// ── Tests ────────────────────────────────────────────────────────
