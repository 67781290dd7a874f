//! Client configuration.
//!
//! Plain serde structs so front ends can embed them in their own config
//! files. Every field has a default, so an empty table is a valid config.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::codec::DEFAULT_MAX_BODY_SIZE;

/// Settings for a single connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Initial capacity of the read buffer in bytes. Larger bodies grow
    /// the buffer; this only avoids reallocations for typical replies.
    pub read_buffer_capacity: usize,
    /// Largest payload a reply may announce, in bytes. Replies declaring
    /// more are rejected without reading the payload.
    pub max_body_size: usize,
    /// Redial behaviour of [`ReconnectingClient`](crate::ReconnectingClient).
    pub reconnect: ReconnectConfig,
}

/// Redial loop settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Pause between dial attempts, in milliseconds.
    pub backoff_ms: u64,
    /// Give up after this many milliseconds. Unset means retry forever.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_elapsed_ms: Option<u64>,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            read_buffer_capacity: 64 * 1024,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            backoff_ms: 1000,
            max_elapsed_ms: None,
        }
    }
}

impl ReconnectConfig {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    pub fn max_elapsed(&self) -> Option<Duration> {
        self.max_elapsed_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = ClientConfig::default();
        assert_eq!(cfg.read_buffer_capacity, 65536);
        assert_eq!(cfg.max_body_size, 16 * 1024 * 1024);
        assert_eq!(cfg.reconnect.backoff(), Duration::from_secs(1));
        assert_eq!(cfg.reconnect.max_elapsed(), None);
    }

    #[test]
    fn partial_table_keeps_defaults() {
        let cfg: ClientConfig = toml::from_str(
            r#"
            [reconnect]
            max_elapsed_ms = 30000
            "#,
        )
        .unwrap();
        assert_eq!(cfg.read_buffer_capacity, 65536);
        assert_eq!(cfg.reconnect.backoff_ms, 1000);
        assert_eq!(cfg.reconnect.max_elapsed(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn unbounded_redial_is_omitted_when_serialized() {
        let text = toml::to_string_pretty(&ClientConfig::default()).unwrap();
        assert!(text.contains("backoff_ms"));
        assert!(!text.contains("max_elapsed_ms"));
    }
}
