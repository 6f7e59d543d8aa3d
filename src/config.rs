//! Engine configuration.
//!
//! Every table is optional; missing keys fall back to the reference sizing.
//!
//! ```toml
//! status_channel = "status"
//! fifo_capacity = 4
//! max_line_bytes = 4999
//!
//! [limits]
//! channel = 127
//! service = 63
//! source = 2047
//!
//! [pacing]
//! file_ms = 0
//! single_line_ms = 100
//!
//! [peer]
//! timeout_ms = 5000
//! item = "active"
//!
//! [peer.services]
//! mirc = "127.0.0.1:5290"
//!
//! [temp]
//! prefix = "mrc529"
//! slots = 4
//!
//! [host]
//! play_interval_ms = 1500
//! min_play_interval_ms = 100
//! tick_ms = 50
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Channel name that routes output to the consumer's status window.
    pub status_channel: String,
    /// Ring slots in the single-line queue. One slot is always held back.
    pub fifo_capacity: usize,
    pub max_line_bytes: usize,
    pub max_source_bytes: u64,
    /// Shortest timer period; an interval of 0 is clamped to this.
    pub min_tick_ms: u64,
    pub limits: FieldLimits,
    pub pacing: PacingConfig,
    pub peer: PeerConfig,
    pub temp: TempConfig,
    pub host: HostConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            status_channel: "status".to_string(),
            fifo_capacity: 4,
            max_line_bytes: 4999,
            max_source_bytes: u64::from(u32::MAX),
            min_tick_ms: 10,
            limits: FieldLimits::default(),
            pacing: PacingConfig::default(),
            peer: PeerConfig::default(),
            temp: TempConfig::default(),
            host: HostConfig::default(),
        }
    }
}

/// Storage limits for caller-supplied strings. Longer values are truncated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldLimits {
    pub channel: usize,
    pub service: usize,
    pub source: usize,
}

impl Default for FieldLimits {
    fn default() -> Self {
        Self {
            channel: 127,
            service: 63,
            source: 2047,
        }
    }
}

/// Pacing values embedded in peer play commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    pub file_ms: u64,
    pub single_line_ms: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            file_ms: 0,
            single_line_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerConfig {
    pub timeout_ms: u64,
    pub connect_timeout_ms: u64,
    /// Item name every write transaction is addressed to.
    pub item: String,
    /// Service name to socket address, used by the TCP link.
    pub services: BTreeMap<String, String>,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5000,
            connect_timeout_ms: 2000,
            item: "active".to_string(),
            services: BTreeMap::new(),
        }
    }
}

impl PeerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Rotating temp files used to stage lines for the peer transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TempConfig {
    pub dir: Option<PathBuf>,
    pub prefix: String,
    pub slots: usize,
}

impl Default for TempConfig {
    fn default() -> Self {
        Self {
            dir: None,
            prefix: "mrc529".to_string(),
            slots: 4,
        }
    }
}

impl TempConfig {
    pub fn dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// Settings for the host-facing command surface and the CLI host loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub play_interval_ms: i64,
    pub min_play_interval_ms: i64,
    pub tick_ms: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            play_interval_ms: 1500,
            min_play_interval_ms: 100,
            tick_ms: 50,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fifo_capacity < 2 {
            return Err(ConfigError::Invalid {
                key: "fifo_capacity",
                reason: format!("must be at least 2, got {}", self.fifo_capacity),
            });
        }
        if self.temp.slots == 0 {
            return Err(ConfigError::Invalid {
                key: "temp.slots",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.max_line_bytes == 0 {
            return Err(ConfigError::Invalid {
                key: "max_line_bytes",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn min_tick(&self) -> Duration {
        Duration::from_millis(self.min_tick_ms.max(1))
    }
}

/// Truncate `value` to at most `limit` bytes without splitting a character.
pub(crate) fn truncate_field(value: &str, limit: usize) -> String {
    if value.len() <= limit {
        return value.to_string();
    }
    let mut end = limit;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    tracing::debug!(len = value.len(), limit, "truncating oversized field");
    value[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_sizing() {
        let config = EngineConfig::default();
        assert_eq!(config.fifo_capacity, 4);
        assert_eq!(config.limits.channel, 127);
        assert_eq!(config.peer.timeout(), Duration::from_millis(5000));
        assert_eq!(config.pacing.single_line_ms, 100);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str(
            "fifo_capacity = 8\n[peer.services]\nmirc = \"127.0.0.1:5290\"\n",
        )
        .unwrap();
        assert_eq!(config.fifo_capacity, 8);
        assert_eq!(config.status_channel, "status");
        assert_eq!(
            config.peer.services.get("mirc").map(String::as_str),
            Some("127.0.0.1:5290")
        );
    }

    #[test]
    fn test_invalid_fifo_capacity() {
        let err = EngineConfig::from_toml_str("fifo_capacity = 1").unwrap_err();
        assert!(err.to_string().contains("fifo_capacity"), "got: {err}");
    }

    #[test]
    fn test_malformed_toml() {
        assert!(EngineConfig::from_toml_str("fifo_capacity = \"four\"").is_err());
    }

    #[test]
    fn test_truncate_field() {
        assert_eq!(truncate_field("#channel", 4), "#cha");
        assert_eq!(truncate_field("short", 64), "short");
        // 'é' is two bytes; never split it
        assert_eq!(truncate_field("aé", 2), "a");
    }
}
