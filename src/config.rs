//! Tunables for the sync engine and scheduler.

use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Largest number of mutations a Firestore-style atomic batch accepts.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Minimum gap between focus-triggered pushes.
    pub debounce_ms: u64,
    /// Upper bound on any single remote call.
    pub remote_timeout_ms: u64,
    /// Mutations per committed batch when replacing the remote history.
    pub max_batch_size: usize,
    /// How long a result message stays visible.
    pub message_ttl_ms: u64,
    pub snapshot_collection: String,
    pub snapshot_document: String,
    pub history_collection: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 300_000,
            remote_timeout_ms: 30_000,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            message_ttl_ms: 3_000,
            snapshot_collection: "inventario".to_string(),
            snapshot_document: "datos".to_string(),
            history_collection: "historial".to_string(),
        }
    }
}

impl SyncConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML document; absent keys keep their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let cfg: SyncConfig = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_batch_size == 0 {
            return Err(ConfigError::Invalid("max_batch_size must be positive"));
        }
        if self.remote_timeout_ms == 0 {
            return Err(ConfigError::Invalid("remote_timeout_ms must be positive"));
        }
        if self.snapshot_collection.is_empty() || self.history_collection.is_empty() {
            return Err(ConfigError::Invalid("collection names must not be empty"));
        }
        Ok(())
    }

    pub fn with_debounce_ms(mut self, ms: u64) -> Self {
        self.debounce_ms = ms;
        self
    }

    pub fn with_remote_timeout(mut self, timeout: Duration) -> Self {
        self.remote_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size;
        self
    }

    pub fn with_message_ttl_ms(mut self, ms: u64) -> Self {
        self.message_ttl_ms = ms;
        self
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_timeout_ms)
    }

    pub fn message_ttl(&self) -> Duration {
        Duration::from_millis(self.message_ttl_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_remote_schema() {
        let cfg = SyncConfig::default();
        assert_eq!(cfg.debounce_ms, 300_000);
        assert_eq!(cfg.message_ttl(), Duration::from_secs(3));
        assert_eq!(cfg.snapshot_collection, "inventario");
        assert_eq!(cfg.snapshot_document, "datos");
        assert_eq!(cfg.history_collection, "historial");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn toml_overrides_only_given_keys() {
        let cfg = SyncConfig::from_toml_str(
            r#"
debounce_ms = 1000
max_batch_size = 20
"#,
        )
        .unwrap();
        assert_eq!(cfg.debounce_ms, 1000);
        assert_eq!(cfg.max_batch_size, 20);
        assert_eq!(cfg.remote_timeout_ms, 30_000);
    }

    #[test]
    fn oversized_timeout_saturates() {
        let cfg = SyncConfig::default().with_remote_timeout(Duration::MAX);
        assert_eq!(cfg.remote_timeout_ms, u64::MAX);
        let cfg = SyncConfig::default().with_remote_timeout(Duration::from_secs(5));
        assert_eq!(cfg.remote_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let err = SyncConfig::from_toml_str("max_batch_size = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = SyncConfig::from_toml_str("debounce_ms = \"soon\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
