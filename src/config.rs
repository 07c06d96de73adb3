//! Policy configuration shared by the issuer, verifier and replay guard.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Policy limits for issuing and verifying tokens.
///
/// Loaded once at process start and handed to each component by value.
/// Every field has a default, so a partial JSON document is accepted.
///
/// # Example
///
/// ```
/// use agetoken::AttestationConfig;
/// use std::time::Duration;
///
/// let config = AttestationConfig::new()
///     .with_ttl(Duration::from_secs(600))
///     .with_max_payload_bytes(2048);
///
/// assert!(config.validate().is_ok());
/// assert_eq!(config.ttl_secs, 600);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttestationConfig {
    /// Lifetime of every issued token, in seconds.
    ///
    /// Default: 3600
    pub ttl_secs: i64,

    /// Largest lifetime a verifier accepts, in seconds.
    ///
    /// Default: 86400
    pub max_ttl_secs: i64,

    /// Tolerated clock drift between attestor and verifier, in seconds.
    ///
    /// Default: 60
    pub clock_skew_secs: i64,

    /// Maximum size of the canonical payload in bytes.
    ///
    /// Default: 1024
    pub max_payload_bytes: usize,

    /// Maximum number of extension entries.
    ///
    /// Default: 8
    pub max_extension_entries: usize,

    /// Maximum length of an extension string value.
    ///
    /// Default: 64
    pub max_extension_value_len: usize,

    /// Maximum audience length.
    ///
    /// Default: 128
    pub max_audience_len: usize,

    /// Maximum nonce length.
    ///
    /// Default: 128
    pub max_nonce_len: usize,

    /// Maximum attestor identifier length.
    ///
    /// Default: 128
    pub max_attestor_id_len: usize,

    /// Maximum number of live replay records.
    ///
    /// Default: 1,000,000
    pub replay_capacity: usize,

    /// Number of independently locked replay shards.
    ///
    /// Default: 16
    pub replay_shards: usize,
}

impl Default for AttestationConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 3600,
            max_ttl_secs: 86_400,
            clock_skew_secs: 60,
            max_payload_bytes: 1024,
            max_extension_entries: 8,
            max_extension_value_len: 64,
            max_audience_len: 128,
            max_nonce_len: 128,
            max_attestor_id_len: 128,
            replay_capacity: 1_000_000,
            replay_shards: 16,
        }
    }
}

impl AttestationConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the token lifetime. Sub-second precision is dropped.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        self
    }

    /// Sets the largest accepted token lifetime.
    #[must_use]
    pub fn with_max_ttl(mut self, max_ttl: Duration) -> Self {
        self.max_ttl_secs = i64::try_from(max_ttl.as_secs()).unwrap_or(i64::MAX);
        self
    }

    /// Sets the tolerated clock drift in seconds.
    #[must_use]
    pub const fn with_clock_skew_secs(mut self, skew: i64) -> Self {
        self.clock_skew_secs = skew;
        self
    }

    /// Sets the maximum payload size.
    #[must_use]
    pub const fn with_max_payload_bytes(mut self, max: usize) -> Self {
        self.max_payload_bytes = max;
        self
    }

    /// Sets the maximum number of extension entries.
    #[must_use]
    pub const fn with_max_extension_entries(mut self, max: usize) -> Self {
        self.max_extension_entries = max;
        self
    }

    /// Sets the replay guard capacity.
    #[must_use]
    pub const fn with_replay_capacity(mut self, capacity: usize) -> Self {
        self.replay_capacity = capacity;
        self
    }

    /// Sets the number of replay shards.
    #[must_use]
    pub const fn with_replay_shards(mut self, shards: usize) -> Self {
        self.replay_shards = shards;
        self
    }

    /// Parses a configuration from JSON, filling missing fields with defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if the JSON is malformed or a value
    /// fails [`validate`](Self::validate).
    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(input).map_err(|_| ConfigError::InvalidValue {
            field: "config",
            reason: "not a valid JSON configuration object",
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every limit is usable.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ttl_secs <= 0 {
            return Err(invalid("ttl_secs", "must be positive"));
        }
        if self.max_ttl_secs < self.ttl_secs {
            return Err(invalid("max_ttl_secs", "must be at least ttl_secs"));
        }
        if self.clock_skew_secs < 0 {
            return Err(invalid("clock_skew_secs", "must not be negative"));
        }
        if self.max_payload_bytes == 0 {
            return Err(invalid("max_payload_bytes", "must be positive"));
        }
        if self.max_extension_entries == 0 {
            return Err(invalid(
                "max_extension_entries",
                "must leave room for the key id flag",
            ));
        }
        if self.max_audience_len == 0 || self.max_nonce_len == 0 || self.max_attestor_id_len == 0 {
            return Err(invalid("max_*_len", "length limits must be positive"));
        }
        if self.replay_capacity == 0 {
            return Err(invalid("replay_capacity", "must be positive"));
        }
        if self.replay_shards == 0 {
            return Err(invalid("replay_shards", "must be positive"));
        }
        Ok(())
    }
}

const fn invalid(field: &'static str, reason: &'static str) -> ConfigError {
    ConfigError::InvalidValue { field, reason }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = AttestationConfig::default();
        assert_eq!(config.ttl_secs, 3600);
        assert_eq!(config.max_ttl_secs, 86_400);
        assert_eq!(config.max_payload_bytes, 1024);
        assert_eq!(config.replay_shards, 16);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_pattern() {
        let config = AttestationConfig::new()
            .with_ttl(Duration::from_secs(120))
            .with_max_ttl(Duration::from_secs(600))
            .with_clock_skew_secs(5)
            .with_max_payload_bytes(512)
            .with_max_extension_entries(2)
            .with_replay_capacity(10)
            .with_replay_shards(1);

        assert_eq!(config.ttl_secs, 120);
        assert_eq!(config.max_ttl_secs, 600);
        assert_eq!(config.clock_skew_secs, 5);
        assert_eq!(config.max_payload_bytes, 512);
        assert_eq!(config.max_extension_entries, 2);
        assert_eq!(config.replay_capacity, 10);
        assert_eq!(config.replay_shards, 1);
    }

    #[test]
    fn ttl_above_max_is_rejected() {
        let config = AttestationConfig::new()
            .with_ttl(Duration::from_secs(7200))
            .with_max_ttl(Duration::from_secs(3600));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue {
                field: "max_ttl_secs",
                ..
            })
        ));
    }

    #[test]
    fn zero_ttl_is_rejected() {
        let config = AttestationConfig::new().with_ttl(Duration::from_millis(500));
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_extension_entries_is_rejected() {
        let config = AttestationConfig::new().with_max_extension_entries(0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue {
                field: "max_extension_entries",
                ..
            })
        ));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config = AttestationConfig::from_json_str(r#"{"ttl_secs": 900}"#).unwrap();
        assert_eq!(config.ttl_secs, 900);
        assert_eq!(config.max_nonce_len, 128);
    }

    #[test]
    fn invalid_json_is_rejected() {
        assert!(AttestationConfig::from_json_str("{not json").is_err());
        assert!(AttestationConfig::from_json_str(r#"{"replay_shards": 0}"#).is_err());
    }
}
