//! Engine configuration: policy source, cache sizing, and reload tuning.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for an [`crate::engine::PolicyEvaluator`] deployment.
///
/// # Example (TOML)
///
/// ```toml
/// [ace]
/// policy_path = "/etc/ace/policy.xml"
///
/// [ace.cache]
/// enabled = true
///
/// [ace.reload]
/// debounce = "200ms"
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AceConfig {
    /// Path to the policy document to load at startup and on reload.
    pub policy_path: PathBuf,

    /// Verdict cache configuration.
    pub cache: CacheConfig,

    /// Hot-reload configuration.
    pub reload: ReloadSettings,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

impl Default for AceConfig {
    fn default() -> Self {
        Self {
            policy_path: PathBuf::from("policy.xml"),
            cache: CacheConfig::default(),
            reload: ReloadSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Verdict cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable the verdict cache. Disabling it forces a full tree walk on
    /// every evaluation — useful while developing a policy document. Wired
    /// into a deployment through [`crate::engine::evaluator_from_config`],
    /// which calls [`crate::engine::PolicyEvaluator::with_cache_enabled`].
    pub enabled: bool,

    /// Soft cap on the number of cached verdicts, enforced by the storage
    /// backend (the in-memory backend shipped here does not enforce it;
    /// a persistent backend is expected to).
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 10_000,
        }
    }
}

/// Hot-reload configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReloadSettings {
    /// Debounce window collapsing a burst of change notifications into one reload.
    #[serde(with = "humantime_serde")]
    pub debounce: Duration,

    /// Maximum retry attempts for a failed reload.
    pub max_attempts: u32,

    /// Base delay for the retry backoff.
    #[serde(with = "humantime_serde")]
    pub retry_backoff_base: Duration,

    /// Broadcast channel capacity for policy-change notifications.
    pub notification_capacity: usize,
}

impl Default for ReloadSettings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(200),
            max_attempts: 3,
            retry_backoff_base: Duration::from_millis(100),
            notification_capacity: 16,
        }
    }
}

impl From<&ReloadSettings> for crate::reload::ReloadConfig {
    fn from(settings: &ReloadSettings) -> Self {
        Self {
            debounce: settings.debounce,
            max_attempts: settings.max_attempts,
            retry_backoff_base: settings.retry_backoff_base,
        }
    }
}

/// Structured-logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive, e.g. `"ace=debug,warn"`.
    pub filter: String,

    /// Emit logs as JSON instead of human-readable text.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "ace=info,warn".to_string(),
            json: false,
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration value: {0}")]
    InvalidValue(String),

    #[error("missing required configuration: {0}")]
    Missing(String),
}

impl AceConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if the policy path is empty, the
    /// reload retry count is zero, or the cache's max entry count is zero
    /// while the cache is enabled.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.policy_path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue(
                "policy_path cannot be empty".to_string(),
            ));
        }
        if self.reload.max_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "reload.max_attempts must be > 0".to_string(),
            ));
        }
        if self.cache.enabled && self.cache.max_entries == 0 {
            return Err(ConfigError::InvalidValue(
                "cache.max_entries must be > 0 when the cache is enabled".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = AceConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_policy_path_fails_validation() {
        let mut config = AceConfig::default();
        config.policy_path = PathBuf::new();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));
        assert!(err.to_string().contains("policy_path"));
    }

    #[test]
    fn zero_max_attempts_fails_validation() {
        let mut config = AceConfig::default();
        config.reload.max_attempts = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_attempts"));
    }

    #[test]
    fn disabled_cache_skips_max_entries_validation() {
        let mut config = AceConfig::default();
        config.cache.enabled = false;
        config.cache.max_entries = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn serde_roundtrip() {
        let config = AceConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: AceConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config.policy_path, parsed.policy_path);
        assert_eq!(config.cache.max_entries, parsed.cache.max_entries);
    }

    #[test]
    fn reload_settings_convert_to_reload_config() {
        let settings = ReloadSettings::default();
        let reload_config: crate::reload::ReloadConfig = (&settings).into();
        assert_eq!(reload_config.max_attempts, settings.max_attempts);
    }
}
