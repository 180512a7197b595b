//! Configuration for the session registry.
//!
//! Configuration can be built in code with the `with_*` methods or loaded
//! from TOML:
//!
//! ```toml
//! timeout_secs = 1800
//! reap_interval_secs = 5
//! touch_on_access = false
//! id_strategy = "hashed"
//! cookie_name = "sessionId"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::id::IdStrategy;

/// Default idle timeout before a session is reaped.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1800);

/// Default interval between reaper sweeps.
pub const DEFAULT_REAP_INTERVAL: Duration = Duration::from_secs(5);

/// Upper bound for the timeout and the reap interval (ten years).
pub const MAX_DURATION: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

/// Default name of the cookie carrying the session identifier.
pub const DEFAULT_COOKIE_NAME: &str = "sessionId";

/// Configuration for a [`SessionRegistry`](crate::SessionRegistry).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Lifetime a session starts with, and is reset to on refresh.
    pub timeout: Duration,

    /// How often the reaper decrements every session's remaining lifetime.
    pub reap_interval: Duration,

    /// Send a refresh signal whenever an existing session is resolved.
    /// When false, only explicit refresh signals extend a session.
    pub touch_on_access: bool,

    /// How new session identifiers are produced.
    pub id_strategy: IdStrategy,

    /// Cookie name used by [`Resolved::cookie`](crate::Resolved::cookie).
    pub cookie_name: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            reap_interval: DEFAULT_REAP_INTERVAL,
            touch_on_access: false,
            id_strategy: IdStrategy::default(),
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
        }
    }
}

impl RegistryConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the session timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the reaper tick interval.
    pub fn with_reap_interval(mut self, interval: Duration) -> Self {
        self.reap_interval = interval;
        self
    }

    /// Enable or disable refresh-on-resolve.
    pub fn with_touch_on_access(mut self, enabled: bool) -> Self {
        self.touch_on_access = enabled;
        self
    }

    /// Set the identifier generation strategy.
    pub fn with_id_strategy(mut self, strategy: IdStrategy) -> Self {
        self.id_strategy = strategy;
        self
    }

    /// Set the session cookie name.
    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    /// Check that the configuration can drive a registry.
    pub fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(Error::InvalidConfig("timeout must be positive".to_string()));
        }
        if self.reap_interval.is_zero() {
            return Err(Error::InvalidConfig(
                "reap interval must be positive".to_string(),
            ));
        }
        if self.timeout > MAX_DURATION {
            return Err(Error::InvalidConfig("timeout is too large".to_string()));
        }
        if self.reap_interval > MAX_DURATION {
            return Err(Error::InvalidConfig(
                "reap interval is too large".to_string(),
            ));
        }
        if self.cookie_name.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "cookie name must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse from a TOML string. Missing keys take their defaults.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let raw: RawConfig = toml::from_str(toml_str)?;
        let config: Self = raw.into();
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::ReadConfig {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml(&contents)
    }

    /// Session timeout in milliseconds, the unit of the remaining counter.
    pub(crate) fn timeout_millis(&self) -> i64 {
        i64::try_from(self.timeout.as_millis()).unwrap_or(i64::MAX)
    }
}

/// On-disk shape of [`RegistryConfig`]; durations are whole seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct RawConfig {
    timeout_secs: u64,
    reap_interval_secs: u64,
    touch_on_access: bool,
    id_strategy: IdStrategy,
    cookie_name: String,
}

impl Default for RawConfig {
    fn default() -> Self {
        let defaults = RegistryConfig::default();
        Self {
            timeout_secs: defaults.timeout.as_secs(),
            reap_interval_secs: defaults.reap_interval.as_secs(),
            touch_on_access: defaults.touch_on_access,
            id_strategy: defaults.id_strategy,
            cookie_name: defaults.cookie_name,
        }
    }
}

impl From<RawConfig> for RegistryConfig {
    fn from(raw: RawConfig) -> Self {
        Self {
            timeout: Duration::from_secs(raw.timeout_secs),
            reap_interval: Duration::from_secs(raw.reap_interval_secs),
            touch_on_access: raw.touch_on_access,
            id_strategy: raw.id_strategy,
            cookie_name: raw.cookie_name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RegistryConfig::default();
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert_eq!(config.reap_interval, DEFAULT_REAP_INTERVAL);
        assert!(!config.touch_on_access);
        assert_eq!(config.id_strategy, IdStrategy::Hashed);
        assert_eq!(config.cookie_name, "sessionId");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = RegistryConfig::new()
            .with_timeout(Duration::from_secs(10))
            .with_reap_interval(Duration::from_secs(1))
            .with_touch_on_access(true)
            .with_id_strategy(IdStrategy::Random)
            .with_cookie_name("sid");

        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.reap_interval, Duration::from_secs(1));
        assert!(config.touch_on_access);
        assert_eq!(config.id_strategy, IdStrategy::Random);
        assert_eq!(config.cookie_name, "sid");
        assert_eq!(config.timeout_millis(), 10_000);
    }

    #[test]
    fn test_validate_rejects_zero_durations() {
        let config = RegistryConfig::new().with_timeout(Duration::ZERO);
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let config = RegistryConfig::new().with_reap_interval(Duration::ZERO);
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_rejects_oversized_durations() {
        let config = RegistryConfig::new().with_reap_interval(Duration::MAX);
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let config =
            RegistryConfig::new().with_timeout(MAX_DURATION + Duration::from_secs(1));
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let config = RegistryConfig::new()
            .with_timeout(MAX_DURATION)
            .with_reap_interval(MAX_DURATION);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_rejects_huge_reap_interval() {
        let result = RegistryConfig::from_toml("reap_interval_secs = 9223372036854775807");
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_rejects_empty_cookie_name() {
        let config = RegistryConfig::new().with_cookie_name("  ");
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_from_toml() {
        let config = RegistryConfig::from_toml(
            r#"
            timeout_secs = 10
            reap_interval_secs = 5
            touch_on_access = true
            id_strategy = "random"
            "#,
        )
        .unwrap();

        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.reap_interval, Duration::from_secs(5));
        assert!(config.touch_on_access);
        assert_eq!(config.id_strategy, IdStrategy::Random);
        assert_eq!(config.cookie_name, DEFAULT_COOKIE_NAME);
    }

    #[test]
    fn test_from_toml_empty_uses_defaults() {
        let config = RegistryConfig::from_toml("").unwrap();
        assert_eq!(config, RegistryConfig::default());
    }

    #[test]
    fn test_from_toml_invalid() {
        let result = RegistryConfig::from_toml("timeout_secs = \"soon\"");
        assert!(matches!(result, Err(Error::ConfigParse(_))));

        let result = RegistryConfig::from_toml("timeout_secs = 0");
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.toml");
        std::fs::write(&path, "timeout_secs = 60\ncookie_name = \"sid\"\n").unwrap();

        let config = RegistryConfig::load(&path).unwrap();
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.cookie_name, "sid");

        let missing = RegistryConfig::load(&dir.path().join("missing.toml"));
        assert!(matches!(missing, Err(Error::ReadConfig { .. })));
    }
}
