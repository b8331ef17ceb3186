//! Configuration Module
//!
//! Immutable cache configuration with defaults, validation and environment loading.

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

/// Default maximum number of entries.
pub const DEFAULT_MAX_SIZE: usize = 1000;

/// Default age after which a value is considered stale.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Loading cache configuration parameters.
///
/// The configuration is fixed once a cache is constructed from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of entries the cache can hold
    pub max_size: usize,
    /// Age after which a cached value is stale
    pub timeout: Duration,
    /// Block readers of stale values until the reload finishes (otherwise refresh-ahead)
    pub blocking_on_get: bool,
}

impl CacheConfig {
    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_MAX_SIZE` - Maximum cache entries (default: 1000)
    /// - `CACHE_TIMEOUT_MS` - Staleness timeout in milliseconds (default: 5000)
    /// - `CACHE_BLOCKING_ON_GET` - `true` selects the blocking policy (default: false)
    pub fn from_env() -> Self {
        Self {
            max_size: env::var("CACHE_MAX_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_SIZE),
            timeout: env::var("CACHE_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_TIMEOUT),
            blocking_on_get: env::var("CACHE_BLOCKING_ON_GET")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
        }
    }

    /// Checks that `max_size` and `timeout` are positive.
    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(CacheError::InvalidConfig(
                "max_size must be positive".to_string(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(CacheError::InvalidConfig(
                "timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            timeout: DEFAULT_TIMEOUT,
            blocking_on_get: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = CacheConfig::default();
        assert_eq!(config.max_size, 1000);
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert!(!config.blocking_on_get);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_env_defaults() {
        env::remove_var("CACHE_MAX_SIZE");
        env::remove_var("CACHE_TIMEOUT_MS");
        env::remove_var("CACHE_BLOCKING_ON_GET");

        let config = CacheConfig::from_env();
        assert_eq!(config, CacheConfig::default());
    }

    #[test]
    fn test_config_rejects_zero_max_size() {
        let config = CacheConfig {
            max_size: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(CacheError::InvalidConfig(_))));
    }

    #[test]
    fn test_config_rejects_zero_timeout() {
        let config = CacheConfig {
            timeout: Duration::ZERO,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(CacheError::InvalidConfig(_))));
    }

    #[test]
    fn test_config_deserialize_partial() {
        let config: CacheConfig =
            serde_json::from_str(r#"{"max_size": 2, "blocking_on_get": true}"#).unwrap();

        assert_eq!(config.max_size, 2);
        assert!(config.blocking_on_get);
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
    }
}
