//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `upstream` is not an absolute http(s) URL
    /// - `timeout_ms` is outside 100ms..=5min
    /// - `max_bytes` is 0 or exceeds 50MB
    /// - `api_entry_ttl_secs` is 0 or exceeds one day
    /// - `cache_name`/`cache_version` are empty
    /// - the precache manifest is empty
    /// - a cacheable-API pattern does not compile
    /// - `sync_max_attempts` is 0
    pub fn validate(&self) -> Result<(), ConfigError> {
        match url::Url::parse(&self.upstream) {
            Ok(u) if u.scheme() == "http" || u.scheme() == "https" => {}
            Ok(u) => {
                return Err(ConfigError::Invalid {
                    field: "upstream".into(),
                    reason: format!("unsupported scheme: {}", u.scheme()),
                });
            }
            Err(e) => {
                return Err(ConfigError::Invalid { field: "upstream".into(), reason: e.to_string() });
            }
        }

        if self.timeout_ms < 100 {
            return Err(ConfigError::Invalid { field: "timeout_ms".into(), reason: "must be at least 100ms".into() });
        }
        if self.timeout_ms > 300_000 {
            return Err(ConfigError::Invalid {
                field: "timeout_ms".into(),
                reason: "must not exceed 5 minutes (300000ms)".into(),
            });
        }

        if self.max_bytes == 0 {
            return Err(ConfigError::Invalid { field: "max_bytes".into(), reason: "must be greater than 0".into() });
        }
        if self.max_bytes > 50 * 1024 * 1024 {
            return Err(ConfigError::Invalid { field: "max_bytes".into(), reason: "must not exceed 50MB".into() });
        }

        if self.api_entry_ttl_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "api_entry_ttl_secs".into(),
                reason: "must be greater than 0".into(),
            });
        }
        if self.api_entry_ttl_secs > 86_400 {
            return Err(ConfigError::Invalid {
                field: "api_entry_ttl_secs".into(),
                reason: "must not exceed one day (86400s)".into(),
            });
        }

        if self.cache_name.is_empty() {
            return Err(ConfigError::Invalid { field: "cache_name".into(), reason: "must not be empty".into() });
        }
        if self.cache_version.is_empty() {
            return Err(ConfigError::Invalid { field: "cache_version".into(), reason: "must not be empty".into() });
        }

        if self.precache.is_empty() {
            return Err(ConfigError::Invalid {
                field: "precache".into(),
                reason: "critical resource set must not be empty".into(),
            });
        }

        for pattern in &self.cacheable_api_patterns {
            if let Err(e) = regex::Regex::new(pattern) {
                return Err(ConfigError::Invalid {
                    field: "cacheable_api_patterns".into(),
                    reason: format!("{pattern}: {e}"),
                });
            }
        }

        if self.sync_max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "sync_max_attempts".into(),
                reason: "must be at least 1".into(),
            });
        }

        if self.user_agent.is_empty() {
            return Err(ConfigError::Invalid { field: "user_agent".into(), reason: "must not be empty".into() });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_config() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_bad_upstream() {
        let config = AppConfig { upstream: "ftp://example.com".into(), ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "upstream"));
    }

    #[test]
    fn test_validate_timeout_too_small() {
        let config = AppConfig { timeout_ms: 50, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "timeout_ms"));
    }

    #[test]
    fn test_validate_timeout_exceeds_limit() {
        let config = AppConfig { timeout_ms: 301_000, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "timeout_ms"));
    }

    #[test]
    fn test_validate_zero_ttl() {
        let config = AppConfig { api_entry_ttl_secs: 0, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "api_entry_ttl_secs"));
    }

    #[test]
    fn test_validate_empty_precache() {
        let config = AppConfig { precache: Vec::new(), ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "precache"));
    }

    #[test]
    fn test_validate_bad_pattern() {
        let config = AppConfig { cacheable_api_patterns: vec!["^/api/(".into()], ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "cacheable_api_patterns"));
    }

    #[test]
    fn test_validate_empty_cache_version() {
        let config = AppConfig { cache_version: String::new(), ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "cache_version"));
    }

    #[test]
    fn test_validate_zero_sync_attempts() {
        let config = AppConfig { sync_max_attempts: 0, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "sync_max_attempts"));
    }
}
