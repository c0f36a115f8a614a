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

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `hold_timeout_ms` is below 10ms or exceeds 30 seconds
    /// - `transport_timeout_ms` is below 100ms or exceeds 5 minutes
    ///
    /// Returns `ConfigError::Missing` if `user_agent` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hold_timeout_ms < 10 {
            return Err(ConfigError::Invalid { field: "hold_timeout_ms".into(), reason: "must be at least 10ms".into() });
        }
        if self.hold_timeout_ms > 30_000 {
            return Err(ConfigError::Invalid {
                field: "hold_timeout_ms".into(),
                reason: "must not exceed 30 seconds (30000ms)".into(),
            });
        }

        if self.transport_timeout_ms < 100 {
            return Err(ConfigError::Invalid {
                field: "transport_timeout_ms".into(),
                reason: "must be at least 100ms".into(),
            });
        }
        if self.transport_timeout_ms > 300_000 {
            return Err(ConfigError::Invalid {
                field: "transport_timeout_ms".into(),
                reason: "must not exceed 5 minutes (300000ms)".into(),
            });
        }

        if self.user_agent.trim().is_empty() {
            return Err(ConfigError::Missing {
                field: "user_agent".into(),
                hint: "set SITEKEY_USER_AGENT or user_agent in the config file".into(),
            });
        }

        if self.max_redirects == 0 {
            tracing::warn!("max_redirects is 0; redirected frames will pass through unverified");
        }

        Ok(())
    }
}
