//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (SITEKEY_*)
//! 2. TOML config file (if SITEKEY_CONFIG_FILE set)
//! 3. Built-in defaults

use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (SITEKEY_*)
/// 2. TOML config file (if SITEKEY_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// How long a sub-resource request is held while the page site key is checked.
    ///
    /// Set via SITEKEY_HOLD_TIMEOUT_MS environment variable.
    #[serde(default = "default_hold_timeout_ms")]
    pub hold_timeout_ms: u64,

    /// User-Agent used for mirrored requests that carry none.
    ///
    /// Set via SITEKEY_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Timeout of the HTTP transport in milliseconds.
    ///
    /// Set via SITEKEY_TRANSPORT_TIMEOUT_MS environment variable.
    #[serde(default = "default_transport_timeout_ms")]
    pub transport_timeout_ms: u64,

    /// Maximum number of redirects the transport follows.
    ///
    /// Set via SITEKEY_MAX_REDIRECTS environment variable.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    /// Whether the header extractor injects the element-hiding script into HTML frames.
    ///
    /// Set via SITEKEY_JS_IN_FRAMES_ENABLED environment variable.
    #[serde(default = "default_true")]
    pub js_in_frames_enabled: bool,

    /// Run site-key checks even without an enabled allowlisting subscription.
    ///
    /// Set via SITEKEY_FORCE_CHECKS environment variable.
    #[serde(default)]
    pub force_checks: bool,
}

fn default_hold_timeout_ms() -> u64 {
    1_000
}

fn default_user_agent() -> String {
    "sitekey/0.1".into()
}

fn default_transport_timeout_ms() -> u64 {
    20_000
}

fn default_max_redirects() -> usize {
    5
}

fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            hold_timeout_ms: default_hold_timeout_ms(),
            user_agent: default_user_agent(),
            transport_timeout_ms: default_transport_timeout_ms(),
            max_redirects: default_max_redirects(),
            js_in_frames_enabled: true,
            force_checks: false,
        }
    }
}

impl AppConfig {
    /// Hold timeout as Duration.
    pub fn hold_timeout(&self) -> Duration {
        Duration::from_millis(self.hold_timeout_ms)
    }

    /// Transport timeout as Duration for use with reqwest.
    pub fn transport_timeout(&self) -> Duration {
        Duration::from_millis(self.transport_timeout_ms)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `SITEKEY_`
    /// 2. TOML file from `SITEKEY_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("SITEKEY_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("SITEKEY_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.hold_timeout_ms, 1_000);
        assert_eq!(config.user_agent, "sitekey/0.1");
        assert_eq!(config.transport_timeout_ms, 20_000);
        assert_eq!(config.max_redirects, 5);
        assert!(config.js_in_frames_enabled);
        assert!(!config.force_checks);
    }

    #[test]
    fn test_durations() {
        let config = AppConfig::default();
        assert_eq!(config.hold_timeout(), Duration::from_secs(1));
        assert_eq!(config.transport_timeout(), Duration::from_millis(20_000));
    }

    #[test]
    fn test_deserialize_partial_uses_defaults() {
        let config: AppConfig = Figment::from(Toml::string("hold_timeout_ms = 250\nforce_checks = true"))
            .extract()
            .unwrap();
        assert_eq!(config.hold_timeout_ms, 250);
        assert!(config.force_checks);
        assert_eq!(config.user_agent, "sitekey/0.1");
        assert!(config.js_in_frames_enabled);
    }
}
