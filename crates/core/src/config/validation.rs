//! Configuration validation rules.
//!
//! Runs after `AppConfig` has been assembled from environment, file and
//! defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration loading and validation errors.
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
    /// - `store_url` or `user_agent` is empty
    /// - `ttl_ms`, `build_window_ms` or `heartbeat_secs` is 0
    /// - `max_bytes` is 0 or exceeds 50MB
    /// - `render_timeout_ms` is under 100ms or over 5 minutes
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store_url.trim().is_empty() {
            return Err(invalid("store_url", "must not be empty"));
        }
        if self.ttl_ms == 0 {
            return Err(invalid("ttl_ms", "must be greater than 0"));
        }
        if self.build_window_ms == 0 {
            return Err(invalid("build_window_ms", "must be greater than 0"));
        }
        if self.heartbeat_secs == 0 {
            return Err(invalid("heartbeat_secs", "must be greater than 0"));
        }

        if self.max_bytes == 0 {
            return Err(invalid("max_bytes", "must be greater than 0"));
        }
        if self.max_bytes > 50 * 1024 * 1024 {
            return Err(invalid("max_bytes", "must not exceed 50MB"));
        }

        if self.render_timeout_ms < 100 {
            return Err(invalid("render_timeout_ms", "must be at least 100ms"));
        }
        if self.render_timeout_ms > 300_000 {
            return Err(invalid("render_timeout_ms", "must not exceed 5 minutes (300000ms)"));
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        if self.ttl_ms >= self.dead_after_ms {
            tracing::warn!(
                ttl_ms = self.ttl_ms,
                dead_after_ms = self.dead_after_ms,
                "ttl_ms is not below dead_after_ms; entries die before they are ever revalidated"
            );
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}
