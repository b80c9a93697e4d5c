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
    /// - `max_bytes` is 0 or exceeds 50MB
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `user_agent`, `model` or `prompt_filename_base` is empty
    /// - any concurrency limit, `template_count` or `worker_threads` is 0
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_bytes == 0 {
            return Err(ConfigError::Invalid { field: "max_bytes".into(), reason: "must be greater than 0".into() });
        }
        if self.max_bytes > 50 * 1024 * 1024 {
            return Err(ConfigError::Invalid { field: "max_bytes".into(), reason: "must not exceed 50MB".into() });
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

        if self.user_agent.is_empty() {
            return Err(ConfigError::Invalid { field: "user_agent".into(), reason: "must not be empty".into() });
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::Invalid { field: "model".into(), reason: "must not be empty".into() });
        }
        if self.prompt_filename_base.is_empty() {
            return Err(ConfigError::Invalid {
                field: "prompt_filename_base".into(),
                reason: "must not be empty".into(),
            });
        }

        for (field, value) in [
            ("max_concurrent_projects", self.max_concurrent_projects),
            ("max_concurrent_urls", self.max_concurrent_urls),
            ("template_count", self.template_count),
            ("worker_threads", self.worker_threads),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid { field: field.into(), reason: "must be at least 1".into() });
            }
        }

        if self.max_concurrent_urls > self.max_concurrent_projects.saturating_mul(8) {
            tracing::warn!(
                max_concurrent_urls = self.max_concurrent_urls,
                max_concurrent_projects = self.max_concurrent_projects,
                "max_concurrent_urls is much larger than max_concurrent_projects; \
                 per-project fan-out may dominate"
            );
        }

        Ok(())
    }
}
