//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use regex::Regex;
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

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `max_bytes` is 0 or exceeds 50MB
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `user_agent` or `generation` is empty
    /// - `origin` is not an absolute http(s) URL
    /// - an `ignored_query_params` pattern does not compile
    /// - a precache entry has an empty URL or revision
    /// - `routes.font_hosts` does not hold exactly two hosts
    ///
    /// Returns `ConfigError::Missing` if a route path fragment is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_bytes == 0 {
            return Err(invalid("max_bytes", "must be greater than 0"));
        }
        if self.max_bytes > 50 * 1024 * 1024 {
            return Err(invalid("max_bytes", "must not exceed 50MB"));
        }

        if self.timeout_ms < 100 {
            return Err(invalid("timeout_ms", "must be at least 100ms"));
        }
        if self.timeout_ms > 300_000 {
            return Err(invalid("timeout_ms", "must not exceed 5 minutes (300000ms)"));
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }
        if self.generation.is_empty() {
            return Err(invalid("generation", "must not be empty"));
        }

        match url::Url::parse(&self.origin) {
            Ok(origin) if matches!(origin.scheme(), "http" | "https") => {}
            Ok(origin) => return Err(invalid("origin", format!("unsupported scheme: {}", origin.scheme()))),
            Err(e) => return Err(invalid("origin", e.to_string())),
        }

        for pattern in &self.ignored_query_params {
            Regex::new(pattern).map_err(|e| invalid("ignored_query_params", format!("{pattern}: {e}")))?;
        }

        for entry in &self.precache {
            if entry.url.is_empty() || entry.revision.is_empty() {
                return Err(invalid("precache", "every entry needs a url and a revision"));
            }
        }

        if self.routes.font_hosts.len() != 2 {
            return Err(invalid("routes.font_hosts", "must list exactly two hosts"));
        }
        for (field, value) in [
            ("routes.api_prefix", &self.routes.api_prefix),
            ("routes.onboarding_segment", &self.routes.onboarding_segment),
            ("routes.identity_host", &self.routes.identity_host),
            ("routes.token_refresh_path", &self.routes.token_refresh_path),
        ] {
            if value.is_empty() {
                return Err(ConfigError::Missing {
                    field: field.into(),
                    hint: format!("Set HEARTH_{} environment variable", field.replace('.', "__").to_uppercase()),
                });
            }
        }

        if self.precache.is_empty() {
            tracing::warn!("precache manifest is empty; install will only store the offline page");
        }

        Ok(())
    }
}
