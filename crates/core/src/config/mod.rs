//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (HEARTH_*)
//! 2. TOML config file (if HEARTH_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::precache::PrecacheEntry;

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (HEARTH_*, `__` separates nested keys)
/// 2. TOML config file (if HEARTH_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the SQLite cache store.
    ///
    /// Set via HEARTH_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// User-Agent string for network requests.
    ///
    /// Set via HEARTH_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Origin the application is served from; relative precache URLs and
    /// the offline page resolve against it.
    ///
    /// Set via HEARTH_ORIGIN environment variable.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Worker generation. Precache caches of other generations are deleted
    /// on activation.
    ///
    /// Set via HEARTH_GENERATION environment variable.
    #[serde(default = "default_generation")]
    pub generation: String,

    /// Maximum bytes to read per response.
    ///
    /// Set via HEARTH_MAX_BYTES environment variable.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Transport-level timeout in milliseconds. Route timeouts are shorter
    /// and race against this one.
    ///
    /// Set via HEARTH_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Activate immediately after install instead of waiting for a
    /// SKIP_WAITING message.
    ///
    /// Set via HEARTH_SKIP_WAITING environment variable.
    #[serde(default = "default_true")]
    pub skip_waiting: bool,

    /// Regexes matched against query parameter names; matching parameters
    /// are dropped before cache key comparison.
    #[serde(default = "default_ignored_query_params")]
    pub ignored_query_params: Vec<String>,

    /// Assets fetched at install time.
    #[serde(default = "default_precache")]
    pub precache: Vec<PrecacheEntry>,

    /// Hosts and paths the standard route table matches on.
    #[serde(default)]
    pub routes: RoutesConfig,
}

/// Inputs to the standard route table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutesConfig {
    /// Exactly two font CDN hosts, stylesheet host first.
    #[serde(default = "default_font_hosts")]
    pub font_hosts: Vec<String>,

    /// File extensions served from the image cache.
    #[serde(default = "default_image_extensions")]
    pub image_extensions: Vec<String>,

    /// Path fragment identifying application API calls.
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,

    /// Path fragment identifying onboarding pages.
    #[serde(default = "default_onboarding_segment")]
    pub onboarding_segment: String,

    /// Host fragment of the identity provider.
    #[serde(default = "default_identity_host")]
    pub identity_host: String,

    /// Path fragment of the identity provider's token refresh endpoint.
    #[serde(default = "default_token_refresh_path")]
    pub token_refresh_path: String,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./hearth-cache.sqlite")
}

fn default_user_agent() -> String {
    "hearth/0.1".into()
}

fn default_origin() -> String {
    "http://localhost:5173".into()
}

fn default_generation() -> String {
    "v1".into()
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_true() -> bool {
    true
}

fn default_ignored_query_params() -> Vec<String> {
    vec!["^code$".into(), "^state$".into(), "^step$".into()]
}

fn default_precache() -> Vec<PrecacheEntry> {
    vec![PrecacheEntry::new("registerSW.js", "3ca0b8505b4bec776b69afdba2768812")]
}

fn default_font_hosts() -> Vec<String> {
    vec!["fonts.googleapis.com".into(), "fonts.gstatic.com".into()]
}

fn default_image_extensions() -> Vec<String> {
    ["png", "jpg", "jpeg", "svg", "gif", "webp"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_api_prefix() -> String {
    "/api/".into()
}

fn default_onboarding_segment() -> String {
    "/onboarding".into()
}

fn default_identity_host() -> String {
    "supabase.co".into()
}

fn default_token_refresh_path() -> String {
    "/auth/v1/token".into()
}

impl Default for RoutesConfig {
    fn default() -> Self {
        Self {
            font_hosts: default_font_hosts(),
            image_extensions: default_image_extensions(),
            api_prefix: default_api_prefix(),
            onboarding_segment: default_onboarding_segment(),
            identity_host: default_identity_host(),
            token_refresh_path: default_token_refresh_path(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            user_agent: default_user_agent(),
            origin: default_origin(),
            generation: default_generation(),
            max_bytes: default_max_bytes(),
            timeout_ms: default_timeout_ms(),
            skip_waiting: true,
            ignored_query_params: default_ignored_query_params(),
            precache: default_precache(),
            routes: RoutesConfig::default(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `HEARTH_`
    /// 2. TOML file from `HEARTH_CONFIG_FILE` (if set)
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

        if let Ok(config_path) = std::env::var("HEARTH_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("HEARTH_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
