//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (OFFGRID_*)
//! 2. TOML config file (if OFFGRID_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;

mod validation;

pub use validation::ConfigError;

/// How requests for top-level documents are served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStrategy {
    /// Same as every other destination: cache first, network on miss.
    #[default]
    CacheFirst,
    /// Network first; cached copy, then the fallback document, when offline.
    NetworkFirst,
}

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (OFFGRID_*)
/// 2. TOML config file (if OFFGRID_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to SQLite cache database.
    ///
    /// Set via OFFGRID_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Identifier of this build's cache generation.
    ///
    /// Changing it on redeploy invalidates every previously cached entry.
    /// Set via OFFGRID_GENERATION environment variable.
    #[serde(default = "default_generation")]
    pub generation: String,

    /// Origin of the controlled application.
    ///
    /// Relative URLs resolve against it and only same-origin responses are cached.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Precache manifest, fetched and stored at install time.
    #[serde(default = "default_precache")]
    pub precache: Vec<String>,

    /// Document served to navigations when the network is unreachable.
    #[serde(default = "default_fallback_document")]
    pub fallback_document: String,

    /// Regex patterns matched against `path?query`; matching requests bypass the cache.
    #[serde(default = "default_excluded_patterns")]
    pub excluded_patterns: Vec<String>,

    /// Strategy applied to `document` destination requests.
    #[serde(default)]
    pub document_strategy: DocumentStrategy,

    /// Skip the waiting phase as soon as install succeeds.
    #[serde(default)]
    pub skip_waiting: bool,

    /// User-Agent string for HTTP requests.
    ///
    /// Set via OFFGRID_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum bytes to buffer per response.
    ///
    /// Set via OFFGRID_MAX_BYTES environment variable.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// HTTP request timeout in milliseconds.
    ///
    /// Set via OFFGRID_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum number of redirects followed by outbound fetches.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./offgrid-cache.sqlite")
}

fn default_generation() -> String {
    "offgrid-v1".into()
}

fn default_origin() -> String {
    "http://localhost:3000".into()
}

fn default_precache() -> Vec<String> {
    vec!["/".into(), "/index.html".into(), "/manifest.json".into(), "/favicon.svg".into()]
}

fn default_fallback_document() -> String {
    "/index.html".into()
}

fn default_excluded_patterns() -> Vec<String> {
    vec!["__vite_ping".into(), "token=".into()]
}

fn default_user_agent() -> String {
    "offgrid/0.1".into()
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_max_redirects() -> usize {
    5
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            generation: default_generation(),
            origin: default_origin(),
            precache: default_precache(),
            fallback_document: default_fallback_document(),
            excluded_patterns: default_excluded_patterns(),
            document_strategy: DocumentStrategy::default(),
            skip_waiting: false,
            user_agent: default_user_agent(),
            max_bytes: default_max_bytes(),
            timeout_ms: default_timeout_ms(),
            max_redirects: default_max_redirects(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Parsed application origin.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if the origin is not an absolute URL.
    pub fn origin_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.origin)
            .map_err(|e| ConfigError::Invalid { field: "origin".into(), reason: e.to_string() })
    }

    /// Precache manifest resolved against the origin, in manifest order.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if the origin or any entry fails to parse.
    pub fn precache_urls(&self) -> Result<Vec<Url>, ConfigError> {
        let origin = self.origin_url()?;
        self.precache
            .iter()
            .map(|entry| {
                origin.join(entry).map_err(|e| ConfigError::Invalid {
                    field: "precache".into(),
                    reason: format!("{entry}: {e}"),
                })
            })
            .collect()
    }

    /// Offline fallback document resolved against the origin.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if the origin or the document path fails to parse.
    pub fn fallback_url(&self) -> Result<Url, ConfigError> {
        self.origin_url()?.join(&self.fallback_document).map_err(|e| ConfigError::Invalid {
            field: "fallback_document".into(),
            reason: e.to_string(),
        })
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `OFFGRID_`
    /// 2. TOML file from `OFFGRID_CONFIG_FILE` (if set)
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

        if let Ok(config_path) = std::env::var("OFFGRID_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("OFFGRID_")
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
        assert_eq!(config.db_path, PathBuf::from("./offgrid-cache.sqlite"));
        assert_eq!(config.generation, "offgrid-v1");
        assert_eq!(config.origin, "http://localhost:3000");
        assert_eq!(config.precache, vec!["/", "/index.html", "/manifest.json", "/favicon.svg"]);
        assert_eq!(config.fallback_document, "/index.html");
        assert_eq!(config.excluded_patterns, vec!["__vite_ping", "token="]);
        assert_eq!(config.document_strategy, DocumentStrategy::CacheFirst);
        assert!(!config.skip_waiting);
        assert_eq!(config.user_agent, "offgrid/0.1");
        assert_eq!(config.max_bytes, 5_242_880);
        assert_eq!(config.timeout_ms, 20_000);
        assert_eq!(config.max_redirects, 5);
    }

    #[test]
    fn test_timeout_duration() {
        let config = AppConfig::default();
        assert_eq!(config.timeout(), Duration::from_millis(20_000));
    }

    #[test]
    fn test_precache_urls_resolve_against_origin() {
        let config = AppConfig {
            origin: "https://app.example.com".into(),
            precache: vec!["./".into(), "./manifest.json".into(), "/icons/todo.svg".into()],
            ..Default::default()
        };
        let urls: Vec<String> = config.precache_urls().unwrap().iter().map(|u| u.to_string()).collect();
        assert_eq!(
            urls,
            vec![
                "https://app.example.com/",
                "https://app.example.com/manifest.json",
                "https://app.example.com/icons/todo.svg",
            ]
        );
    }

    #[test]
    fn test_fallback_url() {
        let config = AppConfig::default();
        assert_eq!(config.fallback_url().unwrap().as_str(), "http://localhost:3000/index.html");
    }

    #[test]
    fn test_document_strategy_serde() {
        let strategy: DocumentStrategy = serde_json::from_str("\"network_first\"").unwrap();
        assert_eq!(strategy, DocumentStrategy::NetworkFirst);
    }
}
