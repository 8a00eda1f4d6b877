//! Request eligibility rules.
//!
//! Rules are evaluated in order and the first match wins:
//! 1. Non-GET methods pass through.
//! 2. Non-http(s) schemes pass through.
//! 3. URLs whose `path?query` matches an excluded pattern pass through.
//! 4. Everything else is served cache-first.
//!
//! Exclusions are configuration (`excluded_patterns`), not hardcoded policy.

use offgrid_core::{AppConfig, Error};
use regex::Regex;
use reqwest::Method;
use serde::Serialize;
use url::Url;

use crate::fetch::Request;

/// Per-request routing decision. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InterceptionDecision {
    /// Leave the request alone: no cache read, no cache write.
    PassThrough,
    /// Serve from the current generation, fetch and store on miss.
    CacheFirst,
}

/// Decides whether a request is eligible for interception.
#[derive(Debug, Clone)]
pub struct RequestClassifier {
    excluded: Vec<Regex>,
}

impl RequestClassifier {
    /// Build a classifier from exclusion regexes.
    pub fn new<I, S>(patterns: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let excluded = patterns
            .into_iter()
            .map(|pattern| {
                Regex::new(pattern.as_ref())
                    .map_err(|e| Error::InvalidInput(format!("excluded pattern {}: {e}", pattern.as_ref())))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { excluded })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, Error> {
        Self::new(&config.excluded_patterns)
    }

    pub fn classify(&self, request: &Request) -> InterceptionDecision {
        if request.method != Method::GET {
            tracing::trace!(method = %request.method, url = %request.url, "pass through: method");
            return InterceptionDecision::PassThrough;
        }

        if !matches!(request.url.scheme(), "http" | "https") {
            tracing::trace!(url = %request.url, "pass through: scheme");
            return InterceptionDecision::PassThrough;
        }

        if self.is_excluded(&request.url) {
            tracing::trace!(url = %request.url, "pass through: excluded");
            return InterceptionDecision::PassThrough;
        }

        InterceptionDecision::CacheFirst
    }

    /// Whether `path?query` of the URL matches any excluded pattern.
    pub fn is_excluded(&self, url: &Url) -> bool {
        let target = match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        };
        self.excluded.iter().any(|pattern| pattern.is_match(&target))
    }
}
