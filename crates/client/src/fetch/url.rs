//! URL resolution and canonicalization for consistent cache keys.

use url::Url;

/// Error type for URL resolution failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

impl From<UrlError> for offgrid_core::Error {
    fn from(err: UrlError) -> Self {
        match err {
            UrlError::UnsupportedScheme(scheme) => offgrid_core::Error::UnsupportedScheme(scheme),
            other => offgrid_core::Error::InvalidUrl(other.to_string()),
        }
    }
}

/// Resolve a possibly relative URL string against the application origin.
///
/// Any scheme is accepted here; deciding what to do with non-network schemes
/// is the classifier's job.
pub fn resolve(input: &str, base: &Url) -> Result<Url, UrlError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    base.join(trimmed).map_err(|e| UrlError::InvalidUrl(e.to_string()))
}

/// Canonicalize an absolute http(s) URL for key derivation and fetching.
///
/// Normalization steps:
/// 1. Reject non-http(s) schemes
/// 2. Lowercase the host
/// 3. Remove fragment (#...)
/// 4. Keep query string intact (do not reorder)
pub fn canonicalize(url: &Url) -> Result<Url, UrlError> {
    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    let mut parsed = url.clone();

    if let Some(host) = parsed.host_str() {
        let host = host.to_lowercase();
        parsed
            .set_host(Some(&host))
            .map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    }

    parsed.set_fragment(None);

    Ok(parsed)
}
