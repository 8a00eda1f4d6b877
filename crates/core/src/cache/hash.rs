//! Request fingerprints used as cache keys.

use sha2::{Digest, Sha256};

/// Compute the cache key for a request.
///
/// The key covers the upper-cased method and the absolute URL, query string
/// included. Callers canonicalize the URL first so equivalent spellings share
/// a key.
pub fn compute_cache_key(method: &str, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.to_ascii_uppercase().as_bytes());
    hasher.update(b"\n");
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}
