//! Buffered response model and its stored form.
//!
//! Bodies are held as `Bytes`, fully buffered, so handing one copy to the
//! store and another to the caller is a reference-count bump and both see
//! identical bytes.

use bytes::Bytes;
use offgrid_core::{CacheEntry, Error};
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use url::Url;

/// How much of a response the application may see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    /// Same-origin, fully exposed.
    Basic,
    /// Cross-origin, exposed by CORS headers.
    Cors,
    /// Cross-origin without CORS; contents must not be inspected.
    Opaque,
}

impl ResponseType {
    /// Classify a response by the origins involved.
    pub fn classify(origin: &Url, request_url: &Url, final_url: &Url, headers: &HeaderMap) -> Self {
        let origin = origin.origin();
        if request_url.origin() == origin && final_url.origin() == origin {
            ResponseType::Basic
        } else if headers.contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN) {
            ResponseType::Cors
        } else {
            ResponseType::Opaque
        }
    }
}

/// A fully buffered response.
#[derive(Debug, Clone)]
pub struct Response {
    /// Final URL after redirects
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub content_type: Option<String>,
    pub body: Bytes,
    pub response_type: ResponseType,
    /// Whether redirects were followed to produce this response
    pub redirected: bool,
}

impl Response {
    /// Only plain same-origin 200s are ever written to the store.
    pub fn is_cacheable(&self) -> bool {
        self.status == StatusCode::OK && self.response_type == ResponseType::Basic && !self.redirected
    }

    /// Copy this response into a store entry under `key`.
    pub fn to_entry(&self, key: &str, method: &Method) -> CacheEntry {
        CacheEntry {
            key: key.to_string(),
            method: method.as_str().to_string(),
            url: self.url.to_string(),
            status_code: self.status.as_u16(),
            content_type: self.content_type.clone(),
            headers: self
                .headers
                .iter()
                .map(|(name, value)| (name.as_str().to_string(), String::from_utf8_lossy(value.as_bytes()).into_owned()))
                .collect(),
            body: self.body.to_vec(),
            stored_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Rebuild a response from a stored entry.
    pub fn from_entry(entry: CacheEntry) -> Result<Self, Error> {
        let corrupt = |reason: String| Error::Corrupt { key: entry.key.clone(), reason };

        let url = Url::parse(&entry.url).map_err(|e| corrupt(format!("url: {e}")))?;
        let status = StatusCode::from_u16(entry.status_code).map_err(|e| corrupt(format!("status: {e}")))?;

        let mut headers = HeaderMap::with_capacity(entry.headers.len());
        for (name, value) in &entry.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| corrupt(format!("header {name}: {e}")))?;
            let value = HeaderValue::from_str(value).map_err(|e| corrupt(format!("header value: {e}")))?;
            headers.append(name, value);
        }

        Ok(Self {
            url,
            status,
            headers,
            content_type: entry.content_type,
            body: Bytes::from(entry.body),
            response_type: ResponseType::Basic,
            redirected: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_response(status: StatusCode) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.append(header::SET_COOKIE, HeaderValue::from_static("a=1"));
        headers.append(header::SET_COOKIE, HeaderValue::from_static("b=2"));
        Response {
            url: Url::parse("http://localhost:3000/data.json").unwrap(),
            status,
            headers,
            content_type: Some("application/json".to_string()),
            body: Bytes::from_static(br#"{"ok":true}"#),
            response_type: ResponseType::Basic,
            redirected: false,
        }
    }

    #[test]
    fn test_response_type_same_origin() {
        let origin = Url::parse("http://localhost:3000").unwrap();
        let url = Url::parse("http://localhost:3000/app.js").unwrap();
        assert_eq!(ResponseType::classify(&origin, &url, &url, &HeaderMap::new()), ResponseType::Basic);
    }

    #[test]
    fn test_response_type_cross_origin() {
        let origin = Url::parse("http://localhost:3000").unwrap();
        let url = Url::parse("https://cdn.example.com/lib.js").unwrap();
        assert_eq!(ResponseType::classify(&origin, &url, &url, &HeaderMap::new()), ResponseType::Opaque);

        let mut headers = HeaderMap::new();
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
        assert_eq!(ResponseType::classify(&origin, &url, &url, &headers), ResponseType::Cors);
    }

    #[test]
    fn test_response_type_redirected_off_origin() {
        let origin = Url::parse("http://localhost:3000").unwrap();
        let url = Url::parse("http://localhost:3000/login").unwrap();
        let final_url = Url::parse("https://auth.example.com/login").unwrap();
        assert_eq!(ResponseType::classify(&origin, &url, &final_url, &HeaderMap::new()), ResponseType::Opaque);
    }

    #[test]
    fn test_is_cacheable() {
        assert!(make_response(StatusCode::OK).is_cacheable());
        assert!(!make_response(StatusCode::NOT_FOUND).is_cacheable());
        assert!(!make_response(StatusCode::NO_CONTENT).is_cacheable());

        let opaque = Response { response_type: ResponseType::Opaque, ..make_response(StatusCode::OK) };
        assert!(!opaque.is_cacheable());

        let redirected = Response { redirected: true, ..make_response(StatusCode::OK) };
        assert!(!redirected.is_cacheable());
    }

    #[test]
    fn test_entry_preserves_status_headers_and_body() {
        let response = make_response(StatusCode::OK);
        let entry = response.to_entry("key", &Method::GET);
        let restored = Response::from_entry(entry).unwrap();

        assert_eq!(restored.status, response.status);
        assert_eq!(restored.headers, response.headers);
        assert_eq!(restored.body, response.body);
        assert_eq!(restored.content_type, response.content_type);
        assert_eq!(restored.url, response.url);
    }

    #[test]
    fn test_from_entry_rejects_bad_status() {
        let mut entry = make_response(StatusCode::OK).to_entry("key", &Method::GET);
        entry.status_code = 42;
        assert!(matches!(Response::from_entry(entry), Err(Error::Corrupt { .. })));
    }
}
