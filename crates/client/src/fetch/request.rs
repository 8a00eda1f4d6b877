//! Inbound request model.

use std::fmt;

use offgrid_core::{Error, compute_cache_key};
use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use url::Url;

use super::url::canonicalize;

/// What the application is loading the resource as.
///
/// Only top-level navigations get the offline document fallback.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Destination {
    Document,
    #[default]
    Empty,
    Other(String),
}

impl Destination {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "document" => Destination::Document,
            "" => Destination::Empty,
            other => Destination::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Destination::Document => "document",
            Destination::Empty => "",
            Destination::Other(value) => value,
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request issued by the controlled application.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub destination: Destination,
    pub headers: HeaderMap,
}

impl Request {
    pub fn new(method: Method, url: Url, destination: Destination) -> Self {
        Self { method, url, destination, headers: HeaderMap::new() }
    }

    /// A sub-resource GET.
    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url, Destination::Empty)
    }

    /// A top-level document navigation.
    pub fn navigate(url: Url) -> Self {
        Self::new(Method::GET, url, Destination::Document)
    }

    /// Build a request from untyped parts, as they arrive over the wire.
    pub fn from_parts<'a, I>(method: &str, url: Url, destination: &str, headers: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let method = Method::from_bytes(method.trim().to_ascii_uppercase().as_bytes())
            .map_err(|e| Error::InvalidInput(format!("invalid method {method:?}: {e}")))?;

        let mut request = Self::new(method, url, Destination::parse(destination));
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::InvalidInput(format!("invalid header name {name:?}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| Error::InvalidInput(format!("invalid header value for {name}: {e}")))?;
            request = request.with_header(name, value);
        }
        Ok(request)
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn is_navigation(&self) -> bool {
        self.destination == Destination::Document
    }

    /// Cache key for this request: method plus canonical absolute URL.
    pub fn cache_key(&self) -> Result<String, Error> {
        let url = canonicalize(&self.url)?;
        Ok(compute_cache_key(self.method.as_str(), url.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_parse() {
        assert_eq!(Destination::parse("document"), Destination::Document);
        assert_eq!(Destination::parse("Document "), Destination::Document);
        assert_eq!(Destination::parse(""), Destination::Empty);
        assert_eq!(Destination::parse("script"), Destination::Other("script".into()));
    }

    #[test]
    fn test_cache_key_ignores_fragment_and_host_case() {
        let a = Request::get(Url::parse("https://Example.com/app.js#x").unwrap());
        let b = Request::get(Url::parse("https://example.com/app.js").unwrap());
        assert_eq!(a.cache_key().unwrap(), b.cache_key().unwrap());
    }

    #[test]
    fn test_cache_key_depends_on_method() {
        let url = Url::parse("https://example.com/items").unwrap();
        let get = Request::get(url.clone());
        let post = Request::new(Method::POST, url, Destination::Empty);
        assert_ne!(get.cache_key().unwrap(), post.cache_key().unwrap());
    }

    #[test]
    fn test_cache_key_rejects_non_network_scheme() {
        let request = Request::get(Url::parse("chrome-extension://abc/x.js").unwrap());
        assert!(matches!(request.cache_key(), Err(Error::UnsupportedScheme(_))));
    }

    #[test]
    fn test_navigation() {
        let url = Url::parse("https://example.com/").unwrap();
        assert!(Request::navigate(url.clone()).is_navigation());
        assert!(!Request::get(url).is_navigation());
    }

    #[test]
    fn test_from_parts() {
        let url = Url::parse("https://example.com/").unwrap();
        let request = Request::from_parts("post", url.clone(), "document", [("x-trace", "1")]).unwrap();
        assert_eq!(request.method, Method::POST);
        assert!(request.is_navigation());
        assert_eq!(request.headers.get("x-trace").unwrap(), "1");

        assert!(matches!(Request::from_parts("GE T", url.clone(), "", []), Err(Error::InvalidInput(_))));
        assert!(matches!(Request::from_parts("GET", url, "", [("bad header", "v")]), Err(Error::InvalidInput(_))));
    }
}
