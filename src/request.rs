//! Request descriptors, canonical cache keys, and responses.
//!
//! A [`Request`] is an immutable description of an HTTP call. Two descriptors
//! are interchangeable for caching and deduplication purposes iff their
//! [`cache_key`](Request::cache_key) matches; the default key is
//! `METHOD URL?sorted_encoded_params`, so the insertion order of parameters
//! never matters. Callers can swap in their own [`KeyFn`] (for example to
//! ignore a volatile parameter, or to fold the body into the key) and a
//! separate [`EqFn`] used for change detection.
//!
//! # Example
//!
//! ```
//! use larder::request::Request;
//!
//! let a = Request::get("https://api.example.com/users")
//!     .param("page", 2)
//!     .param("sort", "name");
//! let b = Request::get("https://api.example.com/users")
//!     .param("sort", "name")
//!     .param("page", 2);
//!
//! // Parameter order does not affect the key.
//! assert_eq!(a.cache_key(), b.cache_key());
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::{Method, StatusCode};

/// Produces the canonical string key for a request.
pub type KeyFn = Arc<dyn Fn(&Request) -> String + Send + Sync>;

/// Decides whether two derived requests are the same for change-detection
/// purposes. The default compares every field structurally.
pub type EqFn = Arc<dyn Fn(&Request, &Request) -> bool + Send + Sync>;

/// A query parameter value.
///
/// Non-string values are coerced through their canonical display form;
/// lists are joined with `,`.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// A string value.
    Str(String),
    /// An integer value.
    Int(i64),
    /// A floating point value.
    Float(f64),
    /// A boolean value, rendered as `true`/`false`.
    Bool(bool),
    /// A list of strings, joined with `,` in the canonical form.
    List(Vec<String>),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::List(items) => f.write_str(&items.join(",")),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<i64> for ParamValue {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<i32> for ParamValue {
    fn from(n: i32) -> Self {
        Self::Int(i64::from(n))
    }
}

impl From<u32> for ParamValue {
    fn from(n: u32) -> Self {
        Self::Int(i64::from(n))
    }
}

impl From<f64> for ParamValue {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<bool> for ParamValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<Vec<String>> for ParamValue {
    fn from(items: Vec<String>) -> Self {
        Self::List(items)
    }
}

impl From<Vec<&str>> for ParamValue {
    fn from(items: Vec<&str>) -> Self {
        Self::List(items.into_iter().map(str::to_string).collect())
    }
}

/// An immutable description of an HTTP request.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// The HTTP method.
    pub method: Method,
    /// The request URL, without query parameters.
    pub url: String,
    /// Query parameters. Stored sorted, so key derivation is
    /// order-independent.
    pub params: BTreeMap<String, ParamValue>,
    /// Request headers.
    pub headers: HeaderMap,
    /// Optional request body.
    pub body: Option<Bytes>,
}

impl Request {
    /// Creates a request with the given method and URL.
    #[must_use]
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            params: BTreeMap::new(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Creates a `GET` request.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    /// Creates a `POST` request.
    #[must_use]
    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    /// Creates a `PUT` request.
    #[must_use]
    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::PUT, url)
    }

    /// Creates a `PATCH` request.
    #[must_use]
    pub fn patch(url: impl Into<String>) -> Self {
        Self::new(Method::PATCH, url)
    }

    /// Creates a `DELETE` request.
    #[must_use]
    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::DELETE, url)
    }

    /// Adds a query parameter.
    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Adds a request header. Invalid names or values are ignored.
    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::try_from(name),
            HeaderValue::try_from(value),
        ) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Sets the request body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Returns the canonical cache key: `METHOD URL?sorted_encoded_params`.
    ///
    /// Parameters are percent-encoded and emitted in sorted key order, so two
    /// descriptors that differ only in parameter insertion order produce the
    /// same key.
    #[must_use]
    pub fn cache_key(&self) -> String {
        let mut key = format!("{} {}", self.method, self.url);
        if !self.params.is_empty() {
            let encoded = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(self.params.iter().map(|(k, v)| (k.clone(), v.to_string())))
                .finish();
            key.push('?');
            key.push_str(&encoded);
        }
        key
    }
}

/// The default change-detection equality: structural comparison of every
/// field.
#[must_use]
pub fn default_eq() -> EqFn {
    Arc::new(|a: &Request, b: &Request| a == b)
}

/// A response as seen by the caching layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// The response status code.
    pub status: StatusCode,
    /// The response headers.
    pub headers: HeaderMap,
    /// The response body.
    pub body: Bytes,
}

impl Response {
    /// Creates a response from its parts.
    #[must_use]
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    /// Creates a `200 OK` response with no headers.
    #[must_use]
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self::new(StatusCode::OK, HeaderMap::new(), body)
    }

    /// Returns `true` for 2xx statuses.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_order_independent() {
        let a = Request::get("https://example.com/items")
            .param("b", 2)
            .param("a", 1);
        let b = Request::get("https://example.com/items")
            .param("a", 1)
            .param("b", 2);
        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn test_key_shape() {
        let req = Request::get("https://example.com/items").param("q", "rust lang");
        assert_eq!(
            req.cache_key(),
            "GET https://example.com/items?q=rust+lang"
        );

        let bare = Request::get("https://example.com/items");
        assert_eq!(bare.cache_key(), "GET https://example.com/items");
    }

    #[test]
    fn test_key_distinguishes_method_and_params() {
        let get = Request::get("https://example.com/x");
        let post = Request::post("https://example.com/x");
        assert_ne!(get.cache_key(), post.cache_key());

        let one = Request::get("https://example.com/x").param("page", 1);
        let two = Request::get("https://example.com/x").param("page", 2);
        assert_ne!(one.cache_key(), two.cache_key());
    }

    #[test]
    fn test_param_coercion() {
        assert_eq!(ParamValue::from(3).to_string(), "3");
        assert_eq!(ParamValue::from(true).to_string(), "true");
        assert_eq!(ParamValue::from(1.5).to_string(), "1.5");
        assert_eq!(
            ParamValue::from(vec!["a", "b", "c"]).to_string(),
            "a,b,c"
        );
    }

    #[test]
    fn test_default_eq_is_structural() {
        let eq = default_eq();
        let a = Request::get("https://example.com").param("p", 1);
        let b = Request::get("https://example.com").param("p", 1);
        let c = Request::get("https://example.com").param("p", 2);

        assert!(eq(&a, &b));
        assert!(!eq(&a, &c));
    }

    #[test]
    fn test_custom_key_fn() {
        // A key function that ignores the volatile `ts` parameter.
        let key: KeyFn = Arc::new(|req: &Request| {
            let mut stripped = req.clone();
            stripped.params.remove("ts");
            stripped.cache_key()
        });

        let a = Request::get("https://example.com").param("ts", 1);
        let b = Request::get("https://example.com").param("ts", 2);
        assert_eq!(key(&a), key(&b));
    }

    #[test]
    fn test_header_builder() {
        let req = Request::get("https://example.com").header("x-token", "abc");
        assert_eq!(
            req.headers.get("x-token").and_then(|v| v.to_str().ok()),
            Some("abc")
        );
    }
}
