//! The request description shared by every request mode.
//!
//! A [`Request`] captures everything needed to execute one HTTP exchange:
//! method, URL, headers, payload, an optional per-request timeout and proxy,
//! and caller metadata that rides along untouched into the result envelope.

use std::time::Duration;

use reqwest::Method;
use serde_json::{Map, Value};

use crate::error::FetchError;

/// The request body.
///
/// A text payload passes through verbatim; a JSON payload is serialized when
/// the request is built, so encoding errors surface before anything is sent.
#[derive(Debug, Clone, Default)]
pub enum Payload {
    /// No body.
    #[default]
    Empty,
    /// A verbatim text body. No Content-Type is set; add one with
    /// [`Request::header`] if the server needs it.
    Text(String),
    /// A JSON body. Sets `Content-Type: application/json` when sent.
    Json(Value),
}

/// A single HTTP request, ready to hand to any of the request modes.
///
/// `Request` is `Clone` so an unmodified copy can be re-submitted for retry;
/// the metadata map travels through to the [`Exchange`](crate::Exchange)
/// untouched, which is how callers correlate responses that arrive out of
/// order from the concurrent modes.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use courier::Request;
///
/// let request = Request::post("https://api.example.com/items")
///     .header("Authorization", "Bearer token")
///     .timeout(Duration::from_secs(5))
///     .meta("item_id", 42)
///     .json(&serde_json::json!({ "name": "demo" }))
///     .unwrap();
/// assert_eq!(request.url(), "https://api.example.com/items");
/// ```
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    url: String,
    headers: Vec<(String, String)>,
    payload: Payload,
    timeout: Option<Duration>,
    proxy: Option<String>,
    meta: Map<String, Value>,
}

impl Request {
    /// Creates a request with the given method and URL.
    ///
    /// The URL is validated when the request executes, not here, so building
    /// a request is infallible and failures surface in the result envelope.
    #[must_use]
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            payload: Payload::Empty,
            timeout: None,
            proxy: None,
            meta: Map::new(),
        }
    }

    /// Creates a GET request.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    /// Creates a POST request.
    #[must_use]
    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    /// Appends a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets a verbatim text body.
    #[must_use]
    pub fn text(mut self, body: impl Into<String>) -> Self {
        self.payload = Payload::Text(body.into());
        self
    }

    /// Sets a JSON body, serializing the value now.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::BodyEncode`] if the value cannot be serialized.
    pub fn json<T: serde::Serialize>(mut self, body: &T) -> Result<Self, FetchError> {
        self.payload = Payload::Json(serde_json::to_value(body).map_err(FetchError::body_encode)?);
        Ok(self)
    }

    /// Sets the per-request timeout (covers connect through body read).
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Routes this request through the given proxy URL.
    #[must_use]
    pub fn proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    /// Attaches a metadata entry, carried through to the result envelope.
    #[must_use]
    pub fn meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    /// Returns the request method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the header list in insertion order.
    #[must_use]
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Returns the payload.
    #[must_use]
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Returns the per-request timeout, if any.
    #[must_use]
    pub fn timeout_value(&self) -> Option<Duration> {
        self.timeout
    }

    /// Returns the proxy URL, if any.
    #[must_use]
    pub fn proxy_value(&self) -> Option<&str> {
        self.proxy.as_deref()
    }

    /// Returns the metadata map.
    #[must_use]
    pub fn metadata(&self) -> &Map<String, Value> {
        &self.meta
    }
}
