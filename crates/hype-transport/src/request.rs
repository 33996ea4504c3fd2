//! Request and response descriptors.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};

/// Request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    /// Upper-case method name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An outbound call, addressed to a named destination.
///
/// The payload is opaque to the proxy.
///
/// ```rust,ignore
/// let request = ProxyRequest::get("stocks", "/v1/quote")
///     .query("symbol", "GOOG")
///     .cache_for(Duration::from_secs(60));
/// let quote: Quote = proxy.call(request).await?.json()?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyRequest {
    /// Destination name, as configured on the proxy.
    pub destination: String,
    /// Method.
    pub method: Method,
    /// Path appended to the destination base URL.
    pub path: String,
    /// Query parameters, in insertion order.
    pub query: Vec<(String, String)>,
    /// Extra headers. Names are stored lower-cased.
    pub headers: BTreeMap<String, String>,
    /// Request body.
    pub body: Option<Vec<u8>>,
    /// Overrides the destination timeout.
    pub timeout: Option<Duration>,
    /// Caches successful responses for this long.
    pub cache_ttl: Option<Duration>,
}

impl ProxyRequest {
    /// Creates a request.
    pub fn new(destination: impl Into<String>, method: Method, path: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            method,
            path: path.into(),
            query: Vec::new(),
            headers: BTreeMap::new(),
            body: None,
            timeout: None,
            cache_ttl: None,
        }
    }

    /// Creates a `GET` request.
    pub fn get(destination: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(destination, Method::Get, path)
    }

    /// Creates a `POST` request.
    pub fn post(destination: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(destination, Method::Post, path)
    }

    /// Appends a query parameter.
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Sets a header.
    pub fn header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    /// Sets a raw body.
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Sets a JSON body and the matching content type.
    pub fn json<T: serde::Serialize + ?Sized>(self, value: &T) -> serde_json::Result<Self> {
        let body = serde_json::to_vec(value)?;
        Ok(self.header("content-type", "application/json").body(body))
    }

    /// Overrides the timeout for this call.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Enables response caching for this call.
    pub fn cache_for(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    /// Normalized fingerprint identifying equivalent requests.
    ///
    /// Query parameter order and header name case do not change the
    /// fingerprint; timeouts and cache settings are not part of it.
    pub fn fingerprint(&self) -> String {
        let mut query = self.query.clone();
        query.sort();

        let mut hasher = Sha256::new();
        hasher.update(self.destination.as_bytes());
        hasher.update([0]);
        hasher.update(self.method.as_str().as_bytes());
        hasher.update([0]);
        hasher.update(normalize_path(&self.path).as_bytes());
        for (name, value) in &query {
            hasher.update([1]);
            hasher.update(name.as_bytes());
            hasher.update([b'=']);
            hasher.update(value.as_bytes());
        }
        for (name, value) in &self.headers {
            hasher.update([2]);
            hasher.update(name.as_bytes());
            hasher.update([b':']);
            hasher.update(value.as_bytes());
        }
        if let Some(body) = &self.body {
            hasher.update([3]);
            hasher.update(body);
        }
        format!("{:x}", hasher.finalize())
    }
}

fn normalize_path(path: &str) -> String {
    let trimmed = path.trim().trim_matches('/');
    format!("/{trimmed}")
}

/// A successful answer from a destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyResponse {
    /// Status code.
    pub status: u16,
    /// Response headers, names lower-cased.
    pub headers: BTreeMap<String, String>,
    /// Raw body.
    pub body: Vec<u8>,
    /// Whether this response was served from the cache.
    pub cached: bool,
}

impl ProxyResponse {
    /// Creates a response with the given status and body.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: body.into(),
            cached: false,
        }
    }

    /// Body decoded as UTF-8, lossily.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Body decoded as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }

    /// Header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}
