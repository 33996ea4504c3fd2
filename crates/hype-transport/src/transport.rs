//! Wire transport seam.
//!
//! The [`Proxy`](crate::Proxy) applies policy (limits, retries, caching) and
//! delegates the actual exchange to a [`Transport`]. The HTTP implementation
//! lives in [`http`](crate::http) behind the `http-client` feature; tests and
//! non-HTTP protocols provide their own.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::ProxyResult;
use crate::rate_limit::RateLimitPolicy;
use crate::request::{ProxyRequest, ProxyResponse};
use crate::retry::RetryPolicy;

/// A configured destination.
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    /// Destination name requests refer to.
    pub name: String,
    /// Base URL; request paths are appended to it.
    pub base_url: String,
    /// Headers sent with every request (API keys, user agent).
    pub headers: BTreeMap<String, String>,
    /// Default per-request timeout.
    pub timeout: Duration,
    /// Rate-limiting policy shared by all callers.
    pub rate_limit: RateLimitPolicy,
    /// How long a caller may wait for a rate-limit permit.
    pub max_wait: Duration,
    /// Retry policy for transient failures.
    pub retry: RetryPolicy,
}

impl Endpoint {
    /// Creates an endpoint with default policies.
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            headers: BTreeMap::new(),
            timeout: Duration::from_secs(10),
            rate_limit: RateLimitPolicy::Unlimited,
            max_wait: Duration::ZERO,
            retry: RetryPolicy::default(),
        }
    }

    /// Adds a default header.
    pub fn header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    /// Sets the default timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the rate-limiting policy and the longest permit wait.
    pub fn rate_limit(mut self, policy: RateLimitPolicy, max_wait: Duration) -> Self {
        self.rate_limit = policy;
        self.max_wait = max_wait;
        self
    }

    /// Sets the retry policy.
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Full URL for a request path.
    pub fn url_for(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        if path.is_empty() {
            base.to_string()
        } else {
            format!("{base}/{path}")
        }
    }
}

/// Performs one exchange with a destination.
///
/// Implementations must classify every failure into a
/// [`ProxyError`](crate::ProxyError); non-2xx answers are failures too.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Executes `request` against `endpoint`, giving up after `timeout`.
    async fn execute(
        &self,
        endpoint: &Endpoint,
        request: &ProxyRequest,
        timeout: Duration,
    ) -> ProxyResult<ProxyResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_for() {
        let endpoint = Endpoint::new("stocks", "https://api.example.com/v1/");
        assert_eq!(endpoint.url_for("/quote"), "https://api.example.com/v1/quote");
        assert_eq!(endpoint.url_for("quote"), "https://api.example.com/v1/quote");
        assert_eq!(endpoint.url_for(""), "https://api.example.com/v1");
    }
}
