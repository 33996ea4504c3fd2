//! The shared outbound-call proxy.
//!
//! One [`Proxy`] serves every plugin. For each call it:
//!
//! 1. looks up the named [`Endpoint`];
//! 2. answers from the [`ResponseCache`] when the request asks for caching
//!    and a fresh entry exists;
//! 3. takes a permit from the destination's rate limiter, waiting at most the
//!    endpoint's `max_wait`;
//! 4. executes the exchange under a timeout;
//! 5. retries transient failures with exponential backoff;
//! 6. caches successful answers for the requested TTL.
//!
//! An upstream `429` with a `Retry-After` puts the destination on hold, so
//! later callers are refused locally until the upstream is ready again.
//!
//! # Example
//!
//! ```rust,ignore
//! let proxy = Proxy::builder()
//!     .endpoint(
//!         Endpoint::new("stocks", "https://api.example.com")
//!             .rate_limit(RateLimitPolicy::FixedWindow { max_requests: 5, window: Duration::from_secs(1) }, Duration::from_millis(500)),
//!     )
//!     .build()?;
//!
//! let response = proxy
//!     .call(ProxyRequest::get("stocks", "/quote").query("symbol", "GOOG").cache_for(Duration::from_secs(60)))
//!     .await?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use crate::cache::ResponseCache;
use crate::error::{ProxyError, ProxyResult};
use crate::rate_limit::RateLimiter;
use crate::request::{ProxyRequest, ProxyResponse};
use crate::transport::{Endpoint, Transport};

/// Policy-enforcing front for every outbound call.
pub struct Proxy {
    transport: Arc<dyn Transport>,
    endpoints: HashMap<String, Endpoint>,
    limiter: RateLimiter,
    cache: ResponseCache,
}

impl std::fmt::Debug for Proxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Proxy")
            .field("endpoints", &self.endpoints.keys().collect::<Vec<_>>())
            .field("cached", &self.cache.len())
            .finish_non_exhaustive()
    }
}

impl Proxy {
    /// Starts building a proxy.
    pub fn builder() -> ProxyBuilder {
        ProxyBuilder::default()
    }

    /// Configured endpoint by name.
    pub fn endpoint(&self, name: &str) -> Option<&Endpoint> {
        self.endpoints.get(name)
    }

    /// Names of all configured destinations.
    pub fn destinations(&self) -> impl Iterator<Item = &str> {
        self.endpoints.keys().map(String::as_str)
    }

    /// The response cache.
    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Performs a call under the destination's policies.
    #[instrument(
        name = "proxy",
        skip(self, request),
        fields(destination = %request.destination, method = %request.method, path = %request.path)
    )]
    pub async fn call(&self, request: ProxyRequest) -> ProxyResult<ProxyResponse> {
        let endpoint = self.endpoints.get(&request.destination).ok_or_else(|| {
            ProxyError::unreachable(&request.destination, "destination is not configured")
        })?;

        let fingerprint = request.cache_ttl.map(|_| request.fingerprint());
        if let Some(hit) = fingerprint.as_deref().and_then(|fp| self.cache.get(fp)) {
            debug!("Served from cache");
            return Ok(hit);
        }

        let timeout = request.timeout.unwrap_or(endpoint.timeout);
        let mut retries = 0;
        loop {
            self.limiter
                .acquire(&endpoint.name, &endpoint.rate_limit, endpoint.max_wait)
                .await
                .map_err(|wait| ProxyError::RateLimited {
                    destination: endpoint.name.clone(),
                    retry_after: Some(wait),
                })?;

            match self.attempt(endpoint, &request, timeout).await {
                Ok(response) => {
                    if let (Some(fingerprint), Some(ttl)) = (fingerprint, request.cache_ttl) {
                        self.cache.insert(fingerprint, response.clone(), ttl);
                    }
                    return Ok(response);
                }
                Err(ProxyError::RateLimited {
                    destination,
                    retry_after: Some(wait),
                }) => {
                    self.limiter.hold(&endpoint.name, wait);
                    warn!(retry_after = ?wait, "Upstream rate limit, holding destination");
                    return Err(ProxyError::RateLimited {
                        destination,
                        retry_after: Some(wait),
                    });
                }
                Err(e) if endpoint.retry.should_retry(&e, retries) => {
                    retries += 1;
                    let delay = endpoint.retry.delay_for(retries);
                    warn!(error = %e, retry = retries, delay = ?delay, "Transient proxy failure, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    warn!(error = %e, retries, "Proxy call failed");
                    return Err(e);
                }
            }
        }
    }

    async fn attempt(
        &self,
        endpoint: &Endpoint,
        request: &ProxyRequest,
        timeout: Duration,
    ) -> ProxyResult<ProxyResponse> {
        match tokio::time::timeout(timeout, self.transport.execute(endpoint, request, timeout)).await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(ProxyError::Timeout {
                destination: endpoint.name.clone(),
                elapsed: timeout,
            }),
        }
    }
}

/// Builder for [`Proxy`].
#[derive(Default)]
pub struct ProxyBuilder {
    transport: Option<Arc<dyn Transport>>,
    endpoints: HashMap<String, Endpoint>,
    cache_capacity: Option<usize>,
}

impl ProxyBuilder {
    /// Sets the wire transport.
    ///
    /// Defaults to [`HttpTransport`](crate::HttpTransport) when the
    /// `http-client` feature is enabled.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Adds (or replaces) a destination.
    pub fn endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoints.insert(endpoint.name.clone(), endpoint);
        self
    }

    /// Limits the number of cached responses.
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = Some(capacity);
        self
    }

    /// Builds the proxy.
    pub fn build(self) -> ProxyResult<Proxy> {
        let transport = match self.transport {
            Some(transport) => transport,
            None => default_transport()?,
        };
        Ok(Proxy {
            transport,
            endpoints: self.endpoints,
            limiter: RateLimiter::new(),
            cache: self
                .cache_capacity
                .map(ResponseCache::new)
                .unwrap_or_default(),
        })
    }
}

#[cfg(feature = "http-client")]
fn default_transport() -> ProxyResult<Arc<dyn Transport>> {
    Ok(Arc::new(crate::http::HttpTransport::new()?))
}

#[cfg(not(feature = "http-client"))]
fn default_transport() -> ProxyResult<Arc<dyn Transport>> {
    Err(ProxyError::unreachable(
        "proxy",
        "no transport configured and the http-client feature is disabled",
    ))
}
