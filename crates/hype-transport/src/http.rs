//! HTTP transport backed by `reqwest`.
//!
//! Failure classification:
//!
//! | Outcome | Error |
//! |---------|-------|
//! | client timeout | [`ProxyError::Timeout`] |
//! | connect / DNS / TLS failure | [`ProxyError::Unreachable`] |
//! | `429` | [`ProxyError::RateLimited`] (`Retry-After` seconds honoured) |
//! | other non-2xx | [`ProxyError::Upstream`] |

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder, StatusCode};
use tracing::debug;

use crate::error::{ProxyError, ProxyResult};
use crate::request::{Method, ProxyRequest, ProxyResponse};
use crate::transport::{Endpoint, Transport};

/// [`Transport`] speaking HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Creates a transport with a fresh connection pool.
    pub fn new() -> ProxyResult<Self> {
        let client = ClientBuilder::new()
            .user_agent(concat!("hype/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProxyError::unreachable("http", e.to_string()))?;
        Ok(Self { client })
    }

    /// Wraps an existing client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn method(method: Method) -> reqwest::Method {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        }
    }

    fn classify(endpoint: &Endpoint, timeout: Duration, error: reqwest::Error) -> ProxyError {
        if error.is_timeout() {
            ProxyError::Timeout {
                destination: endpoint.name.clone(),
                elapsed: timeout,
            }
        } else {
            ProxyError::unreachable(&endpoint.name, error.to_string())
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(
        &self,
        endpoint: &Endpoint,
        request: &ProxyRequest,
        timeout: Duration,
    ) -> ProxyResult<ProxyResponse> {
        let raw_url = endpoint.url_for(&request.path);
        let url = if request.query.is_empty() {
            reqwest::Url::parse(&raw_url)
        } else {
            reqwest::Url::parse_with_params(&raw_url, &request.query)
        }
        .map_err(|e| ProxyError::unreachable(&endpoint.name, format!("invalid URL: {e}")))?;
        debug!(destination = %endpoint.name, method = %request.method, url = %url, "Proxying request");

        let mut builder = self
            .client
            .request(Self::method(request.method), url)
            .timeout(timeout);
        for (name, value) in endpoint.headers.iter().chain(request.headers.iter()) {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Self::classify(endpoint, timeout, e))?;

        let status = response.status();
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| Self::classify(endpoint, timeout, e))?;

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = headers
                .get("retry-after")
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(ProxyError::RateLimited {
                destination: endpoint.name.clone(),
                retry_after,
            });
        }
        if !status.is_success() {
            return Err(ProxyError::upstream(
                &endpoint.name,
                status.as_u16(),
                String::from_utf8_lossy(&body),
            ));
        }

        Ok(ProxyResponse {
            status: status.as_u16(),
            headers,
            body: body.to_vec(),
            cached: false,
        })
    }
}
