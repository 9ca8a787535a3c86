//! Stateless HTTP transport: encode, execute through a pooled connection,
//! read the full body.

use crate::error::Error;
use crate::types::Method;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Connection pool parameters (spec.md §4.5 defaults).
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub base_url: String,
    pub user_agent: String,
    pub default_timeout: Duration,
    pub pool_max_idle_per_host: usize,
    pub pool_idle_timeout: Duration,
}

impl TransportConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            user_agent: "whiteboard-client/0.1".to_string(),
            default_timeout: Duration::from_secs(30),
            pool_max_idle_per_host: 10,
            pool_idle_timeout: Duration::from_secs(90),
        }
    }
}

/// A response exactly as the wire returned it, headers included, before
/// classification or rate-limit-header extraction.
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
    /// All response headers, lowercase names, as `(name, value)` pairs.
    pub headers: Vec<(String, String)>,
}

impl RawResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

pub struct HttpTransport {
    client: reqwest::Client,
    config: TransportConfig,
}

impl HttpTransport {
    pub fn new(config: TransportConfig) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .pool_idle_timeout(config.pool_idle_timeout)
            .build()
            .map_err(|e| Error::TransportFailure {
                reason: e.to_string(),
            })?;
        Ok(Self { client, config })
    }

    /// Executes one request. Races the per-call default timeout against the
    /// caller's cancellation signal; a cancellation mid-flight is treated
    /// identically to a transport error for releasing resources, but the
    /// pipeline is responsible for not recording it as a breaker failure.
    pub async fn round_trip(
        &self,
        method: Method,
        path: &str,
        headers: &[(&str, String)],
        body: Option<Vec<u8>>,
        cancel: &CancellationToken,
    ) -> Result<RawResponse, Error> {
        let url = format!(
            "{}{}",
            self.config.base_url.trim_end_matches('/'),
            path
        );

        let mut builder = self
            .client
            .request(method, &url)
            .header(reqwest::header::USER_AGENT, &self.config.user_agent)
            .header(reqwest::header::ACCEPT, "application/json");
        let has_content_type = headers
            .iter()
            .any(|(name, _)| name.eq_ignore_ascii_case("content-type"));
        for (name, value) in headers {
            builder = builder.header(*name, value.as_str());
        }
        if let Some(body) = body {
            if !has_content_type {
                builder = builder.header(reqwest::header::CONTENT_TYPE, "application/json");
            }
            builder = builder.body(body);
        }

        let call = async move {
            let response = builder.send().await.map_err(|e| Error::TransportFailure {
                reason: e.to_string(),
            })?;
            let status = response.status().as_u16();
            let headers = response
                .headers()
                .iter()
                .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_lowercase(), v.to_string())))
                .collect();
            let body = response
                .bytes()
                .await
                .map_err(|e| Error::TransportFailure {
                    reason: e.to_string(),
                })?
                .to_vec();
            Ok(RawResponse {
                status,
                body,
                headers,
            })
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::ContextCancelled),
            result = tokio::time::timeout(self.config.default_timeout, call) => {
                match result {
                    Ok(inner) => inner,
                    Err(_elapsed) => Err(Error::TransportFailure {
                        reason: "request timed out".to_string(),
                    }),
                }
            }
        }
    }
}
