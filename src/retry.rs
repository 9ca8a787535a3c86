//! Exponential-backoff retry for rate-limited calls, layered above the
//! pipeline rather than inside it (spec.md §4.7). Retries only a 429
//! response; every other outcome — including a circuit-open rejection or a
//! 5xx — is returned to the caller untouched.

use crate::error::Error;
use crate::pipeline::Pipeline;
use crate::types::{RequestDescriptor, ResponseRecord};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
        }
    }
}

/// Runs `req` through `pipeline`, retrying a 429 response up to
/// `config.max_retries` times. Honors `Retry-After` when the upstream sent
/// one, otherwise doubles `config.initial_delay` each attempt.
pub async fn execute_with_retry(
    pipeline: &Pipeline,
    req: RequestDescriptor,
    cancel: &CancellationToken,
    config: RetryConfig,
) -> Result<ResponseRecord, Error> {
    let mut attempt = 0;
    let mut delay = config.initial_delay;
    loop {
        let result = pipeline.execute(req.clone(), cancel).await;
        let err = match result {
            Ok(response) => return Ok(response),
            Err(e) => e,
        };
        if !err.is_retryable_for_backoff() || attempt >= config.max_retries {
            return Err(err);
        }
        let wait = match &err {
            Error::ApiError {
                retry_after: Some(ra),
                ..
            } => *ra,
            _ => delay,
        };
        attempt += 1;
        tracing::info!(attempt, ?wait, "retrying rate-limited request");
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::ContextCancelled),
            _ = tokio::time::sleep(wait) => {}
        }
        delay *= 2;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::BreakerConfig;
    use crate::cache::{CacheConfig, KeyedCache};
    use crate::ratelimit::{AdaptiveRateLimiter, RateLimiterConfig};
    use crate::registry::BreakerRegistry;
    use crate::token::TokenProvider;
    use crate::transport::{HttpTransport, TransportConfig};
    use std::sync::Arc;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn test_pipeline(base_url: &str) -> Pipeline {
        Pipeline {
            cache: Arc::new(KeyedCache::new(CacheConfig::default())),
            rate_limiter: Arc::new(AdaptiveRateLimiter::new(RateLimiterConfig::default())),
            registry: Arc::new(BreakerRegistry::new(BreakerConfig::default())),
            token_provider: TokenProvider::Static("tok".to_string()),
            transport: Arc::new(HttpTransport::new(TransportConfig::new(base_url)).unwrap()),
            semaphore: Arc::new(tokio::sync::Semaphore::new(5)),
        }
    }

    #[tokio::test]
    async fn retries_429_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ok".to_vec()))
            .mount(&server)
            .await;

        let pipeline = test_pipeline(&server.uri()).await;
        let cancel = CancellationToken::new();
        let response = execute_with_retry(
            &pipeline,
            RequestDescriptor::get("/boards"),
            &cancel,
            RetryConfig {
                max_retries: 3,
                initial_delay: Duration::from_millis(1),
            },
        )
        .await
        .unwrap();
        assert_eq!(response.status, 200);
    }

    #[tokio::test]
    async fn exhausts_retries_and_returns_429() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let pipeline = test_pipeline(&server.uri()).await;
        let cancel = CancellationToken::new();
        let err = execute_with_retry(
            &pipeline,
            RequestDescriptor::get("/boards"),
            &cancel,
            RetryConfig {
                max_retries: 2,
                initial_delay: Duration::from_millis(1),
            },
        )
        .await
        .unwrap_err();
        assert!(err.is_rate_limited());
    }

    #[tokio::test]
    async fn does_not_retry_non_429_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let pipeline = test_pipeline(&server.uri()).await;
        let cancel = CancellationToken::new();
        let err = execute_with_retry(
            &pipeline,
            RequestDescriptor::get("/boards"),
            &cancel,
            RetryConfig::default(),
        )
        .await
        .unwrap_err();
        assert!(err.is_not_found());
    }
}
