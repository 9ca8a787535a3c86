//! Composes cache, breaker, concurrency admission, rate limiting, token
//! acquisition, transport, and classification into one ordered call
//! (spec.md §2, §4.6).

use crate::breaker::{Admission, Rejection};
use crate::cache::KeyedCache;
use crate::error::Error;
use crate::ratelimit::AdaptiveRateLimiter;
use crate::registry::{endpoint_key, BreakerRegistry};
use crate::token::TokenProvider;
use crate::transport::HttpTransport;
use crate::types::{CacheCategory, RequestBody, RequestDescriptor, ResponseRecord};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// The cooperating components a `Pipeline` owns, constructed eagerly by the
/// client (spec.md §9 — no lazily-initialized subcomponent on the hot path).
pub struct Pipeline {
    pub(crate) cache: Arc<KeyedCache>,
    pub(crate) rate_limiter: Arc<AdaptiveRateLimiter>,
    pub(crate) registry: Arc<BreakerRegistry>,
    pub(crate) token_provider: TokenProvider,
    pub(crate) transport: Arc<HttpTransport>,
    pub(crate) semaphore: Arc<Semaphore>,
}

impl Pipeline {
    #[tracing::instrument(skip(self, req, cancel), fields(path = %req.path))]
    pub async fn execute(
        &self,
        req: RequestDescriptor,
        cancel: &CancellationToken,
    ) -> Result<ResponseRecord, Error> {
        // 1. Cache read (GET only, read-through).
        if req.cacheable {
            if let Some(key) = &req.cache_key {
                if let Some(body) = self.cache.get(key) {
                    tracing::debug!(key, "cache hit");
                    return Ok(ResponseRecord {
                        status: 200,
                        body,
                        rate_limit_headers: Vec::new(),
                    });
                }
            }
        }

        // 2. Breaker admit.
        let endpoint = endpoint_key(&req.path);
        let breaker = self.registry.get(&endpoint);
        let half_open = match breaker.allow() {
            Admission::Rejected(Rejection::CircuitOpen) => {
                return Err(Error::CircuitOpen { endpoint });
            }
            Admission::Rejected(Rejection::TooManyHalfOpen) => {
                return Err(Error::TooManyHalfOpen { endpoint });
            }
            Admission::Admitted { half_open } => half_open,
        };

        // 3. Concurrency admit: acquire a slot from the global semaphore.
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                if half_open {
                    breaker.release_half_open_slot();
                }
                return Err(Error::ContextCancelled);
            }
            permit = Arc::clone(&self.semaphore).acquire_owned() => {
                permit.expect("semaphore is never closed")
            }
        };

        // 4. Rate limiter wait.
        if self.rate_limiter.wait(cancel).await.is_err() {
            drop(permit);
            if half_open {
                breaker.release_half_open_slot();
            }
            return Err(Error::ContextCancelled);
        }

        // 5. Token acquisition. An auth-provider outage counts as an
        // endpoint failure for breaker purposes; cancellation does not.
        let token = match self.token_provider.token(cancel).await {
            Ok(token) => token,
            Err(Error::ContextCancelled) => {
                drop(permit);
                if half_open {
                    breaker.release_half_open_slot();
                }
                return Err(Error::ContextCancelled);
            }
            Err(e) => {
                drop(permit);
                breaker.record_failure(half_open);
                return Err(Error::TokenUnavailable {
                    reason: e.to_string(),
                });
            }
        };

        // 6. Encode and transport.
        let auth_header = format!("Bearer {token}");
        let mut headers = vec![("Authorization", auth_header)];
        let body = match &req.body {
            None => None,
            Some(RequestBody::Json(value)) => match serde_json::to_vec(value) {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    drop(permit);
                    breaker.record_failure(half_open);
                    return Err(Error::TransportFailure {
                        reason: format!("failed to encode request body: {e}"),
                    });
                }
            },
            Some(RequestBody::Raw { bytes, content_type }) => {
                headers.push(("Content-Type", content_type.to_string()));
                Some(bytes.clone())
            }
        };

        let raw = self
            .transport
            .round_trip(req.method.clone(), &req.path, &headers, body, cancel)
            .await;
        drop(permit);

        let raw = match raw {
            Ok(raw) => raw,
            Err(Error::ContextCancelled) => {
                if half_open {
                    breaker.release_half_open_slot();
                }
                return Err(Error::ContextCancelled);
            }
            Err(e) => {
                breaker.record_failure(half_open);
                return Err(e);
            }
        };

        // 7. Response observation always runs, regardless of status.
        self.rate_limiter.observe(
            raw.headers
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str())),
        );

        // 8. Classification.
        if raw.status >= 500 {
            breaker.record_failure(half_open);
            return Err(Error::api(raw.status, &raw.body, None));
        }
        if (400..500).contains(&raw.status) {
            // Client-caused; no breaker failure recorded.
            let retry_after = if raw.status == 429 {
                raw.header("retry-after")
                    .and_then(|s| s.parse::<u64>().ok())
                    .map(std::time::Duration::from_secs)
            } else {
                None
            };
            return Err(Error::api(raw.status, &raw.body, retry_after));
        }
        breaker.record_success(half_open);

        // 9. Cache write: writes never populate the cache; only a cacheable
        // GET that completed successfully does.
        if req.cacheable && req.method == crate::types::Method::GET {
            if let Some(key) = &req.cache_key {
                let ttl = match req.cache_category {
                    Some(CacheCategory::Board) => self.cache.config().board_ttl,
                    Some(CacheCategory::Item) => self.cache.config().item_ttl,
                    Some(CacheCategory::Tag) => self.cache.config().tag_ttl,
                    None => self.cache.config().item_ttl,
                };
                self.cache.set(key.clone(), raw.body.clone(), ttl);
            }
        }

        Ok(ResponseRecord {
            status: raw.status,
            body: raw.body,
            rate_limit_headers: raw.headers,
        })
    }
}
