//! The facade domain wrappers call into. Every subcomponent is constructed
//! eagerly here; nothing on the request path does lazy initialization.

use crate::breaker::BreakerStats;
use crate::cache::{CacheStats, KeyedCache};
use crate::config::ClientConfig;
use crate::error::Error;
use crate::pipeline::Pipeline;
use crate::ratelimit::{AdaptiveRateLimiter, RateLimiterStats};
use crate::registry::BreakerRegistry;
use crate::retry::{execute_with_retry, RetryConfig};
use crate::transport::{HttpTransport, TransportConfig};
use crate::types::{RequestDescriptor, ResponseRecord};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

pub struct WhiteboardClient {
    pipeline: Pipeline,
    retry_config: RetryConfig,
}

impl WhiteboardClient {
    pub fn new(config: ClientConfig) -> Result<Self, Error> {
        let mut transport_config = TransportConfig::new(&config.base_url);
        transport_config.user_agent = config.user_agent.clone();
        transport_config.default_timeout = config.default_timeout;

        let pipeline = Pipeline {
            cache: Arc::new(KeyedCache::new(config.cache_config)),
            rate_limiter: Arc::new(AdaptiveRateLimiter::new(config.rate_limiter_config)),
            registry: Arc::new(BreakerRegistry::new(config.breaker_config)),
            token_provider: config.token_provider,
            transport: Arc::new(HttpTransport::new(transport_config)?),
            semaphore: Arc::new(Semaphore::new(config.max_concurrent_requests)),
        };

        Ok(Self {
            pipeline,
            retry_config: RetryConfig::default(),
        })
    }

    /// Executes one request through the full pipeline, with the layered
    /// 429 retry helper wrapped around it.
    pub async fn send(
        &self,
        req: RequestDescriptor,
        cancel: &CancellationToken,
    ) -> Result<ResponseRecord, Error> {
        execute_with_retry(&self.pipeline, req, cancel, self.retry_config).await
    }

    pub fn invalidate(&self, key: &str) {
        self.pipeline.cache.invalidate(key);
    }

    pub fn invalidate_prefix(&self, prefix: &str) {
        self.pipeline.cache.invalidate_prefix(prefix);
    }

    /// Applies the fixed board invalidation rule table (spec.md §4.6 step 10):
    /// a board mutation invalidates the board itself plus its items, tags,
    /// and connectors.
    pub fn invalidate_board(&self, board_id: &str) {
        for prefix in crate::cache::board_invalidation_prefixes(board_id) {
            self.pipeline.cache.invalidate_prefix(&prefix);
        }
    }

    /// Invalidates a single item after an item-scoped mutation: the item's
    /// own entry plus any list view keyed under `items:{board_id}` (spec.md
    /// §4.6 step 10).
    pub fn invalidate_item(&self, board_id: &str, item_id: &str) {
        self.pipeline
            .cache
            .invalidate(&crate::cache::keys::item(board_id, item_id));
        self.pipeline
            .cache
            .invalidate_prefix(&format!("items:{board_id}"));
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.pipeline.cache.stats()
    }

    pub fn rate_limiter_stats(&self) -> RateLimiterStats {
        self.pipeline.rate_limiter.stats()
    }

    pub fn breaker_stats(&self) -> HashMap<String, BreakerStats> {
        self.pipeline.registry.all_stats()
    }
}
