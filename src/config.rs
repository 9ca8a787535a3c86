//! Client configuration surface (spec.md §6). Loading this from environment
//! variables is explicitly out of scope (spec.md §1); construct it directly.

use crate::breaker::BreakerConfig;
use crate::cache::CacheConfig;
use crate::ratelimit::RateLimiterConfig;
use crate::token::TokenProvider;
use std::time::Duration;

pub struct ClientConfig {
    pub base_url: String,
    pub default_timeout: Duration,
    pub max_concurrent_requests: usize,
    pub cache_config: CacheConfig,
    pub rate_limiter_config: RateLimiterConfig,
    pub breaker_config: BreakerConfig,
    pub token_provider: TokenProvider,
    pub user_agent: String,
}

impl ClientConfig {
    pub fn builder(base_url: impl Into<String>, token_provider: TokenProvider) -> ClientConfigBuilder {
        ClientConfigBuilder::new(base_url, token_provider)
    }
}

pub struct ClientConfigBuilder {
    base_url: String,
    default_timeout: Duration,
    max_concurrent_requests: usize,
    cache_config: CacheConfig,
    rate_limiter_config: RateLimiterConfig,
    breaker_config: BreakerConfig,
    token_provider: TokenProvider,
    user_agent: String,
}

impl ClientConfigBuilder {
    pub fn new(base_url: impl Into<String>, token_provider: TokenProvider) -> Self {
        Self {
            base_url: base_url.into(),
            default_timeout: Duration::from_secs(30),
            max_concurrent_requests: 5,
            cache_config: CacheConfig::default(),
            rate_limiter_config: RateLimiterConfig::default(),
            breaker_config: BreakerConfig::default(),
            token_provider,
            user_agent: "whiteboard-client/0.1".to_string(),
        }
    }

    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Default: 5.
    pub fn max_concurrent_requests(mut self, n: usize) -> Self {
        self.max_concurrent_requests = n;
        self
    }

    pub fn cache_config(mut self, cfg: CacheConfig) -> Self {
        self.cache_config = cfg;
        self
    }

    pub fn rate_limiter_config(mut self, cfg: RateLimiterConfig) -> Self {
        self.rate_limiter_config = cfg;
        self
    }

    pub fn breaker_config(mut self, cfg: BreakerConfig) -> Self {
        self.breaker_config = cfg;
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = agent.into();
        self
    }

    pub fn build(self) -> ClientConfig {
        ClientConfig {
            base_url: self.base_url,
            default_timeout: self.default_timeout,
            max_concurrent_requests: self.max_concurrent_requests,
            cache_config: self.cache_config,
            rate_limiter_config: self.rate_limiter_config,
            breaker_config: self.breaker_config,
            token_provider: self.token_provider,
            user_agent: self.user_agent,
        }
    }
}
