//! Resilient request-execution core for a collaborative whiteboard REST API
//! client: a fixed-order pipeline composing a response cache, a per-endpoint
//! circuit breaker registry, a global concurrency bulkhead, an adaptive
//! rate limiter, token acquisition, and HTTP transport. The full domain API
//! surface, input validation, env-based configuration, and observability
//! reporting are deliberately out of scope here; see [`boards`] for a thin
//! illustrative wrapper showing how a domain layer rides on top of it.

pub mod boards;
pub mod breaker;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod ratelimit;
pub mod registry;
pub mod retry;
pub mod token;
pub mod transport;
pub mod types;

pub use breaker::{Breaker, BreakerConfig, BreakerStats, CircuitState};
pub use cache::{CacheConfig, CacheStats, KeyedCache};
pub use client::WhiteboardClient;
pub use config::{ClientConfig, ClientConfigBuilder};
pub use error::{Error, Result};
pub use pipeline::Pipeline;
pub use ratelimit::{AdaptiveRateLimiter, RateLimiterConfig, RateLimiterStats};
pub use registry::{endpoint_key, BreakerRegistry};
pub use retry::RetryConfig;
pub use token::{CachingTokenProvider, RefreshableToken, TokenProvider};
pub use transport::{HttpTransport, TransportConfig};
pub use types::{CacheCategory, Method, RequestBody, RequestDescriptor, ResponseRecord};
