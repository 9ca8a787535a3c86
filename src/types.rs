//! Pipeline input/output types (spec.md §3).

use std::time::Duration;

/// HTTP method the pipeline will issue. A thin re-export so callers don't
/// need a direct `reqwest` dependency.
pub type Method = reqwest::Method;

/// Which TTL bucket a cacheable request's response should be stored under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheCategory {
    Board,
    Item,
    Tag,
}

/// A request body and how the pipeline should encode it. `Raw` models the
/// seam for an alternate encoder (e.g. multipart); encoding itself is not
/// implemented (spec.md §1 Non-goals).
#[derive(Debug, Clone)]
pub enum RequestBody {
    Json(serde_json::Value),
    Raw {
        bytes: Vec<u8>,
        content_type: &'static str,
    },
}

/// One logical call into the pipeline.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: Method,
    /// Path relative to the configured base URL, e.g. `/boards/B1`.
    pub path: String,
    pub body: Option<RequestBody>,
    pub cache_key: Option<String>,
    pub cache_category: Option<CacheCategory>,
    /// `true` iff this is an idempotent read eligible for caching.
    pub cacheable: bool,
}

impl RequestDescriptor {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            body: None,
            cache_key: None,
            cache_category: None,
            cacheable: false,
        }
    }

    pub fn json_body(mut self, value: serde_json::Value) -> Self {
        self.body = Some(RequestBody::Json(value));
        self
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn cacheable(mut self, key: impl Into<String>, category: CacheCategory) -> Self {
        self.cacheable = true;
        self.cache_key = Some(key.into());
        self.cache_category = Some(category);
        self
    }
}

/// A successful pipeline result, ready for the caller to decode.
#[derive(Debug, Clone)]
pub struct ResponseRecord {
    pub status: u16,
    pub body: Vec<u8>,
    /// Response headers relevant to rate limiting, lowercase names.
    pub rate_limit_headers: Vec<(String, String)>,
}

/// Time budget applied at the transport layer, independent of cancellation.
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub default_timeout: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(30),
        }
    }
}
