//! Endpoint-key derivation and the per-endpoint breaker registry.

use crate::breaker::{Breaker, BreakerConfig, BreakerStats};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Path segments that are never replaced by `{id}` (spec.md §4.3).
const KNOWN_SEGMENTS: &[&str] = &[
    "boards",
    "items",
    "sticky_notes",
    "shapes",
    "text",
    "connectors",
    "frames",
    "cards",
    "images",
    "documents",
    "embeds",
    "tags",
    "groups",
    "members",
    "mindmaps",
    "nodes",
    "export",
    "jobs",
    "picture",
    "copy",
    "orgs",
    "users",
    "me",
    "teams",
];

/// Normalizes `path` into an endpoint key: split on `/`, drop the query
/// string, replace any segment not in the known literal set with `{id}`,
/// collapse consecutive `{id}` placeholders into one. Idempotent.
pub fn endpoint_key(path: &str) -> String {
    let path = path.split('?').next().unwrap_or(path);

    let mut out_segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        if segment.is_empty() {
            continue;
        }
        let normalized = if KNOWN_SEGMENTS.contains(&segment) || segment == "{id}" {
            segment
        } else {
            "{id}"
        };
        if normalized == "{id}" && out_segments.last() == Some(&"{id}") {
            continue;
        }
        out_segments.push(normalized);
    }
    format!("/{}", out_segments.join("/"))
}

/// Lazily creates and retains one [`Breaker`] per endpoint key for the
/// lifetime of the process. The map lock is always released before any
/// operation on an individual breaker.
pub struct BreakerRegistry {
    config: BreakerConfig,
    breakers: RwLock<HashMap<String, Arc<Breaker>>>,
}

impl BreakerRegistry {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            breakers: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, endpoint: &str) -> Arc<Breaker> {
        if let Some(b) = self.breakers.read().unwrap().get(endpoint) {
            return Arc::clone(b);
        }
        let mut map = self.breakers.write().unwrap();
        Arc::clone(
            map.entry(endpoint.to_string())
                .or_insert_with(|| Arc::new(Breaker::new(self.config))),
        )
    }

    pub fn all_stats(&self) -> HashMap<String, BreakerStats> {
        self.breakers
            .read()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.clone(), v.stats()))
            .collect()
    }

    pub fn reset(&self) {
        for breaker in self.breakers.read().unwrap().values() {
            breaker.reset();
        }
    }
}
