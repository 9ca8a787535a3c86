//! Thread-safe TTL+LRU response cache with prefix invalidation.
//!
//! Payloads are stored as opaque bytes rather than `Box<dyn Any>` — the
//! caller (a domain wrapper) owns decoding, the cache owns bytes and
//! expiry/eviction bookkeeping only (see `DESIGN.md`, re-architecture note
//! on dynamic cache payloads).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// Recognized cache configuration options (spec.md §3, `CacheConfig`).
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    pub board_ttl: Duration,
    pub item_ttl: Duration,
    pub tag_ttl: Duration,
    /// `0` means unbounded.
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            board_ttl: Duration::from_secs(300),
            item_ttl: Duration::from_secs(60),
            tag_ttl: Duration::from_secs(300),
            max_entries: 10_000,
        }
    }
}

/// Monotonic, atomically readable counters (spec.md §3, `CacheStats`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub invalidations: u64,
}

struct CacheEntry {
    value: Vec<u8>,
    expires_at: Instant,
    #[cfg_attr(not(test), allow(dead_code))]
    ttl: Duration,
    /// Nanoseconds since the cache's `created_at` instant; used only to
    /// order entries for LRU eviction, not as a wall-clock timestamp.
    last_accessed_nanos: AtomicU64,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// A thread-safe, TTL- and size-bounded cache keyed by string.
///
/// Readers take a shared lock over the map; last-accessed bookkeeping is
/// atomic so a read never needs to upgrade to an exclusive lock on the
/// common (non-expired, non-evicting) path.
pub struct KeyedCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    config: CacheConfig,
    created_at: Instant,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    invalidations: AtomicU64,
}

impl KeyedCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            config,
            created_at: Instant::now(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn now_nanos(&self) -> u64 {
        self.created_at.elapsed().as_nanos() as u64
    }

    /// Returns the value iff an entry exists and has not expired. An expired
    /// hit is removed and counted as a miss.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        let now = Instant::now();
        {
            let map = self.entries.read().unwrap();
            if let Some(entry) = map.get(key) {
                if !entry.is_expired(now) {
                    entry
                        .last_accessed_nanos
                        .store(self.now_nanos(), Ordering::Relaxed);
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(entry.value.clone());
                }
            } else {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        }
        // Expired: drop the shared guard, take an exclusive one to remove it.
        let mut map = self.entries.write().unwrap();
        if let Some(entry) = map.get(key) {
            if entry.is_expired(now) {
                map.remove(key);
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Inserts or replaces `key`. Evicts expired entries, then (if still at
    /// capacity) approximately 10% of entries by oldest last-accessed time.
    pub fn set(&self, key: impl Into<String>, value: Vec<u8>, ttl: Duration) {
        let key = key.into();
        let now = Instant::now();
        let mut map = self.entries.write().unwrap();

        if self.config.max_entries > 0
            && !map.contains_key(&key)
            && map.len() >= self.config.max_entries
        {
            self.evict_expired_locked(&mut map, now);
            if map.len() >= self.config.max_entries {
                self.evict_lru_locked(&mut map);
            }
        }

        map.insert(
            key,
            CacheEntry {
                value,
                expires_at: now + ttl,
                ttl,
                last_accessed_nanos: AtomicU64::new(self.now_nanos()),
            },
        );
    }

    fn evict_expired_locked(&self, map: &mut HashMap<String, CacheEntry>, now: Instant) {
        let expired: Vec<String> = map
            .iter()
            .filter(|(_, e)| e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in expired {
            map.remove(&key);
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn evict_lru_locked(&self, map: &mut HashMap<String, CacheEntry>) {
        let target = ((map.len() as f64 * 0.10).ceil() as usize).max(1);
        let mut by_age: Vec<(String, u64)> = map
            .iter()
            .map(|(k, e)| (k.clone(), e.last_accessed_nanos.load(Ordering::Relaxed)))
            .collect();
        by_age.sort_by_key(|(_, age)| *age);
        for (key, _) in by_age.into_iter().take(target) {
            map.remove(&key);
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Removes one entry. Counts an invalidation iff an entry was present.
    pub fn invalidate(&self, key: &str) {
        let mut map = self.entries.write().unwrap();
        if map.remove(key).is_some() {
            self.invalidations.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Removes every entry whose key starts with `prefix`.
    pub fn invalidate_prefix(&self, prefix: &str) {
        let mut map = self.entries.write().unwrap();
        let matching: Vec<String> = map
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        for key in matching {
            map.remove(&key);
            self.invalidations.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn clear(&self) {
        self.entries.write().unwrap().clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }

    pub fn size(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    /// Remaining TTL configured for an entry, if present (used by tests only).
    #[cfg(test)]
    fn ttl_of(&self, key: &str) -> Option<Duration> {
        self.entries.read().unwrap().get(key).map(|e| e.ttl)
    }
}

/// Named cache-key builders (spec.md §4.1).
pub mod keys {
    pub fn board(id: &str) -> String {
        format!("board:{id}")
    }

    pub fn boards_all() -> String {
        "boards:all".to_string()
    }

    pub fn boards_query(q: &str) -> String {
        format!("boards:query:{q}")
    }

    pub fn item(board: &str, item: &str) -> String {
        format!("item:{board}:{item}")
    }

    pub fn items(board: &str, item_type: &str, cursor: &str) -> String {
        format!("items:{board}:{item_type}:{cursor}")
    }

    pub fn tags(board: &str) -> String {
        format!("tags:{board}")
    }

    pub fn connectors(board: &str) -> String {
        format!("connectors:{board}")
    }

    pub fn token_userinfo() -> String {
        "token:userinfo".to_string()
    }
}

/// The fixed invalidation rule table of spec.md §4.6 step 10.
pub fn board_invalidation_prefixes(board_id: &str) -> [String; 5] {
    [
        keys::board(board_id),
        format!("items:{board_id}"),
        format!("item:{board_id}"),
        keys::tags(board_id),
        keys::connectors(board_id),
    ]
}
