//! Pre-call adaptive throttle driven by observed rate-limit response headers.

use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio_util::sync::CancellationToken;

/// Recognized rate limiter configuration options (spec.md §3).
#[derive(Debug, Clone, Copy)]
pub struct RateLimiterConfig {
    /// `p < slowdown_threshold` triggers linear slowdown. Must be in `(0, 1]`.
    pub slowdown_threshold: f64,
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub default_limit: u64,
    /// Minimum requests held in reserve before switching to reset-wait mode.
    pub proactive_buffer: u64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            slowdown_threshold: 0.2,
            min_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            default_limit: 100,
            proactive_buffer: 5,
        }
    }
}

/// Observed rate-limit window state (spec.md §3).
#[derive(Debug, Clone, Copy)]
pub struct RateLimitState {
    pub limit: u64,
    pub remaining: u64,
    pub reset_at: Instant,
    pub updated_at: Instant,
}

/// Freshness window: a state older than this forces zero delay.
const STALE_AFTER: Duration = Duration::from_secs(60);

impl RateLimitState {
    fn fresh(now: Instant) -> Self {
        Self {
            limit: 0,
            remaining: 0,
            reset_at: now,
            // Far enough in the past to be stale from the first `Wait`.
            updated_at: now - (STALE_AFTER + Duration::from_secs(1)),
        }
    }

    fn is_stale(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.updated_at) > STALE_AFTER
    }
}

/// Accumulated rate limiter statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimiterStats {
    pub total_requests: u64,
    pub delayed_requests: u64,
    pub total_delay_ms: u64,
}

struct Inner {
    state: RateLimitState,
    stats: RateLimiterStats,
}

/// Throttles calls before they are sent, slowing down as the observed
/// rate-limit window's headroom shrinks and pausing until reset when
/// headroom is exhausted.
pub struct AdaptiveRateLimiter {
    config: RateLimiterConfig,
    inner: Mutex<Inner>,
}

impl AdaptiveRateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        let now = Instant::now();
        Self {
            config,
            inner: Mutex::new(Inner {
                state: RateLimitState::fresh(now),
                stats: RateLimiterStats::default(),
            }),
        }
    }

    /// Computes the delay, sleeps for it outside any lock, and returns how
    /// long was actually waited, or `None` if `cancel` fired first.
    pub async fn wait(&self, cancel: &CancellationToken) -> Result<Duration, ()> {
        let now = Instant::now();
        let delay = {
            let mut inner = self.inner.lock().unwrap();
            inner.stats.total_requests += 1;
            if inner.state.is_stale(now) {
                Duration::ZERO
            } else {
                self.compute_delay(&inner.state, now)
            }
        };

        if delay.is_zero() {
            return Ok(Duration::ZERO);
        }

        {
            let mut inner = self.inner.lock().unwrap();
            inner.stats.delayed_requests += 1;
            inner.stats.total_delay_ms += delay.as_millis() as u64;
        }

        tracing::debug!(?delay, "rate limiter sleeping before call");
        tokio::select! {
            _ = tokio::time::sleep(delay) => Ok(delay),
            _ = cancel.cancelled() => Err(()),
        }
    }

    fn compute_delay(&self, state: &RateLimitState, now: Instant) -> Duration {
        let cfg = &self.config;
        if state.limit == 0 {
            return Duration::ZERO;
        }
        let p = state.remaining as f64 / state.limit as f64;

        if state.remaining > cfg.proactive_buffer && p >= cfg.slowdown_threshold {
            return Duration::ZERO;
        }
        if state.remaining > cfg.proactive_buffer {
            let frac = 1.0 - (p / cfg.slowdown_threshold);
            let span = cfg.max_delay.saturating_sub(cfg.min_delay).as_secs_f64();
            return cfg.min_delay + Duration::from_secs_f64((span * frac).max(0.0));
        }
        if state.reset_at > now {
            return (state.reset_at - now).min(cfg.max_delay);
        }
        cfg.max_delay
    }

    /// Parses `X-RateLimit-Limit`, `X-RateLimit-Remaining`, `X-RateLimit-Reset`.
    /// Missing or unparsable headers leave the corresponding field unchanged.
    pub fn observe<'a>(&self, headers: impl Iterator<Item = (&'a str, &'a str)>) {
        let mut limit = None;
        let mut remaining = None;
        let mut reset = None;
        for (name, value) in headers {
            match name.to_ascii_lowercase().as_str() {
                "x-ratelimit-limit" => limit = value.parse::<u64>().ok(),
                "x-ratelimit-remaining" => remaining = value.parse::<u64>().ok(),
                "x-ratelimit-reset" => reset = value.parse::<u64>().ok(),
                _ => {}
            }
        }
        if limit.is_none() && remaining.is_none() && reset.is_none() {
            return;
        }

        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap();
        if let Some(limit) = limit {
            inner.state.limit = limit;
        }
        if let Some(remaining) = remaining {
            inner.state.remaining = remaining;
        }
        if let Some(reset) = reset {
            inner.state.reset_at = if reset > 1_000_000_000 {
                let now_unix = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_secs();
                let delta = reset.saturating_sub(now_unix);
                now + Duration::from_secs(delta)
            } else {
                now + Duration::from_secs(reset)
            };
        }
        inner.state.updated_at = now;
        tracing::debug!(
            limit = inner.state.limit,
            remaining = inner.state.remaining,
            "observed rate-limit headers"
        );
    }

    pub fn state(&self) -> RateLimitState {
        self.inner.lock().unwrap().state
    }

    pub fn stats(&self) -> RateLimiterStats {
        self.inner.lock().unwrap().stats
    }

    pub fn reset(&self) {
        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap();
        inner.state = RateLimitState::fresh(now);
        inner.stats = RateLimiterStats::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Iterator<Item = (&'a str, &'a str)> {
        pairs.iter().copied()
    }

    #[tokio::test]
    async fn stale_state_never_delays() {
        let rl = AdaptiveRateLimiter::new(RateLimiterConfig::default());
        let delay = rl.wait(&CancellationToken::new()).await.unwrap();
        assert_eq!(delay, Duration::ZERO);
    }

    #[tokio::test]
    async fn fresh_headroom_delays_near_formula() {
        let cfg = RateLimiterConfig {
            slowdown_threshold: 0.2,
            min_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            default_limit: 100,
            proactive_buffer: 5,
        };
        let rl = AdaptiveRateLimiter::new(cfg);
        rl.observe(headers(&[
            ("X-RateLimit-Limit", "100"),
            ("X-RateLimit-Remaining", "10"),
            ("X-RateLimit-Reset", "60"),
        ]));
        let delay = rl.wait(&CancellationToken::new()).await.unwrap();
        // p=0.1, expected ~= 100ms + 1900ms*(1-0.5) = 1.05s
        assert!(delay > Duration::from_millis(100));
        assert!(delay < Duration::from_secs(2));
        assert!(delay.as_millis().abs_diff(1050) < 50);
    }

    #[tokio::test]
    async fn exhausted_remaining_waits_for_reset() {
        let cfg = RateLimiterConfig {
            proactive_buffer: 5,
            max_delay: Duration::from_secs(5),
            ..Default::default()
        };
        let rl = AdaptiveRateLimiter::new(cfg);
        rl.observe(headers(&[
            ("X-RateLimit-Limit", "100"),
            ("X-RateLimit-Remaining", "0"),
            ("X-RateLimit-Reset", "2"),
        ]));
        let delay = rl.wait(&CancellationToken::new()).await.unwrap();
        assert!(delay <= Duration::from_secs(2) && delay > Duration::from_secs(1));
    }

    #[tokio::test]
    async fn cancellation_during_wait_returns_err() {
        let cfg = RateLimiterConfig {
            min_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(10),
            proactive_buffer: 5,
            ..Default::default()
        };
        let rl = AdaptiveRateLimiter::new(cfg);
        rl.observe(headers(&[
            ("X-RateLimit-Limit", "100"),
            ("X-RateLimit-Remaining", "1"),
            ("X-RateLimit-Reset", "30"),
        ]));
        let token = CancellationToken::new();
        let token2 = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            token2.cancel();
        });
        assert!(rl.wait(&token).await.is_err());
    }

    #[test]
    fn invalid_headers_leave_state_unchanged() {
        let rl = AdaptiveRateLimiter::new(RateLimiterConfig::default());
        rl.observe(headers(&[("X-RateLimit-Limit", "not-a-number")]));
        assert_eq!(rl.state().limit, 0);
    }
}
