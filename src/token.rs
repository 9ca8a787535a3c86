//! Token acquisition. The pipeline treats a provider as an opaque supplier
//! and never mutates it.

use crate::error::Error;
use futures::future::BoxFuture;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// A capability that can be asked for a currently-valid access token and may
/// block briefly on refresh. Implementors own their own caching and
/// serialization discipline.
pub trait RefreshableToken: Send + Sync {
    fn token<'a>(&'a self, cancel: &'a CancellationToken) -> BoxFuture<'a, Result<String, Error>>;
}

/// Static token, or a refreshable provider with its own refresh discipline.
#[derive(Clone)]
pub enum TokenProvider {
    Static(String),
    Refreshable(Arc<dyn RefreshableToken>),
}

impl TokenProvider {
    pub async fn token(&self, cancel: &CancellationToken) -> Result<String, Error> {
        match self {
            TokenProvider::Static(t) => Ok(t.clone()),
            TokenProvider::Refreshable(p) => p.token(cancel).await,
        }
    }
}

/// A refreshable provider that caches the last fetched token until a
/// caller-supplied expiry, serializing concurrent refreshes behind a single
/// lock so only one in-flight fetch happens at a time.
pub struct CachingTokenProvider<F> {
    fetch: F,
    cached: Mutex<Option<(String, Instant)>>,
    margin: Duration,
}

impl<F> CachingTokenProvider<F>
where
    F: Fn(&CancellationToken) -> BoxFuture<'_, Result<(String, Duration), Error>> + Send + Sync,
{
    /// `fetch` returns a new token and its remaining validity duration.
    /// `margin` is how long before expiry a refresh is triggered early.
    pub fn new(fetch: F, margin: Duration) -> Self {
        Self {
            fetch,
            cached: Mutex::new(None),
            margin,
        }
    }
}

impl<F> RefreshableToken for CachingTokenProvider<F>
where
    F: for<'a> Fn(&'a CancellationToken) -> BoxFuture<'a, Result<(String, Duration), Error>>
        + Send
        + Sync,
{
    fn token<'a>(&'a self, cancel: &'a CancellationToken) -> BoxFuture<'a, Result<String, Error>> {
        Box::pin(async move {
            {
                let guard = self.cached.lock().unwrap();
                if let Some((token, expires_at)) = guard.as_ref() {
                    if Instant::now() + self.margin < *expires_at {
                        return Ok(token.clone());
                    }
                }
            }
            let (token, ttl) = (self.fetch)(cancel).await?;
            let expires_at = Instant::now() + ttl;
            *self.cached.lock().unwrap() = Some((token.clone(), expires_at));
            Ok(token)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn static_provider_returns_configured_token() {
        let p = TokenProvider::Static("abc".to_string());
        assert_eq!(p.token(&CancellationToken::new()).await.unwrap(), "abc");
    }

    #[tokio::test]
    async fn caching_provider_reuses_token_until_margin() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = Arc::clone(&calls);
        let provider = CachingTokenProvider::new(
            move |_cancel| {
                let calls = Arc::clone(&calls2);
                Box::pin(async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(("tok".to_string(), Duration::from_secs(60)))
                }) as BoxFuture<'static, Result<(String, Duration), Error>>
            },
            Duration::from_secs(5),
        );
        let token_provider = TokenProvider::Refreshable(Arc::new(provider));
        let cancel = CancellationToken::new();
        token_provider.token(&cancel).await.unwrap();
        token_provider.token(&cancel).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
