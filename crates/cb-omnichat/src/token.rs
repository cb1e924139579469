//! Bearer token cache
//!
//! Holds the one OmniChat bearer token shared by every in-flight call
//! and refreshes it once it is within the expiry margin. Concurrent
//! misses may each refresh; the last token written wins.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use crate::error::{OmniChatError, Result, UpstreamError};
use crate::models::BearerToken;

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Performs the identity exchange that yields a fresh token
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    async fn issue_token(&self) -> std::result::Result<BearerToken, UpstreamError>;
}

/// Cached bearer token with on-demand refresh
pub struct TokenCache {
    issuer: Arc<dyn TokenIssuer>,
    clock: Arc<dyn Clock>,
    current: RwLock<Option<BearerToken>>,
}

impl TokenCache {
    /// Create an empty cache using the system clock
    pub fn new(issuer: Arc<dyn TokenIssuer>) -> Self {
        Self::with_clock(issuer, Arc::new(SystemClock))
    }

    /// Create an empty cache with a custom clock
    pub fn with_clock(issuer: Arc<dyn TokenIssuer>, clock: Arc<dyn Clock>) -> Self {
        Self {
            issuer,
            clock,
            current: RwLock::new(None),
        }
    }

    /// Return a usable bearer token, refreshing it if needed.
    ///
    /// On a failed exchange the previous state (stale or empty) is kept so
    /// the next call tries again.
    pub async fn get_bearer(&self) -> Result<String> {
        let now = self.clock.now();

        {
            let current = self.current.read().await;
            if let Some(token) = current.as_ref().filter(|t| t.is_fresh_at(now)) {
                debug!("Using cached OmniChat token");
                return Ok(token.value.clone());
            }
        }

        debug!("OmniChat token missing or expiring, refreshing");

        let token = self.issuer.issue_token().await.map_err(|e| {
            error!("OmniChat token refresh failed: {}", e);
            OmniChatError::Auth(e)
        })?;

        info!("Obtained OmniChat token (expires at {})", token.expires_at);

        let value = token.value.clone();
        *self.current.write().await = Some(token);
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ManualClock(Mutex<DateTime<Utc>>);

    impl ManualClock {
        fn new(start: DateTime<Utc>) -> Self {
            Self(Mutex::new(start))
        }

        fn set(&self, now: DateTime<Utc>) {
            *self.0.lock().unwrap() = now;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    /// Hands out queued responses and counts exchanges
    #[derive(Default)]
    struct FakeIssuer {
        responses: Mutex<VecDeque<std::result::Result<BearerToken, UpstreamError>>>,
        calls: Mutex<usize>,
    }

    impl FakeIssuer {
        fn push(&self, response: std::result::Result<BearerToken, UpstreamError>) {
            self.responses.lock().unwrap().push_back(response);
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl TokenIssuer for FakeIssuer {
        async fn issue_token(&self) -> std::result::Result<BearerToken, UpstreamError> {
            *self.calls.lock().unwrap() += 1;
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(UpstreamError::Transport("no response queued".into())))
        }
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn setup() -> (Arc<FakeIssuer>, Arc<ManualClock>, TokenCache) {
        let issuer = Arc::new(FakeIssuer::default());
        let clock = Arc::new(ManualClock::new(noon()));
        let cache = TokenCache::with_clock(issuer.clone(), clock.clone());
        (issuer, clock, cache)
    }

    #[tokio::test]
    async fn test_first_call_fetches_token() {
        let (issuer, _clock, cache) = setup();
        issuer.push(Ok(BearerToken::new("tok-1", noon() + Duration::hours(1))));

        assert_eq!(cache.get_bearer().await.unwrap(), "tok-1");
        assert_eq!(issuer.calls(), 1);
    }

    #[tokio::test]
    async fn test_cache_hit_within_window() {
        let (issuer, clock, cache) = setup();
        issuer.push(Ok(BearerToken::new("tok-1", noon() + Duration::hours(1))));

        cache.get_bearer().await.unwrap();
        clock.set(noon() + Duration::minutes(30));
        assert_eq!(cache.get_bearer().await.unwrap(), "tok-1");
        clock.set(noon() + Duration::minutes(58) + Duration::seconds(59));
        assert_eq!(cache.get_bearer().await.unwrap(), "tok-1");

        assert_eq!(issuer.calls(), 1);
    }

    #[tokio::test]
    async fn test_refresh_inside_margin() {
        let (issuer, clock, cache) = setup();
        issuer.push(Ok(BearerToken::new("tok-1", noon() + Duration::hours(1))));
        issuer.push(Ok(BearerToken::new("tok-2", noon() + Duration::hours(2))));

        cache.get_bearer().await.unwrap();
        clock.set(noon() + Duration::minutes(59));

        assert_eq!(cache.get_bearer().await.unwrap(), "tok-2");
        assert_eq!(issuer.calls(), 2);

        // The replacement is cached in turn.
        assert_eq!(cache.get_bearer().await.unwrap(), "tok-2");
        assert_eq!(issuer.calls(), 2);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_cache_and_retries() {
        let (issuer, clock, cache) = setup();
        issuer.push(Ok(BearerToken::new("tok-1", noon() + Duration::hours(1))));
        issuer.push(Err(UpstreamError::Status {
            status: 503,
            body: "maintenance".to_string(),
        }));
        issuer.push(Ok(BearerToken::new("tok-2", noon() + Duration::hours(3))));

        cache.get_bearer().await.unwrap();
        clock.set(noon() + Duration::hours(2));

        let err = cache.get_bearer().await.unwrap_err();
        assert_eq!(
            err,
            OmniChatError::Auth(UpstreamError::Status {
                status: 503,
                body: "maintenance".to_string()
            })
        );

        // The stale token is still held, so the next call retries the exchange.
        assert_eq!(
            cache.current.read().await.as_ref().map(|t| t.value.clone()),
            Some("tok-1".to_string())
        );
        assert_eq!(cache.get_bearer().await.unwrap(), "tok-2");
        assert_eq!(issuer.calls(), 3);
    }

    #[tokio::test]
    async fn test_failure_on_empty_cache() {
        let (issuer, _clock, cache) = setup();
        issuer.push(Err(UpstreamError::Transport("connection refused".to_string())));

        assert!(matches!(
            cache.get_bearer().await,
            Err(OmniChatError::Auth(UpstreamError::Transport(_)))
        ));
        assert!(cache.current.read().await.is_none());
    }
}
