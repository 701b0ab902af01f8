//! Fixed-window rate limiting on top of a shared [`CounterStore`].
//!
//! # Algorithm
//!
//! Time is cut into aligned windows of `window` seconds. Every request
//! increments the counter of the current window:
//!
//! ```text
//! window_index = now_unix_secs / window_secs
//! key          = "{limiter_name}:{window_index}"
//! count        = INCR key            (count == 1 → EXPIRE key window)
//! allowed      = count <= limit
//! ```
//!
//! The counter lives in the store, not in this process, so every instance
//! sharing the store enforces one global ceiling. Nothing here takes a lock:
//! correctness rests on the store's atomic increment. A retried request is
//! counted again.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::store::{CounterStore, StoreError};

/// Source of the current Unix time in whole seconds.
pub trait UnixClock: Send + Sync {
    fn now_unix_secs(&self) -> u64;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl UnixClock for SystemClock {
    fn now_unix_secs(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(now_unix_secs: u64) -> Self {
        Self {
            now: AtomicU64::new(now_unix_secs),
        }
    }

    pub fn set(&self, now_unix_secs: u64) {
        self.now.store(now_unix_secs, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_secs(), Ordering::SeqCst);
    }
}

impl UnixClock for ManualClock {
    fn now_unix_secs(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Counter key for `limiter_name` in the window containing `now_unix_secs`.
///
/// Windows shorter than one second are treated as one second.
pub fn window_key(limiter_name: &str, now_unix_secs: u64, window: Duration) -> String {
    let window_secs = window.as_secs().max(1);
    format!("{limiter_name}:{}", now_unix_secs / window_secs)
}

/// Outcome of one rate-limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowDecision {
    pub allowed: bool,
    /// Post-increment count of the window.
    pub count: u64,
    pub limit: u64,
    /// Seconds until the current window closes (at least 1).
    pub reset_after_secs: u64,
    pub key: String,
}

impl WindowDecision {
    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.count)
    }
}

/// Fixed-window limiter.
#[derive(Clone)]
pub struct FixedWindowLimiter {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn UnixClock>,
}

impl FixedWindowLimiter {
    /// Limiter using the wall clock.
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn CounterStore>, clock: Arc<dyn UnixClock>) -> Self {
        Self { store, clock }
    }

    /// Count one request against `limiter_name` and report whether it fits.
    pub async fn allow(
        &self,
        limiter_name: &str,
        limit: u64,
        window: Duration,
    ) -> Result<bool, StoreError> {
        Ok(self.check(limiter_name, limit, window).await?.allowed)
    }

    /// Like [`allow`](Self::allow) with the details needed for response headers.
    ///
    /// The expiry is set by whichever caller observes the count `1`, and is
    /// awaited before the decision is returned.
    pub async fn check(
        &self,
        limiter_name: &str,
        limit: u64,
        window: Duration,
    ) -> Result<WindowDecision, StoreError> {
        let now = self.clock.now_unix_secs();
        let window_secs = window.as_secs().max(1);
        let key = window_key(limiter_name, now, window);

        let count = self.store.increment(&key).await?;
        if count == 1 {
            self.store
                .expire_after(&key, Duration::from_secs(window_secs))
                .await?;
        }

        // A negative count can only come from someone else writing the key.
        let count = u64::try_from(count).unwrap_or(0);

        Ok(WindowDecision {
            allowed: count <= limit,
            count,
            limit,
            reset_after_secs: window_secs - now % window_secs,
            key,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::store::InMemoryCounterStore;

    const MINUTE: Duration = Duration::from_secs(60);

    /// Counter store that records every expiry request.
    #[derive(Default)]
    struct RecordingStore {
        inner: InMemoryCounterStore,
        expiries: Mutex<Vec<(String, Duration)>>,
    }

    #[async_trait]
    impl CounterStore for RecordingStore {
        async fn increment(&self, key: &str) -> Result<i64, StoreError> {
            self.inner.increment(key).await
        }

        async fn expire_after(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
            self.expiries.lock().unwrap().push((key.to_string(), ttl));
            self.inner.expire_after(key, ttl).await
        }

        async fn ping(&self) -> Result<(), StoreError> {
            Ok(())
        }
    }

    struct DownStore;

    #[async_trait]
    impl CounterStore for DownStore {
        async fn increment(&self, _key: &str) -> Result<i64, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }

        async fn expire_after(&self, _key: &str, _ttl: Duration) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }

        async fn ping(&self) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
    }

    fn limiter_at(now: u64) -> (FixedWindowLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(now));
        let limiter =
            FixedWindowLimiter::with_clock(Arc::new(InMemoryCounterStore::new()), clock.clone());
        (limiter, clock)
    }

    #[test]
    fn test_window_key_format() {
        assert_eq!(window_key("global", 120, MINUTE), "global:2");
        assert_eq!(window_key("global", 179, MINUTE), "global:2");
        assert_eq!(window_key("global", 180, MINUTE), "global:3");
    }

    #[test]
    fn test_window_key_subsecond_window() {
        assert_eq!(window_key("x", 7, Duration::from_millis(10)), "x:7");
    }

    #[tokio::test]
    async fn test_limit_plus_one_is_rejected() {
        let (limiter, _clock) = limiter_at(6_000);

        for i in 1..=3 {
            assert!(
                limiter.allow("global", 3, MINUTE).await.unwrap(),
                "request {i} should pass"
            );
        }
        assert!(!limiter.allow("global", 3, MINUTE).await.unwrap());
        assert!(!limiter.allow("global", 3, MINUTE).await.unwrap());
    }

    #[tokio::test]
    async fn test_zero_limit_rejects_everything() {
        let (limiter, _clock) = limiter_at(0);
        assert!(!limiter.allow("global", 0, MINUTE).await.unwrap());
    }

    #[tokio::test]
    async fn test_window_rollover_resets_count() {
        let (limiter, clock) = limiter_at(6_059);

        assert!(limiter.allow("global", 1, MINUTE).await.unwrap());
        assert!(!limiter.allow("global", 1, MINUTE).await.unwrap());

        clock.advance(Duration::from_secs(1));

        let decision = limiter.check("global", 1, MINUTE).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.count, 1);
        assert_eq!(decision.key, "global:101");
    }

    #[tokio::test]
    async fn test_limiter_names_are_independent() {
        let (limiter, _clock) = limiter_at(0);
        assert!(limiter.allow("a", 1, MINUTE).await.unwrap());
        assert!(limiter.allow("b", 1, MINUTE).await.unwrap());
        assert!(!limiter.allow("a", 1, MINUTE).await.unwrap());
    }

    #[tokio::test]
    async fn test_expiry_set_once_per_window() {
        let store = Arc::new(RecordingStore::default());
        let clock = Arc::new(ManualClock::new(600));
        let limiter = FixedWindowLimiter::with_clock(store.clone(), clock.clone());

        for _ in 0..5 {
            limiter.allow("global", 10, MINUTE).await.unwrap();
        }
        clock.advance(MINUTE);
        limiter.allow("global", 10, MINUTE).await.unwrap();

        let expiries = store.expiries.lock().unwrap().clone();
        assert_eq!(
            expiries,
            vec![
                ("global:10".to_string(), MINUTE),
                ("global:11".to_string(), MINUTE),
            ]
        );
    }

    #[tokio::test]
    async fn test_reset_after_counts_down_to_window_end() {
        let (limiter, _clock) = limiter_at(6_045);
        let decision = limiter.check("global", 5, MINUTE).await.unwrap();
        assert_eq!(decision.reset_after_secs, 15);
        assert_eq!(decision.remaining(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_counter_expires_with_its_window() {
        let store = InMemoryCounterStore::new();
        let clock = Arc::new(ManualClock::new(0));
        let limiter = FixedWindowLimiter::with_clock(Arc::new(store.clone()), clock.clone());

        let decision = limiter.check("global", 5, MINUTE).await.unwrap();
        assert_eq!(store.ttl(&decision.key).await, Some(MINUTE));

        clock.set(125);
        let decision = limiter.check("global", 5, MINUTE).await.unwrap();
        assert_eq!(decision.key, "global:2");
        assert_eq!(decision.count, 1);
        assert_eq!(decision.reset_after_secs, 55);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_get_exactly_limit() {
        let (limiter, _clock) = limiter_at(12_000);
        let limit = 25;

        let mut handles = Vec::new();
        for _ in 0..100 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                limiter.allow("global", limit, MINUTE).await.unwrap()
            }));
        }

        let mut allowed = 0;
        for handle in handles {
            if handle.await.unwrap() {
                allowed += 1;
            }
        }
        assert_eq!(allowed, limit);
    }

    #[tokio::test]
    async fn test_retries_are_counted_again() {
        let (limiter, _clock) = limiter_at(0);
        // The same logical request sent twice consumes two slots.
        assert!(limiter.allow("global", 2, MINUTE).await.unwrap());
        assert!(limiter.allow("global", 2, MINUTE).await.unwrap());
        assert!(!limiter.allow("global", 2, MINUTE).await.unwrap());
    }

    #[tokio::test]
    async fn test_store_failure_is_returned_not_panicked() {
        let limiter = FixedWindowLimiter::with_clock(Arc::new(DownStore), Arc::new(SystemClock));
        let err = limiter.allow("global", 10, MINUTE).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }
}
