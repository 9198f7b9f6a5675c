//! Fixed-window per-user rate limiting.
//!
//! # Design Decisions
//! - One shared window boundary for all users, counters cleared together
//! - Reset and increment happen in a single critical section
//! - Windows stay aligned: after idle periods the boundary advances in whole windows
//! - Time comes from an injected [`Clock`] so tests control it

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::config::RateLimitConfig;
use crate::error::GatewayError;
use crate::observability::metrics;
use crate::pipeline::context::RequestContext;
use crate::pipeline::stage::Stage;

/// Key used for contexts without an identity.
const ANONYMOUS: &str = "anonymous";

/// Source of monotonic time.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock backed by [`Instant::now`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }
}

struct Window {
    counts: HashMap<String, u32>,
    reset_at: Instant,
}

/// Shared fixed-window counter state.
pub struct RateLimiter {
    window: Duration,
    max_requests: u32,
    clock: Arc<dyn Clock>,
    state: Mutex<Window>,
}

impl RateLimiter {
    pub fn new(window: Duration, max_requests: u32, clock: Arc<dyn Clock>) -> Self {
        let reset_at = clock.now() + window;
        Self {
            window,
            max_requests,
            clock,
            state: Mutex::new(Window {
                counts: HashMap::new(),
                reset_at,
            }),
        }
    }

    pub fn from_config(config: &RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self::new(
            Duration::from_secs(config.window_secs),
            config.max_requests,
            clock,
        )
    }

    /// Count one request for `user`. Returns `false` once the user is over the threshold.
    pub fn check(&self, user: &str) -> bool {
        let mut state = self.state.lock();
        let now = self.clock.now();

        if now >= state.reset_at {
            state.counts.clear();
            let behind = now.duration_since(state.reset_at).as_nanos();
            let skipped = behind / self.window.as_nanos().max(1) + 1;
            state.reset_at += self.window * u32::try_from(skipped).unwrap_or(u32::MAX);
        }

        let count = state.counts.entry(user.to_string()).or_insert(0);
        *count = count.saturating_add(1);
        *count <= self.max_requests
    }

    /// Requests counted for `user` in the current window.
    pub fn count(&self, user: &str) -> u32 {
        self.state.lock().counts.get(user).copied().unwrap_or(0)
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("window", &self.window)
            .field("max_requests", &self.max_requests)
            .finish_non_exhaustive()
    }
}

/// Rejects requests from users over their per-window budget.
#[derive(Debug, Clone)]
pub struct RateLimitStage {
    limiter: Option<Arc<RateLimiter>>,
}

impl RateLimitStage {
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self {
            limiter: Some(limiter),
        }
    }

    /// A stage that admits everything.
    pub fn disabled() -> Self {
        Self { limiter: None }
    }
}

#[async_trait]
impl Stage for RateLimitStage {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    async fn process(&self, ctx: &mut RequestContext) {
        let Some(limiter) = &self.limiter else {
            return;
        };

        let user = ctx.user().unwrap_or(ANONYMOUS);
        if !limiter.check(user) {
            tracing::warn!(request_id = %ctx.request_id(), user, "Rate limit exceeded");
            metrics::record_rate_limited();
            ctx.fail(GatewayError::RateLimited);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn limiter(max: u32) -> (Arc<ManualClock>, RateLimiter) {
        let clock = Arc::new(ManualClock::new());
        let limiter = RateLimiter::new(Duration::from_secs(60), max, clock.clone());
        (clock, limiter)
    }

    #[test]
    fn only_request_over_threshold_is_rejected() {
        let (_, limiter) = limiter(60);
        let outcomes: Vec<bool> = (0..61).map(|_| limiter.check("alice")).collect();

        assert!(outcomes[..60].iter().all(|ok| *ok));
        assert!(!outcomes[60]);
    }

    #[test]
    fn counters_reset_after_window() {
        let (clock, limiter) = limiter(60);
        for _ in 0..61 {
            limiter.check("alice");
        }
        assert!(!limiter.check("alice"));

        clock.advance(Duration::from_secs(60));
        assert!(limiter.check("alice"));
        assert_eq!(limiter.count("alice"), 1);
    }

    #[test]
    fn users_are_counted_separately() {
        let (_, limiter) = limiter(1);
        assert!(limiter.check("alice"));
        assert!(limiter.check("bob"));
        assert!(!limiter.check("alice"));
    }

    #[test]
    fn boundary_stays_aligned_after_idle_windows() {
        let (clock, limiter) = limiter(1);
        clock.advance(Duration::from_secs(60 * 5 + 30));
        assert!(limiter.check("alice"));

        // Next boundary is 30s away, not a full window.
        clock.advance(Duration::from_secs(30));
        assert!(limiter.check("alice"));
    }

    #[test]
    fn concurrent_callers_never_exceed_threshold() {
        let (_, limiter) = limiter(100);
        let admitted = std::sync::atomic::AtomicU32::new(0);

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..50 {
                        if limiter.check("alice") {
                            admitted.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                        }
                    }
                });
            }
        });

        assert_eq!(admitted.into_inner(), 100);
        assert_eq!(limiter.count("alice"), 400);
    }

    #[tokio::test]
    async fn stage_records_rate_limited_error() {
        let (_, limiter) = limiter(1);
        let stage = RateLimitStage::new(Arc::new(limiter));

        let mut first = RequestContext::new(Map::new());
        first.set_user("alice");
        stage.process(&mut first).await;
        assert!(!first.has_error());

        let mut second = RequestContext::new(Map::new());
        second.set_user("alice");
        stage.process(&mut second).await;
        assert_eq!(second.error().unwrap().to_string(), "rate limit exceeded");
    }

    #[tokio::test]
    async fn disabled_stage_admits_everything() {
        let stage = RateLimitStage::disabled();
        for _ in 0..1000 {
            let mut ctx = RequestContext::new(Map::new());
            stage.process(&mut ctx).await;
            assert!(!ctx.has_error());
        }
    }
}
