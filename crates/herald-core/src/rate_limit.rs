//! Sliding-window flood protection.
//!
//! Every sender gets an ordered list of recent message times. A call drops
//! the entries older than the window, records the current time and allows
//! the message while the list holds at most `limit` entries. Denied calls
//! are recorded too, so a sender who keeps flooding stays blocked until the
//! window rolls past.
//!
//! State is transient; idle senders are evicted from the moka cache once a
//! whole window passes without traffic.

use crate::clock::Clock;
use chrono::{DateTime, Duration, Utc};
use moka::future::Cache;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Upper bound on tracked senders.
pub const RATE_LIMIT_MAX_SENDERS: u64 = 100_000;

/// Cache idle bounds; moka rejects idle times beyond 1000 years.
const MIN_IDLE: std::time::Duration = std::time::Duration::from_secs(1);
const MAX_IDLE: std::time::Duration = std::time::Duration::from_secs(365 * 24 * 3600);

type RateWindow = Arc<Mutex<VecDeque<DateTime<Utc>>>>;

/// Per-sender sliding-window counter.
#[derive(Clone)]
pub struct RateLimiter {
    windows: Cache<String, RateWindow>,
    window: Duration,
    limit: usize,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a limiter allowing `limit` messages per `window`.
    #[must_use]
    pub fn new(window: Duration, limit: usize, clock: Arc<dyn Clock>) -> Self {
        let idle = window.to_std().unwrap_or(std::time::Duration::ZERO);
        let windows = Cache::builder()
            .max_capacity(RATE_LIMIT_MAX_SENDERS)
            .time_to_idle(idle.clamp(MIN_IDLE, MAX_IDLE))
            .build();

        Self {
            windows,
            window,
            limit,
            clock,
        }
    }

    /// Record a message from `sender_id` and decide whether it may pass.
    pub async fn allow(&self, sender_id: &str) -> bool {
        let window = self
            .windows
            .get_with(sender_id.to_string(), async {
                Arc::new(Mutex::new(VecDeque::new()))
            })
            .await;

        let now = self.clock.now();
        let mut times = window.lock().await;
        while times.front().is_some_and(|oldest| now - *oldest > self.window) {
            times.pop_front();
        }
        times.push_back(now);

        let allowed = times.len() <= self.limit;
        if !allowed {
            debug!(
                "Sender {} over rate limit ({} in window)",
                sender_id,
                times.len()
            );
        }
        allowed
    }

    /// Configured window.
    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }

    /// Configured limit.
    #[must_use]
    pub const fn limit(&self) -> usize {
        self.limit
    }
}
