//! Per-user rolling-window limit for chat requests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct WindowEntry {
    /// Accepted request times inside the current window.
    requests: Vec<Instant>,
}

impl WindowEntry {
    fn prune(&mut self, now: Instant, window: Duration) {
        self.requests.retain(|&at| now.saturating_duration_since(at) < window);
    }

    fn retry_after(&self, now: Instant, window: Duration) -> Duration {
        self.requests
            .first()
            .map(|&oldest| window.saturating_sub(now.saturating_duration_since(oldest)))
            .unwrap_or(window)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32 },
    Limited { retry_after_secs: u64 },
}

#[derive(Clone)]
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    entries: Arc<RwLock<HashMap<String, WindowEntry>>>,
}

impl RateLimiter {
    pub fn per_minute(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(60))
    }

    pub fn new(limit: u32, window: Duration) -> Self {
        Self { limit, window, entries: Arc::new(RwLock::new(HashMap::new())) }
    }

    /// Records the request when it fits in the window; limited requests are not counted.
    pub async fn check(&self, user_id: &str) -> RateDecision {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let entry = entries.entry(user_id.to_string()).or_default();
        entry.prune(now, self.window);

        if entry.requests.len() >= self.limit as usize {
            let retry_after = entry.retry_after(now, self.window);
            warn!(
                event_name = "server.rate_limit.exceeded",
                user_id,
                limit = self.limit,
                "chat rate limit exceeded"
            );
            return RateDecision::Limited { retry_after_secs: retry_after.as_secs().max(1) };
        }

        entry.requests.push(now);
        let remaining = self.limit.saturating_sub(entry.requests.len() as u32);
        debug!(event_name = "server.rate_limit.allowed", user_id, remaining, "chat request allowed");
        RateDecision::Allowed { remaining }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{RateDecision, RateLimiter};

    #[tokio::test(start_paused = true)]
    async fn limits_each_user_within_a_rolling_window() {
        let limiter = RateLimiter::per_minute(2);

        assert_eq!(limiter.check("user-1").await, RateDecision::Allowed { remaining: 1 });
        tokio::time::advance(Duration::from_secs(20)).await;
        assert_eq!(limiter.check("user-1").await, RateDecision::Allowed { remaining: 0 });
        assert_eq!(limiter.check("user-1").await, RateDecision::Limited { retry_after_secs: 40 });
        assert_eq!(limiter.check("user-2").await, RateDecision::Allowed { remaining: 1 });

        tokio::time::advance(Duration::from_secs(41)).await;
        assert_eq!(limiter.check("user-1").await, RateDecision::Allowed { remaining: 0 });
    }
}
