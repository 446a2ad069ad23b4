//! Per-IP rate limiting
//!
//! Fixed-window counters keyed by client address. Two classes are used in
//! the router: a general limit for all `/api` traffic and a much stricter
//! limit for the send endpoint. Counters only need eventually-consistent
//! increments; a `RwLock<HashMap>` is sufficient at this scale.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::warn;

/// Rate limit classes with different thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitClass {
    /// All `/api` requests per IP: 100 per 15 minutes.
    Api,
    /// Mail send requests per IP: 5 per minute.
    Send,
}

impl RateLimitClass {
    pub fn max_requests(&self) -> u32 {
        match self {
            RateLimitClass::Api => 100,
            RateLimitClass::Send => 5,
        }
    }

    pub fn window_duration(&self) -> Duration {
        match self {
            RateLimitClass::Api => Duration::from_secs(15 * 60),
            RateLimitClass::Send => Duration::from_secs(60),
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            RateLimitClass::Api => "API requests per 15 minutes",
            RateLimitClass::Send => "send requests per minute",
        }
    }
}

/// Rate limiter tracking request counts per IP within a fixed window.
pub struct RateLimiter {
    /// Map of IP -> (request count, window start time)
    requests: RwLock<HashMap<String, (u32, Instant)>>,
    class: RateLimitClass,
}

impl RateLimiter {
    pub fn new(class: RateLimitClass) -> Self {
        Self {
            requests: RwLock::new(HashMap::new()),
            class,
        }
    }

    /// Check whether a request from `ip` is allowed, counting it if so.
    pub async fn check(&self, ip: &str) -> bool {
        let now = Instant::now();
        let mut requests = self.requests.write().await;

        let entry = requests.entry(ip.to_string()).or_insert((0, now));

        // Reset if the window has passed
        if now.duration_since(entry.1) > self.class.window_duration() {
            entry.0 = 0;
            entry.1 = now;
        }

        if entry.0 >= self.class.max_requests() {
            warn!(
                "Rate limit exceeded for {}: {} ({})",
                ip,
                self.class.description(),
                self.class.max_requests()
            );
            return false;
        }

        entry.0 += 1;
        true
    }

    /// Drop entries whose window has long expired.
    pub async fn cleanup(&self) {
        let now = Instant::now();
        let window = self.class.window_duration();
        let mut requests = self.requests.write().await;
        requests.retain(|_, (_, start)| now.duration_since(*start) <= window * 2);
    }
}
