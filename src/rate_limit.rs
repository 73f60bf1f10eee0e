use dashmap::DashMap;
use std::sync::Arc;
use tokio::time::{Duration, Instant, interval};
use tracing::{debug, info};

use crate::error::{GatewayError, Throttle};
use crate::metrics::RATE_LIMIT_BUCKETS;

// Rate limit entry - tracks requests per client address
pub struct RateBucket {
    pub count: u32,
    pub window_start: Instant,
}

/// Fixed-window request counter, one bucket per client address.
///
/// Bursts straddling a window boundary can see up to twice `limit` requests
/// admitted in a short span; that is accepted.
pub struct RateLimiter {
    buckets: DashMap<String, RateBucket>,
    limit: u32,      // max requests per window
    window: Duration,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            buckets: DashMap::new(),
            limit,
            window,
        }
    }

    pub fn check(&self, client: &str) -> Result<(), GatewayError> {
        self.check_at(client, Instant::now())
    }

    /// Count one request from `client` at `now`. Rejected requests still count,
    /// so a client hammering the gate stays rejected until its window ends.
    pub fn check_at(&self, client: &str, now: Instant) -> Result<(), GatewayError> {
        let mut bucket = self
            .buckets
            .entry(client.to_string())
            .or_insert(RateBucket {
                count: 0,
                window_start: now,
            });

        // window expired..? reset it
        if now.saturating_duration_since(bucket.window_start) >= self.window {
            bucket.count = 0;
            bucket.window_start = now;
        }

        bucket.count = bucket.count.saturating_add(1);
        if bucket.count <= self.limit {
            return Ok(());
        }

        let elapsed = now.saturating_duration_since(bucket.window_start);
        let remaining = self.window.saturating_sub(elapsed);
        let retry_after = (remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0)).max(1);

        debug!(client, count = bucket.count, retry_after, "client over rate limit");
        Err(GatewayError::RateLimited {
            origin: Throttle::Local,
            retry_after: Some(retry_after),
        })
    }

    /// Drop buckets whose window has already ended. They would be reset on
    /// their next use anyway, so this only frees memory.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| now.saturating_duration_since(bucket.window_start) < self.window);
        before.saturating_sub(self.buckets.len())
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

// Stale bucket sweeper - runs every `every`
pub async fn bucket_sweeper(limiter: Arc<RateLimiter>, every: Duration) {
    let mut interval = interval(every);

    info!(interval = ?every, "rate limit sweeper started");

    loop {
        interval.tick().await;

        let removed = limiter.sweep_at(Instant::now());
        RATE_LIMIT_BUCKETS.set(limiter.len() as f64);

        if removed > 0 {
            debug!(removed, remaining = limiter.len(), "swept stale rate limit buckets");
        }
    }
}
