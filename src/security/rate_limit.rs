//! Per-client admission control.
//!
//! Runs ahead of the filter pipeline when enabled. Rejected requests get the
//! JSON 429 body from the block handler and never reach tracing or auth.
//!
//! Buckets idle longer than `idle_timeout_secs` are swept every
//! `SWEEP_INTERVAL` checks, so the map tracks recently active clients only.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;

use crate::config::RateLimitConfig;
use crate::http::response;
use crate::observability::metrics;

const UNKNOWN_CLIENT: &str = "unknown";

/// Checks between two sweeps of idle buckets.
const SWEEP_INTERVAL: u64 = 1024;

/// A simple token bucket.
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: f64) -> Self {
        Self {
            tokens: capacity,
            last_update: Instant::now(),
        }
    }

    fn try_acquire(&mut self, capacity: f64, refill_rate: f64) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();

        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_update = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Buckets keyed by client address.
pub struct RateLimiterState {
    buckets: DashMap<String, TokenBucket>,
    rps: f64,
    burst: f64,
    idle_ttl: Duration,
    checks: AtomicU64,
}

impl RateLimiterState {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            buckets: DashMap::new(),
            rps: config.requests_per_second as f64,
            burst: config.burst_size as f64,
            idle_ttl: Duration::from_secs(config.idle_timeout_secs),
            checks: AtomicU64::new(0),
        }
    }

    pub fn with_idle_ttl(mut self, idle_ttl: Duration) -> Self {
        self.idle_ttl = idle_ttl;
        self
    }

    /// Take one token for `client`. Returns false when the bucket is empty.
    pub fn check(&self, client: &str) -> bool {
        let allowed = {
            let mut bucket = self
                .buckets
                .entry(client.to_string())
                .or_insert_with(|| TokenBucket::new(self.burst));
            bucket.try_acquire(self.burst, self.rps)
        };

        // The shard guard above must be released before sweeping.
        if self.checks.fetch_add(1, Ordering::Relaxed) % SWEEP_INTERVAL == SWEEP_INTERVAL - 1 {
            self.evict_idle();
        }
        allowed
    }

    /// Drop buckets untouched for longer than the idle timeout. Returns how
    /// many were removed.
    pub fn evict_idle(&self) -> usize {
        let before = self.buckets.len();
        let now = Instant::now();
        self.buckets
            .retain(|_, bucket| now.duration_since(bucket.last_update) < self.idle_ttl);
        let evicted = before.saturating_sub(self.buckets.len());
        if evicted > 0 {
            tracing::debug!(evicted, remaining = self.buckets.len(), "Evicted idle rate limit buckets");
        }
        evicted
    }

    /// Number of clients currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.buckets.len()
    }
}

pub async fn rate_limit_middleware(
    State(state): State<Arc<RateLimiterState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string());

    if state.check(&client) {
        next.run(request).await
    } else {
        tracing::warn!(client = %client, path = %request.uri().path(), "Rate limit exceeded");
        metrics::record_rate_limited();
        response::too_many_requests(request.uri().path(), None)
    }
}
