//! Rate limiting for low-trust agent clients.
//!
//! Fixed-window counters keyed by opaque bucket strings:
//! - `req:<ip>` global request admission (middleware)
//! - `reg:<ip>` registration attempts
//! - `msg:<agent_id>` message posting
//!
//! Fixed-window, not sliding: bursts can straddle a window boundary. That is
//! an accepted trade-off for O(1) memory and work per check.

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::RwLock;

use crate::error::ApiError;
use crate::state::AppState;

/// Shared fixed-window rate limiter.
///
/// Bucket policy (max count, window) is supplied per call so one table serves
/// every limit category.
#[derive(Debug, Clone, Default)]
pub struct RateLimiter {
    /// Map of bucket key to (request count, window end)
    buckets: Arc<RwLock<HashMap<String, (u32, Instant)>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether a request in `key`'s bucket should be allowed.
    /// Denials do not mutate the bucket.
    pub async fn allow(&self, key: &str, max: u32, window: Duration) -> bool {
        let now = Instant::now();
        let mut buckets = self.buckets.write().await;

        match buckets.get_mut(key) {
            Some((count, window_end)) => {
                if now >= *window_end {
                    *count = 1;
                    *window_end = now + window;
                    true
                } else if *count >= max {
                    false
                } else {
                    *count += 1;
                    true
                }
            }
            None => {
                buckets.insert(key.to_string(), (1, now + window));
                true
            }
        }
    }

    /// Drop buckets whose window has expired (call periodically).
    pub async fn cleanup(&self) {
        let now = Instant::now();
        let mut buckets = self.buckets.write().await;
        buckets.retain(|_, (_, window_end)| *window_end > now);
    }

    #[cfg(test)]
    pub async fn bucket_count(&self) -> usize {
        self.buckets.read().await.len()
    }
}

/// Global request admission, keyed by source IP.
///
/// Mounted on every route except /health so the liveness probe is never
/// throttled.
pub async fn admission_middleware(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let key = format!("req:{}", addr.ip());
    let allowed = state
        .limiter
        .allow(&key, state.config.requests_per_minute, Duration::from_secs(60))
        .await;

    if !allowed {
        tracing::warn!(ip = %addr.ip(), "request admission rate limited");
        return ApiError::RateLimited { retry_after: 60 }.into_response();
    }

    next.run(request).await
}
