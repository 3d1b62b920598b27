//! Token-bucket rate limiting.
//!
//! Every request is charged against its client IP. A request that also
//! carries a valid caller identity is charged a second time against the
//! (IP, caller) pair, so rotating the identity header never buys a fresh
//! allowance and unknown headers never allocate a bucket.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use murmur_shared::UserId;
use tokio::sync::Mutex;
use tracing::warn;

use crate::identity::USER_ID_HEADER;

#[derive(Debug, Clone, Copy)]
struct Bucket {
    tokens: f64,
    touched: Instant,
}

impl Bucket {
    fn full(quota: Quota, now: Instant) -> Self {
        Self {
            tokens: quota.burst,
            touched: now,
        }
    }

    /// Refill for the time elapsed since the last touch, then spend one token.
    fn take(&mut self, quota: Quota, now: Instant) -> bool {
        let idle = now.saturating_duration_since(self.touched).as_secs_f64();
        self.touched = now;
        self.tokens = quota.burst.min(self.tokens + idle * quota.per_second);

        let allowed = self.tokens >= 1.0;
        if allowed {
            self.tokens -= 1.0;
        }
        allowed
    }
}

#[derive(Debug, Clone, Copy)]
struct Quota {
    per_second: f64,
    burst: f64,
}

/// What a bucket is charged to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RateKey {
    Ip(IpAddr),
    Caller { ip: Option<IpAddr>, user: UserId },
}

impl std::fmt::Display for RateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RateKey::Ip(ip) => write!(f, "ip:{ip}"),
            RateKey::Caller { ip: Some(ip), user } => write!(f, "caller:{user}@{ip}"),
            RateKey::Caller { ip: None, user } => write!(f, "caller:{user}"),
        }
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    buckets: Arc<Mutex<HashMap<RateKey, Bucket>>>,
    quota: Quota,
}

impl RateLimiter {
    pub fn new(per_second: f64, burst: f64) -> Self {
        Self {
            buckets: Arc::new(Mutex::new(HashMap::new())),
            quota: Quota { per_second, burst },
        }
    }

    /// Charge one request. On refusal returns the key whose bucket ran dry.
    ///
    /// The IP bucket is charged first; a caller bucket is only created once
    /// the IP allowance has admitted the request.
    pub async fn admit(&self, ip: Option<IpAddr>, caller: Option<&UserId>) -> Result<(), RateKey> {
        let keys = ip.map(RateKey::Ip).into_iter().chain(caller.map(|user| RateKey::Caller {
            ip,
            user: user.clone(),
        }));

        let now = Instant::now();
        let mut buckets = self.buckets.lock().await;
        for key in keys {
            let bucket = buckets
                .entry(key.clone())
                .or_insert_with(|| Bucket::full(self.quota, now));
            if !bucket.take(self.quota, now) {
                return Err(key);
            }
        }
        Ok(())
    }

    /// Drop buckets untouched for longer than `max_idle`.
    pub async fn purge_stale(&self, max_idle: Duration) {
        let now = Instant::now();
        let mut buckets = self.buckets.lock().await;
        let before = buckets.len();
        buckets.retain(|_, bucket| now.saturating_duration_since(bucket.touched) < max_idle);

        let purged = before - buckets.len();
        if purged > 0 {
            tracing::debug!(purged, remaining = buckets.len(), "purged idle rate buckets");
        }
    }

    #[cfg(test)]
    async fn bucket_count(&self) -> usize {
        self.buckets.lock().await.len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(10.0, 30.0)
    }
}

pub async fn rate_limit_middleware(
    State(limiter): State<RateLimiter>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let ip = client_ip(&req);
    let caller = req
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|raw| UserId::new(raw.trim()).ok());

    if let Err(key) = limiter.admit(ip, caller.as_ref()).await {
        warn!(key = %key, "Rate limit exceeded");
        return Err(StatusCode::TOO_MANY_REQUESTS);
    }

    Ok(next.run(req).await)
}

/// Peer address of the connection, else the first forwarded address.
fn client_ip<B>(req: &Request<B>) -> Option<IpAddr> {
    let forwarded = |name: &str| -> Option<IpAddr> {
        let value = req.headers().get(name)?.to_str().ok()?;
        value.split(',').next()?.trim().parse().ok()
    };

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .or_else(|| forwarded("x-forwarded-for"))
        .or_else(|| forwarded("x-real-ip"))
}
