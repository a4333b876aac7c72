//! Fixed-window request limiter keyed by client.
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::warn;

use crate::server::json_error;

const CLIENT_ID_HEADER: &str = "x-client-id";
const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";
const ANONYMOUS: &str = "anonymous";
/// Sweep expired windows once the table grows past this.
const SWEEP_THRESHOLD: usize = 1024;

static CLIENT_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._:\-\[\]]{1,128}$").expect("valid client key pattern")
});

#[derive(Debug)]
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    windows: Mutex<HashMap<String, (Instant, u32)>>,
}

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Limited { retry_after: Duration },
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub async fn check(&self, key: &str) -> Decision {
        self.check_at(key, Instant::now()).await
    }

    async fn check_at(&self, key: &str, now: Instant) -> Decision {
        let mut windows = self.windows.lock().await;
        if windows.len() >= SWEEP_THRESHOLD {
            let window = self.window;
            windows.retain(|_, (start, _)| now.duration_since(*start) < window);
        }
        let slot = windows.entry(key.to_string()).or_insert((now, 0));
        if now.duration_since(slot.0) >= self.window {
            *slot = (now, 0);
        }
        if slot.1 >= self.limit {
            let retry_after = self.window.saturating_sub(now.duration_since(slot.0));
            return Decision::Limited { retry_after };
        }
        slot.1 += 1;
        Decision::Allowed
    }
}

/// `x-client-id`, then the first `x-forwarded-for` hop, then the peer IP,
/// then `anonymous`. Header values that do not look like an identifier are
/// ignored.
pub fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let usable = |v: &str| {
        let v = v.trim();
        CLIENT_KEY.is_match(v).then(|| v.to_string())
    };
    headers
        .get(CLIENT_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .and_then(usable)
        .or_else(|| {
            headers
                .get(FORWARDED_FOR_HEADER)
                .and_then(|h| h.to_str().ok())
                .and_then(|v| v.split(',').next())
                .and_then(usable)
        })
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| ANONYMOUS.to_string())
}

pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    req: Request,
    next: Next,
) -> Response {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let key = client_key(req.headers(), peer);
    match limiter.check(&key).await {
        Decision::Allowed => next.run(req).await,
        Decision::Limited { retry_after } => {
            warn!(client = %key, "rate limit exceeded");
            let secs = retry_after.as_secs().max(1);
            let mut res = json_error(
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limited",
                format!("too many requests; retry in {secs}s"),
            );
            res.headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
            res
        }
    }
}
