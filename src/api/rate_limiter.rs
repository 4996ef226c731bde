//! Per-IP rate limiting middleware for the chat routes.

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::error::{ErrorDetail, ErrorResponse};

/// Fixed-window counter per client IP.
#[derive(Clone)]
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    /// IP -> (count, window_start)
    requests: Arc<RwLock<HashMap<IpAddr, (u32, Instant)>>>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            requests: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Check if a request is allowed for the given IP.
    pub async fn check_rate_limit(&self, ip: IpAddr) -> bool {
        let mut requests = self.requests.write().await;
        let now = Instant::now();

        match requests.get_mut(&ip) {
            Some((count, start)) => {
                if now.duration_since(*start) > self.window {
                    *count = 1;
                    *start = now;
                    true
                } else if *count < self.max_requests {
                    *count += 1;
                    true
                } else {
                    false
                }
            }
            None => {
                requests.insert(ip, (1, now));
                true
            }
        }
    }

    /// Seconds until the IP's current window resets.
    pub async fn retry_after_secs(&self, ip: IpAddr) -> u64 {
        let requests = self.requests.read().await;
        match requests.get(&ip) {
            Some((_, start)) => self
                .window
                .saturating_sub(start.elapsed())
                .as_secs()
                .max(1),
            None => 0,
        }
    }

    /// Drop expired windows (call periodically).
    pub async fn cleanup_expired(&self) {
        let mut requests = self.requests.write().await;
        let now = Instant::now();
        requests.retain(|_, (_, start)| now.duration_since(*start) <= self.window);
    }
}

pub async fn rate_limit_middleware(
    State(limiter): State<RateLimiter>,
    request: Request,
    next: Next,
) -> Response {
    let ip = client_ip(&request);

    if limiter.check_rate_limit(ip).await {
        return next.run(request).await;
    }

    let retry_after = limiter.retry_after_secs(ip).await;
    tracing::warn!(%ip, retry_after, "Rate limit exceeded");

    let body = ErrorResponse {
        error: ErrorDetail {
            kind: "rate_limit",
            message: format!("Rate limit exceeded. Try again in {retry_after} seconds"),
            retriable: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
            details: None,
        },
    };

    (
        StatusCode::TOO_MANY_REQUESTS,
        [(header::RETRY_AFTER, retry_after.to_string())],
        Json(body),
    )
        .into_response()
}

fn client_ip(request: &Request) -> IpAddr {
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .and_then(|s| s.trim().parse::<IpAddr>().ok())
        .unwrap_or_else(|| IpAddr::from([127, 0, 0, 1]))
}
