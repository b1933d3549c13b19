use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::{
    cache::operations::{QuotaStore, rate_limit_key},
    config::Config,
    error::AppError,
};

pub const LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";

/// 准入判定结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted { remaining: u64 },
    Rejected { retry_after: Duration },
}

/// 按客户端固定窗口计数的限流器
#[derive(Clone)]
pub struct RateLimiter {
    quota: Arc<dyn QuotaStore>,
    window: Duration,
    limit: u32,
    trust_proxy_headers: bool,
}

impl RateLimiter {
    pub fn new(quota: Arc<dyn QuotaStore>, config: &Config) -> Self {
        Self {
            quota,
            window: config.rate_limit_window(),
            limit: config.rate_limit_requests,
            trust_proxy_headers: config.trust_proxy_headers,
        }
    }

    pub async fn admit(&self, client: &str) -> Admission {
        let key = rate_limit_key(client);
        let hit = match self.quota.hit(&key, self.window).await {
            Ok(hit) => hit,
            Err(e) => {
                // 计数存储不可用时放行
                tracing::warn!("Rate limit store unavailable, admitting {}: {}", client, e);
                return Admission::Admitted {
                    remaining: u64::from(self.limit),
                };
            }
        };

        let limit = u64::from(self.limit);
        if hit.count > limit {
            tracing::warn!(
                "Rate limit exceeded for {}: {} requests in window",
                client,
                hit.count
            );
            return Admission::Rejected {
                retry_after: hit.resets_in,
            };
        }

        Admission::Admitted {
            remaining: limit - hit.count,
        }
    }

    /// 识别客户端：连接地址，信任代理时优先使用代理头
    pub fn client_identity(&self, req: &Request<Body>) -> String {
        let remote_ip = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0.ip().to_string());

        let forwarded = if self.trust_proxy_headers {
            forwarded_ip(req.headers())
        } else {
            None
        };

        forwarded
            .or(remote_ip)
            .unwrap_or_else(|| "unknown".to_string())
    }

    pub async fn check_rate_limit(self: Arc<Self>, req: Request<Body>, next: Next) -> Response {
        let client = self.client_identity(&req);
        tracing::debug!("client: {}", client);

        match self.admit(&client).await {
            Admission::Rejected { retry_after } => {
                AppError::TooManyRequests { retry_after }.into_response()
            }
            Admission::Admitted { remaining } => {
                let mut response = next.run(req).await;
                let headers = response.headers_mut();
                headers.insert(LIMIT_HEADER, HeaderValue::from(self.limit));
                headers.insert(REMAINING_HEADER, HeaderValue::from(remaining));
                response
            }
        }
    }
}

fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .or_else(|| {
            headers
                .get("x-forwarded-for")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.split(',').find(|ip| !ip.trim().is_empty()))
        })
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
}

pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    limiter.check_rate_limit(req, next).await
}
