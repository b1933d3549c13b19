use std::time::Duration;

use axum::Json;
use axum::{
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::upstream::UpstreamError;

pub const RATE_LIMIT_MESSAGE: &str = "Too many requests, please try again later.";

/// 缓存或限流存储不可用
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug)]
pub enum AppError {
    Upstream(UpstreamError),
    TooManyRequests { retry_after: Duration },
}

#[derive(Serialize)]
struct ErrorResponse {
    code: i32,
    error_message: String,
}

impl From<UpstreamError> for AppError {
    fn from(err: UpstreamError) -> Self {
        AppError::Upstream(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message, retry_after) = match self {
            // 上游错误细节只写日志，不返回给调用方
            AppError::Upstream(e) => {
                tracing::debug!("Responding 500 for upstream error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    None,
                )
            }
            AppError::TooManyRequests { retry_after } => (
                StatusCode::TOO_MANY_REQUESTS,
                RATE_LIMIT_MESSAGE.to_string(),
                Some(retry_after),
            ),
        };

        let body = Json(ErrorResponse {
            code: status.as_u16() as i32,
            error_message,
        });

        let mut response = (status, body).into_response();
        if let Some(retry_after) = retry_after {
            // 向上取整，至少 1 秒
            let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs.max(1)));
        }
        response
    }
}
