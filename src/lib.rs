use std::sync::Arc;

use axum::{Router, routing::get};
use cache::CacheAside;
use config::Config;
use middleware::{RateLimiter, log_errors, rate_limit};

pub mod cache;
pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod upstream;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub cache: Arc<CacheAside>,
}

/// 构建路由：地震接口经过限流，健康检查不限流
pub fn app(state: AppState, rate_limiter: Arc<RateLimiter>) -> Router {
    let earthquake_routes = Router::new()
        .route("/earthquakes", get(routes::earthquake::search))
        .route("/earthquakes/{id}", get(routes::earthquake::find_by_id))
        .layer(axum::middleware::from_fn_with_state(rate_limiter, rate_limit));

    Router::new()
        .route("/health", get(routes::health))
        .merge(earthquake_routes)
        .layer(axum::middleware::from_fn(log_errors))
        .with_state(state)
}
