use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use quake_gateway::{
    AppState, app,
    cache::{
        CacheAside, CacheStore, QuotaStore,
        operations::{
            MemoryCacheStore, MemoryQuotaStore, RedisCacheStore, RedisConnection, RedisQuotaStore,
        },
    },
    config::{CacheBackend, Config},
    middleware::RateLimiter,
    upstream::UsgsClient,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let config = Config::from_env().expect("Failed to load configuration");

    // 设置缓存与限流存储
    let (cache_store, quota_store) = match config.cache_backend {
        CacheBackend::Redis => {
            let redis_client = redis::Client::open(config.redis_url.clone())
                .expect("Failed to create Redis client");
            let redis = RedisConnection::new(redis_client);
            tracing::info!("Using Redis cache at {}", config.redis_url);
            let cache_store: Arc<dyn CacheStore> = Arc::new(RedisCacheStore::new(redis.clone()));
            let quota_store: Arc<dyn QuotaStore> = Arc::new(RedisQuotaStore::new(redis));
            (cache_store, quota_store)
        }
        CacheBackend::Memory => {
            tracing::info!("Using in-process cache");
            let cache_store: Arc<dyn CacheStore> = Arc::new(MemoryCacheStore::new());
            let quota_store: Arc<dyn QuotaStore> = Arc::new(MemoryQuotaStore::new());
            (cache_store, quota_store)
        }
    };

    // 设置上游客户端
    let upstream = UsgsClient::new(&config.upstream_base_url, config.upstream_timeout())
        .expect("Failed to create upstream client");
    tracing::info!("Upstream catalog: {}", upstream.query_url());

    let cache = Arc::new(CacheAside::new(
        cache_store,
        Arc::new(upstream),
        config.cache_ttl(),
        config.upstream_timeout(),
    ));

    // 设置应用状态
    let state = AppState {
        config: config.clone(),
        cache,
    };

    // 设置限流器
    let rate_limiter = Arc::new(RateLimiter::new(quota_store, &config));

    let router = app(state.clone(), rate_limiter);

    // 根据编译模式决定是否添加CORS
    #[cfg(debug_assertions)]
    let router = {
        tracing::debug!("Adding CORS layer for development mode");
        router.layer(tower_http::cors::CorsLayer::permissive())
    };

    // 启动服务器
    let addr = SocketAddr::new(
        state.config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        state.config.server_port,
    );
    tracing::info!("Server running on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind"),
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Failed to start server");
}
