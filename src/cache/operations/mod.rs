/// 缓存操作
/// 外部键值存储的契约与实现

// 共用 Redis 连接
pub mod connection;

// 响应缓存
pub mod store;

// 限流计数
pub mod rate_limit;

pub use connection::RedisConnection;
pub use rate_limit::{MemoryQuotaStore, QuotaStore, RedisQuotaStore, rate_limit_key};
pub use store::{CacheStore, MemoryCacheStore, RedisCacheStore};
