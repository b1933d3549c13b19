// 缓存模块
// 包含缓存键、存储契约和旁路缓存流程

pub mod aside;
pub mod keys;
pub mod models;
pub mod operations;

pub use aside::{CacheAside, Fetched, Source};
pub use operations::{CacheStore, QuotaStore};
