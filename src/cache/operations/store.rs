use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use redis::AsyncCommands;
use tokio::time::Instant;

use crate::cache::models::CacheEntry;
use crate::cache::operations::RedisConnection;
use crate::error::StoreError;

/// 外部键值缓存的最小契约
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// 键不存在或已过期时返回 `Ok(None)`
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError>;

    /// 覆盖写入，过期时间从调用时刻算起
    async fn set_with_expiry(&self, key: &str, value: Bytes, ttl: Duration)
    -> Result<(), StoreError>;
}

/// Redis 缓存存储
pub struct RedisCacheStore {
    redis: RedisConnection,
}

impl RedisCacheStore {
    pub fn new(redis: RedisConnection) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        let mut conn = self.redis.get().await?;
        let result: Option<Vec<u8>> = conn.get(key).await?;
        Ok(result.map(Bytes::from))
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: Bytes,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let mut conn = self.redis.get().await?;
        let _: () = conn.set_ex(key, value.as_ref(), ttl.as_secs().max(1)).await?;
        Ok(())
    }
}

/// 进程内缓存存储，用于无 Redis 部署和测试
#[derive(Default)]
pub struct MemoryCacheStore {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        let found = entries
            .get(key)
            .map(|entry| entry.is_live(now).then(|| entry.value.clone()));
        match found {
            Some(Some(value)) => Ok(Some(value)),
            Some(None) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: Bytes,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);

        // 清理已过期的条目，包括之后再也不会被读取的键
        entries.retain(|_, entry| entry.is_live(now));

        entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: now + ttl,
            },
        );
        Ok(())
    }
}
