use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use tokio::time::Instant;

use crate::cache::models::{QuotaWindow, WindowHit};
use crate::cache::operations::RedisConnection;
use crate::error::StoreError;

/// 生成限流计数键
pub fn rate_limit_key(client: &str) -> String {
    format!("rate_limit:{}", client)
}

/// 限流计数存储
#[async_trait]
pub trait QuotaStore: Send + Sync {
    /// 当前窗口计数加一，窗口不存在或已过期时新开一个窗口
    async fn hit(&self, key: &str, window: Duration) -> Result<WindowHit, StoreError>;
}

/// Redis 限流存储，INCR + EXPIRE 实现固定窗口
pub struct RedisQuotaStore {
    redis: RedisConnection,
}

impl RedisQuotaStore {
    pub fn new(redis: RedisConnection) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl QuotaStore for RedisQuotaStore {
    async fn hit(&self, key: &str, window: Duration) -> Result<WindowHit, StoreError> {
        let mut conn = self.redis.get().await?;
        let window_secs = window.as_secs().max(1) as i64;

        // INCR 与 TTL 一次往返
        let (count, mut ttl): (u64, i64) = redis::pipe()
            .incr(key, 1)
            .ttl(key)
            .query_async(&mut conn)
            .await?;

        if ttl < 0 {
            // 新建的计数，或 INCR 之后 EXPIRE 之前进程退出留下的永不过期计数
            let _: () = conn.expire(key, window_secs).await?;
            ttl = window_secs;
        }

        Ok(WindowHit {
            count,
            resets_in: Duration::from_secs(ttl as u64),
        })
    }
}

/// 进程内限流存储
#[derive(Default)]
pub struct MemoryQuotaStore {
    windows: Mutex<HashMap<String, QuotaWindow>>,
}

impl MemoryQuotaStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QuotaStore for MemoryQuotaStore {
    async fn hit(&self, key: &str, window: Duration) -> Result<WindowHit, StoreError> {
        let now = Instant::now();
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);

        // 清理已过期的窗口
        windows.retain(|_, w| !w.is_elapsed(now, window));

        let current = windows
            .entry(key.to_string())
            .or_insert_with(|| QuotaWindow::open(now));
        current.count += 1;

        Ok(WindowHit {
            count: current.count,
            resets_in: current.resets_in(now, window),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn memory_window_counts_then_resets() {
        let store = MemoryQuotaStore::new();
        let window = Duration::from_secs(60);

        let first = store.hit("rate_limit:a", window).await.unwrap();
        assert_eq!(first.count, 1);
        assert_eq!(first.resets_in, window);

        tokio::time::advance(Duration::from_secs(20)).await;
        let second = store.hit("rate_limit:a", window).await.unwrap();
        assert_eq!(second.count, 2);
        assert_eq!(second.resets_in, Duration::from_secs(40));

        tokio::time::advance(Duration::from_secs(40)).await;
        let fresh = store.hit("rate_limit:a", window).await.unwrap();
        assert_eq!(fresh.count, 1);
        assert_eq!(fresh.resets_in, window);
    }

    #[tokio::test(start_paused = true)]
    async fn clients_have_separate_windows() {
        let store = MemoryQuotaStore::new();
        let window = Duration::from_secs(60);
        store.hit("rate_limit:a", window).await.unwrap();
        store.hit("rate_limit:a", window).await.unwrap();
        let other = store.hit("rate_limit:b", window).await.unwrap();
        assert_eq!(other.count, 1);
    }

    #[test]
    fn key_is_namespaced_by_client() {
        assert_eq!(rate_limit_key("10.0.0.1"), "rate_limit:10.0.0.1");
    }
}
