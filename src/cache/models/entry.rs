use bytes::Bytes;
use tokio::time::Instant;

/// 内存缓存条目，整体覆盖，不做原地修改
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: Bytes,
    pub expires_at: Instant,
}

impl CacheEntry {
    pub fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}
