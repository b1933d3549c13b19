use std::sync::Arc;
use std::time::Duration;

use redis::Client as RedisClient;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use tokio::sync::OnceCell;

/// 建立连接的超时时间
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// 缓存存储与限流存储共用的 Redis 连接
///
/// 第一次使用时建立，建立失败不会被记住，下一次请求会重试。
/// 建立之后由 `ConnectionManager` 负责断线重连。
#[derive(Clone)]
pub struct RedisConnection {
    client: RedisClient,
    manager: Arc<OnceCell<ConnectionManager>>,
}

impl RedisConnection {
    pub fn new(client: RedisClient) -> Self {
        Self {
            client,
            manager: Arc::new(OnceCell::new()),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.manager.initialized()
    }

    pub async fn get(&self) -> Result<ConnectionManager, redis::RedisError> {
        let manager = self
            .manager
            .get_or_try_init(|| {
                let config = ConnectionManagerConfig::new()
                    .set_number_of_retries(1)
                    .set_connection_timeout(CONNECT_TIMEOUT);
                ConnectionManager::new_with_config(self.client.clone(), config)
            })
            .await?;
        Ok(manager.clone())
    }
}
