// RedisClient - Redis客户端实现
// 基于 bb8-redis 连接池；订阅使用独立的非池化连接

use std::time::Duration;

use async_trait::async_trait;
use bb8::Pool;
use bb8_redis::RedisConnectionManager;
use futures::StreamExt;
use redis::AsyncCommands;

use crate::config::RedisConfig;
use crate::error::{Result, ServerError};
use crate::infra::counter_store::CounterStore;
use crate::infra::pubsub::{EventStream, PubSubTransport, RawEvent};

/// Redis 客户端（基于连接池）
#[derive(Clone)]
pub struct RedisClient {
    pool: Pool<RedisConnectionManager>,
    /// 订阅专用：每个 pattern 订阅打开一条独立连接
    client: redis::Client,
    /// 单条 Redis 命令的执行超时
    command_timeout: Duration,
}

impl RedisClient {
    /// 创建新的 Redis 客户端（从 RedisConfig 配置）
    pub async fn new(config: &RedisConfig) -> Result<Self> {
        let manager = RedisConnectionManager::new(config.url.clone()).map_err(|e| {
            ServerError::Cache(format!("Failed to create Redis manager: {}", e))
        })?;
        let client = redis::Client::open(config.url.clone())?;

        let pool = Pool::builder()
            .max_size(config.pool_size)
            .min_idle(Some(config.min_idle))
            .connection_timeout(config.connection_timeout())
            .idle_timeout(Some(config.idle_timeout()))
            .build(manager)
            .await
            .map_err(|e| ServerError::Cache(format!("Failed to create Redis pool: {}", e)))?;

        // 测试连接
        {
            let mut conn = pool.get().await.map_err(|e| {
                ServerError::Cache(format!("Failed to get Redis connection: {}", e))
            })?;
            let _: String = conn
                .ping()
                .await
                .map_err(|e| ServerError::Cache(format!("Redis ping failed: {}", e)))?;
        }

        tracing::info!(
            "✅ Redis 连接池已创建 (pool_size={}, min_idle={}, conn_timeout={}s, cmd_timeout={}ms, idle_timeout={}s)",
            config.pool_size,
            config.min_idle,
            config.connection_timeout_secs,
            config.command_timeout_ms,
            config.idle_timeout_secs,
        );

        Ok(Self {
            pool,
            client,
            command_timeout: config.command_timeout(),
        })
    }

    /// 获取连接池状态（活跃连接数、空闲连接数）
    pub fn pool_state(&self) -> bb8::State {
        self.pool.state()
    }

    async fn get_conn(&self) -> Result<bb8::PooledConnection<'_, RedisConnectionManager>> {
        self.pool
            .get()
            .await
            .map_err(|e| ServerError::Cache(format!("Failed to get Redis connection: {}", e)))
    }

    /// 执行带超时的 Redis 操作
    async fn with_timeout<F, T>(&self, op: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        tokio::time::timeout(self.command_timeout, op)
            .await
            .map_err(|_| {
                ServerError::Timeout(format!(
                    "Redis command timeout ({}ms)",
                    self.command_timeout.as_millis()
                ))
            })?
    }
}

#[async_trait]
impl CounterStore for RedisClient {
    /// INCR key
    async fn incr(&self, key: &str) -> Result<i64> {
        self.with_timeout(async {
            let mut conn = self.get_conn().await?;
            let value: i64 = conn
                .incr(key, 1)
                .await
                .map_err(|e| ServerError::Cache(format!("Redis INCR failed: {}", e)))?;
            Ok(value)
        })
        .await
    }

    /// EXPIRE key seconds
    async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        self.with_timeout(async {
            let mut conn = self.get_conn().await?;
            conn.expire::<_, ()>(key, ttl.as_secs().max(1) as i64)
                .await
                .map_err(|e| ServerError::Cache(format!("Redis EXPIRE failed: {}", e)))?;
            Ok(())
        })
        .await
    }

    /// INCR + EXPIRE 在一个 Lua 脚本中原子执行
    ///
    /// 只要 key 没有 TTL 就补设窗口，不会留下永不过期的计数器。
    async fn incr_with_window(&self, key: &str, window: Duration) -> Result<i64> {
        let script = redis::Script::new(
            r"
            local count = redis.call('INCR', KEYS[1])
            if redis.call('TTL', KEYS[1]) == -1 then
                redis.call('EXPIRE', KEYS[1], ARGV[1])
            end
            return count
            ",
        );

        self.with_timeout(async {
            let mut conn = self.get_conn().await?;
            let count: i64 = script
                .key(key)
                .arg(window.as_secs().max(1))
                .invoke_async(&mut *conn)
                .await
                .map_err(|e| ServerError::Cache(format!("Redis INCR window script failed: {}", e)))?;
            Ok(count)
        })
        .await
    }

    /// GET key
    async fn get(&self, key: &str) -> Result<Option<i64>> {
        self.with_timeout(async {
            let mut conn = self.get_conn().await?;
            let value: Option<i64> = conn
                .get(key)
                .await
                .map_err(|e| ServerError::Cache(format!("Redis GET failed: {}", e)))?;
            Ok(value)
        })
        .await
    }

    /// DEL key
    async fn del(&self, key: &str) -> Result<()> {
        self.with_timeout(async {
            let mut conn = self.get_conn().await?;
            conn.del::<_, ()>(key)
                .await
                .map_err(|e| ServerError::Cache(format!("Redis DEL failed: {}", e)))?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl PubSubTransport for RedisClient {
    /// PUBLISH channel message
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<()> {
        self.with_timeout(async {
            let mut conn = self.get_conn().await?;
            conn.publish::<_, _, ()>(topic, payload)
                .await
                .map_err(|e| ServerError::Cache(format!("Redis PUBLISH failed: {}", e)))?;
            Ok(())
        })
        .await
    }

    /// PSUBSCRIBE pattern [pattern ...]
    async fn subscribe_pattern(&self, patterns: &[String]) -> Result<EventStream> {
        let mut pubsub = self
            .with_timeout(async {
                self.client.get_async_pubsub().await.map_err(|e| {
                    ServerError::Cache(format!("Failed to open Redis Pub/Sub connection: {}", e))
                })
            })
            .await?;

        for pattern in patterns {
            pubsub
                .psubscribe(pattern.as_str())
                .await
                .map_err(|e| ServerError::Cache(format!("Redis PSUBSCRIBE {} failed: {}", pattern, e)))?;
        }

        tracing::debug!("📡 Redis PSUBSCRIBE 完成: {:?}", patterns);

        let stream = pubsub.into_on_message().map(|msg| RawEvent {
            topic: msg.get_channel_name().to_string(),
            payload: msg.get_payload_bytes().to_vec(),
        });
        Ok(Box::pin(stream))
    }
}
