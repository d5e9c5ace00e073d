//! 计数器存储抽象（刷屏窗口 / 累计违规）

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// 原子自增 + 过期的计数器
///
/// 自增本身是原子的；"读取后再决定" 的组合操作不是事务性的。
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// INCR，返回自增后的值
    async fn incr(&self, key: &str) -> Result<i64>;

    /// 设置过期时间
    async fn expire(&self, key: &str, ttl: Duration) -> Result<()>;

    /// 读取当前值，不存在或已过期返回 `None`
    async fn get(&self, key: &str) -> Result<Option<i64>>;

    async fn del(&self, key: &str) -> Result<()>;

    /// 自增；第一次自增时设置窗口过期
    ///
    /// 设置过期失败时删除该 key 再返回错误，计数器不会失去窗口。
    /// 能在服务端原子执行的实现应当覆盖此方法。
    async fn incr_with_window(&self, key: &str, window: Duration) -> Result<i64> {
        let count = self.incr(key).await?;
        if count == 1 {
            if let Err(e) = self.expire(key, window).await {
                if let Err(del_err) = self.del(key).await {
                    tracing::warn!("⚠️ 删除无过期时间的计数器失败: key={}, error={}", key, del_err);
                }
                return Err(e);
            }
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::error::ServerError;
    use crate::infra::MemoryCounterStore;

    /// 第一次 EXPIRE 失败，其余委托给内存实现
    struct FirstExpireFails {
        inner: MemoryCounterStore,
        failed: AtomicBool,
    }

    #[async_trait]
    impl CounterStore for FirstExpireFails {
        async fn incr(&self, key: &str) -> Result<i64> {
            self.inner.incr(key).await
        }

        async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
            if !self.failed.swap(true, Ordering::SeqCst) {
                return Err(ServerError::Timeout("EXPIRE timed out".to_string()));
            }
            self.inner.expire(key, ttl).await
        }

        async fn get(&self, key: &str) -> Result<Option<i64>> {
            self.inner.get(key).await
        }

        async fn del(&self, key: &str) -> Result<()> {
            self.inner.del(key).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_expire_does_not_leave_counter_without_window() {
        let store = FirstExpireFails {
            inner: MemoryCounterStore::new(),
            failed: AtomicBool::new(false),
        };
        let window = Duration::from_secs(60);

        assert!(matches!(
            store.incr_with_window("k", window).await,
            Err(ServerError::Timeout(_))
        ));
        assert_eq!(store.get("k").await.unwrap(), None);

        assert_eq!(store.incr_with_window("k", window).await.unwrap(), 1);
        assert_eq!(store.incr_with_window("k", window).await.unwrap(), 2);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
    }
}
