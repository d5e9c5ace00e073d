//! 进程内实现：用于测试和 `--dev` 嵌入，不依赖 Redis
//!
//! 计数器过期使用 `tokio::time::Instant`，测试中可以配合
//! `tokio::time::pause()` / `advance()` 推进时间窗口。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::error::Result;
use crate::infra::counter_store::CounterStore;
use crate::infra::pubsub::{topic_matches, EventStream, PubSubTransport, RawEvent};

/// 发布日志默认保留的消息条数
pub const PUBLISHED_LOG_LIMIT: usize = 10_000;

/// 计数器每自增这么多次清理一遍已过期的 key
const COUNTER_SWEEP_INTERVAL: u64 = 1024;

/// 进程内 Pub/Sub（tokio broadcast + glob 过滤）
///
/// 发布日志只保留最近 `log_limit` 条，超出时丢弃最早的。
#[derive(Clone)]
pub struct MemoryPubSub {
    sender: broadcast::Sender<RawEvent>,
    published: Arc<Mutex<VecDeque<RawEvent>>>,
    log_limit: usize,
}

impl MemoryPubSub {
    pub fn new() -> Self {
        Self::with_capacity(1000)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_limits(capacity, PUBLISHED_LOG_LIMIT)
    }

    /// 指定 broadcast 缓冲大小和发布日志上限
    pub fn with_limits(capacity: usize, log_limit: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            published: Arc::new(Mutex::new(VecDeque::new())),
            log_limit,
        }
    }

    /// 已发布消息的快照
    pub fn published(&self) -> Vec<RawEvent> {
        self.published.lock().iter().cloned().collect()
    }

    /// 按 topic 前缀筛选已发布消息
    pub fn published_with_prefix(&self, prefix: &str) -> Vec<RawEvent> {
        self.published
            .lock()
            .iter()
            .filter(|e| e.topic.starts_with(prefix))
            .cloned()
            .collect()
    }
}

impl Default for MemoryPubSub {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PubSubTransport for MemoryPubSub {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<()> {
        let event = RawEvent {
            topic: topic.to_string(),
            payload: payload.to_vec(),
        };
        {
            let mut log = self.published.lock();
            if self.log_limit > 0 {
                while log.len() >= self.log_limit {
                    log.pop_front();
                }
                log.push_back(event.clone());
            }
        }
        // 没有订阅者时 send 返回 Err，与 Redis PUBLISH 返回 0 等价
        let _ = self.sender.send(event);
        Ok(())
    }

    async fn subscribe_pattern(&self, patterns: &[String]) -> Result<EventStream> {
        let patterns = patterns.to_vec();
        let stream = BroadcastStream::new(self.sender.subscribe()).filter_map(move |item| {
            match item {
                Ok(event) if patterns.iter().any(|p| topic_matches(p, &event.topic)) => {
                    Some(event)
                }
                Ok(_) => None,
                Err(BroadcastStreamRecvError::Lagged(n)) => {
                    tracing::warn!("⚠️ MemoryPubSub 订阅者落后，丢弃 {} 条消息", n);
                    None
                }
            }
        });
        Ok(Box::pin(stream))
    }
}

#[derive(Debug, Clone, Copy)]
struct CounterEntry {
    value: i64,
    expires_at: Option<Instant>,
}

impl CounterEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |exp| exp > now)
    }
}

/// 进程内计数器（DashMap + 惰性过期）
///
/// 读取时删除过期 key；另外每 1024 次自增整体清理一遍，
/// 只写不读的 key 也不会无限累积。
#[derive(Clone, Default)]
pub struct MemoryCounterStore {
    entries: Arc<DashMap<String, CounterEntry>>,
    increments: Arc<AtomicU64>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前保存的 key 数（包括尚未清理的过期 key）
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 删除所有已过期的 key
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.is_live(now));
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn incr(&self, key: &str) -> Result<i64> {
        let ops = self.increments.fetch_add(1, Ordering::Relaxed) + 1;
        if ops % COUNTER_SWEEP_INTERVAL == 0 {
            self.purge_expired();
        }

        let now = Instant::now();
        let mut entry = self.entries.entry(key.to_string()).or_insert(CounterEntry {
            value: 0,
            expires_at: None,
        });
        if !entry.is_live(now) {
            *entry = CounterEntry {
                value: 0,
                expires_at: None,
            };
        }
        entry.value += 1;
        Ok(entry.value)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.expires_at = Some(Instant::now() + ttl);
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<i64>> {
        let now = Instant::now();
        let live = self
            .entries
            .get(key)
            .map(|entry| (entry.is_live(now), entry.value));
        match live {
            Some((true, value)) => Ok(Some(value)),
            Some((false, _)) => {
                self.entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_counter_window_expires() {
        let store = MemoryCounterStore::new();
        let window = Duration::from_secs(60);

        assert_eq!(store.incr_with_window("k", window).await.unwrap(), 1);
        assert_eq!(store.incr_with_window("k", window).await.unwrap(), 2);

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(store.get("k").await.unwrap(), Some(2));

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert_eq!(store.incr_with_window("k", window).await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_counters_are_swept_without_reads() {
        let store = MemoryCounterStore::new();
        let window = Duration::from_secs(60);

        for i in 0..1000 {
            store
                .incr_with_window(&format!("burst:{}", i), window)
                .await
                .unwrap();
        }
        assert_eq!(store.len(), 1000);

        tokio::time::advance(Duration::from_secs(61)).await;
        for i in 0..(COUNTER_SWEEP_INTERVAL as usize - 1000) {
            store
                .incr_with_window(&format!("fresh:{}", i), window)
                .await
                .unwrap();
        }
        // 第 1024 次自增触发整体清理，只剩未过期的 key
        assert_eq!(store.len(), COUNTER_SWEEP_INTERVAL as usize - 1000);
        assert_eq!(store.get("burst:0").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_counter_del() {
        let store = MemoryCounterStore::new();
        store.incr("k").await.unwrap();
        store.del("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_pubsub_delivers_only_matching_topics() {
        let bus = MemoryPubSub::new();
        let mut stream = bus
            .subscribe_pattern(&["events:friend:*".to_string()])
            .await
            .unwrap();

        bus.publish("events:guild:created", b"{}").await.unwrap();
        bus.publish("events:friend:added", b"{\"a\":1}").await.unwrap();

        let event = stream.next().await.unwrap();
        assert_eq!(event.topic, "events:friend:added");
        assert_eq!(event.payload, b"{\"a\":1}".to_vec());
        assert_eq!(bus.published().len(), 2);
    }

    #[tokio::test]
    async fn test_published_log_keeps_most_recent() {
        let bus = MemoryPubSub::with_limits(16, 3);
        for i in 0..5 {
            bus.publish(&format!("events:test:{}", i), b"{}").await.unwrap();
        }

        let topics: Vec<String> = bus.published().into_iter().map(|e| e.topic).collect();
        assert_eq!(
            topics,
            vec!["events:test:2", "events:test:3", "events:test:4"]
        );
        assert_eq!(bus.published_with_prefix("events:test:0").len(), 0);
    }
}
