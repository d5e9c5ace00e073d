use std::sync::Arc;

use crate::domain::events::{DomainEvent, EventPayload};
use crate::error::Result;
use crate::infra::pubsub::PubSubTransport;

/// 所有领域事件 topic 的公共前缀
pub const EVENT_TOPIC_PREFIX: &str = "events:";

/// Event Bus（事件总线）
///
/// 只负责把事件写到 `events:{suffix}`；不确认、不重试、不反压。
#[derive(Clone)]
pub struct EventBus {
    transport: Arc<dyn PubSubTransport>,
}

impl EventBus {
    pub fn new(transport: Arc<dyn PubSubTransport>) -> Self {
        Self { transport }
    }

    pub fn topic_for(suffix: &str) -> String {
        format!("{}{}", EVENT_TOPIC_PREFIX, suffix)
    }

    /// 发布事件
    pub async fn publish(&self, topic_suffix: &str, payload: &EventPayload) -> Result<()> {
        let bytes = payload.to_vec()?;
        self.transport
            .publish(&Self::topic_for(topic_suffix), &bytes)
            .await
    }

    /// 发布领域事件；失败只记日志，不影响已完成的业务操作
    pub async fn publish_event(&self, event: DomainEvent) {
        let suffix = event.topic_suffix();
        let payload = event.into_payload();
        if let Err(e) = self.publish(&suffix, &payload).await {
            tracing::warn!("⚠️ [EVENT BUS] 发布事件失败: topic={}, error={}", suffix, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::memory::MemoryPubSub;

    #[tokio::test]
    async fn test_publish_prefixes_topic() {
        let transport = Arc::new(MemoryPubSub::new());
        let bus = EventBus::new(transport.clone());

        let mut payload = EventPayload::new();
        payload.insert("guild_id", "g-1");
        bus.publish("guild:leveled-up", &payload).await.unwrap();

        let published = transport.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].topic, "events:guild:leveled-up");
        let decoded = EventPayload::from_slice(&published[0].payload).unwrap();
        assert_eq!(decoded.str("guild_id").unwrap(), Some("g-1"));
    }
}
