//! 通知扇出订阅者：把玩法事件转换为账号通知

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{EventHandler, HandleOutcome};
use crate::domain::{DomainEvent, EventPayload};
use crate::error::Result;
use crate::infra::EventBus;
use crate::model::{
    CreateNotificationRequest, DeliveryChannel, NotificationPriority, NotificationType,
};
use crate::service::NotificationService;

/// 订阅的 topic pattern
pub const NOTIFICATION_PATTERNS: [&str; 6] = [
    "events:friend:*",
    "events:guild:*",
    "events:trade:*",
    "events:achievement:*",
    "events:quest:*",
    "events:combat:*",
];

/// 依次尝试的正文字段
const CONTENT_FIELDS: [&str; 3] = ["content", "message", "description"];

pub struct NotificationSubscriber {
    notifications: Arc<NotificationService>,
    event_bus: EventBus,
}

impl NotificationSubscriber {
    pub fn new(notifications: Arc<NotificationService>, event_bus: EventBus) -> Self {
        Self {
            notifications,
            event_bus,
        }
    }
}

fn non_empty<'a>(payload: &'a EventPayload, key: &str) -> Result<Option<&'a str>> {
    Ok(payload.str(key)?.filter(|s| !s.trim().is_empty()))
}

#[async_trait]
impl EventHandler for NotificationSubscriber {
    fn name(&self) -> &'static str {
        "notification"
    }

    fn patterns(&self) -> Vec<String> {
        NOTIFICATION_PATTERNS.iter().map(|p| p.to_string()).collect()
    }

    async fn handle(&self, topic: &str, payload: EventPayload) -> Result<HandleOutcome> {
        let account_id = match payload.uuid("account_id")? {
            Some(id) => id,
            None => match payload.uuid("character_id")? {
                Some(id) => id,
                None => {
                    warn!(
                        "[NOTIFICATION SUBSCRIBER] 事件缺少 account_id / character_id，丢弃: topic={}",
                        topic
                    );
                    return Ok(HandleOutcome::Skipped);
                }
            },
        };

        let kind = NotificationType::from_topic(topic);
        let preferences = self.notifications.get_preferences(account_id).await?;
        if !preferences.is_enabled(kind) {
            debug!(
                "[NOTIFICATION SUBSCRIBER] 账号 {} 关闭了 {} 通知，跳过",
                account_id,
                kind.as_str()
            );
            return Ok(HandleOutcome::Skipped);
        }

        let priority = payload
            .str("priority")?
            .and_then(NotificationPriority::parse)
            .unwrap_or_default();
        let title = non_empty(&payload, "title")?
            .unwrap_or_else(|| kind.default_title())
            .to_string();
        let mut content = String::new();
        for field in CONTENT_FIELDS {
            if let Some(text) = non_empty(&payload, field)? {
                content = text.to_string();
                break;
            }
        }
        let channels = preferences.resolve_channels(priority);
        let realtime = channels.contains(&DeliveryChannel::WebSocket);

        let data = payload.into_map();
        let notification = self
            .notifications
            .create_notification(CreateNotificationRequest {
                account_id,
                kind,
                priority,
                title,
                content,
                data: data.clone(),
                channels,
                expires_at: None,
            })
            .await?;

        info!(
            "[NOTIFICATION SUBSCRIBER] 已创建通知: id={}, account_id={}, type={}, topic={}",
            notification.id,
            account_id,
            kind.as_str(),
            topic
        );

        if realtime {
            self.event_bus
                .publish_event(DomainEvent::NotificationWebsocket { notification, data })
                .await;
        }

        Ok(HandleOutcome::Processed)
    }
}
