use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{Result, ServerError};
use crate::model::{Ban, Notification, Report};

/// Domain Events（领域事件）
///
/// 每个变体对应一个 topic 后缀，发布时统一写到 `events:{suffix}`。
#[derive(Debug, Clone)]
pub enum DomainEvent {
    /// 管理员创建禁言
    BanCreated { ban: Ban, timestamp: DateTime<Utc> },

    /// 解除禁言
    BanRemoved { ban: Ban, timestamp: DateTime<Utc> },

    /// 刷屏触发的自动禁言
    AutoBanSpam { ban: Ban, timestamp: DateTime<Utc> },

    /// 累计违规触发的自动禁言
    AutoBanSevere { ban: Ban, timestamp: DateTime<Utc> },

    /// 新举报
    ReportCreated {
        report: Report,
        timestamp: DateTime<Utc>,
    },

    /// 举报处理完成
    ReportResolved {
        report: Report,
        timestamp: DateTime<Utc>,
    },

    /// 公会升级
    GuildLeveledUp {
        guild_id: Uuid,
        old_level: i32,
        new_level: i32,
        experience: i64,
        timestamp: DateTime<Utc>,
    },

    /// 需要实时推送的通知
    NotificationWebsocket {
        notification: Notification,
        data: Map<String, Value>,
    },
}

impl DomainEvent {
    /// topic 后缀（不含 `events:` 前缀）
    pub fn topic_suffix(&self) -> String {
        match self {
            DomainEvent::BanCreated { .. } => "chat:ban:created".to_string(),
            DomainEvent::BanRemoved { .. } => "chat:ban:removed".to_string(),
            DomainEvent::AutoBanSpam { .. } => "chat:ban:auto:spam".to_string(),
            DomainEvent::AutoBanSevere { .. } => "chat:ban:auto:severe".to_string(),
            DomainEvent::ReportCreated { .. } => "chat:report:created".to_string(),
            DomainEvent::ReportResolved { .. } => "chat:report:resolved".to_string(),
            DomainEvent::GuildLeveledUp { .. } => "guild:leveled-up".to_string(),
            DomainEvent::NotificationWebsocket { notification, .. } => {
                format!("notification:websocket:{}", notification.account_id)
            }
        }
    }

    /// 转换为扁平的 key/value 负载
    pub fn into_payload(self) -> EventPayload {
        let mut payload = EventPayload::new();
        match self {
            DomainEvent::BanCreated { ban, timestamp }
            | DomainEvent::BanRemoved { ban, timestamp }
            | DomainEvent::AutoBanSpam { ban, timestamp }
            | DomainEvent::AutoBanSevere { ban, timestamp } => {
                payload.insert("ban_id", ban.id.to_string());
                payload.insert("character_id", ban.character_id.to_string());
                payload.insert("reason", ban.reason);
                if let Some(channel_id) = ban.channel_id {
                    payload.insert("channel_id", channel_id.to_string());
                }
                if let Some(admin_id) = ban.admin_id {
                    payload.insert("admin_id", admin_id.to_string());
                }
                if let Some(expires_at) = ban.expires_at {
                    payload.insert("expires_at", expires_at.to_rfc3339());
                }
                payload.insert("timestamp", timestamp.timestamp());
            }
            DomainEvent::ReportCreated { report, timestamp } => {
                payload.insert("report_id", report.id.to_string());
                payload.insert("reporter_id", report.reporter_id.to_string());
                payload.insert("reported_id", report.reported_id.to_string());
                payload.insert("reason", report.reason);
                if let Some(message_id) = report.message_id {
                    payload.insert("message_id", message_id.to_string());
                }
                if let Some(channel_id) = report.channel_id {
                    payload.insert("channel_id", channel_id.to_string());
                }
                payload.insert("timestamp", timestamp.timestamp());
            }
            DomainEvent::ReportResolved { report, timestamp } => {
                payload.insert("report_id", report.id.to_string());
                if let Some(admin_id) = report.admin_id {
                    payload.insert("admin_id", admin_id.to_string());
                }
                payload.insert("status", report.status.as_str());
                payload.insert("timestamp", timestamp.timestamp());
            }
            DomainEvent::GuildLeveledUp {
                guild_id,
                old_level,
                new_level,
                experience,
                timestamp,
            } => {
                payload.insert("guild_id", guild_id.to_string());
                payload.insert("old_level", old_level);
                payload.insert("new_level", new_level);
                payload.insert("experience", experience);
                payload.insert("timestamp", timestamp.timestamp());
            }
            DomainEvent::NotificationWebsocket { notification, data } => {
                payload.insert("notification_id", notification.id.to_string());
                payload.insert("account_id", notification.account_id.to_string());
                payload.insert("type", notification.kind.as_str());
                payload.insert("priority", notification.priority.as_str());
                payload.insert("title", notification.title);
                payload.insert("content", notification.content);
                payload.insert("status", notification.status.as_str());
                payload.insert("created_at", notification.created_at.to_rfc3339());
                // 原事件字段平铺进来，但不覆盖通知本身的字段
                for (key, value) in data {
                    payload.0.entry(key).or_insert(value);
                }
            }
        }
        payload
    }
}

/// 事件负载：JSON 对象 + 类型化访问器
///
/// 访问器在字段类型不符时返回 `Validation` 错误，而不是静默忽略。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventPayload(Map<String, Value>);

impl EventPayload {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// 解码原始消息；必须是 JSON 对象
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        match serde_json::from_slice::<Value>(bytes)? {
            Value::Object(map) => Ok(Self(map)),
            other => Err(ServerError::Serialization(format!(
                "event payload must be a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    pub fn to_vec(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.0)?)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    /// 字符串字段；缺失或为 null 时返回 `None`
    pub fn str(&self, key: &str) -> Result<Option<&str>> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(type_mismatch(key, "string", other)),
        }
    }

    /// UUID 字段（以字符串形式传输）
    pub fn uuid(&self, key: &str) -> Result<Option<Uuid>> {
        match self.str(key)? {
            None => Ok(None),
            Some(s) => Uuid::parse_str(s).map(Some).map_err(|e| {
                ServerError::Validation(format!("field `{}` is not a valid uuid: {}", key, e))
            }),
        }
    }

    /// 整数字段，也接受数字字符串
    pub fn i64(&self, key: &str) -> Result<Option<i64>> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n
                .as_i64()
                .map(Some)
                .ok_or_else(|| type_mismatch(key, "integer", &Value::Number(n.clone()))),
            Some(Value::String(s)) => s.trim().parse::<i64>().map(Some).map_err(|_| {
                ServerError::Validation(format!("field `{}` is not an integer: {}", key, s))
            }),
            Some(other) => Err(type_mismatch(key, "integer", other)),
        }
    }
}

impl From<Map<String, Value>> for EventPayload {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

fn type_mismatch(key: &str, expected: &str, actual: &Value) -> ServerError {
    ServerError::Validation(format!(
        "field `{}` expected {}, got {}",
        key,
        expected,
        json_kind(actual)
    ))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CreateNotificationRequest, NotificationPriority, NotificationType};

    #[test]
    fn test_payload_rejects_non_object() {
        assert!(EventPayload::from_slice(b"[1,2,3]").is_err());
        assert!(EventPayload::from_slice(b"not json").is_err());
        assert!(EventPayload::from_slice(br#"{"a":1}"#).is_ok());
    }

    #[test]
    fn test_typed_accessors() {
        let id = Uuid::new_v4();
        let payload = EventPayload::from_slice(
            format!(r#"{{"account_id":"{}","level":"7","bad":3,"none":null}}"#, id).as_bytes(),
        )
        .unwrap();

        assert_eq!(payload.uuid("account_id").unwrap(), Some(id));
        assert_eq!(payload.i64("level").unwrap(), Some(7));
        assert_eq!(payload.str("none").unwrap(), None);
        assert_eq!(payload.str("missing").unwrap(), None);
        assert!(payload.str("bad").is_err());
        assert!(payload.uuid("level").is_err());
    }

    #[test]
    fn test_ban_event_payload_skips_absent_fields() {
        let ban = Ban::new(Uuid::new_v4(), None, None, "spam", None, None);
        let event = DomainEvent::BanCreated {
            ban: ban.clone(),
            timestamp: Utc::now(),
        };
        assert_eq!(event.topic_suffix(), "chat:ban:created");

        let payload = event.into_payload();
        assert_eq!(payload.uuid("ban_id").unwrap(), Some(ban.id));
        assert!(!payload.contains_key("channel_id"));
        assert!(!payload.contains_key("admin_id"));
        assert!(!payload.contains_key("expires_at"));
        assert!(payload.i64("timestamp").unwrap().is_some());
    }

    #[test]
    fn test_websocket_payload_does_not_override_notification_fields() {
        let notification = Notification::from_request(CreateNotificationRequest {
            account_id: Uuid::new_v4(),
            kind: NotificationType::Trade,
            priority: NotificationPriority::High,
            title: "Trade offer".to_string(),
            content: String::new(),
            data: Default::default(),
            channels: vec![],
            expires_at: None,
        });
        let mut data = Map::new();
        data.insert("title".to_string(), Value::from("raw title"));
        data.insert("trade_id".to_string(), Value::from("t-1"));

        let event = DomainEvent::NotificationWebsocket {
            notification: notification.clone(),
            data,
        };
        assert_eq!(
            event.topic_suffix(),
            format!("notification:websocket:{}", notification.account_id)
        );

        let payload = event.into_payload();
        assert_eq!(payload.str("title").unwrap(), Some("Trade offer"));
        assert_eq!(payload.str("trade_id").unwrap(), Some("t-1"));
        assert_eq!(payload.str("type").unwrap(), Some("trade"));
    }
}
