//! 通知模型与通知偏好

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 通知类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    Friend,
    Guild,
    Trade,
    Achievement,
    Quest,
    Combat,
    Message,
    System,
}

impl NotificationType {
    /// 按 topic 子串分类；按固定顺序匹配，都不匹配时为 System
    pub fn from_topic(topic: &str) -> Self {
        const ORDER: [(&str, NotificationType); 6] = [
            ("friend", NotificationType::Friend),
            ("guild", NotificationType::Guild),
            ("trade", NotificationType::Trade),
            ("achievement", NotificationType::Achievement),
            ("quest", NotificationType::Quest),
            ("combat", NotificationType::Combat),
        ];
        ORDER
            .iter()
            .find(|(needle, _)| topic.contains(needle))
            .map(|(_, kind)| *kind)
            .unwrap_or(NotificationType::System)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::Friend => "friend",
            NotificationType::Guild => "guild",
            NotificationType::Trade => "trade",
            NotificationType::Achievement => "achievement",
            NotificationType::Quest => "quest",
            NotificationType::Combat => "combat",
            NotificationType::Message => "message",
            NotificationType::System => "system",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "friend" => Some(NotificationType::Friend),
            "guild" => Some(NotificationType::Guild),
            "trade" => Some(NotificationType::Trade),
            "achievement" => Some(NotificationType::Achievement),
            "quest" => Some(NotificationType::Quest),
            "combat" => Some(NotificationType::Combat),
            "message" => Some(NotificationType::Message),
            "system" => Some(NotificationType::System),
            _ => None,
        }
    }

    /// 事件未提供 title 时使用的默认标题
    pub fn default_title(&self) -> &'static str {
        match self {
            NotificationType::Friend => "Friend Update",
            NotificationType::Guild => "Guild Update",
            NotificationType::Trade => "Trade Update",
            NotificationType::Achievement => "Achievement Unlocked",
            NotificationType::Quest => "Quest Update",
            NotificationType::Combat => "Combat Update",
            NotificationType::Message => "New Message",
            NotificationType::System => "System Notification",
        }
    }
}

/// 通知优先级
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl Default for NotificationPriority {
    fn default() -> Self {
        Self::Medium
    }
}

impl NotificationPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationPriority::Low => "low",
            NotificationPriority::Medium => "medium",
            NotificationPriority::High => "high",
            NotificationPriority::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(NotificationPriority::Low),
            "medium" => Some(NotificationPriority::Medium),
            "high" => Some(NotificationPriority::High),
            "critical" => Some(NotificationPriority::Critical),
            _ => None,
        }
    }

    /// High / Critical 必须实时推送
    pub fn requires_realtime(&self) -> bool {
        matches!(self, NotificationPriority::High | NotificationPriority::Critical)
    }
}

/// 通知状态：unread -> read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    Unread,
    Read,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Unread => "unread",
            NotificationStatus::Read => "read",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unread" => Some(NotificationStatus::Unread),
            "read" => Some(NotificationStatus::Read),
            _ => None,
        }
    }
}

/// 投递渠道（与聊天频道无关）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeliveryChannel {
    #[serde(rename = "in_game")]
    InGame,
    #[serde(rename = "websocket")]
    WebSocket,
    #[serde(rename = "email")]
    Email,
}

impl DeliveryChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryChannel::InGame => "in_game",
            DeliveryChannel::WebSocket => "websocket",
            DeliveryChannel::Email => "email",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "in_game" => Some(DeliveryChannel::InGame),
            "websocket" => Some(DeliveryChannel::WebSocket),
            "email" => Some(DeliveryChannel::Email),
            _ => None,
        }
    }
}

/// 通知（对应 social_notifications 表）
///
/// 只允许通过状态转换修改；`expires_at` 仅在读取时过滤，从不物理删除。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub account_id: Uuid,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub priority: NotificationPriority,
    pub title: String,
    pub content: String,
    pub data: serde_json::Map<String, serde_json::Value>,
    pub status: NotificationStatus,
    pub channels: Vec<DeliveryChannel>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Notification {
    pub fn from_request(request: CreateNotificationRequest) -> Self {
        let channels = if request.channels.is_empty() {
            vec![DeliveryChannel::InGame]
        } else {
            request.channels
        };
        Self {
            id: Uuid::new_v4(),
            account_id: request.account_id,
            kind: request.kind,
            priority: request.priority,
            title: request.title,
            content: request.content,
            data: request.data,
            status: NotificationStatus::Unread,
            channels,
            created_at: Utc::now(),
            expires_at: request.expires_at,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(false, |exp| exp <= now)
    }
}

/// 创建通知请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNotificationRequest {
    pub account_id: Uuid,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    #[serde(default)]
    pub priority: NotificationPriority,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub data: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub channels: Vec<DeliveryChannel>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// 通知分页结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationListResponse {
    pub notifications: Vec<Notification>,
    pub total: usize,
    pub unread: usize,
}

/// 通知偏好（对应 social_notification_preferences 表，账号所有）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPreferences {
    pub account_id: Uuid,
    pub friend_enabled: bool,
    pub guild_enabled: bool,
    pub trade_enabled: bool,
    pub achievement_enabled: bool,
    pub quest_enabled: bool,
    pub combat_enabled: bool,
    pub message_enabled: bool,
    pub system_enabled: bool,
    /// 有序的首选投递渠道
    pub preferred_channels: Vec<DeliveryChannel>,
    pub updated_at: DateTime<Utc>,
}

impl NotificationPreferences {
    /// 未配置过偏好时的默认值：全部开启，只走游戏内投递
    pub fn default_for(account_id: Uuid) -> Self {
        Self {
            account_id,
            friend_enabled: true,
            guild_enabled: true,
            trade_enabled: true,
            achievement_enabled: true,
            quest_enabled: true,
            combat_enabled: true,
            message_enabled: true,
            system_enabled: true,
            preferred_channels: vec![DeliveryChannel::InGame],
            updated_at: Utc::now(),
        }
    }

    pub fn is_enabled(&self, kind: NotificationType) -> bool {
        match kind {
            NotificationType::Friend => self.friend_enabled,
            NotificationType::Guild => self.guild_enabled,
            NotificationType::Trade => self.trade_enabled,
            NotificationType::Achievement => self.achievement_enabled,
            NotificationType::Quest => self.quest_enabled,
            NotificationType::Combat => self.combat_enabled,
            NotificationType::Message => self.message_enabled,
            NotificationType::System => self.system_enabled,
        }
    }

    /// 计算投递渠道：总是包含游戏内；高优先级强制追加 websocket
    pub fn resolve_channels(&self, priority: NotificationPriority) -> Vec<DeliveryChannel> {
        let mut channels = vec![DeliveryChannel::InGame];
        for channel in &self.preferred_channels {
            if !channels.contains(channel) {
                channels.push(*channel);
            }
        }
        if priority.requires_realtime() && !channels.contains(&DeliveryChannel::WebSocket) {
            channels.push(DeliveryChannel::WebSocket);
        }
        channels
    }
}
