//! 禁言模型

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 聊天频道类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelType {
    Global,
    Local,
    Guild,
    Party,
    Trade,
    Whisper,
    System,
}

impl ChannelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelType::Global => "global",
            ChannelType::Local => "local",
            ChannelType::Guild => "guild",
            ChannelType::Party => "party",
            ChannelType::Trade => "trade",
            ChannelType::Whisper => "whisper",
            ChannelType::System => "system",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "global" => Some(ChannelType::Global),
            "local" => Some(ChannelType::Local),
            "guild" => Some(ChannelType::Guild),
            "party" => Some(ChannelType::Party),
            "trade" => Some(ChannelType::Trade),
            "whisper" => Some(ChannelType::Whisper),
            "system" => Some(ChannelType::System),
            _ => None,
        }
    }
}

/// 禁言作用域：具体频道；全局禁言用 `None` 表示
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BanScope {
    pub channel_id: Uuid,
    pub channel_type: ChannelType,
}

impl BanScope {
    pub fn channel(channel_id: Uuid, channel_type: ChannelType) -> Self {
        Self {
            channel_id,
            channel_type,
        }
    }
}

/// 禁言记录（对应 social_chat_bans 表）
///
/// `channel_id == None` 表示全局禁言。频道禁言与全局禁言互不继承。
/// 表是追加写：解除禁言只把 `is_active` 置为 false，不删除行。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ban {
    pub id: Uuid,
    pub character_id: Uuid,
    pub channel_id: Option<Uuid>,
    pub channel_type: Option<ChannelType>,
    pub reason: String,
    pub admin_id: Option<Uuid>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
}

impl Ban {
    /// 创建一条生效中的禁言，`duration` 为空表示永久
    pub fn new(
        character_id: Uuid,
        channel_id: Option<Uuid>,
        channel_type: Option<ChannelType>,
        reason: impl Into<String>,
        admin_id: Option<Uuid>,
        duration: Option<Duration>,
    ) -> Self {
        let created_at = Utc::now();
        Self {
            id: Uuid::new_v4(),
            character_id,
            channel_id,
            channel_type,
            reason: reason.into(),
            admin_id,
            expires_at: duration.map(|d| created_at + d),
            created_at,
            is_active: true,
        }
    }

    /// 在给定作用域上创建禁言
    pub fn scoped(
        character_id: Uuid,
        scope: Option<BanScope>,
        reason: impl Into<String>,
        admin_id: Option<Uuid>,
        duration: Option<Duration>,
    ) -> Self {
        Self::new(
            character_id,
            scope.map(|s| s.channel_id),
            scope.map(|s| s.channel_type),
            reason,
            admin_id,
            duration,
        )
    }

    /// 是否在 `now` 时刻生效（激活且未过期）
    pub fn is_effective_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at.map_or(true, |exp| exp > now)
    }

    /// 是否作用于给定作用域（精确匹配，不做全局/频道继承）
    pub fn matches_scope(&self, channel_id: Option<Uuid>) -> bool {
        self.channel_id == channel_id
    }
}

/// 管理员创建禁言请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBanRequest {
    pub character_id: Uuid,
    pub channel_id: Option<Uuid>,
    pub channel_type: Option<ChannelType>,
    pub reason: String,
    /// 禁言时长（小时），为空或 <= 0 表示永久
    pub duration_hours: Option<i64>,
}

/// 禁言分页结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BanListResponse {
    pub bans: Vec<Ban>,
    pub total: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expired_ban_is_not_effective() {
        let mut ban = Ban::new(Uuid::new_v4(), None, None, "spam", None, Some(Duration::hours(1)));
        assert!(ban.is_effective_at(Utc::now()));
        assert!(!ban.is_effective_at(Utc::now() + Duration::hours(2)));

        ban.is_active = false;
        assert!(!ban.is_effective_at(Utc::now()));
    }

    #[test]
    fn test_permanent_ban_has_no_expiry() {
        let ban = Ban::new(Uuid::new_v4(), None, None, "abuse", None, None);
        assert!(ban.expires_at.is_none());
        assert!(ban.is_effective_at(Utc::now() + Duration::days(3650)));
    }

    #[test]
    fn test_scope_is_exact() {
        let channel = Uuid::new_v4();
        let global = Ban::new(Uuid::new_v4(), None, None, "x", None, None);
        let scoped = Ban::new(Uuid::new_v4(), Some(channel), Some(ChannelType::Guild), "x", None, None);

        assert!(global.matches_scope(None));
        assert!(!global.matches_scope(Some(channel)));
        assert!(scoped.matches_scope(Some(channel)));
        assert!(!scoped.matches_scope(None));
    }
}
