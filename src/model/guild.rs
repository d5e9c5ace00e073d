//! 公会模型与经验升级规则

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 公会状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuildStatus {
    Active,
    Disbanded,
}

impl GuildStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GuildStatus::Active => "active",
            GuildStatus::Disbanded => "disbanded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(GuildStatus::Active),
            "disbanded" => Some(GuildStatus::Disbanded),
            _ => None,
        }
    }
}

/// 公会（对应 social_guilds 表）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Guild {
    pub id: Uuid,
    pub name: String,
    pub tag: String,
    pub leader_id: Uuid,
    pub level: i32,
    pub experience: i64,
    pub max_members: i32,
    pub status: GuildStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Guild {
    pub fn new(name: impl Into<String>, tag: impl Into<String>, leader_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            tag: tag.into(),
            leader_id,
            level: 1,
            experience: 0,
            max_members: 50,
            status: GuildStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }
}

/// 公会成员（对应 social_guild_members 表）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuildMember {
    pub guild_id: Uuid,
    pub character_id: Uuid,
    pub rank: String,
    pub joined_at: DateTime<Utc>,
}

/// 一次经验变更的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progression {
    pub old_level: i32,
    pub new_level: i32,
    pub experience: i64,
}

impl Progression {
    pub fn leveled_up(&self) -> bool {
        self.new_level > self.old_level
    }
}

/// 离开 `level` 级需要的经验
pub fn level_threshold(level: i32, experience_per_level: i64) -> i64 {
    i64::from(level.max(1)) * experience_per_level
}

/// 给公会加经验；每次最多升一级，溢出部分留作新等级的经验
pub fn apply_experience(
    level: i32,
    experience: i64,
    gain: i64,
    experience_per_level: i64,
) -> Progression {
    let total = experience + gain;
    let threshold = level_threshold(level, experience_per_level);

    if threshold > 0 && total >= threshold {
        Progression {
            old_level: level,
            new_level: level + 1,
            experience: total - threshold,
        }
    } else {
        Progression {
            old_level: level,
            new_level: level,
            experience: total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_up_carries_overflow() {
        let p = apply_experience(1, 950, 100, 1000);
        assert!(p.leveled_up());
        assert_eq!(p.new_level, 2);
        assert_eq!(p.experience, 50);
    }

    #[test]
    fn test_no_level_up_below_threshold() {
        let p = apply_experience(2, 1000, 50, 1000);
        assert!(!p.leveled_up());
        assert_eq!(p.new_level, 2);
        assert_eq!(p.experience, 1050);
    }

    #[test]
    fn test_exact_threshold_levels_up() {
        let p = apply_experience(1, 990, 10, 1000);
        assert_eq!(p.new_level, 2);
        assert_eq!(p.experience, 0);
    }

    #[test]
    fn test_single_step_only() {
        let p = apply_experience(1, 0, 5000, 1000);
        assert_eq!(p.new_level, 2);
        assert_eq!(p.experience, 4000);
    }
}
