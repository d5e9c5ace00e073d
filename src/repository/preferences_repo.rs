//! 通知偏好仓库 - PostgreSQL 实现

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::NotificationPreferencesRepository;
use crate::error::{Result, ServerError};
use crate::model::{DeliveryChannel, NotificationPreferences};

#[derive(sqlx::FromRow)]
struct PreferencesRow {
    account_id: Uuid,
    friend_enabled: bool,
    guild_enabled: bool,
    trade_enabled: bool,
    achievement_enabled: bool,
    quest_enabled: bool,
    combat_enabled: bool,
    message_enabled: bool,
    system_enabled: bool,
    preferred_channels: Vec<String>,
    updated_at: DateTime<Utc>,
}

impl From<PreferencesRow> for NotificationPreferences {
    fn from(r: PreferencesRow) -> Self {
        NotificationPreferences {
            account_id: r.account_id,
            friend_enabled: r.friend_enabled,
            guild_enabled: r.guild_enabled,
            trade_enabled: r.trade_enabled,
            achievement_enabled: r.achievement_enabled,
            quest_enabled: r.quest_enabled,
            combat_enabled: r.combat_enabled,
            message_enabled: r.message_enabled,
            system_enabled: r.system_enabled,
            preferred_channels: r
                .preferred_channels
                .iter()
                .filter_map(|c| DeliveryChannel::parse(c))
                .collect(),
            updated_at: r.updated_at,
        }
    }
}

/// 通知偏好仓库 (PostgreSQL 实现)
#[derive(Clone)]
pub struct PgNotificationPreferencesRepository {
    pool: Arc<PgPool>,
}

impl PgNotificationPreferencesRepository {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationPreferencesRepository for PgNotificationPreferencesRepository {
    async fn get(&self, account_id: Uuid) -> Result<Option<NotificationPreferences>> {
        let row = sqlx::query_as::<_, PreferencesRow>(
            r#"
            SELECT account_id, friend_enabled, guild_enabled, trade_enabled, achievement_enabled,
                   quest_enabled, combat_enabled, message_enabled, system_enabled,
                   preferred_channels, updated_at
            FROM social_notification_preferences
            WHERE account_id = $1
            "#,
        )
        .bind(account_id)
        .fetch_optional(self.pool.as_ref())
        .await
        .map_err(|e| {
            ServerError::Database(format!("Failed to query notification preferences: {}", e))
        })?;

        Ok(row.map(NotificationPreferences::from))
    }

    async fn upsert(&self, preferences: &NotificationPreferences) -> Result<NotificationPreferences> {
        let channels: Vec<&str> = preferences
            .preferred_channels
            .iter()
            .map(|c| c.as_str())
            .collect();

        let row = sqlx::query_as::<_, PreferencesRow>(
            r#"
            INSERT INTO social_notification_preferences
                (account_id, friend_enabled, guild_enabled, trade_enabled, achievement_enabled,
                 quest_enabled, combat_enabled, message_enabled, system_enabled,
                 preferred_channels, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (account_id) DO UPDATE SET
                friend_enabled = EXCLUDED.friend_enabled,
                guild_enabled = EXCLUDED.guild_enabled,
                trade_enabled = EXCLUDED.trade_enabled,
                achievement_enabled = EXCLUDED.achievement_enabled,
                quest_enabled = EXCLUDED.quest_enabled,
                combat_enabled = EXCLUDED.combat_enabled,
                message_enabled = EXCLUDED.message_enabled,
                system_enabled = EXCLUDED.system_enabled,
                preferred_channels = EXCLUDED.preferred_channels,
                updated_at = EXCLUDED.updated_at
            RETURNING account_id, friend_enabled, guild_enabled, trade_enabled, achievement_enabled,
                      quest_enabled, combat_enabled, message_enabled, system_enabled,
                      preferred_channels, updated_at
            "#,
        )
        .bind(preferences.account_id)
        .bind(preferences.friend_enabled)
        .bind(preferences.guild_enabled)
        .bind(preferences.trade_enabled)
        .bind(preferences.achievement_enabled)
        .bind(preferences.quest_enabled)
        .bind(preferences.combat_enabled)
        .bind(preferences.message_enabled)
        .bind(preferences.system_enabled)
        .bind(&channels)
        .bind(preferences.updated_at)
        .fetch_one(self.pool.as_ref())
        .await
        .map_err(|e| {
            ServerError::Database(format!("Failed to upsert notification preferences: {}", e))
        })?;

        Ok(row.into())
    }
}
