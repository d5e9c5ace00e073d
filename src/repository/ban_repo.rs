//! 禁言仓库 - PostgreSQL 实现

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::BanRepository;
use crate::error::{Result, ServerError};
use crate::model::{Ban, ChannelType};

#[derive(sqlx::FromRow)]
struct BanRow {
    id: Uuid,
    character_id: Uuid,
    channel_id: Option<Uuid>,
    channel_type: Option<String>,
    reason: String,
    admin_id: Option<Uuid>,
    expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    is_active: bool,
}

impl From<BanRow> for Ban {
    fn from(r: BanRow) -> Self {
        Ban {
            id: r.id,
            character_id: r.character_id,
            channel_id: r.channel_id,
            channel_type: r.channel_type.as_deref().and_then(ChannelType::parse),
            reason: r.reason,
            admin_id: r.admin_id,
            expires_at: r.expires_at,
            created_at: r.created_at,
            is_active: r.is_active,
        }
    }
}

const BAN_COLUMNS: &str =
    "id, character_id, channel_id, channel_type, reason, admin_id, expires_at, created_at, is_active";

/// 禁言仓库 (PostgreSQL 实现)
#[derive(Clone)]
pub struct PgBanRepository {
    pool: Arc<PgPool>,
}

impl PgBanRepository {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BanRepository for PgBanRepository {
    async fn create(&self, ban: &Ban) -> Result<Ban> {
        sqlx::query(
            r#"
            INSERT INTO social_chat_bans
                (id, character_id, channel_id, channel_type, reason, admin_id, expires_at, created_at, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(ban.id)
        .bind(ban.character_id)
        .bind(ban.channel_id)
        .bind(ban.channel_type.map(|t| t.as_str()))
        .bind(&ban.reason)
        .bind(ban.admin_id)
        .bind(ban.expires_at)
        .bind(ban.created_at)
        .bind(ban.is_active)
        .execute(self.pool.as_ref())
        .await
        .map_err(|e| ServerError::Database(format!("Failed to insert ban: {}", e)))?;

        Ok(ban.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Ban>> {
        let row = sqlx::query_as::<_, BanRow>(&format!(
            "SELECT {} FROM social_chat_bans WHERE id = $1",
            BAN_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await
        .map_err(|e| ServerError::Database(format!("Failed to query ban: {}", e)))?;

        Ok(row.map(Ban::from))
    }

    async fn find_active(
        &self,
        character_id: Uuid,
        channel_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<Option<Ban>> {
        // channel_id 为 NULL 时必须用 IS NOT DISTINCT FROM 才能精确匹配全局禁言
        let row = sqlx::query_as::<_, BanRow>(&format!(
            r#"
            SELECT {} FROM social_chat_bans
            WHERE character_id = $1
              AND channel_id IS NOT DISTINCT FROM $2
              AND is_active = TRUE
              AND (expires_at IS NULL OR expires_at > $3)
            ORDER BY created_at DESC
            LIMIT 1
            "#,
            BAN_COLUMNS
        ))
        .bind(character_id)
        .bind(channel_id)
        .bind(now)
        .fetch_optional(self.pool.as_ref())
        .await
        .map_err(|e| ServerError::Database(format!("Failed to query active ban: {}", e)))?;

        Ok(row.map(Ban::from))
    }

    async fn deactivate(&self, id: Uuid) -> Result<Option<Ban>> {
        let row = sqlx::query_as::<_, BanRow>(&format!(
            "UPDATE social_chat_bans SET is_active = FALSE WHERE id = $1 RETURNING {}",
            BAN_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await
        .map_err(|e| ServerError::Database(format!("Failed to deactivate ban: {}", e)))?;

        Ok(row.map(Ban::from))
    }

    async fn list(
        &self,
        character_id: Option<Uuid>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Ban>, usize)> {
        let rows = sqlx::query_as::<_, BanRow>(&format!(
            r#"
            SELECT {} FROM social_chat_bans
            WHERE ($1::uuid IS NULL OR character_id = $1)
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
            BAN_COLUMNS
        ))
        .bind(character_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool.as_ref())
        .await
        .map_err(|e| ServerError::Database(format!("Failed to list bans: {}", e)))?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM social_chat_bans WHERE ($1::uuid IS NULL OR character_id = $1)",
        )
        .bind(character_id)
        .fetch_one(self.pool.as_ref())
        .await
        .map_err(|e| ServerError::Database(format!("Failed to count bans: {}", e)))?;

        Ok((rows.into_iter().map(Ban::from).collect(), total as usize))
    }
}
