//! 公会仓库 - PostgreSQL 实现

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::GuildRepository;
use crate::error::{Result, ServerError};
use crate::model::{Guild, GuildMember, GuildStatus};

#[derive(sqlx::FromRow)]
struct GuildRow {
    id: Uuid,
    name: String,
    tag: String,
    leader_id: Uuid,
    level: i32,
    experience: i64,
    max_members: i32,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<GuildRow> for Guild {
    fn from(r: GuildRow) -> Self {
        Guild {
            id: r.id,
            name: r.name,
            tag: r.tag,
            leader_id: r.leader_id,
            level: r.level,
            experience: r.experience,
            max_members: r.max_members,
            status: GuildStatus::parse(&r.status).unwrap_or(GuildStatus::Active),
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct GuildMemberRow {
    guild_id: Uuid,
    character_id: Uuid,
    rank: String,
    joined_at: DateTime<Utc>,
}

const GUILD_COLUMNS: &str =
    "g.id, g.name, g.tag, g.leader_id, g.level, g.experience, g.max_members, g.status, g.created_at, g.updated_at";

/// 公会仓库 (PostgreSQL 实现)
#[derive(Clone)]
pub struct PgGuildRepository {
    pool: Arc<PgPool>,
}

impl PgGuildRepository {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GuildRepository for PgGuildRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Guild>> {
        let row = sqlx::query_as::<_, GuildRow>(&format!(
            "SELECT {} FROM social_guilds g WHERE g.id = $1",
            GUILD_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await
        .map_err(|e| ServerError::Database(format!("Failed to query guild: {}", e)))?;

        Ok(row.map(Guild::from))
    }

    async fn list_active(&self, limit: i64, offset: i64) -> Result<Vec<Guild>> {
        let rows = sqlx::query_as::<_, GuildRow>(&format!(
            r#"
            SELECT {} FROM social_guilds g
            WHERE g.status = 'active'
            ORDER BY g.created_at, g.id
            LIMIT $1 OFFSET $2
            "#,
            GUILD_COLUMNS
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool.as_ref())
        .await
        .map_err(|e| ServerError::Database(format!("Failed to list guilds: {}", e)))?;

        Ok(rows.into_iter().map(Guild::from).collect())
    }

    async fn get_member(&self, guild_id: Uuid, character_id: Uuid) -> Result<Option<GuildMember>> {
        let row = sqlx::query_as::<_, GuildMemberRow>(
            r#"
            SELECT guild_id, character_id, rank, joined_at
            FROM social_guild_members
            WHERE guild_id = $1 AND character_id = $2
            "#,
        )
        .bind(guild_id)
        .bind(character_id)
        .fetch_optional(self.pool.as_ref())
        .await
        .map_err(|e| ServerError::Database(format!("Failed to query guild member: {}", e)))?;

        Ok(row.map(|r| GuildMember {
            guild_id: r.guild_id,
            character_id: r.character_id,
            rank: r.rank,
            joined_at: r.joined_at,
        }))
    }

    async fn update_level(&self, guild_id: Uuid, level: i32, experience: i64) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE social_guilds
            SET level = $2, experience = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(guild_id)
        .bind(level)
        .bind(experience)
        .execute(self.pool.as_ref())
        .await
        .map_err(|e| ServerError::Database(format!("Failed to update guild level: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(ServerError::NotFound(format!("guild {}", guild_id)));
        }
        Ok(())
    }

    /// 走 social_guild_members(character_id) 索引，一次 join 查出公会
    async fn find_guild_by_member(&self, character_id: Uuid) -> Result<Option<Guild>> {
        let row = sqlx::query_as::<_, GuildRow>(&format!(
            r#"
            SELECT {} FROM social_guilds g
            JOIN social_guild_members m ON m.guild_id = g.id
            WHERE m.character_id = $1 AND g.status = 'active'
            LIMIT 1
            "#,
            GUILD_COLUMNS
        ))
        .bind(character_id)
        .fetch_optional(self.pool.as_ref())
        .await
        .map_err(|e| ServerError::Database(format!("Failed to find guild by member: {}", e)))?;

        Ok(row.map(Guild::from))
    }
}
