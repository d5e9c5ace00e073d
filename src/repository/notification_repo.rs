//! 通知仓库 - PostgreSQL 实现

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::NotificationRepository;
use crate::error::{Result, ServerError};
use crate::model::{
    DeliveryChannel, Notification, NotificationPriority, NotificationStatus, NotificationType,
};

#[derive(sqlx::FromRow)]
struct NotificationRow {
    id: Uuid,
    account_id: Uuid,
    kind: String,
    priority: String,
    title: String,
    content: String,
    data: serde_json::Value,
    status: String,
    channels: Vec<String>,
    created_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = ServerError;

    fn try_from(r: NotificationRow) -> Result<Self> {
        let invalid = |field: &str, value: &str| {
            ServerError::Database(format!(
                "unknown notification {} `{}` for {}",
                field, value, r.id
            ))
        };
        let kind = NotificationType::parse(&r.kind).ok_or_else(|| invalid("type", &r.kind))?;
        let priority =
            NotificationPriority::parse(&r.priority).ok_or_else(|| invalid("priority", &r.priority))?;
        let status =
            NotificationStatus::parse(&r.status).ok_or_else(|| invalid("status", &r.status))?;
        let data = match r.data {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        // 未知渠道直接跳过，不让整条通知读不出来
        let channels = r
            .channels
            .iter()
            .filter_map(|c| DeliveryChannel::parse(c))
            .collect();

        Ok(Notification {
            id: r.id,
            account_id: r.account_id,
            kind,
            priority,
            title: r.title,
            content: r.content,
            data,
            status,
            channels,
            created_at: r.created_at,
            expires_at: r.expires_at,
        })
    }
}

const NOTIFICATION_COLUMNS: &str = "id, account_id, type AS kind, priority, title, content, data, status, channels, created_at, expires_at";

/// 通知仓库 (PostgreSQL 实现)
#[derive(Clone)]
pub struct PgNotificationRepository {
    pool: Arc<PgPool>,
}

impl PgNotificationRepository {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationRepository for PgNotificationRepository {
    async fn create(&self, notification: &Notification) -> Result<Notification> {
        let channels: Vec<&str> = notification.channels.iter().map(|c| c.as_str()).collect();

        sqlx::query(
            r#"
            INSERT INTO social_notifications
                (id, account_id, type, priority, title, content, data, status, channels, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(notification.id)
        .bind(notification.account_id)
        .bind(notification.kind.as_str())
        .bind(notification.priority.as_str())
        .bind(&notification.title)
        .bind(&notification.content)
        .bind(serde_json::Value::Object(notification.data.clone()))
        .bind(notification.status.as_str())
        .bind(&channels)
        .bind(notification.created_at)
        .bind(notification.expires_at)
        .execute(self.pool.as_ref())
        .await
        .map_err(|e| ServerError::Database(format!("Failed to insert notification: {}", e)))?;

        Ok(notification.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Notification>> {
        let row = sqlx::query_as::<_, NotificationRow>(&format!(
            "SELECT {} FROM social_notifications WHERE id = $1",
            NOTIFICATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await
        .map_err(|e| ServerError::Database(format!("Failed to query notification: {}", e)))?;

        row.map(Notification::try_from).transpose()
    }

    async fn list_by_account(
        &self,
        account_id: Uuid,
        limit: i64,
        offset: i64,
        now: DateTime<Utc>,
    ) -> Result<(Vec<Notification>, usize, usize)> {
        let rows = sqlx::query_as::<_, NotificationRow>(&format!(
            r#"
            SELECT {} FROM social_notifications
            WHERE account_id = $1 AND (expires_at IS NULL OR expires_at > $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#,
            NOTIFICATION_COLUMNS
        ))
        .bind(account_id)
        .bind(now)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool.as_ref())
        .await
        .map_err(|e| ServerError::Database(format!("Failed to list notifications: {}", e)))?;

        let (total, unread): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*), COUNT(*) FILTER (WHERE status = 'unread')
            FROM social_notifications
            WHERE account_id = $1 AND (expires_at IS NULL OR expires_at > $2)
            "#,
        )
        .bind(account_id)
        .bind(now)
        .fetch_one(self.pool.as_ref())
        .await
        .map_err(|e| ServerError::Database(format!("Failed to count notifications: {}", e)))?;

        let notifications = rows
            .into_iter()
            .map(Notification::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok((notifications, total as usize, unread as usize))
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: NotificationStatus,
    ) -> Result<Option<Notification>> {
        let row = sqlx::query_as::<_, NotificationRow>(&format!(
            "UPDATE social_notifications SET status = $2 WHERE id = $1 RETURNING {}",
            NOTIFICATION_COLUMNS
        ))
        .bind(id)
        .bind(status.as_str())
        .fetch_optional(self.pool.as_ref())
        .await
        .map_err(|e| ServerError::Database(format!("Failed to update notification: {}", e)))?;

        row.map(Notification::try_from).transpose()
    }
}
