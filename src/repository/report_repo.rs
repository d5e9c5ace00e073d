//! 举报仓库 - PostgreSQL 实现

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::ReportRepository;
use crate::error::{Result, ServerError};
use crate::model::{Report, ReportStatus};

#[derive(sqlx::FromRow)]
struct ReportRow {
    id: Uuid,
    reporter_id: Uuid,
    reported_id: Uuid,
    message_id: Option<Uuid>,
    channel_id: Option<Uuid>,
    reason: String,
    status: String,
    admin_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
}

impl TryFrom<ReportRow> for Report {
    type Error = ServerError;

    fn try_from(r: ReportRow) -> Result<Self> {
        let status = ReportStatus::parse(&r.status).ok_or_else(|| {
            ServerError::Database(format!("unknown report status `{}` for {}", r.status, r.id))
        })?;
        Ok(Report {
            id: r.id,
            reporter_id: r.reporter_id,
            reported_id: r.reported_id,
            message_id: r.message_id,
            channel_id: r.channel_id,
            reason: r.reason,
            status,
            admin_id: r.admin_id,
            created_at: r.created_at,
            resolved_at: r.resolved_at,
        })
    }
}

const REPORT_COLUMNS: &str =
    "id, reporter_id, reported_id, message_id, channel_id, reason, status, admin_id, created_at, resolved_at";

/// 举报仓库 (PostgreSQL 实现)
#[derive(Clone)]
pub struct PgReportRepository {
    pool: Arc<PgPool>,
}

impl PgReportRepository {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReportRepository for PgReportRepository {
    async fn create(&self, report: &Report) -> Result<Report> {
        sqlx::query(
            r#"
            INSERT INTO social_chat_reports
                (id, reporter_id, reported_id, message_id, channel_id, reason, status, admin_id, created_at, resolved_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(report.id)
        .bind(report.reporter_id)
        .bind(report.reported_id)
        .bind(report.message_id)
        .bind(report.channel_id)
        .bind(&report.reason)
        .bind(report.status.as_str())
        .bind(report.admin_id)
        .bind(report.created_at)
        .bind(report.resolved_at)
        .execute(self.pool.as_ref())
        .await
        .map_err(|e| ServerError::Database(format!("Failed to insert report: {}", e)))?;

        Ok(report.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Report>> {
        let row = sqlx::query_as::<_, ReportRow>(&format!(
            "SELECT {} FROM social_chat_reports WHERE id = $1",
            REPORT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await
        .map_err(|e| ServerError::Database(format!("Failed to query report: {}", e)))?;

        row.map(Report::try_from).transpose()
    }

    async fn list(
        &self,
        status: Option<ReportStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Report>, usize)> {
        let status = status.map(|s| s.as_str());

        let rows = sqlx::query_as::<_, ReportRow>(&format!(
            r#"
            SELECT {} FROM social_chat_reports
            WHERE ($1::text IS NULL OR status = $1)
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
            REPORT_COLUMNS
        ))
        .bind(status)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool.as_ref())
        .await
        .map_err(|e| ServerError::Database(format!("Failed to list reports: {}", e)))?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM social_chat_reports WHERE ($1::text IS NULL OR status = $1)",
        )
        .bind(status)
        .fetch_one(self.pool.as_ref())
        .await
        .map_err(|e| ServerError::Database(format!("Failed to count reports: {}", e)))?;

        let reports = rows
            .into_iter()
            .map(Report::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok((reports, total as usize))
    }

    async fn resolve(
        &self,
        id: Uuid,
        status: ReportStatus,
        admin_id: Uuid,
        resolved_at: DateTime<Utc>,
    ) -> Result<Option<Report>> {
        let row = sqlx::query_as::<_, ReportRow>(&format!(
            r#"
            UPDATE social_chat_reports
            SET status = $2, admin_id = $3, resolved_at = $4
            WHERE id = $1 AND status = 'pending'
            RETURNING {}
            "#,
            REPORT_COLUMNS
        ))
        .bind(id)
        .bind(status.as_str())
        .bind(admin_id)
        .bind(resolved_at)
        .fetch_optional(self.pool.as_ref())
        .await
        .map_err(|e| ServerError::Database(format!("Failed to resolve report: {}", e)))?;

        row.map(Report::try_from).transpose()
    }
}
