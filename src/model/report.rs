//! 举报模型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 举报状态：pending -> resolved | rejected（终态，只能转换一次）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Pending,
    Resolved,
    Rejected,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::Resolved => "resolved",
            ReportStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ReportStatus::Pending),
            "resolved" => Some(ReportStatus::Resolved),
            "rejected" => Some(ReportStatus::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReportStatus::Pending)
    }
}

/// 聊天举报（对应 social_chat_reports 表）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: Uuid,
    pub reporter_id: Uuid,
    pub reported_id: Uuid,
    pub message_id: Option<Uuid>,
    pub channel_id: Option<Uuid>,
    pub reason: String,
    pub status: ReportStatus,
    pub admin_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Report {
    pub fn new(reporter_id: Uuid, request: CreateReportRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            reporter_id,
            reported_id: request.reported_id,
            message_id: request.message_id,
            channel_id: request.channel_id,
            reason: request.reason,
            status: ReportStatus::Pending,
            admin_id: None,
            created_at: Utc::now(),
            resolved_at: None,
        }
    }
}

/// 创建举报请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateReportRequest {
    pub reported_id: Uuid,
    pub message_id: Option<Uuid>,
    pub channel_id: Option<Uuid>,
    pub reason: String,
}

/// 举报分页结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportListResponse {
    pub reports: Vec<Report>,
    pub total: usize,
}
