//! 聊天审核服务：禁言检查、内容过滤、刷屏检测、自动禁言、举报处理

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ModerationConfig;
use crate::domain::DomainEvent;
use crate::error::{Result, ServerError};
use crate::infra::metrics;
use crate::infra::{CounterStore, EventBus};
use crate::model::{
    Ban, BanListResponse, BanScope, CreateBanRequest, CreateReportRequest, Report,
    ReportListResponse, ReportStatus,
};
use crate::repository::{BanRepository, ReportRepository};
use crate::service::content_filter::{ContentFilter, FilterOutcome};

/// 自动禁言（刷屏）的原因
pub const SPAM_BAN_REASON: &str = "Automatic ban: spam detected";
/// 自动禁言（累计违规）的原因
pub const SEVERE_BAN_REASON: &str = "Automatic ban: repeated content violations";

const MAX_PAGE_SIZE: i64 = 100;

/// 一分钟刷屏计数 key
pub fn burst_key(actor: Uuid) -> String {
    format!("chat:spam:burst:{}", actor)
}

/// 重复内容计数 key（内容取 SHA-256，避免 key 过长）
pub fn duplicate_key(actor: Uuid, content: &str) -> String {
    format!("chat:spam:dup:{}:{:x}", actor, Sha256::digest(content.as_bytes()))
}

fn clamp_page(limit: i64, offset: i64) -> (i64, i64) {
    (limit.clamp(1, MAX_PAGE_SIZE), offset.max(0))
}

/// 聊天审核服务
///
/// 每次调用本身无状态：计数保存在 `CounterStore`，禁言和举报保存在仓库。
pub struct ModerationService {
    config: ModerationConfig,
    filter: ContentFilter,
    bans: Arc<dyn BanRepository>,
    reports: Arc<dyn ReportRepository>,
    counters: Arc<dyn CounterStore>,
    event_bus: EventBus,
}

impl ModerationService {
    pub fn new(
        config: ModerationConfig,
        bans: Arc<dyn BanRepository>,
        reports: Arc<dyn ReportRepository>,
        counters: Arc<dyn CounterStore>,
        event_bus: EventBus,
    ) -> Result<Self> {
        let filter = ContentFilter::new(&config)?;
        Ok(Self {
            config,
            filter,
            bans,
            reports,
            counters,
            event_bus,
        })
    }

    pub fn config(&self) -> &ModerationConfig {
        &self.config
    }

    pub fn counters(&self) -> &Arc<dyn CounterStore> {
        &self.counters
    }

    /// 查询 (角色, 作用域) 上生效的禁言
    ///
    /// 频道禁言和全局禁言互不继承：`channel_id == None` 只查全局禁言。
    pub async fn check_ban(&self, actor: Uuid, channel_id: Option<Uuid>) -> Result<Option<Ban>> {
        let ban = self.bans.find_active(actor, channel_id, Utc::now()).await?;
        if let Some(ban) = &ban {
            debug!(
                "[MODERATION] 角色 {} 在作用域 {:?} 上被禁言: ban_id={}",
                actor, channel_id, ban.id
            );
        }
        Ok(ban)
    }

    /// 过滤消息内容
    pub fn filter_message(&self, content: &str) -> FilterOutcome {
        metrics::record_message_checked();
        let outcome = self.filter.filter(content);
        if outcome.violation {
            metrics::record_violation();
        }
        outcome
    }

    /// 刷屏检测：一分钟条数 或 五分钟内重复内容，任一超限即为刷屏
    pub async fn detect_spam(&self, actor: Uuid, content: &str) -> Result<bool> {
        let burst = self
            .counters
            .incr_with_window(
                &burst_key(actor),
                Duration::from_secs(self.config.spam_burst_window_secs),
            )
            .await?;
        let duplicates = self
            .counters
            .incr_with_window(
                &duplicate_key(actor, content),
                Duration::from_secs(self.config.spam_duplicate_window_secs),
            )
            .await?;

        let is_spam =
            burst > self.config.spam_burst_limit || duplicates > self.config.spam_duplicate_limit;
        if is_spam {
            info!(
                "[MODERATION] 检测到刷屏: actor={}, burst={}, duplicates={}",
                actor, burst, duplicates
            );
        }
        Ok(is_spam)
    }

    /// 刷屏确认后自动禁言
    ///
    /// 只读取当前一分钟计数，不再自增；计数已过期或未超限时返回 `Ok(None)`。
    pub async fn auto_ban_if_spam(
        &self,
        actor: Uuid,
        scope: Option<BanScope>,
    ) -> Result<Option<Ban>> {
        if !self.config.auto_ban_enabled {
            return Ok(None);
        }
        let current = self.counters.get(&burst_key(actor)).await?.unwrap_or(0);
        if current <= self.config.spam_burst_limit {
            return Ok(None);
        }

        let ban = Ban::scoped(
            actor,
            scope,
            SPAM_BAN_REASON,
            None,
            Some(chrono::Duration::hours(self.config.spam_ban_hours)),
        );
        let ban = self.bans.create(&ban).await?;
        metrics::record_auto_ban("spam");
        warn!(
            "[MODERATION] 🚫 刷屏自动禁言: actor={}, ban_id={}, expires_at={:?}",
            actor, ban.id, ban.expires_at
        );

        self.event_bus
            .publish_event(DomainEvent::AutoBanSpam {
                ban: ban.clone(),
                timestamp: Utc::now(),
            })
            .await;
        Ok(Some(ban))
    }

    /// 累计违规达到阈值后自动禁言；违规次数由调用方累计后传入
    pub async fn auto_ban_if_severe_violation(
        &self,
        actor: Uuid,
        scope: Option<BanScope>,
        violation_count: i64,
    ) -> Result<Option<Ban>> {
        if !self.config.auto_ban_enabled
            || violation_count < self.config.severe_violation_threshold
        {
            return Ok(None);
        }

        let ban = Ban::scoped(
            actor,
            scope,
            SEVERE_BAN_REASON,
            None,
            Some(chrono::Duration::hours(self.config.severe_ban_hours)),
        );
        let ban = self.bans.create(&ban).await?;
        metrics::record_auto_ban("severe");
        warn!(
            "[MODERATION] 🚫 累计违规自动禁言: actor={}, violations={}, ban_id={}",
            actor, violation_count, ban.id
        );

        self.event_bus
            .publish_event(DomainEvent::AutoBanSevere {
                ban: ban.clone(),
                timestamp: Utc::now(),
            })
            .await;
        Ok(Some(ban))
    }

    /// 管理员创建禁言
    pub async fn create_ban(&self, admin_id: Uuid, request: CreateBanRequest) -> Result<Ban> {
        if request.reason.trim().is_empty() {
            return Err(ServerError::Validation("ban reason is required".to_string()));
        }
        if request.channel_id.is_some() != request.channel_type.is_some() {
            return Err(ServerError::Validation(
                "channel_id and channel_type must be given together".to_string(),
            ));
        }

        let duration = request
            .duration_hours
            .filter(|h| *h > 0)
            .map(chrono::Duration::hours);
        let ban = Ban::new(
            request.character_id,
            request.channel_id,
            request.channel_type,
            request.reason,
            Some(admin_id),
            duration,
        );
        let ban = self.bans.create(&ban).await?;
        info!(
            "[MODERATION] 创建禁言: ban_id={}, character_id={}, admin_id={}",
            ban.id, ban.character_id, admin_id
        );

        self.event_bus
            .publish_event(DomainEvent::BanCreated {
                ban: ban.clone(),
                timestamp: Utc::now(),
            })
            .await;
        Ok(ban)
    }

    /// 解除禁言（只置为失效，不删除记录）
    pub async fn remove_ban(&self, ban_id: Uuid) -> Result<Ban> {
        let ban = self
            .bans
            .deactivate(ban_id)
            .await?
            .ok_or_else(|| ServerError::NotFound(format!("ban {}", ban_id)))?;
        info!("[MODERATION] 解除禁言: ban_id={}", ban_id);

        self.event_bus
            .publish_event(DomainEvent::BanRemoved {
                ban: ban.clone(),
                timestamp: Utc::now(),
            })
            .await;
        Ok(ban)
    }

    pub async fn list_bans(
        &self,
        character_id: Option<Uuid>,
        limit: i64,
        offset: i64,
    ) -> Result<BanListResponse> {
        let (limit, offset) = clamp_page(limit, offset);
        let (bans, total) = self.bans.list(character_id, limit, offset).await?;
        Ok(BanListResponse { bans, total })
    }

    /// 提交举报
    pub async fn create_report(
        &self,
        reporter_id: Uuid,
        request: CreateReportRequest,
    ) -> Result<Report> {
        if request.reason.trim().is_empty() {
            return Err(ServerError::Validation("report reason is required".to_string()));
        }

        let report = self.reports.create(&Report::new(reporter_id, request)).await?;
        info!(
            "[MODERATION] 新举报: report_id={}, reporter_id={}, reported_id={}",
            report.id, report.reporter_id, report.reported_id
        );

        self.event_bus
            .publish_event(DomainEvent::ReportCreated {
                report: report.clone(),
                timestamp: Utc::now(),
            })
            .await;
        Ok(report)
    }

    pub async fn list_reports(
        &self,
        status: Option<ReportStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<ReportListResponse> {
        let (limit, offset) = clamp_page(limit, offset);
        let (reports, total) = self.reports.list(status, limit, offset).await?;
        Ok(ReportListResponse { reports, total })
    }

    /// 处理举报：pending -> resolved | rejected，只能发生一次
    pub async fn resolve_report(
        &self,
        report_id: Uuid,
        admin_id: Uuid,
        status: ReportStatus,
    ) -> Result<Report> {
        if !status.is_terminal() {
            return Err(ServerError::Validation(format!(
                "report can only be resolved or rejected, got `{}`",
                status.as_str()
            )));
        }

        let report = match self
            .reports
            .resolve(report_id, status, admin_id, Utc::now())
            .await?
        {
            Some(report) => report,
            None => {
                return match self.reports.find_by_id(report_id).await? {
                    None => Err(ServerError::NotFound(format!("report {}", report_id))),
                    Some(existing) => Err(ServerError::InvalidState(format!(
                        "report {} is already {}",
                        report_id,
                        existing.status.as_str()
                    ))),
                };
            }
        };
        info!(
            "[MODERATION] 举报已处理: report_id={}, status={}, admin_id={}",
            report.id,
            report.status.as_str(),
            admin_id
        );

        self.event_bus
            .publish_event(DomainEvent::ReportResolved {
                report: report.clone(),
                timestamp: Utc::now(),
            })
            .await;
        Ok(report)
    }
}
