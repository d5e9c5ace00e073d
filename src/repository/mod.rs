//! 仓库层：审核、通知、通知偏好、公会
//!
//! 业务组件只依赖这里的 trait；PostgreSQL 实现在各 `*_repo` 模块，
//! 进程内实现在 `memory` 模块。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::model::{
    Ban, Guild, GuildMember, Notification, NotificationPreferences, NotificationStatus, Report,
    ReportStatus,
};

/// 禁言仓库
#[async_trait]
pub trait BanRepository: Send + Sync {
    async fn create(&self, ban: &Ban) -> Result<Ban>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Ban>>;

    /// 查找 (角色, 作用域) 上在 `now` 时刻生效的禁言；作用域精确匹配
    async fn find_active(
        &self,
        character_id: Uuid,
        channel_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<Option<Ban>>;

    /// 置为失效；禁言不存在时返回 `None`
    async fn deactivate(&self, id: Uuid) -> Result<Option<Ban>>;

    /// 分页列出禁言（按创建时间倒序），返回 (本页, 总数)
    async fn list(
        &self,
        character_id: Option<Uuid>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Ban>, usize)>;
}

/// 举报仓库
#[async_trait]
pub trait ReportRepository: Send + Sync {
    async fn create(&self, report: &Report) -> Result<Report>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Report>>;

    async fn list(
        &self,
        status: Option<ReportStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Report>, usize)>;

    /// 仅当举报仍为 pending 时写入终态；否则返回 `None`
    async fn resolve(
        &self,
        id: Uuid,
        status: ReportStatus,
        admin_id: Uuid,
        resolved_at: DateTime<Utc>,
    ) -> Result<Option<Report>>;
}

/// 通知仓库
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn create(&self, notification: &Notification) -> Result<Notification>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Notification>>;

    /// 分页列出未过期通知，返回 (本页, 总数, 未读数)
    async fn list_by_account(
        &self,
        account_id: Uuid,
        limit: i64,
        offset: i64,
        now: DateTime<Utc>,
    ) -> Result<(Vec<Notification>, usize, usize)>;

    async fn update_status(
        &self,
        id: Uuid,
        status: NotificationStatus,
    ) -> Result<Option<Notification>>;
}

/// 通知偏好仓库
#[async_trait]
pub trait NotificationPreferencesRepository: Send + Sync {
    async fn get(&self, account_id: Uuid) -> Result<Option<NotificationPreferences>>;

    async fn upsert(&self, preferences: &NotificationPreferences) -> Result<NotificationPreferences>;
}

/// 按成员查找公会时每页扫描的公会数
pub const GUILD_SCAN_PAGE_SIZE: i64 = 100;

/// 公会仓库
#[async_trait]
pub trait GuildRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Guild>>;

    /// 分页列出活跃公会（按创建时间）
    async fn list_active(&self, limit: i64, offset: i64) -> Result<Vec<Guild>>;

    async fn get_member(&self, guild_id: Uuid, character_id: Uuid) -> Result<Option<GuildMember>>;

    async fn update_level(&self, guild_id: Uuid, level: i32, experience: i64) -> Result<()>;

    /// 查找角色所在的公会
    ///
    /// 默认实现逐页扫描活跃公会并检查成员关系，只适合公会数量很少的场景；
    /// 有成员索引的实现应当覆盖它。
    async fn find_guild_by_member(&self, character_id: Uuid) -> Result<Option<Guild>> {
        let mut offset = 0;
        loop {
            let page = self.list_active(GUILD_SCAN_PAGE_SIZE, offset).await?;
            if page.is_empty() {
                return Ok(None);
            }
            let fetched = page.len() as i64;
            for guild in page {
                if self.get_member(guild.id, character_id).await?.is_some() {
                    return Ok(Some(guild));
                }
            }
            if fetched < GUILD_SCAN_PAGE_SIZE {
                return Ok(None);
            }
            offset += fetched;
        }
    }
}

pub mod ban_repo;
pub mod guild_repo;
pub mod memory;
pub mod notification_repo;
pub mod preferences_repo;
pub mod report_repo;

// 重新导出 PostgreSQL Repository 实现
pub use ban_repo::PgBanRepository;
pub use guild_repo::PgGuildRepository;
pub use notification_repo::PgNotificationRepository;
pub use preferences_repo::PgNotificationPreferencesRepository;
pub use report_repo::PgReportRepository;
