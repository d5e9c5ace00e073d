//! 进程内仓库实现（测试与开发模式）

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    BanRepository, GuildRepository, NotificationPreferencesRepository, NotificationRepository,
    ReportRepository,
};
use crate::error::{Result, ServerError};
use crate::model::{
    Ban, Guild, GuildMember, GuildStatus, Notification, NotificationPreferences,
    NotificationStatus, Report, ReportStatus,
};

fn page<T: Clone>(items: &[T], limit: i64, offset: i64) -> Vec<T> {
    items
        .iter()
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .cloned()
        .collect()
}

/// 禁言仓库（内存实现）
#[derive(Clone, Default)]
pub struct MemoryBanRepository {
    bans: Arc<RwLock<HashMap<Uuid, Ban>>>,
}

impl MemoryBanRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<Ban> {
        self.bans.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl BanRepository for MemoryBanRepository {
    async fn create(&self, ban: &Ban) -> Result<Ban> {
        self.bans.write().await.insert(ban.id, ban.clone());
        Ok(ban.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Ban>> {
        Ok(self.bans.read().await.get(&id).cloned())
    }

    async fn find_active(
        &self,
        character_id: Uuid,
        channel_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<Option<Ban>> {
        Ok(self
            .bans
            .read()
            .await
            .values()
            .filter(|b| {
                b.character_id == character_id && b.matches_scope(channel_id) && b.is_effective_at(now)
            })
            .max_by_key(|b| b.created_at)
            .cloned())
    }

    async fn deactivate(&self, id: Uuid) -> Result<Option<Ban>> {
        let mut bans = self.bans.write().await;
        Ok(bans.get_mut(&id).map(|ban| {
            ban.is_active = false;
            ban.clone()
        }))
    }

    async fn list(
        &self,
        character_id: Option<Uuid>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Ban>, usize)> {
        let mut bans: Vec<Ban> = self
            .bans
            .read()
            .await
            .values()
            .filter(|b| character_id.map_or(true, |id| b.character_id == id))
            .cloned()
            .collect();
        bans.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok((page(&bans, limit, offset), bans.len()))
    }
}

/// 举报仓库（内存实现）
#[derive(Clone, Default)]
pub struct MemoryReportRepository {
    reports: Arc<RwLock<HashMap<Uuid, Report>>>,
}

impl MemoryReportRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReportRepository for MemoryReportRepository {
    async fn create(&self, report: &Report) -> Result<Report> {
        self.reports.write().await.insert(report.id, report.clone());
        Ok(report.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Report>> {
        Ok(self.reports.read().await.get(&id).cloned())
    }

    async fn list(
        &self,
        status: Option<ReportStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Report>, usize)> {
        let mut reports: Vec<Report> = self
            .reports
            .read()
            .await
            .values()
            .filter(|r| status.map_or(true, |s| r.status == s))
            .cloned()
            .collect();
        reports.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok((page(&reports, limit, offset), reports.len()))
    }

    async fn resolve(
        &self,
        id: Uuid,
        status: ReportStatus,
        admin_id: Uuid,
        resolved_at: DateTime<Utc>,
    ) -> Result<Option<Report>> {
        let mut reports = self.reports.write().await;
        match reports.get_mut(&id) {
            Some(report) if report.status == ReportStatus::Pending => {
                report.status = status;
                report.admin_id = Some(admin_id);
                report.resolved_at = Some(resolved_at);
                Ok(Some(report.clone()))
            }
            _ => Ok(None),
        }
    }
}

/// 通知仓库（内存实现）
#[derive(Clone, Default)]
pub struct MemoryNotificationRepository {
    notifications: Arc<RwLock<HashMap<Uuid, Notification>>>,
}

impl MemoryNotificationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已持久化的通知数
    pub async fn len(&self) -> usize {
        self.notifications.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.notifications.read().await.is_empty()
    }

    pub async fn all(&self) -> Vec<Notification> {
        self.notifications.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl NotificationRepository for MemoryNotificationRepository {
    async fn create(&self, notification: &Notification) -> Result<Notification> {
        self.notifications
            .write()
            .await
            .insert(notification.id, notification.clone());
        Ok(notification.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Notification>> {
        Ok(self.notifications.read().await.get(&id).cloned())
    }

    async fn list_by_account(
        &self,
        account_id: Uuid,
        limit: i64,
        offset: i64,
        now: DateTime<Utc>,
    ) -> Result<(Vec<Notification>, usize, usize)> {
        let mut items: Vec<Notification> = self
            .notifications
            .read()
            .await
            .values()
            .filter(|n| n.account_id == account_id && !n.is_expired_at(now))
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let unread = items
            .iter()
            .filter(|n| n.status == NotificationStatus::Unread)
            .count();
        Ok((page(&items, limit, offset), items.len(), unread))
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: NotificationStatus,
    ) -> Result<Option<Notification>> {
        let mut notifications = self.notifications.write().await;
        Ok(notifications.get_mut(&id).map(|n| {
            n.status = status;
            n.clone()
        }))
    }
}

/// 通知偏好仓库（内存实现）
#[derive(Clone, Default)]
pub struct MemoryNotificationPreferencesRepository {
    preferences: Arc<RwLock<HashMap<Uuid, NotificationPreferences>>>,
}

impl MemoryNotificationPreferencesRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationPreferencesRepository for MemoryNotificationPreferencesRepository {
    async fn get(&self, account_id: Uuid) -> Result<Option<NotificationPreferences>> {
        Ok(self.preferences.read().await.get(&account_id).cloned())
    }

    async fn upsert(&self, preferences: &NotificationPreferences) -> Result<NotificationPreferences> {
        self.preferences
            .write()
            .await
            .insert(preferences.account_id, preferences.clone());
        Ok(preferences.clone())
    }
}

/// 公会仓库（内存实现）
///
/// 不覆盖 `find_guild_by_member`，走默认的逐页扫描。
#[derive(Clone, Default)]
pub struct MemoryGuildRepository {
    guilds: Arc<RwLock<HashMap<Uuid, Guild>>>,
    members: Arc<RwLock<HashMap<(Uuid, Uuid), GuildMember>>>,
}

impl MemoryGuildRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_guild(&self, guild: Guild) -> Guild {
        self.guilds.write().await.insert(guild.id, guild.clone());
        guild
    }

    pub async fn add_member(&self, guild_id: Uuid, character_id: Uuid) -> GuildMember {
        let member = GuildMember {
            guild_id,
            character_id,
            rank: "member".to_string(),
            joined_at: Utc::now(),
        };
        self.members
            .write()
            .await
            .insert((guild_id, character_id), member.clone());
        member
    }
}

#[async_trait]
impl GuildRepository for MemoryGuildRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Guild>> {
        Ok(self.guilds.read().await.get(&id).cloned())
    }

    async fn list_active(&self, limit: i64, offset: i64) -> Result<Vec<Guild>> {
        let mut guilds: Vec<Guild> = self
            .guilds
            .read()
            .await
            .values()
            .filter(|g| g.status == GuildStatus::Active)
            .cloned()
            .collect();
        guilds.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(page(&guilds, limit, offset))
    }

    async fn get_member(&self, guild_id: Uuid, character_id: Uuid) -> Result<Option<GuildMember>> {
        Ok(self
            .members
            .read()
            .await
            .get(&(guild_id, character_id))
            .cloned())
    }

    async fn update_level(&self, guild_id: Uuid, level: i32, experience: i64) -> Result<()> {
        let mut guilds = self.guilds.write().await;
        let guild = guilds
            .get_mut(&guild_id)
            .ok_or_else(|| ServerError::NotFound(format!("guild {}", guild_id)))?;
        guild.level = level;
        guild.experience = experience;
        guild.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ChannelType;

    #[tokio::test]
    async fn test_find_guild_by_member_scans_pages() {
        let repo = MemoryGuildRepository::new();
        let character = Uuid::new_v4();
        let mut target = None;
        for i in 0..(crate::repository::GUILD_SCAN_PAGE_SIZE + 5) {
            let guild = repo
                .insert_guild(Guild::new(format!("guild-{}", i), "TAG", Uuid::new_v4()))
                .await;
            target = Some(guild.id);
        }
        let target = target.unwrap();
        repo.add_member(target, character).await;

        let found = repo.find_guild_by_member(character).await.unwrap();
        assert_eq!(found.map(|g| g.id), Some(target));
        assert!(repo
            .find_guild_by_member(Uuid::new_v4())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_find_active_ban_is_scope_exact() {
        let repo = MemoryBanRepository::new();
        let character = Uuid::new_v4();
        let channel = Uuid::new_v4();
        repo.create(&Ban::new(
            character,
            Some(channel),
            Some(ChannelType::Guild),
            "flood",
            None,
            None,
        ))
        .await
        .unwrap();

        let now = Utc::now();
        assert!(repo.find_active(character, Some(channel), now).await.unwrap().is_some());
        assert!(repo.find_active(character, None, now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_resolve_only_once() {
        let repo = MemoryReportRepository::new();
        let report = Report::new(
            Uuid::new_v4(),
            crate::model::CreateReportRequest {
                reported_id: Uuid::new_v4(),
                message_id: None,
                channel_id: None,
                reason: "abuse".to_string(),
            },
        );
        repo.create(&report).await.unwrap();

        let admin = Uuid::new_v4();
        let first = repo
            .resolve(report.id, ReportStatus::Resolved, admin, Utc::now())
            .await
            .unwrap();
        assert_eq!(first.map(|r| r.status), Some(ReportStatus::Resolved));

        let second = repo
            .resolve(report.id, ReportStatus::Rejected, admin, Utc::now())
            .await
            .unwrap();
        assert!(second.is_none());
    }
}
