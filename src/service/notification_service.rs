//! 通知服务：创建、查询、已读状态与通知偏好

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::error::{Result, ServerError};
use crate::model::{
    CreateNotificationRequest, Notification, NotificationListResponse, NotificationPreferences,
    NotificationStatus,
};
use crate::repository::{NotificationPreferencesRepository, NotificationRepository};

const MAX_PAGE_SIZE: i64 = 100;

pub struct NotificationService {
    notifications: Arc<dyn NotificationRepository>,
    preferences: Arc<dyn NotificationPreferencesRepository>,
}

impl NotificationService {
    pub fn new(
        notifications: Arc<dyn NotificationRepository>,
        preferences: Arc<dyn NotificationPreferencesRepository>,
    ) -> Self {
        Self {
            notifications,
            preferences,
        }
    }

    /// 创建通知；未指定渠道时只走游戏内
    pub async fn create_notification(
        &self,
        request: CreateNotificationRequest,
    ) -> Result<Notification> {
        if request.title.trim().is_empty() {
            return Err(ServerError::Validation(
                "notification title is required".to_string(),
            ));
        }
        let notification = self
            .notifications
            .create(&Notification::from_request(request))
            .await?;
        info!(
            "📨 创建通知: id={}, account_id={}, type={}, priority={}",
            notification.id,
            notification.account_id,
            notification.kind.as_str(),
            notification.priority.as_str()
        );
        Ok(notification)
    }

    /// 分页列出未过期通知
    pub async fn list_notifications(
        &self,
        account_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<NotificationListResponse> {
        let (notifications, total, unread) = self
            .notifications
            .list_by_account(
                account_id,
                limit.clamp(1, MAX_PAGE_SIZE),
                offset.max(0),
                Utc::now(),
            )
            .await?;
        Ok(NotificationListResponse {
            notifications,
            total,
            unread,
        })
    }

    pub async fn get_notification(&self, id: Uuid) -> Result<Notification> {
        self.notifications
            .find_by_id(id)
            .await?
            .ok_or_else(|| ServerError::NotFound(format!("notification {}", id)))
    }

    /// 更新已读状态；只允许 未读 -> 已读，重复标记已读是幂等的
    pub async fn update_notification_status(
        &self,
        id: Uuid,
        status: NotificationStatus,
    ) -> Result<Notification> {
        let current = self.get_notification(id).await?;
        if current.status == NotificationStatus::Read && status == NotificationStatus::Unread {
            return Err(ServerError::InvalidState(format!(
                "notification {} is already read",
                id
            )));
        }

        self.notifications
            .update_status(id, status)
            .await?
            .ok_or_else(|| ServerError::NotFound(format!("notification {}", id)))
    }

    /// 读取通知偏好；从未设置过时返回默认值（不落库）
    pub async fn get_preferences(&self, account_id: Uuid) -> Result<NotificationPreferences> {
        Ok(self
            .preferences
            .get(account_id)
            .await?
            .unwrap_or_else(|| NotificationPreferences::default_for(account_id)))
    }

    pub async fn update_preferences(
        &self,
        mut preferences: NotificationPreferences,
    ) -> Result<NotificationPreferences> {
        let mut seen = Vec::with_capacity(preferences.preferred_channels.len());
        preferences.preferred_channels.retain(|c| {
            let fresh = !seen.contains(c);
            seen.push(*c);
            fresh
        });
        preferences.updated_at = Utc::now();
        self.preferences.upsert(&preferences).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DeliveryChannel, NotificationPriority, NotificationType};
    use crate::repository::memory::{
        MemoryNotificationPreferencesRepository, MemoryNotificationRepository,
    };

    fn service() -> NotificationService {
        NotificationService::new(
            Arc::new(MemoryNotificationRepository::new()),
            Arc::new(MemoryNotificationPreferencesRepository::new()),
        )
    }

    fn request(account_id: Uuid) -> CreateNotificationRequest {
        CreateNotificationRequest {
            account_id,
            kind: NotificationType::Quest,
            priority: NotificationPriority::Medium,
            title: "Quest complete".to_string(),
            content: "You finished the quest".to_string(),
            data: Default::default(),
            channels: vec![],
            expires_at: None,
        }
    }

    #[tokio::test]
    async fn test_list_filters_expired_and_counts_unread() {
        let service = service();
        let account = Uuid::new_v4();

        let first = service.create_notification(request(account)).await.unwrap();
        service.create_notification(request(account)).await.unwrap();
        let mut expired = request(account);
        expired.expires_at = Some(Utc::now() - chrono::Duration::minutes(1));
        service.create_notification(expired).await.unwrap();

        service
            .update_notification_status(first.id, NotificationStatus::Read)
            .await
            .unwrap();

        let list = service.list_notifications(account, 20, 0).await.unwrap();
        assert_eq!(list.total, 2);
        assert_eq!(list.unread, 1);
        assert_eq!(list.notifications.len(), 2);
    }

    #[tokio::test]
    async fn test_read_notification_cannot_become_unread() {
        let service = service();
        let notification = service
            .create_notification(request(Uuid::new_v4()))
            .await
            .unwrap();

        let read = service
            .update_notification_status(notification.id, NotificationStatus::Read)
            .await
            .unwrap();
        assert_eq!(read.status, NotificationStatus::Read);

        assert!(matches!(
            service
                .update_notification_status(notification.id, NotificationStatus::Unread)
                .await,
            Err(ServerError::InvalidState(_))
        ));
        let again = service
            .update_notification_status(notification.id, NotificationStatus::Read)
            .await
            .unwrap();
        assert_eq!(again.status, NotificationStatus::Read);

        assert!(matches!(
            service
                .update_notification_status(Uuid::new_v4(), NotificationStatus::Read)
                .await,
            Err(ServerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_default_preferences_when_missing() {
        let service = service();
        let account = Uuid::new_v4();

        let prefs = service.get_preferences(account).await.unwrap();
        assert!(prefs.is_enabled(NotificationType::Combat));
        assert_eq!(prefs.preferred_channels, vec![DeliveryChannel::InGame]);

        let mut updated = prefs.clone();
        updated.combat_enabled = false;
        service.update_preferences(updated).await.unwrap();
        assert!(!service
            .get_preferences(account)
            .await
            .unwrap()
            .is_enabled(NotificationType::Combat));
    }

    #[tokio::test]
    async fn test_unknown_notification_is_not_found() {
        let service = service();
        let err = service
            .update_notification_status(Uuid::new_v4(), NotificationStatus::Read)
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::NotFound(_)));
    }
}
