// 业务服务层模块
pub mod chat_guard;
pub mod content_filter;
pub mod moderation_service;
pub mod notification_service;

pub use chat_guard::{violation_key, ChatGuard, MessageVerdict, RejectReason};
pub use content_filter::{ContentFilter, FilterOutcome};
pub use moderation_service::ModerationService;
pub use notification_service::NotificationService;
