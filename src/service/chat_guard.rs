//! 消息发送前的审核组合：禁言 -> 刷屏 -> 内容过滤 -> 累计违规

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::model::{Ban, BanScope};
use crate::service::moderation_service::ModerationService;

/// 拒绝原因
#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    /// 发送者在该作用域上被禁言
    Banned { ban: Ban },
    /// 刷屏
    Spam,
}

/// 审核结论
#[derive(Debug, Clone, PartialEq)]
pub enum MessageVerdict {
    /// 允许发送；`filtered` 表示内容被改写过
    Accepted { content: String, filtered: bool },
    Rejected(RejectReason),
}

impl MessageVerdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, MessageVerdict::Accepted { .. })
    }
}

/// 累计违规计数 key
pub fn violation_key(actor: Uuid) -> String {
    format!("chat:violations:{}", actor)
}

/// 聊天发送路径上的审核入口
pub struct ChatGuard {
    moderation: Arc<ModerationService>,
}

impl ChatGuard {
    pub fn new(moderation: Arc<ModerationService>) -> Self {
        Self { moderation }
    }

    /// 审核一条待发送消息
    ///
    /// 策略结果用 `MessageVerdict` 表示；禁言查询或刷屏计数故障返回 `Err`，
    /// 违规记账故障只记录日志。
    pub async fn screen_message(
        &self,
        sender: Uuid,
        scope: Option<BanScope>,
        content: &str,
    ) -> Result<MessageVerdict> {
        let channel_id = scope.map(|s| s.channel_id);

        if let Some(ban) = self.moderation.check_ban(sender, channel_id).await? {
            return Ok(MessageVerdict::Rejected(RejectReason::Banned { ban }));
        }

        if self.moderation.detect_spam(sender, content).await? {
            // 自动禁言失败不影响本条消息被拒
            match self.moderation.auto_ban_if_spam(sender, scope).await {
                Ok(Some(ban)) => info!("[MODERATION] 刷屏发送者已禁言: ban_id={}", ban.id),
                Ok(None) => {}
                Err(e) => error!("[MODERATION] 刷屏自动禁言失败: sender={}, error={}", sender, e),
            }
            return Ok(MessageVerdict::Rejected(RejectReason::Spam));
        }

        let outcome = self.moderation.filter_message(content);
        if outcome.violation {
            // 违规记账失败不影响已过滤消息的放行
            self.record_violation(sender, scope).await;
        }

        Ok(MessageVerdict::Accepted {
            content: outcome.content,
            filtered: outcome.violation,
        })
    }

    async fn record_violation(&self, sender: Uuid, scope: Option<BanScope>) {
        let config = self.moderation.config();
        let key = violation_key(sender);
        let count = match self
            .moderation
            .counters()
            .incr_with_window(&key, Duration::from_secs(config.violation_window_secs))
            .await
        {
            Ok(count) => count,
            Err(e) => {
                error!("[MODERATION] 违规计数失败: sender={}, error={}", sender, e);
                return;
            }
        };

        if count < config.severe_violation_threshold {
            return;
        }
        match self
            .moderation
            .auto_ban_if_severe_violation(sender, scope, count)
            .await
        {
            Ok(Some(ban)) => {
                info!(
                    "[MODERATION] 累计违规已处理，重置计数: sender={}, ban_id={}",
                    sender, ban.id
                );
                if let Err(e) = self.moderation.counters().del(&key).await {
                    warn!("⚠️ [MODERATION] 重置违规计数失败: key={}, error={}", key, e);
                }
            }
            Ok(None) => {}
            Err(e) => error!(
                "[MODERATION] 累计违规自动禁言失败: sender={}, error={}",
                sender, e
            ),
        }
    }
}
