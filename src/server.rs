use std::sync::Arc;

use tracing::{error, info, warn};

use crate::config::ServiceConfig;
use crate::error::{Result, ServerError};
use crate::infra::database::{mask_database_url, Database};
use crate::infra::{
    CounterStore, EventBus, MemoryCounterStore, MemoryPubSub, PubSubTransport, RedisClient,
};
use crate::repository::memory::{
    MemoryBanRepository, MemoryGuildRepository, MemoryNotificationPreferencesRepository,
    MemoryNotificationRepository, MemoryReportRepository,
};
use crate::repository::{
    BanRepository, GuildRepository, NotificationPreferencesRepository, NotificationRepository,
    PgBanRepository, PgGuildRepository, PgNotificationPreferencesRepository,
    PgNotificationRepository, PgReportRepository, ReportRepository,
};
use crate::service::{ChatGuard, ModerationService, NotificationService};
use crate::subscriber::{GuildProgressionSubscriber, NotificationSubscriber, PatternSubscriber};

/// 管道依赖的外部组件
///
/// 生产环境由 `EventPipeline::new` 基于 Redis / PostgreSQL 构造，
/// 测试和嵌入场景可以直接传入内存实现。
#[derive(Clone)]
pub struct PipelineParts {
    pub transport: Arc<dyn PubSubTransport>,
    pub counters: Arc<dyn CounterStore>,
    pub bans: Arc<dyn BanRepository>,
    pub reports: Arc<dyn ReportRepository>,
    pub notifications: Arc<dyn NotificationRepository>,
    pub preferences: Arc<dyn NotificationPreferencesRepository>,
    pub guilds: Arc<dyn GuildRepository>,
}

impl PipelineParts {
    /// 全部使用内存实现
    pub fn in_memory() -> Self {
        Self {
            transport: Arc::new(MemoryPubSub::new()),
            counters: Arc::new(MemoryCounterStore::new()),
            bans: Arc::new(MemoryBanRepository::new()),
            reports: Arc::new(MemoryReportRepository::new()),
            notifications: Arc::new(MemoryNotificationRepository::new()),
            preferences: Arc::new(MemoryNotificationPreferencesRepository::new()),
            guilds: Arc::new(MemoryGuildRepository::new()),
        }
    }
}

/// 事件管道：审核服务 + 通知扇出订阅者 + 公会经验订阅者
pub struct EventPipeline {
    config: ServiceConfig,
    event_bus: EventBus,
    moderation: Arc<ModerationService>,
    chat_guard: Arc<ChatGuard>,
    notifications: Arc<NotificationService>,
    subscribers: Vec<PatternSubscriber>,
}

impl EventPipeline {
    /// 连接 Redis 和 PostgreSQL 并组装管道
    pub async fn new(config: ServiceConfig) -> Result<Self> {
        info!("🔧 初始化事件管道组件...");

        info!("🔌 初始化 Redis 连接...");
        let redis = Arc::new(RedisClient::new(&config.redis).await?);

        info!("🔌 初始化数据库连接...");
        let database = Database::new(&config.database).await.map_err(|e| {
            ServerError::Database(format!(
                "数据库连接失败 ({}): {}",
                mask_database_url(&config.database.url),
                e
            ))
        })?;
        let pool = Arc::new(database.pool().clone());

        info!("📦 初始化 Repository 层...");
        let parts = PipelineParts {
            transport: redis.clone(),
            counters: redis,
            bans: Arc::new(PgBanRepository::new(pool.clone())),
            reports: Arc::new(PgReportRepository::new(pool.clone())),
            notifications: Arc::new(PgNotificationRepository::new(pool.clone())),
            preferences: Arc::new(PgNotificationPreferencesRepository::new(pool.clone())),
            guilds: Arc::new(PgGuildRepository::new(pool)),
        };
        info!("✅ Repository 层初始化完成");

        Self::from_parts(config, parts)
    }

    /// 用给定的组件组装管道（不建立任何外部连接）
    pub fn from_parts(config: ServiceConfig, parts: PipelineParts) -> Result<Self> {
        let event_bus = EventBus::new(parts.transport.clone());

        let moderation = Arc::new(ModerationService::new(
            config.moderation.clone(),
            parts.bans,
            parts.reports,
            parts.counters,
            event_bus.clone(),
        )?);
        let chat_guard = Arc::new(ChatGuard::new(moderation.clone()));
        let notifications = Arc::new(NotificationService::new(
            parts.notifications,
            parts.preferences,
        ));

        let timeout = config.subscriber.processing_timeout();
        let subscribers = vec![
            PatternSubscriber::new(
                parts.transport.clone(),
                Arc::new(NotificationSubscriber::new(
                    notifications.clone(),
                    event_bus.clone(),
                )),
                timeout,
            ),
            PatternSubscriber::new(
                parts.transport,
                Arc::new(GuildProgressionSubscriber::new(
                    config.guild_progression.clone(),
                    parts.guilds,
                    event_bus.clone(),
                )),
                timeout,
            ),
        ];

        info!("✅ 事件管道组装完成 ({} 个订阅者)", subscribers.len());

        Ok(Self {
            config,
            event_bus,
            moderation,
            chat_guard,
            notifications,
            subscribers,
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn moderation(&self) -> &Arc<ModerationService> {
        &self.moderation
    }

    pub fn chat_guard(&self) -> &Arc<ChatGuard> {
        &self.chat_guard
    }

    pub fn notifications(&self) -> &Arc<NotificationService> {
        &self.notifications
    }

    /// 启动所有订阅者
    ///
    /// 任一订阅失败时，已启动的订阅者会被停止，然后返回错误。
    pub async fn start(&self) -> Result<()> {
        for (index, subscriber) in self.subscribers.iter().enumerate() {
            if let Err(e) = subscriber.start().await {
                error!("❌ 订阅者 {} 启动失败: {}", subscriber.name(), e);
                for started in &self.subscribers[..index] {
                    if let Err(stop_err) = started.stop().await {
                        warn!("⚠️ 停止订阅者 {} 失败: {}", started.name(), stop_err);
                    }
                }
                return Err(e);
            }
        }
        info!("🚀 事件管道已启动");
        Ok(())
    }

    /// 停止所有订阅者，返回后不会再处理任何事件
    pub async fn shutdown(&self) -> Result<()> {
        info!("🛑 停止事件管道...");
        for subscriber in &self.subscribers {
            subscriber.stop().await?;
        }
        info!("✅ 事件管道已停止");
        Ok(())
    }

    /// 启动管道并等待 Ctrl+C
    pub async fn run(&self) -> Result<()> {
        if self.config.metrics.enabled {
            let addr = self
                .config
                .metrics
                .socket_addr()
                .map_err(|e| ServerError::Configuration(e.to_string()))?;
            match crate::infra::metrics::init(addr) {
                Ok(()) => info!("📊 Prometheus 指标已启用: http://{}/metrics", addr),
                Err(e) => warn!("⚠️ Prometheus 指标初始化失败: {}", e),
            }
        }

        self.start().await?;

        info!("💡 提示: 按 Ctrl+C 停止服务");
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("❌ 监听 Ctrl+C 失败: {}", e);
        }

        self.shutdown().await
    }
}
