//! 公会经验订阅者：成员升级 / 占领领地为所在公会加经验

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use super::{EventHandler, HandleOutcome};
use crate::config::GuildProgressionConfig;
use crate::domain::{DomainEvent, EventPayload};
use crate::error::Result;
use crate::infra::EventBus;
use crate::model::apply_experience;
use crate::repository::GuildRepository;

const LEVEL_UP_PREFIX: &str = "events:character:level-up";
const TERRITORY_CAPTURED_PREFIX: &str = "events:territory:captured";

/// 订阅的 topic pattern
pub const GUILD_PROGRESSION_PATTERNS: [&str; 2] = [
    "events:character:level-up:*",
    "events:territory:captured:*",
];

/// 公会经验订阅者
///
/// 等级/经验是普通的读-改-写，同一公会的并发事件可能丢失一次增量。
pub struct GuildProgressionSubscriber {
    config: GuildProgressionConfig,
    guilds: Arc<dyn GuildRepository>,
    event_bus: EventBus,
}

impl GuildProgressionSubscriber {
    pub fn new(
        config: GuildProgressionConfig,
        guilds: Arc<dyn GuildRepository>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            config,
            guilds,
            event_bus,
        }
    }

    /// 按 topic 决定经验值，不相关的 topic 返回 0
    pub fn experience_for_topic(&self, topic: &str) -> i64 {
        if topic.starts_with(LEVEL_UP_PREFIX) {
            self.config.level_up_experience
        } else if topic.starts_with(TERRITORY_CAPTURED_PREFIX) {
            self.config.territory_capture_experience
        } else {
            0
        }
    }
}

#[async_trait]
impl EventHandler for GuildProgressionSubscriber {
    fn name(&self) -> &'static str {
        "guild_progression"
    }

    fn patterns(&self) -> Vec<String> {
        GUILD_PROGRESSION_PATTERNS
            .iter()
            .map(|p| p.to_string())
            .collect()
    }

    async fn handle(&self, topic: &str, payload: EventPayload) -> Result<HandleOutcome> {
        let gain = self.experience_for_topic(topic);
        if gain <= 0 {
            return Ok(HandleOutcome::Skipped);
        }

        let Some(character_id) = payload.uuid("character_id")? else {
            warn!(
                "[GUILD PROGRESSION] 事件缺少 character_id，丢弃: topic={}",
                topic
            );
            return Ok(HandleOutcome::Skipped);
        };

        let Some(guild) = self.guilds.find_guild_by_member(character_id).await? else {
            debug!("[GUILD PROGRESSION] 角色 {} 不在任何公会中", character_id);
            return Ok(HandleOutcome::Skipped);
        };

        let progression = apply_experience(
            guild.level,
            guild.experience,
            gain,
            self.config.experience_per_level,
        );
        self.guilds
            .update_level(guild.id, progression.new_level, progression.experience)
            .await?;

        debug!(
            "[GUILD PROGRESSION] 公会 {} +{} 经验: level={}, experience={}",
            guild.id, gain, progression.new_level, progression.experience
        );

        if progression.leveled_up() {
            info!(
                "[GUILD PROGRESSION] 🎉 公会 {} 升级: {} -> {}",
                guild.id, progression.old_level, progression.new_level
            );
            self.event_bus
                .publish_event(DomainEvent::GuildLeveledUp {
                    guild_id: guild.id,
                    old_level: progression.old_level,
                    new_level: progression.new_level,
                    experience: progression.experience,
                    timestamp: Utc::now(),
                })
                .await;
        }

        Ok(HandleOutcome::Processed)
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::error::ServerError;
    use crate::infra::MemoryPubSub;
    use crate::model::Guild;
    use crate::repository::memory::MemoryGuildRepository;

    struct Setup {
        subscriber: GuildProgressionSubscriber,
        guilds: MemoryGuildRepository,
        transport: Arc<MemoryPubSub>,
    }

    fn setup() -> Setup {
        let guilds = MemoryGuildRepository::new();
        let transport = Arc::new(MemoryPubSub::new());
        let subscriber = GuildProgressionSubscriber::new(
            GuildProgressionConfig::default(),
            Arc::new(guilds.clone()),
            EventBus::new(transport.clone()),
        );
        Setup {
            subscriber,
            guilds,
            transport,
        }
    }

    async fn guild_with_member(guilds: &MemoryGuildRepository, experience: i64) -> (Guild, Uuid) {
        let member = Uuid::new_v4();
        let mut guild = Guild::new("Night Watch", "NW", Uuid::new_v4());
        guild.experience = experience;
        let guild = guilds.insert_guild(guild).await;
        guilds.add_member(guild.id, member).await;
        (guild, member)
    }

    fn payload_for(character_id: &str) -> EventPayload {
        let mut payload = EventPayload::new();
        payload.insert("character_id", character_id);
        payload
    }

    #[tokio::test]
    async fn test_member_level_up_adds_experience() {
        let s = setup();
        let (guild, member) = guild_with_member(&s.guilds, 100).await;

        let outcome = s
            .subscriber
            .handle(
                "events:character:level-up:42",
                payload_for(&member.to_string()),
            )
            .await
            .unwrap();
        assert_eq!(outcome, HandleOutcome::Processed);

        let stored = s.guilds.find_by_id(guild.id).await.unwrap().unwrap();
        assert_eq!(stored.level, 1);
        assert_eq!(stored.experience, 110);
        assert!(s.transport.published_with_prefix("events:guild").is_empty());
    }

    #[tokio::test]
    async fn test_territory_capture_adds_fifty_and_levels_up() {
        let s = setup();
        let (guild, member) = guild_with_member(&s.guilds, 980).await;

        let outcome = s
            .subscriber
            .handle(
                "events:territory:captured:north-keep",
                payload_for(&member.to_string()),
            )
            .await
            .unwrap();
        assert_eq!(outcome, HandleOutcome::Processed);

        let stored = s.guilds.find_by_id(guild.id).await.unwrap().unwrap();
        assert_eq!(stored.level, 2);
        assert_eq!(stored.experience, 30);
        assert_eq!(
            s.transport.published_with_prefix("events:guild:leveled-up").len(),
            1
        );
    }

    #[tokio::test]
    async fn test_unrelated_topic_is_skipped() {
        let s = setup();
        let (guild, member) = guild_with_member(&s.guilds, 0).await;

        assert_eq!(s.subscriber.experience_for_topic("events:quest:completed:1"), 0);
        let outcome = s
            .subscriber
            .handle("events:quest:completed:1", payload_for(&member.to_string()))
            .await
            .unwrap();
        assert_eq!(outcome, HandleOutcome::Skipped);

        let stored = s.guilds.find_by_id(guild.id).await.unwrap().unwrap();
        assert_eq!(stored.experience, 0);
    }

    #[tokio::test]
    async fn test_zero_gain_is_skipped() {
        let guilds = MemoryGuildRepository::new();
        let subscriber = GuildProgressionSubscriber::new(
            GuildProgressionConfig {
                level_up_experience: 0,
                ..GuildProgressionConfig::default()
            },
            Arc::new(guilds.clone()),
            EventBus::new(Arc::new(MemoryPubSub::new())),
        );
        let (guild, member) = guild_with_member(&guilds, 500).await;

        let outcome = subscriber
            .handle("events:character:level-up:7", payload_for(&member.to_string()))
            .await
            .unwrap();
        assert_eq!(outcome, HandleOutcome::Skipped);
        let stored = guilds.find_by_id(guild.id).await.unwrap().unwrap();
        assert_eq!(stored.experience, 500);
    }

    #[tokio::test]
    async fn test_malformed_character_id_is_rejected() {
        let s = setup();
        let result = s
            .subscriber
            .handle("events:character:level-up:1", payload_for("not-a-uuid"))
            .await;
        assert!(matches!(result, Err(ServerError::Validation(_))));
    }

    #[tokio::test]
    async fn test_missing_character_or_guild_is_skipped() {
        let s = setup();

        let outcome = s
            .subscriber
            .handle("events:character:level-up:1", EventPayload::new())
            .await
            .unwrap();
        assert_eq!(outcome, HandleOutcome::Skipped);

        let outcome = s
            .subscriber
            .handle(
                "events:territory:captured:1",
                payload_for(&Uuid::new_v4().to_string()),
            )
            .await
            .unwrap();
        assert_eq!(outcome, HandleOutcome::Skipped);
    }
}
