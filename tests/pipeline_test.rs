use std::sync::Arc;
use std::time::Duration;

use social_pipeline::config::ServiceConfig;
use social_pipeline::domain::EventPayload;
use social_pipeline::infra::{MemoryCounterStore, MemoryPubSub, PubSubTransport};
use social_pipeline::model::{DeliveryChannel, Guild, NotificationType};
use social_pipeline::repository::memory::{
    MemoryBanRepository, MemoryGuildRepository, MemoryNotificationPreferencesRepository,
    MemoryNotificationRepository, MemoryReportRepository,
};
use social_pipeline::repository::GuildRepository;
use social_pipeline::{EventPipeline, PipelineParts};
use uuid::Uuid;

struct Harness {
    pipeline: EventPipeline,
    transport: Arc<MemoryPubSub>,
    notifications: MemoryNotificationRepository,
    guilds: MemoryGuildRepository,
}

fn harness(config: ServiceConfig) -> Harness {
    let transport = Arc::new(MemoryPubSub::new());
    let notifications = MemoryNotificationRepository::new();
    let guilds = MemoryGuildRepository::new();
    let parts = PipelineParts {
        transport: transport.clone(),
        counters: Arc::new(MemoryCounterStore::new()),
        bans: Arc::new(MemoryBanRepository::new()),
        reports: Arc::new(MemoryReportRepository::new()),
        notifications: Arc::new(notifications.clone()),
        preferences: Arc::new(MemoryNotificationPreferencesRepository::new()),
        guilds: Arc::new(guilds.clone()),
    };
    Harness {
        pipeline: EventPipeline::from_parts(config, parts).unwrap(),
        transport,
        notifications,
        guilds,
    }
}

async fn publish(transport: &MemoryPubSub, topic: &str, body: serde_json::Value) {
    transport
        .publish(topic, body.to_string().as_bytes())
        .await
        .unwrap();
}

/// 轮询直到条件成立或超时
async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn test_gameplay_event_becomes_notification() {
    let h = harness(ServiceConfig::default());
    h.pipeline.start().await.unwrap();

    let account = Uuid::new_v4();
    publish(
        &h.transport,
        "events:achievement:unlocked",
        serde_json::json!({
            "account_id": account.to_string(),
            "description": "First blood",
        }),
    )
    .await;

    let notifications = h.notifications.clone();
    assert!(
        eventually(|| {
            let notifications = notifications.clone();
            async move { notifications.len().await == 1 }
        })
        .await
    );

    let stored = h.notifications.all().await;
    assert_eq!(stored[0].account_id, account);
    assert_eq!(stored[0].kind, NotificationType::Achievement);
    assert_eq!(stored[0].content, "First blood");
    assert_eq!(stored[0].channels, vec![DeliveryChannel::InGame]);

    let listed = h
        .pipeline
        .notifications()
        .list_notifications(account, 20, 0)
        .await
        .unwrap();
    assert_eq!(listed.total, 1);
    assert_eq!(listed.unread, 1);

    h.pipeline.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_character_id_is_used_when_account_id_missing() {
    let h = harness(ServiceConfig::default());
    h.pipeline.start().await.unwrap();

    let character = Uuid::new_v4();
    publish(
        &h.transport,
        "events:friend:request",
        serde_json::json!({
            "character_id": character.to_string(),
            "title": "New friend request",
        }),
    )
    .await;

    let notifications = h.notifications.clone();
    assert!(
        eventually(|| {
            let notifications = notifications.clone();
            async move { notifications.len().await == 1 }
        })
        .await
    );

    let stored = h.notifications.all().await;
    assert_eq!(stored[0].account_id, character);
    assert_eq!(stored[0].kind, NotificationType::Friend);
    assert_eq!(stored[0].title, "New friend request");

    h.pipeline.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_critical_event_is_pushed_to_websocket_topic() {
    let h = harness(ServiceConfig::default());
    h.pipeline.start().await.unwrap();

    let account = Uuid::new_v4();
    publish(
        &h.transport,
        "events:combat:raid-started",
        serde_json::json!({
            "account_id": account.to_string(),
            "priority": "critical",
            "raid": "molten-core",
        }),
    )
    .await;

    let topic = format!("events:notification:websocket:{}", account);
    let transport = h.transport.clone();
    assert!(
        eventually(|| {
            let transport = transport.clone();
            let topic = topic.clone();
            async move { !transport.published_with_prefix(&topic).is_empty() }
        })
        .await
    );

    let pushed = h.transport.published_with_prefix(&topic);
    let body = EventPayload::from_slice(&pushed[0].payload).unwrap();
    assert_eq!(body.str("type").unwrap(), Some("combat"));
    assert_eq!(body.str("priority").unwrap(), Some("critical"));
    assert_eq!(body.str("raid").unwrap(), Some("molten-core"));

    h.pipeline.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_member_level_up_levels_guild() {
    let mut config = ServiceConfig::default();
    config.guild_progression.level_up_experience = 100;
    let h = harness(config);

    let character = Uuid::new_v4();
    let mut guild = Guild::new("Night Watch", "NW", Uuid::new_v4());
    guild.experience = 950;
    let guild = h.guilds.insert_guild(guild).await;
    h.guilds.add_member(guild.id, character).await;

    h.pipeline.start().await.unwrap();
    publish(
        &h.transport,
        &format!("events:character:level-up:{}", character),
        serde_json::json!({ "character_id": character.to_string(), "new_level": 12 }),
    )
    .await;

    let transport = h.transport.clone();
    assert!(
        eventually(|| {
            let transport = transport.clone();
            async move {
                !transport
                    .published_with_prefix("events:guild:leveled-up")
                    .is_empty()
            }
        })
        .await
    );

    let updated = h.guilds.find_by_id(guild.id).await.unwrap().unwrap();
    assert_eq!(updated.level, 2);
    assert_eq!(updated.experience, 50);

    let event = &h.transport.published_with_prefix("events:guild:leveled-up")[0];
    let body = EventPayload::from_slice(&event.payload).unwrap();
    assert_eq!(body.uuid("guild_id").unwrap(), Some(guild.id));
    assert_eq!(body.i64("old_level").unwrap(), Some(1));
    assert_eq!(body.i64("new_level").unwrap(), Some(2));

    h.pipeline.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_territory_capture_without_guild_is_ignored() {
    let h = harness(ServiceConfig::default());
    h.pipeline.start().await.unwrap();

    publish(
        &h.transport,
        "events:territory:captured:north-pass",
        serde_json::json!({ "character_id": Uuid::new_v4().to_string() }),
    )
    .await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(h
        .transport
        .published_with_prefix("events:guild:leveled-up")
        .is_empty());
    h.pipeline.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_nothing_is_processed_after_shutdown() {
    let h = harness(ServiceConfig::default());
    h.pipeline.start().await.unwrap();
    h.pipeline.shutdown().await.unwrap();

    publish(
        &h.transport,
        "events:quest:completed",
        serde_json::json!({ "account_id": Uuid::new_v4().to_string() }),
    )
    .await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(h.notifications.is_empty().await);
}
