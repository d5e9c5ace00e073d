// Infrastructure layer - 基础设施层
// 负责 Redis 计数器 / Pub/Sub、事件总线、数据库连接与指标

pub mod counter_store;
pub mod database;
pub mod event_bus;
pub mod memory;
pub mod metrics;
pub mod pubsub;
pub mod redis_client;

// 重新导出主要类型
pub use counter_store::CounterStore;
pub use database::Database;
pub use event_bus::EventBus;
pub use memory::{MemoryCounterStore, MemoryPubSub};
pub use pubsub::{topic_matches, EventStream, PubSubTransport, RawEvent};
pub use redis_client::RedisClient;
