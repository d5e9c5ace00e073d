//! Social Pipeline
//!
//! 事件驱动的聊天审核、通知扇出与公会经验管道。

pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod infra;
pub mod logging;
pub mod model;
pub mod repository;
pub mod server;
pub mod service;
pub mod subscriber;

pub use config::ServiceConfig;
pub use domain::{DomainEvent, EventPayload};
pub use error::{Result, ServerError};
pub use infra::{CounterStore, EventBus, PubSubTransport, RawEvent};
pub use model::*;
pub use server::{EventPipeline, PipelineParts};
pub use service::{ChatGuard, MessageVerdict, ModerationService, NotificationService};
pub use subscriber::{EventHandler, HandleOutcome, PatternSubscriber};
