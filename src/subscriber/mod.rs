//! 事件订阅者
//!
//! `PatternSubscriber` 负责订阅生命周期（idle -> listening -> stopped）和逐条处理，
//! 具体业务放在 `EventHandler` 实现里。同一订阅内的消息按到达顺序串行处理。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

use crate::domain::EventPayload;
use crate::error::{Result, ServerError};
use crate::infra::metrics;
use crate::infra::{EventStream, PubSubTransport, RawEvent};

pub mod guild_progression;
pub mod notification;

pub use guild_progression::GuildProgressionSubscriber;
pub use notification::NotificationSubscriber;

/// 单条事件的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOutcome {
    /// 产生了副作用
    Processed,
    /// 按规则跳过（不是错误）
    Skipped,
}

/// 订阅者业务逻辑
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    /// 用于日志和指标的名字
    fn name(&self) -> &'static str;

    /// 订阅的 topic pattern
    fn patterns(&self) -> Vec<String>;

    async fn handle(&self, topic: &str, payload: EventPayload) -> Result<HandleOutcome>;
}

enum SubscriptionState {
    Idle,
    Listening {
        cancel: CancellationToken,
        handle: JoinHandle<()>,
    },
    Stopped,
}

/// 按 pattern 订阅并驱动一个 `EventHandler`
pub struct PatternSubscriber {
    transport: Arc<dyn PubSubTransport>,
    handler: Arc<dyn EventHandler>,
    processing_timeout: Duration,
    state: Mutex<SubscriptionState>,
    span: tracing::Span,
}

impl PatternSubscriber {
    pub fn new(
        transport: Arc<dyn PubSubTransport>,
        handler: Arc<dyn EventHandler>,
        processing_timeout: Duration,
    ) -> Self {
        let span = tracing::info_span!("subscriber", consumer = handler.name());
        Self {
            transport,
            handler,
            processing_timeout,
            state: Mutex::new(SubscriptionState::Idle),
            span,
        }
    }

    pub fn name(&self) -> &'static str {
        self.handler.name()
    }

    /// 打开订阅并启动后台监听循环
    ///
    /// 返回时订阅已经建立，之后发布的匹配事件都会被收到。
    /// 只能从 idle 状态启动一次。
    pub async fn start(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        match *state {
            SubscriptionState::Idle => {}
            SubscriptionState::Listening { .. } => {
                return Err(ServerError::InvalidState(format!(
                    "subscriber {} is already listening",
                    self.name()
                )))
            }
            SubscriptionState::Stopped => {
                return Err(ServerError::InvalidState(format!(
                    "subscriber {} has been stopped",
                    self.name()
                )))
            }
        }

        let patterns = self.handler.patterns();
        let stream = self.transport.subscribe_pattern(&patterns).await?;
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(
            listen(
                stream,
                self.handler.clone(),
                cancel.clone(),
                self.processing_timeout,
            )
            .instrument(self.span.clone()),
        );

        info!(
            "[SUBSCRIPTION] ✅ {} 已订阅: {:?}",
            self.name(),
            patterns
        );
        *state = SubscriptionState::Listening { cancel, handle };
        Ok(())
    }

    /// 停止订阅
    ///
    /// 等待监听循环退出后才返回；返回之后不会再处理任何事件。
    pub async fn stop(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        match std::mem::replace(&mut *state, SubscriptionState::Stopped) {
            SubscriptionState::Listening { cancel, handle } => {
                cancel.cancel();
                if let Err(e) = handle.await {
                    error!("[SUBSCRIPTION] {} 监听任务异常退出: {}", self.name(), e);
                }
                info!("[SUBSCRIPTION] 🛑 {} 已停止", self.name());
            }
            SubscriptionState::Idle | SubscriptionState::Stopped => {}
        }
        Ok(())
    }

    pub async fn is_listening(&self) -> bool {
        matches!(*self.state.lock().await, SubscriptionState::Listening { .. })
    }
}

async fn listen(
    mut stream: EventStream,
    handler: Arc<dyn EventHandler>,
    cancel: CancellationToken,
    processing_timeout: Duration,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = stream.next() => match next {
                Some(event) => event,
                None => {
                    warn!("[SUBSCRIPTION] {} 订阅流已关闭", handler.name());
                    break;
                }
            },
        };
        process_event(handler.as_ref(), event, processing_timeout).await;
    }
    // drop 订阅流即关闭底层订阅
    drop(stream);
    debug!("[SUBSCRIPTION] {} 监听循环退出", handler.name());
}

async fn process_event(handler: &dyn EventHandler, event: RawEvent, processing_timeout: Duration) {
    let consumer = handler.name();

    let payload = match EventPayload::from_slice(&event.payload) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(
                "[SUBSCRIPTION] {} 丢弃无法解码的消息: topic={}, error={}",
                consumer, event.topic, e
            );
            metrics::record_subscriber_event(consumer, "decode_error");
            return;
        }
    };

    match tokio::time::timeout(processing_timeout, handler.handle(&event.topic, payload)).await {
        Ok(Ok(HandleOutcome::Processed)) => {
            metrics::record_subscriber_event(consumer, "processed");
        }
        Ok(Ok(HandleOutcome::Skipped)) => {
            metrics::record_subscriber_event(consumer, "skipped");
        }
        Ok(Err(e)) => {
            error!(
                "[SUBSCRIPTION] {} 处理事件失败: topic={}, error={}",
                consumer, event.topic, e
            );
            metrics::record_subscriber_event(consumer, "failed");
        }
        Err(_) => {
            warn!(
                "[SUBSCRIPTION] {} 处理事件超时 ({}ms): topic={}",
                consumer,
                processing_timeout.as_millis(),
                event.topic
            );
            metrics::record_subscriber_event(consumer, "timeout");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::MemoryPubSub;
    use parking_lot::Mutex as SyncMutex;

    struct Recorder {
        seen: SyncMutex<Vec<String>>,
        delay: Duration,
    }

    #[async_trait]
    impl EventHandler for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        fn patterns(&self) -> Vec<String> {
            vec!["events:test:*".to_string()]
        }

        async fn handle(&self, topic: &str, _payload: EventPayload) -> Result<HandleOutcome> {
            tokio::time::sleep(self.delay).await;
            self.seen.lock().push(topic.to_string());
            Ok(HandleOutcome::Processed)
        }
    }

    async fn wait_for(recorder: &Recorder, count: usize) {
        for _ in 0..200 {
            if recorder.seen.lock().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let transport = Arc::new(MemoryPubSub::new());
        let handler = Arc::new(Recorder {
            seen: SyncMutex::new(vec![]),
            delay: Duration::ZERO,
        });
        let subscriber = PatternSubscriber::new(transport, handler, Duration::from_secs(5));

        subscriber.start().await.unwrap();
        assert!(subscriber.is_listening().await);
        assert!(matches!(
            subscriber.start().await,
            Err(ServerError::InvalidState(_))
        ));

        subscriber.stop().await.unwrap();
        assert!(!subscriber.is_listening().await);
        assert!(subscriber.start().await.is_err());
    }

    #[tokio::test]
    async fn test_bad_payload_does_not_stop_loop() {
        let transport = Arc::new(MemoryPubSub::new());
        let handler = Arc::new(Recorder {
            seen: SyncMutex::new(vec![]),
            delay: Duration::ZERO,
        });
        let subscriber =
            PatternSubscriber::new(transport.clone(), handler.clone(), Duration::from_secs(5));
        subscriber.start().await.unwrap();

        transport.publish("events:test:a", b"not json").await.unwrap();
        transport.publish("events:test:b", b"{}").await.unwrap();
        wait_for(&handler, 1).await;

        assert_eq!(*handler.seen.lock(), vec!["events:test:b".to_string()]);
        subscriber.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_slow_event_times_out_and_loop_continues() {
        let transport = Arc::new(MemoryPubSub::new());
        let handler = Arc::new(Recorder {
            seen: SyncMutex::new(vec![]),
            delay: Duration::from_millis(200),
        });
        let subscriber =
            PatternSubscriber::new(transport.clone(), handler.clone(), Duration::from_millis(20));
        subscriber.start().await.unwrap();

        transport.publish("events:test:slow", b"{}").await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        subscriber.stop().await.unwrap();

        assert!(handler.seen.lock().is_empty());
    }
}
