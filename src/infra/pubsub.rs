//! Pub/Sub 传输抽象
//!
//! 生产者只需要 `publish`，订阅方按通配符 pattern 订阅并拿到有序的
//! `(topic, payload)` 流；流被 drop 时底层订阅随之关闭。

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::Result;

/// 一条原始消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// 订阅流；drop 即关闭订阅
pub type EventStream = Pin<Box<dyn Stream<Item = RawEvent> + Send>>;

#[async_trait]
pub trait PubSubTransport: Send + Sync {
    /// 发布到指定 topic，不等待消费确认
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<()>;

    /// 按一组通配符 pattern 订阅（`*` 匹配任意字符序列）
    async fn subscribe_pattern(&self, patterns: &[String]) -> Result<EventStream>;
}

/// Redis PSUBSCRIBE 风格的 glob 匹配（只支持 `*` 和 `?`）
pub fn topic_matches(pattern: &str, topic: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = topic.chars().collect();

    let (mut pi, mut ti) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut mark = 0usize;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            mark = ti;
            pi += 1;
        } else if let Some(s) = star {
            pi = s + 1;
            mark += 1;
            ti = mark;
        } else {
            return false;
        }
    }

    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_matches() {
        assert!(topic_matches("events:friend:*", "events:friend:request-sent"));
        assert!(topic_matches("events:character:level-up:*", "events:character:level-up:42"));
        assert!(!topic_matches("events:character:level-up:*", "events:character:level-up"));
        assert!(!topic_matches("events:friend:*", "events:guild:created"));
        assert!(topic_matches("events:*:created", "events:guild:created"));
        assert!(topic_matches("*", "anything"));
        assert!(topic_matches("a?c", "abc"));
        assert!(!topic_matches("abc", "abcd"));
    }
}
