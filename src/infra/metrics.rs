//! Prometheus 指标：审核检查量、违规量、自动禁言、订阅者事件处理结果
//!
//! 通过 `init()` 安装全局 Recorder，并在 `listen_addr` 上暴露 HTTP 抓取端点。
//! 未初始化时 `record_*` 调用是空操作。

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// 指标名称
const COUNTER_MESSAGES_CHECKED: &str = "social_moderation_messages_checked_total";
const COUNTER_VIOLATIONS: &str = "social_moderation_violations_total";
const COUNTER_AUTO_BANS: &str = "social_moderation_auto_bans_total";
const COUNTER_SUBSCRIBER_EVENTS: &str = "social_subscriber_events_total";

/// 初始化 Prometheus 指标。仅需在进程内调用一次；重复调用会返回 Err。
pub fn init(listen_addr: SocketAddr) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    PrometheusBuilder::new()
        .with_http_listener(listen_addr)
        .install()?;
    Ok(())
}

/// 记录一次消息审核
pub fn record_message_checked() {
    metrics::counter!(COUNTER_MESSAGES_CHECKED).increment(1);
}

/// 记录一次内容违规
pub fn record_violation() {
    metrics::counter!(COUNTER_VIOLATIONS).increment(1);
}

/// 记录一次自动禁言（kind: spam / severe）
pub fn record_auto_ban(kind: &'static str) {
    metrics::counter!(COUNTER_AUTO_BANS, "kind" => kind).increment(1);
}

/// 记录订阅者处理一条事件的结果
pub fn record_subscriber_event(consumer: &'static str, outcome: &'static str) {
    metrics::counter!(COUNTER_SUBSCRIBER_EVENTS, "consumer" => consumer, "outcome" => outcome)
        .increment(1);
}
