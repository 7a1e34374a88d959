//! # 发布能力模块
//!
//! 固定数量的工作任务共享同一个通道接收端，把 [`OutboundMessage`] 编码为 JSON
//! 并发布到 `{prefix}/{address}`。投递语义为至多一次：失败只记录日志与指标，不重试。
//!
//! [`OutboundMessage`]: domain::OutboundMessage

mod mqtt;
mod worker;

pub use mqtt::{MqttPublisher, MqttPublisherConfig};
pub use worker::{WorkerPool, spawn_workers, topic_for};

use async_trait::async_trait;

/// 发布错误。
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// 启动期连接 broker 失败（致命）。
    #[error("broker connect failed: {0}")]
    Connect(String),
    #[error("publish failed: {0}")]
    Publish(String),
    #[error("disconnect failed: {0}")]
    Disconnect(String),
}

/// 消息发布抽象。
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError>;
}
