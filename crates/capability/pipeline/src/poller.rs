use crate::PipelineError;
use crate::counter::SweepCounter;
use crate::gate::PublishGate;
use domain::{Device, DeviceClass, OutboundMessage, PublishPolicy};
use plcgw_protocol::{RegisterReader, decode};
use plcgw_registry::{DeviceRegistry, IntegrityError};
use plcgw_telemetry::{
    record_backpressure, record_decode_failure, record_message_enqueued,
    record_message_suppressed, record_read_failure, record_read_ok, record_sweep_completed,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 轮询参数
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// 读取或解码失败后的重试间隔
    pub retry_backoff: Duration,
    /// 同一设备两次读取之间的间隔（0 表示不等待）
    pub poll_interval: Duration,
    /// 各设备类别的发布策略；未配置的类别按 `Always` 处理
    pub policies: HashMap<DeviceClass, PublishPolicy>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            retry_backoff: Duration::from_secs(1),
            poll_interval: Duration::from_secs(1),
            policies: HashMap::new(),
        }
    }
}

impl PollerConfig {
    pub fn policy_for(&self, class: DeviceClass) -> PublishPolicy {
        self.policies
            .get(&class)
            .copied()
            .unwrap_or(PublishPolicy::Always)
    }
}

/// 读取任务共享的只读上下文。
struct ReaderContext {
    registry: Arc<DeviceRegistry>,
    reader: Arc<dyn RegisterReader>,
    config: PollerConfig,
    counter: SweepCounter,
}

/// 轮询流水线
pub struct Poller {
    ctx: Arc<ReaderContext>,
}

impl Poller {
    pub fn new(
        registry: Arc<DeviceRegistry>,
        reader: Arc<dyn RegisterReader>,
        config: PollerConfig,
    ) -> Self {
        let counter = SweepCounter::new(registry.len());
        Self {
            ctx: Arc::new(ReaderContext {
                registry,
                reader,
                config,
                counter,
            }),
        }
    }

    /// 为每个设备启动读取任务，直到取消或完整性校验失败。
    ///
    /// 返回时所有读取任务都已退出，`sender` 的全部副本均已释放。
    pub async fn run(
        self,
        sender: mpsc::Sender<OutboundMessage>,
        token: CancellationToken,
    ) -> Result<(), PipelineError> {
        let mut tasks = JoinSet::new();
        for device in self.ctx.registry.devices().iter().cloned() {
            tasks.spawn(poll_device(
                self.ctx.clone(),
                device,
                sender.clone(),
                token.clone(),
            ));
        }
        drop(sender);
        info!(
            target: "plcgw.pipeline",
            devices = self.ctx.registry.len(),
            "pipeline_started"
        );

        let mut outcome = Ok(());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    if outcome.is_ok() {
                        outcome = Err(PipelineError::Integrity(err));
                    }
                }
                Err(err) => {
                    error!(target: "plcgw.pipeline", "reader task failed: {}", err);
                    token.cancel();
                    if outcome.is_ok() {
                        outcome = Err(PipelineError::Task(err.to_string()));
                    }
                }
            }
        }
        info!(target: "plcgw.pipeline", "pipeline_stopped");
        outcome
    }
}

async fn poll_device(
    ctx: Arc<ReaderContext>,
    device: Device,
    sender: mpsc::Sender<OutboundMessage>,
    token: CancellationToken,
) -> Result<(), IntegrityError> {
    let address = device.address();
    let mut gate = PublishGate::new(ctx.config.policy_for(device.class));
    let offset = i64::from(device.number);
    let count = i64::from(device.width);

    while !token.is_cancelled() {
        let raw = match ctx.reader.read(&device.tag, offset, count).await {
            Ok(raw) => {
                record_read_ok();
                raw
            }
            Err(err) => {
                record_read_failure();
                warn!(
                    target: "plcgw.pipeline",
                    device = %address,
                    error = %err,
                    "plc_read_failed"
                );
                if !pause(&token, ctx.config.retry_backoff).await {
                    break;
                }
                continue;
            }
        };

        let value = match decode(&raw, device.width) {
            Ok(value) => value,
            Err(err) => {
                record_decode_failure();
                warn!(
                    target: "plcgw.pipeline",
                    device = %address,
                    error = %err,
                    "register_decode_failed"
                );
                if !pause(&token, ctx.config.retry_backoff).await {
                    break;
                }
                continue;
            }
        };

        let now = Instant::now();
        if gate.should_forward(&value, now) {
            let message = OutboundMessage::new(address.clone(), value.clone());
            if !forward(&sender, message, &token).await {
                break;
            }
            gate.mark_forwarded(value, now);
            record_message_enqueued();
        } else {
            record_message_suppressed();
            debug!(target: "plcgw.pipeline", device = %address, "value_unchanged");
        }

        if ctx.counter.record() {
            record_sweep_completed();
            info!(
                target: "plcgw.pipeline",
                devices = ctx.counter.len(),
                "sweep_completed"
            );
            if let Err(err) = ctx.registry.verify_integrity() {
                error!(target: "plcgw.pipeline", error = %err, "integrity_check_failed");
                token.cancel();
                return Err(err);
            }
        }

        if !pause(&token, ctx.config.poll_interval).await {
            break;
        }
    }
    debug!(target: "plcgw.pipeline", device = %address, "reader_stopped");
    Ok(())
}

/// 投递到通道；通道已满时等待，等待期间可被取消。返回 `false` 表示应退出。
async fn forward(
    sender: &mpsc::Sender<OutboundMessage>,
    message: OutboundMessage,
    token: &CancellationToken,
) -> bool {
    let message = match sender.try_send(message) {
        Ok(()) => return true,
        Err(TrySendError::Closed(message)) => {
            warn!(target: "plcgw.pipeline", device = %message.address, "publish_queue_closed");
            return false;
        }
        Err(TrySendError::Full(message)) => message,
    };
    record_backpressure();
    debug!(target: "plcgw.pipeline", device = %message.address, "publish_queue_full");
    tokio::select! {
        biased;
        _ = token.cancelled() => false,
        sent = sender.send(message) => match sent {
            Ok(()) => true,
            Err(err) => {
                warn!(target: "plcgw.pipeline", device = %err.0.address, "publish_queue_closed");
                false
            }
        },
    }
}

/// 可取消的等待。返回 `false` 表示已取消。
async fn pause(token: &CancellationToken, duration: Duration) -> bool {
    if duration.is_zero() {
        tokio::task::yield_now().await;
        return !token.is_cancelled();
    }
    tokio::select! {
        _ = token.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
