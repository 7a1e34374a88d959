//! 日志初始化与进程级采集指标。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 指标快照。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub reads_ok: u64,
    pub read_failures: u64,
    pub decode_failures: u64,
    pub messages_enqueued: u64,
    pub messages_suppressed: u64,
    pub backpressure: u64,
    pub publish_success: u64,
    pub publish_failure: u64,
    pub encode_failure: u64,
    pub sweeps_completed: u64,
}

/// 采集与发布计数器。
pub struct TelemetryMetrics {
    reads_ok: AtomicU64,
    read_failures: AtomicU64,
    decode_failures: AtomicU64,
    messages_enqueued: AtomicU64,
    messages_suppressed: AtomicU64,
    backpressure: AtomicU64,
    publish_success: AtomicU64,
    publish_failure: AtomicU64,
    encode_failure: AtomicU64,
    sweeps_completed: AtomicU64,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            reads_ok: AtomicU64::new(0),
            read_failures: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            messages_enqueued: AtomicU64::new(0),
            messages_suppressed: AtomicU64::new(0),
            backpressure: AtomicU64::new(0),
            publish_success: AtomicU64::new(0),
            publish_failure: AtomicU64::new(0),
            encode_failure: AtomicU64::new(0),
            sweeps_completed: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            reads_ok: self.reads_ok.load(Ordering::Relaxed),
            read_failures: self.read_failures.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            messages_enqueued: self.messages_enqueued.load(Ordering::Relaxed),
            messages_suppressed: self.messages_suppressed.load(Ordering::Relaxed),
            backpressure: self.backpressure.load(Ordering::Relaxed),
            publish_success: self.publish_success.load(Ordering::Relaxed),
            publish_failure: self.publish_failure.load(Ordering::Relaxed),
            encode_failure: self.encode_failure.load(Ordering::Relaxed),
            sweeps_completed: self.sweeps_completed.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

static METRICS: OnceLock<TelemetryMetrics> = OnceLock::new();

/// 获取全局指标实例。
pub fn metrics() -> &'static TelemetryMetrics {
    METRICS.get_or_init(TelemetryMetrics::new)
}

/// 初始化 tracing（默认 info）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 记录 PLC 读取成功次数。
pub fn record_read_ok() {
    metrics().reads_ok.fetch_add(1, Ordering::Relaxed);
}

/// 记录 PLC 读取失败次数（连接失败或 I/O 错误）。
pub fn record_read_failure() {
    metrics().read_failures.fetch_add(1, Ordering::Relaxed);
}

/// 记录解码失败次数。
pub fn record_decode_failure() {
    metrics().decode_failures.fetch_add(1, Ordering::Relaxed);
}

/// 记录投递到发布通道的消息数。
pub fn record_message_enqueued() {
    metrics().messages_enqueued.fetch_add(1, Ordering::Relaxed);
}

/// 记录因值未变化而未投递的次数。
pub fn record_message_suppressed() {
    metrics().messages_suppressed.fetch_add(1, Ordering::Relaxed);
}

/// 记录通道已满、读取任务需等待的次数。
pub fn record_backpressure() {
    metrics().backpressure.fetch_add(1, Ordering::Relaxed);
}

/// 记录发布成功次数。
pub fn record_publish_success() {
    metrics().publish_success.fetch_add(1, Ordering::Relaxed);
}

/// 记录发布失败次数。
pub fn record_publish_failure() {
    metrics().publish_failure.fetch_add(1, Ordering::Relaxed);
}

/// 记录 JSON 编码失败次数。
pub fn record_encode_failure() {
    metrics().encode_failure.fetch_add(1, Ordering::Relaxed);
}

/// 记录完成的轮询周期数。
pub fn record_sweep_completed() {
    metrics().sweeps_completed.fetch_add(1, Ordering::Relaxed);
}
