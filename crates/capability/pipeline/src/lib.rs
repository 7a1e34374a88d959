//! # 轮询流水线能力模块
//!
//! 每个设备一个读取任务，循环执行 读取 → 解码 → 新鲜度判定 → 投递。
//!
//! ```text
//! Device[0] ─┐
//! Device[1] ─┼─ RegisterReader（共享单连接）→ decode → PublishGate → mpsc::Sender
//! Device[n] ─┘                                                        │
//!                                                       SweepCounter ─┘ 周期完成 → 完整性校验
//! ```
//!
//! 停机通过 [`CancellationToken`](tokio_util::sync::CancellationToken) 协作完成：
//! 读取任务只在两次尝试之间观察取消信号，正在进行的 PLC 读取不会被打断。
//! 所有读取任务退出后发送端全部释放，通道随之关闭。

mod counter;
mod gate;
mod poller;

pub use counter::SweepCounter;
pub use gate::PublishGate;
pub use plcgw_registry::IntegrityError;
pub use poller::{Poller, PollerConfig};

/// 流水线运行结果中的错误。
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 周期边界完整性校验失败，进程需要自重启。
    #[error(transparent)]
    Integrity(#[from] IntegrityError),
    #[error("reader task failed: {0}")]
    Task(String),
}
