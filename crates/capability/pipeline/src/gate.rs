use domain::{DecodedValue, PublishPolicy};
use tokio::time::Instant;

/// 单个设备的发布新鲜度判定（状态归读取任务独占）。
#[derive(Debug, Clone)]
pub struct PublishGate {
    policy: PublishPolicy,
    last: Option<(DecodedValue, Instant)>,
}

impl PublishGate {
    pub fn new(policy: PublishPolicy) -> Self {
        Self { policy, last: None }
    }

    pub fn policy(&self) -> PublishPolicy {
        self.policy
    }

    /// 是否需要投递本次读取到的值。
    pub fn should_forward(&self, value: &DecodedValue, now: Instant) -> bool {
        let Some((last_value, last_at)) = &self.last else {
            return true;
        };
        match self.policy {
            PublishPolicy::Always => true,
            PublishPolicy::OnChange => last_value != value,
            PublishPolicy::OnChangeOrRefresh(interval) => {
                last_value != value || now.saturating_duration_since(*last_at) >= interval
            }
        }
    }

    /// 值已成功投递到通道后调用。
    pub fn mark_forwarded(&mut self, value: DecodedValue, now: Instant) {
        self.last = Some((value, now));
    }
}
