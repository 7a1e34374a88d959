use crate::Publisher;
use domain::OutboundMessage;
use plcgw_telemetry::{record_encode_failure, record_publish_failure, record_publish_success};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// `{prefix}/{address}`
pub fn topic_for(prefix: &str, address: &str) -> String {
    format!("{}/{}", prefix.trim_end_matches('/'), address)
}

/// 已启动的发布工作任务集合。
pub struct WorkerPool {
    tasks: JoinSet<()>,
}

impl WorkerPool {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// 等待所有工作任务退出（通道关闭且已取空）。
    pub async fn join(mut self) {
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(err) = joined {
                error!(target: "plcgw.publish", "publish worker failed: {}", err);
            }
        }
    }
}

/// 启动 `count` 个共享同一接收端的发布任务。
pub fn spawn_workers(
    count: usize,
    receiver: Arc<Mutex<mpsc::Receiver<OutboundMessage>>>,
    publisher: Arc<dyn Publisher>,
    topic_prefix: impl Into<String>,
) -> WorkerPool {
    let topic_prefix: Arc<str> = Arc::from(topic_prefix.into());
    let mut tasks = JoinSet::new();
    for worker in 0..count {
        tasks.spawn(run_worker(
            worker,
            receiver.clone(),
            publisher.clone(),
            topic_prefix.clone(),
        ));
    }
    info!(target: "plcgw.publish", workers = count, "publish_workers_started");
    WorkerPool { tasks }
}

async fn run_worker(
    worker: usize,
    receiver: Arc<Mutex<mpsc::Receiver<OutboundMessage>>>,
    publisher: Arc<dyn Publisher>,
    topic_prefix: Arc<str>,
) {
    loop {
        let message = receiver.lock().await.recv().await;
        let Some(message) = message else {
            break;
        };
        publish_message(worker, publisher.as_ref(), &topic_prefix, &message).await;
    }
    debug!(target: "plcgw.publish", worker, "publish_worker_stopped");
}

async fn publish_message(
    worker: usize,
    publisher: &dyn Publisher,
    topic_prefix: &str,
    message: &OutboundMessage,
) {
    let payload = match serde_json::to_vec(message) {
        Ok(payload) => payload,
        Err(err) => {
            record_encode_failure();
            warn!(
                target: "plcgw.publish",
                worker,
                address = %message.address,
                error = %err,
                "message_encode_failed"
            );
            return;
        }
    };
    let topic = topic_for(topic_prefix, &message.address);
    match publisher.publish(&topic, payload).await {
        Ok(()) => {
            record_publish_success();
            debug!(
                target: "plcgw.publish",
                worker,
                topic = %topic,
                value = %message.value,
                "message_published"
            );
        }
        Err(err) => {
            record_publish_failure();
            warn!(
                target: "plcgw.publish",
                worker,
                topic = %topic,
                error = %err,
                "message_publish_failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_for_joins_prefix_and_address() {
        assert_eq!(
            topic_for("testplc/holding_register/16bit&32bit", "D100"),
            "testplc/holding_register/16bit&32bit/D100"
        );
        assert_eq!(topic_for("plant/", "M7"), "plant/M7");
    }
}
