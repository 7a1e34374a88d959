//! 网关生命周期
//!
//! ```text
//! Starting ──▶ Running ──▶ Draining ──▶ Terminated
//! ```
//!
//! Draining 的顺序固定：读取任务退出 → 通道关闭 → 发布任务取空通道后退出，
//! 随后由调用方断开 broker、关闭 PLC 连接。发布任务的取空受 `drain_timeout` 限制，
//! 超时后剩余任务被中止。

use domain::OutboundMessage;
use plcgw_pipeline::{PipelineError, Poller, PollerConfig};
use plcgw_protocol::RegisterReader;
use plcgw_publish::{Publisher, spawn_workers};
use plcgw_registry::DeviceRegistry;
use plcgw_telemetry::metrics;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// 生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Starting,
    Running,
    Draining,
    Terminated,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::Draining => "draining",
            LifecycleState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// 运行结束后的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// 收到停机信号，正常退出
    Stopped,
    /// 完整性校验失败，需要重新拉起进程
    Restart,
}

/// 运行期参数
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub workers: usize,
    pub queue_capacity: usize,
    pub topic_prefix: String,
    pub poller: PollerConfig,
    /// 等待发布任务取空通道的上限
    pub drain_timeout: Duration,
}

pub struct Supervisor {
    state: LifecycleState,
}

impl Supervisor {
    pub fn new() -> Self {
        info!(target: "plcgw.lifecycle", state = %LifecycleState::Starting, "lifecycle_transition");
        Self {
            state: LifecycleState::Starting,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    fn transition(&mut self, next: LifecycleState) {
        info!(
            target: "plcgw.lifecycle",
            from = %self.state,
            to = %next,
            "lifecycle_transition"
        );
        self.state = next;
    }

    /// 运行流水线与发布工作池，直到 `shutdown` 完成或流水线自行终止。
    ///
    /// 返回时读取任务与发布任务均已退出。
    pub async fn run<S>(
        &mut self,
        registry: Arc<DeviceRegistry>,
        reader: Arc<dyn RegisterReader>,
        publisher: Arc<dyn Publisher>,
        settings: &GatewaySettings,
        shutdown: S,
    ) -> RunOutcome
    where
        S: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let (sender, receiver) = mpsc::channel::<OutboundMessage>(settings.queue_capacity);
        let workers = spawn_workers(
            settings.workers,
            Arc::new(Mutex::new(receiver)),
            publisher,
            settings.topic_prefix.clone(),
        );
        let poller = Poller::new(registry, reader, settings.poller.clone());

        let watcher = {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = shutdown => {
                        info!(target: "plcgw.lifecycle", "shutdown_requested");
                        token.cancel();
                    }
                    _ = token.cancelled() => {}
                }
            })
        };

        self.transition(LifecycleState::Running);
        let result = poller.run(sender, token.clone()).await;
        self.transition(LifecycleState::Draining);

        token.cancel();
        if let Err(err) = watcher.await {
            warn!(target: "plcgw.lifecycle", "shutdown watcher failed: {}", err);
        }

        let outcome = match result {
            Ok(()) => RunOutcome::Stopped,
            Err(PipelineError::Integrity(err)) => {
                warn!(target: "plcgw.lifecycle", error = %err, "restart_scheduled");
                RunOutcome::Restart
            }
            Err(err) => {
                error!(target: "plcgw.lifecycle", error = %err, "pipeline_failed");
                RunOutcome::Stopped
            }
        };

        match tokio::time::timeout(settings.drain_timeout, workers.join()).await {
            Ok(()) => info!(target: "plcgw.lifecycle", "publish_queue_drained"),
            Err(_) => warn!(
                target: "plcgw.lifecycle",
                timeout = ?settings.drain_timeout,
                "publish_drain_timed_out"
            ),
        }
        outcome
    }

    /// 进入终止状态并输出指标快照。
    pub fn terminate(&mut self) {
        self.transition(LifecycleState::Terminated);
        let snapshot = metrics().snapshot();
        info!(
            target: "plcgw.lifecycle",
            reads_ok = snapshot.reads_ok,
            read_failures = snapshot.read_failures,
            decode_failures = snapshot.decode_failures,
            messages_enqueued = snapshot.messages_enqueued,
            messages_suppressed = snapshot.messages_suppressed,
            backpressure = snapshot.backpressure,
            publish_success = snapshot.publish_success,
            publish_failure = snapshot.publish_failure,
            encode_failure = snapshot.encode_failure,
            sweeps_completed = snapshot.sweeps_completed,
            "metrics_snapshot"
        );
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use domain::{DeviceClass, PublishPolicy};
    use plcgw_protocol::frame::{READ_REQUEST_LEN, Station, encode_response, parse_read_request};
    use plcgw_protocol::{McClient, McClientConfig};
    use plcgw_publish::PublishError;
    use std::collections::HashMap;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    #[derive(Default)]
    struct RecordingPublisher {
        published: std::sync::Mutex<Vec<(String, String)>>,
    }

    impl RecordingPublisher {
        fn published(&self) -> Vec<(String, String)> {
            self.published.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Publisher for RecordingPublisher {
        async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError> {
            self.published
                .lock()
                .unwrap()
                .push((topic.to_string(), String::from_utf8(payload).unwrap()));
            Ok(())
        }
    }

    /// 发布永不完成，用于验证取空上限。
    struct StalledPublisher;

    #[async_trait]
    impl Publisher for StalledPublisher {
        async fn publish(&self, _topic: &str, _payload: Vec<u8>) -> Result<(), PublishError> {
            std::future::pending().await
        }
    }

    type RequestCounts = Arc<std::sync::Mutex<HashMap<u32, usize>>>;

    /// 模拟 PLC：按起始地址返回固定载荷，并按起始地址计数请求。
    async fn spawn_mock_plc(values: HashMap<u32, Vec<u8>>) -> (u16, RequestCounts) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let values = Arc::new(values);
        let counts = RequestCounts::default();
        let served = counts.clone();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let values = values.clone();
                let served = served.clone();
                tokio::spawn(async move {
                    let mut request = [0u8; READ_REQUEST_LEN];
                    while socket.read_exact(&mut request).await.is_ok() {
                        let parsed = parse_read_request(&request).unwrap();
                        *served
                            .lock()
                            .unwrap()
                            .entry(parsed.head_device)
                            .or_default() += 1;
                        let mut data = values
                            .get(&parsed.head_device)
                            .cloned()
                            .unwrap_or_default();
                        data.resize(parsed.points as usize * 2, 0);
                        let response = encode_response(&Station::local(), 0, &data);
                        if socket.write_all(&response).await.is_err() {
                            return;
                        }
                    }
                });
            }
        });
        (port, counts)
    }

    fn settings(policy: PublishPolicy) -> GatewaySettings {
        GatewaySettings {
            workers: 2,
            queue_capacity: 2,
            topic_prefix: "testplc/holding_register/16bit&32bit".to_string(),
            poller: PollerConfig {
                retry_backoff: Duration::from_millis(10),
                poll_interval: Duration::from_millis(10),
                policies: HashMap::from([
                    (DeviceClass::Word, policy),
                    (DeviceClass::Float, policy),
                ]),
            },
            drain_timeout: Duration::from_secs(2),
        }
    }

    async fn wait_until<F: Fn() -> bool>(condition: F) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition reached");
    }

    async fn run_gateway(
        lists: Vec<(DeviceClass, &'static str)>,
        values: HashMap<u32, Vec<u8>>,
        policy: PublishPolicy,
        stop_when: impl Fn(&RecordingPublisher, &HashMap<u32, usize>) -> bool,
    ) -> (Supervisor, RunOutcome, Vec<(String, String)>) {
        let (port, counts) = spawn_mock_plc(values).await;
        let registry = Arc::new(
            DeviceRegistry::from_lists(lists.into_iter().map(|(class, list)| (class, Some(list))))
                .unwrap(),
        );
        let client = Arc::new(
            McClient::connect(McClientConfig::new("127.0.0.1", port))
                .await
                .unwrap(),
        );
        let publisher = Arc::new(RecordingPublisher::default());
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let mut supervisor = Supervisor::new();
        let run = {
            let publisher = publisher.clone();
            let client = client.clone();
            let settings = settings(policy);
            async move {
                let outcome = supervisor
                    .run(registry, client, publisher, &settings, async move {
                        let _ = stop_rx.await;
                    })
                    .await;
                (supervisor, outcome)
            }
        };
        let handle = tokio::spawn(run);

        wait_until(|| stop_when(publisher.as_ref(), &counts.lock().unwrap())).await;
        stop_tx.send(()).unwrap();
        let (mut supervisor, outcome) = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("gateway drains")
            .unwrap();
        client.close().await.unwrap();
        supervisor.terminate();
        (supervisor, outcome, publisher.published())
    }

    #[tokio::test]
    async fn word_register_is_published_as_json_number() {
        let (supervisor, outcome, published) = run_gateway(
            vec![(DeviceClass::Word, "D,100,1")],
            HashMap::from([(100, vec![0x34, 0x12])]),
            PublishPolicy::Always,
            |publisher, _| !publisher.published().is_empty(),
        )
        .await;

        assert_eq!(outcome, RunOutcome::Stopped);
        assert_eq!(supervisor.state(), LifecycleState::Terminated);
        assert_eq!(
            published[0],
            (
                "testplc/holding_register/16bit&32bit/D100".to_string(),
                r#"{"address":"D100","value":4660}"#.to_string()
            )
        );
    }

    #[tokio::test]
    async fn float_register_is_published_as_truncated_string() {
        let (_, _, published) = run_gateway(
            vec![(DeviceClass::Float, "D,200,2")],
            HashMap::from([(200, 3.141_592_65_f32.to_le_bytes().to_vec())]),
            PublishPolicy::OnChange,
            |publisher, _| !publisher.published().is_empty(),
        )
        .await;

        assert_eq!(
            published,
            vec![(
                "testplc/holding_register/16bit&32bit/D200".to_string(),
                r#"{"address":"D200","value":"3.14159"}"#.to_string()
            )]
        );
    }

    #[tokio::test]
    async fn unchanged_values_are_published_once_per_device() {
        let (_, outcome, published) = run_gateway(
            vec![
                (DeviceClass::Word, "D,1,1,D,2,1"),
                (DeviceClass::Float, "D,10,2"),
            ],
            HashMap::from([
                (1, vec![0x01, 0x00]),
                (2, vec![0x02, 0x00]),
                (10, 1.5_f32.to_le_bytes().to_vec()),
            ]),
            PublishPolicy::OnChange,
            |publisher, counts| {
                publisher.published().len() == 3
                    && [1, 2, 10]
                        .iter()
                        .all(|head| counts.get(head).copied().unwrap_or(0) >= 3)
            },
        )
        .await;

        assert_eq!(outcome, RunOutcome::Stopped);
        let mut payloads: Vec<String> = published.into_iter().map(|(_, payload)| payload).collect();
        payloads.sort();
        assert_eq!(
            payloads,
            vec![
                r#"{"address":"D1","value":1}"#.to_string(),
                r#"{"address":"D10","value":"1.50000"}"#.to_string(),
                r#"{"address":"D2","value":2}"#.to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn integrity_failure_schedules_restart() {
        let (port, _) = spawn_mock_plc(HashMap::from([(1, vec![0x07, 0x00])])).await;
        let registry = Arc::new(DeviceRegistry::from_parts(
            vec![domain::Device::new("D", 1, 1, DeviceClass::Word)],
            vec![(DeviceClass::Word, 2)],
        ));
        let client = Arc::new(
            McClient::connect(McClientConfig::new("127.0.0.1", port))
                .await
                .unwrap(),
        );
        let publisher = Arc::new(RecordingPublisher::default());

        let mut supervisor = Supervisor::new();
        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            supervisor.run(
                registry,
                client.clone(),
                publisher.clone(),
                &settings(PublishPolicy::Always),
                std::future::pending(),
            ),
        )
        .await
        .expect("gateway stops without a shutdown signal");
        client.close().await.unwrap();

        assert_eq!(outcome, RunOutcome::Restart);
        assert_eq!(supervisor.state(), LifecycleState::Draining);
        assert_eq!(
            publisher.published(),
            vec![(
                "testplc/holding_register/16bit&32bit/D1".to_string(),
                r#"{"address":"D1","value":7}"#.to_string()
            )]
        );
    }

    #[tokio::test]
    async fn stalled_publisher_does_not_block_shutdown() {
        let (port, counts) = spawn_mock_plc(HashMap::from([(1, vec![0x01, 0x00])])).await;
        let registry = Arc::new(
            DeviceRegistry::from_lists([(DeviceClass::Word, Some("D,1,1"))]).unwrap(),
        );
        let client = Arc::new(
            McClient::connect(McClientConfig::new("127.0.0.1", port))
                .await
                .unwrap(),
        );
        let mut settings = settings(PublishPolicy::Always);
        settings.drain_timeout = Duration::from_millis(200);
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let mut supervisor = Supervisor::new();
        let run = supervisor.run(
            registry,
            client.clone(),
            Arc::new(StalledPublisher),
            &settings,
            async move {
                let _ = stop_rx.await;
            },
        );
        let stop = async {
            // 两个发布任务卡住且通道已满后才请求停机
            wait_until(|| counts.lock().unwrap().get(&1).copied().unwrap_or(0) >= 4).await;
            stop_tx.send(()).unwrap();
        };
        let (outcome, ()) = tokio::time::timeout(Duration::from_secs(5), async {
            tokio::join!(run, stop)
        })
        .await
        .expect("drain is bounded");
        client.close().await.unwrap();

        assert_eq!(outcome, RunOutcome::Stopped);
    }

    #[test]
    fn test_state_names() {
        assert_eq!(LifecycleState::Draining.to_string(), "draining");
        assert_eq!(LifecycleState::Terminated.to_string(), "terminated");
    }
}
