use crate::{PublishError, Publisher};
use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS,
};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// MQTT 发布配置
#[derive(Debug, Clone)]
pub struct MqttPublisherConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: String,
    /// 等待 CONNACK 的上限
    pub connect_timeout: Duration,
}

/// MQTT 发布实现（QoS 0，不保留）。
///
/// 发布不等待：客户端请求队列已满时直接返回 [`PublishError::Publish`]。
pub struct MqttPublisher {
    client: AsyncClient,
    eventloop: Mutex<Option<JoinHandle<()>>>,
}

impl MqttPublisher {
    /// 连接 broker 并等待 CONNACK，随后在后台任务中驱动事件循环。
    pub async fn connect(config: MqttPublisherConfig) -> Result<Self, PublishError> {
        let mut options =
            MqttOptions::new(config.client_id.clone(), config.host.clone(), config.port);
        options.set_keep_alive(Duration::from_secs(30));
        options.set_clean_session(true);
        if let (Some(username), Some(password)) = (config.username, config.password) {
            options.set_credentials(username, password);
        }
        let (client, mut eventloop) = AsyncClient::new(options, 10);

        match tokio::time::timeout(config.connect_timeout, wait_for_connack(&mut eventloop)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => return Err(err),
            Err(_) => {
                return Err(PublishError::Connect(format!(
                    "{}:{}: no CONNACK within {:?}",
                    config.host, config.port, config.connect_timeout
                )));
            }
        }
        info!(
            target: "plcgw.publish",
            host = %config.host,
            port = config.port,
            client_id = %config.client_id,
            "mqtt_connected"
        );

        let handle = tokio::spawn(drive_eventloop(eventloop));
        Ok(Self {
            client,
            eventloop: Mutex::new(Some(handle)),
        })
    }

    /// 发送 DISCONNECT 并等待事件循环任务结束。
    pub async fn disconnect(&self, timeout: Duration) -> Result<(), PublishError> {
        let Some(mut handle) = self.eventloop.lock().await.take() else {
            return Ok(());
        };
        if let Err(err) = self.client.try_disconnect() {
            handle.abort();
            return Err(PublishError::Disconnect(err.to_string()));
        }
        if tokio::time::timeout(timeout, &mut handle).await.is_err() {
            handle.abort();
            return Err(PublishError::Disconnect(format!(
                "event loop still running after {:?}",
                timeout
            )));
        }
        info!(target: "plcgw.publish", "mqtt_disconnected");
        Ok(())
    }
}

#[async_trait]
impl Publisher for MqttPublisher {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError> {
        self.client
            .try_publish(topic, QoS::AtMostOnce, false, payload)
            .map_err(|err| PublishError::Publish(err.to_string()))
    }
}

async fn wait_for_connack(eventloop: &mut EventLoop) -> Result<(), PublishError> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    return Ok(());
                }
                return Err(PublishError::Connect(format!("rejected: {:?}", ack.code)));
            }
            Ok(_) => {}
            Err(err) => return Err(PublishError::Connect(err.to_string())),
        }
    }
}

async fn drive_eventloop(mut eventloop: EventLoop) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
            Ok(_) => {}
            Err(err) => {
                warn!(target: "plcgw.publish", "mqtt eventloop error: {}", err);
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}
