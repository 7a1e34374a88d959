use async_trait::async_trait;
use domain::{DecodedValue, OutboundMessage};
use plcgw_publish::{MqttPublisher, MqttPublisherConfig, PublishError, Publisher, spawn_workers};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{Mutex, mpsc};

/// 记录所有发布；`fail_every` 非零时每第 n 次发布失败。
#[derive(Default)]
struct RecordingPublisher {
    published: std::sync::Mutex<Vec<(String, String)>>,
    attempts: AtomicUsize,
    fail_every: usize,
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_every != 0 && attempt % self.fail_every == 0 {
            return Err(PublishError::Publish("broker unavailable".to_string()));
        }
        let payload = String::from_utf8(payload).expect("utf8 payload");
        self.published
            .lock()
            .unwrap()
            .push((topic.to_string(), payload));
        Ok(())
    }
}

fn shared(rx: mpsc::Receiver<OutboundMessage>) -> Arc<Mutex<mpsc::Receiver<OutboundMessage>>> {
    Arc::new(Mutex::new(rx))
}

#[tokio::test]
async fn workers_publish_json_to_address_topic() {
    let publisher = Arc::new(RecordingPublisher::default());
    let (tx, rx) = mpsc::channel(4);
    let pool = spawn_workers(3, shared(rx), publisher.clone(), "plant/line1");
    assert_eq!(pool.len(), 3);

    tx.send(OutboundMessage::new("D100", DecodedValue::UInt16(4660)))
        .await
        .unwrap();
    tx.send(OutboundMessage::new(
        "D200",
        DecodedValue::FloatDigits("3.14159".to_string()),
    ))
    .await
    .unwrap();
    drop(tx);
    tokio::time::timeout(Duration::from_secs(5), pool.join())
        .await
        .expect("workers exit after channel closes");

    let mut published = publisher.published.lock().unwrap().clone();
    published.sort();
    assert_eq!(
        published,
        vec![
            (
                "plant/line1/D100".to_string(),
                r#"{"address":"D100","value":4660}"#.to_string()
            ),
            (
                "plant/line1/D200".to_string(),
                r#"{"address":"D200","value":"3.14159"}"#.to_string()
            ),
        ]
    );
}

#[tokio::test]
async fn publish_failure_does_not_stop_worker() {
    let publisher = Arc::new(RecordingPublisher {
        fail_every: 2,
        ..Default::default()
    });
    let (tx, rx) = mpsc::channel(16);
    let pool = spawn_workers(1, shared(rx), publisher.clone(), "plant");

    for number in 0..6u16 {
        tx.send(OutboundMessage::new(
            format!("D{}", number),
            DecodedValue::UInt16(number),
        ))
        .await
        .unwrap();
    }
    drop(tx);
    tokio::time::timeout(Duration::from_secs(5), pool.join())
        .await
        .expect("worker drains");

    assert_eq!(publisher.attempts.load(Ordering::SeqCst), 6);
    let topics: Vec<String> = publisher
        .published
        .lock()
        .unwrap()
        .iter()
        .map(|(topic, _)| topic.clone())
        .collect();
    assert_eq!(topics, vec!["plant/D0", "plant/D2", "plant/D4"]);
}

#[tokio::test]
async fn workers_drain_queued_messages_before_exit() {
    let publisher = Arc::new(RecordingPublisher::default());
    let (tx, rx) = mpsc::channel(32);
    for number in 0..20u16 {
        tx.send(OutboundMessage::new(format!("M{}", number), DecodedValue::Bit(1)))
            .await
            .unwrap();
    }
    drop(tx);

    let pool = spawn_workers(4, shared(rx), publisher.clone(), "plant");
    tokio::time::timeout(Duration::from_secs(5), pool.join())
        .await
        .expect("workers drain");
    assert_eq!(publisher.published.lock().unwrap().len(), 20);
}

fn broker_config(port: u16) -> MqttPublisherConfig {
    MqttPublisherConfig {
        host: "127.0.0.1".to_string(),
        port,
        username: None,
        password: None,
        client_id: "plcgw-test".to_string(),
        connect_timeout: Duration::from_millis(300),
    }
}

#[tokio::test]
async fn connect_fails_when_broker_refuses() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let err = MqttPublisher::connect(broker_config(port))
        .await
        .err()
        .expect("connect error");
    assert!(matches!(err, PublishError::Connect(_)), "unexpected error: {err}");
}

#[tokio::test]
async fn connect_times_out_without_connack() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let silent = tokio::spawn(async move {
        let (_socket, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let err = MqttPublisher::connect(broker_config(port))
        .await
        .err()
        .expect("connect error");
    assert!(err.to_string().contains("no CONNACK"), "unexpected error: {err}");
    silent.abort();
}

#[tokio::test]
async fn workers_drain_after_broker_goes_away() {
    // 回复 CONNACK 后立即关闭连接与监听端口
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let broker = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut connect = [0u8; 256];
        let _ = socket.read(&mut connect).await.unwrap();
        socket.write_all(&[0x20, 0x02, 0x00, 0x00]).await.unwrap();
    });

    let publisher = Arc::new(
        MqttPublisher::connect(broker_config(port))
            .await
            .map_err(|err| err.to_string())
            .expect("connected"),
    );
    broker.await.unwrap();

    let (tx, rx) = mpsc::channel(64);
    for number in 0..40u16 {
        tx.send(OutboundMessage::new(format!("D{}", number), DecodedValue::UInt16(number)))
            .await
            .unwrap();
    }
    drop(tx);

    let pool = spawn_workers(2, shared(rx), publisher.clone(), "plant");
    tokio::time::timeout(Duration::from_secs(10), pool.join())
        .await
        .expect("workers drain while the broker is unreachable");

    let mut rejected = 0;
    for _ in 0..20 {
        if let Err(err) = publisher.publish("plant/D0", b"{}".to_vec()).await {
            assert!(matches!(err, PublishError::Publish(_)), "unexpected error: {err}");
            rejected += 1;
        }
    }
    assert!(rejected > 0, "publish should fail once the request queue is full");

    tokio::time::timeout(Duration::from_secs(5), publisher.disconnect(Duration::from_secs(1)))
        .await
        .expect("disconnect returns")
        .ok();
}
