//! PLC 采集网关：轮询 PLC 软元件并把读数发布到 MQTT。

mod lifecycle;
mod restart;
mod signal;
mod startup;

use lifecycle::{GatewaySettings, RunOutcome, Supervisor};
use plcgw_config::AppConfig;
use plcgw_protocol::McClient;
use plcgw_publish::MqttPublisher;
use plcgw_telemetry::init_tracing;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// 默认本地环境文件，可通过 `PLCGW_ENV_FILE` 指定其他路径。
const DEFAULT_ENV_FILE: &str = ".env.local";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 先加载环境文件，RUST_LOG 等变量也可以写在其中
    let env_file = load_env_file();
    init_tracing();
    match env_file {
        Ok(path) => info!(target: "plcgw.lifecycle", path = %path.display(), "env_file_loaded"),
        Err(err) if err.not_found() => {
            info!(target: "plcgw.lifecycle", "env file not found, using process environment")
        }
        Err(err) => return Err(err.into()),
    }

    let mut supervisor = Supervisor::new();
    let config = AppConfig::from_env()?;

    // 设备清单与设备校验（任何错误都终止启动）
    let registry = Arc::new(startup::build_registry(&config)?);
    startup::validate_devices(&registry)?;
    info!(target: "plcgw.lifecycle", devices = registry.len(), "devices_loaded");

    let publisher = Arc::new(MqttPublisher::connect(startup::publisher_config(&config)).await?);
    let client = Arc::new(McClient::connect(startup::client_config(&config)).await?);

    let settings = GatewaySettings {
        workers: config.publish_workers,
        queue_capacity: config.publish_queue_capacity,
        topic_prefix: config.mqtt_topic_prefix.clone(),
        poller: startup::poller_config(&config),
        drain_timeout: Duration::from_secs(10),
    };
    let outcome = supervisor
        .run(
            registry,
            client.clone(),
            publisher.clone(),
            &settings,
            signal::shutdown_signal(),
        )
        .await;

    if let Err(err) = publisher.disconnect(Duration::from_secs(5)).await {
        warn!(target: "plcgw.lifecycle", error = %err, "mqtt_disconnect_failed");
    }
    if let Err(err) = client.close().await {
        warn!(target: "plcgw.lifecycle", error = %err, "plc_close_failed");
    }
    supervisor.terminate();
    info!(target: "plcgw.lifecycle", state = %supervisor.state(), ?outcome, "gateway_exited");

    if outcome == RunOutcome::Restart {
        restart::respawn_self()?;
        std::process::exit(0);
    }
    Ok(())
}

fn load_env_file() -> Result<PathBuf, dotenvy::Error> {
    let path = std::env::var("PLCGW_ENV_FILE").unwrap_or_else(|_| DEFAULT_ENV_FILE.to_string());
    dotenvy::from_filename(path)
}
