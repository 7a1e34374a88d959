//! 启动阶段装配：由 [`AppConfig`] 构建设备注册表与各组件配置。

use plcgw_config::AppConfig;
use plcgw_pipeline::PollerConfig;
use plcgw_protocol::{McClientConfig, RegisterWidth, device_code};
use plcgw_publish::MqttPublisherConfig;
use plcgw_registry::{DeviceRegistry, RegistryError};
use std::time::Duration;

/// 启动期致命错误。
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("{env_key}: {source}")]
    DeviceList {
        env_key: &'static str,
        source: RegistryError,
    },
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("device {address}: unknown device type {tag:?}")]
    UnknownDevice { address: String, tag: String },
    #[error("device {address}: invalid register width {width}")]
    InvalidWidth { address: String, width: u16 },
}

/// 按 16bit → 32bit → 2bit 顺序拼接设备清单。
pub fn build_registry(config: &AppConfig) -> Result<DeviceRegistry, StartupError> {
    // 先逐份解析，便于在错误中指出是哪个环境变量
    for list in &config.device_lists {
        if let Some(spec) = list.spec.as_deref() {
            plcgw_registry::parse_devices(spec, list.class).map_err(|source| {
                StartupError::DeviceList {
                    env_key: list.env_key,
                    source,
                }
            })?;
        }
    }
    let registry = DeviceRegistry::from_lists(
        config
            .device_lists
            .iter()
            .map(|list| (list.class, list.spec.as_deref())),
    )?;
    Ok(registry)
}

/// 校验每个设备的类型代码与寄存器宽度。
pub fn validate_devices(registry: &DeviceRegistry) -> Result<(), StartupError> {
    for device in registry.devices() {
        if device_code(&device.tag).is_none() {
            return Err(StartupError::UnknownDevice {
                address: device.address(),
                tag: device.tag.clone(),
            });
        }
        if RegisterWidth::try_from(device.width).is_err() {
            return Err(StartupError::InvalidWidth {
                address: device.address(),
                width: device.width,
            });
        }
    }
    Ok(())
}

pub fn client_config(config: &AppConfig) -> McClientConfig {
    let mut client = McClientConfig::new(config.plc_host.clone(), config.plc_port);
    client.io_timeout = Duration::from_millis(config.plc_io_timeout_ms);
    client.monitoring_timer = config.plc_monitoring_timer;
    client
}

pub fn publisher_config(config: &AppConfig) -> MqttPublisherConfig {
    MqttPublisherConfig {
        host: config.mqtt_host.clone(),
        port: config.mqtt_port,
        username: config.mqtt_username.clone(),
        password: config.mqtt_password.clone(),
        client_id: config.mqtt_client_id.clone(),
        connect_timeout: Duration::from_secs(config.mqtt_connect_timeout_secs),
    }
}

pub fn poller_config(config: &AppConfig) -> PollerConfig {
    PollerConfig {
        retry_backoff: Duration::from_millis(config.plc_retry_backoff_ms),
        poll_interval: Duration::from_millis(config.plc_poll_interval_ms),
        policies: config
            .device_lists
            .iter()
            .map(|list| (list.class, list.policy))
            .collect(),
    }
}
