//! 网关运行配置加载。

use domain::{DeviceClass, PublishPolicy};
use std::env;
use std::time::Duration;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env: {0}")]
    Missing(String),
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// 一份设备清单（原始文本 + 所属类别 + 发布策略）。
#[derive(Debug, Clone)]
pub struct DeviceListConfig {
    pub class: DeviceClass,
    pub env_key: &'static str,
    pub spec: Option<String>,
    pub policy: PublishPolicy,
}

/// 网关运行配置。
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,
    pub mqtt_client_id: String,
    pub mqtt_topic_prefix: String,
    pub mqtt_connect_timeout_secs: u64,
    pub plc_host: String,
    pub plc_port: u16,
    pub plc_io_timeout_ms: u64,
    pub plc_monitoring_timer: u16,
    pub plc_retry_backoff_ms: u64,
    pub plc_poll_interval_ms: u64,
    pub device_lists: Vec<DeviceListConfig>,
    pub publish_refresh_secs: u64,
    pub publish_workers: usize,
    pub publish_queue_capacity: usize,
}

/// 默认 topic 命名空间。
pub const DEFAULT_TOPIC_PREFIX: &str = "testplc/holding_register/16bit&32bit";

/// 默认 PLC 端口。
pub const DEFAULT_PLC_PORT: u16 = 5011;

impl AppConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        let mqtt_host_raw =
            env::var("MQTT_HOST").map_err(|_| ConfigError::Missing("MQTT_HOST".to_string()))?;
        let mqtt_default_port = read_u16_with_default("MQTT_PORT", 1883)?;
        let (mqtt_host, mqtt_port) = split_broker_address(&mqtt_host_raw, mqtt_default_port)?;
        let mqtt_username = read_optional("MQTT_USERNAME");
        let mqtt_password = read_optional("MQTT_PASSWORD");
        let mqtt_client_id = read_optional("MQTT_CLIENT_ID")
            .unwrap_or_else(|| format!("plcgw-{}", uuid::Uuid::new_v4()));
        let mqtt_topic_prefix = read_optional("MQTT_TOPIC_PREFIX")
            .map(|prefix| prefix.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_TOPIC_PREFIX.to_string());
        let mqtt_connect_timeout_secs = read_u64_with_default("MQTT_CONNECT_TIMEOUT_SECS", 10)?;

        let plc_host =
            read_optional("PLC_HOST").ok_or_else(|| ConfigError::Missing("PLC_HOST".to_string()))?;
        let plc_port = read_u16_with_default("PLC_PORT", DEFAULT_PLC_PORT)?;
        let plc_io_timeout_ms = read_u64_with_default("PLC_IO_TIMEOUT_MS", 5000)?;
        let plc_monitoring_timer = read_u16_with_default("PLC_MONITORING_TIMER", 0x0010)?;
        let plc_retry_backoff_ms = read_u64_with_default("PLC_RETRY_BACKOFF_MS", 1000)?;
        let plc_poll_interval_ms = read_u64_with_default("PLC_POLL_INTERVAL_MS", 1000)?;

        let publish_refresh_secs = read_u64_with_default("PUBLISH_REFRESH_SECS", 30 * 60)?;
        let refresh = Duration::from_secs(publish_refresh_secs);
        let device_lists = vec![
            read_device_list(
                DeviceClass::Word,
                "DEVICES_16bit",
                "PUBLISH_POLICY_16bit",
                PublishPolicy::Always,
                refresh,
            )?,
            read_device_list(
                DeviceClass::Float,
                "DEVICES_32bit",
                "PUBLISH_POLICY_32bit",
                PublishPolicy::OnChange,
                refresh,
            )?,
            read_device_list(
                DeviceClass::Bit,
                "DEVICES_2bit",
                "PUBLISH_POLICY_2bit",
                PublishPolicy::OnChangeOrRefresh(refresh),
                refresh,
            )?,
        ];

        let publish_workers = read_positive_usize_with_default("PUBLISH_WORKERS", 15)?;
        let publish_queue_capacity =
            read_positive_usize_with_default("PUBLISH_QUEUE_CAPACITY", publish_workers)?;

        Ok(Self {
            mqtt_host,
            mqtt_port,
            mqtt_username,
            mqtt_password,
            mqtt_client_id,
            mqtt_topic_prefix,
            mqtt_connect_timeout_secs,
            plc_host,
            plc_port,
            plc_io_timeout_ms,
            plc_monitoring_timer,
            plc_retry_backoff_ms,
            plc_poll_interval_ms,
            device_lists,
            publish_refresh_secs,
            publish_workers,
            publish_queue_capacity,
        })
    }

    /// 指定类别的发布策略。
    pub fn policy_for(&self, class: DeviceClass) -> Option<PublishPolicy> {
        self.device_lists
            .iter()
            .find(|list| list.class == class)
            .map(|list| list.policy)
    }
}

/// 解析 broker 地址：支持 `host`、`host:port`、`tcp://host:port`、`mqtt://host`。
pub fn split_broker_address(raw: &str, default_port: u16) -> Result<(String, u16), ConfigError> {
    let trimmed = raw.trim();
    let without_scheme = trimmed
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(trimmed)
        .trim_end_matches('/');
    if without_scheme.is_empty() {
        return Err(ConfigError::Invalid("MQTT_HOST".to_string(), raw.to_string()));
    }
    match without_scheme.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => {
            let port = port
                .parse::<u16>()
                .map_err(|_| ConfigError::Invalid("MQTT_HOST".to_string(), raw.to_string()))?;
            Ok((host.to_string(), port))
        }
        Some(_) => Err(ConfigError::Invalid("MQTT_HOST".to_string(), raw.to_string())),
        None => Ok((without_scheme.to_string(), default_port)),
    }
}

/// 解析发布策略名称。
pub fn parse_policy(value: &str, refresh: Duration) -> Option<PublishPolicy> {
    match value.trim().to_ascii_lowercase().as_str() {
        "always" => Some(PublishPolicy::Always),
        "change" | "on_change" => Some(PublishPolicy::OnChange),
        "refresh" | "on_change_or_refresh" => Some(PublishPolicy::OnChangeOrRefresh(refresh)),
        _ => None,
    }
}

fn read_device_list(
    class: DeviceClass,
    env_key: &'static str,
    policy_key: &str,
    default_policy: PublishPolicy,
    refresh: Duration,
) -> Result<DeviceListConfig, ConfigError> {
    let policy = match read_optional(policy_key) {
        Some(value) => parse_policy(&value, refresh)
            .ok_or_else(|| ConfigError::Invalid(policy_key.to_string(), value))?,
        None => default_policy,
    };
    Ok(DeviceListConfig {
        class,
        env_key,
        spec: read_optional(env_key),
        policy,
    })
}

fn read_u16_with_default(key: &str, default: u16) -> Result<u16, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u16>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_u64_with_default(key: &str, default: u64) -> Result<u64, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u64>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_positive_usize_with_default(key: &str, default: usize) -> Result<usize, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    match value.parse::<usize>() {
        Ok(parsed) if parsed > 0 => Ok(parsed),
        _ => Err(ConfigError::Invalid(key.to_string(), value)),
    }
}

fn read_optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Some(value),
        _ => None,
    }
}
