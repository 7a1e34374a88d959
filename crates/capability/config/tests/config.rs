use domain::{DeviceClass, PublishPolicy};
use plcgw_config::{AppConfig, DEFAULT_TOPIC_PREFIX, parse_policy, split_broker_address};
use std::time::Duration;

#[test]
fn load_config_from_env() {
    // Rust 2024 中 set_var 需要显式标注 unsafe（测试进程内可控）。
    unsafe {
        std::env::set_var("MQTT_HOST", "tcp://broker.local:1884");
        std::env::set_var("PLC_HOST", "192.168.3.39");
        std::env::set_var("DEVICES_16bit", "D,100,1,D,101,1");
        std::env::set_var("DEVICES_32bit", "D,200,2");
        std::env::set_var("PUBLISH_POLICY_16bit", "change");
        std::env::set_var("PUBLISH_WORKERS", "4");
    }

    let config = AppConfig::from_env().expect("config");
    assert_eq!(config.mqtt_host, "broker.local");
    assert_eq!(config.mqtt_port, 1884);
    assert_eq!(config.mqtt_topic_prefix, DEFAULT_TOPIC_PREFIX);
    assert!(config.mqtt_client_id.starts_with("plcgw-"));
    assert_eq!(config.plc_host, "192.168.3.39");
    assert_eq!(config.plc_port, 5011);
    assert_eq!(config.plc_retry_backoff_ms, 1000);
    assert_eq!(config.publish_workers, 4);
    assert_eq!(config.publish_queue_capacity, 4);
    assert_eq!(config.device_lists.len(), 3);
    assert_eq!(
        config.device_lists[0].spec.as_deref(),
        Some("D,100,1,D,101,1")
    );
    assert!(config.device_lists[2].spec.is_none());
    assert_eq!(
        config.policy_for(DeviceClass::Word),
        Some(PublishPolicy::OnChange)
    );
    assert_eq!(
        config.policy_for(DeviceClass::Bit),
        Some(PublishPolicy::OnChangeOrRefresh(Duration::from_secs(1800)))
    );

    unsafe {
        std::env::set_var("PUBLISH_WORKERS", "0");
    }
    assert!(AppConfig::from_env().is_err());

    unsafe {
        std::env::remove_var("PUBLISH_WORKERS");
        std::env::remove_var("PLC_HOST");
    }
    let err = AppConfig::from_env().expect_err("missing plc host");
    assert_eq!(err.to_string(), "missing required env: PLC_HOST");
}

#[test]
fn broker_address_variants() {
    assert_eq!(
        split_broker_address("localhost", 1883).expect("host"),
        ("localhost".to_string(), 1883)
    );
    assert_eq!(
        split_broker_address("10.0.0.5:1999", 1883).expect("host:port"),
        ("10.0.0.5".to_string(), 1999)
    );
    assert_eq!(
        split_broker_address("mqtt://broker/", 1883).expect("scheme"),
        ("broker".to_string(), 1883)
    );
    assert!(split_broker_address("tcp://broker:notaport", 1883).is_err());
    assert!(split_broker_address("  ", 1883).is_err());
}

#[test]
fn policy_names() {
    let refresh = Duration::from_secs(60);
    assert_eq!(parse_policy("Always", refresh), Some(PublishPolicy::Always));
    assert_eq!(parse_policy("change", refresh), Some(PublishPolicy::OnChange));
    assert_eq!(
        parse_policy("refresh", refresh),
        Some(PublishPolicy::OnChangeOrRefresh(refresh))
    );
    assert_eq!(parse_policy("sometimes", refresh), None);
}
