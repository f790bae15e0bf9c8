//! Tests for dispatch configuration.

use super::*;
use serial_test::serial;
use std::io::Write;

fn write_yaml(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".yaml")
        .tempfile()
        .expect("create temp config");
    file.write_all(contents.as_bytes()).expect("write temp config");
    file
}

#[test]
fn test_defaults() {
    let config = DispatchConfig::default();

    assert!(config.queues.is_empty());
    assert!(config.consumers.is_empty());
    assert_eq!(config.offline_mode, None);
    assert_eq!(config.local_host, "localhost");
    assert_eq!(config.local_port, 4576);
    assert_eq!(config.invocation_endpoint, "http://localhost:3002");
    assert_eq!(config.transport.max_retries, 3);
    assert_eq!(config.transport.request_timeout(), Duration::from_secs(5));
    assert_eq!(config.transport.connect_timeout(), Duration::from_secs(3));
}

#[test]
fn test_builder_helpers() {
    let config = DispatchConfig::default()
        .with_queue("orders", "orders.fifo")
        .with_consumer("orders", "orders-consumer")
        .with_offline_mode("direct")
        .with_local_emulator("sqs", 9324);

    assert_eq!(config.queues.get("orders"), Some(&"orders.fifo".to_string()));
    assert_eq!(
        config.consumers.get("orders"),
        Some(&"orders-consumer".to_string())
    );
    assert_eq!(config.offline_mode.as_deref(), Some("direct"));
    assert_eq!(config.local_host, "sqs");
    assert_eq!(config.local_port, 9324);
}

#[test]
fn test_validate_rejects_empty_identifier() {
    let config = DispatchConfig::default().with_queue("orders", " ");
    let err = config.validate().unwrap_err();

    assert!(matches!(err, ConfigurationError::Invalid { .. }));
    assert!(err.to_string().contains("orders"));
}

#[test]
fn test_validate_rejects_zero_timeout() {
    let mut config = DispatchConfig::default();
    config.transport.request_timeout_secs = 0;

    assert!(config.validate().is_err());
}

#[test]
#[serial]
fn test_load_from_explicit_file() {
    let file = write_yaml(
        r#"
queues:
  orders: orders.fifo
  emails: EmailQueue
consumers:
  orders: orders-consumer
offline_mode: local
local_port: 9324
transport:
  max_retries: 1
"#,
    );

    let config = DispatchConfig::load(Some(file.path())).unwrap();

    assert_eq!(config.queues.len(), 2);
    assert_eq!(config.queues.get("emails"), Some(&"EmailQueue".to_string()));
    assert_eq!(config.offline_mode.as_deref(), Some("local"));
    assert_eq!(config.local_port, 9324);
    assert_eq!(config.local_host, "localhost");
    assert_eq!(config.transport.max_retries, 1);
    assert_eq!(config.transport.request_timeout_secs, 5);
}

#[test]
#[serial]
fn test_environment_overrides_file() {
    let file = write_yaml(
        r#"
queues:
  orders: orders.fifo
offline_mode: local
"#,
    );
    std::env::set_var("DISPATCH__OFFLINE_MODE", "aws");

    let result = DispatchConfig::load(Some(file.path()));
    std::env::remove_var("DISPATCH__OFFLINE_MODE");

    let config = result.unwrap();
    assert_eq!(config.offline_mode.as_deref(), Some("aws"));
}

#[test]
#[serial]
fn test_load_missing_explicit_file_fails() {
    let err = DispatchConfig::load(Some(Path::new("/nonexistent/dispatch.yaml"))).unwrap_err();
    assert!(matches!(err, ConfigurationError::Loading { .. }));
}
