use logship::config::types::FormatKind;
use logship::config::{
    generate::generate_starter_config, load_config, resolve_config_path, ConfigError,
};
use logship::Severity;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_generated_config_is_valid() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.yml");

    fs::write(&config_path, generate_starter_config()).unwrap();

    let config = load_config(&config_path).expect("Generated config should be valid");
    assert_eq!(config.log_group.as_deref(), Some("my-application"));
    assert!(config.log_stream.is_none());
    assert_eq!(config.delivery.max_batch_size, 25);
    assert_eq!(config.delivery.retry_backoff, Duration::from_millis(500));
    assert_eq!(config.format.kind, FormatKind::Text);
    assert_eq!(config.format.level, Severity::Debug);
}

#[test]
fn test_full_config_from_file() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.yml");

    std::env::set_var("LOGSHIP_IT_SECRET", "from-env");
    let config_yaml = r#"
log_group: payments
log_stream: worker-3
region: eu-west-1
endpoint: http://localhost:4566
credentials:
  access_key_id: AKIDEXAMPLE
  secret_access_key: $env{LOGSHIP_IT_SECRET}
delivery:
  max_batch_size: 500
  open_timeout: 3s
format:
  kind: json
  level: warn
  progname: payments-worker
"#;
    fs::write(&config_path, config_yaml).unwrap();

    let config = load_config(&config_path).unwrap();
    std::env::remove_var("LOGSHIP_IT_SECRET");

    assert_eq!(config.log_stream.as_deref(), Some("worker-3"));
    assert_eq!(config.region.as_deref(), Some("eu-west-1"));
    assert_eq!(config.credentials.unwrap().secret_access_key, "from-env");
    assert_eq!(config.delivery.max_batch_size, 500);
    assert_eq!(config.delivery.open_timeout, Duration::from_secs(3));
    assert_eq!(config.delivery.read_timeout, Duration::from_secs(120));
    assert_eq!(config.format.kind, FormatKind::Json);
    assert_eq!(config.format.level, Severity::Warn);
    assert_eq!(config.format.progname.as_deref(), Some("payments-worker"));
}

#[test]
fn test_missing_file_reports_path() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("absent.yml");

    match load_config(&config_path) {
        Err(ConfigError::Io(e)) => assert!(e.to_string().contains("absent.yml")),
        other => panic!("expected io error, got {:?}", other),
    }
}

#[test]
fn test_malformed_yaml_reports_path() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("broken.yml");
    fs::write(&config_path, "log_group: [unterminated\n").unwrap();

    let err = load_config(&config_path).unwrap_err();
    assert!(err.to_string().contains("broken.yml"));
}

#[test]
fn test_multiple_validation_errors_are_collected() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.yml");
    let config_yaml = r#"
log_group: app
delivery:
  max_batch_size: 20000
  read_timeout: 0s
"#;
    fs::write(&config_path, config_yaml).unwrap();

    match load_config(&config_path) {
        Err(ConfigError::ValidationList(errors)) => assert_eq!(errors.len(), 2),
        other => panic!("expected validation errors, got {:?}", other),
    }
}

#[test]
fn test_explicit_config_path_wins() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("custom.yml");

    assert_eq!(resolve_config_path(Some(&config_path)), Some(config_path));
}
