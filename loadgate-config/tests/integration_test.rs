//! Integration tests for loadgate-config

use loadgate_config::domains::logging::{LogFormat, LogLevel};
use loadgate_config::*;
use std::io::Write;
use std::time::Duration;
use temp_env::{with_vars, with_vars_unset};

/// Variables that would leak into file-based tests if set concurrently
const OVERRIDE_VARS: [&str; 8] = [
    "LOADGATE_BASE_URL",
    "LOADGATE_THINK_TIME",
    "LOADGATE_GRACE_PERIOD",
    "LOADGATE_SEED",
    "LOADGATE_HTTP_TIMEOUT",
    "LOADGATE_HTTP_VERIFY_SSL",
    "LOADGATE_LOG_LEVEL",
    "LOADGATE_LOG_FORMAT",
];

#[test]
fn test_default_config_validation() {
    let config = LoadgateConfig::default();
    assert!(config.validate_all().is_ok());
}

#[test]
fn test_config_loader_from_env() {
    let vars = vec![
        ("LOADGATE_BASE_URL", Some("http://dmn.staging:8080")),
        ("LOADGATE_THINK_TIME", Some("250ms")),
        ("LOADGATE_SEED", Some("42")),
        ("LOADGATE_HTTP_TIMEOUT", Some("5")),
        ("LOADGATE_LOG_LEVEL", Some("debug")),
        ("LOADGATE_LOG_FORMAT", Some("json")),
    ];

    with_vars(vars, || {
        let config = ConfigLoader::new().from_env().unwrap();

        assert_eq!(config.target.base_url, "http://dmn.staging:8080");
        assert_eq!(config.run.think_time, Duration::from_millis(250));
        assert_eq!(config.run.seed, Some(42));
        assert_eq!(config.http.timeout, Duration::from_secs(5));
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.logging.format, LogFormat::Json);
    });
}

#[test]
fn test_invalid_env_override_is_reported() {
    with_vars(vec![("LOADGATE_SEED", Some("not-a-number"))], || {
        let err = ConfigLoader::new().from_env().unwrap_err();
        assert!(matches!(err, ConfigError::EnvError(_)));
    });

    with_vars(vec![("LOADGATE_THINK_TIME", Some("soon"))], || {
        assert!(ConfigLoader::new().from_env().is_err());
    });
}

#[test]
fn test_custom_prefix() {
    with_vars(vec![("DMN_BASE_URL", Some("http://other:1234"))], || {
        let config = ConfigLoader::with_prefix("DMN").from_env().unwrap();
        assert_eq!(config.target.base_url, "http://other:1234");
    });
}

#[test]
fn test_sample_config_parses_back() {
    let yaml = LoadgateConfig::generate_sample();
    let parsed: LoadgateConfig = serde_yaml::from_str(&yaml).unwrap();
    assert!(parsed.validate_all().is_ok());
    assert_eq!(parsed.run.stages, LoadgateConfig::default().run.stages);
}

#[test]
fn test_comprehensive_config_file() {
    let yaml = r#"
target:
  base_url: "http://localhost:9090"
  expected_status: 200

payload:
  variable: income
  min: 1000
  max: 250000

run:
  stages:
    - duration: 30s
      target: 10
    - duration: 30s
      target: 0
  think_time: 0s
  ramp: linear
  grace_period: 5s
  seed: 7

thresholds:
  errors: ["rate<0.1"]
  "http_req_duration{expected_response:true}": ["p(99)<3000"]

http:
  timeout: 10
  verify_ssl: false

logging:
  level: warn
  format: compact
"#;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();

    let config = with_vars_unset(OVERRIDE_VARS, || {
        ConfigLoader::new().from_file(file.path()).unwrap()
    });

    assert_eq!(config.target.base_url, "http://localhost:9090");
    assert_eq!(config.payload.variable, "income");
    assert_eq!(config.run.stages.len(), 2);
    assert_eq!(config.run.total_duration(), Duration::from_secs(60));
    assert_eq!(config.run.think_time, Duration::ZERO);
    assert_eq!(config.run.grace_period, Duration::from_secs(5));
    assert_eq!(config.run.seed, Some(7));
    assert_eq!(config.thresholds.entries().count(), 2);
    assert!(!config.http.verify_ssl);
    assert_eq!(config.logging.level, LogLevel::Warn);
}

#[test]
fn test_invalid_base_url_in_file() {
    let err = with_vars_unset(OVERRIDE_VARS, || {
        ConfigLoader::new()
            .from_yaml_str("target:\n  base_url: \"not a url\"\n")
            .unwrap_err()
    });
    assert!(matches!(err, ConfigError::DomainError { ref domain, .. } if domain == "target"));
}

#[test]
fn test_missing_file() {
    let err = ConfigLoader::new()
        .from_file("/definitely/not/here/loadgate.yaml")
        .unwrap_err();
    assert!(matches!(err, ConfigError::FileReadError(_)));
}
