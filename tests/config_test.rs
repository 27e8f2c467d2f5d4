//! Layered configuration loading from TOML files.

use reelflow_core::config::ReelflowConfig;
use reelflow_core::scheduling::Platform;
use reelflow_core::OrchestratorError;
use std::io::Write;
use tempfile::NamedTempFile;
use tokio_test::{assert_err, assert_ok};

fn toml_file(contents: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp file");
    file.write_all(contents.as_bytes()).expect("write config");
    file
}

#[test]
fn test_file_overrides_defaults() {
    let file = toml_file(
        r##"
[server]
public_base_url = "https://reels.example.com"

[orchestration]
export_max_attempts = 5
stage_trigger_timeout_ms = 10000

[alerts]
webhook_url = "https://alerts.example.com/hook"

[tenants.carz]
display_name = "Carz Inc"
platforms = ["instagram", "tiktok"]
timezone = "America/Los_Angeles"
default_caption = "Fresh car news."
hashtags = ["#cars"]
alerts_enabled = false
"##,
    );

    let config = assert_ok!(ReelflowConfig::load_from(file.path().to_str().unwrap()));

    assert_eq!(config.server.public_base_url, "https://reels.example.com");
    assert_eq!(config.orchestration.export_max_attempts, 5);
    assert_eq!(config.orchestration.stage_trigger_timeout_ms, 10_000);
    // Untouched fields keep their defaults
    assert_eq!(config.orchestration.export_retry_window_seconds, 300);
    assert_eq!(
        config.alerts.webhook_url.as_deref(),
        Some("https://alerts.example.com/hook")
    );

    let carz = config.tenant("carz").unwrap();
    assert_eq!(carz.platforms, vec![Platform::Instagram, Platform::Tiktok]);
    assert_eq!(carz.timezone, "America/Los_Angeles");
    assert!(!carz.alerts_enabled);
    assert!(config.tenant("ownerfi").is_some());
}

#[test]
fn test_unknown_timezone_is_rejected() {
    let file = toml_file(
        r#"
[tenants.carz]
display_name = "Carz Inc"
platforms = ["instagram"]
timezone = "Mars/Olympus_Mons"
default_caption = "Fresh car news."
"#,
    );

    let err = assert_err!(ReelflowConfig::load_from(file.path().to_str().unwrap()));
    assert!(matches!(err, OrchestratorError::ConfigurationError(_)));
    assert!(err.to_string().contains("Mars/Olympus_Mons"));
}

#[test]
fn test_zero_timeout_is_rejected() {
    let file = toml_file(
        r#"
[orchestration]
notifier_timeout_ms = 0
"#,
    );

    let err = assert_err!(ReelflowConfig::load_from(file.path().to_str().unwrap()));
    assert!(err.to_string().contains("orchestration.notifier_timeout_ms"));
}

#[test]
fn test_malformed_file_is_an_error() {
    let file = toml_file("[server\nbind_address = ");
    assert_err!(ReelflowConfig::load_from(file.path().to_str().unwrap()));
}
