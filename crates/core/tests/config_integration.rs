//! Integration tests for `NetsentryConfig` against a realistic on-disk
//! document, mirroring the unit tests in `src/config.rs` but exercising the
//! `from_file` path end to end.

use netsentry_core::config::NetsentryConfig;
use netsentry_core::error::{ConfigError, NetsentryError};

#[tokio::test]
async fn load_written_config_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("netsentry.toml");
    tokio::fs::write(
        &path,
        r#"
[general]
log_level = "debug"
interface = "wlan0"

[arp]
threshold = 5

[firewall]
whitelist = ["10.0.0.50"]
"#,
    )
    .await
    .unwrap();

    let config = NetsentryConfig::from_file(&path).await.expect("should load");
    config.validate().expect("should validate");

    assert_eq!(config.general.log_level, "debug");
    assert_eq!(config.general.interface, "wlan0");
    assert_eq!(config.arp.threshold, 5);
    assert_eq!(config.firewall.whitelist, vec!["10.0.0.50"]);
    // untouched sections keep their defaults
    assert_eq!(config.ddos.syn_flood.threshold, 100);
    assert_eq!(config.bruteforce.failed_attempts_threshold, 5);
}

#[tokio::test]
async fn missing_file_reports_file_not_found() {
    let err = NetsentryConfig::from_file("/tmp/netsentry_missing_config_xyz.toml")
        .await
        .unwrap_err();
    assert!(matches!(err, NetsentryError::Config(ConfigError::FileNotFound { .. })));
}

#[tokio::test]
async fn partial_config_keeps_other_sections_default() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("netsentry.toml");
    tokio::fs::write(
        &path,
        r#"
[network_scan]
horizontal_scan = { threshold = 25, window_secs = 30 }
"#,
    )
    .await
    .unwrap();

    let config = NetsentryConfig::from_file(&path).await.expect("should load");
    assert_eq!(config.network_scan.horizontal_scan.threshold, 25);
    assert_eq!(config.network_scan.horizontal_scan.window_secs, 30);
    // vertical_scan untouched
    assert_eq!(config.network_scan.vertical_scan.threshold, 20);
    assert_eq!(config.arp.threshold, 3);
}
