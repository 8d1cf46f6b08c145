//! Orchestrator integration tests: config -> module wiring -> health.
//!
//! `run()` blocks on a signal wait, so these tests exercise `build_from_config`
//! and `health()` directly rather than the full lifecycle.

use netsentry_core::config::NetsentryConfig;
use netsentry_daemon::orchestrator::Orchestrator;

#[tokio::test]
async fn default_config_registers_all_modules() {
    let config = NetsentryConfig::default();
    let orchestrator = Orchestrator::build_from_config(config).await.expect("build should succeed");

    let health = orchestrator.health().await;
    let names: Vec<&str> = health.modules.iter().map(|m| m.name.as_str()).collect();

    assert!(names.contains(&"packet-source"));
    assert!(names.contains(&"event-router"));
    assert!(names.contains(&"threat-registry"));
    assert!(names.contains(&"arp-detector"));
    assert!(names.contains(&"ddos-detector"));
    assert!(names.contains(&"scan-detector"));
    assert!(names.contains(&"bruteforce-detector"));
    assert!(names.contains(&"baseline-tracker"));
    assert!(names.contains(&"mitigation-controller"));
    assert!(names.contains(&"expiry-sweeper"));
}

#[tokio::test]
async fn auto_block_disabled_drops_mitigation_modules() {
    let mut config = NetsentryConfig::default();
    config.firewall.auto_block = false;
    let orchestrator = Orchestrator::build_from_config(config).await.expect("build should succeed");

    let health = orchestrator.health().await;
    let names: Vec<&str> = health.modules.iter().map(|m| m.name.as_str()).collect();

    assert!(names.contains(&"ddos-detector"), "detectors still run in detection-only mode");
    assert!(!names.contains(&"mitigation-controller"));
    assert!(!names.contains(&"expiry-sweeper"));
}

#[tokio::test]
async fn invalid_config_fails_to_build() {
    let mut config = NetsentryConfig::default();
    config.bruteforce.monitored_ports.clear();

    let result = Orchestrator::build_from_config(config).await;
    assert!(result.is_err(), "an empty monitored_ports list should fail validation");
}

#[tokio::test]
async fn health_report_uptime_starts_at_zero() {
    let orchestrator = Orchestrator::build_from_config(NetsentryConfig::default()).await.expect("build should succeed");
    let health = orchestrator.health().await;
    assert!(health.uptime_secs < 2, "freshly built orchestrator should report near-zero uptime");
}
