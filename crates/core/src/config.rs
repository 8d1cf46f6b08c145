//! Typed configuration tree, mirroring the option set of §6: TOML on disk
//! with default-fill semantics, plus `NETSENTRY_`-prefixed environment
//! overrides applied after parsing.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, NetsentryError};

fn default_true() -> bool {
    true
}

/// Top-level configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetsentryConfig {
    pub general: GeneralConfig,
    pub arp: ArpConfig,
    pub ddos: DdosConfig,
    pub network_scan: NetworkScanConfig,
    pub firewall: FirewallConfig,
    pub bruteforce: BruteforceConfig,
    pub metrics: MetricsConfig,
}

impl Default for NetsentryConfig {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            arp: ArpConfig::default(),
            ddos: DdosConfig::default(),
            network_scan: NetworkScanConfig::default(),
            firewall: FirewallConfig::default(),
            bruteforce: BruteforceConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub enabled: bool,
    /// Mitigation controller tick, in seconds.
    pub check_interval_secs: u64,
    pub log_level: String,
    pub log_format: String,
    pub interface: String,
    pub data_dir: String,
    pub pid_file: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval_secs: 3,
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
            interface: "eth0".to_owned(),
            data_dir: "/var/lib/netsentry".to_owned(),
            pid_file: "/var/run/netsentry/netsentry.pid".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArpConfig {
    pub check_interval_secs: u64,
    pub threshold: u32,
    pub block_duration_secs: u64,
    pub trusted_devices: Vec<String>,
    pub monitor_gateway: bool,
}

impl Default for ArpConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 3,
            threshold: 3,
            block_duration_secs: 3600,
            trusted_devices: Vec::new(),
            monitor_gateway: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FloodConfig {
    pub threshold: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DdosConfig {
    pub syn_flood: FloodConfig,
    pub udp_flood: FloodConfig,
    pub icmp_flood: FloodConfig,
    pub syn_ack_ratio_threshold: f64,
    pub incomplete_connections_threshold: u64,
    pub adaptive_thresholds: bool,
    pub count_min_sketch_width: usize,
    pub count_min_sketch_depth: usize,
    pub sketch_reset_interval_secs: u64,
}

impl Default for DdosConfig {
    fn default() -> Self {
        Self {
            syn_flood: FloodConfig { threshold: 100 },
            udp_flood: FloodConfig { threshold: 100 },
            icmp_flood: FloodConfig { threshold: 50 },
            syn_ack_ratio_threshold: 0.1,
            incomplete_connections_threshold: 50,
            adaptive_thresholds: true,
            count_min_sketch_width: 2048,
            count_min_sketch_depth: 4,
            sketch_reset_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanRuleConfig {
    pub threshold: usize,
    pub window_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkScanConfig {
    pub horizontal_scan: ScanRuleConfig,
    pub vertical_scan: ScanRuleConfig,
}

impl Default for NetworkScanConfig {
    fn default() -> Self {
        Self {
            horizontal_scan: ScanRuleConfig {
                threshold: 10,
                window_secs: 60,
            },
            vertical_scan: ScanRuleConfig {
                threshold: 20,
                window_secs: 60,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FirewallConfig {
    pub auto_block: bool,
    pub rate_limit: Option<u32>,
    pub whitelist: Vec<String>,
    pub blacklist: Vec<String>,
}

impl Default for FirewallConfig {
    fn default() -> Self {
        Self {
            auto_block: true,
            rate_limit: None,
            whitelist: Vec::new(),
            blacklist: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BruteforceConfig {
    pub monitored_ports: Vec<u16>,
    pub failed_attempts_threshold: u32,
    pub time_window_secs: u64,
    pub syn_timeout_secs: u64,
}

impl Default for BruteforceConfig {
    fn default() -> Self {
        Self {
            monitored_ports: vec![22, 23, 80, 443, 3306, 5432],
            failed_attempts_threshold: 5,
            time_window_secs: 300,
            syn_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub listen_addr: String,
    pub port: u16,
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9464,
            endpoint: "/metrics".to_owned(),
        }
    }
}

impl NetsentryConfig {
    /// Parse a TOML document, filling in defaults for any missing subtree.
    pub fn parse(content: &str) -> Result<Self, NetsentryError> {
        toml::from_str(content)
            .map_err(|e| ConfigError::ParseFailed { reason: e.to_string() }.into())
    }

    /// Load and parse a config file from disk.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, NetsentryError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|_| {
            NetsentryError::Config(ConfigError::FileNotFound {
                path: path.display().to_string(),
            })
        })?;
        Self::parse(&content)
    }

    /// Catches combinations that parse fine but make no operational sense.
    pub fn validate(&self) -> Result<(), NetsentryError> {
        if self.arp.check_interval_secs < 1 {
            return Err(ConfigError::InvalidValue {
                field: "arp.check_interval_secs".to_owned(),
                reason: "must be at least 1".to_owned(),
            }
            .into());
        }
        if self.ddos.count_min_sketch_width == 0 || self.ddos.count_min_sketch_depth == 0 {
            return Err(ConfigError::InvalidValue {
                field: "ddos.count_min_sketch_width/depth".to_owned(),
                reason: "must be non-zero".to_owned(),
            }
            .into());
        }
        if self.bruteforce.monitored_ports.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "bruteforce.monitored_ports".to_owned(),
                reason: "must not be empty".to_owned(),
            }
            .into());
        }
        if !(0.0..=1.0).contains(&self.ddos.syn_ack_ratio_threshold) {
            return Err(ConfigError::InvalidValue {
                field: "ddos.syn_ack_ratio_threshold".to_owned(),
                reason: "must be between 0.0 and 1.0".to_owned(),
            }
            .into());
        }
        Ok(())
    }

    /// Applies `NETSENTRY_*` environment variables over whatever was loaded
    /// from disk. Missing variables leave the existing value untouched.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("NETSENTRY_GENERAL_LOG_LEVEL") {
            self.general.log_level = v;
        }
        if let Ok(v) = std::env::var("NETSENTRY_GENERAL_LOG_FORMAT") {
            self.general.log_format = v;
        }
        if let Ok(v) = std::env::var("NETSENTRY_GENERAL_INTERFACE") {
            self.general.interface = v;
        }
        if let Ok(v) = std::env::var("NETSENTRY_GENERAL_CHECK_INTERVAL_SECS") {
            if let Ok(n) = v.parse() {
                self.general.check_interval_secs = n;
            }
        }
        if let Ok(v) = std::env::var("NETSENTRY_ARP_THRESHOLD") {
            if let Ok(n) = v.parse() {
                self.arp.threshold = n;
            }
        }
        if let Ok(v) = std::env::var("NETSENTRY_DDOS_ADAPTIVE_THRESHOLDS") {
            if let Ok(b) = v.parse() {
                self.ddos.adaptive_thresholds = b;
            }
        }
        if let Ok(v) = std::env::var("NETSENTRY_FIREWALL_WHITELIST") {
            self.firewall.whitelist = v.split(',').map(|s| s.trim().to_owned()).collect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        NetsentryConfig::default().validate().unwrap();
    }

    #[test]
    fn empty_string_parses_with_defaults() {
        let config = NetsentryConfig::parse("").expect("empty string should parse");
        config.validate().unwrap();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.arp.threshold, 3);
        assert_eq!(config.ddos.syn_flood.threshold, 100);
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let toml = r#"
[arp]
threshold = 7
"#;
        let config = NetsentryConfig::parse(toml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.arp.threshold, 7);
        assert_eq!(config.arp.block_duration_secs, 3600);
        assert_eq!(config.ddos.udp_flood.threshold, 100);
    }

    #[test]
    fn malformed_toml_returns_parse_error() {
        let err = NetsentryConfig::parse("[invalid").unwrap_err();
        assert!(matches!(err, NetsentryError::Config(ConfigError::ParseFailed { .. })));
    }

    #[test]
    fn zero_sketch_width_fails_validation() {
        let mut config = NetsentryConfig::default();
        config.ddos.count_min_sketch_width = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_monitored_ports_fails_validation() {
        let mut config = NetsentryConfig::default();
        config.bruteforce.monitored_ports.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn serialize_roundtrip() {
        let original = NetsentryConfig::default();
        let toml_str = toml::to_string_pretty(&original).unwrap();
        let parsed = NetsentryConfig::parse(&toml_str).unwrap();
        parsed.validate().unwrap();
        assert_eq!(original.arp.threshold, parsed.arp.threshold);
        assert_eq!(
            original.ddos.count_min_sketch_width,
            parsed.ddos.count_min_sketch_width
        );
    }

    #[tokio::test]
    async fn from_file_nonexistent_returns_file_not_found() {
        let err = NetsentryConfig::from_file("/tmp/netsentry_test_nonexistent_98765.toml")
            .await
            .unwrap_err();
        assert!(matches!(err, NetsentryError::Config(ConfigError::FileNotFound { .. })));
    }

    #[test]
    #[serial_test::serial]
    fn env_override_takes_precedence() {
        let original = std::env::var("NETSENTRY_ARP_THRESHOLD").ok();
        unsafe {
            std::env::set_var("NETSENTRY_ARP_THRESHOLD", "9");
        }

        let mut config = NetsentryConfig::default();
        config.apply_env_overrides();

        unsafe {
            match original {
                Some(v) => std::env::set_var("NETSENTRY_ARP_THRESHOLD", v),
                None => std::env::remove_var("NETSENTRY_ARP_THRESHOLD"),
            }
        }

        assert_eq!(config.arp.threshold, 9);
    }

    #[test]
    #[serial_test::serial]
    fn env_override_csv_whitelist() {
        let original = std::env::var("NETSENTRY_FIREWALL_WHITELIST").ok();
        unsafe {
            std::env::set_var("NETSENTRY_FIREWALL_WHITELIST", "10.0.0.1, 10.0.0.2");
        }

        let mut config = NetsentryConfig::default();
        config.apply_env_overrides();

        unsafe {
            match original {
                Some(v) => std::env::set_var("NETSENTRY_FIREWALL_WHITELIST", v),
                None => std::env::remove_var("NETSENTRY_FIREWALL_WHITELIST"),
            }
        }

        assert_eq!(config.firewall.whitelist, vec!["10.0.0.1", "10.0.0.2"]);
    }

    #[test]
    #[serial_test::serial]
    fn env_override_missing_var_keeps_default() {
        unsafe {
            std::env::remove_var("NETSENTRY_GENERAL_LOG_LEVEL");
        }
        let mut config = NetsentryConfig::default();
        config.apply_env_overrides();
        assert_eq!(config.general.log_level, "info");
    }
}
