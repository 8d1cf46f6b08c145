//! Module orchestration: assembly, channel wiring, and lifecycle management.
//!
//! The [`Orchestrator`] loads configuration, builds the pipeline in
//! dependency order (packet source -> event router -> detectors & baseline
//! tracker -> threat registry -> mitigation controller -> expiry sweeper,
//! per the system's data-flow order), starts every module, waits for a
//! shutdown signal, and tears modules back down in the same order so
//! consumers get a chance to drain whatever producers already queued.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::sync::{broadcast, mpsc};

use netsentry_core::config::NetsentryConfig;
use netsentry_core::event::{PacketEvent, PacketKind};
use netsentry_detect::arp::ArpDetector;
use netsentry_detect::baseline::BaselineTracker;
use netsentry_detect::bruteforce::BruteforceDetector;
use netsentry_detect::ddos::{AdaptiveThresholdsHandle, DdosDetector, DdosStatsHandle};
use netsentry_detect::registry::ThreatRegistry;
use netsentry_detect::router::EventRouter;
use netsentry_detect::scan::NetworkScanDetector;
use netsentry_mitigate::controller::{MitigationController, MitigationControllerPipeline};
use netsentry_mitigate::driver::DynPacketFilterDriver;
use netsentry_mitigate::iptables_driver::IptablesDriver;
use netsentry_mitigate::sweeper::{ExpirySweeper, ExpirySweeperPipeline};

use crate::health::{DaemonHealth, ModuleHealth, aggregate_status};
use crate::modules::{ModuleHandle, ModuleRegistry};
use crate::status::{self, ModuleList};

const PACKET_CHANNEL_CAPACITY: usize = 1024;
const ROUTED_CHANNEL_CAPACITY: usize = 512;
const NEIGHBOR_TABLE_PATH: &str = "/proc/net/arp";
const DEFAULT_ROUTE_PATH: &str = "/proc/net/route";

pub struct Orchestrator {
    config: NetsentryConfig,
    modules: ModuleRegistry,
    shutdown_tx: broadcast::Sender<()>,
    start_time: Instant,
    controller: MitigationController,
    registry_handle: netsentry_detect::registry::ThreatRegistryHandle,
}

impl Orchestrator {
    pub async fn build(config_path: &Path) -> Result<Self> {
        let mut config = NetsentryConfig::from_file(config_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
        config.apply_env_overrides();
        Self::build_from_config(config).await
    }

    pub async fn build_from_config(config: NetsentryConfig) -> Result<Self> {
        config.validate().map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        tracing::debug!("creating inter-module channels");
        let (event_tx, event_rx) = mpsc::channel::<PacketEvent>(PACKET_CHANNEL_CAPACITY);
        let (shutdown_tx, _) = broadcast::channel(16);

        let mut modules = ModuleRegistry::new();

        // Packet source: the sole producer. Runs on its own OS thread.
        let capture = netsentry_capture::source::PacketSource::new(
            config.general.interface.clone(),
            event_tx,
            false,
        );
        modules.register(ModuleHandle::new("packet-source", true, Box::new(capture)));

        // Event router: subscriptions must be registered before the router
        // starts, so every detector's receiver is created here up front.
        let mut router = EventRouter::new(event_rx);
        let ddos_rx = router.subscribe(&[PacketKind::Syn, PacketKind::SynAck, PacketKind::Udp, PacketKind::Icmp]);
        let scan_rx = router.subscribe(&[PacketKind::Syn, PacketKind::Udp]);
        let bruteforce_rx = router.subscribe(&[PacketKind::Syn, PacketKind::SynAck]);

        // Threat registry: single shared sink every detector upserts into.
        let mut registry = ThreatRegistry::new();
        let registry_handle = registry.handle();

        // Detectors. ARP and the baseline tracker poll their own sources on
        // a timer and never subscribe to the router.
        let arp = ArpDetector::new(&config.arp, NEIGHBOR_TABLE_PATH, DEFAULT_ROUTE_PATH, registry_handle.clone());

        let ddos_stats = DdosStatsHandle::new();
        let adaptive_thresholds = AdaptiveThresholdsHandle::new();
        let ddos = DdosDetector::new(
            &config.ddos,
            ddos_rx,
            adaptive_thresholds.clone(),
            ddos_stats.clone(),
            registry_handle.clone(),
        );
        let scan = NetworkScanDetector::new(&config.network_scan, scan_rx, registry_handle.clone());
        let bruteforce = BruteforceDetector::new(&config.bruteforce, bruteforce_rx, registry_handle.clone());
        let baseline = BaselineTracker::new(&config.ddos, ddos_stats, adaptive_thresholds);

        // Mitigation: the controller always exists (the status surface
        // reports its active-block table even when enforcement is off),
        // but its reconcile loop and the expiry sweeper are only registered
        // as running modules when firewall.auto_block is set.
        let driver: Arc<dyn DynPacketFilterDriver> = Arc::new(IptablesDriver::new());
        let block_duration = Duration::from_secs(config.arp.block_duration_secs.max(1));
        let controller = MitigationController::new(driver, registry_handle.clone(), &config.firewall, block_duration);

        modules.register(ModuleHandle::new("event-router", true, Box::new(router)));
        modules.register(ModuleHandle::new("threat-registry", true, Box::new(registry)));
        modules.register(ModuleHandle::new("arp-detector", true, Box::new(arp)));
        modules.register(ModuleHandle::new("ddos-detector", true, Box::new(ddos)));
        modules.register(ModuleHandle::new("scan-detector", true, Box::new(scan)));
        modules.register(ModuleHandle::new("bruteforce-detector", true, Box::new(bruteforce)));
        modules.register(ModuleHandle::new("baseline-tracker", true, Box::new(baseline)));

        if config.firewall.auto_block {
            let controller_pipeline = MitigationControllerPipeline::new(controller.clone(), &config.general);
            let sweeper = ExpirySweeperPipeline::new(ExpirySweeper::new(controller.clone()));
            modules.register(ModuleHandle::new("mitigation-controller", true, Box::new(controller_pipeline)));
            modules.register(ModuleHandle::new("expiry-sweeper", true, Box::new(sweeper)));
        } else {
            tracing::warn!("firewall.auto_block is disabled: detectors will run but no blocks will be installed");
        }

        tracing::info!(
            total_modules = modules.count(),
            enabled_modules = modules.enabled_count(),
            "orchestrator initialized"
        );

        Ok(Self {
            config,
            modules,
            shutdown_tx,
            start_time: Instant::now(),
            controller,
            registry_handle,
        })
    }

    /// Starts every module, installs the status writer, and blocks until a
    /// shutdown signal (SIGTERM/SIGINT) is received.
    pub async fn run(&mut self) -> Result<()> {
        if !self.config.general.pid_file.is_empty() {
            write_pid_file(Path::new(&self.config.general.pid_file))?;
        }

        tracing::info!("starting all enabled modules");
        if let Err(e) = self.modules.start_all().await {
            if !self.config.general.pid_file.is_empty() {
                remove_pid_file(Path::new(&self.config.general.pid_file));
            }
            return Err(e);
        }

        let status_task = status::spawn_status_writer(
            std::path::PathBuf::from(&self.config.general.data_dir),
            self.start_time,
            ModuleList::new(self.modules.module_list()),
            self.registry_handle.clone(),
            self.controller.clone(),
            self.shutdown_tx.subscribe(),
        );

        tracing::info!("entering main event loop");
        let signal = wait_for_shutdown_signal().await?;
        tracing::info!(signal, "shutdown signal received");

        tracing::info!("broadcasting shutdown signal to all tasks");
        let _ = self.shutdown_tx.send(());
        let _ = status_task.await;

        self.shutdown().await?;

        if !self.config.general.pid_file.is_empty() {
            remove_pid_file(Path::new(&self.config.general.pid_file));
        }
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<()> {
        tracing::info!("stopping all modules");
        self.modules.stop_all().await
    }

    pub async fn health(&self) -> DaemonHealth {
        let statuses = self.modules.health_statuses().await;
        let modules: Vec<ModuleHealth> = statuses
            .into_iter()
            .map(|(name, enabled, status)| ModuleHealth { name, enabled, status })
            .collect();

        let overall_status = aggregate_status(&modules);
        let uptime_secs = self.start_time.elapsed().as_secs();
        DaemonHealth { status: overall_status, uptime_secs, modules }
    }

    pub fn config(&self) -> &NetsentryConfig {
        &self.config
    }
}

async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm =
        signal(SignalKind::terminate()).map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint =
        signal(SignalKind::interrupt()).map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

fn write_pid_file(path: &Path) -> Result<()> {
    use std::fs::{self, OpenOptions};
    use std::io::{ErrorKind, Write};

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let pid = std::process::id();
    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            let existing_pid = fs::read_to_string(path).unwrap_or_else(|_| "unknown".to_owned());
            return Err(anyhow::anyhow!(
                "PID file {} already exists with PID: {}. Is another instance running?",
                path.display(),
                existing_pid.trim()
            ));
        }
        Err(e) => return Err(e.into()),
    };

    writeln!(file, "{pid}")?;
    tracing::info!(pid, path = %path.display(), "PID file written");
    Ok(())
}

fn remove_pid_file(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        tracing::warn!(path = %path.display(), error = %e, "failed to remove PID file");
    } else {
        tracing::info!(path = %path.display(), "PID file removed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn write_pid_file_creates_parent_directory() {
        let temp_dir = std::env::temp_dir();
        let test_dir = temp_dir.join(format!("netsentry_test_{}", std::process::id()));
        let pid_file = test_dir.join("subdir").join("test.pid");

        let result = write_pid_file(&pid_file);
        assert!(result.is_ok());
        assert!(pid_file.exists());

        let content = fs::read_to_string(&pid_file).unwrap();
        assert_eq!(content.trim(), std::process::id().to_string());

        let _ = fs::remove_dir_all(&test_dir);
    }

    #[test]
    fn write_pid_file_fails_if_already_exists() {
        let temp_dir = std::env::temp_dir();
        let pid_file = temp_dir.join(format!("netsentry_test_dup_{}.pid", std::process::id()));
        fs::write(&pid_file, "12345").unwrap();

        let result = write_pid_file(&pid_file);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("12345"));

        let _ = fs::remove_file(&pid_file);
    }

    #[test]
    fn remove_pid_file_handles_nonexistent_gracefully() {
        let temp_dir = std::env::temp_dir();
        let pid_file = temp_dir.join(format!("netsentry_test_nonexist_{}.pid", std::process::id()));
        assert!(!pid_file.exists());
        remove_pid_file(&pid_file);
    }

    #[tokio::test]
    async fn builds_from_default_config() {
        let orchestrator = Orchestrator::build_from_config(NetsentryConfig::default()).await.unwrap();
        assert!(orchestrator.modules.count() >= 7);
    }

    #[tokio::test]
    async fn auto_block_disabled_skips_mitigation_modules() {
        let mut config = NetsentryConfig::default();
        config.firewall.auto_block = false;
        let orchestrator = Orchestrator::build_from_config(config).await.unwrap();
        let names: Vec<String> = orchestrator.modules.module_list().into_iter().map(|(n, _)| n).collect();
        assert!(!names.contains(&"mitigation-controller".to_owned()));
        assert!(!names.contains(&"expiry-sweeper".to_owned()));
    }
}
