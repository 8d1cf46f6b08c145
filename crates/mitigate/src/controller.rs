//! Mitigation controller: drains the threat registry on a fixed tick,
//! derives a mitigation target per threat, and reconciles it against the
//! packet-filter driver subject to the whitelist and per-target
//! deduplication (extend-don't-reinstall).

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde::Serialize;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use netsentry_core::config::{FirewallConfig, GeneralConfig};
use netsentry_core::error::{NetsentryError, PipelineError};
use netsentry_core::metrics::{
    ACTIVE_BLOCKS, BLOCKS_EXTENDED_TOTAL, BLOCKS_INSTALLED_TOTAL, MITIGATION_WHITELIST_SUPPRESSED_TOTAL,
};
use netsentry_core::pipeline::{HealthStatus, Pipeline};
use netsentry_core::types::{MitigationTarget, SerializableMac, Threat, ThreatDetail, ThreatKind};

use netsentry_detect::registry::ThreatRegistryHandle;

use crate::driver::{DynPacketFilterDriver, RuleHandle};

const BLACKLIST_DURATION: Duration = Duration::from_secs(365 * 24 * 3600);

#[derive(Debug, Clone, Serialize)]
pub struct ActiveBlock {
    pub target: MitigationTarget,
    pub reason: String,
    pub installed_at: SystemTime,
    pub expires_at: SystemTime,
    pub handle: RuleHandle,
}

fn mitigation_target(threat: &Threat) -> Option<MitigationTarget> {
    match (&threat.kind, &threat.detail) {
        (ThreatKind::ArpSpoofing, ThreatDetail::ArpSpoofing { macs, .. }) => {
            let ip: std::net::Ipv4Addr = threat.source_id.parse().ok()?;
            let mac = *macs.first()?;
            Some(MitigationTarget::IpMac(ip, mac))
        }
        _ => {
            let ip: IpAddr = threat.source_id.parse().ok()?;
            Some(MitigationTarget::Ip(ip))
        }
    }
}

fn target_key(target: &MitigationTarget) -> String {
    match target {
        MitigationTarget::Ip(ip) => ip.to_string(),
        MitigationTarget::IpMac(ip, mac) => format!("{ip}/{mac}"),
    }
}

#[derive(Clone)]
pub struct MitigationController {
    driver: Arc<dyn DynPacketFilterDriver>,
    registry: ThreatRegistryHandle,
    whitelist: Vec<IpAddr>,
    blacklist: Vec<IpAddr>,
    block_duration: Duration,
    active: Arc<Mutex<HashMap<String, ActiveBlock>>>,
}

impl MitigationController {
    pub fn new(
        driver: Arc<dyn DynPacketFilterDriver>,
        registry: ThreatRegistryHandle,
        firewall: &FirewallConfig,
        block_duration: Duration,
    ) -> Self {
        Self {
            driver,
            registry,
            whitelist: firewall.whitelist.iter().filter_map(|s| s.parse().ok()).collect(),
            blacklist: firewall.blacklist.iter().filter_map(|s| s.parse().ok()).collect(),
            block_duration,
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn is_whitelisted(&self, target: &MitigationTarget) -> bool {
        let ip = match target {
            MitigationTarget::Ip(ip) => *ip,
            MitigationTarget::IpMac(ip, _) => IpAddr::V4(*ip),
        };
        self.whitelist.contains(&ip)
    }

    async fn install(&self, target: &MitigationTarget) -> Result<RuleHandle, NetsentryError> {
        match target {
            MitigationTarget::Ip(ip) => self.driver.install_ip_drop(*ip).await,
            MitigationTarget::IpMac(ip, mac) => self.driver.install_arp_drop(*ip, *mac).await,
        }
    }

    /// Reconciles one threat against the active-block table, installing,
    /// extending or suppressing as appropriate.
    pub async fn reconcile_threat(&self, threat: &Threat, now: SystemTime) {
        let Some(target) = mitigation_target(threat) else {
            tracing::warn!(source = %threat.source_id, "threat has no parseable mitigation target");
            return;
        };
        self.reconcile_target(target, format!("{:?}", threat.kind), now).await;
    }

    pub(crate) async fn reconcile_target(&self, target: MitigationTarget, reason: String, now: SystemTime) {
        if self.is_whitelisted(&target) {
            metrics::counter!(MITIGATION_WHITELIST_SUPPRESSED_TOTAL).increment(1);
            tracing::debug!(target = %target_key(&target), "mitigation suppressed: target is whitelisted");
            return;
        }

        let key = target_key(&target);
        let mut guard = self.active.lock().await;
        if let Some(block) = guard.get_mut(&key) {
            block.expires_at = now + self.block_duration;
            metrics::counter!(BLOCKS_EXTENDED_TOTAL).increment(1);
            tracing::debug!(target = %key, "mitigation refusal: already blocked, extending expiry");
            return;
        }
        drop(guard);

        match self.install(&target).await {
            Ok(handle) => {
                let block = ActiveBlock {
                    target: target.clone(),
                    reason,
                    installed_at: now,
                    expires_at: now + self.block_duration,
                    handle,
                };
                self.active.lock().await.insert(key, block);
                metrics::counter!(BLOCKS_INSTALLED_TOTAL).increment(1);
                metrics::gauge!(ACTIVE_BLOCKS).set(self.active.lock().await.len() as f64);
            }
            Err(e) => tracing::error!(target = %key, error = %e, "failed to install mitigation"),
        }
    }

    /// Installs blacklisted sources with a one-year duration. Called once
    /// at startup, before the controller's first tick.
    pub async fn apply_blacklist(&self, now: SystemTime) {
        for ip in self.blacklist.clone() {
            self.reconcile_target(MitigationTarget::Ip(ip), "blacklist".to_owned(), now).await;
            if let Some(block) = self.active.lock().await.get_mut(&ip.to_string()) {
                block.expires_at = now + BLACKLIST_DURATION;
            }
        }
    }

    /// Operator/config-driven throttle: installs a rate limit ahead of an
    /// unconditional drop. Never invoked automatically by a detector.
    pub async fn rate_limit(&self, ip: IpAddr, rate_pps: u32, now: SystemTime) -> Result<(), NetsentryError> {
        let handle = self.driver.install_rate_limit(ip, rate_pps).await?;
        let block = ActiveBlock {
            target: MitigationTarget::Ip(ip),
            reason: "operator rate_limit".to_owned(),
            installed_at: now,
            expires_at: now + self.block_duration,
            handle,
        };
        self.active.lock().await.insert(ip.to_string(), block);
        Ok(())
    }

    pub async fn active_blocks(&self) -> Vec<ActiveBlock> {
        self.active.lock().await.values().cloned().collect()
    }

    pub(crate) fn active_handle(&self) -> Arc<Mutex<HashMap<String, ActiveBlock>>> {
        self.active.clone()
    }

    pub(crate) fn driver_handle(&self) -> Arc<dyn DynPacketFilterDriver> {
        self.driver.clone()
    }
}

pub struct MitigationControllerPipeline {
    controller: MitigationController,
    check_interval: Duration,
    cancel: CancellationToken,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl MitigationControllerPipeline {
    pub fn new(controller: MitigationController, general: &GeneralConfig) -> Self {
        Self {
            controller,
            check_interval: Duration::from_secs(general.check_interval_secs.max(1)),
            cancel: CancellationToken::new(),
            task: None,
        }
    }

    pub fn controller(&self) -> MitigationController {
        self.controller.clone()
    }
}

async fn controller_loop(
    controller: MitigationController,
    registry: ThreatRegistryHandle,
    check_interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(check_interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = SystemTime::now();
                for threat in registry.open_threats().await {
                    controller.reconcile_threat(&threat, now).await;
                }
            }
            _ = cancel.cancelled() => {
                tracing::info!("mitigation controller stopping");
                break;
            }
        }
    }
}

impl Pipeline for MitigationControllerPipeline {
    async fn start(&mut self) -> Result<(), NetsentryError> {
        if self.task.is_some() {
            return Err(PipelineError::AlreadyRunning.into());
        }
        self.controller.apply_blacklist(SystemTime::now()).await;
        self.controller.driver.ensure_chain().await?;

        let controller = self.controller.clone();
        let registry = self.controller.registry.clone();
        let check_interval = self.check_interval;
        let cancel = self.cancel.clone();
        self.task = Some(tokio::spawn(controller_loop(controller, registry, check_interval, cancel)));
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), NetsentryError> {
        let task = self.task.take().ok_or(PipelineError::NotRunning)?;
        self.cancel.cancel();
        let _ = task.await;
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match &self.task {
            Some(task) if !task.is_finished() => HealthStatus::Healthy,
            Some(_) => HealthStatus::Unhealthy("controller task exited".to_owned()),
            None => HealthStatus::Unhealthy("not running".to_owned()),
        }
    }
}
