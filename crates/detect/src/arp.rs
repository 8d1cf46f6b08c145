//! ARP spoofing detector. Reads the kernel neighbor table instead of
//! subscribing to live events; gateway discovery runs once at start.
//!
//! Split into [`ArpState`] (synchronous, directly testable) and
//! [`ArpDetector`] (the async `Pipeline` shell that owns the timer and the
//! file reads).

use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::time::{Duration, SystemTime};

use tokio_util::sync::CancellationToken;

use netsentry_capture::neighbor::{read_neighbor_table, NeighborTable};
use netsentry_capture::route::read_default_gateway;
use netsentry_core::config::ArpConfig;
use netsentry_core::error::{NetsentryError, PipelineError};
use netsentry_core::pipeline::{HealthStatus, Pipeline};
use netsentry_core::types::{Severity, SerializableMac, Threat, ThreatDetail, ThreatKind};
use pnet_datalink::MacAddr;

use crate::registry::ThreatRegistryHandle;

const HISTORY_RETENTION: Duration = Duration::from_secs(3600);

/// One MAC-change observation for a given IP.
#[derive(Debug, Clone, Copy)]
struct ChangeRecord {
    ts: SystemTime,
    mac: MacAddr,
}

/// All mutable detector state, with synchronous methods so the detection
/// logic can be unit tested without an async runtime.
pub struct ArpState {
    threshold: u32,
    trusted_devices: HashSet<Ipv4Addr>,
    gateway: Option<Ipv4Addr>,
    observed: NeighborTable,
    history: HashMap<Ipv4Addr, Vec<ChangeRecord>>,
}

impl ArpState {
    pub fn new(config: &ArpConfig) -> Self {
        let trusted_devices = config
            .trusted_devices
            .iter()
            .filter_map(|s| s.parse().ok())
            .collect();
        Self {
            threshold: config.threshold,
            trusted_devices,
            gateway: None,
            observed: NeighborTable::new(),
            history: HashMap::new(),
        }
    }

    pub fn set_gateway(&mut self, gateway: Ipv4Addr) {
        self.gateway = Some(gateway);
    }

    /// Folds a fresh neighbor-table read into history, returning any
    /// threats the new snapshot produces. A MAC set change for an IP is
    /// recorded as a history entry; the multi-MAC and frequency rules are
    /// then evaluated against the updated table.
    pub fn process_snapshot(&mut self, snapshot: NeighborTable, now: SystemTime) -> Vec<Threat> {
        for (ip, macs) in &snapshot {
            let previous = self.observed.get(ip);
            // An IP's very first sighting is a baseline observation, not a
            // change: only a MAC appearing after the IP was already known
            // counts toward the change history.
            let Some(previous) = previous else { continue };
            if previous != macs {
                for mac in macs {
                    if previous.contains(mac) {
                        continue;
                    }
                    self.history.entry(*ip).or_default().push(ChangeRecord { ts: now, mac: *mac });
                }
            }
        }
        self.observed = snapshot;
        self.prune_history(now);

        let mut threats = Vec::new();
        for (ip, macs) in &self.observed {
            if macs.len() > 1 {
                let severity = if Some(*ip) == self.gateway {
                    Severity::Critical
                } else {
                    Severity::High
                };
                threats.push(self.make_threat(*ip, severity, macs.iter().copied().collect(), now));
                continue;
            }
            if self.trusted_devices.contains(ip) {
                continue;
            }
            let changes = self.history.get(ip).map(Vec::len).unwrap_or(0);
            if changes as u32 >= self.threshold {
                let macs: Vec<MacAddr> = self
                    .history
                    .get(ip)
                    .map(|h| h.iter().map(|c| c.mac).collect())
                    .unwrap_or_default();
                threats.push(self.make_threat(*ip, Severity::Medium, macs, now));
            }
        }
        threats
    }

    fn make_threat(&self, ip: Ipv4Addr, severity: Severity, macs: Vec<MacAddr>, now: SystemTime) -> Threat {
        Threat {
            kind: ThreatKind::ArpSpoofing,
            severity,
            source_id: ip.to_string(),
            detail: ThreatDetail::ArpSpoofing {
                macs: macs.into_iter().map(SerializableMac::from).collect(),
                is_gateway: Some(ip) == self.gateway,
            },
            first_seen: now,
            last_seen: now,
        }
    }

    pub fn prune_history(&mut self, now: SystemTime) {
        for records in self.history.values_mut() {
            records.retain(|r| now.duration_since(r.ts).unwrap_or(Duration::ZERO) < HISTORY_RETENTION);
        }
        self.history.retain(|_, records| !records.is_empty());
    }
}

pub struct ArpDetector {
    state: ArpState,
    gateway_path: String,
    neighbor_path: String,
    interval: Duration,
    registry: ThreatRegistryHandle,
    cancel: CancellationToken,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl ArpDetector {
    pub fn new(
        config: &ArpConfig,
        neighbor_path: impl Into<String>,
        route_path: impl Into<String>,
        registry: ThreatRegistryHandle,
    ) -> Self {
        Self {
            state: ArpState::new(config),
            gateway_path: route_path.into(),
            neighbor_path: neighbor_path.into(),
            interval: Duration::from_secs(config.check_interval_secs.max(1)),
            registry,
            cancel: CancellationToken::new(),
            task: None,
        }
    }
}

async fn detect_loop(
    mut state: ArpState,
    neighbor_path: String,
    interval: Duration,
    registry: ThreatRegistryHandle,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match read_neighbor_table(&neighbor_path).await {
                    Ok(snapshot) => {
                        let threats = state.process_snapshot(snapshot, SystemTime::now());
                        for threat in threats {
                            registry.upsert(threat.source_id.clone(), threat).await;
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "failed to read neighbor table"),
                }
            }
            _ = cancel.cancelled() => {
                tracing::info!("arp detector stopping");
                break;
            }
        }
    }
}

impl Pipeline for ArpDetector {
    async fn start(&mut self) -> Result<(), NetsentryError> {
        if self.task.is_some() {
            return Err(PipelineError::AlreadyRunning.into());
        }
        match read_default_gateway(&self.gateway_path).await {
            Ok(gateway) => self.state.set_gateway(gateway),
            Err(e) => tracing::warn!(error = %e, "no default gateway found, gateway upgrade disabled"),
        }

        let state = std::mem::replace(&mut self.state, ArpState::new(&ArpConfig::default()));
        let neighbor_path = self.neighbor_path.clone();
        let interval = self.interval;
        let registry = self.registry.clone();
        let cancel = self.cancel.clone();
        self.task = Some(tokio::spawn(detect_loop(state, neighbor_path, interval, registry, cancel)));
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
            Some(_) => HealthStatus::Unhealthy("detector task exited".to_owned()),
            None => HealthStatus::Unhealthy("not running".to_owned()),
        }
    }
}
