//! Network scan detector: horizontal (one source hitting many hosts on one
//! port) and vertical (one source hitting many ports on one host) scans,
//! with a combined-scan upgrade when both fire for the same source.

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::time::{Duration, SystemTime};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use netsentry_core::config::NetworkScanConfig;
use netsentry_core::error::{NetsentryError, PipelineError};
use netsentry_core::event::{PacketEvent, PacketKind};
use netsentry_core::pipeline::{HealthStatus, Pipeline};
use netsentry_core::types::{Severity, Threat, ThreatDetail, ThreatKind};

use crate::registry::ThreatRegistryHandle;

const DETECTION_INTERVAL: Duration = Duration::from_secs(5);
const MAX_TARGETS_TRACKED: usize = 4096;
const NMAP_PORT_HINT: usize = 100;
const MASSCAN_HOST_HINT: usize = 50;

#[derive(Debug, Clone)]
struct HorizontalSample {
    ts: SystemTime,
    dst_ip: IpAddr,
}

#[derive(Debug, Clone)]
struct VerticalSample {
    ts: SystemTime,
    dst_port: u16,
}

/// Synchronous scan-detection state, keyed exactly as the spec describes:
/// horizontal by (src_ip, dst_port), vertical by (src_ip, dst_ip).
#[derive(Default)]
pub struct ScanState {
    horizontal: HashMap<(IpAddr, u16), Vec<HorizontalSample>>,
    vertical: HashMap<(IpAddr, IpAddr), Vec<VerticalSample>>,
    config: NetworkScanConfigOwned,
}

/// Owned copy of the tunable thresholds, so `ScanState::new` doesn't need a
/// borrow that outlives the struct.
struct NetworkScanConfigOwned {
    horizontal_threshold: usize,
    horizontal_window: Duration,
    vertical_threshold: usize,
    vertical_window: Duration,
}

impl Default for NetworkScanConfigOwned {
    fn default() -> Self {
        Self {
            horizontal_threshold: 10,
            horizontal_window: Duration::from_secs(60),
            vertical_threshold: 20,
            vertical_window: Duration::from_secs(60),
        }
    }
}

impl ScanState {
    pub fn new(config: &NetworkScanConfig) -> Self {
        Self {
            horizontal: HashMap::new(),
            vertical: HashMap::new(),
            config: NetworkScanConfigOwned {
                horizontal_threshold: config.horizontal_scan.threshold,
                horizontal_window: Duration::from_secs(config.horizontal_scan.window_secs),
                vertical_threshold: config.vertical_scan.threshold,
                vertical_window: Duration::from_secs(config.vertical_scan.window_secs),
            },
        }
    }

    pub fn record_event(&mut self, event: &PacketEvent) {
        let (Some(src_ip), Some(dst_ip), Some(dst_port)) = (event.src_ip(), event.dst_ip(), event.dst_port()) else {
            return;
        };
        let ts = event.timestamp();

        let horizontal_bucket = self.horizontal.entry((src_ip, dst_port)).or_default();
        horizontal_bucket.push(HorizontalSample { ts, dst_ip });
        if horizontal_bucket.len() > MAX_TARGETS_TRACKED {
            horizontal_bucket.remove(0);
        }

        let vertical_bucket = self.vertical.entry((src_ip, dst_ip)).or_default();
        vertical_bucket.push(VerticalSample { ts, dst_port });
        if vertical_bucket.len() > MAX_TARGETS_TRACKED {
            vertical_bucket.remove(0);
        }
    }

    /// Operator-triggered reset: drops all horizontal/vertical state for a
    /// source. Never called by the detection loop itself.
    pub fn clear_detection(&mut self, src_ip: IpAddr) {
        self.horizontal.retain(|(ip, _), _| *ip != src_ip);
        self.vertical.retain(|(ip, _), _| *ip != src_ip);
    }

    fn prune(&mut self, now: SystemTime) {
        let h_cutoff = now.checked_sub(self.config.horizontal_window).unwrap_or(SystemTime::UNIX_EPOCH);
        self.horizontal.retain(|_, samples| {
            samples.retain(|s| s.ts >= h_cutoff);
            !samples.is_empty()
        });
        let v_cutoff = now.checked_sub(self.config.vertical_window).unwrap_or(SystemTime::UNIX_EPOCH);
        self.vertical.retain(|_, samples| {
            samples.retain(|s| s.ts >= v_cutoff);
            !samples.is_empty()
        });
    }

    fn make_threat(kind: ThreatKind, src_ip: IpAddr, detail: ThreatDetail, now: SystemTime) -> Threat {
        Threat {
            kind,
            severity: Severity::High,
            source_id: src_ip.to_string(),
            detail,
            first_seen: now,
            last_seen: now,
        }
    }

    /// Runs one detection pass over the current windows, returning any
    /// threats. Vertical scans upgrade a same-source horizontal threat (if
    /// present in `existing_horizontal`) into a combined scan.
    pub fn run_detection(&mut self, now: SystemTime) -> Vec<Threat> {
        self.prune(now);

        let mut horizontal_hits: HashMap<IpAddr, HashSet<IpAddr>> = HashMap::new();
        for ((src_ip, _port), samples) in &self.horizontal {
            let hosts: HashSet<IpAddr> = samples.iter().map(|s| s.dst_ip).collect();
            if hosts.len() >= self.config.horizontal_threshold {
                horizontal_hits.entry(*src_ip).or_default().extend(hosts);
            }
        }

        // Keyed by src_ip; tracks both the aggregate port set and which
        // destination(s) actually tripped the per-(src_ip, dst_ip) threshold,
        // since a combined-scan upgrade must report the vertically-scanned
        // target, not the horizontal host set.
        let mut vertical_hits: HashMap<IpAddr, (HashSet<u16>, HashSet<IpAddr>)> = HashMap::new();
        for ((src_ip, dst_ip), samples) in &self.vertical {
            let ports: HashSet<u16> = samples.iter().map(|s| s.dst_port).collect();
            if ports.len() >= self.config.vertical_threshold {
                let entry = vertical_hits.entry(*src_ip).or_default();
                entry.0.extend(ports);
                entry.1.insert(*dst_ip);
            }
        }

        let mut threats = Vec::new();
        for (&src_ip, hosts) in &horizontal_hits {
            let combined = vertical_hits.get(&src_ip);
            let kind = if combined.is_some() { ThreatKind::CombinedScan } else { ThreatKind::HorizontalScan };
            let known_scanner = if hosts.len() >= MASSCAN_HOST_HINT { Some("masscan".to_owned()) } else { None };
            // On a combined upgrade the vertical target(s) take over as the
            // reported targets, matching the source agent's upgrade rule.
            let targets: Vec<IpAddr> = match combined {
                Some((_, vertical_targets)) => vertical_targets.iter().copied().collect(),
                None => hosts.iter().copied().collect(),
            };
            threats.push(Self::make_threat(
                kind,
                src_ip,
                ThreatDetail::Scan {
                    target_port: None,
                    hosts_scanned: hosts.len(),
                    ports_scanned: combined.map(|(ports, _)| ports.len()).unwrap_or(0),
                    targets,
                    known_scanner,
                },
                now,
            ));
        }
        for (&src_ip, (ports, vertical_targets)) in &vertical_hits {
            if horizontal_hits.contains_key(&src_ip) {
                // already emitted as a combined scan above.
                continue;
            }
            let known_scanner = if ports.len() >= NMAP_PORT_HINT { Some("nmap".to_owned()) } else { None };
            threats.push(Self::make_threat(
                ThreatKind::VerticalScan,
                src_ip,
                ThreatDetail::Scan {
                    target_port: None,
                    hosts_scanned: 0,
                    ports_scanned: ports.len(),
                    targets: vertical_targets.iter().copied().collect(),
                    known_scanner,
                },
                now,
            ));
        }
        threats
    }
}

pub struct NetworkScanDetector {
    state: Option<ScanState>,
    event_rx: Option<mpsc::Receiver<PacketEvent>>,
    registry: ThreatRegistryHandle,
    cancel: CancellationToken,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl NetworkScanDetector {
    pub fn new(config: &NetworkScanConfig, event_rx: mpsc::Receiver<PacketEvent>, registry: ThreatRegistryHandle) -> Self {
        Self {
            state: Some(ScanState::new(config)),
            event_rx: Some(event_rx),
            registry,
            cancel: CancellationToken::new(),
            task: None,
        }
    }
}

async fn detect_loop(
    mut state: ScanState,
    mut event_rx: mpsc::Receiver<PacketEvent>,
    registry: ThreatRegistryHandle,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(DETECTION_INTERVAL);
    loop {
        tokio::select! {
            event = event_rx.recv() => {
                match event {
                    Some(event) if matches!(event.kind(), PacketKind::Syn | PacketKind::Udp) => {
                        state.record_event(&event);
                    }
                    Some(_) => {}
                    None => {
                        tracing::info!("network scan detector input channel closed");
                        break;
                    }
                }
            }
            _ = ticker.tick() => {
                for threat in state.run_detection(SystemTime::now()) {
                    registry.upsert(threat.source_id.clone(), threat).await;
                }
            }
            _ = cancel.cancelled() => {
                tracing::info!("network scan detector stopping");
                break;
            }
        }
    }
}

impl Pipeline for NetworkScanDetector {
    async fn start(&mut self) -> Result<(), NetsentryError> {
        if self.task.is_some() {
            return Err(PipelineError::AlreadyRunning.into());
        }
        let state = self.state.take().ok_or(PipelineError::InitFailed("scan detector already consumed".to_owned()))?;
        let event_rx = self
            .event_rx
            .take()
            .ok_or(PipelineError::InitFailed("scan detector can only be started once".to_owned()))?;
        let registry = self.registry.clone();
        let cancel = self.cancel.clone();
        self.task = Some(tokio::spawn(detect_loop(state, event_rx, registry, cancel)));
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
