//! DDoS flood detector: SYN/UDP/ICMP, plus the half-open SYN-ACK ratio and
//! incomplete-connection checks. Split into [`DdosState`] (synchronous,
//! testable) and [`DdosDetector`] (the async `Pipeline` shell).

use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use netsentry_core::cms::CountMinSketch;
use netsentry_core::config::DdosConfig;
use netsentry_core::error::{NetsentryError, PipelineError};
use netsentry_core::event::{PacketEvent, PacketKind};
use netsentry_core::pipeline::{HealthStatus, Pipeline};
use netsentry_core::types::{Severity, Threat, ThreatDetail, ThreatKind};
use netsentry_core::window::SlidingWindowCounter;

use crate::registry::ThreatRegistryHandle;

const ONE_SECOND: Duration = Duration::from_secs(1);
const AGGREGATE_WINDOW: Duration = Duration::from_secs(60);
const PER_SOURCE_MAX_LEN: usize = 4096;
const AGGREGATE_MAX_LEN: usize = 200_000;
const ANOMALY_HISTORY_LEN: usize = 300;
const ANOMALY_MIN_SAMPLES: usize = 10;

const FLOOD_KINDS: [PacketKind; 3] = [PacketKind::Syn, PacketKind::Udp, PacketKind::Icmp];

/// The DDoS detector's published last-second counts per kind, sampled by the
/// baseline tracker once per second.
#[derive(Clone, Default)]
pub struct DdosStatsHandle(Arc<Mutex<HashMap<PacketKind, u64>>>);

impl DdosStatsHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, counts: HashMap<PacketKind, u64>) {
        *self.0.lock().unwrap() = counts;
    }

    pub fn latest(&self) -> HashMap<PacketKind, u64> {
        self.0.lock().unwrap().clone()
    }
}

/// Adaptive thresholds the baseline tracker writes once per minute and the
/// DDoS detector reads on every detection tick. Never below the static
/// configured value.
#[derive(Clone, Default)]
pub struct AdaptiveThresholdsHandle(Arc<Mutex<HashMap<PacketKind, u64>>>);

impl AdaptiveThresholdsHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, kind: PacketKind, value: u64) {
        self.0.lock().unwrap().insert(kind, value);
    }

    pub fn resolve(&self, kind: PacketKind, static_threshold: u64) -> u64 {
        self.0
            .lock()
            .unwrap()
            .get(&kind)
            .copied()
            .unwrap_or(static_threshold)
            .max(static_threshold)
    }
}

fn kind_to_threat_kind(kind: PacketKind) -> ThreatKind {
    match kind {
        PacketKind::Syn => ThreatKind::DdosSynFlood,
        PacketKind::Udp => ThreatKind::DdosUdpFlood,
        PacketKind::Icmp => ThreatKind::DdosIcmpFlood,
        PacketKind::SynAck | PacketKind::Arp => unreachable!("not a flood kind"),
    }
}

fn kind_severity(kind: PacketKind) -> Severity {
    match kind {
        PacketKind::Syn | PacketKind::Udp => Severity::High,
        PacketKind::Icmp => Severity::Medium,
        PacketKind::SynAck | PacketKind::Arp => unreachable!("not a flood kind"),
    }
}

pub struct DdosState {
    config: DdosConfig,
    per_source: HashMap<PacketKind, HashMap<IpAddr, SlidingWindowCounter>>,
    aggregate: HashMap<PacketKind, SlidingWindowCounter>,
    sketches: HashMap<PacketKind, CountMinSketch>,
    incomplete: HashMap<IpAddr, u64>,
    anomaly_history: HashMap<PacketKind, VecDeque<u64>>,
    thresholds: AdaptiveThresholdsHandle,
    last_sketch_reset: SystemTime,
}

impl DdosState {
    pub fn new(config: &DdosConfig, thresholds: AdaptiveThresholdsHandle, now: SystemTime) -> Self {
        let mut sketches = HashMap::new();
        for kind in FLOOD_KINDS {
            sketches.insert(kind, CountMinSketch::new(config.count_min_sketch_width, config.count_min_sketch_depth));
        }
        Self {
            config: config.clone(),
            per_source: HashMap::new(),
            aggregate: HashMap::new(),
            sketches,
            incomplete: HashMap::new(),
            anomaly_history: HashMap::new(),
            thresholds,
            last_sketch_reset: now,
        }
    }

    fn aggregate_entry(&mut self, kind: PacketKind) -> &mut SlidingWindowCounter {
        self.aggregate.entry(kind).or_insert_with(|| SlidingWindowCounter::new(AGGREGATE_MAX_LEN))
    }

    fn per_source_entry(&mut self, kind: PacketKind, ip: IpAddr) -> &mut SlidingWindowCounter {
        self.per_source
            .entry(kind)
            .or_default()
            .entry(ip)
            .or_insert_with(|| SlidingWindowCounter::new(PER_SOURCE_MAX_LEN))
    }

    pub fn record_event(&mut self, event: &PacketEvent) {
        match *event {
            PacketEvent::Syn { ts, src_ip, .. } => {
                self.aggregate_entry(PacketKind::Syn).append(ts);
                self.per_source_entry(PacketKind::Syn, src_ip).append(ts);
                self.sketches.get_mut(&PacketKind::Syn).unwrap().increment(src_ip.to_string().as_bytes(), 1);
                *self.incomplete.entry(src_ip).or_insert(0) += 1;
            }
            PacketEvent::SynAck { ts, dst_ip, .. } => {
                self.aggregate_entry(PacketKind::SynAck).append(ts);
                if let Some(count) = self.incomplete.get_mut(&dst_ip) {
                    *count = count.saturating_sub(1);
                }
            }
            PacketEvent::Udp { ts, src_ip, .. } => {
                self.aggregate_entry(PacketKind::Udp).append(ts);
                self.per_source_entry(PacketKind::Udp, src_ip).append(ts);
                self.sketches.get_mut(&PacketKind::Udp).unwrap().increment(src_ip.to_string().as_bytes(), 1);
            }
            PacketEvent::Icmp { ts, src_ip, .. } => {
                self.aggregate_entry(PacketKind::Icmp).append(ts);
                self.per_source_entry(PacketKind::Icmp, src_ip).append(ts);
                self.sketches.get_mut(&PacketKind::Icmp).unwrap().increment(src_ip.to_string().as_bytes(), 1);
            }
            PacketEvent::Arp { .. } => {}
        }
    }

    fn resolved_threshold(&self, kind: PacketKind) -> u64 {
        let static_threshold = match kind {
            PacketKind::Syn => self.config.syn_flood.threshold,
            PacketKind::Udp => self.config.udp_flood.threshold,
            PacketKind::Icmp => self.config.icmp_flood.threshold,
            PacketKind::SynAck | PacketKind::Arp => unreachable!("not a flood kind"),
        };
        if self.config.adaptive_thresholds {
            self.thresholds.resolve(kind, static_threshold)
        } else {
            static_threshold
        }
    }

    fn make_threat(&self, kind: PacketKind, pps: f64, source: Option<IpAddr>, now: SystemTime) -> Threat {
        let source_id = source.map(|ip| ip.to_string()).unwrap_or_else(|| format!("aggregate:{kind:?}"));
        Threat {
            kind: kind_to_threat_kind(kind),
            severity: kind_severity(kind),
            source_id,
            detail: ThreatDetail::DdosFlood {
                packets_per_second: pps,
                attributed: source.is_some(),
            },
            first_seen: now,
            last_seen: now,
        }
    }

    fn record_anomaly_sample(&mut self, kind: PacketKind, count: u64) {
        let history = self.anomaly_history.entry(kind).or_default();
        if history.len() >= ANOMALY_MIN_SAMPLES {
            let mean = history.iter().sum::<u64>() as f64 / history.len() as f64;
            let variance = history.iter().map(|&v| (v as f64 - mean).powi(2)).sum::<f64>() / history.len() as f64;
            let stddev = variance.sqrt();
            if (count as f64) > mean + 3.0 * stddev {
                tracing::debug!(?kind, count, mean, stddev, "ddos anomaly: sample exceeds rolling baseline");
            }
        }
        if history.len() >= ANOMALY_HISTORY_LEN {
            history.pop_front();
        }
        history.push_back(count);
    }

    fn prune(&mut self, now: SystemTime) {
        let cutoff = now.checked_sub(AGGREGATE_WINDOW).unwrap_or(SystemTime::UNIX_EPOCH);
        for counter in self.aggregate.values_mut() {
            counter.prune_before(cutoff);
        }
        for sources in self.per_source.values_mut() {
            for counter in sources.values_mut() {
                counter.prune_before(cutoff);
            }
        }
    }

    fn maybe_reset_sketches(&mut self, now: SystemTime) {
        let interval = Duration::from_secs(self.config.sketch_reset_interval_secs);
        if now.duration_since(self.last_sketch_reset).unwrap_or(Duration::ZERO) >= interval {
            for sketch in self.sketches.values_mut() {
                sketch.reset();
            }
            self.last_sketch_reset = now;
        }
    }

    /// Runs one detection pass, returning any threats observed and the
    /// per-kind one-second counts for the baseline tracker to sample.
    pub fn run_detection(&mut self, now: SystemTime) -> (Vec<Threat>, HashMap<PacketKind, u64>) {
        self.prune(now);
        let mut threats = Vec::new();
        let mut published = HashMap::new();

        for kind in FLOOD_KINDS {
            let agg_count = self.aggregate.get(&kind).map(|c| c.count_within(now, ONE_SECOND) as u64).unwrap_or(0);
            published.insert(kind, agg_count);
            self.record_anomaly_sample(kind, agg_count);

            let threshold = self.resolved_threshold(kind);
            if agg_count > threshold {
                threats.push(self.make_threat(kind, agg_count as f64, None, now));
            }

            if let Some(sources) = self.per_source.get(&kind) {
                for (&ip, counter) in sources {
                    let count = counter.count_within(now, ONE_SECOND) as u64;
                    if count as f64 > threshold as f64 / 10.0 {
                        threats.push(self.make_threat(kind, count as f64, Some(ip), now));
                    }
                }
            }
        }

        let syn_count = self.aggregate.get(&PacketKind::Syn).map(|c| c.count_within(now, ONE_SECOND) as u64).unwrap_or(0);
        let synack_count =
            self.aggregate.get(&PacketKind::SynAck).map(|c| c.count_within(now, ONE_SECOND) as u64).unwrap_or(0);
        if syn_count > 0 {
            let ratio = synack_count as f64 / syn_count as f64;
            if ratio < self.config.syn_ack_ratio_threshold {
                threats.push(self.make_threat(PacketKind::Syn, syn_count as f64, None, now));
            }
        }

        for (&ip, &count) in &self.incomplete {
            if count > self.config.incomplete_connections_threshold {
                threats.push(self.make_threat(PacketKind::Syn, count as f64, Some(ip), now));
            }
        }

        self.maybe_reset_sketches(now);
        (threats, published)
    }
}

pub struct DdosDetector {
    state: Option<DdosState>,
    event_rx: Option<mpsc::Receiver<PacketEvent>>,
    stats: DdosStatsHandle,
    registry: ThreatRegistryHandle,
    cancel: CancellationToken,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl DdosDetector {
    pub fn new(
        config: &DdosConfig,
        event_rx: mpsc::Receiver<PacketEvent>,
        thresholds: AdaptiveThresholdsHandle,
        stats: DdosStatsHandle,
        registry: ThreatRegistryHandle,
    ) -> Self {
        Self {
            state: Some(DdosState::new(config, thresholds, SystemTime::now())),
            event_rx: Some(event_rx),
            stats,
            registry,
            cancel: CancellationToken::new(),
            task: None,
        }
    }
}

async fn detect_loop(
    mut state: DdosState,
    mut event_rx: mpsc::Receiver<PacketEvent>,
    stats: DdosStatsHandle,
    registry: ThreatRegistryHandle,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(ONE_SECOND);
    loop {
        tokio::select! {
            event = event_rx.recv() => {
                match event {
                    Some(event) => state.record_event(&event),
                    None => {
                        tracing::info!("ddos detector input channel closed");
                        break;
                    }
                }
            }
            _ = ticker.tick() => {
                let (threats, counts) = state.run_detection(SystemTime::now());
                stats.publish(counts);
                for threat in threats {
                    registry.upsert(threat.source_id.clone(), threat).await;
                }
            }
            _ = cancel.cancelled() => {
                tracing::info!("ddos detector stopping");
                break;
            }
        }
    }
}

impl Pipeline for DdosDetector {
    async fn start(&mut self) -> Result<(), NetsentryError> {
        if self.task.is_some() {
            return Err(PipelineError::AlreadyRunning.into());
        }
        let state = self.state.take().ok_or(PipelineError::InitFailed("ddos detector already consumed".to_owned()))?;
        let event_rx = self
            .event_rx
            .take()
            .ok_or(PipelineError::InitFailed("ddos detector can only be started once".to_owned()))?;
        let stats = self.stats.clone();
        let registry = self.registry.clone();
        let cancel = self.cancel.clone();
        self.task = Some(tokio::spawn(detect_loop(state, event_rx, stats, registry, cancel)));
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn syn(ts: SystemTime, src: u8) -> PacketEvent {
        PacketEvent::Syn {
            ts,
            src_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, src)),
            dst_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 254)),
            src_port: 10000 + src as u16,
            dst_port: 80,
        }
    }

    fn syn_ack(ts: SystemTime, dst: u8) -> PacketEvent {
        PacketEvent::SynAck {
            ts,
            src_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 254)),
            dst_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, dst)),
            src_port: 80,
            dst_port: 10000 + dst as u16,
        }
    }

    #[test]
    fn aggregate_syn_flood_crosses_static_threshold() {
        let mut config = DdosConfig::default();
        config.syn_flood.threshold = 5;
        config.adaptive_thresholds = false;
        let now = SystemTime::now();
        let mut state = DdosState::new(&config, AdaptiveThresholdsHandle::new(), now);

        for src in 0..10u8 {
            state.record_event(&syn(now, src));
        }

        let (threats, counts) = state.run_detection(now);
        assert_eq!(counts[&PacketKind::Syn], 10);
        assert!(threats.iter().any(|t| t.kind == ThreatKind::DdosSynFlood && !matches!(&t.detail, ThreatDetail::DdosFlood { attributed, .. } if *attributed)));
    }

    #[test]
    fn single_source_flood_is_attributed() {
        let mut config = DdosConfig::default();
        config.syn_flood.threshold = 100;
        config.adaptive_thresholds = false;
        let now = SystemTime::now();
        let mut state = DdosState::new(&config, AdaptiveThresholdsHandle::new(), now);

        for _ in 0..20 {
            state.record_event(&syn(now, 7));
        }

        let (threats, _) = state.run_detection(now);
        assert!(threats.iter().any(|t| t.source_id == "10.0.0.7"));
    }

    #[test]
    fn low_syn_ack_ratio_triggers_aggregate_threat() {
        let mut config = DdosConfig::default();
        config.syn_flood.threshold = 1000;
        config.adaptive_thresholds = false;
        config.syn_ack_ratio_threshold = 0.5;
        let now = SystemTime::now();
        let mut state = DdosState::new(&config, AdaptiveThresholdsHandle::new(), now);

        for src in 0..20u8 {
            state.record_event(&syn(now, src));
        }
        state.record_event(&syn_ack(now, 0));

        let (threats, _) = state.run_detection(now);
        assert!(threats.iter().any(|t| t.kind == ThreatKind::DdosSynFlood));
    }

    #[test]
    fn synack_clears_incomplete_counter() {
        let config = DdosConfig::default();
        let now = SystemTime::now();
        let mut state = DdosState::new(&config, AdaptiveThresholdsHandle::new(), now);

        state.record_event(&syn(now, 1));
        state.record_event(&syn_ack(now, 1));
        assert_eq!(state.incomplete[&IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))], 0);
    }

    #[test]
    fn incomplete_connections_over_threshold_is_attributed() {
        let mut config = DdosConfig::default();
        config.incomplete_connections_threshold = 3;
        config.syn_flood.threshold = 1000;
        config.adaptive_thresholds = false;
        let now = SystemTime::now();
        let mut state = DdosState::new(&config, AdaptiveThresholdsHandle::new(), now);

        for _ in 0..5 {
            state.record_event(&syn(now, 9));
        }

        let (threats, _) = state.run_detection(now);
        assert!(threats.iter().any(|t| t.source_id == "10.0.0.9"));
    }

    #[test]
    fn adaptive_threshold_never_drops_below_static() {
        let thresholds = AdaptiveThresholdsHandle::new();
        assert_eq!(thresholds.resolve(PacketKind::Syn, 100), 100);
        thresholds.set(PacketKind::Syn, 40);
        assert_eq!(thresholds.resolve(PacketKind::Syn, 100), 100);
        thresholds.set(PacketKind::Syn, 250);
        assert_eq!(thresholds.resolve(PacketKind::Syn, 100), 250);
    }

    #[test]
    fn sketch_estimate_tracks_per_source_volume() {
        let config = DdosConfig::default();
        let now = SystemTime::now();
        let mut state = DdosState::new(&config, AdaptiveThresholdsHandle::new(), now);
        for _ in 0..5 {
            state.record_event(&syn(now, 3));
        }
        let estimate = state.sketches[&PacketKind::Syn].estimate(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 3)).to_string().as_bytes());
        assert!(estimate >= 5);
    }
}
