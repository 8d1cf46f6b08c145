//! Brute-force detector: tracks SYN/SYN-ACK pairs per (src_ip, dst_ip,
//! dst_port) on a configured set of monitored ports, distinguishing
//! answered connections from ones left hanging.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, SystemTime};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use netsentry_core::config::BruteforceConfig;
use netsentry_core::error::{NetsentryError, PipelineError};
use netsentry_core::event::{PacketEvent, PacketKind};
use netsentry_core::pipeline::{HealthStatus, Pipeline};
use netsentry_core::types::{Severity, Threat, ThreatDetail, ThreatKind};
use netsentry_core::window::SlidingWindowCounter;
use std::net::IpAddr;

use crate::registry::ThreatRegistryHandle;

const DETECTION_INTERVAL: Duration = Duration::from_secs(10);
const MAX_ATTEMPTS_TRACKED: usize = 100;
const FAILURE_RATIO_THRESHOLD: f64 = 0.7;

type FlowKey = (IpAddr, IpAddr, u16);

struct FlowState {
    attempts: SlidingWindowCounter,
    pending_syn: Option<SystemTime>,
    failed: u32,
    succeeded: u32,
}

impl FlowState {
    fn new() -> Self {
        Self {
            attempts: SlidingWindowCounter::new(MAX_ATTEMPTS_TRACKED),
            pending_syn: None,
            failed: 0,
            succeeded: 0,
        }
    }
}

pub struct BruteforceState {
    monitored_ports: HashSet<u16>,
    failed_attempts_threshold: u32,
    time_window: Duration,
    syn_timeout: Duration,
    flows: HashMap<FlowKey, FlowState>,
}

impl BruteforceState {
    pub fn new(config: &BruteforceConfig) -> Self {
        Self {
            monitored_ports: config.monitored_ports.iter().copied().collect(),
            failed_attempts_threshold: config.failed_attempts_threshold,
            time_window: Duration::from_secs(config.time_window_secs),
            syn_timeout: Duration::from_secs(config.syn_timeout_secs),
            flows: HashMap::new(),
        }
    }

    pub fn record_event(&mut self, event: &PacketEvent) {
        match *event {
            PacketEvent::Syn { ts, src_ip, dst_ip, dst_port, .. } => {
                if !self.monitored_ports.contains(&dst_port) {
                    return;
                }
                let flow = self.flows.entry((src_ip, dst_ip, dst_port)).or_insert_with(FlowState::new);
                flow.attempts.append(ts);
                if flow.pending_syn.is_none() {
                    flow.pending_syn = Some(ts);
                }
                flow.failed += 1;
            }
            PacketEvent::SynAck { src_ip: server_ip, dst_ip: client_ip, src_port: server_port, .. } => {
                if !self.monitored_ports.contains(&server_port) {
                    return;
                }
                if let Some(flow) = self.flows.get_mut(&(client_ip, server_ip, server_port)) {
                    if flow.pending_syn.take().is_some() {
                        flow.failed = flow.failed.saturating_sub(1);
                        flow.succeeded += 1;
                    }
                }
            }
            _ => {}
        }
    }

    /// Clears a `pending_syn` that has outlived the SYN timeout without a
    /// matching SYN-ACK. Already counted as failed when the SYN was
    /// recorded, so no further bookkeeping is needed here.
    pub fn finalize_timeouts(&mut self, now: SystemTime) {
        for flow in self.flows.values_mut() {
            if let Some(ts) = flow.pending_syn {
                if now.duration_since(ts).unwrap_or(Duration::ZERO) > self.syn_timeout {
                    flow.pending_syn = None;
                }
            }
        }
    }

    fn prune(&mut self, now: SystemTime) {
        let cutoff = now.checked_sub(self.time_window * 2).unwrap_or(SystemTime::UNIX_EPOCH);
        self.flows.retain(|_, flow| {
            flow.attempts.prune_before(cutoff);
            !flow.attempts.is_empty() || flow.pending_syn.is_some()
        });
    }

    pub fn run_detection(&mut self, now: SystemTime) -> Vec<Threat> {
        self.finalize_timeouts(now);
        self.prune(now);

        let mut threats = Vec::new();
        for (&(src_ip, dst_ip, dst_port), flow) in &self.flows {
            let attempts_in_window = flow.attempts.count_within(now, self.time_window);
            if attempts_in_window == 0 {
                continue;
            }
            let failure_ratio = flow.failed as f64 / attempts_in_window as f64;

            let fires = flow.failed >= self.failed_attempts_threshold
                || (attempts_in_window as u32 >= self.failed_attempts_threshold && failure_ratio > FAILURE_RATIO_THRESHOLD);
            if !fires {
                continue;
            }

            threats.push(Threat {
                kind: ThreatKind::Bruteforce,
                severity: Severity::High,
                source_id: src_ip.to_string(),
                detail: ThreatDetail::Bruteforce {
                    dst_ip,
                    dst_port,
                    attempts: attempts_in_window,
                    failed: flow.failed as usize,
                    succeeded: flow.succeeded as usize,
                },
                first_seen: now,
                last_seen: now,
            });
        }
        threats
    }
}

pub struct BruteforceDetector {
    state: Option<BruteforceState>,
    event_rx: Option<mpsc::Receiver<PacketEvent>>,
    registry: ThreatRegistryHandle,
    cancel: CancellationToken,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl BruteforceDetector {
    pub fn new(config: &BruteforceConfig, event_rx: mpsc::Receiver<PacketEvent>, registry: ThreatRegistryHandle) -> Self {
        Self {
            state: Some(BruteforceState::new(config)),
            event_rx: Some(event_rx),
            registry,
            cancel: CancellationToken::new(),
            task: None,
        }
    }
}

async fn detect_loop(
    mut state: BruteforceState,
    mut event_rx: mpsc::Receiver<PacketEvent>,
    registry: ThreatRegistryHandle,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(DETECTION_INTERVAL);
    loop {
        tokio::select! {
            event = event_rx.recv() => {
                match event {
                    Some(event) if matches!(event.kind(), PacketKind::Syn | PacketKind::SynAck) => {
                        state.record_event(&event);
                    }
                    Some(_) => {}
                    None => {
                        tracing::info!("bruteforce detector input channel closed");
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
                tracing::info!("bruteforce detector stopping");
                break;
            }
        }
    }
}

impl Pipeline for BruteforceDetector {
    async fn start(&mut self) -> Result<(), NetsentryError> {
        if self.task.is_some() {
            return Err(PipelineError::AlreadyRunning.into());
        }
        let state = self
            .state
            .take()
            .ok_or(PipelineError::InitFailed("bruteforce detector already consumed".to_owned()))?;
        let event_rx = self
            .event_rx
            .take()
            .ok_or(PipelineError::InitFailed("bruteforce detector can only be started once".to_owned()))?;
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn syn(ts: SystemTime, src: u8) -> PacketEvent {
        PacketEvent::Syn {
            ts,
            src_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, src)),
            dst_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 254)),
            src_port: 50000,
            dst_port: 22,
        }
    }

    fn syn_ack(ts: SystemTime, dst: u8) -> PacketEvent {
        PacketEvent::SynAck {
            ts,
            src_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 254)),
            dst_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, dst)),
            src_port: 22,
            dst_port: 50000,
        }
    }

    fn config() -> BruteforceConfig {
        let mut c = BruteforceConfig::default();
        c.failed_attempts_threshold = 3;
        c
    }

    #[test]
    fn failed_attempts_over_threshold_fires() {
        let mut state = BruteforceState::new(&config());
        let now = SystemTime::now();
        for _ in 0..4 {
            state.record_event(&syn(now, 1));
        }

        let threats = state.run_detection(now);
        assert_eq!(threats.len(), 1);
        assert_eq!(threats[0].source_id, "10.0.0.1");
    }

    #[test]
    fn successful_handshake_does_not_fire() {
        let mut state = BruteforceState::new(&config());
        let now = SystemTime::now();
        state.record_event(&syn(now, 2));
        state.record_event(&syn_ack(now, 2));

        assert!(state.run_detection(now).is_empty());
    }

    #[test]
    fn synack_transfers_one_count_from_failed_to_succeeded() {
        let mut state = BruteforceState::new(&config());
        let now = SystemTime::now();
        state.record_event(&syn(now, 3));
        state.record_event(&syn_ack(now, 3));

        let flow = &state.flows[&(
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 3)),
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 254)),
            22,
        )];
        assert_eq!(flow.failed, 0);
        assert_eq!(flow.succeeded, 1);
        assert!(flow.pending_syn.is_none());
    }

    #[test]
    fn unmonitored_port_is_ignored() {
        let mut state = BruteforceState::new(&config());
        let now = SystemTime::now();
        let event = PacketEvent::Syn {
            ts: now,
            src_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)),
            dst_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 254)),
            src_port: 50000,
            dst_port: 9999,
        };
        state.record_event(&event);
        assert!(state.flows.is_empty());
    }

    #[test]
    fn timeout_clears_pending_without_changing_counts() {
        let mut config = config();
        config.syn_timeout_secs = 1;
        let mut state = BruteforceState::new(&config);
        let now = SystemTime::now();
        state.record_event(&syn(now, 6));

        state.finalize_timeouts(now + Duration::from_secs(5));

        let flow = &state.flows[&(
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 6)),
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 254)),
            22,
        )];
        assert!(flow.pending_syn.is_none());
        assert_eq!(flow.failed, 1);
    }

    #[test]
    fn stale_flow_is_evicted_after_two_windows() {
        let mut config = config();
        config.time_window_secs = 10;
        let mut state = BruteforceState::new(&config);
        let now = SystemTime::now();
        state.record_event(&syn(now, 7));
        state.record_event(&syn_ack(now, 7));

        state.prune(now + Duration::from_secs(25));
        assert!(state.flows.is_empty());
    }
}
