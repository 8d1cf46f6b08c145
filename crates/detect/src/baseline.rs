//! Baseline tracker: samples the DDoS detector's published per-kind
//! one-second counts once per second, and recomputes adaptive flood
//! thresholds once per minute as `max(static_threshold, 2 * mean)`.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use netsentry_core::config::DdosConfig;
use netsentry_core::error::{NetsentryError, PipelineError};
use netsentry_core::event::PacketKind;
use netsentry_core::pipeline::{HealthStatus, Pipeline};

use crate::ddos::{AdaptiveThresholdsHandle, DdosStatsHandle};

const SAMPLE_INTERVAL: Duration = Duration::from_secs(1);
const SAMPLE_HISTORY_LEN: usize = 60;
const RECOMPUTE_EVERY_N_SAMPLES: u32 = 60;
const BOOTSTRAP_MIN_SAMPLES: usize = 10;

const FLOOD_KINDS: [PacketKind; 3] = [PacketKind::Syn, PacketKind::Udp, PacketKind::Icmp];

/// Synchronous sample/recompute logic, independent of the timer loop.
pub struct BaselineState {
    static_thresholds: HashMap<PacketKind, u64>,
    samples: HashMap<PacketKind, VecDeque<u64>>,
}

impl BaselineState {
    pub fn new(config: &DdosConfig) -> Self {
        let mut static_thresholds = HashMap::new();
        static_thresholds.insert(PacketKind::Syn, config.syn_flood.threshold);
        static_thresholds.insert(PacketKind::Udp, config.udp_flood.threshold);
        static_thresholds.insert(PacketKind::Icmp, config.icmp_flood.threshold);
        Self {
            static_thresholds,
            samples: HashMap::new(),
        }
    }

    pub fn record_sample(&mut self, counts: &HashMap<PacketKind, u64>) {
        for kind in FLOOD_KINDS {
            let count = counts.get(&kind).copied().unwrap_or(0);
            let history = self.samples.entry(kind).or_default();
            if history.len() >= SAMPLE_HISTORY_LEN {
                history.pop_front();
            }
            history.push_back(count);
        }
    }

    /// Recomputed thresholds per kind. Before `BOOTSTRAP_MIN_SAMPLES`
    /// samples exist for a kind, its threshold equals the static value.
    pub fn recompute(&self) -> HashMap<PacketKind, u64> {
        let mut result = HashMap::new();
        for kind in FLOOD_KINDS {
            let static_threshold = self.static_thresholds[&kind];
            let history = self.samples.get(&kind);
            let threshold = match history {
                Some(h) if h.len() >= BOOTSTRAP_MIN_SAMPLES => {
                    let mean = h.iter().sum::<u64>() as f64 / h.len() as f64;
                    (2.0 * mean).round() as u64
                }
                _ => static_threshold,
            }
            .max(static_threshold);
            result.insert(kind, threshold);
        }
        result
    }
}

pub struct BaselineTracker {
    state: BaselineState,
    ddos_stats: DdosStatsHandle,
    thresholds: AdaptiveThresholdsHandle,
    cancel: CancellationToken,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl BaselineTracker {
    pub fn new(config: &DdosConfig, ddos_stats: DdosStatsHandle, thresholds: AdaptiveThresholdsHandle) -> Self {
        Self {
            state: BaselineState::new(config),
            ddos_stats,
            thresholds,
            cancel: CancellationToken::new(),
            task: None,
        }
    }
}

async fn sample_loop(
    mut state: BaselineState,
    ddos_stats: DdosStatsHandle,
    thresholds: AdaptiveThresholdsHandle,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(SAMPLE_INTERVAL);
    let mut ticks_since_recompute = 0u32;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                state.record_sample(&ddos_stats.latest());
                ticks_since_recompute += 1;
                if ticks_since_recompute >= RECOMPUTE_EVERY_N_SAMPLES {
                    ticks_since_recompute = 0;
                    for (kind, value) in state.recompute() {
                        thresholds.set(kind, value);
                    }
                }
            }
            _ = cancel.cancelled() => {
                tracing::info!("baseline tracker stopping");
                break;
            }
        }
    }
}

impl Pipeline for BaselineTracker {
    async fn start(&mut self) -> Result<(), NetsentryError> {
        if self.task.is_some() {
            return Err(PipelineError::AlreadyRunning.into());
        }
        let state = std::mem::replace(&mut self.state, BaselineState::new(&DdosConfig::default()));
        let ddos_stats = self.ddos_stats.clone();
        let thresholds = self.thresholds.clone();
        let cancel = self.cancel.clone();
        self.task = Some(tokio::spawn(sample_loop(state, ddos_stats, thresholds, cancel)));
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
            Some(_) => HealthStatus::Unhealthy("tracker task exited".to_owned()),
            None => HealthStatus::Unhealthy("not running".to_owned()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstraps_to_static_threshold_before_enough_samples() {
        let config = DdosConfig::default();
        let mut state = BaselineState::new(&config);
        let mut counts = HashMap::new();
        counts.insert(PacketKind::Syn, 500);
        state.record_sample(&counts);

        let recomputed = state.recompute();
        assert_eq!(recomputed[&PacketKind::Syn], config.syn_flood.threshold);
    }

    #[test]
    fn adaptive_threshold_tracks_mean_once_bootstrapped() {
        let config = DdosConfig::default();
        let mut state = BaselineState::new(&config);
        let mut counts = HashMap::new();
        counts.insert(PacketKind::Syn, 10);
        for _ in 0..15 {
            state.record_sample(&counts);
        }

        let recomputed = state.recompute();
        assert_eq!(recomputed[&PacketKind::Syn], config.syn_flood.threshold.max(20));
    }

    #[test]
    fn never_drops_below_static_threshold() {
        let mut config = DdosConfig::default();
        config.syn_flood.threshold = 1000;
        let mut state = BaselineState::new(&config);
        let mut counts = HashMap::new();
        counts.insert(PacketKind::Syn, 1);
        for _ in 0..15 {
            state.record_sample(&counts);
        }

        assert_eq!(state.recompute()[&PacketKind::Syn], 1000);
    }

    #[test]
    fn history_caps_at_sixty_samples() {
        let config = DdosConfig::default();
        let mut state = BaselineState::new(&config);
        let mut counts = HashMap::new();
        counts.insert(PacketKind::Syn, 7);
        for _ in 0..100 {
            state.record_sample(&counts);
        }
        assert_eq!(state.samples[&PacketKind::Syn].len(), SAMPLE_HISTORY_LEN);
    }
}
