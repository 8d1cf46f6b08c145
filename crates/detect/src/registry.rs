//! Shared threat registry: a mapping from source identifier to the
//! currently-open threat for that source. Detectors upsert through a cloned
//! [`ThreatRegistryHandle`]; the registry's own `Pipeline` implementation
//! only runs the idle-eviction sweep.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use netsentry_core::error::{NetsentryError, PipelineError};
use netsentry_core::pipeline::{HealthStatus, Pipeline};
use netsentry_core::types::Threat;

const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(60);
const SWEEP_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct ThreatRegistryHandle {
    inner: Arc<Mutex<HashMap<String, Threat>>>,
}

impl ThreatRegistryHandle {
    /// Inserts or merges a threat under `source_id`, applying `Threat::merge`
    /// when an entry already exists.
    pub async fn upsert(&self, source_id: String, incoming: Threat) {
        let mut guard = self.inner.lock().await;
        match guard.get(&source_id) {
            Some(existing) => {
                let merged = existing.merge(&incoming);
                guard.insert(source_id, merged);
            }
            None => {
                guard.insert(source_id, incoming);
            }
        }
    }

    /// Read-only snapshot of every open threat. Never exposes a mutable
    /// reference to callers outside this module.
    pub async fn open_threats(&self) -> Vec<Threat> {
        self.inner.lock().await.values().cloned().collect()
    }

    pub async fn threat_for(&self, source_id: &str) -> Option<Threat> {
        self.inner.lock().await.get(source_id).cloned()
    }

    async fn evict_idle(&self, now: SystemTime, ttl: Duration) {
        let mut guard = self.inner.lock().await;
        guard.retain(|_, threat| now.duration_since(threat.last_seen).unwrap_or(Duration::ZERO) < ttl);
    }
}

pub struct ThreatRegistry {
    handle: ThreatRegistryHandle,
    idle_ttl: Duration,
    cancel: CancellationToken,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl ThreatRegistry {
    pub fn new() -> Self {
        Self::with_idle_ttl(DEFAULT_IDLE_TTL)
    }

    pub fn with_idle_ttl(idle_ttl: Duration) -> Self {
        Self {
            handle: ThreatRegistryHandle {
                inner: Arc::new(Mutex::new(HashMap::new())),
            },
            idle_ttl,
            cancel: CancellationToken::new(),
            task: None,
        }
    }

    pub fn handle(&self) -> ThreatRegistryHandle {
        self.handle.clone()
    }
}

impl Default for ThreatRegistry {
    fn default() -> Self {
        Self::new()
    }
}

async fn sweep_loop(handle: ThreatRegistryHandle, idle_ttl: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                handle.evict_idle(SystemTime::now(), idle_ttl).await;
            }
            _ = cancel.cancelled() => {
                tracing::info!("threat registry sweep stopping");
                break;
            }
        }
    }
}

impl Pipeline for ThreatRegistry {
    async fn start(&mut self) -> Result<(), NetsentryError> {
        if self.task.is_some() {
            return Err(PipelineError::AlreadyRunning.into());
        }
        let handle = self.handle.clone();
        let idle_ttl = self.idle_ttl;
        let cancel = self.cancel.clone();
        self.task = Some(tokio::spawn(sweep_loop(handle, idle_ttl, cancel)));
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
            Some(_) => HealthStatus::Unhealthy("sweep task exited".to_owned()),
            None => HealthStatus::Unhealthy("not running".to_owned()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netsentry_core::types::{Severity, ThreatDetail, ThreatKind};

    fn threat(severity: Severity, last_seen: SystemTime) -> Threat {
        threat_with_pps(severity, last_seen, 500.0)
    }

    fn threat_with_pps(severity: Severity, last_seen: SystemTime, packets_per_second: f64) -> Threat {
        Threat {
            kind: ThreatKind::DdosSynFlood,
            severity,
            source_id: "10.0.0.5".to_owned(),
            detail: ThreatDetail::DdosFlood {
                packets_per_second,
                attributed: true,
            },
            first_seen: last_seen,
            last_seen,
        }
    }

    #[tokio::test]
    async fn upsert_then_read_back() {
        let registry = ThreatRegistry::new();
        let handle = registry.handle();
        let now = SystemTime::now();
        handle.upsert("10.0.0.5".to_owned(), threat(Severity::High, now)).await;

        let open = handle.open_threats().await;
        assert_eq!(open.len(), 1);
        assert_eq!(handle.threat_for("10.0.0.5").await.unwrap().severity, Severity::High);
    }

    #[tokio::test]
    async fn higher_severity_replaces_lower() {
        let registry = ThreatRegistry::new();
        let handle = registry.handle();
        let t0 = SystemTime::now();
        handle.upsert("10.0.0.5".to_owned(), threat(Severity::Low, t0)).await;
        handle
            .upsert("10.0.0.5".to_owned(), threat(Severity::Critical, t0 + Duration::from_secs(1)))
            .await;

        assert_eq!(handle.threat_for("10.0.0.5").await.unwrap().severity, Severity::Critical);
    }

    #[tokio::test]
    async fn ddos_peak_pps_is_retained_across_merge() {
        // Same severity on every tick (DdosFlood's severity is constant per
        // PacketKind), so a later, quieter tick must not erase the peak rate.
        let registry = ThreatRegistry::new();
        let handle = registry.handle();
        let t0 = SystemTime::now();
        handle.upsert("10.0.0.5".to_owned(), threat_with_pps(Severity::High, t0, 5000.0)).await;
        handle
            .upsert("10.0.0.5".to_owned(), threat_with_pps(Severity::High, t0 + Duration::from_secs(1), 200.0))
            .await;

        let stored = handle.threat_for("10.0.0.5").await.unwrap();
        match stored.detail {
            ThreatDetail::DdosFlood { packets_per_second, .. } => assert_eq!(packets_per_second, 5000.0),
            _ => panic!("expected DdosFlood detail"),
        }
    }

    #[tokio::test]
    async fn idle_entries_are_evicted() {
        let handle = ThreatRegistryHandle {
            inner: Arc::new(Mutex::new(HashMap::new())),
        };
        let t0 = SystemTime::now();
        handle.upsert("10.0.0.5".to_owned(), threat(Severity::Low, t0)).await;

        handle.evict_idle(t0 + Duration::from_secs(120), Duration::from_secs(60)).await;
        assert!(handle.threat_for("10.0.0.5").await.is_none());
    }

    #[tokio::test]
    async fn fresh_entries_survive_a_sweep() {
        let handle = ThreatRegistryHandle {
            inner: Arc::new(Mutex::new(HashMap::new())),
        };
        let t0 = SystemTime::now();
        handle.upsert("10.0.0.5".to_owned(), threat(Severity::Low, t0)).await;

        handle.evict_idle(t0 + Duration::from_secs(10), Duration::from_secs(60)).await;
        assert!(handle.threat_for("10.0.0.5").await.is_some());
    }
}
