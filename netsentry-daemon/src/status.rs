//! Status surface: every 5 seconds, serializes three JSON documents
//! describing the daemon's current state to a well-known directory, so
//! external tooling (a router's management UI, an operator's `curl`) can
//! poll local state without a connection into the daemon itself.
//!
//! Grounded on the original agent's API server, which maintained the same
//! three-document split (status / threats / blocks) on the same 5-second
//! cadence, one file per document so a reader never observes a torn mix of
//! the three.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::Serialize;
use tokio::sync::broadcast;

use netsentry_core::types::Threat;
use netsentry_detect::registry::ThreatRegistryHandle;
use netsentry_mitigate::controller::{ActiveBlock, MitigationController};

const WRITE_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Clone, Serialize)]
struct ModuleSnapshot {
    name: String,
    enabled: bool,
}

#[derive(Serialize)]
struct SystemStatus {
    running: bool,
    generated_at: SystemTime,
    uptime_secs: u64,
    threats_open: usize,
    active_blocks: usize,
    modules: Vec<ModuleSnapshot>,
}

#[derive(Serialize)]
struct ThreatsDocument {
    generated_at: SystemTime,
    threats: Vec<Threat>,
}

#[derive(Serialize)]
struct BlocksDocument {
    generated_at: SystemTime,
    blocks: Vec<ActiveBlock>,
}

async fn write_json(path: &Path, value: &impl Serialize) {
    let bytes = match serde_json::to_vec_pretty(value) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to serialize status document");
            return;
        }
    };
    // Write to a sibling temp file and rename into place so a reader never
    // observes a partially-written document.
    let tmp = path.with_extension("json.tmp");
    if let Err(e) = tokio::fs::write(&tmp, &bytes).await {
        tracing::warn!(path = %tmp.display(), error = %e, "failed to write status document");
        return;
    }
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        tracing::warn!(path = %path.display(), error = %e, "failed to publish status document");
    }
}

async fn write_once(
    dir: &Path,
    uptime_secs: u64,
    modules: &[ModuleSnapshot],
    registry: &ThreatRegistryHandle,
    controller: &MitigationController,
) {
    let now = SystemTime::now();
    let threats = registry.open_threats().await;
    let blocks = controller.active_blocks().await;

    let status = SystemStatus {
        running: true,
        generated_at: now,
        uptime_secs,
        threats_open: threats.len(),
        active_blocks: blocks.len(),
        modules: modules.to_vec(),
    };
    write_json(&dir.join("status.json"), &status).await;
    write_json(&dir.join("threats.json"), &ThreatsDocument { generated_at: now, threats }).await;
    write_json(&dir.join("blocks.json"), &BlocksDocument { generated_at: now, blocks }).await;
}

/// Module names and their enabled flags, captured once at startup (no
/// detector is individually enabled/disabled at runtime in this system).
pub struct ModuleList(Vec<ModuleSnapshot>);

impl ModuleList {
    pub fn new(modules: impl IntoIterator<Item = (String, bool)>) -> Self {
        Self(modules.into_iter().map(|(name, enabled)| ModuleSnapshot { name, enabled }).collect())
    }
}

/// Spawns the background task that writes the three JSON documents on a
/// fixed cadence until shutdown is broadcast.
pub fn spawn_status_writer(
    dir: PathBuf,
    start_time: std::time::Instant,
    modules: ModuleList,
    registry: ThreatRegistryHandle,
    controller: MitigationController,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = tokio::fs::create_dir_all(&dir).await {
            tracing::warn!(dir = %dir.display(), error = %e, "failed to create status directory");
        }

        let mut ticker = tokio::time::interval(WRITE_INTERVAL);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let uptime = start_time.elapsed().as_secs();
                    write_once(&dir, uptime, &modules.0, &registry, &controller).await;
                }
                _ = shutdown_rx.recv() => {
                    tracing::debug!("status writer shutting down");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use netsentry_core::config::FirewallConfig;
    use netsentry_detect::registry::ThreatRegistry;
    use netsentry_mitigate::mock_driver::MockDriver;
    use std::sync::Arc;

    #[tokio::test]
    async fn writes_all_three_documents() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ThreatRegistry::new().handle();
        let driver: Arc<dyn netsentry_mitigate::driver::DynPacketFilterDriver> = Arc::new(MockDriver::new());
        let controller = MitigationController::new(
            driver,
            registry.clone(),
            &FirewallConfig::default(),
            Duration::from_secs(60),
        );

        write_once(dir.path(), 42, &[], &registry, &controller).await;

        assert!(dir.path().join("status.json").exists());
        assert!(dir.path().join("threats.json").exists());
        assert!(dir.path().join("blocks.json").exists());

        let status: serde_json::Value =
            serde_json::from_slice(&tokio::fs::read(dir.path().join("status.json")).await.unwrap()).unwrap();
        assert_eq!(status["running"], true);
        assert_eq!(status["uptime_secs"], 42);
    }
}
