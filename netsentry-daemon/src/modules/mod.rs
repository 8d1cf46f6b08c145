//! Module registry: every pipeline the orchestrator starts and stops is
//! wrapped as a [`ModuleHandle`] so lifecycle management stays uniform
//! regardless of which crate actually implements it.

use netsentry_core::pipeline::{DynPipeline, HealthStatus};

#[cfg(test)]
use netsentry_core::pipeline::BoxFuture;

/// A handle to a registered module: a name for logging/health reporting,
/// an enabled flag, and the pipeline itself.
pub struct ModuleHandle {
    pub name: String,
    pub enabled: bool,
    pub pipeline: Box<dyn DynPipeline>,
}

impl ModuleHandle {
    pub fn new(name: impl Into<String>, enabled: bool, pipeline: Box<dyn DynPipeline>) -> Self {
        Self { name: name.into(), enabled, pipeline }
    }

    /// Disabled modules always report `Healthy`: they are not expected to run.
    pub async fn health_check(&self) -> HealthStatus {
        if !self.enabled {
            return HealthStatus::Healthy;
        }
        self.pipeline.health_check().await
    }
}

/// Modules in registration order (producers before consumers). `start_all`
/// and `stop_all` both walk this order; stopping producers first lets
/// consumers drain whatever they already received.
pub struct ModuleRegistry {
    modules: Vec<ModuleHandle>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self { modules: Vec::new() }
    }

    pub fn register(&mut self, handle: ModuleHandle) {
        self.modules.push(handle);
    }

    /// Starts every enabled module in registration order. Returns on the
    /// first failure or 30-second timeout; already-started modules are not
    /// rolled back, so a caller that cares should follow up with `stop_all`.
    pub async fn start_all(&mut self) -> anyhow::Result<()> {
        const START_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

        for handle in &mut self.modules {
            if !handle.enabled {
                tracing::debug!(module = %handle.name, "skipping disabled module");
                continue;
            }

            tracing::info!(module = %handle.name, "starting module");
            match tokio::time::timeout(START_TIMEOUT, handle.pipeline.start()).await {
                Ok(Ok(())) => tracing::info!(module = %handle.name, "module started successfully"),
                Ok(Err(e)) => {
                    return Err(anyhow::anyhow!("failed to start module '{}': {}", handle.name, e));
                }
                Err(_) => {
                    return Err(anyhow::anyhow!(
                        "timeout starting module '{}' (exceeded {:?})",
                        handle.name,
                        START_TIMEOUT
                    ));
                }
            }
        }
        Ok(())
    }

    /// Stops every enabled module in registration order. Logs and continues
    /// on error so one stuck module never prevents the rest from cleaning up.
    pub async fn stop_all(&mut self) -> anyhow::Result<()> {
        const STOP_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);
        let mut errors = Vec::new();

        for handle in self.modules.iter_mut() {
            if !handle.enabled {
                continue;
            }

            tracing::info!(module = %handle.name, "stopping module");
            match tokio::time::timeout(STOP_TIMEOUT, handle.pipeline.stop()).await {
                Ok(Ok(())) => tracing::info!(module = %handle.name, "module stopped successfully"),
                Ok(Err(e)) => {
                    tracing::error!(module = %handle.name, error = %e, "failed to stop module");
                    errors.push(format!("{}: {}", handle.name, e));
                }
                Err(_) => {
                    tracing::warn!(module = %handle.name, timeout = ?STOP_TIMEOUT, "timeout stopping module, continuing shutdown");
                    errors.push(format!("{}: timeout after {:?}", handle.name, STOP_TIMEOUT));
                }
            }
        }

        if !errors.is_empty() {
            return Err(anyhow::anyhow!("errors stopping modules: {}", errors.join("; ")));
        }
        Ok(())
    }

    pub async fn health_statuses(&self) -> Vec<(String, bool, HealthStatus)> {
        let mut statuses = Vec::new();
        for handle in &self.modules {
            let status = handle.health_check().await;
            statuses.push((handle.name.clone(), handle.enabled, status));
        }
        statuses
    }

    /// Snapshot of (name, enabled) for every registered module, in
    /// registration order. Used once at startup to seed the status writer.
    pub fn module_list(&self) -> Vec<(String, bool)> {
        self.modules.iter().map(|m| (m.name.clone(), m.enabled)).collect()
    }

    pub fn count(&self) -> usize {
        self.modules.len()
    }

    pub fn enabled_count(&self) -> usize {
        self.modules.iter().filter(|m| m.enabled).count()
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}
