//! Expiry sweeper: removes active blocks whose expiry has passed. Runs
//! independently of the controller's reconcile tick so a slow mitigation
//! cycle never delays cleanup.

use std::time::{Duration, SystemTime};

use tokio_util::sync::CancellationToken;

use netsentry_core::error::{NetsentryError, PipelineError};
use netsentry_core::metrics::{BLOCKS_REMOVED_TOTAL, DRIVER_ERRORS_TOTAL};
use netsentry_core::pipeline::{HealthStatus, Pipeline};

use crate::controller::MitigationController;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub struct ExpirySweeper {
    controller: MitigationController,
    sweep_interval: Duration,
}

impl ExpirySweeper {
    pub fn new(controller: MitigationController) -> Self {
        Self {
            controller,
            sweep_interval: SWEEP_INTERVAL,
        }
    }

    #[cfg(test)]
    fn with_interval(controller: MitigationController, sweep_interval: Duration) -> Self {
        Self { controller, sweep_interval }
    }

    /// Removes every active block past its expiry. A removal failure leaves
    /// the block in place for the next sweep to retry.
    pub async fn sweep_once(&self, now: SystemTime) {
        let handle = self.controller.active_handle();
        let driver = self.controller.driver_handle();

        let expired: Vec<(String, String)> = handle
            .lock()
            .await
            .iter()
            .filter(|(_, block)| block.expires_at < now)
            .map(|(key, block)| (key.clone(), block.handle.clone()))
            .collect();

        for (key, rule_handle) in expired {
            match driver.remove(&rule_handle).await {
                Ok(()) => {
                    handle.lock().await.remove(&key);
                    metrics::counter!(BLOCKS_REMOVED_TOTAL).increment(1);
                }
                Err(e) => {
                    tracing::warn!(target = %key, error = %e, "failed to remove expired block, will retry");
                    metrics::counter!(DRIVER_ERRORS_TOTAL).increment(1);
                }
            }
        }
    }
}

async fn sweep_loop(sweeper: ExpirySweeper, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(sweeper.sweep_interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                sweeper.sweep_once(SystemTime::now()).await;
            }
            _ = cancel.cancelled() => {
                tracing::info!("expiry sweeper stopping");
                break;
            }
        }
    }
}

pub struct ExpirySweeperPipeline {
    sweeper: Option<ExpirySweeper>,
    cancel: CancellationToken,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl ExpirySweeperPipeline {
    pub fn new(sweeper: ExpirySweeper) -> Self {
        Self {
            sweeper: Some(sweeper),
            cancel: CancellationToken::new(),
            task: None,
        }
    }
}

impl Pipeline for ExpirySweeperPipeline {
    async fn start(&mut self) -> Result<(), NetsentryError> {
        if self.task.is_some() {
            return Err(PipelineError::AlreadyRunning.into());
        }
        let sweeper = self.sweeper.take().ok_or(PipelineError::AlreadyRunning)?;
        let cancel = self.cancel.clone();
        self.task = Some(tokio::spawn(sweep_loop(sweeper, cancel)));
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
