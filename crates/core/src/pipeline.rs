//! The module lifecycle trait every daemon module implements.
//!
//! [`Pipeline`] uses return-position `impl Future` so implementors write
//! plain `async fn`s; [`DynPipeline`] is the dyn-compatible counterpart the
//! module registry actually stores, via a blanket impl.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::error::NetsentryError;

/// A boxed, dyn-compatible future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Lifecycle trait implemented by every daemon module (packet source,
/// event router, each detector, the mitigation controller, the expiry
/// sweeper).
pub trait Pipeline: Send + Sync {
    /// Start the module: spawn workers, open sockets, wire channels.
    /// Returns `PipelineError::AlreadyRunning` if already started.
    fn start(&mut self) -> impl Future<Output = Result<(), NetsentryError>> + Send;

    /// Stop the module, releasing resources. Best-effort within the
    /// orchestrator's shutdown timeout.
    fn stop(&mut self) -> impl Future<Output = Result<(), NetsentryError>> + Send;

    /// Current health, polled periodically by the daemon's health endpoint.
    fn health_check(&self) -> impl Future<Output = HealthStatus> + Send;
}

/// Object-safe counterpart of [`Pipeline`], so the module registry can hold
/// `Vec<Box<dyn DynPipeline>>`.
pub trait DynPipeline: Send + Sync {
    fn start(&mut self) -> BoxFuture<'_, Result<(), NetsentryError>>;
    fn stop(&mut self) -> BoxFuture<'_, Result<(), NetsentryError>>;
    fn health_check(&self) -> BoxFuture<'_, HealthStatus>;
}

impl<T: Pipeline> DynPipeline for T {
    fn start(&mut self) -> BoxFuture<'_, Result<(), NetsentryError>> {
        Box::pin(Pipeline::start(self))
    }

    fn stop(&mut self) -> BoxFuture<'_, Result<(), NetsentryError>> {
        Box::pin(Pipeline::stop(self))
    }

    fn health_check(&self) -> BoxFuture<'_, HealthStatus> {
        Box::pin(Pipeline::health_check(self))
    }
}

/// Health of a single module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    Healthy,
    Degraded(String),
    Unhealthy(String),
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    pub fn is_unhealthy(&self) -> bool {
        matches!(self, Self::Unhealthy(_))
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded(reason) => write!(f, "degraded: {reason}"),
            Self::Unhealthy(reason) => write!(f, "unhealthy: {reason}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_status_healthy() {
        let status = HealthStatus::Healthy;
        assert!(status.is_healthy());
        assert!(!status.is_unhealthy());
        assert_eq!(status.to_string(), "healthy");
    }

    #[test]
    fn health_status_degraded_display() {
        let status = HealthStatus::Degraded("high drop rate".to_owned());
        assert!(!status.is_healthy());
        assert!(status.to_string().contains("high drop rate"));
    }

    struct MockPipeline {
        running: bool,
    }

    impl Pipeline for MockPipeline {
        async fn start(&mut self) -> Result<(), NetsentryError> {
            if self.running {
                return Err(crate::error::PipelineError::AlreadyRunning.into());
            }
            self.running = true;
            Ok(())
        }

        async fn stop(&mut self) -> Result<(), NetsentryError> {
            if !self.running {
                return Err(crate::error::PipelineError::NotRunning.into());
            }
            self.running = false;
            Ok(())
        }

        async fn health_check(&self) -> HealthStatus {
            if self.running {
                HealthStatus::Healthy
            } else {
                HealthStatus::Unhealthy("not running".to_owned())
            }
        }
    }

    #[tokio::test]
    async fn mock_pipeline_lifecycle() {
        let mut pipeline = MockPipeline { running: false };
        assert!(Pipeline::health_check(&pipeline).await.is_unhealthy());

        Pipeline::start(&mut pipeline).await.unwrap();
        assert!(Pipeline::health_check(&pipeline).await.is_healthy());
        assert!(Pipeline::start(&mut pipeline).await.is_err());

        Pipeline::stop(&mut pipeline).await.unwrap();
        assert!(Pipeline::health_check(&pipeline).await.is_unhealthy());
    }

    #[tokio::test]
    async fn dyn_pipeline_can_be_boxed() {
        let mut pipeline: Box<dyn DynPipeline> = Box::new(MockPipeline { running: false });
        assert!(pipeline.health_check().await.is_unhealthy());
        pipeline.start().await.unwrap();
        assert!(pipeline.health_check().await.is_healthy());
        pipeline.stop().await.unwrap();
    }
}
