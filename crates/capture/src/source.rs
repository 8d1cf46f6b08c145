//! The packet source module: owns the dedicated capture worker thread and
//! crosses classified events into the cooperative side over a bounded
//! channel, matching the worker-thread-to-bounded-channel shape the
//! reference daemon uses at the boundary of its own blocking packet engine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use tokio::sync::mpsc;

use netsentry_core::error::{CaptureError, NetsentryError, PipelineError};
use netsentry_core::event::PacketEvent;
use netsentry_core::pipeline::{HealthStatus, Pipeline};
use netsentry_core::metrics::{PACKETS_CLASSIFY_FAILED_TOTAL, PACKETS_DROPPED_TOTAL, PACKETS_INGESTED_TOTAL};

use crate::classify::classify_frame;
use crate::frame_source::FrameSource;
use crate::pnet_source::PnetFrameSource;

#[cfg(unix)]
use crate::raw_socket_source::RawSocketFrameSource;

/// Link-layer packet source. Drives one of two [`FrameSource`] backends on
/// a dedicated OS thread (never the async executor, per the concurrency
/// model) and forwards classified events through a bounded channel.
pub struct PacketSource {
    interface: String,
    use_raw_socket_fallback: bool,
    event_tx: mpsc::Sender<PacketEvent>,
    running: Arc<AtomicBool>,
    worker: Option<std::thread::JoinHandle<()>>,
}

impl PacketSource {
    pub fn new(interface: String, event_tx: mpsc::Sender<PacketEvent>, use_raw_socket_fallback: bool) -> Self {
        Self {
            interface,
            use_raw_socket_fallback,
            event_tx,
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    fn open_backend(interface: &str, use_raw_socket_fallback: bool) -> Result<Box<dyn FrameSource>, NetsentryError> {
        if use_raw_socket_fallback {
            #[cfg(unix)]
            {
                return RawSocketFrameSource::open(interface).map(|b| Box::new(b) as Box<dyn FrameSource>);
            }
            #[cfg(not(unix))]
            {
                return Err(CaptureError::BackendUnavailable {
                    interface: interface.to_owned(),
                    reason: "raw socket fallback unavailable on this platform".to_owned(),
                }
                .into());
            }
        }
        PnetFrameSource::open(interface).map(|b| Box::new(b) as Box<dyn FrameSource>)
    }
}

fn capture_loop(
    interface: String,
    use_raw_socket_fallback: bool,
    event_tx: mpsc::Sender<PacketEvent>,
    running: Arc<AtomicBool>,
) {
    let mut backend = match PacketSource::open_backend(&interface, use_raw_socket_fallback) {
        Ok(backend) => backend,
        Err(e) => {
            tracing::error!(interface = %interface, error = %e, "packet source failed to start");
            running.store(false, Ordering::SeqCst);
            return;
        }
    };

    while running.load(Ordering::SeqCst) {
        match backend.next_frame() {
            Ok(frame) => match classify_frame(&frame, SystemTime::now()) {
                Some(event) => {
                    metrics::counter!(PACKETS_INGESTED_TOTAL).increment(1);
                    if event_tx.try_send(event).is_err() {
                        metrics::counter!(PACKETS_DROPPED_TOTAL).increment(1);
                    }
                }
                None => {
                    metrics::counter!(PACKETS_CLASSIFY_FAILED_TOTAL).increment(1);
                }
            },
            Err(NetsentryError::Capture(CaptureError::WouldBlock(_))) => continue,
            Err(e) => {
                tracing::warn!(interface = %interface, error = %e, "capture read failed");
            }
        }
    }
}

impl Pipeline for PacketSource {
    async fn start(&mut self) -> Result<(), NetsentryError> {
        if self.worker.is_some() {
            return Err(PipelineError::AlreadyRunning.into());
        }
        self.running.store(true, Ordering::SeqCst);

        let interface = self.interface.clone();
        let use_raw = self.use_raw_socket_fallback;
        let tx = self.event_tx.clone();
        let running = self.running.clone();

        let handle = std::thread::Builder::new()
            .name("netsentry-capture".to_owned())
            .spawn(move || capture_loop(interface, use_raw, tx, running))
            .map_err(|e| PipelineError::InitFailed(e.to_string()))?;

        self.worker = Some(handle);
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), NetsentryError> {
        let handle = self.worker.take().ok_or(PipelineError::NotRunning)?;
        self.running.store(false, Ordering::SeqCst);
        let _ = tokio::task::spawn_blocking(move || handle.join()).await;
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match &self.worker {
            Some(handle) if !handle.is_finished() => HealthStatus::Healthy,
            Some(_) => HealthStatus::Unhealthy("capture thread exited".to_owned()),
            None => HealthStatus::Unhealthy("not running".to_owned()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn health_check_before_start_is_unhealthy() {
        let (tx, _rx) = mpsc::channel(16);
        let source = PacketSource::new("lo".to_owned(), tx, false);
        assert!(Pipeline::health_check(&source).await.is_unhealthy());
    }

    #[tokio::test]
    async fn double_stop_without_start_errors() {
        let (tx, _rx) = mpsc::channel(16);
        let mut source = PacketSource::new("lo".to_owned(), tx, false);
        assert!(Pipeline::stop(&mut source).await.is_err());
    }
}
