//! Single-producer-multi-consumer fan-out. Detectors declare which event
//! kinds they consume before the router starts; each incoming event is
//! handed to every subscriber of its kind, in subscription order. The
//! router itself holds no detection state, only the subscription list.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use netsentry_core::error::{NetsentryError, PipelineError};
use netsentry_core::event::{PacketEvent, PacketKind};
use netsentry_core::pipeline::{HealthStatus, Pipeline};

const SUBSCRIBER_CHANNEL_CAPACITY: usize = 4096;

pub struct EventRouter {
    input_rx: Option<mpsc::Receiver<PacketEvent>>,
    subscribers: Vec<(Vec<PacketKind>, mpsc::Sender<PacketEvent>)>,
    cancel: CancellationToken,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl EventRouter {
    pub fn new(input_rx: mpsc::Receiver<PacketEvent>) -> Self {
        Self {
            input_rx: Some(input_rx),
            subscribers: Vec::new(),
            cancel: CancellationToken::new(),
            task: None,
        }
    }

    /// Registers a new subscriber for the given kinds. Must be called
    /// before `start`; subscriptions are fixed once the router is running.
    pub fn subscribe(&mut self, kinds: &[PacketKind]) -> mpsc::Receiver<PacketEvent> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CHANNEL_CAPACITY);
        self.subscribers.push((kinds.to_vec(), tx));
        rx
    }
}

async fn route_loop(
    mut input_rx: mpsc::Receiver<PacketEvent>,
    subscribers: Vec<(Vec<PacketKind>, mpsc::Sender<PacketEvent>)>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            event = input_rx.recv() => {
                let Some(event) = event else {
                    tracing::info!("packet source channel closed, event router stopping");
                    break;
                };
                let kind = event.kind();
                for (kinds, tx) in &subscribers {
                    if kinds.contains(&kind) && tx.send(event.clone()).await.is_err() {
                        tracing::warn!(?kind, "subscriber channel closed");
                    }
                }
            }
            _ = cancel.cancelled() => {
                tracing::info!("event router received shutdown signal");
                break;
            }
        }
    }
}

impl Pipeline for EventRouter {
    async fn start(&mut self) -> Result<(), NetsentryError> {
        if self.task.is_some() {
            return Err(PipelineError::AlreadyRunning.into());
        }
        let input_rx = self.input_rx.take().ok_or(PipelineError::InitFailed(
            "event router can only be started once".to_owned(),
        ))?;
        let subscribers = self.subscribers.clone();
        let cancel = self.cancel.clone();
        self.task = Some(tokio::spawn(route_loop(input_rx, subscribers, cancel)));
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
            Some(_) => HealthStatus::Unhealthy("router task exited".to_owned()),
            None => HealthStatus::Unhealthy("not running".to_owned()),
        }
    }
}
