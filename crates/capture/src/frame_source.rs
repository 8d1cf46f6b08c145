//! The capability every capture backend implements: blocking delivery of
//! raw Ethernet frames. Kept deliberately minimal so the pnet-backed source
//! and the raw-socket fallback share everything downstream (classification,
//! channel wiring, drop accounting) and differ only in how bytes arrive.

use netsentry_core::error::NetsentryError;

/// Blocking frame source. Implementations run on a dedicated OS thread via
/// `spawn_blocking`; `next_frame` may block indefinitely waiting for the
/// next frame, matching the capture-on-a-worker-thread design.
pub trait FrameSource: Send + 'static {
    fn next_frame(&mut self) -> Result<Vec<u8>, NetsentryError>;
}
