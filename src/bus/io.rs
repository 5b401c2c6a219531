//! Transport seam for frame I/O.

use std::time::Duration;

use crate::core::error::Result;
use crate::core::frame::CanMessage;

/// Blocking frame-level I/O on a CAN interface.
///
/// Socket operations stay synchronous; the background loops drive them from
/// tokio tasks the way a nonblocking socket is polled. Implementations must
/// be safe for concurrent sends from multiple callers plus the heartbeat
/// loop: each `send` writes one complete frame or fails.
pub trait FrameIo: Send + Sync {
    /// Write one frame to the bus.
    fn send(&self, msg: &CanMessage) -> Result<()>;

    /// Read one pending frame without blocking; `None` when the receive
    /// queue is empty.
    fn try_recv(&self) -> Result<Option<CanMessage>>;

    /// Block until a frame arrives or the deadline passes.
    fn recv_timeout(&self, timeout: Duration) -> Result<CanMessage>;
}
