//! SocketCAN transport.

use std::io;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use socketcan::{CanFrame, CanSocket, EmbeddedFrame, ExtendedId, Frame, Socket};

use crate::core::error::{Result, SparkError};
use crate::core::frame::CanMessage;

use super::io::FrameIo;

/// How long `recv_timeout` sleeps between polls of the nonblocking socket.
const RECV_POLL_STEP: Duration = Duration::from_micros(500);

/// Frame I/O over a SocketCAN interface.
///
/// Two sockets on the same interface: a mutex-guarded TX socket so that
/// concurrent senders serialize per complete frame, and a nonblocking RX
/// socket drained by the bus receive loop. SocketCAN delivers every frame
/// on the interface to each open socket, so the split costs nothing.
pub struct SocketBus {
    interface: String,
    tx: Mutex<CanSocket>,
    rx: Mutex<CanSocket>,
}

impl std::fmt::Debug for SocketBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketBus")
            .field("interface", &self.interface)
            .finish_non_exhaustive()
    }
}

impl SocketBus {
    /// Open the interface.
    pub fn open(interface: &str) -> Result<Self> {
        let unavailable = |source: io::Error| SparkError::InterfaceUnavailable {
            interface: interface.to_string(),
            source,
        };

        let tx = CanSocket::open(interface).map_err(|e| unavailable(e))?;
        let rx = CanSocket::open(interface).map_err(|e| unavailable(e))?;
        rx.set_nonblocking(true).map_err(|e| unavailable(e))?;

        Ok(Self {
            interface: interface.to_string(),
            tx: Mutex::new(tx),
            rx: Mutex::new(rx),
        })
    }

    /// The interface name this bus is bound to.
    pub fn interface(&self) -> &str {
        &self.interface
    }

    fn to_can_frame(msg: &CanMessage) -> Result<CanFrame> {
        let id = ExtendedId::new(msg.id()).ok_or_else(|| {
            SparkError::Transmit(io::Error::new(
                io::ErrorKind::InvalidInput,
                "arbitration id exceeds 29 bits",
            ))
        })?;
        CanFrame::new(id, msg.data()).ok_or_else(|| {
            SparkError::Transmit(io::Error::new(
                io::ErrorKind::InvalidInput,
                "payload exceeds 8 bytes",
            ))
        })
    }

    fn from_can_frame(frame: &CanFrame) -> CanMessage {
        // Mask off the EFF/RTR/ERR flag bits; standard-ID traffic from
        // other nodes simply fails the codec's prefix check downstream.
        CanMessage::new(frame.raw_id() & 0x1FFF_FFFF, frame.data())
    }
}

impl FrameIo for SocketBus {
    fn send(&self, msg: &CanMessage) -> Result<()> {
        let frame = Self::to_can_frame(msg)?;
        let socket = self.tx.lock().expect("Mutex poisoned");
        socket.write_frame(&frame).map_err(SparkError::Transmit)
    }

    fn try_recv(&self) -> Result<Option<CanMessage>> {
        let socket = self.rx.lock().expect("Mutex poisoned");
        match socket.read_frame() {
            Ok(frame) => Ok(Some(Self::from_can_frame(&frame))),
            Err(e)
                if e.kind() == io::ErrorKind::WouldBlock
                    || e.kind() == io::ErrorKind::TimedOut =>
            {
                Ok(None)
            }
            Err(e) => Err(SparkError::Receive(e)),
        }
    }

    fn recv_timeout(&self, timeout: Duration) -> Result<CanMessage> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(msg) = self.try_recv()? {
                return Ok(msg);
            }
            if Instant::now() >= deadline {
                return Err(SparkError::Timeout(timeout));
            }
            std::thread::sleep(RECV_POLL_STEP);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_interface() {
        let err = SocketBus::open("sparkbus-no-such-if").unwrap_err();
        assert!(matches!(err, SparkError::InterfaceUnavailable { .. }));
    }
}
