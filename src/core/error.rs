//! Error types for the Spark CAN driver.

use std::io;
use std::time::Duration;

use crate::codec::payload::TelemetryChannel;

/// Result type alias using [`SparkError`].
pub type Result<T> = std::result::Result<T, SparkError>;

/// Errors produced by the driver.
///
/// Construction errors (`InterfaceUnavailable`, `InvalidDeviceId`,
/// `AlreadyAttached`) are fatal to the handle being built. Command-path
/// errors (`Transmit`, `NonFiniteSetpoint`, `InvalidPidSlot`) are returned
/// to the caller of the failing operation. Receive-path errors (`Receive`,
/// `Decode`, `Timeout`) are logged and counted by the background loops,
/// which keep running.
#[derive(Debug, thiserror::Error)]
pub enum SparkError {
    /// The CAN interface could not be opened.
    #[error("CAN interface {interface} unavailable: {source}")]
    InterfaceUnavailable {
        /// SocketCAN interface name (e.g. "can0").
        interface: String,
        /// Underlying socket error.
        #[source]
        source: io::Error,
    },

    /// Device ID outside the protocol's 6-bit range.
    #[error("device id {0} outside protocol range 0-63")]
    InvalidDeviceId(u8),

    /// Another handle on the same interface already owns this device ID.
    #[error("device id {0} already attached on this interface")]
    AlreadyAttached(u8),

    /// A frame could not be written to the bus (bus-off, no-ack,
    /// arbitration loss).
    #[error("transmit failed: {0}")]
    Transmit(#[source] io::Error),

    /// A frame could not be read from the bus.
    #[error("receive failed: {0}")]
    Receive(#[source] io::Error),

    /// No frame arrived within the receive deadline.
    #[error("no frame received within {0:?}")]
    Timeout(Duration),

    /// No telemetry has ever been received for the channel.
    #[error("no telemetry received yet for {0}")]
    Stale(TelemetryChannel),

    /// Setpoint values must be finite.
    #[error("setpoint {0} is not finite")]
    NonFiniteSetpoint(f64),

    /// Closed-loop gain slots are 0-3.
    #[error("PID slot {0} outside range 0-3")]
    InvalidPidSlot(u8),

    /// A frame matching the driver's prefix carried a malformed payload.
    #[error("malformed frame: {0}")]
    Decode(String),
}

impl SparkError {
    /// Shorthand for a decode error with a formatted message.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SparkError::InvalidDeviceId(64);
        assert_eq!(err.to_string(), "device id 64 outside protocol range 0-63");

        let err = SparkError::Stale(TelemetryChannel::Velocity);
        assert!(err.to_string().contains("velocity"));
    }

    #[test]
    fn test_transmit_source() {
        use std::error::Error;

        let err = SparkError::Transmit(io::Error::new(io::ErrorKind::Other, "no ack"));
        assert!(err.source().is_some());
    }
}
