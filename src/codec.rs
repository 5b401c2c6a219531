//! Frame codec: arbitration-ID and payload tables.
//!
//! Pure and stateless; the transport and device layers do all I/O.

pub mod arbitration;
pub mod payload;

pub use arbitration::{ArbitrationId, DeviceClass, MessageType, MAX_DEVICE_ID};
pub use payload::{
    decode_telemetry, heartbeat_payload, ConfigParameter, IdleMode, ParamValue, Setpoint,
    TelemetryChannel,
};
