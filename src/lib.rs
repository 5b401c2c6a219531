//! # sparkbus
//!
//! A SocketCAN driver for REV SparkMax / SparkFlex brushless motor
//! controllers.
//!
//! ## Features
//!
//! - **Typed frame codec**: arbitration-ID and payload tables that match
//!   the device firmware exactly
//! - **Shared bus**: many handles multiplex one interface through a
//!   reference-counted transport with a single receive loop
//! - **Latest-value telemetry**: single-writer/multi-reader cache, stale
//!   reads surfaced distinctly from valid zeros
//! - **Background heartbeat**: per-device keep-alive task that survives
//!   transport hiccups and cancels without waiting a period
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sparkbus::prelude::*;
//!
//! let motor = SparkFlex::open("can0", 1).await?;
//! motor.heartbeat(true).await;
//!
//! motor.set_velocity(0.5)?;
//! println!("vel: {} RPM", motor.velocity()?);
//! println!("pos: {} rot", motor.absolute_encoder_position()?);
//! ```
//!
//! The driver ends at the frame boundary: it encodes command frames,
//! decodes telemetry frames, and maintains aliveness. Control-loop math
//! runs on the device.

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod bus;
pub mod codec;
pub mod core;
pub mod device;
pub mod heartbeat;
pub mod store;

#[cfg(test)]
mod test_support;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::codec::{DeviceClass, IdleMode, TelemetryChannel};
    pub use crate::core::{BusConfig, Result, SparkError};
    pub use crate::device::{SparkDevice, SparkFlex, SparkMax};
}

// Re-export core types at crate root for convenience
pub use crate::bus::SparkBus;
pub use crate::codec::{ArbitrationId, DeviceClass, IdleMode, MessageType, TelemetryChannel};
pub use crate::core::{BusConfig, CanMessage, Diagnostics, Result, SparkError};
pub use crate::device::{SparkDevice, SparkFlex, SparkMax};
pub use crate::store::{TelemetrySample, TelemetryStore};
