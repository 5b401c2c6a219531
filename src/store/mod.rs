//! Telemetry storage layer.
//!
//! The store keeps the most recently received decoded value per telemetry
//! channel per device. The bus receive loop is the single writer; device
//! handles read synchronously.

mod telemetry;

pub use telemetry::{TelemetrySample, TelemetrySlot, TelemetryStore};
