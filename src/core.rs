//! Core types for the Spark CAN driver.
//!
//! This module provides the foundational types shared by the codec,
//! transport, store, and device layers.

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod frame;

pub use config::{BusConfig, BusParamsConfig};
pub use diagnostics::Diagnostics;
pub use error::{Result, SparkError};
pub use frame::{CanFrameData, CanMessage};
