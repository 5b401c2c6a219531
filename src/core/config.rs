//! Bus configuration types.

use std::time::Duration;

use serde::Deserialize;

/// Shared-bus configuration.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// CAN interface name (e.g., "can0").
    pub interface: String,

    /// RX polling interval in milliseconds.
    pub rx_poll_interval_ms: u64,

    /// Heartbeat period in milliseconds.
    pub heartbeat_period_ms: u64,
}

impl BusConfig {
    /// Create a configuration for an interface with default timing.
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            ..Self::default()
        }
    }

    /// RX polling interval as a [`Duration`].
    pub fn rx_poll_interval(&self) -> Duration {
        Duration::from_millis(self.rx_poll_interval_ms)
    }

    /// Heartbeat period as a [`Duration`].
    pub fn heartbeat_period(&self) -> Duration {
        Duration::from_millis(self.heartbeat_period_ms)
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            interface: "can0".to_string(),
            rx_poll_interval_ms: 2,
            heartbeat_period_ms: 25,
        }
    }
}

/// Bus parameters configuration (deserialized from parameters JSON).
///
/// # Example JSON
/// ```json
/// {
///     "interface": "can0",
///     "rx_poll_interval_ms": 2,
///     "heartbeat_period_ms": 25
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct BusParamsConfig {
    /// CAN interface name (e.g., "can0").
    #[serde(default = "default_interface")]
    pub interface: String,

    /// RX polling interval in milliseconds.
    #[serde(default = "default_rx_poll_interval")]
    pub rx_poll_interval_ms: u64,

    /// Heartbeat period in milliseconds.
    #[serde(default = "default_heartbeat_period")]
    pub heartbeat_period_ms: u64,
}

fn default_interface() -> String {
    "can0".to_string()
}

fn default_rx_poll_interval() -> u64 {
    2
}

fn default_heartbeat_period() -> u64 {
    25
}

impl BusParamsConfig {
    /// Convert to BusConfig.
    pub fn to_config(&self) -> BusConfig {
        BusConfig {
            interface: self.interface.clone(),
            rx_poll_interval_ms: self.rx_poll_interval_ms,
            heartbeat_period_ms: self.heartbeat_period_ms,
        }
    }
}
