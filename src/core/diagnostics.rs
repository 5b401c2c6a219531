//! Bus diagnostics information.

use serde::{Deserialize, Serialize};

/// Snapshot of a bus's counters.
///
/// Counters are updated by the receive loop and the send path; a snapshot
/// is taken on demand and is internally consistent per field only (the
/// counters are independent atomics).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostics {
    /// CAN interface name.
    pub interface: String,

    /// Frames received that matched the driver's prefix and were decoded.
    pub frames_received: u64,

    /// Frames ignored: foreign prefix, command echoes, or unregistered
    /// device IDs.
    pub frames_ignored: u64,

    /// Frames matching the prefix whose payload failed to decode.
    pub decode_errors: u64,

    /// Failed frame writes.
    pub send_errors: u64,

    /// Socket-level receive errors.
    pub receive_errors: u64,

    /// Last error message observed by either loop.
    pub last_error: Option<String>,

    /// Driver-specific information.
    #[serde(default)]
    pub extra: serde_json::Value,
}
