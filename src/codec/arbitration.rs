//! Arbitration-ID encoding for the Spark CAN protocol.
//!
//! Spark controllers are addressed with 29-bit extended CAN IDs laid out as:
//!
//! ```text
//! bits 24-28   device type    (5 bits, 0x02 = motor controller)
//! bits 16-23   manufacturer   (8 bits, 0x05 = REV)
//! bits  6-15   API            (10 bits, selects the message type)
//! bits  0-5    device ID      (6 bits, 0-63)
//! ```
//!
//! Encoding and decoding are exact inverses over (message type, device ID).
//! Frames whose device-type/manufacturer prefix does not match belong to
//! other traffic on the shared bus and decode to `None`.

/// Device type field for motor controllers.
pub const DEVICE_TYPE_MOTOR_CONTROLLER: u32 = 0x02;

/// Manufacturer field for REV Robotics.
pub const MANUFACTURER_REV: u32 = 0x05;

/// Highest valid device ID (6-bit field).
pub const MAX_DEVICE_ID: u8 = 63;

const DEVICE_TYPE_SHIFT: u32 = 24;
const DEVICE_TYPE_MASK: u32 = 0x1F;
const MANUFACTURER_SHIFT: u32 = 16;
const MANUFACTURER_MASK: u32 = 0xFF;
const API_SHIFT: u32 = 6;
const API_MASK: u32 = 0x3FF;
const DEVICE_ID_MASK: u32 = 0x3F;

/// First API value of the parameter-access range.
const API_PARAMETER_BASE: u16 = 0x300;
/// Last API value of the parameter-access range (BurnFlash sits above it).
const API_PARAMETER_MAX: u16 = 0x3F1;

/// Controller model tag.
///
/// SparkMax and SparkFlex share all command and telemetry behavior; the tag
/// feeds the codec's prefix lookup. On the wire both models carry the
/// motor-controller/REV prefix, so the two entries currently resolve to the
/// same bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceClass {
    /// SPARK MAX controller.
    Max,
    /// SPARK Flex controller.
    Flex,
}

impl DeviceClass {
    /// The fixed device-type/manufacturer prefix bits for this model.
    pub const fn prefix(self) -> u32 {
        match self {
            Self::Max | Self::Flex => {
                (DEVICE_TYPE_MOTOR_CONTROLLER << DEVICE_TYPE_SHIFT)
                    | (MANUFACTURER_REV << MANUFACTURER_SHIFT)
            }
        }
    }
}

impl std::fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Max => write!(f, "SparkMax"),
            Self::Flex => write!(f, "SparkFlex"),
        }
    }
}

/// Message type carried in the API field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Open-loop duty-cycle setpoint.
    DutyCycleSet,
    /// Closed-loop velocity setpoint (RPM).
    VelocitySet,
    /// Closed-loop position setpoint (rotations).
    PositionSet,
    /// Voltage setpoint (volts).
    VoltageSet,
    /// Periodic status 0: applied output.
    Status0,
    /// Periodic status 1: velocity, temperature, bus voltage, current.
    Status1,
    /// Periodic status 2: primary encoder position.
    Status2,
    /// Periodic status 5: absolute encoder position.
    Status5,
    /// Clear sticky faults.
    ClearFaults,
    /// Keep-alive frame; the device disables itself without it.
    Heartbeat,
    /// Configuration parameter write; carries the parameter ID.
    Parameter(u16),
    /// Persist configuration to flash.
    BurnFlash,
}

impl MessageType {
    /// All fixed message types (the parameter range is open-ended and
    /// excluded here).
    pub const ALL: [Self; 11] = [
        Self::DutyCycleSet,
        Self::VelocitySet,
        Self::PositionSet,
        Self::VoltageSet,
        Self::Status0,
        Self::Status1,
        Self::Status2,
        Self::Status5,
        Self::ClearFaults,
        Self::Heartbeat,
        Self::BurnFlash,
    ];

    /// The 10-bit API value for this message type.
    pub const fn api(self) -> u16 {
        match self {
            Self::DutyCycleSet => 0x002,
            Self::VelocitySet => 0x012,
            Self::PositionSet => 0x032,
            Self::VoltageSet => 0x042,
            Self::Status0 => 0x060,
            Self::Status1 => 0x061,
            Self::Status2 => 0x062,
            Self::Status5 => 0x065,
            Self::ClearFaults => 0x06E,
            Self::Heartbeat => 0x0B2,
            Self::Parameter(id) => API_PARAMETER_BASE + id,
            Self::BurnFlash => 0x3F2,
        }
    }

    /// Try to map a 10-bit API value back to a message type.
    ///
    /// Returns `None` for APIs the driver does not model (other status
    /// frames, follower configuration, and so on).
    pub fn from_api(api: u16) -> Option<Self> {
        match api {
            0x002 => Some(Self::DutyCycleSet),
            0x012 => Some(Self::VelocitySet),
            0x032 => Some(Self::PositionSet),
            0x042 => Some(Self::VoltageSet),
            0x060 => Some(Self::Status0),
            0x061 => Some(Self::Status1),
            0x062 => Some(Self::Status2),
            0x065 => Some(Self::Status5),
            0x06E => Some(Self::ClearFaults),
            0x0B2 => Some(Self::Heartbeat),
            0x3F2 => Some(Self::BurnFlash),
            API_PARAMETER_BASE..=API_PARAMETER_MAX => {
                Some(Self::Parameter(api - API_PARAMETER_BASE))
            }
            _ => None,
        }
    }

    /// Whether this message type is device-to-host telemetry.
    pub const fn is_telemetry(self) -> bool {
        matches!(
            self,
            Self::Status0 | Self::Status1 | Self::Status2 | Self::Status5
        )
    }

    /// Get description.
    pub const fn description(self) -> &'static str {
        match self {
            Self::DutyCycleSet => "Duty Cycle Setpoint",
            Self::VelocitySet => "Velocity Setpoint",
            Self::PositionSet => "Position Setpoint",
            Self::VoltageSet => "Voltage Setpoint",
            Self::Status0 => "Status 0 (applied output)",
            Self::Status1 => "Status 1 (velocity/temp/voltage/current)",
            Self::Status2 => "Status 2 (position)",
            Self::Status5 => "Status 5 (absolute encoder)",
            Self::ClearFaults => "Clear Sticky Faults",
            Self::Heartbeat => "Heartbeat",
            Self::Parameter(_) => "Parameter Write",
            Self::BurnFlash => "Burn Flash",
        }
    }
}

/// A decoded arbitration ID: which message, for which device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArbitrationId {
    /// Message type from the API field.
    pub message: MessageType,
    /// Device ID from the low 6 bits.
    pub device_id: u8,
}

impl ArbitrationId {
    /// Encode into a raw 29-bit extended ID.
    ///
    /// The caller guarantees `device_id <= MAX_DEVICE_ID`; the device handle
    /// validates this at construction.
    pub fn encode(class: DeviceClass, message: MessageType, device_id: u8) -> u32 {
        debug_assert!(device_id <= MAX_DEVICE_ID);
        class.prefix() | ((message.api() as u32 & API_MASK) << API_SHIFT) | device_id as u32
    }

    /// Decode a raw extended ID.
    ///
    /// Returns `None` when the prefix does not match the driver's
    /// device-type/manufacturer bits or the API is not a message the driver
    /// models - the bus is shared and carries unrelated traffic.
    pub fn decode(raw: u32) -> Option<Self> {
        let device_type = (raw >> DEVICE_TYPE_SHIFT) & DEVICE_TYPE_MASK;
        let manufacturer = (raw >> MANUFACTURER_SHIFT) & MANUFACTURER_MASK;
        if device_type != DEVICE_TYPE_MOTOR_CONTROLLER || manufacturer != MANUFACTURER_REV {
            return None;
        }

        let api = ((raw >> API_SHIFT) & API_MASK) as u16;
        let message = MessageType::from_api(api)?;

        Some(Self {
            message,
            device_id: (raw & DEVICE_ID_MASK) as u8,
        })
    }
}
