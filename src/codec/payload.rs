//! Payload encoding and decoding for Spark CAN frames.
//!
//! Numeric layouts must match the device firmware exactly. All multi-byte
//! fields are little-endian. Per message type:
//!
//! - **Setpoint** (duty cycle / velocity / position / voltage): 8 bytes;
//!   `f32` value at 0-3, `i16` arbitrary feedforward at 4-5, PID slot in the
//!   low 2 bits of byte 6, feedforward units in byte 7.
//! - **Heartbeat**: 8 bytes of `0xFF` (enable-all, matching the firmware's
//!   expectation for a host keep-alive).
//! - **Parameter write**: 4-byte value at 0-3 plus a type-code byte at 4.
//! - **Status 0**: `i16` applied output at 0-1, scale 1/32768.
//! - **Status 1**: `f32` velocity (RPM) at 0-3; motor temperature (degC) at
//!   byte 4; 12-bit bus voltage (LSB 1/128 V) at byte 5 plus the low nibble
//!   of byte 6; 12-bit output current (LSB 1/32 A) at the high nibble of
//!   byte 6 plus byte 7.
//! - **Status 2**: `f32` position (rotations) at 0-3.
//! - **Status 5**: `f32` absolute encoder position (rotations) at 0-3;
//!   bytes 4-7 reserved.

use crate::core::error::{Result, SparkError};
use crate::core::frame::CanFrameData;

use super::arbitration::{ArbitrationId, MessageType};

/// Applied-output scale: raw `i16` full range maps to [-1, 1].
const APPLIED_OUTPUT_SCALE: f64 = 32768.0;

/// Bus-voltage fixed point: 12 bits, LSB = 1/128 V.
const BUS_VOLTAGE_SCALE: f64 = 128.0;

/// Output-current fixed point: 12 bits, LSB = 1/32 A.
const OUTPUT_CURRENT_SCALE: f64 = 32.0;

// ============================================================================
// Telemetry channels
// ============================================================================

/// One feedback quantity reported asynchronously by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TelemetryChannel {
    /// Motor velocity in RPM (status 1).
    Velocity,
    /// Primary encoder position in rotations (status 2).
    Position,
    /// Absolute encoder position in rotations (status 5).
    AbsolutePosition,
    /// Bus voltage in volts (status 1).
    BusVoltage,
    /// Motor temperature in degrees Celsius (status 1).
    MotorTemperature,
    /// Output current in amps (status 1).
    OutputCurrent,
    /// Applied output as a fraction of full scale (status 0).
    AppliedOutput,
}

impl TelemetryChannel {
    /// Number of channels; the telemetry store sizes its slot arrays with
    /// this.
    pub const COUNT: usize = 7;

    /// All channels, in slot order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::Velocity,
        Self::Position,
        Self::AbsolutePosition,
        Self::BusVoltage,
        Self::MotorTemperature,
        Self::OutputCurrent,
        Self::AppliedOutput,
    ];

    /// Slot index for this channel.
    pub const fn index(self) -> usize {
        match self {
            Self::Velocity => 0,
            Self::Position => 1,
            Self::AbsolutePosition => 2,
            Self::BusVoltage => 3,
            Self::MotorTemperature => 4,
            Self::OutputCurrent => 5,
            Self::AppliedOutput => 6,
        }
    }

    /// Unit label for display.
    pub const fn unit(self) -> &'static str {
        match self {
            Self::Velocity => "RPM",
            Self::Position | Self::AbsolutePosition => "rotations",
            Self::BusVoltage => "V",
            Self::MotorTemperature => "degC",
            Self::OutputCurrent => "A",
            Self::AppliedOutput => "fraction",
        }
    }
}

impl std::fmt::Display for TelemetryChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Velocity => "velocity",
            Self::Position => "position",
            Self::AbsolutePosition => "absolute encoder position",
            Self::BusVoltage => "bus voltage",
            Self::MotorTemperature => "motor temperature",
            Self::OutputCurrent => "output current",
            Self::AppliedOutput => "applied output",
        };
        write!(f, "{}", s)
    }
}

// ============================================================================
// Command payloads
// ============================================================================

/// A setpoint command payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Setpoint {
    /// Target value; unit depends on the message type.
    pub value: f32,
    /// Arbitrary feedforward term.
    pub arb_feedforward: i16,
    /// Closed-loop gain slot (0-3).
    pub pid_slot: u8,
    /// Feedforward unit selector.
    pub arb_ff_units: u8,
}

impl Setpoint {
    /// A plain setpoint with no feedforward, slot 0.
    pub fn new(value: f32) -> Self {
        Self {
            value,
            arb_feedforward: 0,
            pid_slot: 0,
            arb_ff_units: 0,
        }
    }

    /// Encode into the 8-byte wire layout.
    pub fn to_frame_data(self) -> CanFrameData {
        let mut data = [0u8; 8];
        data[0..4].copy_from_slice(&self.value.to_le_bytes());
        data[4..6].copy_from_slice(&self.arb_feedforward.to_le_bytes());
        data[6] = self.pid_slot & 0x03;
        data[7] = self.arb_ff_units;
        CanFrameData::from_slice(&data)
    }

    /// Decode from the wire layout.
    pub fn from_frame_data(data: &[u8]) -> Result<Self> {
        if data.len() < 8 {
            return Err(SparkError::decode(format!(
                "setpoint payload needs 8 bytes, got {}",
                data.len()
            )));
        }
        Ok(Self {
            value: f32::from_le_bytes([data[0], data[1], data[2], data[3]]),
            arb_feedforward: i16::from_le_bytes([data[4], data[5]]),
            pid_slot: data[6] & 0x03,
            arb_ff_units: data[7],
        })
    }
}

/// The keep-alive payload.
pub fn heartbeat_payload() -> CanFrameData {
    CanFrameData::from_slice(&[0xFF; 8])
}

/// The burn-flash magic payload.
pub fn burn_flash_payload() -> CanFrameData {
    CanFrameData::from_slice(&[0xA3, 0x3A])
}

// ============================================================================
// Configuration parameters
// ============================================================================

/// Idle behavior when the applied output is zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum IdleMode {
    /// Output floats; the motor spins down freely.
    Coast = 0,
    /// Output shorts; the motor brakes.
    Brake = 1,
}

/// Firmware configuration parameters the driver writes.
///
/// Closed-loop gain groups repeat every 8 parameter IDs per slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigParameter {
    /// Idle mode (coast/brake).
    IdleMode,
    /// Proportional gain for a slot.
    P(u8),
    /// Integral gain for a slot.
    I(u8),
    /// Derivative gain for a slot.
    D(u8),
    /// Feedforward gain for a slot.
    F(u8),
}

const PARAM_IDLE_MODE: u16 = 6;
const PARAM_PID_GROUP_BASE: u16 = 12;
const PARAM_PID_GROUP_STRIDE: u16 = 8;

impl ConfigParameter {
    /// The parameter ID carried in the arbitration ID's API field.
    ///
    /// The caller guarantees gain slots are 0-3; the device handle validates
    /// this before encoding.
    pub fn id(self) -> u16 {
        match self {
            Self::IdleMode => PARAM_IDLE_MODE,
            Self::P(slot) => PARAM_PID_GROUP_BASE + slot as u16 * PARAM_PID_GROUP_STRIDE,
            Self::I(slot) => PARAM_PID_GROUP_BASE + 1 + slot as u16 * PARAM_PID_GROUP_STRIDE,
            Self::D(slot) => PARAM_PID_GROUP_BASE + 2 + slot as u16 * PARAM_PID_GROUP_STRIDE,
            Self::F(slot) => PARAM_PID_GROUP_BASE + 3 + slot as u16 * PARAM_PID_GROUP_STRIDE,
        }
    }
}

/// A typed parameter value with its wire type code.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamValue {
    /// Unsigned integer parameter (type code 0).
    Uint32(u32),
    /// Signed integer parameter (type code 1).
    Int32(i32),
    /// Floating-point parameter (type code 2).
    Float32(f32),
    /// Boolean parameter (type code 3).
    Bool(bool),
}

impl ParamValue {
    /// Encode into the 5-byte parameter-write layout.
    pub fn to_frame_data(self) -> CanFrameData {
        let mut data = [0u8; 5];
        match self {
            Self::Uint32(v) => {
                data[0..4].copy_from_slice(&v.to_le_bytes());
                data[4] = 0;
            }
            Self::Int32(v) => {
                data[0..4].copy_from_slice(&v.to_le_bytes());
                data[4] = 1;
            }
            Self::Float32(v) => {
                data[0..4].copy_from_slice(&v.to_le_bytes());
                data[4] = 2;
            }
            Self::Bool(v) => {
                data[0..4].copy_from_slice(&u32::from(v).to_le_bytes());
                data[4] = 3;
            }
        }
        CanFrameData::from_slice(&data)
    }
}

// ============================================================================
// Status payloads
// ============================================================================

/// Encode a status 0 payload (applied output fraction).
pub fn encode_status0(applied_output: f64) -> CanFrameData {
    let raw = (applied_output.clamp(-1.0, 1.0) * APPLIED_OUTPUT_SCALE)
        .clamp(i16::MIN as f64, i16::MAX as f64) as i16;
    let mut data = [0u8; 8];
    data[0..2].copy_from_slice(&raw.to_le_bytes());
    CanFrameData::from_slice(&data)
}

/// Encode a status 1 payload (velocity RPM, temperature degC, bus voltage V,
/// output current A).
pub fn encode_status1(velocity: f32, temperature: u8, voltage: f64, current: f64) -> CanFrameData {
    let volt_raw = ((voltage * BUS_VOLTAGE_SCALE) as u16).min(0xFFF);
    let curr_raw = ((current * OUTPUT_CURRENT_SCALE) as u16).min(0xFFF);

    let mut data = [0u8; 8];
    data[0..4].copy_from_slice(&velocity.to_le_bytes());
    data[4] = temperature;
    data[5] = (volt_raw & 0xFF) as u8;
    data[6] = ((volt_raw >> 8) & 0x0F) as u8 | ((curr_raw & 0x0F) << 4) as u8;
    data[7] = (curr_raw >> 4) as u8;
    CanFrameData::from_slice(&data)
}

/// Encode a status 2 payload (position in rotations).
pub fn encode_status2(position: f32) -> CanFrameData {
    let mut data = [0u8; 8];
    data[0..4].copy_from_slice(&position.to_le_bytes());
    CanFrameData::from_slice(&data)
}

/// Encode a status 5 payload (absolute encoder position in rotations).
pub fn encode_status5(position: f32) -> CanFrameData {
    let mut data = [0u8; 8];
    data[0..4].copy_from_slice(&position.to_le_bytes());
    CanFrameData::from_slice(&data)
}

fn read_f32(data: &[u8], message: MessageType) -> Result<f64> {
    if data.len() < 4 {
        return Err(SparkError::decode(format!(
            "{} payload needs 4 bytes, got {}",
            message.description(),
            data.len()
        )));
    }
    Ok(f32::from_le_bytes([data[0], data[1], data[2], data[3]]) as f64)
}

/// Decode a status payload into channel/value pairs.
fn decode_status(message: MessageType, data: &[u8]) -> Result<Vec<(TelemetryChannel, f64)>> {
    match message {
        MessageType::Status0 => {
            if data.len() < 2 {
                return Err(SparkError::decode(format!(
                    "status 0 payload needs 2 bytes, got {}",
                    data.len()
                )));
            }
            let raw = i16::from_le_bytes([data[0], data[1]]);
            Ok(vec![(
                TelemetryChannel::AppliedOutput,
                raw as f64 / APPLIED_OUTPUT_SCALE,
            )])
        }

        MessageType::Status1 => {
            if data.len() < 8 {
                return Err(SparkError::decode(format!(
                    "status 1 payload needs 8 bytes, got {}",
                    data.len()
                )));
            }
            let velocity = f32::from_le_bytes([data[0], data[1], data[2], data[3]]) as f64;
            let temperature = data[4] as f64;
            let volt_raw = data[5] as u16 | ((data[6] as u16 & 0x0F) << 8);
            let curr_raw = (data[6] as u16 >> 4) | ((data[7] as u16) << 4);
            Ok(vec![
                (TelemetryChannel::Velocity, velocity),
                (TelemetryChannel::MotorTemperature, temperature),
                (
                    TelemetryChannel::BusVoltage,
                    volt_raw as f64 / BUS_VOLTAGE_SCALE,
                ),
                (
                    TelemetryChannel::OutputCurrent,
                    curr_raw as f64 / OUTPUT_CURRENT_SCALE,
                ),
            ])
        }

        MessageType::Status2 => Ok(vec![(
            TelemetryChannel::Position,
            read_f32(data, message)?,
        )]),

        MessageType::Status5 => Ok(vec![(
            TelemetryChannel::AbsolutePosition,
            read_f32(data, message)?,
        )]),

        _ => Ok(Vec::new()),
    }
}

/// Decode a received frame into telemetry samples.
///
/// Returns `Ok(None)` for frames that are not telemetry for this driver:
/// foreign-prefix traffic, and command frames looped back by the interface.
/// Such frames never touch the telemetry cache. Returns `Err` only when a
/// frame matching the driver's prefix carries a malformed payload.
pub fn decode_telemetry(
    raw_id: u32,
    data: &[u8],
) -> Result<Option<(u8, Vec<(TelemetryChannel, f64)>)>> {
    let Some(arb) = ArbitrationId::decode(raw_id) else {
        return Ok(None);
    };
    if !arb.message.is_telemetry() {
        return Ok(None);
    }

    let samples = decode_status(arb.message, data)?;
    Ok(Some((arb.device_id, samples)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::arbitration::DeviceClass;

    #[test]
    fn test_setpoint_layout() {
        let data = Setpoint::new(0.5).to_frame_data();
        let bytes = data.as_slice();
        assert_eq!(bytes.len(), 8);
        assert_eq!(&bytes[0..4], &0.5f32.to_le_bytes());
        assert_eq!(&bytes[4..8], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_setpoint_roundtrip() {
        let original = Setpoint {
            value: -3.25,
            arb_feedforward: -120,
            pid_slot: 2,
            arb_ff_units: 1,
        };
        let decoded = Setpoint::from_frame_data(original.to_frame_data().as_slice()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_setpoint_quantization() {
        // Values within f32 precision survive the wire format.
        for v in [0.0f64, 1.0, -4.0, 0.125, 1234.5] {
            let decoded =
                Setpoint::from_frame_data(Setpoint::new(v as f32).to_frame_data().as_slice())
                    .unwrap();
            assert!((decoded.value as f64 - v).abs() < 1e-6);
        }
    }

    #[test]
    fn test_heartbeat_payload() {
        assert_eq!(heartbeat_payload().as_slice(), &[0xFF; 8]);
    }

    #[test]
    fn test_parameter_ids() {
        assert_eq!(ConfigParameter::IdleMode.id(), 6);
        assert_eq!(ConfigParameter::P(0).id(), 12);
        assert_eq!(ConfigParameter::I(0).id(), 13);
        assert_eq!(ConfigParameter::D(0).id(), 14);
        assert_eq!(ConfigParameter::F(0).id(), 15);
        assert_eq!(ConfigParameter::P(1).id(), 20);
        assert_eq!(ConfigParameter::D(3).id(), 38);
    }

    #[test]
    fn test_param_value_layout() {
        let data = ParamValue::Float32(0.2).to_frame_data();
        let bytes = data.as_slice();
        assert_eq!(bytes.len(), 5);
        assert_eq!(&bytes[0..4], &0.2f32.to_le_bytes());
        assert_eq!(bytes[4], 2);

        let data = ParamValue::Uint32(1).to_frame_data();
        assert_eq!(data.as_slice(), &[1, 0, 0, 0, 0]);

        let data = ParamValue::Bool(true).to_frame_data();
        assert_eq!(data.as_slice(), &[1, 0, 0, 0, 3]);
    }

    #[test]
    fn test_status1_roundtrip() {
        let data = encode_status1(1523.5, 41, 12.25, 14.5);
        let samples = decode_status(MessageType::Status1, data.as_slice()).unwrap();

        let get = |channel: TelemetryChannel| {
            samples
                .iter()
                .find(|(c, _)| *c == channel)
                .map(|(_, v)| *v)
                .unwrap()
        };

        assert!((get(TelemetryChannel::Velocity) - 1523.5).abs() < 1e-3);
        assert_eq!(get(TelemetryChannel::MotorTemperature), 41.0);
        assert!((get(TelemetryChannel::BusVoltage) - 12.25).abs() < 1.0 / 128.0);
        assert!((get(TelemetryChannel::OutputCurrent) - 14.5).abs() < 1.0 / 32.0);
    }

    #[test]
    fn test_status0_roundtrip() {
        let data = encode_status0(-0.75);
        let samples = decode_status(MessageType::Status0, data.as_slice()).unwrap();
        assert_eq!(samples.len(), 1);
        assert!((samples[0].1 - (-0.75)).abs() < 1.0 / 32768.0);
    }

    #[test]
    fn test_decode_telemetry_status_frames() {
        let raw = ArbitrationId::encode(DeviceClass::Max, MessageType::Status2, 9);
        let data = encode_status2(2.5);
        let (device_id, samples) = decode_telemetry(raw, data.as_slice()).unwrap().unwrap();
        assert_eq!(device_id, 9);
        assert_eq!(samples, vec![(TelemetryChannel::Position, 2.5)]);

        let raw = ArbitrationId::encode(DeviceClass::Max, MessageType::Status5, 9);
        let data = encode_status5(0.25);
        let (_, samples) = decode_telemetry(raw, data.as_slice()).unwrap().unwrap();
        assert_eq!(samples, vec![(TelemetryChannel::AbsolutePosition, 0.25)]);
    }

    #[test]
    fn test_decode_telemetry_ignores_foreign_and_commands() {
        // Foreign traffic on the shared bus.
        assert!(decode_telemetry(0x351, &[0u8; 8]).unwrap().is_none());

        // Our own command frames looped back by the interface.
        let raw = ArbitrationId::encode(DeviceClass::Max, MessageType::VelocitySet, 1);
        let data = Setpoint::new(1.0).to_frame_data();
        assert!(decode_telemetry(raw, data.as_slice()).unwrap().is_none());
    }

    #[test]
    fn test_decode_telemetry_short_payload() {
        let raw = ArbitrationId::encode(DeviceClass::Max, MessageType::Status1, 1);
        assert!(decode_telemetry(raw, &[0u8; 3]).is_err());
    }
}
