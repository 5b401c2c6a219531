//! Device handles for Spark-family motor controllers.
//!
//! A [`SparkDevice`] is bound to one (interface, device ID) pair. Setters
//! encode a command frame and send it through the shared bus; getters read
//! the telemetry store populated by the bus's receive loop. The two models
//! share all behavior - [`SparkMax`] and [`SparkFlex`] are thin front types
//! over a [`DeviceClass`] tag that feeds the codec's prefix lookup.
//!
//! Getters return [`SparkError::Stale`] until the first matching status
//! frame has been decoded; a valid zero reading is never conflated with
//! "no data".

use std::ops::Deref;
use std::sync::{Arc, Mutex};

use crate::bus::SparkBus;
use crate::codec::arbitration::{ArbitrationId, DeviceClass, MessageType, MAX_DEVICE_ID};
use crate::codec::payload::{
    burn_flash_payload, heartbeat_payload, ConfigParameter, IdleMode, ParamValue, Setpoint,
    TelemetryChannel,
};
use crate::core::config::BusConfig;
use crate::core::diagnostics::Diagnostics;
use crate::core::error::{Result, SparkError};
use crate::core::frame::{CanFrameData, CanMessage};
use crate::heartbeat::Heartbeat;
use crate::store::TelemetrySample;

/// Highest closed-loop gain slot.
const MAX_PID_SLOT: u8 = 3;

/// A handle to one Spark controller on a CAN interface.
///
/// The handle holds a reference-counted share of the interface's bus;
/// the socket closes when the last handle on the interface is dropped.
/// Dropping a handle stops its heartbeat loop and deregisters its
/// telemetry slots.
pub struct SparkDevice {
    class: DeviceClass,
    device_id: u8,
    bus: Arc<SparkBus>,
    heartbeat: Mutex<Heartbeat>,
}

impl std::fmt::Debug for SparkDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SparkDevice")
            .field("class", &self.class)
            .field("device_id", &self.device_id)
            .finish_non_exhaustive()
    }
}

impl SparkDevice {
    /// Open a device handle on an interface with default bus timing.
    ///
    /// Fails with [`SparkError::InvalidDeviceId`] outside 0-63, with
    /// [`SparkError::InterfaceUnavailable`] when the interface cannot be
    /// opened, and with [`SparkError::AlreadyAttached`] when another handle
    /// on the interface owns the ID. The heartbeat is not started.
    pub async fn open(class: DeviceClass, interface: &str, device_id: u8) -> Result<Self> {
        Self::open_with_config(class, &BusConfig::new(interface), device_id).await
    }

    /// Open a device handle with explicit bus configuration.
    ///
    /// The first opener of an interface fixes its timing parameters; later
    /// handles share the running bus.
    pub async fn open_with_config(
        class: DeviceClass,
        config: &BusConfig,
        device_id: u8,
    ) -> Result<Self> {
        if device_id > MAX_DEVICE_ID {
            return Err(SparkError::InvalidDeviceId(device_id));
        }
        let bus = SparkBus::attach(config)?;
        Self::with_bus(class, bus, device_id)
    }

    /// Bind to an already-open bus.
    pub(crate) fn with_bus(class: DeviceClass, bus: Arc<SparkBus>, device_id: u8) -> Result<Self> {
        if device_id > MAX_DEVICE_ID {
            return Err(SparkError::InvalidDeviceId(device_id));
        }
        if !bus.store().register(device_id) {
            return Err(SparkError::AlreadyAttached(device_id));
        }

        #[cfg(feature = "tracing-support")]
        tracing::info!(
            interface = %bus.interface(),
            device_id = device_id,
            class = %class,
            "device handle opened"
        );

        let heartbeat = Heartbeat::new(bus.heartbeat_period());
        Ok(Self {
            class,
            device_id,
            bus,
            heartbeat: Mutex::new(heartbeat),
        })
    }

    // ========================================================================
    // Command path
    // ========================================================================

    fn command(&self, message: MessageType, data: CanFrameData) -> Result<()> {
        let id = ArbitrationId::encode(self.class, message, self.device_id);
        self.bus.send(&CanMessage::new(id, data.as_slice()))
    }

    fn setpoint(&self, message: MessageType, value: f64) -> Result<()> {
        if !value.is_finite() {
            return Err(SparkError::NonFiniteSetpoint(value));
        }
        self.command(message, Setpoint::new(value as f32).to_frame_data())
    }

    /// Command a closed-loop position in rotations.
    pub fn set_position(&self, rotations: f64) -> Result<()> {
        self.setpoint(MessageType::PositionSet, rotations)
    }

    /// Command a closed-loop velocity in RPM.
    pub fn set_velocity(&self, rpm: f64) -> Result<()> {
        self.setpoint(MessageType::VelocitySet, rpm)
    }

    /// Command an open-loop duty cycle in [-1, 1].
    pub fn set_duty_cycle(&self, output: f64) -> Result<()> {
        self.setpoint(MessageType::DutyCycleSet, output)
    }

    /// Command an output voltage in volts.
    pub fn set_voltage(&self, volts: f64) -> Result<()> {
        self.setpoint(MessageType::VoltageSet, volts)
    }

    /// Clear sticky faults.
    pub fn clear_sticky_faults(&self) -> Result<()> {
        self.command(MessageType::ClearFaults, CanFrameData::from_slice(&[]))
    }

    /// Persist the current configuration to flash.
    pub fn burn_flash(&self) -> Result<()> {
        self.command(MessageType::BurnFlash, burn_flash_payload())
    }

    fn write_parameter(&self, param: ConfigParameter, value: ParamValue) -> Result<()> {
        self.command(MessageType::Parameter(param.id()), value.to_frame_data())
    }

    /// Set the idle behavior (coast or brake).
    pub fn set_idle_mode(&self, mode: IdleMode) -> Result<()> {
        self.write_parameter(ConfigParameter::IdleMode, ParamValue::Uint32(mode as u32))
    }

    fn gain_slot(slot: u8) -> Result<u8> {
        if slot > MAX_PID_SLOT {
            return Err(SparkError::InvalidPidSlot(slot));
        }
        Ok(slot)
    }

    /// Set the proportional gain for a closed-loop slot (0-3).
    pub fn set_p(&self, slot: u8, gain: f64) -> Result<()> {
        let slot = Self::gain_slot(slot)?;
        self.write_parameter(ConfigParameter::P(slot), ParamValue::Float32(gain as f32))
    }

    /// Set the integral gain for a closed-loop slot (0-3).
    pub fn set_i(&self, slot: u8, gain: f64) -> Result<()> {
        let slot = Self::gain_slot(slot)?;
        self.write_parameter(ConfigParameter::I(slot), ParamValue::Float32(gain as f32))
    }

    /// Set the derivative gain for a closed-loop slot (0-3).
    pub fn set_d(&self, slot: u8, gain: f64) -> Result<()> {
        let slot = Self::gain_slot(slot)?;
        self.write_parameter(ConfigParameter::D(slot), ParamValue::Float32(gain as f32))
    }

    /// Set the feedforward gain for a closed-loop slot (0-3).
    pub fn set_f(&self, slot: u8, gain: f64) -> Result<()> {
        let slot = Self::gain_slot(slot)?;
        self.write_parameter(ConfigParameter::F(slot), ParamValue::Float32(gain as f32))
    }

    // ========================================================================
    // Telemetry path
    // ========================================================================

    /// The latest sample for a channel, with its arrival timestamp.
    pub fn sample(&self, channel: TelemetryChannel) -> Result<TelemetrySample> {
        self.bus
            .store()
            .read(self.device_id, channel)
            .ok_or(SparkError::Stale(channel))
    }

    fn read(&self, channel: TelemetryChannel) -> Result<f64> {
        self.sample(channel).map(|s| s.value)
    }

    /// Motor velocity in RPM.
    pub fn velocity(&self) -> Result<f64> {
        self.read(TelemetryChannel::Velocity)
    }

    /// Primary encoder position in rotations.
    pub fn position(&self) -> Result<f64> {
        self.read(TelemetryChannel::Position)
    }

    /// Absolute encoder position in rotations.
    pub fn absolute_encoder_position(&self) -> Result<f64> {
        self.read(TelemetryChannel::AbsolutePosition)
    }

    /// Bus voltage in volts.
    pub fn bus_voltage(&self) -> Result<f64> {
        self.read(TelemetryChannel::BusVoltage)
    }

    /// Motor temperature in degrees Celsius.
    pub fn motor_temperature(&self) -> Result<f64> {
        self.read(TelemetryChannel::MotorTemperature)
    }

    /// Output current in amps.
    pub fn output_current(&self) -> Result<f64> {
        self.read(TelemetryChannel::OutputCurrent)
    }

    /// Applied output as a fraction of full scale.
    pub fn applied_output(&self) -> Result<f64> {
        self.read(TelemetryChannel::AppliedOutput)
    }

    // ========================================================================
    // Heartbeat control
    // ========================================================================

    /// Start or stop the keep-alive loop for this device.
    ///
    /// Idempotent in both directions: enabling while running and disabling
    /// while stopped are no-ops.
    pub async fn heartbeat(&self, enable: bool) {
        let mut hb = self.heartbeat.lock().expect("Mutex poisoned");
        if enable {
            let id = ArbitrationId::encode(self.class, MessageType::Heartbeat, self.device_id);
            let frame = CanMessage::new(id, heartbeat_payload().as_slice());
            hb.start(Arc::clone(&self.bus), frame);
        } else {
            hb.stop();
        }
    }

    /// Whether the keep-alive loop is running.
    pub fn heartbeat_running(&self) -> bool {
        self.heartbeat.lock().expect("Mutex poisoned").is_running()
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// The controller model tag.
    pub fn device_class(&self) -> DeviceClass {
        self.class
    }

    /// The device ID on the bus.
    pub fn device_id(&self) -> u8 {
        self.device_id
    }

    /// The CAN interface name.
    pub fn interface(&self) -> &str {
        self.bus.interface()
    }

    /// Snapshot the shared bus's counters.
    pub fn diagnostics(&self) -> Diagnostics {
        self.bus.diagnostics()
    }
}

impl Drop for SparkDevice {
    fn drop(&mut self) {
        self.heartbeat.lock().expect("Mutex poisoned").stop();
        self.bus.store().deregister(self.device_id);

        #[cfg(feature = "tracing-support")]
        tracing::info!(
            interface = %self.bus.interface(),
            device_id = self.device_id,
            "device handle closed"
        );
    }
}

/// A SPARK MAX controller handle.
pub struct SparkMax(SparkDevice);

impl SparkMax {
    /// Open a SPARK MAX on an interface.
    pub async fn open(interface: &str, device_id: u8) -> Result<Self> {
        SparkDevice::open(DeviceClass::Max, interface, device_id)
            .await
            .map(Self)
    }

    /// Open with explicit bus configuration.
    pub async fn open_with_config(config: &BusConfig, device_id: u8) -> Result<Self> {
        SparkDevice::open_with_config(DeviceClass::Max, config, device_id)
            .await
            .map(Self)
    }
}

impl Deref for SparkMax {
    type Target = SparkDevice;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// A SPARK Flex controller handle.
pub struct SparkFlex(SparkDevice);

impl SparkFlex {
    /// Open a SPARK Flex on an interface.
    pub async fn open(interface: &str, device_id: u8) -> Result<Self> {
        SparkDevice::open(DeviceClass::Flex, interface, device_id)
            .await
            .map(Self)
    }

    /// Open with explicit bus configuration.
    pub async fn open_with_config(config: &BusConfig, device_id: u8) -> Result<Self> {
        SparkDevice::open_with_config(DeviceClass::Flex, config, device_id)
            .await
            .map(Self)
    }
}

impl Deref for SparkFlex {
    type Target = SparkDevice;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
