//! Bus transport layer.
//!
//! A [`SparkBus`] owns one CAN interface: the frame I/O, the telemetry
//! store, diagnostics counters, and the background receive loop that
//! decodes incoming status frames into the store. Multiple device handles
//! on the same interface share one bus through a process-wide registry of
//! reference-counted instances; the interface closes when the last handle
//! releases its reference.

mod io;
mod socket;

pub use io::FrameIo;
pub use socket::SocketBus;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use once_cell::sync::Lazy;
use tokio::task::JoinHandle;

use crate::codec::payload::decode_telemetry;
use crate::core::config::BusConfig;
use crate::core::diagnostics::Diagnostics;
use crate::core::error::Result;
use crate::core::frame::CanMessage;
use crate::store::TelemetryStore;

/// Backoff after a socket-level receive error before polling again.
const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Process-wide registry: interface name -> live bus.
static BUS_REGISTRY: Lazy<Mutex<HashMap<String, Weak<SparkBus>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

#[derive(Debug, Default)]
struct Counters {
    frames_received: AtomicU64,
    frames_ignored: AtomicU64,
    decode_errors: AtomicU64,
    send_errors: AtomicU64,
    receive_errors: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl Counters {
    fn record_error(&self, msg: String) {
        *self.last_error.lock().expect("Mutex poisoned") = Some(msg);
    }
}

/// A shared CAN bus: transport, telemetry store, and receive loop.
pub struct SparkBus {
    interface: String,
    heartbeat_period: Duration,
    io: Arc<dyn FrameIo>,
    store: Arc<TelemetryStore>,
    running: Arc<AtomicBool>,
    counters: Arc<Counters>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for SparkBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SparkBus")
            .field("interface", &self.interface)
            .field("heartbeat_period", &self.heartbeat_period)
            .finish_non_exhaustive()
    }
}

impl SparkBus {
    /// Attach to the shared bus for an interface, opening it on first use.
    ///
    /// The timing parameters of the first opener win; later attachments on
    /// the same interface reuse the running bus.
    ///
    /// Must be called from within a tokio runtime (the receive loop is
    /// spawned here).
    pub fn attach(config: &BusConfig) -> Result<Arc<Self>> {
        let mut registry = BUS_REGISTRY.lock().expect("Mutex poisoned");
        registry.retain(|_, weak| weak.strong_count() > 0);

        if let Some(bus) = registry.get(&config.interface).and_then(Weak::upgrade) {
            return Ok(bus);
        }

        let bus = Self::open(config)?;
        registry.insert(config.interface.clone(), Arc::downgrade(&bus));
        Ok(bus)
    }

    /// Open an interface without going through the registry.
    pub fn open(config: &BusConfig) -> Result<Arc<Self>> {
        let io = Arc::new(SocketBus::open(&config.interface)?);
        Ok(Self::with_io(io, config))
    }

    /// Build a bus over any frame I/O and start its receive loop.
    pub(crate) fn with_io(io: Arc<dyn FrameIo>, config: &BusConfig) -> Arc<Self> {
        let bus = Arc::new(Self {
            interface: config.interface.clone(),
            heartbeat_period: config.heartbeat_period(),
            io,
            store: Arc::new(TelemetryStore::new()),
            running: Arc::new(AtomicBool::new(true)),
            counters: Arc::new(Counters::default()),
            listener: Mutex::new(None),
        });
        bus.start_listener(config.rx_poll_interval());
        bus
    }

    /// Spawn the receive loop: poll the nonblocking socket on an interval,
    /// drain all pending frames, decode into the store.
    fn start_listener(&self, poll_interval: Duration) {
        let io = Arc::clone(&self.io);
        let store = Arc::clone(&self.store);
        let running = Arc::clone(&self.running);
        let counters = Arc::clone(&self.counters);

        #[cfg(feature = "tracing-support")]
        tracing::debug!(interface = %self.interface, "starting CAN receive loop");

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(poll_interval);

            loop {
                interval.tick().await;

                if !running.load(Ordering::SeqCst) {
                    break;
                }

                loop {
                    match io.try_recv() {
                        Ok(Some(msg)) => process_frame(&msg, &store, &counters),
                        Ok(None) => break,
                        Err(e) => {
                            counters.receive_errors.fetch_add(1, Ordering::Relaxed);
                            counters.record_error(e.to_string());

                            #[cfg(feature = "tracing-support")]
                            tracing::warn!("CAN receive error: {}", e);

                            // The loop survives a noisy or disconnected bus
                            // and resumes once it recovers.
                            tokio::time::sleep(RECV_ERROR_BACKOFF).await;
                            break;
                        }
                    }
                }
            }

            #[cfg(feature = "tracing-support")]
            tracing::debug!("CAN receive loop stopped");
        });

        *self.listener.lock().expect("Mutex poisoned") = Some(handle);
    }

    /// Write one frame to the bus.
    pub fn send(&self, msg: &CanMessage) -> Result<()> {
        self.io.send(msg).inspect_err(|e| {
            self.counters.send_errors.fetch_add(1, Ordering::Relaxed);
            self.counters.record_error(e.to_string());
        })
    }

    /// The telemetry store shared by all handles on this interface.
    pub fn store(&self) -> &TelemetryStore {
        &self.store
    }

    /// The interface name.
    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// Heartbeat period configured when the bus was opened.
    pub fn heartbeat_period(&self) -> Duration {
        self.heartbeat_period
    }

    /// Snapshot the bus counters.
    pub fn diagnostics(&self) -> Diagnostics {
        Diagnostics {
            interface: self.interface.clone(),
            frames_received: self.counters.frames_received.load(Ordering::Relaxed),
            frames_ignored: self.counters.frames_ignored.load(Ordering::Relaxed),
            decode_errors: self.counters.decode_errors.load(Ordering::Relaxed),
            send_errors: self.counters.send_errors.load(Ordering::Relaxed),
            receive_errors: self.counters.receive_errors.load(Ordering::Relaxed),
            last_error: self
                .counters
                .last_error
                .lock()
                .expect("Mutex poisoned")
                .clone(),
            extra: serde_json::json!({
                "heartbeat_period_ms": self.heartbeat_period.as_millis() as u64,
            }),
        }
    }
}

impl Drop for SparkBus {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.listener.lock().expect("Mutex poisoned").take() {
            handle.abort();
        }
    }
}

/// Decode one received frame into the store.
fn process_frame(msg: &CanMessage, store: &TelemetryStore, counters: &Counters) {
    match decode_telemetry(msg.id(), msg.data()) {
        Ok(Some((device_id, samples))) => {
            if store.is_registered(device_id) {
                counters.frames_received.fetch_add(1, Ordering::Relaxed);
                for (channel, value) in samples {
                    store.update(device_id, channel, value);
                }
            } else {
                counters.frames_ignored.fetch_add(1, Ordering::Relaxed);
            }
        }
        // Foreign traffic and command echoes; never touches the store.
        Ok(None) => {
            counters.frames_ignored.fetch_add(1, Ordering::Relaxed);
        }
        Err(e) => {
            counters.decode_errors.fetch_add(1, Ordering::Relaxed);
            counters.record_error(e.to_string());

            #[cfg(feature = "tracing-support")]
            tracing::warn!("decode error on id 0x{:08X}: {}", msg.id(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::arbitration::{ArbitrationId, DeviceClass, MessageType};
    use crate::codec::payload::{encode_status1, encode_status2, TelemetryChannel};
    use crate::test_support::MockBus;

    fn status2_frame(device_id: u8, position: f32) -> CanMessage {
        CanMessage::new(
            ArbitrationId::encode(DeviceClass::Max, MessageType::Status2, device_id),
            encode_status2(position).as_slice(),
        )
    }

    async fn settle(config: &BusConfig) {
        // Paused clock: this advances virtual time past a few poll ticks.
        tokio::time::sleep(config.rx_poll_interval() * 4).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_listener_decodes_into_store() {
        let mock = Arc::new(MockBus::new());
        let config = BusConfig::new("mock0");
        let bus = SparkBus::with_io(mock.clone(), &config);
        bus.store().register(1);

        mock.push_rx(status2_frame(1, 2.5));
        settle(&config).await;

        let sample = bus.store().read(1, TelemetryChannel::Position).unwrap();
        assert_eq!(sample.value, 2.5);
        assert_eq!(bus.diagnostics().frames_received, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status1_fans_out_channels() {
        let mock = Arc::new(MockBus::new());
        let config = BusConfig::new("mock0");
        let bus = SparkBus::with_io(mock.clone(), &config);
        bus.store().register(2);

        mock.push_rx(CanMessage::new(
            ArbitrationId::encode(DeviceClass::Max, MessageType::Status1, 2),
            encode_status1(980.0, 35, 12.0, 8.0).as_slice(),
        ));
        settle(&config).await;

        let store = bus.store();
        assert!((store.read(2, TelemetryChannel::Velocity).unwrap().value - 980.0).abs() < 1e-3);
        assert_eq!(
            store.read(2, TelemetryChannel::MotorTemperature).unwrap().value,
            35.0
        );
        assert!(store.read(2, TelemetryChannel::BusVoltage).is_some());
        assert!(store.read(2, TelemetryChannel::OutputCurrent).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_foreign_frames_never_touch_store() {
        let mock = Arc::new(MockBus::new());
        let config = BusConfig::new("mock0");
        let bus = SparkBus::with_io(mock.clone(), &config);
        bus.store().register(1);

        // Battery-management traffic from another node on the shared bus.
        mock.push_rx(CanMessage::new(0x351, &[0x12, 0x34, 0x56, 0x78]));
        settle(&config).await;

        for channel in TelemetryChannel::ALL {
            assert!(bus.store().read(1, channel).is_none());
        }
        let diag = bus.diagnostics();
        assert_eq!(diag.frames_received, 0);
        assert_eq!(diag.frames_ignored, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unregistered_device_ignored() {
        let mock = Arc::new(MockBus::new());
        let config = BusConfig::new("mock0");
        let bus = SparkBus::with_io(mock.clone(), &config);

        mock.push_rx(status2_frame(9, 1.0));
        settle(&config).await;

        assert!(bus.store().read(9, TelemetryChannel::Position).is_none());
        assert_eq!(bus.diagnostics().frames_ignored, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_payload_counted_and_survived() {
        let mock = Arc::new(MockBus::new());
        let config = BusConfig::new("mock0");
        let bus = SparkBus::with_io(mock.clone(), &config);
        bus.store().register(1);

        mock.push_rx(CanMessage::new(
            ArbitrationId::encode(DeviceClass::Max, MessageType::Status1, 1),
            &[0x00, 0x01],
        ));
        settle(&config).await;

        let diag = bus.diagnostics();
        assert_eq!(diag.decode_errors, 1);
        assert!(diag.last_error.is_some());

        // The loop keeps decoding after a bad frame.
        mock.push_rx(status2_frame(1, 4.0));
        settle(&config).await;
        assert_eq!(bus.store().read(1, TelemetryChannel::Position).unwrap().value, 4.0);
    }

    #[test]
    fn test_recv_timeout_contract() {
        let mock = MockBus::new();
        let timeout = Duration::from_millis(5);

        assert!(matches!(
            mock.recv_timeout(timeout),
            Err(crate::core::error::SparkError::Timeout(_))
        ));

        mock.push_rx(status2_frame(1, 1.0));
        assert_eq!(mock.recv_timeout(timeout).unwrap(), status2_frame(1, 1.0));
    }

    #[test]
    fn test_attach_missing_interface() {
        // The registry never caches a failed open.
        for _ in 0..2 {
            let err = SparkBus::attach(&BusConfig::new("sparkbus-no-such-if")).unwrap_err();
            assert!(matches!(
                err,
                crate::core::error::SparkError::InterfaceUnavailable { .. }
            ));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_errors_counted() {
        let mock = Arc::new(MockBus::new());
        let config = BusConfig::new("mock0");
        let bus = SparkBus::with_io(mock.clone(), &config);

        mock.set_fail_sends(true);
        assert!(bus.send(&status2_frame(1, 0.0)).is_err());
        assert_eq!(bus.diagnostics().send_errors, 1);
        assert!(bus.diagnostics().last_error.is_some());
    }
}
