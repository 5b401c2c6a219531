//! Background keep-alive loop.
//!
//! Spark controllers disable their outputs when the host stops sending
//! heartbeat frames. The loop transmits one frame per period from its own
//! tokio task, independent of caller activity. Send failures are logged
//! and counted; the loop retries on its next cycle rather than stopping,
//! so a temporarily noisy or disconnected bus recovers without a restart.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::bus::SparkBus;
use crate::core::frame::CanMessage;

/// State machine: Stopped -> (start) -> Running -> (stop) -> Stopped.
///
/// `start` while running is a no-op; `stop` aborts the pending wait
/// immediately instead of letting a full period elapse, and the task
/// handle is dropped so stop/start cycles never leak a scheduling
/// resource.
#[derive(Debug)]
pub struct Heartbeat {
    period: Duration,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Heartbeat {
    /// Create a stopped loop with the given period.
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    /// Whether the loop is currently running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst) && self.handle.is_some()
    }

    /// The configured period.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Start the loop; a frame goes out immediately and then once per
    /// period. No-op when already running.
    pub fn start(&mut self, bus: Arc<SparkBus>, frame: CanMessage) {
        if self.is_running() {
            return;
        }

        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        let period = self.period;

        self.handle = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);

            loop {
                interval.tick().await;

                if !running.load(Ordering::SeqCst) {
                    break;
                }

                // Best-effort liveness: one missed frame must not cascade
                // into stopping future ones. The bus counts the failure.
                if let Err(_e) = bus.send(&frame) {
                    #[cfg(feature = "tracing-support")]
                    tracing::warn!(interface = %bus.interface(), "heartbeat send failed: {}", _e);
                }
            }

            #[cfg(feature = "tracing-support")]
            tracing::debug!("heartbeat loop stopped");
        }));
    }

    /// Stop the loop, cancelling its pending wait. No-op when stopped.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::arbitration::{ArbitrationId, DeviceClass, MessageType};
    use crate::codec::payload::heartbeat_payload;
    use crate::core::config::BusConfig;
    use crate::test_support::MockBus;

    const PERIOD: Duration = Duration::from_millis(25);

    fn heartbeat_frame(device_id: u8) -> CanMessage {
        CanMessage::new(
            ArbitrationId::encode(DeviceClass::Max, MessageType::Heartbeat, device_id),
            heartbeat_payload().as_slice(),
        )
    }

    fn mock_bus() -> (Arc<MockBus>, Arc<SparkBus>) {
        let mock = Arc::new(MockBus::new());
        let bus = SparkBus::with_io(mock.clone(), &BusConfig::new("mock0"));
        (mock, bus)
    }

    #[tokio::test(start_paused = true)]
    async fn test_liveness_over_consecutive_periods() {
        let (mock, bus) = mock_bus();
        let mut hb = Heartbeat::new(PERIOD);
        hb.start(bus, heartbeat_frame(1));

        // At least one frame per period-plus-epsilon window, five periods.
        for n in 1..=5u64 {
            tokio::time::sleep(PERIOD + Duration::from_millis(1)).await;
            assert!(mock.sent_len() as u64 >= n, "period {}", n);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_survives_send_failures() {
        let (mock, bus) = mock_bus();
        mock.set_fail_sends(true);

        let mut hb = Heartbeat::new(PERIOD);
        hb.start(bus, heartbeat_frame(1));

        tokio::time::sleep(PERIOD * 3 + Duration::from_millis(1)).await;
        let failed_attempts = mock.send_attempts();
        assert!(failed_attempts >= 3);

        // Bus recovers; the loop resumes delivering without a restart.
        mock.set_fail_sends(false);
        tokio::time::sleep(PERIOD * 3).await;
        assert!(mock.sent_len() >= 2);
        assert!(mock.send_attempts() > failed_attempts);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent() {
        let (mock, bus) = mock_bus();
        let mut hb = Heartbeat::new(PERIOD);
        hb.start(bus.clone(), heartbeat_frame(1));
        hb.start(bus, heartbeat_frame(1));
        assert!(hb.is_running());

        tokio::time::sleep(PERIOD * 4 + Duration::from_millis(1)).await;

        // One loop, not two: no duplicate frames at twice the rate.
        let sent = mock.sent_len();
        assert!((4..=6).contains(&sent), "sent {} frames", sent);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_halts_within_one_period() {
        let (mock, bus) = mock_bus();
        let mut hb = Heartbeat::new(PERIOD);
        hb.start(bus, heartbeat_frame(1));

        tokio::time::sleep(PERIOD * 2 + Duration::from_millis(1)).await;
        hb.stop();
        assert!(!hb.is_running());

        let sent_at_stop = mock.sent_len();
        tokio::time::sleep(PERIOD * 4).await;
        assert_eq!(mock.sent_len(), sent_at_stop);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_after_stop() {
        let (mock, bus) = mock_bus();
        let mut hb = Heartbeat::new(PERIOD);

        hb.start(bus.clone(), heartbeat_frame(1));
        tokio::time::sleep(PERIOD).await;
        hb.stop();

        let sent_at_stop = mock.sent_len();
        hb.start(bus, heartbeat_frame(1));
        tokio::time::sleep(PERIOD * 2).await;
        assert!(hb.is_running());
        assert!(mock.sent_len() > sent_at_stop);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_stops_loop() {
        let (mock, bus) = mock_bus();
        let mut hb = Heartbeat::new(PERIOD);
        hb.start(bus, heartbeat_frame(1));

        tokio::time::sleep(PERIOD).await;
        drop(hb);

        let sent_at_drop = mock.sent_len();
        tokio::time::sleep(PERIOD * 4).await;
        assert_eq!(mock.sent_len(), sent_at_drop);
    }
}
