//! In-memory frame I/O for tests.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::bus::FrameIo;
use crate::core::error::{Result, SparkError};
use crate::core::frame::CanMessage;

/// A scriptable bus: records every frame sent whole, replays a queued
/// receive sequence, and can be switched to fail all sends.
#[derive(Debug, Default)]
pub struct MockBus {
    sent: Mutex<Vec<CanMessage>>,
    rx_queue: Mutex<VecDeque<CanMessage>>,
    fail_sends: AtomicBool,
    send_attempts: AtomicU64,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a frame for the receive path.
    pub fn push_rx(&self, msg: CanMessage) {
        self.rx_queue.lock().unwrap().push_back(msg);
    }

    /// Make every subsequent send fail (or succeed again).
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Frames successfully sent, in order.
    pub fn sent(&self) -> Vec<CanMessage> {
        self.sent.lock().unwrap().clone()
    }

    /// Number of successful sends.
    pub fn sent_len(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    /// Number of send attempts, including failed ones.
    pub fn send_attempts(&self) -> u64 {
        self.send_attempts.load(Ordering::SeqCst)
    }
}

impl FrameIo for MockBus {
    fn send(&self, msg: &CanMessage) -> Result<()> {
        self.send_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(SparkError::Transmit(io::Error::new(
                io::ErrorKind::Other,
                "injected transmit failure",
            )));
        }
        self.sent.lock().unwrap().push(*msg);
        Ok(())
    }

    fn try_recv(&self) -> Result<Option<CanMessage>> {
        Ok(self.rx_queue.lock().unwrap().pop_front())
    }

    fn recv_timeout(&self, timeout: Duration) -> Result<CanMessage> {
        match self.try_recv()? {
            Some(msg) => Ok(msg),
            None => Err(SparkError::Timeout(timeout)),
        }
    }
}
