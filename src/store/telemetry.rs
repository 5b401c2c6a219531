//! Latest-value telemetry storage.
//!
//! One slot per (device, channel), overwritten in place as status frames
//! arrive. Single writer (the bus receive loop), any number of readers.
//! A slot swaps the whole sample under one short write lock - a reader
//! never observes a partially updated sample - and carries an atomic
//! version counter for change detection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::codec::payload::TelemetryChannel;

/// A decoded telemetry value with its arrival timestamp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetrySample {
    /// Physical quantity in the channel's unit.
    pub value: f64,
    /// When the receive loop committed the sample.
    pub timestamp: DateTime<Utc>,
}

/// A single channel's storage slot.
#[derive(Debug, Default)]
pub struct TelemetrySlot {
    /// The latest sample; `None` until the first frame arrives.
    sample: RwLock<Option<TelemetrySample>>,
    /// Incremented on each update, after the sample is committed.
    version: AtomicU64,
}

impl TelemetrySlot {
    /// Commit a new sample (called only by the receive loop).
    pub fn update(&self, value: f64) {
        let sample = TelemetrySample {
            value,
            timestamp: Utc::now(),
        };
        {
            let mut guard = self.sample.write().expect("RwLock poisoned");
            *guard = Some(sample);
        }
        self.version.fetch_add(1, Ordering::Release);
    }

    /// Read the latest committed sample, `None` if never populated.
    pub fn read(&self) -> Option<TelemetrySample> {
        *self.sample.read().expect("RwLock poisoned")
    }

    /// The update counter; useful for change detection without reading.
    #[inline]
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }
}

/// Fixed per-device slot array, indexed by channel.
#[derive(Debug, Default)]
struct DeviceSlots {
    slots: [TelemetrySlot; TelemetryChannel::COUNT],
}

/// The shared telemetry cache for one bus.
///
/// Devices register their channels at handle construction and deregister at
/// teardown; frames for unregistered device IDs are dropped by the caller.
#[derive(Debug, Default)]
pub struct TelemetryStore {
    devices: DashMap<u8, DeviceSlots>,
}

impl TelemetryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device's channel slots.
    ///
    /// Returns `false` if the device is already registered - device IDs are
    /// unique per interface.
    pub fn register(&self, device_id: u8) -> bool {
        match self.devices.entry(device_id) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(DeviceSlots::default());
                true
            }
        }
    }

    /// Remove a device's slots.
    pub fn deregister(&self, device_id: u8) {
        self.devices.remove(&device_id);
    }

    /// Whether a device is registered.
    pub fn is_registered(&self, device_id: u8) -> bool {
        self.devices.contains_key(&device_id)
    }

    /// Commit a sample for a channel.
    ///
    /// Returns `false` when the device is not registered (the frame is
    /// dropped and counted by the caller).
    pub fn update(&self, device_id: u8, channel: TelemetryChannel, value: f64) -> bool {
        match self.devices.get(&device_id) {
            Some(slots) => {
                slots.slots[channel.index()].update(value);
                true
            }
            None => false,
        }
    }

    /// Read the latest sample for a channel, `None` if never populated.
    pub fn read(&self, device_id: u8, channel: TelemetryChannel) -> Option<TelemetrySample> {
        self.devices
            .get(&device_id)
            .and_then(|slots| slots.slots[channel.index()].read())
    }

    /// The channel's update counter, 0 if the device is not registered.
    pub fn version(&self, device_id: u8, channel: TelemetryChannel) -> u64 {
        self.devices
            .get(&device_id)
            .map(|slots| slots.slots[channel.index()].version())
            .unwrap_or(0)
    }
}
