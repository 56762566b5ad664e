//! Motion device abstraction
//!
//! The capture loop only needs three things from a tracking device: a way to
//! be told when a new sample is ready, a way to fetch that sample, and a way
//! to serialize it. Everything else the device can do (policies, gestures,
//! images) stays outside the core.
//!
//! Notifications arrive on whatever thread the device uses internally; they
//! are forwarded as [`DeviceEvent`]s onto a channel owned by the capture
//! worker, which processes them in order on its own thread.

use crossbeam_channel::Sender;

use crate::error::Result;

/// Notification from a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceEvent {
    /// The device became available
    Connected,
    /// A new sample can be fetched with [`MotionDevice::current_sample`]
    SampleReady,
    /// The device went away
    Disconnected,
}

/// One captured sample
pub trait Sample: Send {
    /// Device-assigned sample identifier
    fn id(&self) -> u64;

    /// Opaque serialized form written as the record payload
    fn serialize(&self) -> Vec<u8>;
}

/// A motion tracking device
#[cfg_attr(test, mockall::automock)]
pub trait MotionDevice: Send {
    /// Human-readable device name
    fn name(&self) -> String;

    /// Start delivering notifications to `events`
    ///
    /// The queue is bounded. Implementations use `try_send` and drop
    /// notifications while it is full.
    fn subscribe(&mut self, events: Sender<DeviceEvent>) -> Result<()>;

    /// Fetch the most recent sample
    fn current_sample(&mut self) -> Result<Box<dyn Sample>>;

    /// Stop delivering notifications
    fn unsubscribe(&mut self);
}

/// A sample that is already serialized
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BytesSample {
    id: u64,
    data: Vec<u8>,
}

impl BytesSample {
    pub fn new(id: u64, data: impl Into<Vec<u8>>) -> Self {
        Self { id, data: data.into() }
    }
}

impl Sample for BytesSample {
    fn id(&self) -> u64 {
        self.id
    }

    fn serialize(&self) -> Vec<u8> {
        self.data.clone()
    }
}
