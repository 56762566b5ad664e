//! Mock motion device for testing
//!
//! Produces synthetic samples so the capture loop can run without tracking
//! hardware. Samples are announced either by a free-running ticker thread at
//! a fixed rate, or on demand through a [`MockDeviceHandle`].
//!
//! # Payload Layout
//!
//! Each payload starts with the sample id (`u64`, little-endian) followed by
//! `f32` joint positions following a slow sine sweep, truncated to the
//! configured payload length.
//!
//! # Example
//!
//! ```ignore
//! use stimcap_rs::capture::mock_device::MockDevice;
//!
//! // Manual mode: nothing is emitted until asked
//! let device = MockDevice::manual(64);
//! let handle = device.handle();
//!
//! // ... hand `device` to the capture worker, then:
//! handle.emit();
//! ```
//!
//! # Enabling
//!
//! The mock device is only available when the `mock-device` feature is
//! enabled (on by default).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Sender, TrySendError};

use crate::config::DeviceConfig;
use crate::error::{Result, StimCapError};

use super::device::{BytesSample, DeviceEvent, MotionDevice, Sample};

/// Joint positions per synthetic sample
const JOINTS: usize = 64;

/// State shared between the device, its ticker and its handles
#[derive(Debug, Default)]
struct MockShared {
    /// Current subscriber
    subscriber: Option<Sender<DeviceEvent>>,
    /// Id of the next sample handed out
    next_id: u64,
    /// Samples announced so far
    emitted: u64,
}

impl MockShared {
    fn notify(&mut self, event: DeviceEvent) -> bool {
        let Some(tx) = &self.subscriber else {
            return false;
        };
        match tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                tracing::trace!("Mock device queue full, dropped {:?}", event);
                return false;
            }
            Err(TrySendError::Disconnected(_)) => {
                tracing::debug!("Mock device subscriber went away");
                self.subscriber = None;
                return false;
            }
        }
        if event == DeviceEvent::SampleReady {
            self.emitted += 1;
        }
        true
    }
}

/// Synthetic motion device
pub struct MockDevice {
    /// Sample rate of the ticker; 0 for manual mode
    rate_hz: u32,
    /// Payload size in bytes
    payload_len: usize,
    /// Shared subscriber and counters
    shared: Arc<Mutex<MockShared>>,
    /// Stop flag for the ticker thread
    stop: Arc<AtomicBool>,
    /// Ticker thread
    ticker: Option<JoinHandle<()>>,
}

impl MockDevice {
    /// Device that announces samples at `rate_hz`
    pub fn new(rate_hz: u32, payload_len: usize) -> Self {
        Self {
            rate_hz,
            payload_len,
            shared: Arc::new(Mutex::new(MockShared::default())),
            stop: Arc::new(AtomicBool::new(false)),
            ticker: None,
        }
    }

    /// Device that only announces samples through [`MockDeviceHandle::emit`]
    pub fn manual(payload_len: usize) -> Self {
        Self::new(0, payload_len)
    }

    /// Create from config settings
    pub fn from_config(config: &DeviceConfig) -> Self {
        Self::new(config.mock_rate_hz, config.mock_payload_len)
    }

    /// Handle for driving the device from another thread
    pub fn handle(&self) -> MockDeviceHandle {
        MockDeviceHandle {
            shared: self.shared.clone(),
        }
    }

    fn stop_ticker(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.ticker.take() {
            if handle.join().is_err() {
                tracing::error!("Mock device ticker panicked");
            }
        }
    }
}

impl MotionDevice for MockDevice {
    fn name(&self) -> String {
        if self.rate_hz == 0 {
            "Mock Device (manual)".to_string()
        } else {
            format!("Mock Device ({} Hz)", self.rate_hz)
        }
    }

    fn subscribe(&mut self, events: Sender<DeviceEvent>) -> Result<()> {
        self.stop_ticker();
        {
            let mut shared = self
                .shared
                .lock()
                .map_err(|_| StimCapError::Channel("Mock device state poisoned".to_string()))?;
            shared.subscriber = Some(events);
            shared.notify(DeviceEvent::Connected);
        }

        if self.rate_hz > 0 {
            self.stop.store(false, Ordering::SeqCst);
            let period = Duration::from_secs_f64(1.0 / self.rate_hz as f64);
            let shared = self.shared.clone();
            let stop = self.stop.clone();
            let handle = std::thread::Builder::new()
                .name("mock-device".to_string())
                .spawn(move || {
                    while !stop.load(Ordering::SeqCst) {
                        std::thread::sleep(period);
                        let Ok(mut shared) = shared.lock() else {
                            break;
                        };
                        if shared.subscriber.is_some() && !shared.notify(DeviceEvent::SampleReady) {
                            break;
                        }
                    }
                })?;
            self.ticker = Some(handle);
        }

        tracing::info!("{} subscribed", self.name());
        Ok(())
    }

    fn current_sample(&mut self) -> Result<Box<dyn Sample>> {
        let id = {
            let mut shared = self
                .shared
                .lock()
                .map_err(|_| StimCapError::Channel("Mock device state poisoned".to_string()))?;
            let id = shared.next_id;
            shared.next_id += 1;
            id
        };
        Ok(Box::new(BytesSample::new(id, synthetic_payload(id, self.payload_len))))
    }

    fn unsubscribe(&mut self) {
        self.stop_ticker();
        if let Ok(mut shared) = self.shared.lock() {
            shared.subscriber = None;
        }
        tracing::debug!("{} unsubscribed", self.name());
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        self.stop_ticker();
    }
}

/// Remote control for a [`MockDevice`]
#[derive(Clone)]
pub struct MockDeviceHandle {
    shared: Arc<Mutex<MockShared>>,
}

impl MockDeviceHandle {
    /// Announce one new sample; `false` if nobody is subscribed
    pub fn emit(&self) -> bool {
        self.shared
            .lock()
            .map(|mut s| s.notify(DeviceEvent::SampleReady))
            .unwrap_or(false)
    }

    /// Simulate the device going away
    pub fn disconnect(&self) -> bool {
        self.shared
            .lock()
            .map(|mut s| s.notify(DeviceEvent::Disconnected))
            .unwrap_or(false)
    }

    /// Samples announced so far
    pub fn emitted(&self) -> u64 {
        self.shared.lock().map(|s| s.emitted).unwrap_or(0)
    }

    /// Check if a subscriber is attached
    pub fn is_subscribed(&self) -> bool {
        self.shared.lock().map(|s| s.subscriber.is_some()).unwrap_or(false)
    }
}

/// Build the payload for sample `id`
pub fn synthetic_payload(id: u64, len: usize) -> Vec<u8> {
    let mut payload = Vec::with_capacity(8 + JOINTS * 4);
    payload.extend_from_slice(&id.to_le_bytes());
    let phase = id as f32 * 0.05;
    for joint in 0..JOINTS {
        let position = (phase + joint as f32 * 0.1).sin() * 100.0;
        payload.extend_from_slice(&position.to_le_bytes());
    }
    payload.resize(len, 0);
    payload
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    #[test]
    fn test_manual_emit() {
        let mut device = MockDevice::manual(32);
        let handle = device.handle();
        assert!(!handle.emit());

        let (tx, rx) = unbounded();
        device.subscribe(tx).unwrap();
        assert_eq!(rx.try_recv().unwrap(), DeviceEvent::Connected);

        assert!(handle.emit());
        assert_eq!(rx.try_recv().unwrap(), DeviceEvent::SampleReady);
        assert_eq!(handle.emitted(), 1);

        device.unsubscribe();
        assert!(!handle.is_subscribed());
        assert!(!handle.emit());
    }

    #[test]
    fn test_samples_have_increasing_ids() {
        let mut device = MockDevice::manual(16);
        let a = device.current_sample().unwrap();
        let b = device.current_sample().unwrap();
        assert_eq!(a.id() + 1, b.id());
        assert_eq!(b.serialize().len(), 16);
        assert_eq!(&b.serialize()[..8], &1u64.to_le_bytes());
    }

    #[test]
    fn test_ticker_emits() {
        let mut device = MockDevice::new(200, 8);
        let (tx, rx) = unbounded();
        device.subscribe(tx).unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), DeviceEvent::Connected);
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(1)).unwrap(),
            DeviceEvent::SampleReady
        );
        device.unsubscribe();
    }

    #[test]
    fn test_payload_resizes() {
        assert_eq!(synthetic_payload(3, 0).len(), 0);
        assert_eq!(synthetic_payload(3, 1000).len(), 1000);
        assert_eq!(synthetic_payload(3, 4), vec![3, 0, 0, 0]);
    }

    #[test]
    fn test_full_queue_drops_samples() {
        let mut device = MockDevice::manual(8);
        let handle = device.handle();
        let (tx, rx) = crossbeam_channel::bounded(2);
        device.subscribe(tx).unwrap();

        assert!(handle.emit());
        assert!(!handle.emit());
        assert_eq!(handle.emitted(), 1);
        assert!(handle.is_subscribed());

        assert_eq!(rx.try_recv().unwrap(), DeviceEvent::Connected);
        assert_eq!(rx.try_recv().unwrap(), DeviceEvent::SampleReady);
        assert!(handle.emit());
    }

    #[test]
    fn test_disconnect_event() {
        let mut device = MockDevice::manual(8);
        let handle = device.handle();
        let (tx, rx) = unbounded();
        device.subscribe(tx).unwrap();
        let _ = rx.try_recv();
        assert!(handle.disconnect());
        assert_eq!(rx.try_recv().unwrap(), DeviceEvent::Disconnected);
    }
}
