//! Mock construction helpers

use std::path::Path;

use stimcap_rs::config::ChannelConfig;

#[cfg(feature = "mock-device")]
use stimcap_rs::capture::{MockDevice, MockDeviceHandle};

/// Channel config with its socket inside `dir`
pub fn channel_config_in(dir: &Path) -> ChannelConfig {
    ChannelConfig {
        name: "test-stimulus".to_string(),
        socket_dir: Some(dir.to_path_buf()),
        ..Default::default()
    }
}

/// Manual mock device and the handle that drives it
#[cfg(feature = "mock-device")]
pub fn create_manual_device(payload_len: usize) -> (Box<MockDevice>, MockDeviceHandle) {
    let device = MockDevice::manual(payload_len);
    let handle = device.handle();
    (Box::new(device), handle)
}
