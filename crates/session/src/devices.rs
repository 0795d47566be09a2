//! Audio device gate consulted before connecting.
//!
//! The platform half (browser media devices, `cpal`, a test stub) is
//! supplied by the host application. The establisher only needs to know
//! whether an input device exists and whether capture was permitted.

use async_trait::async_trait;

#[derive(Debug, Clone, thiserror::Error)]
pub enum DeviceError {
    #[error("audio device enumeration failed: {0}")]
    Enumeration(String),
    #[error("capture permission request failed: {0}")]
    Permission(String),
}

/// Host-provided access to the platform's audio input devices.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AudioDevices: Send + Sync {
    /// Names of the available audio input devices.
    async fn list_input_devices(&self) -> Result<Vec<String>, DeviceError>;

    /// Asks the platform for capture permission. `Ok(false)` means the user
    /// refused; errors mean the request itself could not be made.
    async fn request_capture(&self) -> Result<bool, DeviceError>;
}
