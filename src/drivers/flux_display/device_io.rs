use hidapi::{HidDevice, HidError};

use crate::error::DeviceError;

/// Write side of an open display handle.
#[cfg_attr(test, mockall::automock)]
pub trait DeviceIO: Send + 'static {
    fn write(&self, buf: &[u8]) -> Result<usize, DeviceError>;
}

impl DeviceIO for HidDevice {
    fn write(&self, buf: &[u8]) -> Result<usize, DeviceError> {
        match Self::write(self, buf) {
            Ok(0) => Err(DeviceError::Io("zero-length write".to_string())),
            Ok(n) => Ok(n),
            Err(e) => Err(classify(e)),
        }
    }
}

/// Maps an hidapi failure onto the daemon's device error kinds.
pub fn classify(err: HidError) -> DeviceError {
    match err {
        HidError::IoError { error } if error.kind() == std::io::ErrorKind::PermissionDenied => {
            DeviceError::PermissionDenied(error.to_string())
        }
        HidError::HidApiError { message } if is_permission_message(&message) => {
            DeviceError::PermissionDenied(message)
        }
        other => DeviceError::Io(other.to_string()),
    }
}

fn is_permission_message(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("permission denied") || message.contains("access denied")
}
