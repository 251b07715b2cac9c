//! Error taxonomy shared by the daemon components.
//!
//! Components return these distinguishable kinds instead of aborting; the
//! monitor loop and the application decide whether an error is tick-local,
//! worth a reconnect, or fatal.

use std::{path::PathBuf, time::Duration};

use thiserror::Error;

use crate::sensors::Role;

/// Errors raised while loading or resolving the sensor selection.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {}", .0.display())]
    Missing(PathBuf),

    #[error("malformed config {}: {reason}", .path.display())]
    Malformed { path: PathBuf, reason: String },

    /// A `[display]` tuning value is unusable.
    #[error("invalid [display] setting {key}: {reason}")]
    InvalidSetting { key: String, reason: String },

    #[error("invalid {role} selection: {reason}")]
    InvalidSelection { role: Role, reason: String },

    #[error("no interactive terminal to select sensors for: {}", roles_list(.0))]
    NoTerminal(Vec<Role>),

    #[error("sensor selection aborted: input closed")]
    Aborted,

    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by a sensor catalog.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SensorError {
    #[error("hwmon driver '{0}' not found")]
    DriverNotFound(String),

    /// The driver or label disappeared. Permanent for the life of the process.
    #[error("sensor {driver}/{label} is unavailable")]
    Unavailable { driver: String, label: String },

    /// Transient failure reading a present sensor.
    #[error("failed to read {driver}/{label}: {reason}")]
    ReadError {
        driver: String,
        label: String,
        reason: String,
    },
}

/// Errors raised while talking to the display.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("display {vid:04x}:{pid:04x} not found")]
    NotFound { vid: u16, pid: u16 },

    #[error("permission denied opening display: {0}")]
    PermissionDenied(String),

    #[error("display I/O error: {0}")]
    Io(String),

    #[error("display write timed out after {0:?}")]
    Timeout(Duration),
}

/// Errors raised by the strict frame field constructors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("temperature {0} does not fit the two-digit display field")]
    TemperatureOutOfRange(i32),
}

fn roles_list(roles: &[Role]) -> String {
    roles
        .iter()
        .map(|r| r.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
