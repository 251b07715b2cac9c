//! Sensor roles, sources, and the catalog abstraction.

use std::{collections::BTreeSet, fmt, time::Instant};

use serde::Serialize;

use crate::error::SensorError;

/// One of the two temperature channels the display renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Cpu,
    Gpu,
}

impl Role {
    pub const ALL: [Role; 2] = [Role::Cpu, Role::Gpu];

    /// Config section name and log key for the role.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Cpu => "cpu",
            Role::Gpu => "gpu",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Cpu => "CPU",
            Role::Gpu => "GPU",
        })
    }
}

/// A value per role.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PerRole<T> {
    pub cpu: T,
    pub gpu: T,
}

impl<T> PerRole<T> {
    pub fn new(cpu: T, gpu: T) -> Self {
        Self { cpu, gpu }
    }

    pub fn get(&self, role: Role) -> &T {
        match role {
            Role::Cpu => &self.cpu,
            Role::Gpu => &self.gpu,
        }
    }

    pub fn get_mut(&mut self, role: Role) -> &mut T {
        match role {
            Role::Cpu => &mut self.cpu,
            Role::Gpu => &mut self.gpu,
        }
    }

    pub fn map<U>(self, mut f: impl FnMut(Role, T) -> U) -> PerRole<U> {
        PerRole {
            cpu: f(Role::Cpu, self.cpu),
            gpu: f(Role::Gpu, self.gpu),
        }
    }
}

/// A labelled temperature channel of one hwmon driver.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SensorSource {
    /// Driver instance name, e.g. `k10temp`.
    pub driver: String,
    /// Channel label, e.g. `Tccd1`.
    pub label: String,
}

impl SensorSource {
    pub fn new(driver: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            driver: driver.into(),
            label: label.into(),
        }
    }
}

impl fmt::Display for SensorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.driver, self.label)
    }
}

/// Exactly one source per role.
pub type SensorSelection = PerRole<SensorSource>;

/// A fresh temperature sample for one role.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReading {
    pub role: Role,
    /// Whole degrees Celsius.
    pub celsius: i32,
    pub captured_at: Instant,
}

impl SensorReading {
    pub fn now(role: Role, celsius: i32) -> Self {
        Self {
            role,
            celsius,
            captured_at: Instant::now(),
        }
    }
}

/// Source of hardware-monitoring drivers and their temperature channels.
///
/// Enumeration and reading are separate: selections are validated once at
/// startup, then only `read_temperature` runs on every tick.
pub trait SensorCatalog: Send {
    /// All driver instances currently exposed by the OS.
    fn list_drivers(&self) -> BTreeSet<String>;

    /// Temperature channel labels of a driver, in channel order.
    ///
    /// # Errors
    ///
    /// [`SensorError::DriverNotFound`] if no such driver is present.
    fn list_labels(&self, driver: &str) -> Result<Vec<String>, SensorError>;

    /// Current value of a channel in whole degrees Celsius.
    ///
    /// # Errors
    ///
    /// [`SensorError::Unavailable`] when the driver or label vanished,
    /// [`SensorError::ReadError`] on a transient read failure.
    fn read_temperature(&self, source: &SensorSource) -> Result<i32, SensorError>;
}

/// A driver with its channels and their current values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DriverInventory {
    pub driver: String,
    pub channels: Vec<ChannelInventory>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelInventory {
    pub label: String,
    /// `None` when the channel could not be read.
    pub celsius: Option<i32>,
}

/// Enumerates every driver and channel with its current reading.
pub fn inventory<C: SensorCatalog + ?Sized>(catalog: &C) -> Vec<DriverInventory> {
    catalog
        .list_drivers()
        .into_iter()
        .filter_map(|driver| {
            let labels = catalog.list_labels(&driver).ok()?;
            let channels = labels
                .into_iter()
                .map(|label| {
                    let celsius = catalog
                        .read_temperature(&SensorSource::new(driver.as_str(), label.as_str()))
                        .ok();
                    ChannelInventory { label, celsius }
                })
                .collect();
            Some(DriverInventory { driver, channels })
        })
        .collect()
}

/// Reads a role's current value, stamping it with the capture time.
pub fn read_role<C: SensorCatalog + ?Sized>(
    catalog: &C,
    selection: &SensorSelection,
    role: Role,
) -> Result<SensorReading, SensorError> {
    catalog
        .read_temperature(selection.get(role))
        .map(|celsius| SensorReading::now(role, celsius))
}
