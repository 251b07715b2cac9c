//! Sensor catalog implementations.

pub mod hwmon;

pub use hwmon::HwmonCatalog;
