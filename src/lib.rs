//! # antec_fluxd
//!
//! A Linux daemon that shows CPU and GPU temperatures on the Antec FLUX Pro
//! case display.
//!
//! ## Architecture
//!
//! - [`temperature_sensors::HwmonCatalog`] enumerates and reads hwmon sensors
//! - [`selection`] resolves the configured sensors, prompting when needed
//! - [`drivers::flux_display`] encodes frames and owns the HID handle
//! - [`monitor::MonitorLoop`] pushes a frame every tick and reconnects on loss
//! - [`application::Application`] wires them together
//!
//! ## Example
//!
//! ```no_run
//! use antec_fluxd::{
//!     application::{Application, spawn_signal_handler},
//!     drivers::flux_display::FluxDisplay,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let shutdown = CancellationToken::new();
//!     spawn_signal_handler(shutdown.clone());
//!     Application::builder()
//!         .with_connector(FluxDisplay::new()?)
//!         .build()?
//!         .run(shutdown)
//!         .await
//! }
//! ```

pub mod application;
pub mod cli;
pub mod config;
pub mod drivers;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod selection;
pub mod sensors;
pub mod temperature_sensors;

#[cfg(test)]
pub mod test_utils;
