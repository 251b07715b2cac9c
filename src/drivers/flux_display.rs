//! Antec FLUX Pro case display.
//!
//! The display shows one CPU and one GPU temperature. It accepts a fixed
//! 12-byte frame as an HID output report and never answers.

pub mod connection;
pub mod device_io;
pub mod protocol;

use hidapi::{HidApi, HidDevice};
use log::{debug, info};

use crate::error::DeviceError;

use self::{connection::Connector, device_io::classify};

/// USB vendor id of the display.
pub const VID: u16 = 0x2022;

/// USB product id of the display.
pub const PID: u16 = 0x0522;

/// Opens the display through hidapi.
///
/// # Example
///
/// ```no_run
/// use antec_fluxd::drivers::flux_display::{FluxDisplay, connection::DeviceConnection};
///
/// # fn example() -> anyhow::Result<()> {
/// let mut connection = DeviceConnection::new(FluxDisplay::new()?);
/// connection.connect()?;
/// # Ok(())
/// # }
/// ```
pub struct FluxDisplay {
    api: HidApi,
    vid: u16,
    pid: u16,
}

impl FluxDisplay {
    pub fn new() -> Result<Self, DeviceError> {
        Self::with_ids(VID, PID)
    }

    pub fn with_ids(vid: u16, pid: u16) -> Result<Self, DeviceError> {
        let api = HidApi::new().map_err(classify)?;
        Ok(Self { api, vid, pid })
    }
}

impl Connector for FluxDisplay {
    type Io = HidDevice;

    fn open(&mut self) -> Result<HidDevice, DeviceError> {
        self.api.refresh_devices().map_err(classify)?;

        let (vid, pid) = (self.vid, self.pid);
        let device = self
            .api
            .device_list()
            .filter(|d| d.vendor_id() == vid && d.product_id() == pid)
            .inspect(|d| {
                debug!(
                    "{:?} interface {} at {:?}",
                    d.product_string(),
                    d.interface_number(),
                    d.path()
                )
            })
            .min_by_key(|d| d.interface_number())
            .ok_or(DeviceError::NotFound { vid, pid })?;

        info!(
            "Opening {} ({vid:04X}:{pid:04X})",
            device.product_string().unwrap_or("display")
        );
        self.api.open_path(device.path()).map_err(classify)
    }
}
