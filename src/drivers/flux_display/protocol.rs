use crate::error::ProtocolError;

/// Length of an encoded frame, without the HID report id.
pub const FRAME_LEN: usize = 12;

/// Command header preceding the temperature digits.
pub const HEADER: [u8; 5] = [0x55, 0xAA, 0x01, 0x01, 0x06];

/// HID report id prepended on the wire. The display does not number reports.
pub const REPORT_ID: u8 = 0x00;

/// Constant folded into the checksum by the firmware.
const CHECKSUM_BIAS: u8 = 0x07;

/// Highest value the two-digit display field can show.
pub const MAX_TEMP: u8 = 99;

/// A temperature that fits the display field, 0..=99 °C.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DisplayTemp(u8);

impl DisplayTemp {
    /// Accepts only values the display can render.
    pub fn new(celsius: i32) -> Result<Self, ProtocolError> {
        u8::try_from(celsius)
            .ok()
            .filter(|c| *c <= MAX_TEMP)
            .map(Self)
            .ok_or(ProtocolError::TemperatureOutOfRange(celsius))
    }

    /// Clamps into the displayable range.
    pub fn saturating(celsius: i32) -> Self {
        Self(celsius.clamp(0, i32::from(MAX_TEMP)) as u8)
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// Tens, ones, and tenths digits as sent to the display.
    fn digits(self) -> [u8; 3] {
        [self.0 / 10, self.0 % 10, 0]
    }
}

/// One display update carrying both temperatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayFrame([u8; FRAME_LEN]);

impl DisplayFrame {
    pub fn new(cpu: DisplayTemp, gpu: DisplayTemp) -> Self {
        let mut buf = [0u8; FRAME_LEN];
        buf[..5].copy_from_slice(&HEADER);
        buf[5..8].copy_from_slice(&cpu.digits());
        buf[8..11].copy_from_slice(&gpu.digits());
        buf[11] = buf[5..11]
            .iter()
            .fold(CHECKSUM_BIAS, |acc, b| acc.wrapping_add(*b));
        Self(buf)
    }

    pub fn as_bytes(&self) -> &[u8; FRAME_LEN] {
        &self.0
    }

    /// The frame as an HID output report.
    pub fn to_report(&self) -> Vec<u8> {
        let mut report = Vec::with_capacity(FRAME_LEN + 1);
        report.push(REPORT_ID);
        report.extend_from_slice(&self.0);
        report
    }
}

/// Encodes a CPU/GPU pair, saturating each value into 0..=99 first.
pub fn encode_frame(cpu_celsius: i32, gpu_celsius: i32) -> DisplayFrame {
    DisplayFrame::new(
        DisplayTemp::saturating(cpu_celsius),
        DisplayTemp::saturating(gpu_celsius),
    )
}
