//! Hardware drivers for supported displays.

pub mod flux_display;
