use clap::Parser;
use std::path::PathBuf;

/// antec-fluxd: relays CPU/GPU temperatures to the Antec FLUX Pro display
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// INI config file path (default: $ANTEC_FLUXD_CONFIG or /etc/antec/sensors.conf)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Root of the hwmon sysfs tree
    #[arg(long = "hwmon-root", default_value = crate::temperature_sensors::hwmon::HWMON_ROOT)]
    pub hwmon_root: PathBuf,

    /// Print every temperature sensor and exit
    #[arg(long = "list-sensors")]
    pub list_sensors: bool,

    /// Print the sensor list as JSON
    #[arg(long = "json", requires = "list_sensors")]
    pub json: bool,

    /// Write interactively chosen sensors back to the config file
    #[arg(long = "save-selection")]
    pub save_selection: bool,

    /// Keep retrying when the display is absent at startup
    #[arg(long = "wait-for-device")]
    pub wait_for_device: bool,

    /// Log to syslog instead of stderr
    #[arg(long = "syslog")]
    pub syslog: bool,

    /// Enable debug logging
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}
