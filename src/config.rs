//! Configuration management for the antec_fluxd daemon.
//!
//! The persisted sensor selection lives in an INI file with one section per
//! role, plus an optional `[display]` section tuning the monitor loop.
//!
//! # Example
//!
//! ```ini
//! [cpu]
//! sensor = k10temp
//! name = Tccd1
//!
//! [gpu]
//! sensor = amdgpu
//! name = edge
//!
//! [display]
//! interval_ms = 500
//! backoff_initial_ms = 1000
//! backoff_max_ms = 30000
//! send_timeout_ms = 1000
//! wait_for_device = false
//! ```

use std::{
    env, fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use ini::{EscapePolicy, Ini, Properties};
use log::{info, warn};

use crate::{
    error::ConfigError,
    sensors::{Role, SensorSelection, SensorSource},
};

/// Config path used when neither the CLI nor the environment names one.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/antec/sensors.conf";

/// Environment variable overriding the config path.
pub const CONFIG_ENV: &str = "ANTEC_FLUXD_CONFIG";

const DISPLAY_SECTION: &str = "display";
const KEY_SENSOR: &str = "sensor";
const KEY_NAME: &str = "name";

/// Timing and retry knobs of the monitor loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSettings {
    /// Period between display updates.
    pub interval: Duration,
    /// First reconnect delay.
    pub backoff_initial: Duration,
    /// Reconnect delay ceiling.
    pub backoff_max: Duration,
    /// Bound on one frame transfer.
    pub send_timeout: Duration,
    /// Keep retrying when the display is absent at startup.
    pub wait_for_device: bool,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            interval: defaults::interval(),
            backoff_initial: defaults::backoff_initial(),
            backoff_max: defaults::backoff_max(),
            send_timeout: defaults::send_timeout(),
            wait_for_device: false,
        }
    }
}

mod defaults {
    use std::time::Duration;

    /// Display refresh period.
    pub fn interval() -> Duration {
        Duration::from_millis(500)
    }

    pub fn backoff_initial() -> Duration {
        Duration::from_secs(1)
    }

    pub fn backoff_max() -> Duration {
        Duration::from_secs(30)
    }

    pub fn send_timeout() -> Duration {
        Duration::from_secs(1)
    }
}

/// Persisted sensor selection and loop settings.
///
/// A role whose section is absent stays `None` and is resolved
/// interactively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub cpu: Option<SensorSource>,
    pub gpu: Option<SensorSource>,
    pub monitor: MonitorSettings,
}

impl Config {
    /// Config holding a complete selection and default settings.
    pub fn from_selection(selection: &SensorSelection) -> Self {
        Self {
            cpu: Some(selection.cpu.clone()),
            gpu: Some(selection.gpu.clone()),
            monitor: MonitorSettings::default(),
        }
    }

    pub fn source(&self, role: Role) -> Option<&SensorSource> {
        match role {
            Role::Cpu => self.cpu.as_ref(),
            Role::Gpu => self.gpu.as_ref(),
        }
    }

    pub fn set_source(&mut self, role: Role, source: SensorSource) {
        match role {
            Role::Cpu => self.cpu = Some(source),
            Role::Gpu => self.gpu = Some(source),
        }
    }

    /// Loads the config file.
    ///
    /// A role section lacking `sensor` or `name` leaves only that role
    /// unset.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Missing`] if the file does not exist,
    /// [`ConfigError::Malformed`] if it is not valid INI,
    /// [`ConfigError::InvalidSetting`] for an unusable `[display]` value.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        info!("Loading config from: {}", path.display());

        let content = fs::read_to_string(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => ConfigError::Missing(path.to_path_buf()),
            _ => ConfigError::Io(e),
        })?;
        let ini = Ini::load_from_str_noescape(&content).map_err(|e| ConfigError::Malformed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        Self::from_ini(&ini)
    }

    /// Builds the config from parsed INI.
    pub fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = Config::default();
        for role in Role::ALL {
            let Some(section) = ini.section(Some(role.as_str())) else {
                continue;
            };
            match parse_source(section) {
                Ok(source) => config.set_source(role, source),
                Err(key) => warn!(
                    "Ignoring {role} sensor: section [{}] is missing '{key}'",
                    role.as_str()
                ),
            }
        }
        if let Some(section) = ini.section(Some(DISPLAY_SECTION)) {
            config.monitor = parse_monitor(section)?;
        }
        Ok(config)
    }

    /// Writes the config atomically, creating the parent directory.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let mut ini = Ini::new();
        for role in Role::ALL {
            if let Some(source) = self.source(role) {
                ini.with_section(Some(role.as_str()))
                    .set(KEY_SENSOR, source.driver.as_str())
                    .set(KEY_NAME, source.label.as_str());
            }
        }
        if self.monitor != MonitorSettings::default() {
            let m = &self.monitor;
            ini.with_section(Some(DISPLAY_SECTION))
                .set("interval_ms", m.interval.as_millis().to_string())
                .set("backoff_initial_ms", m.backoff_initial.as_millis().to_string())
                .set("backoff_max_ms", m.backoff_max.as_millis().to_string())
                .set("send_timeout_ms", m.send_timeout.as_millis().to_string())
                .set("wait_for_device", m.wait_for_device.to_string());
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp_path = path.with_extension("conf.tmp");
        ini.write_to_file_policy(&tmp_path, EscapePolicy::Nothing)?;
        fs::rename(&tmp_path, path)?;

        info!("Configuration saved to: {}", path.display());
        Ok(())
    }
}

/// Returns the first missing or empty key on failure.
fn parse_source(section: &Properties) -> Result<SensorSource, &'static str> {
    let field = |key: &'static str| {
        section
            .get(key)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or(key)
    };
    Ok(SensorSource::new(field(KEY_SENSOR)?, field(KEY_NAME)?))
}

fn invalid(key: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidSetting {
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn parse_monitor(section: &Properties) -> Result<MonitorSettings, ConfigError> {
    let millis = |key: &str, default: Duration| -> Result<Duration, ConfigError> {
        section.get(key).map_or(Ok(default), |raw| {
            raw.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|e| invalid(key, format!("{raw:?}: {e}")))
        })
    };

    let settings = MonitorSettings {
        interval: millis("interval_ms", defaults::interval())?,
        backoff_initial: millis("backoff_initial_ms", defaults::backoff_initial())?,
        backoff_max: millis("backoff_max_ms", defaults::backoff_max())?,
        send_timeout: millis("send_timeout_ms", defaults::send_timeout())?,
        wait_for_device: section
            .get("wait_for_device")
            .map_or(Ok(false), parse_bool)?,
    };

    if settings.interval.is_zero() {
        return Err(invalid("interval_ms", "must be positive"));
    }
    if settings.backoff_initial.is_zero() {
        return Err(invalid("backoff_initial_ms", "must be positive"));
    }
    if settings.backoff_max < settings.backoff_initial {
        return Err(invalid("backoff_max_ms", "is below backoff_initial_ms"));
    }
    Ok(settings)
}

fn parse_bool(raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "yes" | "true" | "on" => Ok(true),
        "0" | "no" | "false" | "off" => Ok(false),
        other => Err(invalid("wait_for_device", format!("{other:?} is not a boolean"))),
    }
}

/// Picks the config path: explicit path, then environment, then default.
pub fn locate_config(explicit: Option<PathBuf>) -> PathBuf {
    explicit
        .or_else(|| env::var_os(CONFIG_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
