use std::{
    collections::{BTreeSet, HashMap},
    fs, io,
    path::{Path, PathBuf},
    sync::Mutex,
};

use log::{debug, warn};

use crate::{
    error::SensorError,
    sensors::{DriverInventory, SensorCatalog, SensorSource, inventory},
};

/// Default sysfs location of hardware-monitoring chips.
pub const HWMON_ROOT: &str = "/sys/class/hwmon";

/// One `hwmonN` directory.
#[derive(Debug)]
struct Chip {
    index: u32,
    name: String,
    dir: PathBuf,
}

/// One `tempN_input` channel of a chip.
#[derive(Debug)]
struct Channel {
    index: u32,
    label: String,
    input: PathBuf,
}

/// Sensor catalog backed by the kernel hwmon sysfs interface.
///
/// Driver names come from each chip's `name` file, labels from
/// `tempN_label` (or `tempN` when a chip publishes none), values from
/// `tempN_input` in millidegrees.
#[derive(Debug)]
pub struct HwmonCatalog {
    root: PathBuf,
    resolved: Mutex<HashMap<SensorSource, PathBuf>>,
}

impl Default for HwmonCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl HwmonCatalog {
    pub fn new() -> Self {
        Self::with_root(HWMON_ROOT)
    }

    /// Catalog rooted somewhere other than `/sys/class/hwmon`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            resolved: Mutex::new(HashMap::new()),
        }
    }

    /// Every driver with its channels and their current values.
    pub fn snapshot(&self) -> Vec<DriverInventory> {
        inventory(self)
    }

    fn chips(&self) -> Vec<Chip> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Cannot list hwmon root {}: {e}", self.root.display());
                return Vec::new();
            }
        };

        let mut chips: Vec<Chip> = entries
            .flatten()
            .filter_map(|entry| {
                let dir = entry.path();
                let index = entry
                    .file_name()
                    .to_str()
                    .and_then(|n| n.strip_prefix("hwmon"))
                    .and_then(|n| n.parse().ok())?;
                let name = read_trimmed(&dir.join("name")).ok()?;
                Some(Chip { index, name, dir })
            })
            .collect();
        chips.sort_by_key(|c| c.index);
        chips
    }

    fn channels(chip: &Chip) -> Vec<Channel> {
        let Ok(entries) = fs::read_dir(&chip.dir) else {
            return Vec::new();
        };

        let mut channels: Vec<Channel> = entries
            .flatten()
            .filter_map(|entry| {
                let file = entry.file_name();
                let index: u32 = file
                    .to_str()?
                    .strip_prefix("temp")?
                    .strip_suffix("_input")?
                    .parse()
                    .ok()?;
                let label = read_trimmed(&chip.dir.join(format!("temp{index}_label")))
                    .unwrap_or_else(|_| format!("temp{index}"));
                Some(Channel {
                    index,
                    label,
                    input: entry.path(),
                })
            })
            .collect();
        channels.sort_by_key(|c| c.index);
        channels
    }

    fn locate(&self, source: &SensorSource) -> Option<PathBuf> {
        self.chips()
            .iter()
            .filter(|chip| chip.name == source.driver)
            .find_map(|chip| {
                Self::channels(chip)
                    .into_iter()
                    .find(|ch| ch.label == source.label)
                    .map(|ch| ch.input)
            })
    }

    fn cached_path(&self, source: &SensorSource) -> Option<PathBuf> {
        self.resolved
            .lock()
            .ok()
            .and_then(|cache| cache.get(source).cloned())
    }

    fn remember(&self, source: &SensorSource, path: &Path) {
        if let Ok(mut cache) = self.resolved.lock() {
            cache.insert(source.clone(), path.to_path_buf());
        }
    }

    fn forget(&self, source: &SensorSource) {
        if let Ok(mut cache) = self.resolved.lock() {
            cache.remove(source);
        }
    }

    fn unavailable(source: &SensorSource) -> SensorError {
        SensorError::Unavailable {
            driver: source.driver.clone(),
            label: source.label.clone(),
        }
    }
}

impl SensorCatalog for HwmonCatalog {
    fn list_drivers(&self) -> BTreeSet<String> {
        self.chips().into_iter().map(|c| c.name).collect()
    }

    fn list_labels(&self, driver: &str) -> Result<Vec<String>, SensorError> {
        let chips: Vec<Chip> = self
            .chips()
            .into_iter()
            .filter(|c| c.name == driver)
            .collect();
        if chips.is_empty() {
            return Err(SensorError::DriverNotFound(driver.to_string()));
        }

        let mut labels: Vec<String> = Vec::new();
        for channel in chips.iter().flat_map(Self::channels) {
            if !labels.contains(&channel.label) {
                labels.push(channel.label);
            }
        }
        Ok(labels)
    }

    fn read_temperature(&self, source: &SensorSource) -> Result<i32, SensorError> {
        let path = match self.cached_path(source) {
            Some(path) => path,
            None => {
                let path = self.locate(source).ok_or_else(|| Self::unavailable(source))?;
                debug!("Resolved {source} to {}", path.display());
                self.remember(source, &path);
                path
            }
        };

        let millidegrees = match read_millidegrees(&path) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                // hwmon indices can be renumbered when a driver reloads.
                self.forget(source);
                let path = self.locate(source).ok_or_else(|| Self::unavailable(source))?;
                self.remember(source, &path);
                read_millidegrees(&path)
            }
            other => other,
        };

        let read_error = |reason: String| SensorError::ReadError {
            driver: source.driver.clone(),
            label: source.label.clone(),
            reason,
        };
        let milli = millidegrees.map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => Self::unavailable(source),
            _ => read_error(e.to_string()),
        })?;
        i32::try_from(milli.div_euclid(1000))
            .map_err(|_| read_error(format!("{milli} millidegrees is out of range")))
    }
}

fn read_trimmed(path: &Path) -> io::Result<String> {
    fs::read_to_string(path).map(|s| s.trim().to_string())
}

fn read_millidegrees(path: &Path) -> io::Result<i64> {
    read_trimmed(path)?
        .parse::<i64>()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn chip(root: &Path, index: u32, name: &str, temps: &[(u32, Option<&str>, &str)]) {
        let dir = root.join(format!("hwmon{index}"));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("name"), format!("{name}\n")).unwrap();
        for (idx, label, value) in temps {
            fs::write(dir.join(format!("temp{idx}_input")), format!("{value}\n")).unwrap();
            if let Some(label) = label {
                fs::write(dir.join(format!("temp{idx}_label")), format!("{label}\n")).unwrap();
            }
        }
    }

    fn sample_tree() -> TempDir {
        let tmp = TempDir::new().unwrap();
        chip(
            tmp.path(),
            2,
            "k10temp",
            &[
                (1, Some("Tctl"), "52125"),
                (3, Some("Tccd1"), "47750"),
                (10, Some("Tccd2"), "46000"),
            ],
        );
        chip(tmp.path(), 0, "amdgpu", &[(1, Some("edge"), "41000")]);
        chip(tmp.path(), 1, "nvme", &[(1, None, "38850")]);
        tmp
    }

    #[test]
    fn lists_drivers_from_name_files() {
        let tmp = sample_tree();
        fs::create_dir_all(tmp.path().join("hwmon7")).unwrap(); // no name file

        let catalog = HwmonCatalog::with_root(tmp.path());

        let drivers: Vec<_> = catalog.list_drivers().into_iter().collect();
        assert_eq!(drivers, vec!["amdgpu", "k10temp", "nvme"]);
    }

    #[test]
    fn labels_follow_channel_order() {
        let tmp = sample_tree();
        let catalog = HwmonCatalog::with_root(tmp.path());

        assert_eq!(
            catalog.list_labels("k10temp").unwrap(),
            vec!["Tctl", "Tccd1", "Tccd2"]
        );
        assert_eq!(catalog.list_labels("nvme").unwrap(), vec!["temp1"]);
    }

    #[test]
    fn snapshot_reads_every_channel() {
        let tmp = sample_tree();
        let catalog = HwmonCatalog::with_root(tmp.path());

        let snapshot = catalog.snapshot();

        let nvme = snapshot.iter().find(|d| d.driver == "nvme").unwrap();
        assert_eq!(nvme.channels[0].label, "temp1");
        assert_eq!(nvme.channels[0].celsius, Some(38));
        assert_eq!(snapshot.len(), 3);
    }

    #[test]
    fn missing_driver_is_reported() {
        let tmp = sample_tree();
        let catalog = HwmonCatalog::with_root(tmp.path());

        assert_eq!(
            catalog.list_labels("coretemp"),
            Err(SensorError::DriverNotFound("coretemp".into()))
        );
    }

    #[test]
    fn duplicate_driver_names_merge_labels() {
        let tmp = TempDir::new().unwrap();
        chip(tmp.path(), 0, "nvme", &[(1, Some("Composite"), "35000")]);
        chip(
            tmp.path(),
            1,
            "nvme",
            &[(1, Some("Composite"), "39000"), (2, Some("Sensor 1"), "40000")],
        );
        let catalog = HwmonCatalog::with_root(tmp.path());

        assert_eq!(
            catalog.list_labels("nvme").unwrap(),
            vec!["Composite", "Sensor 1"]
        );
        assert_eq!(
            catalog.read_temperature(&SensorSource::new("nvme", "Composite")),
            Ok(35)
        );
        assert_eq!(
            catalog.read_temperature(&SensorSource::new("nvme", "Sensor 1")),
            Ok(40)
        );
    }

    #[test]
    fn reads_whole_degrees() {
        let tmp = sample_tree();
        let catalog = HwmonCatalog::with_root(tmp.path());

        assert_eq!(
            catalog.read_temperature(&SensorSource::new("k10temp", "Tctl")),
            Ok(52)
        );
        assert_eq!(
            catalog.read_temperature(&SensorSource::new("nvme", "temp1")),
            Ok(38)
        );
    }

    #[test]
    fn negative_values_floor() {
        let tmp = TempDir::new().unwrap();
        chip(tmp.path(), 0, "acpitz", &[(1, None, "-1500")]);
        let catalog = HwmonCatalog::with_root(tmp.path());

        assert_eq!(
            catalog.read_temperature(&SensorSource::new("acpitz", "temp1")),
            Ok(-2)
        );
    }

    #[test]
    fn unknown_label_is_unavailable() {
        let tmp = sample_tree();
        let catalog = HwmonCatalog::with_root(tmp.path());

        assert_eq!(
            catalog.read_temperature(&SensorSource::new("k10temp", "Tccd9")),
            Err(SensorError::Unavailable {
                driver: "k10temp".into(),
                label: "Tccd9".into(),
            })
        );
    }

    #[test]
    fn garbage_value_is_a_read_error() {
        let tmp = sample_tree();
        fs::write(tmp.path().join("hwmon0/temp1_input"), "n/a\n").unwrap();
        let catalog = HwmonCatalog::with_root(tmp.path());

        let err = catalog
            .read_temperature(&SensorSource::new("amdgpu", "edge"))
            .unwrap_err();
        assert!(matches!(err, SensorError::ReadError { .. }), "{err:?}");
    }

    #[test]
    fn oversized_value_is_a_read_error() {
        let tmp = sample_tree();
        fs::write(tmp.path().join("hwmon0/temp1_input"), "4294967296000\n").unwrap();
        let catalog = HwmonCatalog::with_root(tmp.path());

        let err = catalog
            .read_temperature(&SensorSource::new("amdgpu", "edge"))
            .unwrap_err();
        assert!(
            matches!(&err, SensorError::ReadError { reason, .. } if reason.contains("out of range")),
            "{err:?}"
        );
    }

    #[test]
    fn renumbered_chip_is_found_again() {
        let tmp = sample_tree();
        let catalog = HwmonCatalog::with_root(tmp.path());
        let source = SensorSource::new("amdgpu", "edge");
        assert_eq!(catalog.read_temperature(&source), Ok(41));

        fs::rename(tmp.path().join("hwmon0"), tmp.path().join("hwmon5")).unwrap();

        assert_eq!(catalog.read_temperature(&source), Ok(41));
    }

    #[test]
    fn removed_chip_becomes_unavailable() {
        let tmp = sample_tree();
        let catalog = HwmonCatalog::with_root(tmp.path());
        let source = SensorSource::new("amdgpu", "edge");
        assert_eq!(catalog.read_temperature(&source), Ok(41));

        fs::remove_dir_all(tmp.path().join("hwmon0")).unwrap();

        assert!(matches!(
            catalog.read_temperature(&source),
            Err(SensorError::Unavailable { .. })
        ));
    }

    #[test]
    fn missing_root_lists_nothing() {
        let catalog = HwmonCatalog::with_root("/nonexistent/hwmon");
        assert!(catalog.list_drivers().is_empty());
    }
}
