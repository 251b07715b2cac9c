//! In-memory fakes for the sensor catalog and the display.

use std::{
    collections::{BTreeSet, HashMap},
    sync::{Arc, Mutex},
    time::Duration,
};

use crate::{
    drivers::flux_display::{PID, VID, connection::Connector, device_io::DeviceIO},
    error::{DeviceError, SensorError},
    sensors::{SensorCatalog, SensorSource},
};

#[derive(Default)]
struct CatalogState {
    sensors: Vec<(SensorSource, i32)>,
    failures: HashMap<SensorSource, (SensorError, bool)>,
    enumerations: usize,
}

/// Catalog over a scripted set of sensors. Clones share state.
#[derive(Clone, Default)]
pub struct FakeCatalog {
    state: Arc<Mutex<CatalogState>>,
}

impl FakeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sensor(self, driver: &str, label: &str, celsius: i32) -> Self {
        self.set_temperature(driver, label, celsius);
        self
    }

    pub fn set_temperature(&self, driver: &str, label: &str, celsius: i32) {
        let source = SensorSource::new(driver, label);
        let mut state = self.state.lock().unwrap();
        match state.sensors.iter_mut().find(|(s, _)| *s == source) {
            Some((_, value)) => *value = celsius,
            None => state.sensors.push((source, celsius)),
        }
    }

    pub fn remove_sensor(&self, driver: &str, label: &str) {
        let source = SensorSource::new(driver, label);
        self.state
            .lock()
            .unwrap()
            .sensors
            .retain(|(s, _)| *s != source);
    }

    /// Every read of the sensor fails with `err`.
    pub fn fail_reads(&self, driver: &str, label: &str, err: SensorError) {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert(SensorSource::new(driver, label), (err, false));
    }

    /// Only the next read of the sensor fails with `err`.
    pub fn fail_next_read(&self, driver: &str, label: &str, err: SensorError) {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert(SensorSource::new(driver, label), (err, true));
    }

    /// Number of `list_drivers`/`list_labels` calls so far.
    pub fn enumerations(&self) -> usize {
        self.state.lock().unwrap().enumerations
    }
}

impl SensorCatalog for FakeCatalog {
    fn list_drivers(&self) -> BTreeSet<String> {
        let mut state = self.state.lock().unwrap();
        state.enumerations += 1;
        state.sensors.iter().map(|(s, _)| s.driver.clone()).collect()
    }

    fn list_labels(&self, driver: &str) -> Result<Vec<String>, SensorError> {
        let mut state = self.state.lock().unwrap();
        state.enumerations += 1;
        let labels: Vec<String> = state
            .sensors
            .iter()
            .filter(|(s, _)| s.driver == driver)
            .map(|(s, _)| s.label.clone())
            .collect();
        if labels.is_empty() {
            return Err(SensorError::DriverNotFound(driver.to_string()));
        }
        Ok(labels)
    }

    fn read_temperature(&self, source: &SensorSource) -> Result<i32, SensorError> {
        let mut state = self.state.lock().unwrap();
        if let Some((err, once)) = state.failures.get(source).cloned() {
            if once {
                state.failures.remove(source);
            }
            return Err(err);
        }
        state
            .sensors
            .iter()
            .find(|(s, _)| s == source)
            .map(|(_, v)| *v)
            .ok_or_else(|| SensorError::Unavailable {
                driver: source.driver.clone(),
                label: source.label.clone(),
            })
    }
}

struct Bus {
    attached: bool,
    frames: Vec<Vec<u8>>,
    opens: usize,
    stall: Option<Duration>,
    deny: bool,
    generation: u64,
}

/// A display on a simulated USB bus. Clones share the bus.
#[derive(Clone)]
pub struct FakeDisplay {
    bus: Arc<Mutex<Bus>>,
}

impl FakeDisplay {
    fn with_attached(attached: bool) -> Self {
        Self {
            bus: Arc::new(Mutex::new(Bus {
                attached,
                frames: Vec::new(),
                opens: 0,
                stall: None,
                deny: false,
                generation: 0,
            })),
        }
    }

    pub fn attached() -> Self {
        Self::with_attached(true)
    }

    pub fn detached() -> Self {
        Self::with_attached(false)
    }

    pub fn connector(&self) -> FakeConnector {
        FakeConnector {
            bus: Arc::clone(&self.bus),
        }
    }

    /// Reports received so far, report id included.
    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.bus.lock().unwrap().frames.clone()
    }

    pub fn attach(&self) {
        self.bus.lock().unwrap().attached = true;
    }

    /// Unplugs the display; handles opened before stay dead after re-attach.
    pub fn detach(&self) {
        let mut bus = self.bus.lock().unwrap();
        bus.attached = false;
        bus.generation += 1;
    }

    pub fn opens(&self) -> usize {
        self.bus.lock().unwrap().opens
    }

    pub fn stall_writes(&self, delay: Duration) {
        self.bus.lock().unwrap().stall = Some(delay);
    }

    pub fn deny_access(&self) {
        self.bus.lock().unwrap().deny = true;
    }
}

pub struct FakeConnector {
    bus: Arc<Mutex<Bus>>,
}

impl Connector for FakeConnector {
    type Io = FakeHandle;

    fn open(&mut self) -> Result<FakeHandle, DeviceError> {
        let mut bus = self.bus.lock().unwrap();
        if bus.deny {
            return Err(DeviceError::PermissionDenied("/dev/hidraw0".into()));
        }
        if !bus.attached {
            return Err(DeviceError::NotFound { vid: VID, pid: PID });
        }
        bus.opens += 1;
        Ok(FakeHandle {
            bus: Arc::clone(&self.bus),
            generation: bus.generation,
        })
    }
}

pub struct FakeHandle {
    bus: Arc<Mutex<Bus>>,
    generation: u64,
}

impl DeviceIO for FakeHandle {
    fn write(&self, buf: &[u8]) -> Result<usize, DeviceError> {
        let stall = self.bus.lock().unwrap().stall;
        if let Some(delay) = stall {
            std::thread::sleep(delay);
        }
        let mut bus = self.bus.lock().unwrap();
        if !bus.attached || bus.generation != self.generation {
            return Err(DeviceError::Io("No such device".into()));
        }
        bus.frames.push(buf.to_vec());
        Ok(buf.len())
    }
}

/// Polls `condition` until it holds, panicking after two seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
