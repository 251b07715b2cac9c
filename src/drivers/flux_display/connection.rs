use std::{sync::Arc, time::Duration};

use log::{info, warn};
use tokio::{sync::Mutex, task, time::timeout};

use crate::error::DeviceError;

use super::{device_io::DeviceIO, protocol::DisplayFrame};

/// Default bound on a single frame transfer.
pub const SEND_TIMEOUT: Duration = Duration::from_secs(1);

/// Opens a fresh handle to the display.
pub trait Connector {
    type Io: DeviceIO;

    /// # Errors
    ///
    /// [`DeviceError::NotFound`] when the display is absent,
    /// [`DeviceError::PermissionDenied`] when the OS refuses access.
    fn open(&mut self) -> Result<Self::Io, DeviceError>;
}

/// Owns the handle to the display and invalidates it on the first failure.
///
/// The handle is either connected or absent; a failed handle is dropped and
/// only [`DeviceConnection::connect`] brings a new one.
pub struct DeviceConnection<C: Connector> {
    connector: C,
    handle: Option<Arc<Mutex<C::Io>>>,
    send_timeout: Duration,
}

impl<C: Connector> DeviceConnection<C> {
    pub fn new(connector: C) -> Self {
        Self::with_timeout(connector, SEND_TIMEOUT)
    }

    pub fn with_timeout(connector: C, send_timeout: Duration) -> Self {
        Self {
            connector,
            handle: None,
            send_timeout,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.handle.is_some()
    }

    /// Opens and claims the display, replacing any previous handle.
    pub fn connect(&mut self) -> Result<(), DeviceError> {
        self.release();
        let io = self.connector.open()?;
        self.handle = Some(Arc::new(Mutex::new(io)));
        info!("Display connected");
        Ok(())
    }

    /// Writes one frame, bounded by the send timeout.
    ///
    /// Any failure, including a timeout, drops the handle. A timed-out write
    /// keeps its blocking-pool thread until the OS call returns, so the
    /// runtime must be shut down with a deadline
    /// ([`tokio::runtime::Runtime::shutdown_timeout`]) rather than dropped.
    pub async fn send(&mut self, frame: &DisplayFrame) -> Result<(), DeviceError> {
        let io = self
            .handle
            .clone()
            .ok_or_else(|| DeviceError::Io("display not connected".to_string()))?;
        let report = frame.to_report();

        let outcome = timeout(
            self.send_timeout,
            task::spawn_blocking(move || io.blocking_lock().write(&report)),
        )
        .await;

        let result = match outcome {
            Ok(Ok(Ok(_written))) => return Ok(()),
            Ok(Ok(Err(e))) => e,
            Ok(Err(join)) => DeviceError::Io(format!("write task failed: {join}")),
            Err(_elapsed) => DeviceError::Timeout(self.send_timeout),
        };

        warn!("Display write failed, dropping handle: {result}");
        self.handle = None;
        Err(result)
    }

    /// Drops the handle if any. Safe to call repeatedly.
    pub fn release(&mut self) {
        if self.handle.take().is_some() {
            info!("Display released");
        }
    }
}

impl<C: Connector> Drop for DeviceConnection<C> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        drivers::flux_display::{device_io::MockDeviceIO, protocol::encode_frame},
        test_utils::FakeDisplay,
    };
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;

    struct ScriptedConnector {
        handles: VecDeque<Result<MockDeviceIO, DeviceError>>,
    }

    impl Connector for ScriptedConnector {
        type Io = MockDeviceIO;

        fn open(&mut self) -> Result<MockDeviceIO, DeviceError> {
            self.handles
                .pop_front()
                .unwrap_or(Err(DeviceError::NotFound {
                    vid: 0x2022,
                    pid: 0x0522,
                }))
        }
    }

    fn writing_mock(result: Result<usize, DeviceError>) -> MockDeviceIO {
        let mut io = MockDeviceIO::new();
        io.expect_write()
            .withf(|buf| buf.len() == 13 && buf[0] == 0x00)
            .times(1)
            .return_once(move |_| result);
        io
    }

    #[tokio::test]
    async fn send_writes_report() {
        let display = FakeDisplay::attached();
        let mut conn = DeviceConnection::new(display.connector());

        conn.connect().unwrap();
        conn.send(&encode_frame(45, 60)).await.unwrap();

        assert_eq!(display.frames(), vec![encode_frame(45, 60).to_report()]);
        assert!(conn.is_connected());
    }

    #[tokio::test]
    async fn failed_write_invalidates_handle() {
        let mut conn = DeviceConnection::new(ScriptedConnector {
            handles: VecDeque::from([Ok(writing_mock(Err(DeviceError::Io(
                "No such device".into(),
            ))))]),
        });

        conn.connect().unwrap();
        let err = conn.send(&encode_frame(1, 2)).await.unwrap_err();

        assert_eq!(err, DeviceError::Io("No such device".into()));
        assert!(!conn.is_connected());
        // The mock allows exactly one write: a second send must not reach it.
        assert!(conn.send(&encode_frame(1, 2)).await.is_err());
    }

    #[tokio::test]
    async fn reconnect_gets_fresh_handle() {
        let mut conn = DeviceConnection::new(ScriptedConnector {
            handles: VecDeque::from([
                Ok(writing_mock(Err(DeviceError::Io("EPIPE".into())))),
                Ok(writing_mock(Ok(13))),
            ]),
        });

        conn.connect().unwrap();
        assert!(conn.send(&encode_frame(30, 40)).await.is_err());
        conn.connect().unwrap();
        conn.send(&encode_frame(30, 40)).await.unwrap();
    }

    #[tokio::test]
    async fn slow_write_times_out() {
        let display = FakeDisplay::attached();
        display.stall_writes(Duration::from_millis(300));
        let mut conn =
            DeviceConnection::with_timeout(display.connector(), Duration::from_millis(20));

        conn.connect().unwrap();
        let err = conn.send(&encode_frame(50, 50)).await.unwrap_err();

        assert_eq!(err, DeviceError::Timeout(Duration::from_millis(20)));
        assert!(!conn.is_connected());
    }

    #[test]
    fn stalled_write_does_not_hold_runtime_shutdown() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let display = FakeDisplay::attached();
        display.stall_writes(Duration::from_secs(5));
        let mut conn =
            DeviceConnection::with_timeout(display.connector(), Duration::from_millis(20));

        let started = std::time::Instant::now();
        let result = runtime.block_on(async {
            conn.connect().unwrap();
            conn.send(&encode_frame(40, 40)).await
        });
        runtime.shutdown_timeout(Duration::from_millis(100));

        assert_eq!(result, Err(DeviceError::Timeout(Duration::from_millis(20))));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn connect_reports_missing_device() {
        let display = FakeDisplay::detached();
        let mut conn = DeviceConnection::new(display.connector());

        assert_eq!(
            conn.connect(),
            Err(DeviceError::NotFound {
                vid: 0x2022,
                pid: 0x0522,
            })
        );
        assert!(!conn.is_connected());
    }

    #[test]
    fn release_is_idempotent() {
        let display = FakeDisplay::attached();
        let mut conn = DeviceConnection::new(display.connector());
        conn.connect().unwrap();

        conn.release();
        conn.release();

        assert!(!conn.is_connected());
    }
}
