//! The read → encode → send loop and its reconnect state machine.
//!
//! All decisions live in [`LoopState::step`], a pure transition over
//! [`Input`]s; [`MonitorLoop::run`] only performs the returned [`Action`]s
//! and feeds their outcome back in.

use std::{fmt, time::Duration};

use log::{debug, error, info, warn};
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{
    config::MonitorSettings,
    drivers::flux_display::{
        connection::{Connector, DeviceConnection},
        protocol::{DisplayFrame, encode_frame},
    },
    error::{DeviceError, SensorError},
    sensors::{PerRole, Role, SensorCatalog, SensorReading, SensorSelection, read_role},
};

/// Every this many cycles the pair is logged at info level.
const INFO_EVERY: u64 = 10;

/// Lifecycle phase of the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    ResolvingConfig,
    Connecting,
    Running,
    Reconnecting,
    Shutdown,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Capped doubling delay between reconnect attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    next: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let max = max.max(initial);
        Self {
            initial,
            max,
            next: initial,
        }
    }

    /// Returns the delay to wait now and doubles the following one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = delay.saturating_mul(2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.next = self.initial;
    }
}

/// Outcome of the previous action, fed into [`LoopState::step`].
#[derive(Debug)]
pub enum Input {
    Connected,
    ConnectFailed(DeviceError),
    /// One tick's readings; `None` for a retired role, which is not read.
    Readings(PerRole<Option<Result<SensorReading, SensorError>>>),
    SendOk,
    SendFailed(DeviceError),
    Shutdown,
}

/// What the loop must do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    AwaitTick,
    Send(DisplayFrame),
    /// Drop the handle, wait, then try to connect.
    ReconnectAfter(Duration),
    /// Stop with a fatal error.
    Abort(DeviceError),
    /// Drop the handle and stop.
    Release,
}

/// Explicit state of the monitor loop.
#[derive(Debug, Clone)]
pub struct LoopState {
    phase: Phase,
    last_good: PerRole<Option<i32>>,
    retired: PerRole<bool>,
    backoff: Backoff,
    wait_for_device: bool,
    cycles: u64,
}

impl LoopState {
    pub fn new(settings: &MonitorSettings) -> Self {
        Self {
            phase: Phase::Init,
            last_good: PerRole::default(),
            retired: PerRole::default(),
            backoff: Backoff::new(settings.backoff_initial, settings.backoff_max),
            wait_for_device: settings.wait_for_device,
            cycles: 0,
        }
    }

    /// Applies loaded settings, keeping phase and history.
    pub fn with_settings(mut self, settings: &MonitorSettings) -> Self {
        self.backoff = Backoff::new(settings.backoff_initial, settings.backoff_max);
        self.wait_for_device = settings.wait_for_device;
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_retired(&self, role: Role) -> bool {
        *self.retired.get(role)
    }

    pub fn last_good(&self, role: Role) -> Option<i32> {
        *self.last_good.get(role)
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn begin_resolution(&mut self) {
        self.enter(Phase::ResolvingConfig);
    }

    /// Selection resolved; the display comes next.
    pub fn resolved(&mut self) {
        self.enter(Phase::Connecting);
    }

    fn enter(&mut self, phase: Phase) {
        if self.phase != phase {
            info!("{} -> {}", self.phase, phase);
            self.phase = phase;
        }
    }

    /// Advances the state by one input.
    pub fn step(mut self, input: Input) -> (Self, Action) {
        let action = match (self.phase, input) {
            (_, Input::Shutdown) => {
                self.enter(Phase::Shutdown);
                Action::Release
            }
            (Phase::Connecting, Input::Connected) => {
                self.enter(Phase::Running);
                Action::AwaitTick
            }
            (Phase::Connecting, Input::ConnectFailed(err)) => {
                if self.wait_for_device {
                    warn!("Display unavailable, waiting for it: {err}");
                    self.enter(Phase::Reconnecting);
                    Action::ReconnectAfter(self.backoff.next_delay())
                } else {
                    error!("Cannot open display: {err}");
                    self.enter(Phase::Shutdown);
                    Action::Abort(err)
                }
            }
            (Phase::Running, Input::Readings(readings)) => {
                let cpu = self.apply_reading(Role::Cpu, readings.cpu);
                let gpu = self.apply_reading(Role::Gpu, readings.gpu);
                self.cycles += 1;
                if self.cycles % INFO_EVERY == 0 {
                    info!("CPU: {cpu}°C, GPU: {gpu}°C");
                } else {
                    debug!("CPU: {cpu}°C, GPU: {gpu}°C");
                }
                Action::Send(encode_frame(cpu, gpu))
            }
            (Phase::Running, Input::SendOk) => Action::AwaitTick,
            (Phase::Running, Input::SendFailed(err)) => {
                warn!("Lost display: {err}");
                self.enter(Phase::Reconnecting);
                Action::ReconnectAfter(self.backoff.next_delay())
            }
            (Phase::Reconnecting, Input::Connected) => {
                info!("Display reconnected");
                self.backoff.reset();
                self.enter(Phase::Running);
                Action::AwaitTick
            }
            (Phase::Reconnecting, Input::ConnectFailed(err)) => {
                let delay = self.backoff.next_delay();
                warn!("Reconnect failed, retrying in {delay:?}: {err}");
                Action::ReconnectAfter(delay)
            }
            (Phase::Shutdown, _) => Action::Release,
            (phase, input) => {
                debug!("Ignoring {input:?} in phase {phase}");
                Action::AwaitTick
            }
        };
        (self, action)
    }

    /// Folds one role's reading into the state and returns the value to show.
    fn apply_reading(
        &mut self,
        role: Role,
        reading: Option<Result<SensorReading, SensorError>>,
    ) -> i32 {
        match reading {
            Some(Ok(reading)) => {
                *self.last_good.get_mut(role) = Some(reading.celsius);
                reading.celsius
            }
            Some(Err(err @ SensorError::ReadError { .. })) => {
                warn!("{role} sensor read failed, showing last value: {err}");
                self.fallback(role)
            }
            Some(Err(err)) => {
                error!("{role} sensor retired: {err}");
                *self.retired.get_mut(role) = true;
                self.fallback(role)
            }
            None => self.fallback(role),
        }
    }

    fn fallback(&self, role: Role) -> i32 {
        self.last_good(role).unwrap_or(0)
    }
}

/// Periodically pushes the selected temperatures to the display.
pub struct MonitorLoop<C: Connector> {
    catalog: Box<dyn SensorCatalog>,
    selection: SensorSelection,
    device: DeviceConnection<C>,
    settings: MonitorSettings,
}

impl<C: Connector> MonitorLoop<C> {
    pub fn new(
        catalog: Box<dyn SensorCatalog>,
        selection: SensorSelection,
        connector: C,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            catalog,
            selection,
            device: DeviceConnection::with_timeout(connector, settings.send_timeout),
            settings,
        }
    }

    /// Connects to the display and runs until `cancel` fires.
    ///
    /// # Errors
    ///
    /// The first connect failure when waiting for the device is disabled.
    /// Later device errors only trigger reconnects.
    pub async fn run(
        mut self,
        mut state: LoopState,
        cancel: CancellationToken,
    ) -> Result<(), DeviceError> {
        state.resolved();

        let mut interval = time::interval(self.settings.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut input = self.connect();
        loop {
            if cancel.is_cancelled() {
                input = Input::Shutdown;
            }
            let (next, action) = state.step(input);
            state = next;

            input = match action {
                Action::AwaitTick => {
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => Input::Shutdown,
                        _instant = interval.tick() => Input::Readings(self.read(&state)),
                    }
                }
                Action::Send(frame) => match self.device.send(&frame).await {
                    Ok(()) => Input::SendOk,
                    Err(err) => Input::SendFailed(err),
                },
                Action::ReconnectAfter(delay) => {
                    self.device.release();
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => Input::Shutdown,
                        () = time::sleep(delay) => {
                            let outcome = self.connect();
                            if matches!(outcome, Input::Connected) {
                                interval.reset_immediately();
                            }
                            outcome
                        }
                    }
                }
                Action::Abort(err) => {
                    self.device.release();
                    return Err(err);
                }
                Action::Release => {
                    self.device.release();
                    info!("Monitor stopped after {} cycles", state.cycles());
                    return Ok(());
                }
            };
        }
    }

    fn connect(&mut self) -> Input {
        match self.device.connect() {
            Ok(()) => Input::Connected,
            Err(err) => Input::ConnectFailed(err),
        }
    }

    fn read(&self, state: &LoopState) -> PerRole<Option<Result<SensorReading, SensorError>>> {
        PerRole::new((), ()).map(|role, ()| {
            (!state.is_retired(role))
                .then(|| read_role(self.catalog.as_ref(), &self.selection, role))
        })
    }
}
