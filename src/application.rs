//! Application entry point and builder pattern implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use log::{error, info, warn};
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;

use crate::{
    config::{Config, MonitorSettings, locate_config},
    drivers::flux_display::connection::Connector,
    monitor::{LoopState, MonitorLoop},
    selection::{Prompt, resolve_with_fallback},
    sensors::{Role, SensorCatalog},
    temperature_sensors::HwmonCatalog,
};

/// The daemon: resolves the sensor selection once, then drives the display
/// until shutdown.
///
/// # Example
///
/// ```no_run
/// use antec_fluxd::{application::Application, drivers::flux_display::FluxDisplay};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> anyhow::Result<()> {
/// let app = Application::builder()
///     .with_connector(FluxDisplay::new()?)
///     .build()?;
///
/// app.run(CancellationToken::new()).await?;
/// # Ok(())
/// # }
/// ```
pub struct Application<C: Connector> {
    catalog: Box<dyn SensorCatalog>,
    connector: C,
    config_path: PathBuf,
    prompt: Option<Box<dyn Prompt>>,
    wait_for_device: bool,
    save_selection: bool,
}

impl<C: Connector> Application<C> {
    /// Creates a new ApplicationBuilder for constructing Application instances.
    pub fn builder() -> ApplicationBuilder<C> {
        ApplicationBuilder::new()
    }

    /// Runs the daemon lifecycle until `shutdown` is cancelled.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<()> {
        let mut state = LoopState::new(&MonitorSettings::default());
        state.begin_resolution();

        let loaded = Config::load(&self.config_path);
        let prompt = self.prompt.as_mut().map(|p| p.as_mut() as &mut dyn Prompt);
        let resolved = resolve_with_fallback(loaded, self.catalog.as_ref(), prompt)
            .context("Failed to resolve sensor selection")?;

        if !resolved.prompted.is_empty() {
            self.persist(&resolved.config, &resolved.prompted);
        }
        for role in Role::ALL {
            info!("{role} sensor: {}", resolved.selection.get(role));
        }

        let mut settings = resolved.config.monitor;
        settings.wait_for_device |= self.wait_for_device;
        let mut state = state.with_settings(&settings);
        state.resolved();

        MonitorLoop::new(self.catalog, resolved.selection, self.connector, settings)
            .run(state, shutdown)
            .await
            .context("Display unavailable")?;

        info!("Shutdown complete");
        Ok(())
    }

    fn persist(&self, config: &Config, prompted: &[Role]) {
        if !self.save_selection {
            info!("Interactive selection not saved; pass --save-selection to keep it");
            return;
        }
        match config.save(&self.config_path) {
            Ok(()) => info!("Saved {} selection(s)", prompted.len()),
            Err(e) => error!("Failed to save sensor selection: {e}"),
        }
    }
}

/// Builder pattern for creating Application instances.
pub struct ApplicationBuilder<C: Connector> {
    catalog: Option<Box<dyn SensorCatalog>>,
    connector: Option<C>,
    config_path: Option<PathBuf>,
    prompt: Option<Box<dyn Prompt>>,
    wait_for_device: bool,
    save_selection: bool,
}

impl<C: Connector> ApplicationBuilder<C> {
    fn new() -> Self {
        Self {
            catalog: None,
            connector: None,
            config_path: None,
            prompt: None,
            wait_for_device: false,
            save_selection: false,
        }
    }

    /// Sets the display connector.
    pub fn with_connector(mut self, connector: C) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Replaces the default `/sys/class/hwmon` catalog.
    pub fn with_catalog(mut self, catalog: impl SensorCatalog + 'static) -> Self {
        self.catalog = Some(Box::new(catalog));
        self
    }

    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Enables interactive fallback selection.
    pub fn with_prompt(mut self, prompt: impl Prompt + 'static) -> Self {
        self.prompt = Some(Box::new(prompt));
        self
    }

    pub fn wait_for_device(mut self, wait: bool) -> Self {
        self.wait_for_device = wait;
        self
    }

    pub fn save_selection(mut self, save: bool) -> Self {
        self.save_selection = save;
        self
    }

    /// Builds the Application instance.
    pub fn build(self) -> Result<Application<C>> {
        let connector = self
            .connector
            .ok_or_else(|| anyhow::anyhow!("Display connector is required"))?;

        Ok(Application {
            catalog: self
                .catalog
                .unwrap_or_else(|| Box::new(HwmonCatalog::new())),
            connector,
            config_path: self.config_path.unwrap_or_else(|| locate_config(None)),
            prompt: self.prompt,
            wait_for_device: self.wait_for_device,
            save_selection: self.save_selection,
        })
    }
}

/// Resolves once SIGINT or SIGTERM arrives.
pub async fn wait_for_shutdown_signal() -> Result<()> {
    let mut terminate =
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl+C")?;
            info!("Received SIGINT, initiating graceful shutdown...");
        }
        _ = terminate.recv() => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
    Ok(())
}

/// Cancels `token` on the first shutdown signal.
pub fn spawn_signal_handler(token: CancellationToken) {
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            warn!("Signal handling failed, shutting down: {e:#}");
        }
        token.cancel();
    });
}
