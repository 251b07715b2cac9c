use std::{
    io::{self, IsTerminal},
    time::Duration,
};

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use tokio_util::sync::CancellationToken;

use antec_fluxd::{
    application::{Application, spawn_signal_handler},
    cli::Cli,
    config::locate_config,
    drivers::flux_display::FluxDisplay,
    logging::init_log,
    selection::TerminalPrompt,
    temperature_sensors::HwmonCatalog,
};

/// How long exit waits for a display write stuck in the kernel.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_log(cli.syslog, cli.verbose)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start the tokio runtime")?;
    let result = runtime.block_on(run(cli));
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    result
}

async fn run(cli: Cli) -> Result<()> {
    let catalog = HwmonCatalog::with_root(&cli.hwmon_root);
    if cli.list_sensors {
        return list_sensors(&catalog, cli.json);
    }

    info!("Starting antec-fluxd {}", env!("CARGO_PKG_VERSION"));

    let mut builder = Application::builder()
        .with_connector(FluxDisplay::new().context("Failed to initialise hidapi")?)
        .with_catalog(catalog)
        .with_config_path(locate_config(cli.config))
        .wait_for_device(cli.wait_for_device)
        .save_selection(cli.save_selection);
    if io::stdin().is_terminal() {
        builder = builder.with_prompt(TerminalPrompt::stdio());
    }

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    builder.build()?.run(shutdown).await
}

fn list_sensors(catalog: &HwmonCatalog, json: bool) -> Result<()> {
    let snapshot = catalog.snapshot();
    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }
    for driver in &snapshot {
        println!("{}", driver.driver);
        for channel in &driver.channels {
            match channel.celsius {
                Some(c) => println!("   {}: {c}°C", channel.label),
                None => println!("   {}: N/A", channel.label),
            }
        }
    }
    Ok(())
}
