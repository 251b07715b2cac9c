//! Logger setup: `env_logger` on stderr, or syslog on request.

use anyhow::{Result, anyhow};
use log::LevelFilter;
use syslog::{BasicLogger, Facility, Formatter3164};

const PROCESS_NAME: &str = "antec-fluxd";

/// Installs the global logger.
///
/// `RUST_LOG` still overrides the level on the stderr backend.
pub fn init_log(use_syslog: bool, verbose: bool) -> Result<()> {
    let level = level(verbose);
    if use_syslog {
        init_syslog(level)
    } else {
        env_logger::Builder::from_env(
            env_logger::Env::default().default_filter_or(level.as_str()),
        )
        .try_init()
        .map_err(|e| anyhow!("{e}"))
    }
}

fn level(verbose: bool) -> LevelFilter {
    if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    }
}

fn init_syslog(level: LevelFilter) -> Result<()> {
    syslog::unix(Formatter3164 {
        facility: Facility::LOG_DAEMON,
        hostname: None,
        process: PROCESS_NAME.into(),
        pid: std::process::id(),
    })
    .map_err(|e| anyhow!("{e}"))
    .and_then(|logger| {
        log::set_boxed_logger(Box::new(BasicLogger::new(logger)))
            .map(|()| log::set_max_level(level))
            .map_err(|e| anyhow!("{e}"))
    })
}
