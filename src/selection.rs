//! Validation of the configured sensor selection and the interactive
//! fallback used when a role cannot be resolved from the config file.

use std::io::{self, BufRead, StdinLock, Stdout, Write};

use log::{info, warn};

use crate::{
    config::Config,
    error::ConfigError,
    sensors::{DriverInventory, Role, SensorCatalog, SensorSelection, SensorSource, inventory},
};

/// Operator dialogue used by [`interactive_select`].
pub trait Prompt {
    /// Prints informational text.
    fn show(&mut self, text: &str) -> io::Result<()>;

    /// Prints `question` and reads one answer; `None` at end of input.
    fn ask(&mut self, question: &str) -> io::Result<Option<String>>;
}

/// Line-oriented prompt over any reader and writer.
pub struct TerminalPrompt<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> TerminalPrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl TerminalPrompt<StdinLock<'static>, Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> Prompt for TerminalPrompt<R, W> {
    fn show(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.output, "{text}")
    }

    fn ask(&mut self, question: &str) -> io::Result<Option<String>> {
        write!(self.output, "{question}")?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }
}

/// Outcome of [`resolve_with_fallback`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub selection: SensorSelection,
    /// Roles chosen interactively, in resolution order.
    pub prompted: Vec<Role>,
    /// The loaded config updated with the interactive choices.
    pub config: Config,
}

/// Checks that the catalog currently reports `source`.
pub fn check_source<C: SensorCatalog + ?Sized>(
    catalog: &C,
    role: Role,
    source: &SensorSource,
) -> Result<(), ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidSelection { role, reason };

    if !catalog.list_drivers().contains(&source.driver) {
        return Err(invalid(format!("driver '{}' is not present", source.driver)));
    }
    let labels = catalog
        .list_labels(&source.driver)
        .map_err(|e| invalid(e.to_string()))?;
    if !labels.contains(&source.label) {
        return Err(invalid(format!(
            "label '{}' not found on driver '{}'",
            source.label, source.driver
        )));
    }
    Ok(())
}

/// Validates both configured roles against the catalog.
///
/// # Errors
///
/// [`ConfigError::InvalidSelection`] naming the first role that is unset or
/// not reported by the catalog.
pub fn resolve<C: SensorCatalog + ?Sized>(
    config: &Config,
    catalog: &C,
) -> Result<SensorSelection, ConfigError> {
    let validated = |role: Role| -> Result<SensorSource, ConfigError> {
        let source = config
            .source(role)
            .ok_or_else(|| ConfigError::InvalidSelection {
                role,
                reason: format!("no [{}] section", role.as_str()),
            })?;
        check_source(catalog, role, source)?;
        Ok(source.clone())
    };
    Ok(SensorSelection::new(
        validated(Role::Cpu)?,
        validated(Role::Gpu)?,
    ))
}

/// Lets the operator pick a driver and one of its labels for `role`.
///
/// Answers are 1-based menu numbers; anything else is asked again.
pub fn interactive_select(
    role: Role,
    inventory: &[DriverInventory],
    prompt: &mut dyn Prompt,
) -> Result<SensorSource, ConfigError> {
    let drivers: Vec<&DriverInventory> = inventory
        .iter()
        .filter(|d| !d.channels.is_empty())
        .collect();
    if drivers.is_empty() {
        return Err(ConfigError::InvalidSelection {
            role,
            reason: "no temperature sensors found".to_string(),
        });
    }

    prompt.show(&format!("\nSelect {role} temperature source:"))?;
    prompt.show("Available sensors:")?;
    for (idx, driver) in drivers.iter().enumerate() {
        prompt.show(&format!("{}: {}", idx + 1, driver.driver))?;
        for (label_idx, channel) in driver.channels.iter().enumerate() {
            let value = channel
                .celsius
                .map_or_else(|| "N/A".to_string(), |c| format!("{c}°C"));
            prompt.show(&format!("   {}: {} - {value}", label_idx + 1, channel.label))?;
        }
    }

    let driver = drivers[pick(prompt, "\nSelect a sensor (number): ", drivers.len())?];
    let channel = &driver.channels[pick(
        prompt,
        "Select a temperature label (number): ",
        driver.channels.len(),
    )?];

    let source = SensorSource::new(driver.driver.as_str(), channel.label.as_str());
    info!("Selected {role} sensor: {source}");
    Ok(source)
}

/// Asks until the answer is a number in `1..=count`; returns it zero-based.
fn pick(prompt: &mut dyn Prompt, question: &str, count: usize) -> Result<usize, ConfigError> {
    loop {
        let answer = prompt.ask(question)?.ok_or(ConfigError::Aborted)?;
        match answer.parse::<usize>() {
            Ok(n) if (1..=count).contains(&n) => return Ok(n - 1),
            _ => prompt.show(&format!(
                "Invalid choice '{answer}', enter a number between 1 and {count}"
            ))?,
        }
    }
}

/// Resolves the selection, prompting for every role the config cannot
/// supply.
///
/// A missing file or one that is not valid INI leaves every role to the
/// prompt; other load errors, such as a bad `[display]` value, are returned
/// as is.
///
/// # Errors
///
/// [`ConfigError::NoTerminal`] when a role needs the prompt and none is
/// available, [`ConfigError::Aborted`] when the operator closes input.
pub fn resolve_with_fallback<C: SensorCatalog + ?Sized>(
    loaded: Result<Config, ConfigError>,
    catalog: &C,
    prompt: Option<&mut dyn Prompt>,
) -> Result<Resolved, ConfigError> {
    let mut config = match loaded {
        Ok(config) => config,
        Err(e @ (ConfigError::Missing(_) | ConfigError::Malformed { .. })) => {
            warn!("{e}");
            Config::default()
        }
        Err(e) => return Err(e),
    };

    let mut pending = Vec::new();
    for role in Role::ALL {
        match config.source(role) {
            Some(source) => {
                if let Err(e) = check_source(catalog, role, source) {
                    warn!("{e}");
                    pending.push(role);
                }
            }
            None => {
                warn!("No {role} sensor configured");
                pending.push(role);
            }
        }
    }

    if !pending.is_empty() {
        let Some(prompt) = prompt else {
            return Err(ConfigError::NoTerminal(pending));
        };
        let available = inventory(catalog);
        for &role in &pending {
            let source = interactive_select(role, &available, &mut *prompt)?;
            config.set_source(role, source);
        }
    }

    let selection = resolve(&config, catalog)?;
    Ok(Resolved {
        selection,
        prompted: pending,
        config,
    })
}
