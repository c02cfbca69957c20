//! Engine binary for the Civitas simulation.
//!
//! Loads configuration, builds the initial population, and runs the round
//! cycle until the round limit is reached or the cooperation trend settles.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `CIVITAS_CONFIG` or `civitas-config.yaml`
//! 2. Initialize structured logging (tracing)
//! 3. Build the initial population
//! 4. Attach the progress reporter
//! 5. Run the simulation loop
//! 6. Log the result

mod error;
mod reporter;

use std::path::{Path, PathBuf};

use civitas_core::config::{LogFormat, LoggingConfig, SimulationConfig};
use civitas_core::population::Population;
use civitas_core::runner;
use civitas_core::scheduler::Scheduler;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;
use crate::reporter::ProgressReporter;

/// Environment variable naming the configuration file.
const CONFIG_ENV: &str = "CIVITAS_CONFIG";

/// Configuration file read when [`CONFIG_ENV`] is unset.
const DEFAULT_CONFIG_PATH: &str = "civitas-config.yaml";

/// Application entry point for the engine.
///
/// # Errors
///
/// Returns an error if configuration loading, population setup, or a
/// round fails.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let config_path = config_path();
    let config = load_config(&config_path)?;

    // 2. Initialize structured logging.
    init_tracing(&config.logging);
    info!("civitas-engine starting");
    info!(
        path = %config_path.display(),
        found = config_path.exists(),
        run_id = %config.run.run_id,
        seed = config.run.seed,
        rounds = config.run.rounds,
        randomized = config.run.randomized,
        agents_per_group = config.population.agents_per_group,
        group_count = config.population.group_count,
        "Configuration loaded"
    );

    // 3. Build the initial population.
    let mut population = Population::new(config).map_err(EngineError::from)?;

    // 4. Attach the progress reporter.
    let mut reporter = ProgressReporter::new(&population);

    // 5. Run the simulation loop.
    let mut scheduler = Scheduler::new();
    let result = runner::run_simulation(&mut population, &mut scheduler, &mut reporter)
        .map_err(EngineError::from)?;

    // 6. Log the result.
    runner::log_simulation_end(&result);
    if let Some(trend) = reporter.tripped() {
        info!(?trend, "Run stopped on cooperation trend");
    }
    info!(
        totals = ?population.strategy_totals(),
        "civitas-engine shutdown complete"
    );

    Ok(())
}

/// Install the global subscriber. `RUST_LOG` wins over the configured
/// level, and `info` is used if neither parses.
fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    match logging.format {
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
    }
}

/// Path of the configuration file: `CIVITAS_CONFIG` if set, otherwise
/// `civitas-config.yaml` in the working directory.
fn config_path() -> PathBuf {
    std::env::var_os(CONFIG_ENV).map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from)
}

/// Load the simulation configuration from `path`, falling back to the
/// defaults when the file does not exist.
fn load_config(path: &Path) -> Result<SimulationConfig, EngineError> {
    if path.exists() {
        Ok(SimulationConfig::from_file(path)?)
    } else {
        Ok(SimulationConfig::default())
    }
}
