//! Error types for the simulation core.
//!
//! [`SimulationError`] wraps every failure a population or scheduler
//! operation can surface, so callers propagate a single type with `?`.

use crate::config::ConfigError;
use crate::random::SamplingError;
use crate::registry::RegistryError;

/// Top-level error for population construction and round execution.
#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    /// The configuration was rejected.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: ConfigError,
    },

    /// A membership operation failed or an invariant check tripped.
    #[error("registry error: {source}")]
    Registry {
        /// The underlying registry error.
        #[from]
        source: RegistryError,
    },

    /// A strategy sampler could not be built.
    #[error("sampling error: {source}")]
    Sampling {
        /// The underlying sampling error.
        #[from]
        source: SamplingError,
    },
}
