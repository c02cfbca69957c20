//! Population registry, round cycle, and selection dynamics for the
//! Civitas simulation.
//!
//! Agents play a public-goods game inside their groups, die and reproduce
//! by fitness, and are carried along when their group wins or loses an
//! intergroup conflict. Migration mixes agents between groups and the
//! learning strategies adapt their propensity to cooperate.
//!
//! # Modules
//!
//! - [`config`] -- Configuration loading from `civitas-config.yaml` into
//!   strongly-typed structs.
//! - [`error`] -- [`SimulationError`], the error every round operation
//!   returns.
//! - [`random`] -- Weighted sampling, pairing, and the randomized or
//!   deterministic [`Mode`].
//! - [`agent`] -- Per-agent decision rules and learning.
//! - [`registry`] -- Agent and group storage with membership bookkeeping.
//! - [`group`] -- Cooperation accounting, death, and birth within a group.
//! - [`population`] -- Initialization and the population-wide stages.
//! - [`scheduler`] -- The per-round stage sequence.
//! - [`stats`] -- Round statistics.
//! - [`termination`] -- Early-termination flag and cooperation-trend
//!   controller.
//! - [`runner`] -- The run loop and [`RoundObserver`] trait.
//!
//! [`SimulationError`]: error::SimulationError
//! [`Mode`]: random::Mode
//! [`RoundObserver`]: runner::RoundObserver

pub mod agent;
pub mod config;
pub mod error;
pub mod group;
pub mod population;
pub mod random;
pub mod registry;
pub mod runner;
pub mod scheduler;
pub mod stats;
pub mod termination;
