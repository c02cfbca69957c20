//! Shared type definitions for the Civitas simulation.
//!
//! This crate holds the types that cross crate boundaries: identifiers,
//! the strategy enumeration and the statistics records handed to round
//! observers.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe sequence-number wrappers for agents and groups
//! - [`enums`] -- The [`Strategy`] enumeration and per-strategy tallies
//! - [`stats`] -- Per-strategy, per-group and per-round statistics

pub mod enums;
pub mod ids;
pub mod stats;

// Re-export all public types at crate root for convenience.
pub use enums::{STRATEGY_COUNT, Strategy, StrategyCounts};
pub use ids::{AgentId, GroupId};
pub use stats::{GroupStats, RoundStats, StrategyStats};
