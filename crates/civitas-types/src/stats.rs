//! Per-round statistics records exposed to observers.
//!
//! These are plain data: the core crate computes them after each round
//! and hands them to whatever observer is attached to the run. Strategies
//! with no living members are omitted from the maps rather than reported
//! with undefined means.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::enums::Strategy;
use crate::ids::GroupId;

// ---------------------------------------------------------------------------
// Strategy statistics
// ---------------------------------------------------------------------------

/// Aggregate behavior of all agents following one strategy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrategyStats {
    /// Number of living agents with this strategy.
    pub population: u32,
    /// Mean current fitness.
    pub mean_fitness: f64,
    /// Fraction that cooperated this round.
    pub cooperation_rate: f64,
    /// Mean detection probability drawn this round.
    pub detection_rate: f64,
    /// Fraction that were actually observed this round.
    pub observed_rate: f64,
    /// Fraction whose decision differed from their non-random default.
    pub error_rate: f64,
}

// ---------------------------------------------------------------------------
// Group statistics
// ---------------------------------------------------------------------------

/// Snapshot of one group after the cooperation round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupStats {
    /// The group described.
    pub group_id: GroupId,
    /// Number of members.
    pub size: u32,
    /// Members that cooperated this round.
    pub num_cooperated: u32,
    /// Benefit share handed to each reward-eligible member.
    pub average_benefit: f64,
    /// Mean member fitness after payoffs.
    pub average_fitness: f64,
    /// The group fought this round, if any.
    pub fought_with: Option<GroupId>,
    /// Per-strategy breakdown of the members.
    pub strategies: BTreeMap<Strategy, StrategyStats>,
}

// ---------------------------------------------------------------------------
// Round statistics
// ---------------------------------------------------------------------------

/// Population-wide snapshot taken at the end of a round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundStats {
    /// The round that was just completed (0-based).
    pub round: u64,
    /// Number of living agents.
    pub population: u64,
    /// Fraction of all agents that cooperated this round.
    pub cooperation_rate: f64,
    /// Population-wide per-strategy breakdown.
    pub strategies: BTreeMap<Strategy, StrategyStats>,
    /// Per-group breakdown in group id order.
    pub groups: Vec<GroupStats>,
}

impl RoundStats {
    /// Share of the population following `strategy`, 0 if absent.
    #[allow(clippy::cast_precision_loss)]
    pub fn share(&self, strategy: Strategy) -> f64 {
        if self.population == 0 {
            return 0.0;
        }
        self.strategies
            .get(&strategy)
            .map_or(0.0, |s| f64::from(s.population) / self.population as f64)
    }
}
