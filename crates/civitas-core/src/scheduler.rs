//! Round cycle: the fixed stage sequence that advances a population by one
//! generation.
//!
//! Each round after the first runs, in order:
//!
//! 1. **Reset** -- clear every agent's per-round flags.
//! 2. **Reproduce** -- fitness-weighted death then birth in every group.
//! 3. **Conflict** -- paired groups fight; losers are replaced.
//! 4. **Migrate** -- paired agents from different groups swap.
//!
//! Every round, including the first, then runs:
//!
//! 5. **Decide** -- every agent draws its detection probability, decides
//!    and is observed.
//! 6. **Account** -- every group shares its benefit pool and updates
//!    fitness.
//!
//! Round 0 only plays the game so the initial population has fitness
//! values before anything is selected on them.

use tracing::debug;

use crate::error::SimulationError;
use crate::group::ReproductionOutcome;
use crate::population::{ConflictRecord, Population};

/// Where the scheduler is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Populated, no round played yet.
    Init,
    /// At least one round played.
    Running,
}

/// Summary of a single round's execution.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundSummary {
    /// The round number that was executed (0-based).
    pub round: u64,
    /// Deaths, births and mutations of the reproduction stage.
    pub reproduction: ReproductionOutcome,
    /// Fights that took place.
    pub conflicts: Vec<ConflictRecord>,
    /// Agent pairs that swapped groups.
    pub swaps: usize,
    /// Agents that cooperated.
    pub cooperators: u64,
    /// Living agents at the end of the round.
    pub population: usize,
    /// Groups at the end of the round.
    pub groups: usize,
}

/// Owner of the round counter.
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    round: u64,
}

impl Scheduler {
    /// A scheduler that has not played any round.
    pub const fn new() -> Self {
        Self { round: 0 }
    }

    /// Number of rounds played, which is also the next round's number.
    pub const fn round(&self) -> u64 {
        self.round
    }

    /// Current lifecycle phase.
    pub const fn phase(&self) -> Phase {
        if self.round == 0 {
            Phase::Init
        } else {
            Phase::Running
        }
    }

    /// Play one round on `population`.
    ///
    /// In debug builds the membership invariants are checked after the
    /// round.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError`] if a membership operation fails or an
    /// invariant check trips.
    pub fn step(&mut self, population: &mut Population) -> Result<RoundSummary, SimulationError> {
        let round = self.round;

        let mut reproduction = ReproductionOutcome::default();
        let mut conflicts = Vec::new();
        let mut swaps = 0;
        if self.phase() == Phase::Running {
            population.reset_round_flags();
            reproduction = population.reproduce_groups()?;
            conflicts = population.fight_groups()?;
            swaps = population.recombine_groups()?;
        }

        population.step_agents()?;
        let cooperators = population.distribute()?;

        if cfg!(debug_assertions) {
            population.registry().check_invariants()?;
        }

        let summary = RoundSummary {
            round,
            reproduction,
            conflicts,
            swaps,
            cooperators,
            population: population.registry().agent_count(),
            groups: population.registry().group_count(),
        };
        debug!(
            round,
            deaths = summary.reproduction.deaths,
            births = summary.reproduction.births,
            mutations = summary.reproduction.mutations,
            conflicts = summary.conflicts.len(),
            swaps,
            cooperators,
            population = summary.population,
            "Round complete"
        );

        self.round = round.saturating_add(1);
        Ok(summary)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use civitas_types::Strategy;

    use super::*;
    use crate::config::SimulationConfig;

    fn config() -> SimulationConfig {
        let mut config = SimulationConfig::default();
        config.population.agents_per_group = 20;
        config.population.group_count = 6;
        config.probabilities.conflict = 0.5;
        config.probabilities.migration = 0.5;
        config
    }

    #[test]
    fn first_round_only_plays_the_game() {
        let mut population = Population::new(config()).unwrap();
        let mut scheduler = Scheduler::new();
        assert_eq!(scheduler.phase(), Phase::Init);

        let summary = scheduler.step(&mut population).unwrap();
        assert_eq!(summary.round, 0);
        assert_eq!(summary.reproduction, ReproductionOutcome::default());
        assert!(summary.conflicts.is_empty());
        assert_eq!(summary.swaps, 0);
        assert_eq!(scheduler.round(), 1);
        assert_eq!(scheduler.phase(), Phase::Running);
    }

    #[test]
    fn later_rounds_replace_a_fifth_of_each_group() {
        let mut population = Population::new(config()).unwrap();
        let mut scheduler = Scheduler::new();
        scheduler.step(&mut population).unwrap();
        let summary = scheduler.step(&mut population).unwrap();
        assert_eq!(summary.round, 1);
        assert_eq!(summary.reproduction.deaths, 6 * 4);
        assert_eq!(summary.reproduction.births, 6 * 4);
    }

    #[test]
    fn sizes_are_preserved_across_rounds() {
        let mut population = Population::new(config()).unwrap();
        let mut scheduler = Scheduler::new();
        for _ in 0..25 {
            let summary = scheduler.step(&mut population).unwrap();
            assert_eq!(summary.population, 120);
            assert_eq!(summary.groups, 6);
            assert!(population.registry().groups().all(|g| g.len() == 20));
            assert!(population.registry().check_invariants().is_ok());
        }
    }

    #[test]
    fn same_seed_same_history() {
        let run = || {
            let mut population = Population::new(config()).unwrap();
            let mut scheduler = Scheduler::new();
            let mut history = Vec::new();
            for _ in 0..10 {
                let summary = scheduler.step(&mut population).unwrap();
                history.push((summary.cooperators, summary.swaps, summary.conflicts.len()));
            }
            (history, population.strategy_totals().get(Strategy::Saint))
        };
        assert_eq!(run(), run());
    }
}
