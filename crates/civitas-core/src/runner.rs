//! Simulation loop runner.
//!
//! [`run_simulation`] drives the round cycle until either the configured
//! number of rounds has been played or early termination has been
//! requested through the population's termination flag. After every round
//! it computes the round statistics and hands them to a [`RoundObserver`].
//!
//! The runner wraps the single-round [`Scheduler::step`] and adds the
//! stopping rules around it.

use civitas_types::RoundStats;
use tracing::{info, warn};

use crate::error::SimulationError;
use crate::population::Population;
use crate::scheduler::{RoundSummary, Scheduler};
use crate::stats;

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulationEndReason {
    /// The configured number of rounds was played.
    RoundLimitReached,
    /// The termination flag was raised.
    EarlyTermination,
}

/// Result of the simulation run.
#[derive(Debug)]
pub struct SimulationResult {
    /// The reason the simulation ended.
    pub end_reason: SimulationEndReason,
    /// Statistics of the last round, if any round completed.
    pub final_stats: Option<RoundStats>,
    /// Total number of rounds executed.
    pub total_rounds: u64,
}

/// Callback invoked after each round completes.
///
/// Implementations can log progress, export statistics or raise the
/// termination flag through a [`TerminationHandle`].
///
/// [`TerminationHandle`]: crate::termination::TerminationHandle
pub trait RoundObserver {
    /// Called after a round completes successfully.
    fn on_round(&mut self, summary: &RoundSummary, stats: &RoundStats, population: &Population);
}

/// A no-op round observer for testing.
pub struct NoOpObserver;

impl RoundObserver for NoOpObserver {
    fn on_round(
        &mut self,
        _summary: &RoundSummary,
        _stats: &RoundStats,
        _population: &Population,
    ) {
    }
}

/// Run rounds until a termination condition is met.
///
/// The termination flag is checked before every round, so a flag raised
/// by the observer stops the run after the round that raised it.
///
/// # Errors
///
/// Returns [`SimulationError`] if a round fails.
pub fn run_simulation(
    population: &mut Population,
    scheduler: &mut Scheduler,
    observer: &mut dyn RoundObserver,
) -> Result<SimulationResult, SimulationError> {
    let max_rounds = population.config().run.rounds;
    let mut final_stats: Option<RoundStats> = None;
    let mut total_rounds: u64 = 0;

    info!(
        run_id = %population.config().run.run_id,
        max_rounds,
        groups = population.registry().group_count(),
        agents = population.registry().agent_count(),
        "Simulation starting"
    );

    loop {
        if population.can_terminate() {
            info!(round = scheduler.round(), "Early termination requested");
            return Ok(SimulationResult {
                end_reason: SimulationEndReason::EarlyTermination,
                final_stats,
                total_rounds,
            });
        }

        if scheduler.round() >= max_rounds {
            info!(round = scheduler.round(), max_rounds, "Round limit reached");
            return Ok(SimulationResult {
                end_reason: SimulationEndReason::RoundLimitReached,
                final_stats,
                total_rounds,
            });
        }

        let summary = scheduler.step(population)?;
        total_rounds = total_rounds.saturating_add(1);

        let round_stats = stats::collect_round_stats(population.registry(), summary.round)?;
        observer.on_round(&summary, &round_stats, population);
        final_stats = Some(round_stats);
    }
}

/// Log the simulation end sequence.
pub fn log_simulation_end(result: &SimulationResult) {
    info!(
        reason = ?result.end_reason,
        total_rounds = result.total_rounds,
        "Simulation ended"
    );

    if let Some(ref stats) = result.final_stats {
        info!(
            round = stats.round,
            population = stats.population,
            cooperation_rate = stats.cooperation_rate,
            "Final round summary"
        );
    } else {
        warn!("Simulation ended with no rounds executed");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::SimulationConfig;

    fn config(rounds: u64) -> SimulationConfig {
        let mut config = SimulationConfig::default();
        config.run.rounds = rounds;
        config.population.agents_per_group = 10;
        config.population.group_count = 4;
        config
    }

    /// Raises the termination flag after a fixed number of rounds.
    struct StopAfter {
        rounds: u64,
        seen: u64,
    }

    impl RoundObserver for StopAfter {
        fn on_round(
            &mut self,
            _summary: &RoundSummary,
            _stats: &RoundStats,
            population: &Population,
        ) {
            self.seen += 1;
            if self.seen >= self.rounds {
                population.request_termination();
            }
        }
    }

    #[test]
    fn bounded_by_round_limit() {
        let mut population = Population::new(config(5)).unwrap();
        let mut scheduler = Scheduler::new();
        let result = run_simulation(&mut population, &mut scheduler, &mut NoOpObserver).unwrap();
        assert_eq!(result.end_reason, SimulationEndReason::RoundLimitReached);
        assert_eq!(result.total_rounds, 5);
        assert_eq!(result.final_stats.unwrap().round, 4);
    }

    #[test]
    fn zero_rounds_runs_nothing() {
        let mut population = Population::new(config(0)).unwrap();
        let mut scheduler = Scheduler::new();
        let result = run_simulation(&mut population, &mut scheduler, &mut NoOpObserver).unwrap();
        assert_eq!(result.total_rounds, 0);
        assert!(result.final_stats.is_none());
    }

    #[test]
    fn observer_can_stop_the_run() {
        let mut population = Population::new(config(100)).unwrap();
        let mut scheduler = Scheduler::new();
        let mut observer = StopAfter { rounds: 3, seen: 0 };
        let result = run_simulation(&mut population, &mut scheduler, &mut observer).unwrap();
        assert_eq!(result.end_reason, SimulationEndReason::EarlyTermination);
        assert_eq!(result.total_rounds, 3);
    }

    #[test]
    fn external_flag_stops_before_first_round() {
        let mut population = Population::new(config(100)).unwrap();
        population.termination_handle().request();
        let mut scheduler = Scheduler::new();
        let result = run_simulation(&mut population, &mut scheduler, &mut NoOpObserver).unwrap();
        assert_eq!(result.end_reason, SimulationEndReason::EarlyTermination);
        assert_eq!(result.total_rounds, 0);
    }
}
