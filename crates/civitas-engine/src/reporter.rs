//! Round observer that reports progress through `tracing`.
//!
//! Every `report_interval` rounds the population composition is logged at
//! `info`, one event per strategy present. Every round the full statistics
//! are logged as JSON at `debug` and fed into the cooperation-trend
//! controller, which may request early termination.

use civitas_core::population::Population;
use civitas_core::runner::RoundObserver;
use civitas_core::scheduler::RoundSummary;
use civitas_core::termination::{CooperationTrend, Trend};
use civitas_types::{RoundStats, StrategyCounts};
use tracing::{debug, info, warn};

/// Observer that logs composition reports and drives early termination.
pub struct ProgressReporter {
    report_interval: u64,
    trend: CooperationTrend,
    tripped: Option<Trend>,
}

impl ProgressReporter {
    /// Build a reporter for `population`, wiring the trend controller to
    /// the population's termination flag.
    pub fn new(population: &Population) -> Self {
        let config = population.config();
        Self {
            report_interval: config.logging.report_interval,
            trend: CooperationTrend::new(
                config.termination.clone(),
                population.termination_handle(),
            ),
            tripped: None,
        }
    }

    /// The trend that stopped the run, if any.
    pub const fn tripped(&self) -> Option<Trend> {
        self.tripped
    }

    /// Whether the composition is reported after `round`.
    pub fn is_report_round(&self, round: u64) -> bool {
        round.checked_rem(self.report_interval) == Some(0)
    }

    fn report_composition(stats: &RoundStats, totals: &StrategyCounts) {
        info!(
            round = stats.round,
            population = stats.population,
            cooperation_rate = stats.cooperation_rate,
            groups = stats.groups.len(),
            composition = %composition_line(totals),
            "Composition report"
        );
        for (strategy, strategy_stats) in &stats.strategies {
            info!(
                round = stats.round,
                %strategy,
                share = stats.share(*strategy),
                cooperation_rate = strategy_stats.cooperation_rate,
                mean_fitness = strategy_stats.mean_fitness,
                "Strategy composition"
            );
        }
    }
}

/// Compact `abbreviation=count` listing of the strategies present, in
/// declaration order.
pub fn composition_line(totals: &StrategyCounts) -> String {
    totals
        .iter()
        .filter(|&(_, count)| count > 0)
        .map(|(strategy, count)| format!("{}={count}", strategy.abbreviation()))
        .collect::<Vec<_>>()
        .join(" ")
}

impl RoundObserver for ProgressReporter {
    fn on_round(&mut self, summary: &RoundSummary, stats: &RoundStats, population: &Population) {
        if self.is_report_round(summary.round) {
            Self::report_composition(stats, &population.strategy_totals());
        }

        match serde_json::to_string(stats) {
            Ok(json) => debug!(round = summary.round, stats = %json, "Round statistics"),
            Err(e) => {
                warn!(round = summary.round, error = %e, "Failed to serialize round statistics");
            }
        }

        if let Some(trend) = self.trend.observe(stats) {
            self.tripped = Some(trend);
        }
    }
}
