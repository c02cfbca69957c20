//! Round statistics: per-strategy and per-group aggregates computed from
//! the registry after a round has been played.

use std::collections::BTreeMap;

use civitas_types::{GroupStats, RoundStats, Strategy, StrategyStats};

use crate::agent::Agent;
use crate::registry::{Registry, RegistryError};

/// Running sums for one strategy.
#[derive(Debug, Clone, Copy, Default)]
struct Tally {
    population: u32,
    fitness: f64,
    cooperated: u32,
    p_obs: f64,
    observed: u32,
    erred: u32,
}

impl Tally {
    fn add(&mut self, agent: &Agent) {
        self.population = self.population.saturating_add(1);
        self.fitness += agent.fitness;
        self.cooperated = self.cooperated.saturating_add(u32::from(agent.cooperates));
        self.p_obs += agent.p_obs;
        self.observed = self.observed.saturating_add(u32::from(agent.observed));
        self.erred = self.erred.saturating_add(u32::from(agent.erred()));
    }

    fn merge(&mut self, other: &Self) {
        self.population = self.population.saturating_add(other.population);
        self.fitness += other.fitness;
        self.cooperated = self.cooperated.saturating_add(other.cooperated);
        self.p_obs += other.p_obs;
        self.observed = self.observed.saturating_add(other.observed);
        self.erred = self.erred.saturating_add(other.erred);
    }

    fn finish(&self) -> Option<StrategyStats> {
        if self.population == 0 {
            return None;
        }
        let n = f64::from(self.population);
        Some(StrategyStats {
            population: self.population,
            mean_fitness: self.fitness / n,
            cooperation_rate: f64::from(self.cooperated) / n,
            detection_rate: self.p_obs / n,
            observed_rate: f64::from(self.observed) / n,
            error_rate: f64::from(self.erred) / n,
        })
    }
}

fn finish_all(tallies: &BTreeMap<Strategy, Tally>) -> BTreeMap<Strategy, StrategyStats> {
    tallies
        .iter()
        .filter_map(|(&strategy, tally)| tally.finish().map(|stats| (strategy, stats)))
        .collect()
}

/// Aggregate the state left by the round numbered `round`.
#[allow(clippy::cast_precision_loss)]
pub fn collect_round_stats(registry: &Registry, round: u64) -> Result<RoundStats, RegistryError> {
    let mut totals: BTreeMap<Strategy, Tally> = BTreeMap::new();
    let mut groups = Vec::with_capacity(registry.group_count());

    for group in registry.groups() {
        let mut tallies: BTreeMap<Strategy, Tally> = BTreeMap::new();
        for agent in registry.member_agents(group.id())? {
            tallies.entry(agent.strategy()).or_default().add(agent);
        }
        for (&strategy, tally) in &tallies {
            totals.entry(strategy).or_default().merge(tally);
        }
        groups.push(GroupStats {
            group_id: group.id(),
            size: u32::try_from(group.len()).unwrap_or(u32::MAX),
            num_cooperated: group.num_cooperated,
            average_benefit: group.average_benefit,
            average_fitness: group.average_fitness,
            fought_with: if group.fought { group.enemy } else { None },
            strategies: finish_all(&tallies),
        });
    }

    let population: u64 = totals.values().map(|t| u64::from(t.population)).sum();
    let cooperators: u64 = totals.values().map(|t| u64::from(t.cooperated)).sum();
    let cooperation_rate = if population == 0 {
        0.0
    } else {
        cooperators as f64 / population as f64
    };

    Ok(RoundStats {
        round,
        population,
        cooperation_rate,
        strategies: finish_all(&totals),
        groups,
    })
}
