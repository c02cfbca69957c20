//! The population: every group and agent of a run plus the processes that
//! act across groups.
//!
//! [`Population`] owns the membership [`Registry`], the validated
//! configuration, the single seeded random source and the termination
//! flag. Besides driving the per-group processes of [`crate::group`] it
//! implements the two between-group processes:
//!
//! - **Conflict** ([`Population::fight_groups`]): groups are paired, paired
//!   groups fight with the conflict probability, and the loser is replaced
//!   by a fresh group cloned from the winner's composition.
//! - **Migration** ([`Population::recombine_groups`]): agents are paired,
//!   and pairs from different groups swap groups with the migration
//!   probability.
//!
//! In deterministic mode pairings follow ID order and every paired fight
//! and swap happens.

use civitas_types::{AgentId, GroupId, Strategy, StrategyCounts};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info};

use crate::agent::DecisionParams;
use crate::config::SimulationConfig;
use crate::error::SimulationError;
use crate::group::{self, BirthParams, ReproductionOutcome};
use crate::random::{self, Mode, StrategySampler};
use crate::registry::{Registry, RegistryError};
use crate::termination::TerminationHandle;

/// Outcome of one fight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConflictRecord {
    /// The group that won and was left untouched.
    pub winner: GroupId,
    /// The group that lost and was destroyed.
    pub loser: GroupId,
    /// The group created from the winner's composition.
    pub replacement: GroupId,
}

/// All groups and agents of a run.
#[derive(Debug)]
pub struct Population {
    config: SimulationConfig,
    params: DecisionParams,
    mode: Mode,
    registry: Registry,
    mutation_sampler: StrategySampler,
    rng: StdRng,
    termination: TerminationHandle,
}

impl Population {
    /// Validate `config` and build the initial population, seeding the
    /// random source from `run.seed`.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError::Config`] if the configuration is invalid.
    pub fn new(config: SimulationConfig) -> Result<Self, SimulationError> {
        let rng = StdRng::seed_from_u64(config.run.seed);
        Self::with_rng(config, rng)
    }

    /// Like [`Population::new`] with an explicit random source.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError::Config`] if the configuration is invalid.
    pub fn with_rng(config: SimulationConfig, rng: StdRng) -> Result<Self, SimulationError> {
        config.validate()?;
        let mutation_sampler = StrategySampler::new(config.population.effective_mutation_mix())?;
        let mut population = Self {
            params: DecisionParams::from_config(&config),
            mode: Mode::from_randomized(config.run.randomized),
            config,
            registry: Registry::new(),
            mutation_sampler,
            rng,
            termination: TerminationHandle::new(),
        };
        let strategies = population.initial_strategies()?;
        population.populate(&strategies)?;

        info!(
            groups = population.registry.group_count(),
            agents = population.registry.agent_count(),
            mode = ?population.mode,
            saintly_group = population.config.population.saintly_group,
            "Population initialized"
        );
        Ok(population)
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// The validated configuration.
    pub const fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Whether stochastic choices are drawn.
    pub const fn mode(&self) -> Mode {
        self.mode
    }

    /// The membership registry.
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The membership registry, for staging state in experiments.
    pub const fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// Population-wide strategy tally.
    pub fn strategy_totals(&self) -> StrategyCounts {
        self.registry.strategy_totals()
    }

    /// A clone of the termination flag, for external controllers.
    pub fn termination_handle(&self) -> TerminationHandle {
        self.termination.clone()
    }

    /// Whether early termination has been requested.
    pub fn can_terminate(&self) -> bool {
        self.termination.is_requested()
    }

    /// Request early termination after the current round.
    pub fn request_termination(&self) {
        self.termination.request();
    }

    // -----------------------------------------------------------------------
    // Initialization
    // -----------------------------------------------------------------------

    /// Strategies for the regular (non-saintly) groups, laid out group by
    /// group.
    fn initial_strategies(&mut self) -> Result<Vec<Strategy>, SimulationError> {
        let population = &self.config.population;
        let regular_groups = population
            .group_count
            .saturating_sub(usize::from(population.saintly_group));
        match self.mode {
            Mode::Randomized => {
                let sampler = StrategySampler::new(&population.strategy_mix)?;
                let saintly = if population.saintly_group {
                    population.agents_per_group
                } else {
                    0
                };
                let total = population.total_agents().saturating_sub(saintly);
                Ok((0..total).map(|_| sampler.sample(&mut self.rng)).collect())
            }
            Mode::Deterministic => {
                let quotas = population.group_quotas()?;
                let layout: Vec<Strategy> = quotas
                    .iter()
                    .flat_map(|&(strategy, count)| std::iter::repeat_n(strategy, count))
                    .collect();
                Ok(layout.repeat(regular_groups))
            }
        }
    }

    fn populate(&mut self, strategies: &[Strategy]) -> Result<(), RegistryError> {
        let size = self.config.population.agents_per_group;
        let fitness = self.config.payoff.base_fitness;
        let pi = self.config.learning.initial_pi;

        if self.config.population.saintly_group {
            let group_id = self.registry.create_group()?;
            for i in 0..size {
                let strategy = if i % 2 == 0 {
                    Strategy::Citizen
                } else {
                    Strategy::Saint
                };
                self.registry.spawn(group_id, strategy, fitness, pi)?;
            }
        }

        for chunk in strategies.chunks(size) {
            let group_id = self.registry.create_group()?;
            for &strategy in chunk {
                self.registry.spawn(group_id, strategy, fitness, pi)?;
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Per-round flags
    // -----------------------------------------------------------------------

    /// Clear every agent's per-round flags.
    pub fn reset_round_flags(&mut self) {
        for agent in self.registry.agents_mut() {
            agent.reset_round_flags();
        }
    }

    // -----------------------------------------------------------------------
    // Reproduction
    // -----------------------------------------------------------------------

    /// Run death then birth in every group. Returns the summed outcome.
    pub fn reproduce_groups(&mut self) -> Result<ReproductionOutcome, SimulationError> {
        let survival = self.config.probabilities.survival;
        let params = BirthParams {
            mutation: self.config.probabilities.mutation,
            offspring_pi_sd: self.config.learning.offspring_pi_sd,
            mutation_sampler: &self.mutation_sampler,
        };
        let mut total = ReproductionOutcome::default();
        for group_id in self.registry.group_ids() {
            let outcome =
                group::reproduce(&mut self.registry, group_id, survival, &params, &mut self.rng)?;
            total.deaths = total.deaths.saturating_add(outcome.deaths);
            total.births = total.births.saturating_add(outcome.births);
            total.mutations = total.mutations.saturating_add(outcome.mutations);
        }
        Ok(total)
    }

    // -----------------------------------------------------------------------
    // Conflict
    // -----------------------------------------------------------------------

    /// Pair the groups and let each pair fight with the conflict
    /// probability. Losers are replaced by clones of the winners.
    pub fn fight_groups(&mut self) -> Result<Vec<ConflictRecord>, SimulationError> {
        for group_id in self.registry.group_ids() {
            if let Some(group) = self.registry.group_mut(group_id) {
                group.reset_conflict();
            }
        }

        let pairs = random::shuffle_and_pair(self.registry.group_ids(), self.mode, &mut self.rng);
        let mut records = Vec::new();
        for (first, second) in pairs {
            if !random::gate(&mut self.rng, self.mode, self.config.probabilities.conflict) {
                continue;
            }
            self.mark_enemies(first, second)?;
            let first_wins = self.fight(first, second)?;
            let (winner, loser) = if first_wins {
                (first, second)
            } else {
                (second, first)
            };
            let replacement = self.replace_group(winner, loser)?;
            debug!(%winner, %loser, %replacement, "Group conflict resolved");
            records.push(ConflictRecord {
                winner,
                loser,
                replacement,
            });
        }
        Ok(records)
    }

    fn mark_enemies(&mut self, first: GroupId, second: GroupId) -> Result<(), RegistryError> {
        for (group_id, enemy) in [(first, second), (second, first)] {
            let group = self
                .registry
                .group_mut(group_id)
                .ok_or(RegistryError::UnknownGroup { group_id })?;
            group.fought = true;
            group.enemy = Some(enemy);
        }
        Ok(())
    }

    /// Decide a fight between two groups. Returns `true` if `first` wins.
    ///
    /// The first group wins with probability `F1 / (F1 + F2)` of the
    /// groups' average fitness, or 1/2 when the sum is not positive. In
    /// deterministic mode the fitter group wins, ties going to `first`.
    pub fn fight(&mut self, first: GroupId, second: GroupId) -> Result<bool, RegistryError> {
        let f1 = self.average_fitness(first)?;
        let f2 = self.average_fitness(second)?;
        Ok(match self.mode {
            Mode::Randomized => {
                let sum = f1 + f2;
                let p = if sum > 0.0 { f1 / sum } else { 0.5 };
                random::bernoulli(&mut self.rng, p)
            }
            Mode::Deterministic => f1 >= f2,
        })
    }

    fn average_fitness(&self, group_id: GroupId) -> Result<f64, RegistryError> {
        self.registry
            .group(group_id)
            .map(|group| group.average_fitness)
            .ok_or(RegistryError::UnknownGroup { group_id })
    }

    /// Destroy `loser` and create a new group holding one fresh agent per
    /// member of `winner`, with the same strategy, fitness and propensity.
    /// The winner is left unchanged. Returns the new group's ID.
    pub fn replace_group(
        &mut self,
        winner: GroupId,
        loser: GroupId,
    ) -> Result<GroupId, RegistryError> {
        let template: Vec<(Strategy, f64, f64)> = self
            .registry
            .member_agents(winner)?
            .into_iter()
            .map(|agent| (agent.strategy(), agent.fitness, agent.pi))
            .collect();
        self.registry.dissolve_group(loser)?;
        let replacement = self.registry.create_group()?;
        for (strategy, fitness, pi) in template {
            self.registry.spawn(replacement, strategy, fitness, pi)?;
        }
        Ok(replacement)
    }

    // -----------------------------------------------------------------------
    // Migration
    // -----------------------------------------------------------------------

    /// Pair all agents and let pairs from different groups swap with the
    /// migration probability. Returns the number of swaps.
    pub fn recombine_groups(&mut self) -> Result<usize, SimulationError> {
        let pairs = random::shuffle_and_pair(self.registry.agent_ids(), self.mode, &mut self.rng);
        let mut swaps: usize = 0;
        for (a, b) in pairs {
            self.set_partner(a, b)?;
            self.set_partner(b, a)?;
            if self.registry.group_of(a) == self.registry.group_of(b) {
                continue;
            }
            if !random::gate(&mut self.rng, self.mode, self.config.probabilities.migration) {
                continue;
            }
            self.swap_agents(a, b)?;
            swaps = swaps.saturating_add(1);
        }
        Ok(swaps)
    }

    fn set_partner(&mut self, agent_id: AgentId, partner: AgentId) -> Result<(), RegistryError> {
        self.registry
            .agent_mut(agent_id)
            .ok_or(RegistryError::UnknownAgent { agent_id })?
            .migration_partner = Some(partner);
        Ok(())
    }

    /// Move two agents into each other's groups and flag both as migrated
    /// newcomers.
    pub fn swap_agents(&mut self, a: AgentId, b: AgentId) -> Result<(), RegistryError> {
        self.registry.swap_agents(a, b)?;
        for agent_id in [a, b] {
            let agent = self
                .registry
                .agent_mut(agent_id)
                .ok_or(RegistryError::UnknownAgent { agent_id })?;
            agent.migrated = true;
            agent.is_new_agent = true;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Decisions and payoffs
    // -----------------------------------------------------------------------

    /// Let every agent draw its detection probability, decide and be
    /// observed. Agents read their group's statistics from the previous
    /// cooperation round.
    pub fn step_agents(&mut self) -> Result<(), RegistryError> {
        let mut order = self.registry.agent_ids();
        random::shuffle_in_mode(&mut order, self.mode, &mut self.rng);
        for agent_id in order {
            let group_id = self
                .registry
                .group_of(agent_id)
                .ok_or(RegistryError::UnknownAgent { agent_id })?;
            let view = self
                .registry
                .group(group_id)
                .ok_or(RegistryError::UnknownGroup { group_id })?
                .view();
            self.registry
                .agent_mut(agent_id)
                .ok_or(RegistryError::UnknownAgent { agent_id })?
                .step(view, &self.params, &mut self.rng);
        }
        Ok(())
    }

    /// Run the cooperation accounting in every group. Returns the number
    /// of cooperators across the population.
    pub fn distribute(&mut self) -> Result<u64, RegistryError> {
        let mut order = self.registry.group_ids();
        random::shuffle_in_mode(&mut order, self.mode, &mut self.rng);
        let mut cooperators: u64 = 0;
        for group_id in order {
            let outcome = group::cooperate(&mut self.registry, group_id, &self.config.payoff)?;
            cooperators = cooperators.saturating_add(u64::from(outcome.num_cooperated));
        }
        Ok(cooperators)
    }
}
