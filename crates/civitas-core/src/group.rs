//! Groups and the group-level processes of a round.
//!
//! A [`Group`] is a member list plus the statistics of its last
//! cooperation round. Its member list and strategy tally can only be
//! changed by the [`Registry`], which keeps them in step with the
//! agent index.
//!
//! The processes here operate on a group through the registry:
//!
//! - [`cooperate`]: charge cooperators, share the public benefit among the
//!   reward-eligible members, smooth fitness
//! - [`cull`]: fitness-weighted death without replacement
//! - [`repopulate`]: fitness-weighted birth with replacement and mutation
//! - [`reproduce`]: cull followed by repopulate, preserving group size

use std::collections::BTreeSet;

use civitas_types::{AgentId, GroupId, Strategy, StrategyCounts};
use rand::Rng;

use crate::agent::{Agent, GroupView};
use crate::config::{PayoffConfig, survivors_per_group};
use crate::random::{self, StrategySampler};
use crate::registry::{Registry, RegistryError};

/// Weight of the previous value when smoothing an agent's fitness.
const FITNESS_MEMORY: f64 = 0.8;

/// A group of agents sharing a payoff pool.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    id: GroupId,
    members: Vec<AgentId>,
    counts: StrategyCounts,
    /// Members that cooperated in the last cooperation round.
    pub num_cooperated: u32,
    /// Benefit share each reward-eligible member received.
    pub average_benefit: f64,
    /// Mean member fitness after the last cooperation round.
    pub average_fitness: f64,
    /// Whether the group fought this round.
    pub fought: bool,
    /// The group fought this round.
    pub enemy: Option<GroupId>,
}

impl Group {
    pub(crate) const fn new(id: GroupId) -> Self {
        Self {
            id,
            members: Vec::new(),
            counts: StrategyCounts::new(),
            num_cooperated: 0,
            average_benefit: 0.0,
            average_fitness: 0.0,
            fought: false,
            enemy: None,
        }
    }

    /// This group's identifier.
    pub const fn id(&self) -> GroupId {
        self.id
    }

    /// Member IDs in list order.
    pub fn members(&self) -> &[AgentId] {
        &self.members
    }

    /// Strategy tally of the members.
    pub const fn counts(&self) -> &StrategyCounts {
        &self.counts
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the group has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// What a member reads about this group when deciding.
    pub fn view(&self) -> GroupView {
        GroupView {
            num_cooperated: self.num_cooperated,
            size: self.members.len(),
            average_benefit: self.average_benefit,
        }
    }

    /// Clear the per-round conflict bookkeeping.
    pub const fn reset_conflict(&mut self) {
        self.fought = false;
        self.enemy = None;
    }

    pub(crate) fn push_member(&mut self, agent_id: AgentId, strategy: Strategy) {
        self.members.push(agent_id);
        self.counts.increment(strategy);
    }

    pub(crate) fn remove_member(&mut self, agent_id: AgentId, strategy: Strategy) -> bool {
        let Some(position) = self.members.iter().position(|&m| m == agent_id) else {
            return false;
        };
        self.members.remove(position);
        self.counts.decrement(strategy)
    }

    pub(crate) fn replace_members(&mut self, members: Vec<AgentId>, counts: StrategyCounts) {
        self.members = members;
        self.counts = counts;
    }
}

// ---------------------------------------------------------------------------
// Cooperation
// ---------------------------------------------------------------------------

/// Result of one group's cooperation round.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CooperationOutcome {
    /// Members that cooperated.
    pub num_cooperated: u32,
    /// Members that received the benefit share.
    pub rewarded: usize,
    /// Defectors that were observed and excluded.
    pub caught: usize,
    /// Benefit share handed to each rewarded member.
    pub average_benefit: f64,
}

/// Run the cooperation accounting for one group.
///
/// Cooperators pay the cost and are rewarded; unobserved defectors are
/// rewarded; observed defectors are excluded. The benefit pool
/// `num_cooperated * benefit` is split evenly among the rewarded members.
/// Afterwards every member's smoothed fitness is updated and the group's
/// average fitness is recorded.
#[allow(clippy::cast_precision_loss)]
pub fn cooperate(
    registry: &mut Registry,
    group_id: GroupId,
    payoff: &PayoffConfig,
) -> Result<CooperationOutcome, RegistryError> {
    let members = registry.members_of(group_id)?.to_vec();

    let mut num_cooperated: u32 = 0;
    let mut rewarded = Vec::with_capacity(members.len());
    let mut caught: usize = 0;
    for &agent_id in &members {
        let agent = member_mut(registry, agent_id)?;
        if agent.cooperates {
            agent.fitness -= payoff.cost;
            num_cooperated = num_cooperated.saturating_add(1);
            rewarded.push(agent_id);
        } else if agent.observed {
            caught = caught.saturating_add(1);
        } else {
            rewarded.push(agent_id);
        }
    }

    let average_benefit = if rewarded.is_empty() {
        0.0
    } else {
        f64::from(num_cooperated) * payoff.benefit / rewarded.len() as f64
    };
    for &agent_id in &rewarded {
        member_mut(registry, agent_id)?.fitness += average_benefit;
    }

    let mut total_fitness = 0.0;
    for &agent_id in &members {
        let agent = member_mut(registry, agent_id)?;
        agent.avg_fitness =
            FITNESS_MEMORY.mul_add(agent.avg_fitness, (1.0 - FITNESS_MEMORY) * agent.fitness);
        total_fitness += agent.fitness;
    }

    let group = registry
        .group_mut(group_id)
        .ok_or(RegistryError::UnknownGroup { group_id })?;
    group.num_cooperated = num_cooperated;
    group.average_benefit = average_benefit;
    group.average_fitness = if members.is_empty() {
        0.0
    } else {
        total_fitness / members.len() as f64
    };

    Ok(CooperationOutcome {
        num_cooperated,
        rewarded: rewarded.len(),
        caught,
        average_benefit,
    })
}

fn member_mut(registry: &mut Registry, agent_id: AgentId) -> Result<&mut Agent, RegistryError> {
    registry
        .agent_mut(agent_id)
        .ok_or(RegistryError::UnknownAgent { agent_id })
}

// ---------------------------------------------------------------------------
// Death and birth
// ---------------------------------------------------------------------------

/// Parameters of the birth step.
#[derive(Debug, Clone, Copy)]
pub struct BirthParams<'a> {
    /// Probability a newborn's strategy is redrawn.
    pub mutation: f64,
    /// Standard deviation of the noise on the inherited propensity.
    pub offspring_pi_sd: f64,
    /// Distribution mutant strategies are drawn from.
    pub mutation_sampler: &'a StrategySampler,
}

/// Deaths and births of one group's reproduction step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReproductionOutcome {
    /// Members removed by the death step.
    pub deaths: usize,
    /// Newborns added by the birth step.
    pub births: usize,
    /// Newborns whose strategy mutated.
    pub mutations: usize,
}

/// Remove all but `floor(n * survival)` members, keeping survivors by
/// fitness-weighted sampling without replacement. Returns the number of
/// deaths.
pub fn cull(
    registry: &mut Registry,
    group_id: GroupId,
    survival: f64,
    rng: &mut impl Rng,
) -> Result<usize, RegistryError> {
    let (ids, fitness): (Vec<AgentId>, Vec<f64>) = registry
        .member_agents(group_id)?
        .into_iter()
        .map(|agent| (agent.id(), agent.fitness))
        .unzip();
    let keep = survivors_per_group(ids.len(), survival);
    let weights = random::fitness_weights(&fitness);
    let survivors: BTreeSet<AgentId> = random::sample_without_replacement(rng, &weights, keep)
        .into_iter()
        .filter_map(|i| ids.get(i).copied())
        .collect();
    let removed = registry.retain_members(group_id, &survivors)?;
    Ok(removed.len())
}

/// Add `births` newborns to a group. Parents are drawn with replacement
/// weighted by fitness; each child inherits (or, with the mutation
/// probability, redraws) the parent's strategy, starts with the parent's
/// fitness and a perturbed copy of the parent's propensity. Returns the
/// number of mutants and the newborn IDs.
pub fn repopulate(
    registry: &mut Registry,
    group_id: GroupId,
    births: usize,
    params: &BirthParams<'_>,
    rng: &mut impl Rng,
) -> Result<(usize, Vec<AgentId>), RegistryError> {
    if births == 0 {
        return Ok((0, Vec::new()));
    }
    let parents: Vec<(Strategy, f64, f64)> = registry
        .member_agents(group_id)?
        .into_iter()
        .map(|agent| (agent.strategy(), agent.fitness, agent.pi))
        .collect();
    if parents.is_empty() {
        return Err(RegistryError::Invariant {
            reason: format!("{group_id} has no members left to reproduce"),
        });
    }

    let fitness: Vec<f64> = parents.iter().map(|&(_, f, _)| f).collect();
    let weights = random::fitness_weights(&fitness);
    let picks = random::sample_with_replacement(rng, &weights, births);

    let mut mutations: usize = 0;
    let mut newborns = Vec::with_capacity(births);
    for pick in picks {
        let Some(&(parent_strategy, parent_fitness, parent_pi)) = parents.get(pick) else {
            continue;
        };
        let strategy = if random::bernoulli(rng, params.mutation) {
            mutations = mutations.saturating_add(1);
            params.mutation_sampler.sample(rng)
        } else {
            parent_strategy
        };
        let pi = random::gaussian(rng, parent_pi, params.offspring_pi_sd);
        newborns.push(registry.spawn(group_id, strategy, parent_fitness, pi)?);
    }
    Ok((mutations, newborns))
}

/// Run death then birth on one group. The group ends the step with the
/// size it started with.
pub fn reproduce(
    registry: &mut Registry,
    group_id: GroupId,
    survival: f64,
    params: &BirthParams<'_>,
    rng: &mut impl Rng,
) -> Result<ReproductionOutcome, RegistryError> {
    let deaths = cull(registry, group_id, survival, rng)?;
    let (mutations, newborns) = repopulate(registry, group_id, deaths, params, rng)?;
    Ok(ReproductionOutcome {
        deaths,
        births: newborns.len(),
        mutations,
    })
}
