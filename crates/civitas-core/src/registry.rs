//! Membership registry: the single owner of agents, groups and the two
//! indexes that link them.
//!
//! The agent-to-group index and each group's member list must always agree,
//! and each group's strategy tally must equal the live count of its
//! members. Every structural change therefore goes through one of the
//! operations here (spawn, remove, retain, dissolve, swap), each of which
//! updates both sides at once. [`Registry::check_invariants`] verifies the
//! whole structure and runs after every round in debug builds.
//!
//! Agents and groups are keyed by monotonic IDs in `BTreeMap`s, so
//! iteration order is creation order and seeded runs are reproducible.

use std::collections::{BTreeMap, BTreeSet};

use civitas_types::{AgentId, GroupId, Strategy, StrategyCounts};

use crate::agent::Agent;
use crate::group::Group;

/// Errors raised by membership operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The agent is not registered.
    #[error("unknown agent {agent_id}")]
    UnknownAgent {
        /// The missing agent.
        agent_id: AgentId,
    },

    /// The group is not registered.
    #[error("unknown group {group_id}")]
    UnknownGroup {
        /// The missing group.
        group_id: GroupId,
    },

    /// The ID counter overflowed.
    #[error("identifier space exhausted")]
    IdsExhausted,

    /// The indexes disagree with each other.
    #[error("membership invariant violated: {reason}")]
    Invariant {
        /// Description of the disagreement.
        reason: String,
    },
}

/// Owner of every agent and group in a population.
#[derive(Debug, Clone)]
pub struct Registry {
    agents: BTreeMap<AgentId, Agent>,
    membership: BTreeMap<AgentId, GroupId>,
    groups: BTreeMap<GroupId, Group>,
    next_agent: AgentId,
    next_group: GroupId,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// An empty registry.
    pub const fn new() -> Self {
        Self {
            agents: BTreeMap::new(),
            membership: BTreeMap::new(),
            groups: BTreeMap::new(),
            next_agent: AgentId::FIRST,
            next_group: GroupId::FIRST,
        }
    }

    // -----------------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------------

    /// Number of living agents.
    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    /// Number of groups.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Look up an agent.
    pub fn agent(&self, agent_id: AgentId) -> Option<&Agent> {
        self.agents.get(&agent_id)
    }

    /// Look up an agent for mutation of its round state.
    pub fn agent_mut(&mut self, agent_id: AgentId) -> Option<&mut Agent> {
        self.agents.get_mut(&agent_id)
    }

    /// Look up a group.
    pub fn group(&self, group_id: GroupId) -> Option<&Group> {
        self.groups.get(&group_id)
    }

    /// Look up a group for mutation of its round state.
    pub fn group_mut(&mut self, group_id: GroupId) -> Option<&mut Group> {
        self.groups.get_mut(&group_id)
    }

    /// The group an agent belongs to.
    pub fn group_of(&self, agent_id: AgentId) -> Option<GroupId> {
        self.membership.get(&agent_id).copied()
    }

    /// All agents in ID order.
    pub fn agents(&self) -> impl Iterator<Item = &Agent> {
        self.agents.values()
    }

    /// All groups in ID order.
    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.values()
    }

    /// All agents in ID order, mutably.
    pub fn agents_mut(&mut self) -> impl Iterator<Item = &mut Agent> {
        self.agents.values_mut()
    }

    /// Snapshot of every agent ID in ID order.
    pub fn agent_ids(&self) -> Vec<AgentId> {
        self.agents.keys().copied().collect()
    }

    /// Snapshot of every group ID in ID order.
    pub fn group_ids(&self) -> Vec<GroupId> {
        self.groups.keys().copied().collect()
    }

    /// A group's member list.
    pub fn members_of(&self, group_id: GroupId) -> Result<&[AgentId], RegistryError> {
        self.groups
            .get(&group_id)
            .map(Group::members)
            .ok_or(RegistryError::UnknownGroup { group_id })
    }

    /// A group's members in member-list order.
    pub fn member_agents(&self, group_id: GroupId) -> Result<Vec<&Agent>, RegistryError> {
        self.members_of(group_id)?
            .iter()
            .map(|&agent_id| {
                self.agents
                    .get(&agent_id)
                    .ok_or(RegistryError::UnknownAgent { agent_id })
            })
            .collect()
    }

    /// Population-wide strategy tally.
    pub fn strategy_totals(&self) -> StrategyCounts {
        let mut totals = StrategyCounts::new();
        for group in self.groups.values() {
            totals.merge(group.counts());
        }
        totals
    }

    // -----------------------------------------------------------------------
    // Structural operations
    // -----------------------------------------------------------------------

    /// Create an empty group with a fresh ID.
    pub fn create_group(&mut self) -> Result<GroupId, RegistryError> {
        let group_id = self.next_group;
        self.next_group = group_id.next().ok_or(RegistryError::IdsExhausted)?;
        self.groups.insert(group_id, Group::new(group_id));
        Ok(group_id)
    }

    /// Create an agent with a fresh ID and add it to `group_id`.
    pub fn spawn(
        &mut self,
        group_id: GroupId,
        strategy: Strategy,
        fitness: f64,
        pi: f64,
    ) -> Result<AgentId, RegistryError> {
        let group = self
            .groups
            .get_mut(&group_id)
            .ok_or(RegistryError::UnknownGroup { group_id })?;
        let agent_id = self.next_agent;
        self.next_agent = agent_id.next().ok_or(RegistryError::IdsExhausted)?;

        group.push_member(agent_id, strategy);
        self.membership.insert(agent_id, group_id);
        self.agents
            .insert(agent_id, Agent::new(agent_id, strategy, fitness, pi));
        Ok(agent_id)
    }

    /// Remove one agent from its group and from the registry.
    pub fn remove_agent(&mut self, agent_id: AgentId) -> Result<Agent, RegistryError> {
        let group_id = self
            .membership
            .remove(&agent_id)
            .ok_or(RegistryError::UnknownAgent { agent_id })?;
        let agent = self
            .agents
            .remove(&agent_id)
            .ok_or(RegistryError::UnknownAgent { agent_id })?;
        let group = self
            .groups
            .get_mut(&group_id)
            .ok_or(RegistryError::UnknownGroup { group_id })?;
        if !group.remove_member(agent_id, agent.strategy()) {
            return Err(RegistryError::Invariant {
                reason: format!("{agent_id} indexed under {group_id} but not a member"),
            });
        }
        Ok(agent)
    }

    /// Keep only the members of `group_id` listed in `survivors`, removing
    /// the rest from the registry. Member order is preserved and the
    /// strategy tally is recomputed from the survivors. Returns the removed
    /// agents.
    pub fn retain_members(
        &mut self,
        group_id: GroupId,
        survivors: &BTreeSet<AgentId>,
    ) -> Result<Vec<Agent>, RegistryError> {
        let group = self
            .groups
            .get_mut(&group_id)
            .ok_or(RegistryError::UnknownGroup { group_id })?;
        let (kept, dropped): (Vec<AgentId>, Vec<AgentId>) = group
            .members()
            .iter()
            .partition(|&&agent_id| survivors.contains(&agent_id));

        let mut removed = Vec::with_capacity(dropped.len());
        for agent_id in dropped {
            self.membership.remove(&agent_id);
            let agent = self
                .agents
                .remove(&agent_id)
                .ok_or(RegistryError::UnknownAgent { agent_id })?;
            removed.push(agent);
        }

        let counts = StrategyCounts::tally(
            kept.iter()
                .filter_map(|id| self.agents.get(id))
                .map(Agent::strategy),
        );
        group.replace_members(kept, counts);
        Ok(removed)
    }

    /// Remove a group and every one of its members. Returns the removed
    /// agents in member order.
    pub fn dissolve_group(&mut self, group_id: GroupId) -> Result<Vec<Agent>, RegistryError> {
        let group = self
            .groups
            .remove(&group_id)
            .ok_or(RegistryError::UnknownGroup { group_id })?;
        group
            .members()
            .iter()
            .map(|&agent_id| {
                self.membership.remove(&agent_id);
                self.agents
                    .remove(&agent_id)
                    .ok_or(RegistryError::UnknownAgent { agent_id })
            })
            .collect()
    }

    /// Exchange the groups of two agents. Each agent leaves its member list
    /// and is appended to the other's. Agents already sharing a group are
    /// left alone.
    pub fn swap_agents(&mut self, a: AgentId, b: AgentId) -> Result<(), RegistryError> {
        let group_a = self
            .group_of(a)
            .ok_or(RegistryError::UnknownAgent { agent_id: a })?;
        let group_b = self
            .group_of(b)
            .ok_or(RegistryError::UnknownAgent { agent_id: b })?;
        if group_a == group_b {
            return Ok(());
        }
        let strategy_a = self
            .agents
            .get(&a)
            .map(Agent::strategy)
            .ok_or(RegistryError::UnknownAgent { agent_id: a })?;
        let strategy_b = self
            .agents
            .get(&b)
            .map(Agent::strategy)
            .ok_or(RegistryError::UnknownAgent { agent_id: b })?;

        self.move_member(group_a, a, strategy_a, b, strategy_b)?;
        self.move_member(group_b, b, strategy_b, a, strategy_a)?;
        self.membership.insert(a, group_b);
        self.membership.insert(b, group_a);
        Ok(())
    }

    fn move_member(
        &mut self,
        group_id: GroupId,
        leaving: AgentId,
        leaving_strategy: Strategy,
        arriving: AgentId,
        arriving_strategy: Strategy,
    ) -> Result<(), RegistryError> {
        let group = self
            .groups
            .get_mut(&group_id)
            .ok_or(RegistryError::UnknownGroup { group_id })?;
        if !group.remove_member(leaving, leaving_strategy) {
            return Err(RegistryError::Invariant {
                reason: format!("{leaving} indexed under {group_id} but not a member"),
            });
        }
        group.push_member(arriving, arriving_strategy);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Invariants
    // -----------------------------------------------------------------------

    /// Verify that both indexes and every strategy tally agree.
    pub fn check_invariants(&self) -> Result<(), RegistryError> {
        if self.membership.len() != self.agents.len() {
            return Err(RegistryError::Invariant {
                reason: format!(
                    "{} agents but {} index entries",
                    self.agents.len(),
                    self.membership.len()
                ),
            });
        }

        let mut seen = BTreeSet::new();
        for (&group_id, group) in &self.groups {
            let mut live = StrategyCounts::new();
            for &agent_id in group.members() {
                if !seen.insert(agent_id) {
                    return Err(RegistryError::Invariant {
                        reason: format!("{agent_id} listed more than once"),
                    });
                }
                if self.membership.get(&agent_id) != Some(&group_id) {
                    return Err(RegistryError::Invariant {
                        reason: format!("{agent_id} listed in {group_id} but indexed elsewhere"),
                    });
                }
                let agent = self
                    .agents
                    .get(&agent_id)
                    .ok_or(RegistryError::UnknownAgent { agent_id })?;
                live.increment(agent.strategy());
            }
            if live != *group.counts() {
                return Err(RegistryError::Invariant {
                    reason: format!("{group_id} strategy tally out of date"),
                });
            }
        }

        if seen.len() != self.agents.len() {
            return Err(RegistryError::Invariant {
                reason: format!(
                    "{} agents but {} group memberships",
                    self.agents.len(),
                    seen.len()
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn two_groups() -> (Registry, GroupId, GroupId) {
        let mut registry = Registry::new();
        let g0 = registry.create_group().unwrap();
        let g1 = registry.create_group().unwrap();
        for strategy in [Strategy::Saint, Strategy::Miscreant, Strategy::Saint] {
            registry.spawn(g0, strategy, 3.0, 0.0).unwrap();
        }
        for strategy in [Strategy::Deceiver, Strategy::Citizen] {
            registry.spawn(g1, strategy, 3.0, 0.0).unwrap();
        }
        (registry, g0, g1)
    }

    #[test]
    fn spawn_updates_both_indexes() {
        let (registry, g0, g1) = two_groups();
        assert_eq!(registry.agent_count(), 5);
        assert_eq!(registry.members_of(g0).unwrap().len(), 3);
        assert_eq!(registry.group_of(AgentId::new(3)), Some(g1));
        assert_eq!(
            registry.group(g0).unwrap().counts().get(Strategy::Saint),
            2
        );
        assert!(registry.check_invariants().is_ok());
    }

    #[test]
    fn spawn_into_unknown_group_fails() {
        let mut registry = Registry::new();
        let result = registry.spawn(GroupId::new(9), Strategy::Saint, 3.0, 0.0);
        assert!(matches!(result, Err(RegistryError::UnknownGroup { .. })));
        assert_eq!(registry.agent_count(), 0);
    }

    #[test]
    fn ids_are_never_reused() {
        let (mut registry, g0, _) = two_groups();
        registry.remove_agent(AgentId::new(4)).unwrap();
        let fresh = registry.spawn(g0, Strategy::Civic, 3.0, 0.0).unwrap();
        assert_eq!(fresh, AgentId::new(5));
    }

    #[test]
    fn remove_agent_updates_counts() {
        let (mut registry, g0, _) = two_groups();
        let removed = registry.remove_agent(AgentId::new(1)).unwrap();
        assert_eq!(removed.strategy(), Strategy::Miscreant);
        assert_eq!(registry.group(g0).unwrap().counts().get(Strategy::Miscreant), 0);
        assert_eq!(registry.group_of(AgentId::new(1)), None);
        assert!(registry.check_invariants().is_ok());
    }

    #[test]
    fn retain_members_recounts_and_keeps_order() {
        let (mut registry, g0, _) = two_groups();
        let survivors: BTreeSet<AgentId> = [AgentId::new(2), AgentId::new(0)].into_iter().collect();
        let removed = registry.retain_members(g0, &survivors).unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(
            registry.members_of(g0).unwrap(),
            &[AgentId::new(0), AgentId::new(2)]
        );
        assert_eq!(registry.group(g0).unwrap().counts().total(), 2);
        assert!(registry.check_invariants().is_ok());
    }

    #[test]
    fn dissolve_removes_all_members() {
        let (mut registry, g0, g1) = two_groups();
        let removed = registry.dissolve_group(g0).unwrap();
        assert_eq!(removed.len(), 3);
        assert!(registry.group(g0).is_none());
        assert_eq!(registry.agent_count(), 2);
        assert_eq!(registry.group_ids(), vec![g1]);
        assert!(registry.check_invariants().is_ok());
    }

    #[test]
    fn swap_is_symmetric() {
        let (mut registry, g0, g1) = two_groups();
        let a = AgentId::new(1);
        let b = AgentId::new(3);
        registry.swap_agents(a, b).unwrap();

        assert_eq!(registry.group_of(a), Some(g1));
        assert_eq!(registry.group_of(b), Some(g0));
        assert_eq!(registry.members_of(g0).unwrap().last(), Some(&b));
        assert_eq!(registry.members_of(g1).unwrap().last(), Some(&a));
        assert_eq!(registry.group(g0).unwrap().counts().get(Strategy::Deceiver), 1);
        assert_eq!(registry.group(g1).unwrap().counts().get(Strategy::Miscreant), 1);
        assert_eq!(registry.members_of(g0).unwrap().len(), 3);
        assert_eq!(registry.members_of(g1).unwrap().len(), 2);
        assert!(registry.check_invariants().is_ok());
    }

    #[test]
    fn swap_within_group_is_noop() {
        let (mut registry, g0, _) = two_groups();
        let before = registry.members_of(g0).unwrap().to_vec();
        registry.swap_agents(AgentId::new(0), AgentId::new(2)).unwrap();
        assert_eq!(registry.members_of(g0).unwrap(), before.as_slice());
    }

    #[test]
    fn strategy_totals_sum_groups() {
        let (registry, _, _) = two_groups();
        let totals = registry.strategy_totals();
        assert_eq!(totals.total(), 5);
        assert_eq!(totals.get(Strategy::Saint), 2);
        assert_eq!(totals.get(Strategy::Citizen), 1);
    }
}
