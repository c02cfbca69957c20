//! Enumeration types for the Civitas simulation.

use serde::{Deserialize, Serialize};

/// Number of distinct [`Strategy`] variants.
pub const STRATEGY_COUNT: usize = 7;

/// An agent's behavioral type.
///
/// The strategy is fixed for the agent's lifetime and is passed to
/// offspring, possibly altered by mutation. The first four variants have
/// hard-wired decision rules; the last three are learners that carry a
/// propensity scalar and decide through a shared threshold rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Defects unless a mistake flips the decision.
    Miscreant,
    /// Cooperates only when cooperating beats the expected value of
    /// defecting under the current detection probability.
    Deceiver,
    /// Follows the group norm: cooperates like a saint when enough of the
    /// group cooperated last round, otherwise behaves like a deceiver.
    Citizen,
    /// Cooperates unless a mistake flips the decision.
    Saint,
    /// Learner that moves its propensity toward the group norm.
    Civic,
    /// Learner that follows its own fitness gradient.
    Selfish,
    /// Learner whose propensity never changes.
    Static,
}

impl Strategy {
    /// Every strategy in declaration order.
    pub const ALL: [Self; STRATEGY_COUNT] = [
        Self::Miscreant,
        Self::Deceiver,
        Self::Citizen,
        Self::Saint,
        Self::Civic,
        Self::Selfish,
        Self::Static,
    ];

    /// Position of this strategy in [`Strategy::ALL`].
    pub const fn index(self) -> usize {
        match self {
            Self::Miscreant => 0,
            Self::Deceiver => 1,
            Self::Citizen => 2,
            Self::Saint => 3,
            Self::Civic => 4,
            Self::Selfish => 5,
            Self::Static => 6,
        }
    }

    /// Three-letter label used in the composition log line.
    pub const fn abbreviation(self) -> &'static str {
        match self {
            Self::Miscreant => "mis",
            Self::Deceiver => "dec",
            Self::Citizen => "cit",
            Self::Saint => "sai",
            Self::Civic => "civ",
            Self::Selfish => "sel",
            Self::Static => "sta",
        }
    }
}

impl core::fmt::Display for Strategy {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::Miscreant => "miscreant",
            Self::Deceiver => "deceiver",
            Self::Citizen => "citizen",
            Self::Saint => "saint",
            Self::Civic => "civic",
            Self::Selfish => "selfish",
            Self::Static => "static",
        };
        f.write_str(name)
    }
}

/// Tally of agents per [`Strategy`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyCounts([u32; STRATEGY_COUNT]);

impl StrategyCounts {
    /// An all-zero tally.
    pub const fn new() -> Self {
        Self([0; STRATEGY_COUNT])
    }

    /// Count the strategies yielded by an iterator.
    pub fn tally(strategies: impl IntoIterator<Item = Strategy>) -> Self {
        let mut counts = Self::new();
        for strategy in strategies {
            counts.increment(strategy);
        }
        counts
    }

    /// Number of agents following `strategy`.
    pub fn get(&self, strategy: Strategy) -> u32 {
        self.0.get(strategy.index()).copied().unwrap_or(0)
    }

    /// Add one agent of `strategy`.
    pub fn increment(&mut self, strategy: Strategy) {
        if let Some(slot) = self.0.get_mut(strategy.index()) {
            *slot = slot.saturating_add(1);
        }
    }

    /// Remove one agent of `strategy`.
    ///
    /// Returns `false` (and leaves the tally unchanged) if the count was
    /// already zero.
    pub fn decrement(&mut self, strategy: Strategy) -> bool {
        match self.0.get_mut(strategy.index()) {
            Some(slot) if *slot > 0 => {
                *slot = slot.saturating_sub(1);
                true
            }
            _ => false,
        }
    }

    /// Sum over all strategies.
    pub fn total(&self) -> u64 {
        self.0.iter().map(|&c| u64::from(c)).sum()
    }

    /// Add another tally into this one.
    pub fn merge(&mut self, other: &Self) {
        for (slot, add) in self.0.iter_mut().zip(other.0.iter()) {
            *slot = slot.saturating_add(*add);
        }
    }

    /// Iterate `(strategy, count)` pairs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (Strategy, u32)> + '_ {
        Strategy::ALL.into_iter().zip(self.0.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_matches_all_order() {
        for (i, strategy) in Strategy::ALL.iter().enumerate() {
            assert_eq!(strategy.index(), i);
        }
    }

    #[test]
    fn abbreviations_are_distinct() {
        let labels: std::collections::BTreeSet<&str> =
            Strategy::ALL.into_iter().map(Strategy::abbreviation).collect();
        assert_eq!(labels.len(), Strategy::ALL.len());
        assert_eq!(Strategy::Selfish.abbreviation(), "sel");
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&Strategy::Miscreant).ok();
        assert_eq!(json.as_deref(), Some("\"miscreant\""));
    }

    #[test]
    fn counts_track_increments_and_decrements() {
        let mut counts = StrategyCounts::tally([Strategy::Saint, Strategy::Saint, Strategy::Civic]);
        assert_eq!(counts.get(Strategy::Saint), 2);
        assert_eq!(counts.total(), 3);
        assert!(counts.decrement(Strategy::Civic));
        assert!(!counts.decrement(Strategy::Civic));
        assert_eq!(counts.get(Strategy::Civic), 0);
        assert_eq!(counts.total(), 2);
    }

    #[test]
    fn merge_adds_per_strategy() {
        let mut a = StrategyCounts::tally([Strategy::Deceiver]);
        let b = StrategyCounts::tally([Strategy::Deceiver, Strategy::Static]);
        a.merge(&b);
        assert_eq!(a.get(Strategy::Deceiver), 2);
        assert_eq!(a.get(Strategy::Static), 1);
    }
}
