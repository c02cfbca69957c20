//! Configuration loading and typed config structures for the Civitas
//! simulation.
//!
//! The canonical configuration lives in `civitas-config.yaml` at the project
//! root. This module defines strongly-typed structs that mirror the YAML
//! structure, a loader that reads the file, and [`SimulationConfig::validate`]
//! which rejects parameter sets the engine cannot run. A validated config is
//! never mutated by the engine.

use std::collections::BTreeMap;
use std::path::Path;

use civitas_types::Strategy;
use serde::Deserialize;

/// Relative weight of each strategy, normalized on use.
pub type StrategyMix = BTreeMap<Strategy, f64>;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A parameter has a value the engine cannot run with.
    #[error("invalid value for {field}: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level simulation configuration.
///
/// Mirrors the structure of `civitas-config.yaml`. All fields have defaults
/// so an empty file describes the baseline experiment: 20 groups of 100
/// agents, an even mix of the four fixed strategies.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SimulationConfig {
    /// Run identity, seed and length.
    #[serde(default)]
    pub run: RunConfig,

    /// Population size and initial composition.
    #[serde(default)]
    pub population: PopulationConfig,

    /// Cooperation game payoffs.
    #[serde(default)]
    pub payoff: PayoffConfig,

    /// Event probabilities.
    #[serde(default)]
    pub probabilities: ProbabilityConfig,

    /// Learner parameters.
    #[serde(default)]
    pub learning: LearningConfig,

    /// Early-termination controller.
    #[serde(default)]
    pub termination: TerminationConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SimulationConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// The result is not validated; call [`validate`](Self::validate)
    /// before building a population from it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_yml::from_str(&contents)?;
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yml::from_str(yaml)?;
        Ok(config)
    }

    /// Check every parameter against the ranges the engine supports.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.population.validate(self.run.randomized)?;
        self.payoff.validate()?;
        self.probabilities.validate()?;
        self.learning.validate()?;
        self.termination.validate()?;
        self.logging.validate()?;

        let survivors = survivors_per_group(
            self.population.agents_per_group,
            self.probabilities.survival,
        );
        if survivors == 0 {
            return Err(ConfigError::Invalid {
                field: "probabilities.survival",
                reason: format!(
                    "no agent of a {}-member group would survive",
                    self.population.agents_per_group
                ),
            });
        }
        Ok(())
    }
}

/// Number of agents that survive the death step in a group of `size`.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn survivors_per_group(size: usize, survival: f64) -> usize {
    let kept = (size as f64 * survival).floor();
    if kept.is_finite() && kept > 0.0 {
        (kept as usize).min(size)
    } else {
        0
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Run identity and length.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RunConfig {
    /// Label attached to every log line of the run.
    #[serde(default = "default_run_id")]
    pub run_id: String,

    /// Seed of the single random source driving the run.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Number of rounds to execute.
    #[serde(default = "default_rounds")]
    pub rounds: u64,

    /// Draw decisions, pairings and fights at random. When `false`, every
    /// decision takes its default, pairings keep index order and every
    /// paired fight and migration happens.
    #[serde(default = "default_true")]
    pub randomized: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            run_id: default_run_id(),
            seed: default_seed(),
            rounds: default_rounds(),
            randomized: default_true(),
        }
    }
}

/// Population size and initial composition.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PopulationConfig {
    /// Members per group; group sizes are preserved by every round.
    #[serde(default = "default_agents_per_group")]
    pub agents_per_group: usize,

    /// Number of groups; the count is preserved by every round.
    #[serde(default = "default_group_count")]
    pub group_count: usize,

    /// Initial strategy weights.
    #[serde(default = "default_strategy_mix")]
    pub strategy_mix: StrategyMix,

    /// Weights used when a newborn mutates. Defaults to `strategy_mix`.
    #[serde(default)]
    pub mutation_mix: Option<StrategyMix>,

    /// Seed the first group with alternating citizens and saints.
    #[serde(default)]
    pub saintly_group: bool,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            agents_per_group: default_agents_per_group(),
            group_count: default_group_count(),
            strategy_mix: default_strategy_mix(),
            mutation_mix: None,
            saintly_group: false,
        }
    }
}

impl PopulationConfig {
    /// Total number of agents in the population.
    pub const fn total_agents(&self) -> usize {
        self.agents_per_group.saturating_mul(self.group_count)
    }

    /// The distribution newborn mutants are drawn from.
    pub fn effective_mutation_mix(&self) -> &StrategyMix {
        self.mutation_mix.as_ref().unwrap_or(&self.strategy_mix)
    }

    /// Per-group agent count of each strategy for deterministic seeding.
    ///
    /// Each strategy receives `round(weight * agents_per_group)` agents,
    /// in declaration order.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the quotas do not add up to
    /// `agents_per_group`.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn group_quotas(&self) -> Result<Vec<(Strategy, usize)>, ConfigError> {
        let size = self.agents_per_group as f64;
        let quotas: Vec<(Strategy, usize)> = self
            .strategy_mix
            .iter()
            .map(|(&strategy, &weight)| (strategy, (weight * size).round().max(0.0) as usize))
            .filter(|&(_, count)| count > 0)
            .collect();
        let total: usize = quotas.iter().map(|&(_, count)| count).sum();
        if total != self.agents_per_group {
            return Err(ConfigError::Invalid {
                field: "population.strategy_mix",
                reason: format!(
                    "rounded quotas sum to {total}, expected {}",
                    self.agents_per_group
                ),
            });
        }
        Ok(quotas)
    }

    fn validate(&self, randomized: bool) -> Result<(), ConfigError> {
        if self.agents_per_group == 0 {
            return Err(ConfigError::Invalid {
                field: "population.agents_per_group",
                reason: "must be at least 1".to_owned(),
            });
        }
        if self.group_count == 0 {
            return Err(ConfigError::Invalid {
                field: "population.group_count",
                reason: "must be at least 1".to_owned(),
            });
        }
        validate_mix("population.strategy_mix", &self.strategy_mix)?;
        if let Some(mix) = &self.mutation_mix {
            validate_mix("population.mutation_mix", mix)?;
        }
        if !randomized {
            self.group_quotas()?;
        }
        Ok(())
    }
}

/// Cooperation game payoffs.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PayoffConfig {
    /// Public benefit produced by each cooperator, shared among the
    /// reward-eligible members of the group.
    #[serde(default = "default_benefit")]
    pub benefit: f64,

    /// Private cost paid by each cooperator.
    #[serde(default = "default_cost")]
    pub cost: f64,

    /// Fitness every agent starts each round with.
    #[serde(default = "default_base_fitness")]
    pub base_fitness: f64,
}

impl Default for PayoffConfig {
    fn default() -> Self {
        Self {
            benefit: default_benefit(),
            cost: default_cost(),
            base_fitness: default_base_fitness(),
        }
    }
}

impl PayoffConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        non_negative("payoff.benefit", self.benefit)?;
        non_negative("payoff.cost", self.cost)?;
        if !self.base_fitness.is_finite() {
            return Err(ConfigError::Invalid {
                field: "payoff.base_fitness",
                reason: format!("{} is not finite", self.base_fitness),
            });
        }
        Ok(())
    }
}

/// Event probabilities.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProbabilityConfig {
    /// Chance a newborn's strategy is redrawn from the mutation mix.
    #[serde(default = "default_mutation")]
    pub mutation: f64,

    /// Chance a paired couple of groups fights.
    #[serde(default = "default_conflict")]
    pub conflict: f64,

    /// Chance a paired couple of agents from different groups swaps.
    #[serde(default = "default_migration")]
    pub migration: f64,

    /// Fraction of each group that survives the death step.
    #[serde(default = "default_survival")]
    pub survival: f64,

    /// Decision error: a fixed strategy picks its non-preferred action
    /// with this probability.
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
}

impl Default for ProbabilityConfig {
    fn default() -> Self {
        Self {
            mutation: default_mutation(),
            conflict: default_conflict(),
            migration: default_migration(),
            survival: default_survival(),
            epsilon: default_epsilon(),
        }
    }
}

impl ProbabilityConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        unit_interval("probabilities.mutation", self.mutation)?;
        unit_interval("probabilities.conflict", self.conflict)?;
        unit_interval("probabilities.migration", self.migration)?;
        unit_interval("probabilities.survival", self.survival)?;
        unit_interval("probabilities.epsilon", self.epsilon)
    }
}

/// Learner parameters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LearningConfig {
    /// Cooperation fraction above which citizens and civic learners treat
    /// the group norm as cooperative.
    #[serde(default = "default_threshold")]
    pub threshold: f64,

    /// Step size of the civic propensity update.
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,

    /// Weight of the present value in the smoothed propensity.
    #[serde(default = "default_present_weight")]
    pub present_weight: f64,

    /// Propensity of agents created at initialization.
    #[serde(default)]
    pub initial_pi: f64,

    /// Standard deviation of the Gaussian noise added to a newborn's
    /// inherited propensity.
    #[serde(default = "default_offspring_pi_sd")]
    pub offspring_pi_sd: f64,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            learning_rate: default_learning_rate(),
            present_weight: default_present_weight(),
            initial_pi: 0.0,
            offspring_pi_sd: default_offspring_pi_sd(),
        }
    }
}

impl LearningConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        unit_interval("learning.threshold", self.threshold)?;
        unit_interval("learning.learning_rate", self.learning_rate)?;
        unit_interval("learning.present_weight", self.present_weight)?;
        if !self.initial_pi.is_finite() {
            return Err(ConfigError::Invalid {
                field: "learning.initial_pi",
                reason: format!("{} is not finite", self.initial_pi),
            });
        }
        non_negative("learning.offspring_pi_sd", self.offspring_pi_sd)
    }
}

/// Early-termination controller.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TerminationConfig {
    /// Stop once cooperation has stayed high for `patience` rounds.
    #[serde(default = "default_true")]
    pub until_high: bool,

    /// Stop once cooperation has stayed low for `patience` rounds.
    #[serde(default)]
    pub until_low: bool,

    /// Cooperation rate above which a round counts as high.
    #[serde(default = "default_high_cooperation")]
    pub high_cooperation: f64,

    /// Cooperation rate below which a round counts as low.
    #[serde(default = "default_low_cooperation")]
    pub low_cooperation: f64,

    /// Number of counted rounds that must be exceeded before stopping.
    #[serde(default = "default_patience")]
    pub patience: u64,
}

impl Default for TerminationConfig {
    fn default() -> Self {
        Self {
            until_high: default_true(),
            until_low: false,
            high_cooperation: default_high_cooperation(),
            low_cooperation: default_low_cooperation(),
            patience: default_patience(),
        }
    }
}

impl TerminationConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        unit_interval("termination.high_cooperation", self.high_cooperation)?;
        unit_interval("termination.low_cooperation", self.low_cooperation)
    }
}

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Subscriber output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Log the population composition every N rounds.
    #[serde(default = "default_report_interval")]
    pub report_interval: u64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            report_interval: default_report_interval(),
        }
    }
}

impl LoggingConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.report_interval == 0 {
            return Err(ConfigError::Invalid {
                field: "logging.report_interval",
                reason: "must be at least 1".to_owned(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Validation helpers
// ---------------------------------------------------------------------------

fn unit_interval(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: format!("{value} is outside [0, 1]"),
        })
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: format!("{value} is not a finite non-negative number"),
        })
    }
}

fn validate_mix(field: &'static str, mix: &StrategyMix) -> Result<(), ConfigError> {
    for (strategy, &weight) in mix {
        if !weight.is_finite() || weight < 0.0 {
            return Err(ConfigError::Invalid {
                field,
                reason: format!(
                    "weight {weight} for {strategy} is not a finite non-negative number"
                ),
            });
        }
    }
    let total: f64 = mix.values().sum();
    if total <= 0.0 {
        return Err(ConfigError::Invalid {
            field,
            reason: "weights sum to zero".to_owned(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Default value functions (serde default requires named functions)
// ---------------------------------------------------------------------------

fn default_run_id() -> String {
    uuid::Uuid::now_v7().to_string()
}

const fn default_seed() -> u64 {
    42
}

const fn default_rounds() -> u64 {
    1
}

const fn default_true() -> bool {
    true
}

const fn default_agents_per_group() -> usize {
    100
}

const fn default_group_count() -> usize {
    20
}

fn default_strategy_mix() -> StrategyMix {
    [
        (Strategy::Miscreant, 0.25),
        (Strategy::Deceiver, 0.25),
        (Strategy::Citizen, 0.25),
        (Strategy::Saint, 0.25),
    ]
    .into_iter()
    .collect()
}

const fn default_benefit() -> f64 {
    3.5
}

const fn default_cost() -> f64 {
    1.0
}

const fn default_base_fitness() -> f64 {
    3.0
}

const fn default_mutation() -> f64 {
    0.01
}

const fn default_conflict() -> f64 {
    0.1
}

const fn default_migration() -> f64 {
    0.1
}

const fn default_survival() -> f64 {
    0.8
}

const fn default_epsilon() -> f64 {
    0.05
}

const fn default_threshold() -> f64 {
    0.5
}

const fn default_learning_rate() -> f64 {
    0.1
}

const fn default_present_weight() -> f64 {
    0.2
}

const fn default_offspring_pi_sd() -> f64 {
    0.05
}

const fn default_high_cooperation() -> f64 {
    0.9
}

const fn default_low_cooperation() -> f64 {
    0.25
}

const fn default_patience() -> u64 {
    1000
}

fn default_log_level() -> String {
    "info".to_owned()
}

const fn default_report_interval() -> u64 {
    10
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = SimulationConfig::default();
        assert_eq!(config.run.seed, 42);
        assert_eq!(config.population.agents_per_group, 100);
        assert_eq!(config.population.group_count, 20);
        assert_eq!(config.population.strategy_mix.len(), 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r"
run:
  seed: 7
  rounds: 250
  randomized: false
population:
  agents_per_group: 10
  group_count: 4
  strategy_mix:
    civic: 0.5
    selfish: 0.5
  mutation_mix:
    static: 1.0
  saintly_group: true
payoff:
  benefit: 4.0
  cost: 1.0
  base_fitness: 2.0
probabilities:
  mutation: 0.0
  conflict: 0.5
  migration: 0.25
  survival: 0.6
  epsilon: 0.0
learning:
  threshold: 0.3
  learning_rate: 0.2
  present_weight: 0.5
  initial_pi: 0.1
  offspring_pi_sd: 0.0
termination:
  until_high: false
  until_low: true
  patience: 50
logging:
  level: debug
  format: json
  report_interval: 25
";
        let config = SimulationConfig::parse(yaml).unwrap();
        assert_eq!(config.run.rounds, 250);
        assert!(!config.run.randomized);
        assert_eq!(config.population.strategy_mix.get(&Strategy::Civic), Some(&0.5));
        assert_eq!(
            config.population.effective_mutation_mix().keys().collect::<Vec<_>>(),
            vec![&Strategy::Static]
        );
        assert!(config.population.saintly_group);
        assert!((config.payoff.benefit - 4.0).abs() < f64::EPSILON);
        assert!(config.termination.until_low);
        assert_eq!(config.termination.patience, 50);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_minimal_yaml() {
        let config = SimulationConfig::parse("run:\n  seed: 9\n").unwrap();
        assert_eq!(config.run.seed, 9);
        assert_eq!(config.run.rounds, 1);
        assert!(config.run.randomized);
        assert_eq!(config.population, PopulationConfig::default());
    }

    #[test]
    fn parse_empty_yaml() {
        let config = SimulationConfig::parse("");
        assert!(config.is_ok());
    }

    #[test]
    fn unknown_strategy_is_rejected() {
        let yaml = "population:\n  strategy_mix:\n    hermit: 1.0\n";
        assert!(matches!(
            SimulationConfig::parse(yaml),
            Err(ConfigError::Yaml { .. })
        ));
    }

    #[test]
    fn probability_out_of_range_is_rejected() {
        let mut config = SimulationConfig::default();
        config.probabilities.migration = 1.5;
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "probabilities.migration",
                ..
            }
        ));
    }

    #[test]
    fn zero_total_mix_is_rejected() {
        let mut config = SimulationConfig::default();
        config.population.strategy_mix = [(Strategy::Saint, 0.0)].into_iter().collect();
        assert!(config.validate().is_err());
    }

    #[test]
    fn negative_weight_is_rejected() {
        let mut config = SimulationConfig::default();
        config.population.mutation_mix = Some([(Strategy::Saint, -1.0)].into_iter().collect());
        assert!(config.validate().is_err());
    }

    #[test]
    fn survival_leaving_empty_groups_is_rejected() {
        let mut config = SimulationConfig::default();
        config.population.agents_per_group = 3;
        config.probabilities.survival = 0.2;
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "probabilities.survival",
                ..
            }
        ));
    }

    #[test]
    fn deterministic_quotas_must_fill_groups() {
        let mut config = SimulationConfig::default();
        config.run.randomized = false;
        config.population.agents_per_group = 10;
        config.population.strategy_mix = [(Strategy::Saint, 0.33), (Strategy::Miscreant, 0.33)]
            .into_iter()
            .collect();
        assert!(config.validate().is_err());

        config.population.strategy_mix = [(Strategy::Saint, 0.7), (Strategy::Miscreant, 0.3)]
            .into_iter()
            .collect();
        assert!(config.validate().is_ok());
        let quotas = config.population.group_quotas().unwrap();
        assert_eq!(quotas, vec![(Strategy::Miscreant, 3), (Strategy::Saint, 7)]);
    }

    #[test]
    fn survivors_per_group_floors() {
        assert_eq!(survivors_per_group(100, 0.6), 60);
        assert_eq!(survivors_per_group(7, 0.5), 3);
        assert_eq!(survivors_per_group(10, 1.0), 10);
        assert_eq!(survivors_per_group(10, 0.0), 0);
    }

    #[test]
    fn load_project_config_file() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
            .join("civitas-config.yaml");
        if path.exists() {
            let config = SimulationConfig::from_file(&path);
            assert!(config.is_ok(), "Failed to load project config: {config:?}");
            assert!(config.unwrap().validate().is_ok());
        }
    }
}
