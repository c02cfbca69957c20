//! Individual agents and their decision rules.
//!
//! An [`Agent`] carries its strategy, its fitness accumulators and the
//! per-round observation state. Each round it draws a detection
//! probability, decides whether to cooperate through the rule of its
//! [`Strategy`], and is then observed (or not). Learners update their
//! propensity `pi` before deciding.
//!
//! Decisions read a [`GroupView`], a copy of the statistics the agent's
//! current group produced in the previous cooperation round.

use civitas_types::{AgentId, Strategy};
use rand::Rng;

use crate::config::SimulationConfig;
use crate::random::{self, Mode};

/// Threshold above which a cooperation probability counts as a default
/// decision to cooperate.
const DEFAULT_CHOICE_THRESHOLD: f64 = 0.5;

/// The group statistics an agent reads when deciding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroupView {
    /// Members that cooperated in the group's previous round.
    pub num_cooperated: u32,
    /// Current number of members.
    pub size: usize,
    /// Benefit share each reward-eligible member received last round.
    pub average_benefit: f64,
}

impl GroupView {
    /// Fraction of the group that cooperated last round, 0 for an empty
    /// group.
    #[allow(clippy::cast_precision_loss)]
    pub fn cooperation_fraction(self) -> f64 {
        if self.size == 0 {
            0.0
        } else {
            f64::from(self.num_cooperated) / self.size as f64
        }
    }
}

/// The global parameters decision and learning rules depend on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecisionParams {
    /// Probability of picking the non-preferred action.
    pub epsilon: f64,
    /// Private cost of cooperating.
    pub cost: f64,
    /// Fitness every agent starts a round with.
    pub base_fitness: f64,
    /// Cooperation fraction that counts as a cooperative group norm.
    pub threshold: f64,
    /// Civic propensity step size.
    pub learning_rate: f64,
    /// Weight of the present value in the smoothed propensity.
    pub present_weight: f64,
    /// Whether decisions are drawn or take their default.
    pub mode: Mode,
}

impl DecisionParams {
    /// Extract decision parameters from a configuration.
    pub const fn from_config(config: &SimulationConfig) -> Self {
        Self {
            epsilon: config.probabilities.epsilon,
            cost: config.payoff.cost,
            base_fitness: config.payoff.base_fitness,
            threshold: config.learning.threshold,
            learning_rate: config.learning.learning_rate,
            present_weight: config.learning.present_weight,
            mode: Mode::from_randomized(config.run.randomized),
        }
    }
}

/// One individual in the population.
#[derive(Debug, Clone, PartialEq)]
pub struct Agent {
    id: AgentId,
    strategy: Strategy,
    /// Current-round fitness accumulator.
    pub fitness: f64,
    /// Exponentially smoothed fitness.
    pub avg_fitness: f64,
    /// Detection probability drawn this round.
    pub p_obs: f64,
    /// Whether the agent was observed this round.
    pub observed: bool,
    /// This round's decision.
    pub cooperates: bool,
    /// The decision the agent would take without decision noise.
    pub default_choice: bool,
    /// Cooperation probability behind this round's decision.
    pub p_coop: f64,
    /// Learning propensity.
    pub pi: f64,
    /// Smoothed learning propensity.
    pub avg_pi: f64,
    /// Set at birth and on migration; cleared at the top of each round.
    pub is_new_agent: bool,
    /// Set when the agent changed groups this round.
    pub migrated: bool,
    /// The agent paired with this one in the latest migration step.
    pub migration_partner: Option<AgentId>,
}

impl Agent {
    /// Create an agent with the given starting fitness and propensity.
    pub const fn new(id: AgentId, strategy: Strategy, fitness: f64, pi: f64) -> Self {
        Self {
            id,
            strategy,
            fitness,
            avg_fitness: fitness,
            p_obs: 0.0,
            observed: false,
            cooperates: false,
            default_choice: false,
            p_coop: 0.0,
            pi,
            avg_pi: pi,
            is_new_agent: true,
            migrated: false,
            migration_partner: None,
        }
    }

    /// This agent's identifier.
    pub const fn id(&self) -> AgentId {
        self.id
    }

    /// This agent's strategy.
    pub const fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Whether this round's decision differs from the default decision.
    pub const fn erred(&self) -> bool {
        self.cooperates != self.default_choice
    }

    /// Clear the per-round flags.
    pub const fn reset_round_flags(&mut self) {
        self.is_new_agent = false;
        self.migrated = false;
        self.migration_partner = None;
    }

    /// Play one round: draw a detection probability, decide, reset fitness
    /// to the base value and draw whether the agent is observed.
    ///
    /// Fitness is reset after deciding so learners see last round's payoff.
    pub fn step(&mut self, view: GroupView, params: &DecisionParams, rng: &mut impl Rng) {
        self.p_obs = rng.random::<f64>();
        self.cooperates = self.decide(view, params, rng);
        self.fitness = params.base_fitness;
        self.observed = random::bernoulli(rng, self.p_obs);
    }

    /// Decide whether to cooperate this round.
    ///
    /// Records the cooperation probability and the default choice but not
    /// the decision itself; [`Agent::step`] stores it in `cooperates`.
    pub fn decide(&mut self, view: GroupView, params: &DecisionParams, rng: &mut impl Rng) -> bool {
        match self.strategy {
            Strategy::Miscreant => self.miscreant_choice(params, rng),
            Strategy::Deceiver => self.deceiver_choice(view, params, rng),
            Strategy::Citizen => self.citizen_choice(view, params, rng),
            Strategy::Saint => self.saint_choice(params, rng),
            Strategy::Civic | Strategy::Selfish | Strategy::Static => {
                self.learner_choice(view, params, rng)
            }
        }
    }

    fn miscreant_choice(&mut self, params: &DecisionParams, rng: &mut impl Rng) -> bool {
        self.final_choice(params.epsilon, params.mode, rng)
    }

    fn saint_choice(&mut self, params: &DecisionParams, rng: &mut impl Rng) -> bool {
        self.final_choice(1.0 - params.epsilon, params.mode, rng)
    }

    fn deceiver_choice(
        &mut self,
        view: GroupView,
        params: &DecisionParams,
        rng: &mut impl Rng,
    ) -> bool {
        let (ev_coop, ev_defect) = self.expected_values(view, params);
        let p = if ev_coop >= ev_defect {
            1.0 - params.epsilon
        } else {
            params.epsilon
        };
        self.final_choice(p, params.mode, rng)
    }

    fn citizen_choice(
        &mut self,
        view: GroupView,
        params: &DecisionParams,
        rng: &mut impl Rng,
    ) -> bool {
        if self.is_new_agent || view.cooperation_fraction() >= params.threshold {
            self.saint_choice(params, rng)
        } else {
            self.deceiver_choice(view, params, rng)
        }
    }

    fn learner_choice(
        &mut self,
        view: GroupView,
        params: &DecisionParams,
        rng: &mut impl Rng,
    ) -> bool {
        match self.strategy {
            Strategy::Civic => self.civic_learn(view, params),
            Strategy::Selfish => self.selfish_learn(params, rng),
            _ => {}
        }
        if self.p_obs * view.average_benefit >= params.cost * (1.0 - self.pi) {
            self.saint_choice(params, rng)
        } else {
            self.miscreant_choice(params, rng)
        }
    }

    /// Expected payoff of cooperating and of defecting given last round's
    /// benefit share and this round's detection probability.
    pub fn expected_values(&self, view: GroupView, params: &DecisionParams) -> (f64, f64) {
        let base = params.base_fitness;
        let ev_coop = base + view.average_benefit - params.cost;
        let ev_defect = self
            .p_obs
            .mul_add(base, (1.0 - self.p_obs) * (base + view.average_benefit));
        (ev_coop, ev_defect)
    }

    /// Move `pi` toward 1 when the group norm is cooperative and toward 0
    /// otherwise.
    pub fn civic_learn(&mut self, view: GroupView, params: &DecisionParams) {
        let lr = params.learning_rate;
        let decayed = (1.0 - lr) * self.pi;
        self.pi = if view.cooperation_fraction() >= params.threshold {
            decayed + lr
        } else {
            decayed
        };
        self.smooth_pi(params.present_weight);
    }

    /// Follow the fitness gradient: `pi` moves in the direction that
    /// correlated with a fitness gain.
    pub fn selfish_learn(&mut self, params: &DecisionParams, rng: &mut impl Rng) {
        let mut step = if self.fitness == 0.0 {
            0.0
        } else {
            (self.pi - self.avg_pi) * (self.fitness - self.avg_fitness) / self.fitness
        };
        if !step.is_finite() {
            step = 0.0;
        }
        if params.mode.is_randomized() {
            step = random::gaussian(rng, step, step.abs() / 2.0);
        }
        self.pi += step;
        self.smooth_pi(params.present_weight);
    }

    fn smooth_pi(&mut self, present_weight: f64) {
        self.avg_pi = (1.0 - present_weight).mul_add(self.avg_pi, present_weight * self.pi);
    }

    /// Record `p` as this round's cooperation probability and resolve it
    /// to a decision.
    fn final_choice(&mut self, p: f64, mode: Mode, rng: &mut impl Rng) -> bool {
        self.p_coop = p;
        self.default_choice = p > DEFAULT_CHOICE_THRESHOLD;
        match mode {
            Mode::Randomized => random::bernoulli(rng, p),
            Mode::Deterministic => self.default_choice,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    use super::*;

    fn params(mode: Mode) -> DecisionParams {
        DecisionParams {
            epsilon: 0.05,
            cost: 1.0,
            base_fitness: 3.0,
            threshold: 0.3,
            learning_rate: 0.1,
            present_weight: 0.2,
            mode,
        }
    }

    fn view(num_cooperated: u32, size: usize, average_benefit: f64) -> GroupView {
        GroupView {
            num_cooperated,
            size,
            average_benefit,
        }
    }

    fn settled(strategy: Strategy) -> Agent {
        let mut agent = Agent::new(AgentId::new(0), strategy, 3.0, 0.0);
        agent.reset_round_flags();
        agent
    }

    #[test]
    fn fixed_strategies_in_deterministic_mode() {
        let mut rng = SmallRng::seed_from_u64(42);
        let p = params(Mode::Deterministic);
        let v = view(50, 100, 1.0);
        for _ in 0..50 {
            let mut miscreant = settled(Strategy::Miscreant);
            let mut saint = settled(Strategy::Saint);
            miscreant.cooperates = miscreant.decide(v, &p, &mut rng);
            saint.cooperates = saint.decide(v, &p, &mut rng);
            assert!(!miscreant.cooperates);
            assert!(saint.cooperates);
            assert!(!miscreant.erred());
            assert!(!saint.erred());
        }
    }

    #[test]
    fn miscreant_errs_at_epsilon_rate() {
        let mut rng = SmallRng::seed_from_u64(42);
        let p = params(Mode::Randomized);
        let mut agent = settled(Strategy::Miscreant);
        let cooperations = (0..20_000)
            .filter(|_| agent.decide(view(0, 10, 0.0), &p, &mut rng))
            .count();
        assert!((800..=1_200).contains(&cooperations), "{cooperations}");
    }

    #[test]
    fn deceiver_compares_expected_values() {
        let mut rng = SmallRng::seed_from_u64(42);
        let p = params(Mode::Deterministic);
        let mut agent = settled(Strategy::Deceiver);

        // Rarely watched, small benefit: defecting pays.
        agent.p_obs = 0.1;
        assert!(!agent.decide(view(5, 10, 0.5), &p, &mut rng));

        // Always watched: cooperating keeps the benefit share.
        agent.p_obs = 1.0;
        assert!(agent.decide(view(5, 10, 2.0), &p, &mut rng));
        assert!((agent.p_coop - 0.95).abs() < 1e-12);

        // Exact tie: 3 + 2 - 1 == 0.5 * 3 + 0.5 * (3 + 2), cooperation wins.
        agent.p_obs = 0.5;
        let (ev_coop, ev_defect) = agent.expected_values(view(5, 10, 2.0), &p);
        assert!((ev_coop - ev_defect).abs() < f64::EPSILON);
        assert!(agent.decide(view(5, 10, 2.0), &p, &mut rng));
        assert!(agent.default_choice);
    }

    #[test]
    fn step_records_the_decision() {
        let mut rng = SmallRng::seed_from_u64(42);
        let p = params(Mode::Deterministic);
        let mut saint = settled(Strategy::Saint);
        saint.step(view(5, 10, 1.0), &p, &mut rng);
        assert!(saint.cooperates);
        assert!(!saint.erred());
        assert!((saint.fitness - p.base_fitness).abs() < f64::EPSILON);
    }

    #[test]
    fn citizen_follows_cooperative_norm() {
        // benefit 4, cost 1, p_obs 0.2, last round benefit share 0.5,
        // threshold 0.3, 40% of the group cooperated.
        let mut rng = SmallRng::seed_from_u64(42);
        let p = params(Mode::Deterministic);
        let mut agent = settled(Strategy::Citizen);
        agent.p_obs = 0.2;
        assert!(agent.decide(view(4, 10, 0.5), &p, &mut rng));
    }

    #[test]
    fn citizen_below_norm_acts_as_deceiver() {
        let mut rng = SmallRng::seed_from_u64(42);
        let p = params(Mode::Deterministic);
        let mut agent = settled(Strategy::Citizen);
        agent.p_obs = 0.2;
        assert!(!agent.decide(view(2, 10, 0.5), &p, &mut rng));
    }

    #[test]
    fn new_citizen_acts_as_saint() {
        let mut rng = SmallRng::seed_from_u64(42);
        let p = params(Mode::Deterministic);
        let mut agent = Agent::new(AgentId::new(1), Strategy::Citizen, 3.0, 0.0);
        agent.p_obs = 0.2;
        assert!(agent.is_new_agent);
        assert!(agent.decide(view(0, 10, 0.5), &p, &mut rng));
    }

    #[test]
    fn civic_learning_moves_toward_norm() {
        let p = params(Mode::Deterministic);
        let mut agent = settled(Strategy::Civic);
        agent.civic_learn(view(8, 10, 1.0), &p);
        assert!((agent.pi - 0.1).abs() < 1e-12);
        assert!((agent.avg_pi - 0.02).abs() < 1e-12);

        agent.civic_learn(view(0, 10, 1.0), &p);
        assert!((agent.pi - 0.09).abs() < 1e-12);
    }

    #[test]
    fn selfish_learning_follows_fitness_gradient() {
        let mut rng = SmallRng::seed_from_u64(42);
        let p = params(Mode::Deterministic);
        let mut agent = settled(Strategy::Selfish);
        agent.pi = 0.5;
        agent.avg_pi = 0.25;
        agent.fitness = 4.0;
        agent.avg_fitness = 2.0;
        agent.selfish_learn(&p, &mut rng);
        // (0.5 - 0.25) * (4 - 2) / 4
        assert!((agent.pi - 0.625).abs() < 1e-12);
    }

    #[test]
    fn selfish_learning_with_zero_fitness_is_still() {
        let mut rng = SmallRng::seed_from_u64(42);
        let p = params(Mode::Randomized);
        let mut agent = settled(Strategy::Selfish);
        agent.pi = 0.5;
        agent.avg_pi = 0.1;
        agent.fitness = 0.0;
        agent.selfish_learn(&p, &mut rng);
        assert!((agent.pi - 0.5).abs() < 1e-12);
        assert!(agent.pi.is_finite());
    }

    #[test]
    fn static_learner_keeps_pi() {
        let mut rng = SmallRng::seed_from_u64(42);
        let p = params(Mode::Deterministic);
        let mut agent = settled(Strategy::Static);
        agent.pi = 0.7;
        agent.p_obs = 0.0;
        // cost * (1 - pi) = 0.3 > 0: defect.
        assert!(!agent.decide(view(10, 10, 5.0), &p, &mut rng));
        assert!((agent.pi - 0.7).abs() < 1e-12);

        agent.pi = 1.0;
        // 0 >= 0: cooperate.
        assert!(agent.decide(view(10, 10, 5.0), &p, &mut rng));
    }

    #[test]
    fn step_resets_fitness_after_deciding() {
        let mut rng = SmallRng::seed_from_u64(42);
        let p = params(Mode::Randomized);
        let mut agent = settled(Strategy::Saint);
        agent.fitness = 11.0;
        agent.step(view(0, 10, 0.0), &p, &mut rng);
        assert!((agent.fitness - 3.0).abs() < 1e-12);
        assert!((0.0..1.0).contains(&agent.p_obs));
    }

    #[test]
    fn reset_clears_transient_flags() {
        let mut agent = Agent::new(AgentId::new(3), Strategy::Saint, 3.0, 0.0);
        agent.migrated = true;
        agent.migration_partner = Some(AgentId::new(4));
        agent.reset_round_flags();
        assert!(!agent.is_new_agent);
        assert!(!agent.migrated);
        assert_eq!(agent.migration_partner, None);
    }
}
