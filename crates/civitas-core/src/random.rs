//! Random variates used by the engine.
//!
//! Every function here is stateless and takes the random source as an
//! explicit argument, so a run driven by one seeded generator is fully
//! reproducible. Degenerate inputs (empty slices, zero or negative weight
//! totals, invalid deviations) fall back to uniform or mean values rather
//! than failing.

use civitas_types::Strategy;
use rand::Rng;
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;
use rand::seq::SliceRandom;
use rand_distr::Normal;

use crate::config::StrategyMix;

/// Errors raised while building a sampler.
#[derive(Debug, thiserror::Error)]
pub enum SamplingError {
    /// The weights cannot form a categorical distribution.
    #[error("invalid strategy weights: {reason}")]
    InvalidWeights {
        /// Why the weights were rejected.
        reason: String,
    },
}

/// Whether stochastic choices are drawn or take their default outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Decisions, pairings and event gates are drawn at random.
    Randomized,
    /// Decisions take their default, pairings keep index order and every
    /// gated event fires.
    Deterministic,
}

impl Mode {
    /// Map the `run.randomized` config flag to a mode.
    pub const fn from_randomized(randomized: bool) -> Self {
        if randomized {
            Self::Randomized
        } else {
            Self::Deterministic
        }
    }

    /// Whether this is [`Mode::Randomized`].
    pub const fn is_randomized(self) -> bool {
        matches!(self, Self::Randomized)
    }
}

/// Draw `true` with probability `p`. `p` outside [0, 1] saturates and NaN
/// never succeeds.
pub fn bernoulli(rng: &mut impl Rng, p: f64) -> bool {
    rng.random::<f64>() < p
}

/// Gate an event on probability `p` in randomized mode. In deterministic
/// mode the event always happens and no randomness is consumed.
pub fn gate(rng: &mut impl Rng, mode: Mode, p: f64) -> bool {
    match mode {
        Mode::Randomized => bernoulli(rng, p),
        Mode::Deterministic => true,
    }
}

/// Sample from `Normal(mean, sd)`. Returns `mean` when `sd` is negative or
/// not finite.
pub fn gaussian(rng: &mut impl Rng, mean: f64, sd: f64) -> f64 {
    if !(sd.is_finite() && sd >= 0.0) {
        return mean;
    }
    Normal::new(mean, sd).map_or(mean, |normal| normal.sample(rng))
}

/// Turn raw fitness values into selection weights: `value / total`, or
/// uniform `1/n` when the total is not positive.
#[allow(clippy::cast_precision_loss)]
pub fn fitness_weights(values: &[f64]) -> Vec<f64> {
    let total: f64 = values.iter().sum();
    if total > 0.0 && total.is_finite() {
        values.iter().map(|v| v / total).collect()
    } else {
        let uniform = 1.0 / values.len().max(1) as f64;
        vec![uniform; values.len()]
    }
}

/// Negative, NaN and infinite weights carry no selection mass.
fn usable(weight: f64) -> f64 {
    if weight.is_finite() && weight > 0.0 {
        weight
    } else {
        0.0
    }
}

/// Draw `k` indices into `weights` with replacement, each draw
/// proportional to its weight. Falls back to uniform draws when no weight
/// is usable.
pub fn sample_with_replacement(rng: &mut impl Rng, weights: &[f64], k: usize) -> Vec<usize> {
    if weights.is_empty() {
        return Vec::new();
    }
    match WeightedIndex::<f64>::new(weights.iter().map(|&w| usable(w))) {
        Ok(index) => (0..k).map(|_| index.sample(rng)).collect(),
        Err(_) => (0..k).map(|_| rng.random_range(0..weights.len())).collect(),
    }
}

/// Draw `k` distinct indices into `weights`, returned in ascending order.
///
/// Uses exponential keys (Efraimidis-Spirakis): each index gets key
/// `ln(u) / w` and the `k` largest keys win, which is exact weighted
/// sampling without replacement. Indices without usable weight get a key
/// of negative infinity and are only picked, uniformly among themselves,
/// once every weighted index is taken. `k` larger than the slice selects
/// everything.
pub fn sample_without_replacement(rng: &mut impl Rng, weights: &[f64], k: usize) -> Vec<usize> {
    let mut keyed: Vec<(f64, f64, usize)> = weights
        .iter()
        .enumerate()
        .map(|(i, &w)| {
            // 1 - [0, 1) keeps ln() finite.
            let u = 1.0 - rng.random::<f64>();
            let w = usable(w);
            let key = if w > 0.0 { u.ln() / w } else { f64::NEG_INFINITY };
            (key, rng.random::<f64>(), i)
        })
        .collect();
    keyed.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| b.1.total_cmp(&a.1)));
    let mut chosen: Vec<usize> = keyed.into_iter().take(k).map(|(_, _, i)| i).collect();
    chosen.sort_unstable();
    chosen
}

/// Split `items` into two halves and pair them index by index.
///
/// In randomized mode the items are shuffled first. With an odd count the
/// second half is one longer and its last element is left unpaired.
pub fn shuffle_and_pair<T>(mut items: Vec<T>, mode: Mode, rng: &mut impl Rng) -> Vec<(T, T)> {
    if mode.is_randomized() {
        items.shuffle(rng);
    }
    let second = items.split_off(items.len() / 2);
    items.into_iter().zip(second).collect()
}

/// Shuffle `items` in randomized mode, leave them in order otherwise.
pub fn shuffle_in_mode<T>(items: &mut [T], mode: Mode, rng: &mut impl Rng) {
    if mode.is_randomized() {
        items.shuffle(rng);
    }
}

/// Categorical sampler over a [`StrategyMix`].
#[derive(Debug, Clone)]
pub struct StrategySampler {
    strategies: Vec<Strategy>,
    index: WeightedIndex<f64>,
}

impl StrategySampler {
    /// Build a sampler from relative weights.
    ///
    /// # Errors
    ///
    /// Returns [`SamplingError::InvalidWeights`] when the mix is empty, has
    /// a negative or non-finite weight, or sums to zero.
    pub fn new(mix: &StrategyMix) -> Result<Self, SamplingError> {
        let strategies: Vec<Strategy> = mix.keys().copied().collect();
        let index = WeightedIndex::new(mix.values().copied()).map_err(|e| {
            SamplingError::InvalidWeights {
                reason: e.to_string(),
            }
        })?;
        Ok(Self { strategies, index })
    }

    /// Draw one strategy.
    pub fn sample(&self, rng: &mut impl Rng) -> Strategy {
        let drawn = self.index.sample(rng);
        self.strategies
            .get(drawn)
            .copied()
            .unwrap_or(Strategy::Miscreant)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    use super::*;

    #[test]
    fn bernoulli_saturates() {
        let mut rng = SmallRng::seed_from_u64(42);
        for _ in 0..100 {
            assert!(bernoulli(&mut rng, 1.0));
            assert!(!bernoulli(&mut rng, 0.0));
            assert!(!bernoulli(&mut rng, f64::NAN));
        }
    }

    #[test]
    fn deterministic_gate_always_fires() {
        let mut rng = SmallRng::seed_from_u64(42);
        assert!(gate(&mut rng, Mode::Deterministic, 0.0));
    }

    #[test]
    fn gaussian_with_invalid_sd_returns_mean() {
        let mut rng = SmallRng::seed_from_u64(42);
        assert!((gaussian(&mut rng, 1.5, -1.0) - 1.5).abs() < f64::EPSILON);
        assert!((gaussian(&mut rng, 1.5, f64::NAN) - 1.5).abs() < f64::EPSILON);
        assert!((gaussian(&mut rng, 1.5, 0.0) - 1.5).abs() < f64::EPSILON);
        assert!((gaussian(&mut rng, -2.0, f64::NEG_INFINITY) + 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn negative_deviation_never_samples() {
        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..100 {
            assert!((gaussian(&mut rng, 0.25, -0.01) - 0.25).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn fitness_weights_fall_back_to_uniform() {
        let w = fitness_weights(&[0.0, 0.0, 0.0, 0.0]);
        assert!(w.iter().all(|&x| (x - 0.25).abs() < 1e-12));
        let w = fitness_weights(&[1.0, 3.0]);
        assert!((w[0] - 0.25).abs() < 1e-12);
        assert!((w[1] - 0.75).abs() < 1e-12);
    }

    #[test]
    fn with_replacement_converges_to_weights() {
        let mut rng = SmallRng::seed_from_u64(7);
        let weights = fitness_weights(&[1.0, 2.0, 1.0]);
        let draws = sample_with_replacement(&mut rng, &weights, 40_000);
        let mut counts = [0_u32; 3];
        for i in draws {
            counts[i] += 1;
        }
        let ratio = f64::from(counts[1]) / f64::from(counts[0]);
        assert!((ratio - 2.0).abs() < 0.1, "ratio was {ratio}");
    }

    #[test]
    fn with_replacement_handles_degenerate_weights() {
        let mut rng = SmallRng::seed_from_u64(7);
        let draws = sample_with_replacement(&mut rng, &[0.0, -1.0, f64::NAN], 10);
        assert_eq!(draws.len(), 10);
        assert!(draws.iter().all(|&i| i < 3));
        assert!(sample_with_replacement(&mut rng, &[], 5).is_empty());
    }

    #[test]
    fn without_replacement_returns_distinct_sorted_indices() {
        let mut rng = SmallRng::seed_from_u64(3);
        let weights = fitness_weights(&[1.0; 10]);
        let chosen = sample_without_replacement(&mut rng, &weights, 6);
        assert_eq!(chosen.len(), 6);
        assert!(chosen.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn without_replacement_clamps_k() {
        let mut rng = SmallRng::seed_from_u64(3);
        let chosen = sample_without_replacement(&mut rng, &[1.0, 1.0], 5);
        assert_eq!(chosen, vec![0, 1]);
    }

    #[test]
    fn without_replacement_single_draw_is_proportional() {
        let mut rng = SmallRng::seed_from_u64(11);
        let weights = fitness_weights(&[1.0, 3.0]);
        let mut second = 0_u32;
        for _ in 0..20_000 {
            if sample_without_replacement(&mut rng, &weights, 1) == vec![1] {
                second += 1;
            }
        }
        let share = f64::from(second) / 20_000.0;
        assert!((share - 0.75).abs() < 0.02, "share was {share}");
    }

    #[test]
    fn without_replacement_prefers_weighted_over_zero() {
        let mut rng = SmallRng::seed_from_u64(5);
        for _ in 0..100 {
            let chosen = sample_without_replacement(&mut rng, &[0.0, 0.5, 0.0, 0.5], 2);
            assert_eq!(chosen, vec![1, 3]);
        }
    }

    #[test]
    fn pairing_keeps_order_in_deterministic_mode() {
        let mut rng = SmallRng::seed_from_u64(1);
        let pairs = shuffle_and_pair((0..7).collect(), Mode::Deterministic, &mut rng);
        assert_eq!(pairs, vec![(0, 3), (1, 4), (2, 5)]);
    }

    #[test]
    fn pairing_excludes_one_when_odd() {
        let mut rng = SmallRng::seed_from_u64(1);
        let pairs = shuffle_and_pair((0..103).collect::<Vec<u32>>(), Mode::Randomized, &mut rng);
        assert_eq!(pairs.len(), 51);
        let mut seen: Vec<u32> = pairs.iter().flat_map(|&(a, b)| [a, b]).collect();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 102);
    }

    #[test]
    fn strategy_sampler_follows_mix() {
        let mut rng = SmallRng::seed_from_u64(9);
        let mix: StrategyMix = [(Strategy::Saint, 0.9), (Strategy::Deceiver, 0.1)]
            .into_iter()
            .collect();
        let sampler = StrategySampler::new(&mix).unwrap();
        let saints = (0..10_000)
            .filter(|_| sampler.sample(&mut rng) == Strategy::Saint)
            .count();
        assert!((8_800..=9_200).contains(&saints), "saints: {saints}");
    }

    #[test]
    fn strategy_sampler_rejects_zero_mix() {
        let mix: StrategyMix = [(Strategy::Saint, 0.0)].into_iter().collect();
        assert!(StrategySampler::new(&mix).is_err());
        assert!(StrategySampler::new(&StrategyMix::new()).is_err());
    }
}
