//! Early termination: the advisory stop flag and the cooperation-trend
//! controller that raises it.
//!
//! The flag is shared through a cloneable [`TerminationHandle`]. The runner
//! reads it between rounds; anything holding a clone (an observer, another
//! thread) may raise it. Raising it never interrupts a round in progress.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use civitas_types::RoundStats;
use tracing::info;

use crate::config::TerminationConfig;

/// Shared, cloneable early-termination flag.
#[derive(Debug, Clone, Default)]
pub struct TerminationHandle {
    requested: Arc<AtomicBool>,
}

impl TerminationHandle {
    /// A handle with the flag lowered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag. The run stops after the current round.
    pub fn request(&self) {
        self.requested.store(true, Ordering::Release);
    }

    /// Whether the flag has been raised.
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }
}

/// Which threshold tripped the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    /// Cooperation stayed above the high threshold long enough.
    High,
    /// Cooperation stayed below the low threshold long enough.
    Low,
}

/// Counts rounds of very high and very low overall cooperation and raises
/// the termination flag once an enabled counter passes the patience limit.
///
/// Counters are cumulative over the run, not streaks.
#[derive(Debug, Clone)]
pub struct CooperationTrend {
    config: TerminationConfig,
    handle: TerminationHandle,
    high_rounds: u64,
    low_rounds: u64,
}

impl CooperationTrend {
    /// A controller that raises `handle` according to `config`.
    pub const fn new(config: TerminationConfig, handle: TerminationHandle) -> Self {
        Self {
            config,
            handle,
            high_rounds: 0,
            low_rounds: 0,
        }
    }

    /// Rounds counted as high cooperation so far.
    pub const fn high_rounds(&self) -> u64 {
        self.high_rounds
    }

    /// Rounds counted as low cooperation so far.
    pub const fn low_rounds(&self) -> u64 {
        self.low_rounds
    }

    /// Count the round described by `stats` and raise the flag if a limit
    /// is passed. Returns the trend that tripped, if any.
    pub fn observe(&mut self, stats: &RoundStats) -> Option<Trend> {
        if stats.cooperation_rate > self.config.high_cooperation {
            self.high_rounds = self.high_rounds.saturating_add(1);
        }
        if stats.cooperation_rate < self.config.low_cooperation {
            self.low_rounds = self.low_rounds.saturating_add(1);
        }

        let tripped = if self.config.until_high && self.high_rounds > self.config.patience {
            Some(Trend::High)
        } else if self.config.until_low && self.low_rounds > self.config.patience {
            Some(Trend::Low)
        } else {
            None
        };
        if let Some(trend) = tripped {
            if !self.handle.is_requested() {
                info!(
                    round = stats.round,
                    ?trend,
                    high_rounds = self.high_rounds,
                    low_rounds = self.low_rounds,
                    "Cooperation trend settled, requesting termination"
                );
            }
            self.handle.request();
        }
        tripped
    }
}
