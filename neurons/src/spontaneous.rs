//! Spontaneous firing: a self-renewing renewal process drawing inter-spike
//! intervals from a truncated distribution.

use std::collections::VecDeque;
use std::fmt;

use rand::RngCore;
use rand_distr::{Distribution, Normal};
use thiserror::Error;

/// Next-event sentinel: nothing scheduled yet. The first step that reaches
/// it schedules an event without firing.
const UNSCHEDULED_MS: f64 = -1.0;

/// Raised at configuration time; the dynamics themselves never fail.
#[derive(Debug, Error, PartialEq)]
pub enum SpontaneousConfigError {
    #[error("spontaneous interval mean must be positive, got {0} ms")]
    NonPositiveMean(f64),
    #[error("spontaneous interval standard deviation must be positive, got {0} ms")]
    NonPositiveStdev(f64),
}

/// Source of inter-spike intervals. Pluggable so the renewal process can be
/// driven by a fixed sequence in tests.
pub trait IntervalDistribution: Send + Sync {
    fn sample_interval(&mut self, rng: &mut dyn RngCore) -> f64;
}

/// Normal distribution truncated to `[0, 2 * mean]` by rejection sampling,
/// so drawn intervals are never negative.
#[derive(Debug)]
pub struct TruncatedNormal {
    normal: Normal<f64>,
    lo_ms: f64,
    hi_ms: f64,
}

impl TruncatedNormal {
    pub fn new(mean_ms: f64, stdev_ms: f64) -> Result<Self, SpontaneousConfigError> {
        if mean_ms <= 0.0 {
            return Err(SpontaneousConfigError::NonPositiveMean(mean_ms));
        }
        if stdev_ms <= 0.0 {
            return Err(SpontaneousConfigError::NonPositiveStdev(stdev_ms));
        }
        let normal = Normal::new(mean_ms, stdev_ms)
            .map_err(|_| SpontaneousConfigError::NonPositiveStdev(stdev_ms))?;
        Ok(TruncatedNormal {
            normal,
            lo_ms: 0.0,
            hi_ms: 2.0 * mean_ms,
        })
    }
}

impl IntervalDistribution for TruncatedNormal {
    fn sample_interval(&mut self, rng: &mut dyn RngCore) -> f64 {
        loop {
            let dt_ms = self.normal.sample(rng);
            if dt_ms >= self.lo_ms && dt_ms <= self.hi_ms {
                return dt_ms;
            }
        }
    }
}

/// Replays a fixed interval sequence, repeating the final entry once
/// exhausted. Deterministic stand-in for [`TruncatedNormal`].
pub struct FixedIntervals {
    pending: VecDeque<f64>,
    last_ms: f64,
}

impl FixedIntervals {
    pub fn new(intervals: impl IntoIterator<Item = f64>) -> Self {
        FixedIntervals {
            pending: intervals.into_iter().collect(),
            last_ms: 0.0,
        }
    }
}

impl IntervalDistribution for FixedIntervals {
    fn sample_interval(&mut self, _rng: &mut dyn RngCore) -> f64 {
        if let Some(dt_ms) = self.pending.pop_front() {
            self.last_ms = dt_ms;
        }
        self.last_ms
    }
}

/// Per-neuron renewal-process state. Configured once before simulation
/// start; absent entirely when spontaneous activity is disabled.
pub struct SpontaneousActivity {
    mean_ms: f64,
    stdev_ms: f64,
    next_at_ms: f64,
    dist: Box<dyn IntervalDistribution>,
}

impl SpontaneousActivity {
    pub fn new(mean_ms: f64, stdev_ms: f64) -> Result<Self, SpontaneousConfigError> {
        let dist = TruncatedNormal::new(mean_ms, stdev_ms)?;
        Ok(Self::with_distribution(mean_ms, stdev_ms, Box::new(dist)))
    }

    /// Substitute a custom interval source.
    pub fn with_distribution(
        mean_ms: f64,
        stdev_ms: f64,
        dist: Box<dyn IntervalDistribution>,
    ) -> Self {
        SpontaneousActivity {
            mean_ms,
            stdev_ms,
            next_at_ms: UNSCHEDULED_MS,
            dist,
        }
    }

    pub fn mean_ms(&self) -> f64 {
        self.mean_ms
    }

    pub fn stdev_ms(&self) -> f64 {
        self.stdev_ms
    }

    /// Absolute time of the next scheduled spontaneous spike, or the
    /// sentinel `-1.0` before the first scheduling step.
    pub fn next_at_ms(&self) -> f64 {
        self.next_at_ms
    }

    /// Advance the renewal process at `t_ms`. Returns true when a
    /// spontaneous spike fires at `t_ms`. The very first step that reaches
    /// the schedule only seeds it.
    pub(crate) fn step(&mut self, t_ms: f64, rng: &mut dyn RngCore) -> bool {
        if t_ms < self.next_at_ms {
            return false;
        }
        let fires = self.next_at_ms >= 0.0;
        let interval_ms = self.dist.sample_interval(rng);
        self.next_at_ms = t_ms + interval_ms;
        fires
    }
}

impl fmt::Debug for SpontaneousActivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpontaneousActivity")
            .field("mean_ms", &self.mean_ms)
            .field("stdev_ms", &self.stdev_ms)
            .field("next_at_ms", &self.next_at_ms)
            .finish_non_exhaustive()
    }
}
