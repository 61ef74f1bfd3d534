//! Optimization configuration

use serde::{Deserialize, Serialize};
use super::SamplerType;

/// Direction of optimization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizeDirection {
    Minimize,
    Maximize,
}

impl OptimizeDirection {
    /// Value recorded for failed trials
    pub fn worst_value(self) -> f64 {
        match self {
            OptimizeDirection::Minimize => f64::MAX,
            OptimizeDirection::Maximize => f64::MIN,
        }
    }

    /// Whether `a` is strictly better than `b` by more than `min_delta`
    pub fn is_better(self, a: f64, b: f64, min_delta: f64) -> bool {
        match self {
            OptimizeDirection::Minimize => a < b - min_delta,
            OptimizeDirection::Maximize => a > b + min_delta,
        }
    }

    /// Map a value to a loss where lower is better
    pub fn to_loss(self, value: f64) -> f64 {
        match self {
            OptimizeDirection::Minimize => value,
            OptimizeDirection::Maximize => -value,
        }
    }
}

/// Configuration for hyperparameter optimization
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationConfig {
    /// Number of trials to run
    pub n_trials: usize,

    /// Maximum time in seconds
    pub timeout_secs: Option<f64>,

    /// Optimization direction
    pub direction: OptimizeDirection,

    /// Sampler type
    pub sampler: SamplerType,

    /// Number of initial random samples before optimization
    pub n_startup_trials: usize,

    /// Random seed
    pub random_state: Option<u64>,

    /// Stop the search after this many completed trials without improvement
    pub early_stopping_patience: Option<usize>,

    /// Minimum improvement to consider
    pub min_improvement: f64,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            n_trials: 50,
            timeout_secs: None,
            direction: OptimizeDirection::Minimize,
            sampler: SamplerType::TPE,
            n_startup_trials: 10,
            random_state: Some(42),
            early_stopping_patience: None,
            min_improvement: 0.0,
        }
    }
}

impl OptimizationConfig {
    /// Create a new configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to set number of trials
    pub fn with_n_trials(mut self, n: usize) -> Self {
        self.n_trials = n;
        self
    }

    /// Builder method to set timeout
    pub fn with_timeout(mut self, secs: f64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Builder method to set direction
    pub fn with_direction(mut self, direction: OptimizeDirection) -> Self {
        self.direction = direction;
        self
    }

    /// Builder method to set sampler
    pub fn with_sampler(mut self, sampler: SamplerType) -> Self {
        self.sampler = sampler;
        self
    }

    /// Builder method to set the seed
    pub fn with_random_state(mut self, seed: Option<u64>) -> Self {
        self.random_state = seed;
        self
    }

    /// Builder method to stop the search after `patience` trials without improvement
    pub fn with_early_stopping(mut self, patience: usize) -> Self {
        self.early_stopping_patience = Some(patience);
        self
    }
}
