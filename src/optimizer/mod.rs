//! Hyperparameter optimization module (HyperOptX)
//!
//! Sequential, trial-driven search:
//! - Tree-structured Parzen Estimators (TPE)
//! - Random search
//! - Timeout and no-improvement stopping
//! - Study persistence as JSON

mod config;
mod search_space;
mod optimizer;
mod samplers;

pub use config::{OptimizationConfig, OptimizeDirection};
pub use search_space::{SearchSpace, Parameter, ParameterType, TrialParams, ParameterValue};
pub use optimizer::{HyperOptX, Study, TrialResult, TrialState, format_params};
pub use samplers::{Sampler, SamplerType, RandomSampler, TPESampler, create_sampler};
