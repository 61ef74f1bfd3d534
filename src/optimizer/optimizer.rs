//! HyperOptX - Main hyperparameter optimizer

use crate::error::{HousingError, Result};
use super::{
    config::{OptimizationConfig, OptimizeDirection},
    search_space::{SearchSpace, TrialParams},
    samplers::{create_sampler, Sampler},
};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::time::Instant;
use tracing::{info, warn};

/// Outcome of a trial
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialState {
    Complete,
    Failed,
}

/// Result of a single trial
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialResult {
    /// Trial number
    pub trial_id: usize,
    /// Parameters used
    pub params: TrialParams,
    /// Objective value, the direction's worst value for failed trials
    pub value: f64,
    /// Trial duration in seconds
    pub duration_secs: f64,
    pub state: TrialState,
    /// Error message of a failed trial
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Study containing all trials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Study {
    /// All trial results
    pub trials: Vec<TrialResult>,
    /// Best trial index
    pub best_trial_idx: Option<usize>,
    /// Total duration
    pub total_duration_secs: f64,
    /// Optimization direction
    pub direction: OptimizeDirection,
}

impl Study {
    /// Create a new study
    pub fn new(direction: OptimizeDirection) -> Self {
        Self {
            trials: Vec::new(),
            best_trial_idx: None,
            total_duration_secs: 0.0,
            direction,
        }
    }

    /// Get the best trial
    pub fn best_trial(&self) -> Option<&TrialResult> {
        self.best_trial_idx.and_then(|idx| self.trials.get(idx))
    }

    /// Get the best value
    pub fn best_value(&self) -> Option<f64> {
        self.best_trial().map(|t| t.value)
    }

    /// Get the best parameters
    pub fn best_params(&self) -> Option<&TrialParams> {
        self.best_trial().map(|t| &t.params)
    }

    /// Number of completed trials
    pub fn n_complete(&self) -> usize {
        self.trials.iter().filter(|t| t.state == TrialState::Complete).count()
    }

    /// Add a trial result. Failed trials never become the best trial.
    pub fn add_trial(&mut self, result: TrialResult) {
        let idx = self.trials.len();

        let is_better = result.state == TrialState::Complete
            && match self.best_value() {
                None => true,
                Some(best) => self.direction.is_better(result.value, best, 0.0),
            };

        if is_better {
            self.best_trial_idx = Some(idx);
        }

        self.trials.push(result);
    }

    /// Save the study as JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Load a study saved with [`Study::save`]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}

/// Main hyperparameter optimizer
pub struct HyperOptX {
    config: OptimizationConfig,
    search_space: SearchSpace,
    sampler: Box<dyn Sampler>,
    study: Study,
}

impl HyperOptX {
    /// Create a new optimizer
    pub fn new(config: OptimizationConfig, search_space: SearchSpace) -> Self {
        let sampler = create_sampler(config.sampler, config.random_state, config.n_startup_trials);
        let study = Study::new(config.direction);

        Self {
            config,
            search_space,
            sampler,
            study,
        }
    }

    /// Replace the sampler
    pub fn with_sampler(mut self, sampler: Box<dyn Sampler>) -> Self {
        self.sampler = sampler;
        self
    }

    /// Run optimization with an objective function.
    ///
    /// An objective error or a non-finite value marks the trial as failed; the
    /// search continues with the next trial.
    pub fn optimize<F>(&mut self, mut objective: F) -> Result<&Study>
    where
        F: FnMut(&TrialParams) -> Result<f64>,
    {
        if self.search_space.is_empty() {
            return Err(HousingError::OptimizationError("search space is empty".to_string()));
        }

        let start = Instant::now();
        let direction = self.config.direction;
        let mut trials_without_improvement = 0;
        let mut history: Vec<(TrialParams, f64)> = Vec::new();

        for trial_id in 0..self.config.n_trials {
            if let Some(t) = self.config.timeout_secs {
                if start.elapsed().as_secs_f64() > t {
                    info!(trials = trial_id, "timeout reached");
                    break;
                }
            }

            if let Some(p) = self.config.early_stopping_patience {
                if trials_without_improvement >= p {
                    info!(trials = trial_id, patience = p, "stopping search, no improvement");
                    break;
                }
            }

            let trial_start = Instant::now();
            let params = self.sampler.sample(&self.search_space, &history);

            let outcome = match objective(&params) {
                Ok(value) if value.is_finite() => Ok(value),
                Ok(value) => Err(format!("objective returned {}", value)),
                Err(e) => Err(e.to_string()),
            };

            let result = match outcome {
                Ok(value) => {
                    history.push((params.clone(), direction.to_loss(value)));

                    let improved = match self.study.best_value() {
                        None => true,
                        Some(best) => direction.is_better(value, best, self.config.min_improvement),
                    };
                    if improved {
                        trials_without_improvement = 0;
                    } else {
                        trials_without_improvement += 1;
                    }

                    TrialResult {
                        trial_id,
                        params,
                        value,
                        duration_secs: trial_start.elapsed().as_secs_f64(),
                        state: TrialState::Complete,
                        error: None,
                    }
                }
                Err(message) => {
                    warn!(trial = trial_id, error = %message, "trial failed");
                    TrialResult {
                        trial_id,
                        params,
                        value: direction.worst_value(),
                        duration_secs: trial_start.elapsed().as_secs_f64(),
                        state: TrialState::Failed,
                        error: Some(message),
                    }
                }
            };

            let state = result.state;
            let value = result.value;
            let duration = result.duration_secs;
            let params_str = format_params(&result.params);
            self.study.add_trial(result);

            if state == TrialState::Complete {
                info!(
                    trial = trial_id,
                    value,
                    best = self.study.best_value(),
                    duration_secs = duration,
                    params = %params_str,
                    "trial finished"
                );
            }
        }

        self.study.total_duration_secs = start.elapsed().as_secs_f64();

        if let Some(best) = self.study.best_trial() {
            info!(
                trial = best.trial_id,
                value = best.value,
                params = %format_params(&best.params),
                "best trial"
            );
        } else {
            warn!("no trial completed");
        }

        Ok(&self.study)
    }

    /// Get the study results
    pub fn study(&self) -> &Study {
        &self.study
    }

    /// Take ownership of the study
    pub fn into_study(self) -> Study {
        self.study
    }

    /// Save study to file
    pub fn save_study<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.study.save(path)
    }

    /// Load study from file
    pub fn load_study<P: AsRef<Path>>(path: P) -> Result<Study> {
        Study::load(path)
    }
}

/// `name=value` pairs in name order
pub fn format_params(params: &TrialParams) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::SamplerType;
    use tempfile::tempdir;

    fn quadratic_objective(params: &TrialParams) -> Result<f64> {
        let x = params.get("x").and_then(|p| p.as_float()).unwrap_or(0.0);
        let y = params.get("y").and_then(|p| p.as_float()).unwrap_or(0.0);
        Ok(x * x + y * y) // Minimum at (0, 0)
    }

    #[test]
    fn test_optimizer_creation() {
        let space = SearchSpace::new()
            .float("x", -10.0, 10.0)
            .float("y", -10.0, 10.0);

        let optimizer = HyperOptX::new(OptimizationConfig::new(), space);
        assert!(optimizer.study().trials.is_empty());
    }

    #[test]
    fn test_optimization() {
        let config = OptimizationConfig::new()
            .with_n_trials(40)
            .with_direction(OptimizeDirection::Minimize);

        let space = SearchSpace::new()
            .float("x", -5.0, 5.0)
            .float("y", -5.0, 5.0);

        let mut optimizer = HyperOptX::new(config, space);
        let study = optimizer.optimize(quadratic_objective).unwrap();

        assert_eq!(study.trials.len(), 40);
        assert!(study.best_value().unwrap() < 5.0);
    }

    #[test]
    fn test_failed_trials_never_best() {
        let config = OptimizationConfig::new()
            .with_n_trials(12)
            .with_sampler(SamplerType::Random);
        let space = SearchSpace::new().float("x", 0.0, 1.0);

        let mut calls = 0;
        let objective = |params: &TrialParams| -> Result<f64> {
            calls += 1;
            match calls % 3 {
                0 => Err(HousingError::TrainingError("diverged".to_string())),
                1 => Ok(f64::NAN),
                _ => Ok(params["x"].as_float().unwrap_or(1.0) + 1.0),
            }
        };

        let mut optimizer = HyperOptX::new(config, space);
        let study = optimizer.optimize(objective).unwrap();

        assert_eq!(study.trials.len(), 12);
        assert_eq!(study.n_complete(), 4);
        let best = study.best_trial().unwrap();
        assert_eq!(best.state, TrialState::Complete);
        assert!(best.value >= 1.0 && best.value <= 2.0);

        let failed = study.trials.iter().find(|t| t.state == TrialState::Failed).unwrap();
        assert_eq!(failed.value, f64::MAX);
        assert!(failed.error.is_some());
    }

    #[test]
    fn test_search_early_stopping() {
        let config = OptimizationConfig::new()
            .with_n_trials(100)
            .with_early_stopping(5);
        let space = SearchSpace::new().float("x", 0.0, 1.0);

        let constant_objective = |_: &TrialParams| -> Result<f64> { Ok(1.0) };

        let mut optimizer = HyperOptX::new(config, space);
        let study = optimizer.optimize(constant_objective).unwrap();

        // First trial sets the best, five more without improvement
        assert_eq!(study.trials.len(), 6);
    }

    #[test]
    fn test_maximize() {
        let config = OptimizationConfig::new()
            .with_n_trials(15)
            .with_direction(OptimizeDirection::Maximize);
        let space = SearchSpace::new().float("x", 0.0, 1.0);

        let mut optimizer = HyperOptX::new(config, space);
        let study = optimizer
            .optimize(|p: &TrialParams| Ok(p["x"].as_float().unwrap_or(0.0)))
            .unwrap();

        let best = study.best_value().unwrap();
        assert!(study.trials.iter().all(|t| t.value <= best));
    }

    #[test]
    fn test_save_and_load_study() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("study.json");

        let config = OptimizationConfig::new().with_n_trials(5);
        let space = SearchSpace::new()
            .int_step("units", 32, 256, 32)
            .log_float("lr", 1e-4, 1e-2);
        let mut optimizer = HyperOptX::new(config, space);
        optimizer
            .optimize(|p: &TrialParams| Ok(p["units"].as_float().unwrap_or(0.0)))
            .unwrap();
        optimizer.save_study(&path).unwrap();

        let loaded = HyperOptX::load_study(&path).unwrap();
        assert_eq!(loaded.trials.len(), 5);
        assert_eq!(loaded.best_trial_idx, optimizer.study().best_trial_idx);
        assert_eq!(loaded.best_params(), optimizer.study().best_params());
    }

    #[test]
    fn test_format_params() {
        let mut params = TrialParams::new();
        params.insert("b".to_string(), crate::optimizer::ParameterValue::Int(2));
        params.insert("a".to_string(), crate::optimizer::ParameterValue::String("x".into()));
        assert_eq!(format_params(&params), "a=x, b=2");
    }
}
