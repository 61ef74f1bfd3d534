//! Pipeline configuration
//!
//! One serde document holds every setting of a training run. Defaults reproduce the
//! housing-price notebook: 80/20 split with seed 42, 50 TPE trials, 100 epochs with
//! patience 10.

use crate::error::{HousingError, Result};
use crate::optimizer::{OptimizationConfig, SearchSpace};
use crate::preprocessing::PreprocessingConfig;
use crate::training::{Activation, OptimizerKind};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Train/validation split settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    /// Fraction of rows held out for validation
    pub test_size: f64,
    pub random_state: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_size: 0.2,
            random_state: 42,
        }
    }
}

/// Inclusive integer range sampled on a step grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntRange {
    pub low: i64,
    pub high: i64,
    pub step: i64,
}

impl IntRange {
    pub fn new(low: i64, high: i64, step: i64) -> Self {
        Self { low, high, step }
    }

    fn validate(&self, name: &str) -> Result<()> {
        if self.step <= 0 || self.low <= 0 || self.low > self.high {
            return Err(HousingError::ConfigError(format!(
                "{} range {}..={} step {} is invalid",
                name, self.low, self.high, self.step
            )));
        }
        Ok(())
    }
}

/// MLP hyperparameter search settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MlpSearchConfig {
    /// Number of hidden layers
    pub n_layers: IntRange,
    /// Units per hidden layer, `n_units_l{i}`
    pub units: IntRange,
    /// Log-scale bounds of the learning rate
    pub learning_rate: (f64, f64),
    pub batch_size: IntRange,
    /// Trial budget, sampler and direction
    pub optimization: OptimizationConfig,
}

impl Default for MlpSearchConfig {
    fn default() -> Self {
        Self {
            n_layers: IntRange::new(1, 3, 1),
            units: IntRange::new(32, 256, 32),
            learning_rate: (1e-4, 1e-2),
            batch_size: IntRange::new(16, 128, 16),
            optimization: OptimizationConfig::default(),
        }
    }
}

impl MlpSearchConfig {
    /// Maximum number of hidden layers a trial can ask for
    pub fn max_layers(&self) -> usize {
        self.n_layers.high.max(0) as usize
    }

    /// Search space over `n_layers`, `n_units_l0..`, `learning_rate` and `batch_size`
    pub fn search_space(&self) -> SearchSpace {
        let mut space = SearchSpace::new().int_step("n_layers", self.n_layers.low, self.n_layers.high, self.n_layers.step);
        for i in 0..self.max_layers() {
            space = space.int_step(units_param(i), self.units.low, self.units.high, self.units.step);
        }
        space
            .log_float("learning_rate", self.learning_rate.0, self.learning_rate.1)
            .int_step("batch_size", self.batch_size.low, self.batch_size.high, self.batch_size.step)
    }

    fn validate(&self) -> Result<()> {
        self.n_layers.validate("n_layers")?;
        self.units.validate("units")?;
        self.batch_size.validate("batch_size")?;
        let (low, high) = self.learning_rate;
        if !(low > 0.0 && low < high && high.is_finite()) {
            return Err(HousingError::ConfigError(format!(
                "learning rate range {}..{} is invalid",
                low, high
            )));
        }
        if self.optimization.n_trials == 0 {
            return Err(HousingError::ConfigError("n_trials must be positive".to_string()));
        }
        Ok(())
    }
}

/// Name of the units parameter of hidden layer `i`
pub fn units_param(i: usize) -> String {
    format!("n_units_l{}", i)
}

/// Training regime shared by every trial and the final model
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingSettings {
    pub epochs: usize,
    /// Epochs without validation improvement before stopping
    pub patience: Option<usize>,
    pub restore_best_weights: bool,
    pub activation: Activation,
    pub optimizer: OptimizerKind,
    /// Base seed for weight initialization and batch shuffling
    pub random_state: Option<u64>,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            epochs: 100,
            patience: Some(10),
            restore_best_weights: true,
            activation: Activation::ReLU,
            optimizer: OptimizerKind::default(),
            random_state: Some(42),
        }
    }
}

/// Output file locations, relative to `output_dir`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactPaths {
    pub output_dir: PathBuf,
    pub scaler: String,
    pub scaler_params: String,
    pub model: String,
    pub study: String,
    pub onnx: String,
}

impl Default for ArtifactPaths {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            scaler: "scaler.json".to_string(),
            scaler_params: "scaler_params.json".to_string(),
            model: "mlp_model.json".to_string(),
            study: "study.json".to_string(),
            onnx: "mlp_model.onnx".to_string(),
        }
    }
}

impl ArtifactPaths {
    pub fn scaler_path(&self) -> PathBuf {
        self.output_dir.join(&self.scaler)
    }

    pub fn scaler_params_path(&self) -> PathBuf {
        self.output_dir.join(&self.scaler_params)
    }

    pub fn model_path(&self) -> PathBuf {
        self.output_dir.join(&self.model)
    }

    pub fn study_path(&self) -> PathBuf {
        self.output_dir.join(&self.study)
    }

    pub fn onnx_path(&self) -> PathBuf {
        self.output_dir.join(&self.onnx)
    }
}

/// Complete configuration of a training run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Input dataset (CSV, Parquet or JSON)
    pub data_path: PathBuf,
    pub preprocessing: PreprocessingConfig,
    pub split: SplitConfig,
    pub search: MlpSearchConfig,
    pub training: TrainingSettings,
    pub artifacts: ArtifactPaths,
    /// Write the ONNX model and scaler parameters after training
    pub export: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("PH_houses_v2.csv"),
            preprocessing: PreprocessingConfig::default(),
            split: SplitConfig::default(),
            search: MlpSearchConfig::default(),
            training: TrainingSettings::default(),
            artifacts: ArtifactPaths::default(),
            export: false,
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a JSON config; missing fields take their defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&json)
            .map_err(|e| HousingError::ConfigError(format!("{}: {}", path.as_ref().display(), e)))?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn with_data_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_path = path.into();
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifacts.output_dir = dir.into();
        self
    }

    pub fn with_n_trials(mut self, n: usize) -> Self {
        self.search.optimization.n_trials = n;
        self
    }

    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.training.epochs = epochs;
        self
    }

    /// Seed the split, the sampler and the network initialization
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.split.random_state = seed;
        self.search.optimization.random_state = Some(seed);
        self.training.random_state = Some(seed);
        self
    }

    pub fn with_export(mut self, export: bool) -> Self {
        self.export = export;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.split.test_size > 0.0 && self.split.test_size < 1.0) {
            return Err(HousingError::ConfigError(format!(
                "test_size must be in (0, 1), got {}",
                self.split.test_size
            )));
        }
        if self.training.epochs == 0 {
            return Err(HousingError::ConfigError("epochs must be positive".to_string()));
        }
        self.search.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.data_path, PathBuf::from("PH_houses_v2.csv"));
        assert_eq!(config.split.test_size, 0.2);
        assert_eq!(config.search.optimization.n_trials, 50);
        assert_eq!(config.training.epochs, 100);
        assert_eq!(config.training.patience, Some(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_search_space_layout() {
        let space = MlpSearchConfig::default().search_space();
        assert_eq!(
            space.param_names(),
            vec!["n_layers", "n_units_l0", "n_units_l1", "n_units_l2", "learning_rate", "batch_size"]
        );
    }

    #[test]
    fn test_artifact_paths() {
        let config = PipelineConfig::new().with_output_dir("/tmp/run");
        assert_eq!(config.artifacts.onnx_path(), PathBuf::from("/tmp/run/mlp_model.onnx"));
        assert_eq!(config.artifacts.scaler_params_path(), PathBuf::from("/tmp/run/scaler_params.json"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = PipelineConfig::new();
        config.split.test_size = 1.0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::new();
        config.search.learning_rate = (0.1, 0.01);
        assert!(config.validate().is_err());

        assert!(PipelineConfig::new().with_n_trials(0).validate().is_err());
    }

    #[test]
    fn test_file_round_trip_with_partial_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"data_path": "houses.csv", "training": {"epochs": 5}}"#).unwrap();

        let config = PipelineConfig::from_file(&path).unwrap();
        assert_eq!(config.data_path, PathBuf::from("houses.csv"));
        assert_eq!(config.training.epochs, 5);
        assert_eq!(config.training.patience, Some(10));

        let saved = dir.path().join("saved.json");
        config.with_seed(7).save(&saved).unwrap();
        let reloaded = PipelineConfig::from_file(&saved).unwrap();
        assert_eq!(reloaded.split.random_state, 7);
        assert_eq!(reloaded.search.optimization.random_state, Some(7));
    }
}
