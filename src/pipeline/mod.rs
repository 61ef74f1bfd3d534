//! End-to-end training pipeline
//!
//! load → clean → trim outliers → encode → split → scale → search → final fit →
//! save artifacts → optional export.

mod model;

pub use model::TrainedModel;

use crate::config::{units_param, PipelineConfig};
use crate::error::{HousingError, Result};
use crate::export::{export_scaler_params, ONNXExporter};
use crate::optimizer::{format_params, HyperOptX, TrialParams, TrialResult, TrialState};
use crate::preprocessing::{
    train_test_split, CleaningReport, Encoder, EncoderType, FeatureMatrix, HousingCleaner, OutlierBounds,
    OutlierDetector, StandardScaler,
};
use crate::training::{MLPConfig, MLPRegressor, ModelMetrics};
use crate::utils::DataLoader;
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;

/// Encoded frame and design matrix produced from the raw table
#[derive(Debug, Clone)]
pub struct PreparedData {
    /// Cleaned, trimmed and encoded frame, target included
    pub frame: DataFrame,
    pub features: FeatureMatrix,
    pub cleaning: CleaningReport,
    pub outlier_bounds: Vec<OutlierBounds>,
}

/// What a pipeline run produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub rows_loaded: usize,
    pub rows_after_cleaning: usize,
    pub rows_after_features: usize,
    pub n_train: usize,
    pub n_valid: usize,
    pub n_features: usize,
    pub n_trials: usize,
    pub n_failed_trials: usize,
    pub best_trial: Option<TrialResult>,
    /// Validation metrics of the final model
    pub metrics: ModelMetrics,
    pub epochs_run: usize,
    pub artifacts: Vec<PathBuf>,
}

/// Runs the housing-price training pipeline
#[derive(Debug, Clone)]
pub struct TrainingPipeline {
    config: PipelineConfig,
}

impl TrainingPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Clean, trim and encode a raw frame, then separate the target
    pub fn prepare(&self, df: &DataFrame) -> Result<PreparedData> {
        let pre = &self.config.preprocessing;

        let (cleaned, cleaning) = HousingCleaner::new(pre.clone()).clean(df)?;

        let mut detector =
            OutlierDetector::new(pre.outlier_method.clone(), pre.outlier_strategy).with_columns(pre.outlier_columns.clone());
        let trimmed = detector.apply(&cleaned)?;

        let mut encoder = Encoder::new(EncoderType::OneHot).with_max_onehot_categories(pre.max_onehot_categories);
        let frame = encoder.fit_transform(&trimmed)?;

        let features = FeatureMatrix::from_frame(&frame, &pre.target_column, pre.fill_remaining_with_median)?;
        info!(
            rows = features.n_samples(),
            features = features.n_features(),
            categorical = ?encoder.categorical_columns(),
            "after feature engineering"
        );

        Ok(PreparedData {
            frame,
            features,
            cleaning,
            outlier_bounds: detector.bounds().to_vec(),
        })
    }

    /// Load the configured dataset and prepare it
    pub fn load_and_prepare(&self) -> Result<PreparedData> {
        let df = DataLoader::new().load_auto(&self.config.data_path)?;
        self.prepare(&df)
    }

    /// Network configuration for a trial's parameters.
    ///
    /// Only `n_units_l{i}` for `i < n_layers` are used.
    pub fn mlp_config(&self, params: &TrialParams, seed: Option<u64>) -> Result<MLPConfig> {
        let int_param = |name: &str| -> Result<i64> {
            params
                .get(name)
                .and_then(|v| v.as_int())
                .ok_or_else(|| HousingError::OptimizationError(format!("trial is missing integer '{}'", name)))
        };

        let n_layers = int_param("n_layers")?.max(0) as usize;
        let hidden_layers = (0..n_layers)
            .map(|i| int_param(&units_param(i)).map(|u| u.max(1) as usize))
            .collect::<Result<Vec<_>>>()?;
        let learning_rate = params
            .get("learning_rate")
            .and_then(|v| v.as_float())
            .ok_or_else(|| HousingError::OptimizationError("trial is missing 'learning_rate'".to_string()))?;
        let batch_size = int_param("batch_size")?.max(1) as usize;

        let training = &self.config.training;
        let mut config = MLPConfig::default()
            .with_hidden_layers(hidden_layers)
            .with_learning_rate(learning_rate)
            .with_batch_size(batch_size)
            .with_max_epochs(training.epochs)
            .with_patience(training.patience)
            .with_optimizer(training.optimizer)
            .with_random_state(seed);
        config.activation = training.activation;
        config.restore_best_weights = training.restore_best_weights;
        Ok(config)
    }

    /// Run every step and write the artifacts
    pub fn run(&self) -> Result<PipelineSummary> {
        let artifacts = &self.config.artifacts;
        std::fs::create_dir_all(&artifacts.output_dir)?;

        let df = DataLoader::new().load_auto(&self.config.data_path)?;
        let rows_loaded = df.height();
        let prepared = self.prepare(&df)?;
        let features = &prepared.features;

        let split = train_test_split(
            &features.x,
            &features.y,
            self.config.split.test_size,
            self.config.split.random_state,
        )?;
        info!(train = split.x_train.nrows(), valid = split.x_valid.nrows(), "data split");

        let mut scaler = StandardScaler::new().with_feature_names(features.feature_names.clone());
        let x_train = scaler.fit_transform(&split.x_train)?;
        let x_valid = scaler.transform(&split.x_valid)?;
        let scaler_path = artifacts.scaler_path();
        scaler.save(&scaler_path)?;
        info!(path = %scaler_path.display(), "scaler saved");

        let mut optimizer = HyperOptX::new(self.config.search.optimization.clone(), self.config.search.search_space());
        let base_seed = self.config.training.random_state;
        let mut trial_number = 0u64;

        let objective = |params: &TrialParams| -> Result<f64> {
            let seed = base_seed.map(|s| s.wrapping_add(trial_number));
            trial_number += 1;

            let mut network = MLPRegressor::new(self.mlp_config(params, seed)?);
            network.fit_with_validation(&x_train, &split.y_train, &x_valid, &split.y_valid)?;
            let predictions = network.predict(&x_valid)?;
            Ok(ModelMetrics::compute_regression(&split.y_valid, &predictions).rmse)
        };

        let study = optimizer.optimize(objective)?;
        let best = study
            .best_trial()
            .cloned()
            .ok_or_else(|| HousingError::OptimizationError("no trial completed".to_string()))?;
        let n_trials = study.trials.len();
        let n_failed_trials = study.trials.iter().filter(|t| t.state == TrialState::Failed).count();

        info!(params = %format_params(&best.params), "training final model");
        let start = Instant::now();
        let mut network = MLPRegressor::new(self.mlp_config(&best.params, base_seed)?.with_verbose(true));
        let history = network.fit_with_validation(&x_train, &split.y_train, &x_valid, &split.y_valid)?;
        let predictions = network.predict(&x_valid)?;
        let metrics = ModelMetrics::compute_regression(&split.y_valid, &predictions)
            .with_training_time(start.elapsed().as_secs_f64())
            .with_n_features(features.n_features());
        info!(rmse = metrics.rmse, mae = metrics.mae, r2 = metrics.r2, "final model");

        let epochs_run = history.epochs_run();
        let model = TrainedModel::new(network, features.feature_names.clone(), best.params.clone(), metrics.clone(), history)?;
        let model_path = artifacts.model_path();
        model.save(&model_path)?;
        let study_path = artifacts.study_path();
        optimizer.save_study(&study_path)?;
        info!(model = %model_path.display(), study = %study_path.display(), "artifacts saved");

        let mut written = vec![scaler_path.clone(), model_path, study_path];
        if self.config.export {
            let onnx_path = artifacts.onnx_path();
            ONNXExporter::new().export(&model, &onnx_path)?;
            let params_path = artifacts.scaler_params_path();
            export_scaler_params(&scaler_path, &params_path)?;
            written.push(onnx_path);
            written.push(params_path);
        }

        Ok(PipelineSummary {
            rows_loaded,
            rows_after_cleaning: prepared.cleaning.rows_after_cleaning,
            rows_after_features: features.n_samples(),
            n_train: x_train.nrows(),
            n_valid: x_valid.nrows(),
            n_features: features.n_features(),
            n_trials,
            n_failed_trials,
            best_trial: Some(best),
            metrics,
            epochs_run,
            artifacts: written,
        })
    }
}
