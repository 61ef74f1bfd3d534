//! Trained model artifact

use crate::error::{HousingError, Result};
use crate::export::{ONNXExportable, ONNXGraph, FEATURE_NAMES_KEY};
use crate::inference::Session;
use crate::optimizer::TrialParams;
use crate::training::{MLPRegressor, ModelMetrics, TrainingHistory};
use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// The final network together with what is needed to use and audit it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedModel {
    pub network: MLPRegressor,
    /// Ordered input features, identical to the scaler's
    pub feature_names: Vec<String>,
    /// Hyperparameters of the best trial
    pub best_params: TrialParams,
    /// Metrics on the validation set
    pub metrics: ModelMetrics,
    pub history: TrainingHistory,
    pub trained_at: DateTime<Utc>,
}

impl TrainedModel {
    pub fn new(
        network: MLPRegressor,
        feature_names: Vec<String>,
        best_params: TrialParams,
        metrics: ModelMetrics,
        history: TrainingHistory,
    ) -> Result<Self> {
        if !network.is_fitted() {
            return Err(HousingError::ModelNotFitted);
        }
        if network.n_features() != feature_names.len() {
            return Err(HousingError::SchemaMismatch(format!(
                "network takes {} inputs, {} feature names given",
                network.n_features(),
                feature_names.len()
            )));
        }
        Ok(Self {
            network,
            feature_names,
            best_params,
            metrics,
            history,
            trained_at: Utc::now(),
        })
    }

    /// Predict prices (in millions) for scaled feature rows
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.network.predict(x)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let model: Self = serde_json::from_str(&json)?;
        if !model.network.is_fitted() {
            return Err(HousingError::ModelNotFitted);
        }
        Ok(model)
    }
}

impl ONNXExportable for TrainedModel {
    fn to_onnx_graph(&self) -> Result<ONNXGraph> {
        let names = serde_json::to_string(&self.feature_names)?;
        Ok(self
            .network
            .to_onnx_graph()?
            .add_metadata(FEATURE_NAMES_KEY, names)
            .add_metadata("trained_at", self.trained_at.to_rfc3339()))
    }
}

impl Session for TrainedModel {
    fn run(&self, input: &Array2<f32>) -> Result<Array2<f32>> {
        let predictions = self.network.predict(&input.mapv(f64::from))?;
        Ok(predictions.mapv(|v| v as f32).insert_axis(Axis(1)))
    }

    fn n_features(&self) -> Option<usize> {
        Some(self.network.n_features())
    }

    fn feature_names(&self) -> Option<&[String]> {
        Some(&self.feature_names)
    }
}
