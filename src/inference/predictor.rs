//! Scaled single-row and batch prediction

use super::session::{ONNXSession, Session};
use crate::error::{HousingError, Result};
use crate::pipeline::TrainedModel;
use crate::preprocessing::{ScalerParams, StandardScaler};
use ndarray::{Array1, Array2};
use std::path::Path;
use tracing::info;

/// Scaler parameters plus a model session
pub struct Predictor {
    params: ScalerParams,
    session: Box<dyn Session>,
}

impl std::fmt::Debug for Predictor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Predictor")
            .field("n_features", &self.params.n_features())
            .field("session_features", &self.session.n_features())
            .finish()
    }
}

impl Predictor {
    /// Combine scaler parameters with a session whose input width matches
    pub fn new(params: ScalerParams, session: Box<dyn Session>) -> Result<Self> {
        if let Some(n) = session.n_features() {
            if n != params.n_features() {
                return Err(HousingError::SchemaMismatch(format!(
                    "scaler has {} features, model expects {}",
                    params.n_features(),
                    n
                )));
            }
        }
        Ok(Self { params, session })
    }

    /// Build from a fitted scaler, also comparing feature names when both sides record them
    pub fn from_scaler(scaler: &StandardScaler, session: Box<dyn Session>) -> Result<Self> {
        if let Some(model_names) = session.feature_names() {
            let scaler_names = scaler.feature_names();
            if !scaler_names.is_empty() && scaler_names != model_names {
                return Err(HousingError::SchemaMismatch(format!(
                    "scaler features {:?} differ from model features {:?}",
                    scaler_names, model_names
                )));
            }
        }
        Self::new(scaler.params()?, session)
    }

    /// Load scaler parameters and a model; `.onnx` files run through [`ONNXSession`],
    /// anything else is read as a saved [`TrainedModel`]
    pub fn load(scaler_params_path: impl AsRef<Path>, model_path: impl AsRef<Path>) -> Result<Self> {
        let params = ScalerParams::load(scaler_params_path.as_ref())?;
        let model_path = model_path.as_ref();

        let is_onnx = model_path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("onnx"));

        let session: Box<dyn Session> = if is_onnx {
            Box::new(ONNXSession::load(model_path)?)
        } else {
            Box::new(TrainedModel::load(model_path)?)
        };

        info!(
            model = %model_path.display(),
            features = params.n_features(),
            "predictor loaded"
        );
        Self::new(params, session)
    }

    pub fn n_features(&self) -> usize {
        self.params.n_features()
    }

    pub fn params(&self) -> &ScalerParams {
        &self.params
    }

    pub fn feature_names(&self) -> Option<&[String]> {
        self.session.feature_names()
    }

    /// Predict the price (in millions) for one raw feature row
    pub fn predict(&self, values: &[f64]) -> Result<f64> {
        let scaled = self.params.apply(values)?;
        let input = Array2::from_shape_vec((1, scaled.len()), scaled.iter().map(|&v| v as f32).collect())?;
        let output = self.session.run(&input)?;

        output
            .iter()
            .next()
            .map(|&v| f64::from(v))
            .ok_or_else(|| HousingError::InferenceError("model produced no output".to_string()))
    }

    /// Predict one price per raw feature row
    pub fn predict_batch(&self, rows: &Array2<f64>) -> Result<Array1<f64>> {
        if rows.ncols() != self.params.n_features() {
            return Err(HousingError::InvalidInput(
                "Input size does not match scaler parameters".to_string(),
            ));
        }

        let mean = Array1::from_vec(self.params.mean.clone());
        let scale = Array1::from_vec(self.params.scale.clone());
        let scaled = ((rows - &mean) / &scale).mapv(|v| v as f32);

        let output = self.session.run(&scaled)?;
        if output.nrows() != rows.nrows() || output.ncols() == 0 {
            return Err(HousingError::InferenceError(format!(
                "model returned {}x{} for {} rows",
                output.nrows(),
                output.ncols(),
                rows.nrows()
            )));
        }
        Ok(output.column(0).mapv(f64::from))
    }
}

/// Parse `"3,2,85,..."` into feature values. Empty tokens are skipped.
pub fn parse_feature_list(input: &str) -> Result<Vec<f64>> {
    input
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(|token| {
            token
                .parse::<f64>()
                .map_err(|_| HousingError::InvalidInput(format!("'{}' is not a number", token)))
        })
        .collect()
}
