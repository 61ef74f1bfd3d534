//! Model export module
//!
//! Turns the training artifacts into files another runtime can load:
//! - ONNX protobuf for the network
//! - `{"mean": [...], "scale": [...]}` JSON for the scaler

mod onnx;
pub mod proto;

pub use onnx::{
    Dimension, ONNXAttribute, ONNXConfig, ONNXDataType, ONNXExportable, ONNXExporter, ONNXGraph,
    ONNXInitializer, ONNXNode, TensorSpec, FEATURE_NAMES_KEY, INPUT_NAME, OUTPUT_NAME,
};

use crate::error::Result;
use crate::pipeline::TrainedModel;
use crate::preprocessing::{ScalerParams, StandardScaler};
use std::path::Path;
use tracing::info;

/// Load a fitted scaler and write its portable parameters
pub fn export_scaler_params(scaler_path: impl AsRef<Path>, out_path: impl AsRef<Path>) -> Result<ScalerParams> {
    let scaler = StandardScaler::load(scaler_path.as_ref())?;
    let params = scaler.params()?;
    params.save(out_path.as_ref())?;

    info!(
        features = params.n_features(),
        path = %out_path.as_ref().display(),
        "scaler parameters exported"
    );
    Ok(params)
}

/// Load a saved model and write it as ONNX
pub fn export_model_onnx(
    model_path: impl AsRef<Path>,
    out_path: impl AsRef<Path>,
    config: ONNXConfig,
) -> Result<()> {
    let model = TrainedModel::load(model_path.as_ref())?;
    ONNXExporter::with_config(config).export(&model, out_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HousingError;
    use ndarray::array;
    use tempfile::tempdir;

    #[test]
    fn test_export_scaler_params() {
        let dir = tempdir().unwrap();
        let scaler_path = dir.path().join("scaler.json");
        let params_path = dir.path().join("scaler_params.json");

        let mut scaler = StandardScaler::new();
        scaler.fit(&array![[1.0, 10.0], [3.0, 10.0]]).unwrap();
        scaler.save(&scaler_path).unwrap();

        let params = export_scaler_params(&scaler_path, &params_path).unwrap();
        assert_eq!(params.mean, vec![2.0, 10.0]);
        assert_eq!(params.scale, vec![1.0, 1.0]);

        let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&params_path).unwrap()).unwrap();
        assert_eq!(json["mean"][0], 2.0);
        assert_eq!(json["scale"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_export_unfitted_scaler_fails() {
        let dir = tempdir().unwrap();
        let scaler_path = dir.path().join("scaler.json");
        std::fs::write(&scaler_path, r#"{"mean": null, "scale": null, "feature_names": []}"#).unwrap();

        let result = export_scaler_params(&scaler_path, dir.path().join("out.json"));
        assert!(matches!(result, Err(HousingError::ModelNotFitted)));
    }
}
