//! Error types for the housing price pipeline

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, HousingError>;

/// Main error type for the pipeline
#[derive(Error, Debug)]
pub enum HousingError {
    #[error("Data error: {0}")]
    DataError(String),

    #[error("Preprocessing error: {0}")]
    PreprocessingError(String),

    #[error("Training error: {0}")]
    TrainingError(String),

    #[error("Inference error: {0}")]
    InferenceError(String),

    #[error("Optimization error: {0}")]
    OptimizationError(String),

    #[error("Export error: {0}")]
    ExportError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Feature not found: {0}")]
    FeatureNotFound(String),

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Feature schema mismatch: {0}")]
    SchemaMismatch(String),
}

impl From<polars::error::PolarsError> for HousingError {
    fn from(err: polars::error::PolarsError) -> Self {
        HousingError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for HousingError {
    fn from(err: serde_json::Error) -> Self {
        HousingError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for HousingError {
    fn from(err: ndarray::ShapeError) -> Self {
        HousingError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}

impl From<prost::DecodeError> for HousingError {
    fn from(err: prost::DecodeError) -> Self {
        HousingError::SerializationError(format!("ONNX decode failed: {}", err))
    }
}
