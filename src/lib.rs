//! housing-mlp - Housing price regression pipeline
//!
//! This crate turns a tabular housing-price dataset into a portable regression model:
//! - Data loading, cleaning, outlier trimming and encoding
//! - Standard scaling with a portable parameter export
//! - A feed-forward MLP regressor trained with Adam and early stopping
//! - Hyperparameter search with TPE or random sampling
//! - ONNX export and a self-contained ONNX evaluator for prediction
//!
//! # Modules
//!
//! ## Core
//! - [`preprocessing`] - Cleaning, outliers, encoding, split, scaling
//! - [`training`] - MLP regressor and regression metrics
//! - [`optimizer`] - Hyperparameter search (HyperOptX)
//! - [`pipeline`] - End-to-end training run and the saved model
//!
//! ## Artifacts
//! - [`export`] - ONNX and scaler-parameter export
//! - [`inference`] - Prediction from exported artifacts
//!
//! ## Support
//! - [`config`] - Pipeline configuration
//! - [`utils`] - Data loading and statistics
//! - [`cli`] - Command-line interface

// Core error handling
pub mod error;
pub mod config;

// Core ML modules
pub mod preprocessing;
pub mod training;
pub mod optimizer;
pub mod pipeline;

// Artifacts
pub mod export;
pub mod inference;

// Utilities
pub mod utils;
pub mod cli;

pub use error::{HousingError, Result};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{HousingError, Result};

    // Configuration
    pub use crate::config::{PipelineConfig, MlpSearchConfig, TrainingSettings, ArtifactPaths};

    // Preprocessing
    pub use crate::preprocessing::{
        HousingCleaner, PreprocessingConfig, OutlierDetector, Encoder, StandardScaler, ScalerParams,
        train_test_split,
    };

    // Training
    pub use crate::training::{MLPConfig, MLPRegressor, ModelMetrics, TrainingHistory};

    // Optimization
    pub use crate::optimizer::{HyperOptX, OptimizationConfig, SearchSpace, Study, TrialParams};

    // Pipeline
    pub use crate::pipeline::{TrainingPipeline, TrainedModel, PipelineSummary};

    // Export and inference
    pub use crate::export::{ONNXExporter, ONNXExportable, export_scaler_params};
    pub use crate::inference::{ONNXSession, Predictor, Session, parse_feature_list};

    // Data loading
    pub use crate::utils::DataLoader;
}
