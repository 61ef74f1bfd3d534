//! Model training module
//!
//! Provides the feed-forward regression network and its evaluation metrics:
//! - Multi-layer perceptron with Adam or momentum SGD
//! - Early stopping on a validation set with best-weight restore
//! - Regression metrics (MSE, RMSE, MAE, R²)

mod metrics;
pub mod neural_network;

pub use metrics::ModelMetrics;
pub use neural_network::{Activation, MLPConfig, MLPRegressor, OptimizerKind, TrainingHistory};
