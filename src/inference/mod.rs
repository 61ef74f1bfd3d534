//! Inference module
//!
//! Reproduces the prediction path of the trained pipeline from saved artifacts:
//! raw features are standardized with the exported scaler parameters and run
//! through either the ONNX graph or the saved model.

mod predictor;
mod session;

pub use predictor::{parse_feature_list, Predictor};
pub use session::{ONNXSession, Session};
