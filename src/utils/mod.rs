//! Utility functions and types

pub mod data_loader;

pub use data_loader::{DataLoader, DataSaver, FileInfo, DEFAULT_NA_VALUES};

use crate::error::Result;
use polars::prelude::*;

/// Quantile with linear interpolation between order statistics.
///
/// Nulls are skipped. Returns `None` when no value is present.
pub fn quantile(values: &Float64Chunked, q: f64) -> Result<Option<f64>> {
    Ok(values.quantile(q.clamp(0.0, 1.0), QuantileMethod::Linear)?)
}

/// Median of non-null values
pub fn median(values: &Float64Chunked) -> Option<f64> {
    values.median()
}
