//! Data preprocessing module
//!
//! Turns the raw housing table into a numeric design matrix:
//! - Cleaning (duplicates, currency parsing, essential-column filtering, median fill)
//! - Quantile-based outlier trimming
//! - Categorical encoding (one-hot with `get_dummies` column naming)
//! - Train/validation split
//! - Standard scaling with a portable parameter export

mod config;
mod cleaning;
mod encoder;
mod scaler;
mod split;
pub mod outlier;

pub use config::PreprocessingConfig;
pub use cleaning::{HousingCleaner, CleaningReport};
pub use encoder::{Encoder, EncoderType};
pub use scaler::{StandardScaler, ScalerParams};
pub use split::{train_test_split, DataSplit};
pub use outlier::{OutlierDetector, OutlierMethod, OutlierStrategy, OutlierBounds};

use crate::error::{HousingError, Result};
use crate::utils::median;
use ndarray::{Array1, Array2};
use polars::prelude::*;

/// Check if dtype is numeric
pub(crate) fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

/// Parse a numeric string, treating anything unparsable as missing
pub(crate) fn parse_number(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|v| !v.is_nan())
}

/// Coerce a series to optional f64 values.
///
/// String columns are parsed value by value; numeric and boolean columns are cast.
/// NaN is reported as missing.
pub(crate) fn numeric_values(series: &Series) -> Result<Vec<Option<f64>>> {
    match series.dtype() {
        DataType::String => {
            let ca = series.str()?;
            Ok(ca.into_iter().map(|v| v.and_then(parse_number)).collect())
        }
        _ => {
            let casted = series.cast(&DataType::Float64)?;
            let ca = casted.f64()?;
            Ok(ca.into_iter().map(|v| v.filter(|x| !x.is_nan())).collect())
        }
    }
}

/// Coerce a series to a named `Float64Chunked`, with NaN and unparsable values as nulls
pub(crate) fn numeric_chunked(series: &Series) -> Result<Float64Chunked> {
    let ca: Float64Chunked = numeric_values(series)?.into_iter().collect();
    Ok(ca.with_name(series.name().clone()))
}

/// Keep the rows whose mask entry is `true`
pub(crate) fn filter_rows(df: &DataFrame, keep: &[bool]) -> Result<DataFrame> {
    let mask = BooleanChunked::from_slice("mask".into(), keep);
    Ok(df.filter(&mask)?)
}

/// Numeric design matrix extracted from an encoded frame
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    pub x: Array2<f64>,
    pub y: Array1<f64>,
    pub feature_names: Vec<String>,
}

impl FeatureMatrix {
    /// Separate the target column from the features.
    ///
    /// Feature columns keep their frame order. Nulls left in a feature column are
    /// filled with that column's median when `fill_missing` is set, otherwise they
    /// are an error.
    pub fn from_frame(df: &DataFrame, target: &str, fill_missing: bool) -> Result<Self> {
        let target_col = df
            .column(target)
            .map_err(|_| HousingError::FeatureNotFound(target.to_string()))?;
        let y_values = numeric_values(target_col.as_materialized_series())?;
        if y_values.iter().any(|v| v.is_none()) {
            return Err(HousingError::PreprocessingError(format!(
                "target column '{}' contains missing values",
                target
            )));
        }
        let y: Array1<f64> = y_values.into_iter().flatten().collect();

        let feature_names: Vec<String> = df
            .get_column_names()
            .into_iter()
            .filter(|name| name.as_str() != target)
            .map(|s| s.to_string())
            .collect();

        if feature_names.is_empty() {
            return Err(HousingError::PreprocessingError(
                "no feature columns left after encoding".to_string(),
            ));
        }

        let col_data: Vec<Vec<f64>> = feature_names
            .iter()
            .map(|name| {
                let column = df
                    .column(name)
                    .map_err(|_| HousingError::FeatureNotFound(name.clone()))?;
                let values = numeric_chunked(column.as_materialized_series())?;
                Self::complete_column(name, &values, fill_missing)
            })
            .collect::<Result<Vec<Vec<f64>>>>()?;

        let n_rows = df.height();
        let x = Array2::from_shape_fn((n_rows, feature_names.len()), |(r, c)| col_data[c][r]);

        Ok(Self { x, y, feature_names })
    }

    fn complete_column(name: &str, values: &Float64Chunked, fill_missing: bool) -> Result<Vec<f64>> {
        let missing = values.null_count();
        if missing == 0 {
            return Ok(values.into_no_null_iter().collect());
        }
        if !fill_missing {
            return Err(HousingError::PreprocessingError(format!(
                "feature column '{}' has {} missing values",
                name, missing
            )));
        }

        let fill = median(values).unwrap_or(0.0);
        tracing::warn!(column = name, missing, fill, "filling remaining nulls with median");
        Ok(values.fill_null_with_values(fill)?.into_no_null_iter().collect())
    }

    pub fn n_samples(&self) -> usize {
        self.x.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.x.ncols()
    }
}
