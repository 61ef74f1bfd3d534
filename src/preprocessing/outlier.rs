//! Outlier detection and handling
//!
//! Bounds are fitted one column at a time on the rows that survived the previous
//! column, so the order of `columns` matters when rows are removed.

use crate::error::Result;
use crate::utils::quantile;
use super::numeric_chunked;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Method for outlier detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OutlierMethod {
    /// Quantile bounds, both given as fractions in `[0, 1]`
    Quantile { lower: f64, upper: f64 },
    /// Interquartile Range method
    IQR { factor: f64 },
    /// Z-score (population standard deviations from mean)
    ZScore { threshold: f64 },
}

impl Default for OutlierMethod {
    fn default() -> Self {
        OutlierMethod::Quantile { lower: 0.01, upper: 0.99 }
    }
}

/// Strategy for handling detected outliers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutlierStrategy {
    /// Remove rows outside the bounds; rows with a null in the column are removed too
    Remove,
    /// Clip values to the bounds; nulls are left alone
    Clip,
}

impl Default for OutlierStrategy {
    fn default() -> Self {
        OutlierStrategy::Remove
    }
}

/// Fitted bounds for a column
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlierBounds {
    pub column: String,
    pub lower: f64,
    pub upper: f64,
    /// Rows removed or values clipped for this column
    pub affected: usize,
}

/// Outlier detector and handler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlierDetector {
    method: OutlierMethod,
    strategy: OutlierStrategy,
    columns: Vec<String>,
    bounds: Vec<OutlierBounds>,
}

impl OutlierDetector {
    /// Create a new outlier detector
    pub fn new(method: OutlierMethod, strategy: OutlierStrategy) -> Self {
        Self {
            method,
            strategy,
            columns: Vec::new(),
            bounds: Vec::new(),
        }
    }

    /// Quantile trimming between `lower` and `upper`
    pub fn quantile(lower: f64, upper: f64) -> Self {
        Self::new(OutlierMethod::Quantile { lower, upper }, OutlierStrategy::Remove)
    }

    /// Set the handling strategy
    pub fn with_strategy(mut self, strategy: OutlierStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the columns to process, in order
    pub fn with_columns(mut self, columns: Vec<String>) -> Self {
        self.columns = columns;
        self
    }

    /// Get the bounds fitted by the last `apply`
    pub fn bounds(&self) -> &[OutlierBounds] {
        &self.bounds
    }

    /// Fit bounds and handle outliers column by column.
    /// Columns missing from the frame are skipped.
    pub fn apply(&mut self, df: &DataFrame) -> Result<DataFrame> {
        self.bounds.clear();
        let mut result = df.clone();

        for col_name in &self.columns {
            let Ok(column) = result.column(col_name) else {
                warn!(column = %col_name, "outlier column not present, skipping");
                continue;
            };
            let values = numeric_chunked(column.as_materialized_series())?;

            let Some((lower, upper)) = self.compute_bounds(&values)? else {
                debug!(column = %col_name, "no values to fit bounds on");
                continue;
            };

            let affected = match self.strategy {
                OutlierStrategy::Remove => {
                    let inside = &values.gt_eq(lower) & &values.lt_eq(upper);
                    let before = result.height();
                    result = result.filter(&inside.fill_null_with_values(false)?)?;
                    before - result.height()
                }
                OutlierStrategy::Clip => {
                    let clipped_count = values.iter().flatten().filter(|&x| x < lower || x > upper).count();
                    let clipped: Float64Chunked = values.iter().map(|v| v.map(|x| x.clamp(lower, upper))).collect();
                    result.with_column(clipped.with_name(col_name.as_str().into()).into_series())?;
                    clipped_count
                }
            };

            info!(column = %col_name, lower, upper, affected, "outlier bounds applied");
            self.bounds.push(OutlierBounds {
                column: col_name.clone(),
                lower,
                upper,
                affected,
            });
        }

        Ok(result)
    }

    fn compute_bounds(&self, values: &Float64Chunked) -> Result<Option<(f64, f64)>> {
        if values.null_count() == values.len() {
            return Ok(None);
        }

        let bounds = match &self.method {
            OutlierMethod::Quantile { lower, upper } => quantile(values, *lower)?.zip(quantile(values, *upper)?),
            OutlierMethod::IQR { factor } => {
                quantile(values, 0.25)?.zip(quantile(values, 0.75)?).map(|(q1, q3)| {
                    let iqr = q3 - q1;
                    (q1 - factor * iqr, q3 + factor * iqr)
                })
            }
            OutlierMethod::ZScore { threshold } => values
                .mean()
                .zip(values.std(0))
                .map(|(mean, std)| (mean - threshold * std, mean + threshold * std)),
        };

        Ok(bounds)
    }
}

impl Default for OutlierDetector {
    fn default() -> Self {
        Self::quantile(0.01, 0.99)
    }
}
