//! Cleaning of the raw housing table

use crate::error::{HousingError, Result};
use crate::utils::median;
use super::{filter_rows, is_numeric_dtype, numeric_chunked, numeric_values, parse_number, PreprocessingConfig};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, warn};

/// Row counts and fills recorded while cleaning
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleaningReport {
    pub initial_rows: usize,
    pub duplicates_removed: usize,
    pub missing_essential_removed: usize,
    pub rows_after_cleaning: usize,
    /// Column -> (number of nulls filled, fill value)
    pub median_fills: HashMap<String, (usize, f64)>,
}

/// Cleans the raw table according to a [`PreprocessingConfig`]
#[derive(Debug, Clone)]
pub struct HousingCleaner {
    config: PreprocessingConfig,
}

impl HousingCleaner {
    pub fn new(config: PreprocessingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PreprocessingConfig {
        &self.config
    }

    /// Run every cleaning step and append the target column
    pub fn clean(&self, df: &DataFrame) -> Result<(DataFrame, CleaningReport)> {
        let mut report = CleaningReport {
            initial_rows: df.height(),
            ..Default::default()
        };
        info!(rows = report.initial_rows, "initial rows");

        let mut df = if self.config.drop_duplicates {
            // Nulls compare equal, the first occurrence is kept
            let deduped = df.unique_stable(None, UniqueKeepStrategy::First, None)?;
            report.duplicates_removed = df.height() - deduped.height();
            deduped
        } else {
            df.clone()
        };

        let prices = self.parse_prices(&df)?;
        df.with_column(Series::new(self.config.price_column.as_str().into(), prices))?;

        let before = df.height();
        df = self.drop_missing_essentials(&df)?;
        report.missing_essential_removed = before - df.height();

        // Coercion runs after the essential filter: values that fail to parse here
        // stay null until outlier trimming removes them.
        for name in &self.config.numeric_columns {
            let Ok(column) = df.column(name) else {
                warn!(column = %name, "numeric column not present, skipping coercion");
                continue;
            };
            let values = numeric_chunked(column.as_materialized_series())?;
            df.with_column(values.into_series())?;
        }

        for name in &self.config.median_fill_columns {
            let Ok(column) = df.column(name) else {
                warn!(column = %name, "fill column not present, skipping");
                continue;
            };
            let values = numeric_chunked(column.as_materialized_series())?;
            let Some(fill) = median(&values) else {
                warn!(column = %name, "column has no values, median fill skipped");
                continue;
            };
            let n_missing = values.null_count();
            df.with_column(values.fill_null_with_values(fill)?.into_series())?;
            report.median_fills.insert(name.clone(), (n_missing, fill));
        }

        report.rows_after_cleaning = df.height();
        info!(rows = report.rows_after_cleaning, "after cleaning");

        let df = self.derive_target(&df)?;
        Ok((df, report))
    }

    /// Strip currency markers and separators, then parse. Unparsable prices become null.
    fn parse_prices(&self, df: &DataFrame) -> Result<Vec<Option<f64>>> {
        let column = df
            .column(&self.config.price_column)
            .map_err(|_| HousingError::FeatureNotFound(self.config.price_column.clone()))?;
        let series = column.as_materialized_series();

        if is_numeric_dtype(series.dtype()) {
            return numeric_values(series);
        }

        let as_str = series.cast(&DataType::String)?;
        let ca = as_str.str()?;
        Ok(ca
            .into_iter()
            .map(|v| v.and_then(|raw| parse_number(&self.strip_price(raw))))
            .collect())
    }

    pub(crate) fn strip_price(&self, raw: &str) -> String {
        let mut s = raw.to_string();
        for marker in &self.config.currency_markers {
            s = s.replace(marker.as_str(), "");
        }
        if !self.config.thousands_separator.is_empty() {
            s = s.replace(self.config.thousands_separator.as_str(), "");
        }
        s.trim().to_string()
    }

    fn drop_missing_essentials(&self, df: &DataFrame) -> Result<DataFrame> {
        let mut keep = vec![true; df.height()];

        for name in &self.config.essential_columns {
            let column = df
                .column(name)
                .map_err(|_| HousingError::FeatureNotFound(name.clone()))?;
            let series = column.as_materialized_series();

            // Float NaN counts as missing, like nulls
            let missing: Vec<bool> = match series.dtype() {
                DataType::Float32 | DataType::Float64 => {
                    let casted = series.cast(&DataType::Float64)?;
                    casted
                        .f64()?
                        .into_iter()
                        .map(|v| v.map_or(true, |x| x.is_nan()))
                        .collect()
                }
                _ => series.is_null().into_iter().map(|v| v.unwrap_or(true)).collect(),
            };

            for (k, m) in keep.iter_mut().zip(missing) {
                *k &= !m;
            }
        }

        filter_rows(df, &keep)
    }

    fn derive_target(&self, df: &DataFrame) -> Result<DataFrame> {
        let price = df.column(&self.config.price_column)?;
        let target: Vec<Option<f64>> = numeric_values(price.as_materialized_series())?
            .into_iter()
            .map(|v| v.map(|p| p / self.config.target_divisor))
            .collect();

        let mut result = df.drop(&self.config.price_column)?;
        result.with_column(Series::new(self.config.target_column.as_str().into(), target))?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_frame() -> DataFrame {
        DataFrame::new(vec![
            Series::new(
                "Price (PHP)".into(),
                &[
                    Some("₱1,500,000"),
                    Some("â‚±2,000,000"),
                    Some("₱1,500,000"),
                    Some("call for price"),
                    Some("₱3,250,000"),
                    None,
                ],
            )
            .into(),
            Series::new(
                "Floor_area (sqm)".into(),
                &[Some("50"), Some("80"), Some("50"), Some("60"), Some("big"), Some("70")],
            )
            .into(),
            Series::new("Bedrooms".into(), &[Some(2i64), Some(3), Some(2), Some(2), Some(4), Some(3)]).into(),
            Series::new("Bath".into(), &[Some(1.0), None, Some(1.0), Some(1.0), Some(3.0), Some(2.0)]).into(),
            Series::new(
                "Land_area (sqm)".into(),
                &[Some(100.0), Some(120.0), Some(100.0), None, None, Some(90.0)],
            )
            .into(),
            Series::new("Location".into(), &["Cebu", "Davao", "Cebu", "Manila", "Cebu", "Davao"]).into(),
        ])
        .unwrap()
    }

    #[test]
    fn test_strip_price() {
        let cleaner = HousingCleaner::new(PreprocessingConfig::default());
        assert_eq!(cleaner.strip_price("₱1,234,567"), "1234567");
        assert_eq!(cleaner.strip_price("â‚±2,000"), "2000");
        assert_eq!(cleaner.strip_price(" 999 "), "999");
    }

    #[test]
    fn test_duplicates_with_nulls_compare_equal() {
        let df = DataFrame::new(vec![
            Series::new("Price (PHP)".into(), &["₱1,000,000", "₱1,000,000", "₱2,000,000", "₱1,000,000"]).into(),
            Series::new("Floor_area (sqm)".into(), &[50.0, 50.0, 60.0, 50.0]).into(),
            Series::new("Bedrooms".into(), &[2i64, 2, 3, 2]).into(),
            Series::new("Bath".into(), &[None, None, Some(1.0), Some(1.0)]).into(),
        ])
        .unwrap();

        let cleaner = HousingCleaner::new(PreprocessingConfig::default());
        let (cleaned, report) = cleaner.clean(&df).unwrap();
        assert_eq!(report.duplicates_removed, 1);
        let prices: Vec<f64> = cleaned.column("Price_millions").unwrap().f64().unwrap().into_no_null_iter().collect();
        assert_eq!(prices, vec![1.0, 2.0, 1.0]);
    }

    #[test]
    fn test_clean_pipeline() {
        let cleaner = HousingCleaner::new(PreprocessingConfig::default());
        let (df, report) = cleaner.clean(&raw_frame()).unwrap();

        assert_eq!(report.initial_rows, 6);
        assert_eq!(report.duplicates_removed, 1);
        // "call for price" and the null price are dropped
        assert_eq!(report.missing_essential_removed, 2);
        assert_eq!(report.rows_after_cleaning, 3);

        // Raw price replaced by the target in millions
        assert!(df.column("Price (PHP)").is_err());
        let target: Vec<f64> = df
            .column("Price_millions")
            .unwrap()
            .f64()
            .unwrap()
            .into_iter()
            .flatten()
            .collect();
        assert_eq!(target, vec![1.5, 2.0, 3.25]);

        // "big" survives the essential filter and is coerced to null
        let area = df.column("Floor_area (sqm)").unwrap();
        assert_eq!(area.dtype(), &DataType::Float64);
        assert_eq!(area.null_count(), 1);

        // Bath null filled with median of [1.0, 3.0]
        let bath: Vec<f64> = df
            .column("Bath")
            .unwrap()
            .f64()
            .unwrap()
            .into_iter()
            .flatten()
            .collect();
        assert_eq!(bath, vec![1.0, 2.0, 3.0]);
        assert_eq!(report.median_fills.get("Bath"), Some(&(1, 2.0)));
    }

    #[test]
    fn test_missing_essential_column_is_error() {
        let df = DataFrame::new(vec![
            Series::new("Price (PHP)".into(), &["₱1,000"]).into(),
        ])
        .unwrap();
        let cleaner = HousingCleaner::new(PreprocessingConfig::default());
        assert!(matches!(
            cleaner.clean(&df),
            Err(HousingError::FeatureNotFound(_))
        ));
    }
}
