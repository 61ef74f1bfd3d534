//! Preprocessing configuration

use serde::{Deserialize, Serialize};
use super::{OutlierMethod, OutlierStrategy};

/// Configuration for cleaning and feature engineering of the housing table
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessingConfig {
    /// Raw price column (currency-formatted strings)
    pub price_column: String,

    /// Currency markers stripped from price strings, applied in order
    pub currency_markers: Vec<String>,

    /// Thousands separator stripped from price strings
    pub thousands_separator: String,

    /// Rows missing any of these are dropped
    pub essential_columns: Vec<String>,

    /// Columns coerced to numeric (unparsable values become null)
    pub numeric_columns: Vec<String>,

    /// Non-essential numeric columns whose nulls are filled with the median
    pub median_fill_columns: Vec<String>,

    /// Name of the derived target column
    pub target_column: String,

    /// Divisor applied to the price to obtain the target
    pub target_divisor: f64,

    /// Whether exact duplicate rows are removed
    pub drop_duplicates: bool,

    /// Columns trimmed for outliers, in order
    pub outlier_columns: Vec<String>,

    /// Outlier bounds
    pub outlier_method: OutlierMethod,

    /// What to do with rows outside the bounds
    pub outlier_strategy: OutlierStrategy,

    /// Columns with more categories than this are label-encoded instead of one-hot
    pub max_onehot_categories: Option<usize>,

    /// Fill nulls left in other feature columns with the column median
    pub fill_remaining_with_median: bool,
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self {
            price_column: "Price (PHP)".to_string(),
            // The mojibake form shows up when the CSV was saved as cp1252
            currency_markers: vec!["â‚±".to_string(), "₱".to_string()],
            thousands_separator: ",".to_string(),
            essential_columns: vec![
                "Price (PHP)".to_string(),
                "Floor_area (sqm)".to_string(),
                "Bedrooms".to_string(),
            ],
            numeric_columns: vec![
                "Floor_area (sqm)".to_string(),
                "Bedrooms".to_string(),
                "Bath".to_string(),
                "Land_area (sqm)".to_string(),
            ],
            median_fill_columns: vec!["Bath".to_string(), "Land_area (sqm)".to_string()],
            target_column: "Price_millions".to_string(),
            target_divisor: 1e6,
            drop_duplicates: true,
            outlier_columns: vec![
                "Floor_area (sqm)".to_string(),
                "Land_area (sqm)".to_string(),
                "Bedrooms".to_string(),
                "Bath".to_string(),
            ],
            outlier_method: OutlierMethod::Quantile { lower: 0.01, upper: 0.99 },
            outlier_strategy: OutlierStrategy::Remove,
            max_onehot_categories: None,
            fill_remaining_with_median: true,
        }
    }
}

impl PreprocessingConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to set the outlier method
    pub fn with_outlier_method(mut self, method: OutlierMethod) -> Self {
        self.outlier_method = method;
        self
    }

    /// Builder method to set the outlier strategy
    pub fn with_outlier_strategy(mut self, strategy: OutlierStrategy) -> Self {
        self.outlier_strategy = strategy;
        self
    }

    /// Builder method to cap one-hot cardinality
    pub fn with_max_onehot_categories(mut self, max: usize) -> Self {
        self.max_onehot_categories = Some(max);
        self
    }

    /// Builder method to toggle duplicate removal
    pub fn with_drop_duplicates(mut self, drop: bool) -> Self {
        self.drop_duplicates = drop;
        self
    }
}
