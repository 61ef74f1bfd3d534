//! Categorical encoding

use crate::error::{HousingError, Result};
use super::{is_numeric_dtype, numeric_chunked};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Type of encoder to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncoderType {
    /// One-hot encoding, one `{column}_{category}` indicator per category
    OneHot,
    /// Label encoding (ordinal code in sorted category order)
    Label,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ColumnEncoding {
    column: String,
    encoding: EncoderType,
    /// Sorted categories seen during fit
    categories: Vec<String>,
}

impl ColumnEncoding {
    fn code(&self, value: &str) -> Option<usize> {
        self.categories.binary_search_by(|c| c.as_str().cmp(value)).ok()
    }

    fn dummy_name(&self, category: &str) -> String {
        format!("{}_{}", self.column, category)
    }
}

/// Categorical encoder.
///
/// Non-numeric, non-boolean columns are categorical. The output keeps every other
/// column in frame order (as f64) and appends the indicator columns after them,
/// column by column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Encoder {
    encoder_type: EncoderType,
    max_onehot_categories: Option<usize>,
    encodings: Vec<ColumnEncoding>,
    feature_names: Vec<String>,
    is_fitted: bool,
}

impl Encoder {
    /// Create a new encoder
    pub fn new(encoder_type: EncoderType) -> Self {
        Self {
            encoder_type,
            max_onehot_categories: None,
            encodings: Vec::new(),
            feature_names: Vec::new(),
            is_fitted: false,
        }
    }

    /// Label-encode one-hot columns whose cardinality exceeds `max`
    pub fn with_max_onehot_categories(mut self, max: Option<usize>) -> Self {
        self.max_onehot_categories = max;
        self
    }

    /// Detect categorical columns and record their categories
    pub fn fit(&mut self, df: &DataFrame) -> Result<&mut Self> {
        self.encodings.clear();

        for column in df.get_columns() {
            let series = column.as_materialized_series();
            if is_passthrough(series.dtype()) {
                continue;
            }

            let as_str = series.cast(&DataType::String)?;
            let categories: Vec<String> = as_str
                .str()?
                .into_iter()
                .flatten()
                .map(|s| s.to_string())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();

            let encoding = match (self.encoder_type, self.max_onehot_categories) {
                (EncoderType::OneHot, Some(max)) if categories.len() > max => {
                    info!(
                        column = %series.name(),
                        categories = categories.len(),
                        max,
                        "too many categories for one-hot, label-encoding instead"
                    );
                    EncoderType::Label
                }
                (kind, _) => kind,
            };

            debug!(column = %series.name(), categories = categories.len(), ?encoding, "categorical column");
            self.encodings.push(ColumnEncoding {
                column: series.name().to_string(),
                encoding,
                categories,
            });
        }

        self.feature_names = self.output_names(df);
        self.is_fitted = true;
        Ok(self)
    }

    /// Encode a frame with the fitted categories.
    ///
    /// Unseen categories encode as all zeros (one-hot) or null (label).
    pub fn transform(&self, df: &DataFrame) -> Result<DataFrame> {
        if !self.is_fitted {
            return Err(HousingError::ModelNotFitted);
        }

        let mut kept: Vec<Column> = Vec::with_capacity(df.width());
        let mut dummies: Vec<Column> = Vec::new();

        for column in df.get_columns() {
            let series = column.as_materialized_series();
            let name = series.name().to_string();

            let Some(enc) = self.encodings.iter().find(|e| e.column == name) else {
                kept.push(numeric_chunked(series)?.into_series().into());
                continue;
            };

            let as_str = series.cast(&DataType::String)?;
            let ca = as_str.str()?;

            match enc.encoding {
                EncoderType::Label => {
                    let codes: Vec<Option<f64>> = ca
                        .into_iter()
                        .map(|v| v.and_then(|s| enc.code(s)).map(|c| c as f64))
                        .collect();
                    kept.push(Series::new(name.as_str().into(), codes).into());
                }
                EncoderType::OneHot => {
                    let codes: Vec<Option<usize>> =
                        ca.into_iter().map(|v| v.and_then(|s| enc.code(s))).collect();
                    for (idx, category) in enc.categories.iter().enumerate() {
                        let values: Vec<f64> = codes
                            .iter()
                            .map(|c| if *c == Some(idx) { 1.0 } else { 0.0 })
                            .collect();
                        dummies.push(Series::new(enc.dummy_name(category).into(), values).into());
                    }
                }
            }
        }

        kept.extend(dummies);
        Ok(DataFrame::new(kept)?)
    }

    /// Fit and transform in one step
    pub fn fit_transform(&mut self, df: &DataFrame) -> Result<DataFrame> {
        self.fit(df)?;
        self.transform(df)
    }

    /// Output column names of the fitted frame
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Names of the columns treated as categorical
    pub fn categorical_columns(&self) -> Vec<&str> {
        self.encodings.iter().map(|e| e.column.as_str()).collect()
    }

    pub fn is_fitted(&self) -> bool {
        self.is_fitted
    }

    fn output_names(&self, df: &DataFrame) -> Vec<String> {
        let mut kept = Vec::new();
        let mut dummies = Vec::new();

        for name in df.get_column_names() {
            match self.encodings.iter().find(|e| e.column == name.as_str()) {
                Some(enc) if enc.encoding == EncoderType::OneHot => {
                    dummies.extend(enc.categories.iter().map(|c| enc.dummy_name(c)));
                }
                _ => kept.push(name.to_string()),
            }
        }

        kept.extend(dummies);
        kept
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new(EncoderType::OneHot)
    }
}

fn is_passthrough(dtype: &DataType) -> bool {
    is_numeric_dtype(dtype) || matches!(dtype, DataType::Boolean)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_df() -> DataFrame {
        DataFrame::new(vec![
            Series::new("Location".into(), &[Some("Davao"), Some("Cebu"), None, Some("Cebu")]).into(),
            Series::new("Bedrooms".into(), &[2i64, 3, 1, 4]).into(),
            Series::new("Type".into(), &["House", "Condo", "House", "Lot"]).into(),
            Series::new("Furnished".into(), &[true, false, true, false]).into(),
            Series::new("Price_millions".into(), &[1.0, 2.0, 3.0, 4.0]).into(),
        ])
        .unwrap()
    }

    #[test]
    fn test_onehot_column_order_matches_get_dummies() {
        let df = create_test_df();
        let mut encoder = Encoder::default();
        let encoded = encoder.fit_transform(&df).unwrap();

        let names: Vec<String> = encoded
            .get_column_names()
            .into_iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "Bedrooms",
                "Furnished",
                "Price_millions",
                "Location_Cebu",
                "Location_Davao",
                "Type_Condo",
                "Type_House",
                "Type_Lot",
            ]
        );
        assert_eq!(encoder.feature_names(), names.as_slice());
    }

    #[test]
    fn test_onehot_values_and_nulls() {
        let df = create_test_df();
        let mut encoder = Encoder::default();
        let encoded = encoder.fit_transform(&df).unwrap();

        let cebu: Vec<f64> = encoded.column("Location_Cebu").unwrap().f64().unwrap().into_no_null_iter().collect();
        let davao: Vec<f64> = encoded.column("Location_Davao").unwrap().f64().unwrap().into_no_null_iter().collect();
        assert_eq!(cebu, vec![0.0, 1.0, 0.0, 1.0]);
        // Null location is all zeros
        assert_eq!(davao, vec![1.0, 0.0, 0.0, 0.0]);

        let furnished: Vec<f64> = encoded.column("Furnished").unwrap().f64().unwrap().into_no_null_iter().collect();
        assert_eq!(furnished, vec![1.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_label_fallback_for_high_cardinality() {
        let df = create_test_df();
        let mut encoder = Encoder::default().with_max_onehot_categories(Some(2));
        let encoded = encoder.fit_transform(&df).unwrap();

        // Type has 3 categories: label-encoded in place
        assert!(encoded.column("Type_House").is_err());
        let codes: Vec<f64> = encoded.column("Type").unwrap().f64().unwrap().into_no_null_iter().collect();
        assert_eq!(codes, vec![1.0, 0.0, 1.0, 2.0]);
        assert!(encoded.column("Location_Cebu").is_ok());
    }

    #[test]
    fn test_unseen_category_is_all_zeros() {
        let mut encoder = Encoder::default();
        encoder.fit(&create_test_df()).unwrap();

        let other = DataFrame::new(vec![
            Series::new("Location".into(), &["Iloilo"]).into(),
            Series::new("Bedrooms".into(), &[1i64]).into(),
            Series::new("Type".into(), &["House"]).into(),
            Series::new("Furnished".into(), &[false]).into(),
            Series::new("Price_millions".into(), &[1.0]).into(),
        ])
        .unwrap();
        let encoded = encoder.transform(&other).unwrap();
        assert_eq!(encoded.column("Location_Cebu").unwrap().f64().unwrap().get(0), Some(0.0));
        assert_eq!(encoded.column("Type_House").unwrap().f64().unwrap().get(0), Some(1.0));
    }

    #[test]
    fn test_transform_before_fit() {
        let encoder = Encoder::default();
        assert!(matches!(
            encoder.transform(&create_test_df()),
            Err(HousingError::ModelNotFitted)
        ));
    }
}
