//! Standard scaling

use crate::error::{HousingError, Result};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Portable scaler parameters: `{"mean": [...], "scale": [...]}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalerParams {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl ScalerParams {
    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    /// Scale one row: `(v - mean) / scale`
    pub fn apply(&self, values: &[f64]) -> Result<Vec<f64>> {
        if values.len() != self.mean.len() {
            return Err(HousingError::InvalidInput(
                "Input size does not match scaler parameters".to_string(),
            ));
        }
        Ok(values
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(v, (m, s))| (v - m) / s)
            .collect())
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let params: Self = serde_json::from_reader(reader)?;
        if params.mean.len() != params.scale.len() {
            return Err(HousingError::SerializationError(format!(
                "scaler params have {} means and {} scales",
                params.mean.len(),
                params.scale.len()
            )));
        }
        Ok(params)
    }
}

/// Standardizes features to zero mean and unit variance.
///
/// The scale is the population standard deviation; constant columns get a scale of 1.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Option<Array1<f64>>,
    scale: Option<Array1<f64>>,
    feature_names: Vec<String>,
}

impl StandardScaler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the feature names the scaler is fit on
    pub fn with_feature_names(mut self, names: Vec<String>) -> Self {
        self.feature_names = names;
        self
    }

    pub fn fit(&mut self, x: &Array2<f64>) -> Result<&mut Self> {
        if x.nrows() == 0 {
            return Err(HousingError::DataError("cannot fit scaler on empty data".to_string()));
        }
        if !self.feature_names.is_empty() && self.feature_names.len() != x.ncols() {
            return Err(HousingError::SchemaMismatch(format!(
                "{} feature names for {} columns",
                self.feature_names.len(),
                x.ncols()
            )));
        }

        let mean = x
            .mean_axis(Axis(0))
            .ok_or_else(|| HousingError::DataError("cannot compute mean".to_string()))?;
        let scale = x
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s == 0.0 || !s.is_finite() { 1.0 } else { s });

        self.mean = Some(mean);
        self.scale = Some(scale);
        Ok(self)
    }

    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let (mean, scale) = self.fitted()?;
        self.check_width(x.ncols())?;
        Ok((x - mean) / scale)
    }

    pub fn fit_transform(&mut self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.fit(x)?;
        self.transform(x)
    }

    pub fn inverse_transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let (mean, scale) = self.fitted()?;
        self.check_width(x.ncols())?;
        Ok(x * scale + mean)
    }

    pub fn is_fitted(&self) -> bool {
        self.mean.is_some()
    }

    pub fn n_features(&self) -> Option<usize> {
        self.mean.as_ref().map(|m| m.len())
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Portable mean/scale export
    pub fn params(&self) -> Result<ScalerParams> {
        let (mean, scale) = self.fitted()?;
        Ok(ScalerParams {
            mean: mean.to_vec(),
            scale: scale.to_vec(),
        })
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.fitted()?;
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let scaler: Self = serde_json::from_reader(reader)?;
        scaler.fitted()?;
        Ok(scaler)
    }

    fn fitted(&self) -> Result<(&Array1<f64>, &Array1<f64>)> {
        match (&self.mean, &self.scale) {
            (Some(mean), Some(scale)) => Ok((mean, scale)),
            _ => Err(HousingError::ModelNotFitted),
        }
    }

    fn check_width(&self, n_cols: usize) -> Result<()> {
        let expected = self.n_features().unwrap_or(0);
        if n_cols != expected {
            return Err(HousingError::ShapeError {
                expected: format!("{} features", expected),
                actual: format!("{} features", n_cols),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use tempfile::tempdir;

    #[test]
    fn test_standard_scaler_zero_mean_unit_std() {
        let x = array![[1.0, 10.0], [2.0, 20.0], [3.0, 30.0], [4.0, 40.0]];
        let mut scaler = StandardScaler::new();
        let scaled = scaler.fit_transform(&x).unwrap();

        let mean = scaled.mean_axis(Axis(0)).unwrap();
        let std = scaled.std_axis(Axis(0), 0.0);
        for j in 0..2 {
            assert!(mean[j].abs() < 1e-12);
            assert!((std[j] - 1.0).abs() < 1e-12);
        }

        let restored = scaler.inverse_transform(&scaled).unwrap();
        for (a, b) in restored.iter().zip(x.iter()) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn test_constant_column_gets_unit_scale() {
        let x = array![[5.0, 1.0], [5.0, 2.0]];
        let mut scaler = StandardScaler::new();
        scaler.fit(&x).unwrap();
        let params = scaler.params().unwrap();
        assert_eq!(params.scale[0], 1.0);
        assert_eq!(params.mean, vec![5.0, 1.5]);
        assert_eq!(params.scale[1], 0.5);
    }

    #[test]
    fn test_transform_errors() {
        let scaler = StandardScaler::new();
        assert!(matches!(
            scaler.transform(&array![[1.0]]),
            Err(HousingError::ModelNotFitted)
        ));

        let mut scaler = StandardScaler::new();
        scaler.fit(&array![[1.0, 2.0], [3.0, 4.0]]).unwrap();
        assert!(matches!(
            scaler.transform(&array![[1.0, 2.0, 3.0]]),
            Err(HousingError::ShapeError { .. })
        ));
    }

    #[test]
    fn test_feature_name_count_must_match() {
        let mut scaler = StandardScaler::new().with_feature_names(vec!["a".to_string()]);
        assert!(matches!(
            scaler.fit(&array![[1.0, 2.0]]),
            Err(HousingError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_save_load_and_params_file() {
        let dir = tempdir().unwrap();
        let mut scaler = StandardScaler::new().with_feature_names(vec!["a".into(), "b".into()]);
        scaler.fit(&array![[1.0, 4.0], [3.0, 8.0]]).unwrap();

        let path = dir.path().join("scaler.json");
        scaler.save(&path).unwrap();
        let loaded = StandardScaler::load(&path).unwrap();
        assert_eq!(loaded.feature_names(), scaler.feature_names());
        assert_eq!(loaded.params().unwrap(), scaler.params().unwrap());

        let params_path = dir.path().join("scaler_params.json");
        scaler.params().unwrap().save(&params_path).unwrap();
        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&params_path).unwrap()).unwrap();
        assert_eq!(raw["mean"], serde_json::json!([2.0, 6.0]));
        assert_eq!(raw["scale"], serde_json::json!([1.0, 2.0]));
    }

    #[test]
    fn test_params_apply_checks_width() {
        let params = ScalerParams {
            mean: vec![1.0, 2.0],
            scale: vec![2.0, 4.0],
        };
        assert_eq!(params.apply(&[3.0, 6.0]).unwrap(), vec![1.0, 1.0]);
        let err = params.apply(&[1.0]).unwrap_err();
        assert!(err.to_string().contains("Input size does not match scaler parameters"));
    }
}
