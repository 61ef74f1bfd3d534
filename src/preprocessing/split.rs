//! Train/validation split

use crate::error::{HousingError, Result};
use ndarray::{Array1, Array2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

/// Rows partitioned into a training and a validation set
#[derive(Debug, Clone)]
pub struct DataSplit {
    pub x_train: Array2<f64>,
    pub x_valid: Array2<f64>,
    pub y_train: Array1<f64>,
    pub y_valid: Array1<f64>,
}

/// Shuffle the rows with a seeded permutation and hold out `ceil(test_size * n)` of them.
pub fn train_test_split(
    x: &Array2<f64>,
    y: &Array1<f64>,
    test_size: f64,
    seed: u64,
) -> Result<DataSplit> {
    let n = x.nrows();
    if y.len() != n {
        return Err(HousingError::ShapeError {
            expected: format!("{} targets", n),
            actual: format!("{} targets", y.len()),
        });
    }
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(HousingError::InvalidParameter {
            name: "test_size".to_string(),
            value: test_size.to_string(),
            reason: "must be in (0, 1)".to_string(),
        });
    }

    let n_test = (test_size * n as f64).ceil() as usize;
    if n_test == 0 || n_test >= n {
        return Err(HousingError::DataError(format!(
            "cannot split {} rows with test_size {}",
            n, test_size
        )));
    }

    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let (test_idx, train_idx) = indices.split_at(n_test);

    Ok(DataSplit {
        x_train: x.select(Axis(0), train_idx),
        x_valid: x.select(Axis(0), test_idx),
        y_train: y.select(Axis(0), train_idx),
        y_valid: y.select(Axis(0), test_idx),
    })
}
