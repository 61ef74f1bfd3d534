//! Neural Network (Multi-Layer Perceptron) regressor
//!
//! A feedforward network with dense hidden layers and a single linear output unit,
//! trained on mean squared error with mini-batch Adam or momentum SGD.

use ndarray::{Array, Array1, Array2, Axis, Dimension, Zip};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{HousingError, Result};

/// Activation function for hidden layers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    /// Rectified Linear Unit
    ReLU,
    /// Sigmoid
    Sigmoid,
    /// Hyperbolic tangent
    Tanh,
    /// Linear (identity)
    Linear,
}

impl Default for Activation {
    fn default() -> Self {
        Self::ReLU
    }
}

impl Activation {
    fn apply(self, z: &Array2<f64>) -> Array2<f64> {
        match self {
            Activation::ReLU => z.mapv(|v| v.max(0.0)),
            Activation::Sigmoid => z.mapv(|v| 1.0 / (1.0 + (-v).exp())),
            Activation::Tanh => z.mapv(f64::tanh),
            Activation::Linear => z.clone(),
        }
    }

    fn derivative(self, z: &Array2<f64>) -> Array2<f64> {
        match self {
            Activation::ReLU => z.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 }),
            Activation::Sigmoid => z.mapv(|v| {
                let s = 1.0 / (1.0 + (-v).exp());
                s * (1.0 - s)
            }),
            Activation::Tanh => z.mapv(|v| 1.0 - v.tanh().powi(2)),
            Activation::Linear => Array2::ones(z.raw_dim()),
        }
    }
}

/// Gradient update rule
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum OptimizerKind {
    /// Adam with bias correction
    Adam { beta1: f64, beta2: f64, epsilon: f64 },
    /// Stochastic gradient descent with classical momentum
    SgdMomentum { momentum: f64 },
}

impl Default for OptimizerKind {
    fn default() -> Self {
        OptimizerKind::Adam {
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
        }
    }
}

/// Neural Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MLPConfig {
    /// Hidden layer sizes
    pub hidden_layers: Vec<usize>,
    /// Activation function for hidden layers
    pub activation: Activation,
    /// Learning rate
    pub learning_rate: f64,
    /// Number of epochs
    pub max_epochs: usize,
    /// Batch size
    pub batch_size: usize,
    /// L2 regularization
    pub alpha: f64,
    /// Random seed
    pub random_state: Option<u64>,
    /// Epochs without validation improvement before stopping, `None` disables early stopping
    pub early_stopping_patience: Option<usize>,
    /// Restore the weights of the best validation epoch when training ends
    pub restore_best_weights: bool,
    /// Fraction of rows held out by [`MLPRegressor::fit`]
    pub validation_split: f64,
    /// Update rule
    pub optimizer: OptimizerKind,
    /// Log every epoch at info level instead of debug
    pub verbose: bool,
}

impl Default for MLPConfig {
    fn default() -> Self {
        Self {
            hidden_layers: vec![64],
            activation: Activation::ReLU,
            learning_rate: 0.001,
            max_epochs: 100,
            batch_size: 32,
            alpha: 0.0,
            random_state: Some(42),
            early_stopping_patience: Some(10),
            restore_best_weights: true,
            validation_split: 0.1,
            optimizer: OptimizerKind::default(),
            verbose: false,
        }
    }
}

impl MLPConfig {
    pub fn with_hidden_layers(mut self, layers: Vec<usize>) -> Self {
        self.hidden_layers = layers;
        self
    }

    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_max_epochs(mut self, epochs: usize) -> Self {
        self.max_epochs = epochs;
        self
    }

    pub fn with_patience(mut self, patience: Option<usize>) -> Self {
        self.early_stopping_patience = patience;
        self
    }

    pub fn with_optimizer(mut self, optimizer: OptimizerKind) -> Self {
        self.optimizer = optimizer;
        self
    }

    pub fn with_random_state(mut self, seed: Option<u64>) -> Self {
        self.random_state = seed;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.hidden_layers.iter().any(|&n| n == 0) {
            return Err(invalid("hidden_layers", format!("{:?}", self.hidden_layers), "layer sizes must be positive"));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(invalid("learning_rate", self.learning_rate.to_string(), "must be positive"));
        }
        if self.batch_size == 0 {
            return Err(invalid("batch_size", "0".to_string(), "must be positive"));
        }
        if !(0.0..1.0).contains(&self.validation_split) {
            return Err(invalid("validation_split", self.validation_split.to_string(), "must be in [0, 1)"));
        }
        Ok(())
    }
}

fn invalid(name: &str, value: String, reason: &str) -> HousingError {
    HousingError::InvalidParameter {
        name: name.to_string(),
        value,
        reason: reason.to_string(),
    }
}

/// Per-epoch losses recorded during training
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingHistory {
    /// Mean training loss per epoch
    pub loss: Vec<f64>,
    /// Validation loss per epoch (empty without a validation set)
    pub val_loss: Vec<f64>,
    /// Zero-based epoch with the lowest validation loss
    pub best_epoch: Option<usize>,
    /// Zero-based epoch at which early stopping triggered
    pub stopped_epoch: Option<usize>,
}

impl TrainingHistory {
    pub fn epochs_run(&self) -> usize {
        self.loss.len()
    }

    pub fn best_val_loss(&self) -> Option<f64> {
        self.best_epoch.and_then(|e| self.val_loss.get(e).copied())
    }
}

/// Multi-Layer Perceptron Regressor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MLPRegressor {
    config: MLPConfig,
    weights: Vec<Array2<f64>>,
    biases: Vec<Array1<f64>>,
    n_features: usize,
    is_fitted: bool,
}

impl MLPRegressor {
    pub fn new(config: MLPConfig) -> Self {
        Self {
            config,
            weights: Vec::new(),
            biases: Vec::new(),
            n_features: 0,
            is_fitted: false,
        }
    }

    pub fn config(&self) -> &MLPConfig {
        &self.config
    }

    /// Fit the model, holding out the last `validation_split` of the rows for early stopping
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<TrainingHistory> {
        let n_samples = x.nrows();
        let val_size = (n_samples as f64 * self.config.validation_split) as usize;

        if val_size == 0 || val_size >= n_samples {
            return self.train(x, y, None);
        }

        let train_size = n_samples - val_size;
        let x_train = x.slice(ndarray::s![..train_size, ..]).to_owned();
        let y_train = y.slice(ndarray::s![..train_size]).to_owned();
        let x_val = x.slice(ndarray::s![train_size.., ..]).to_owned();
        let y_val = y.slice(ndarray::s![train_size..]).to_owned();

        self.train(&x_train, &y_train, Some((&x_val, &y_val)))
    }

    /// Fit the model, monitoring loss on an explicit validation set
    pub fn fit_with_validation(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        x_val: &Array2<f64>,
        y_val: &Array1<f64>,
    ) -> Result<TrainingHistory> {
        if x_val.ncols() != x.ncols() || x_val.nrows() != y_val.len() {
            return Err(HousingError::ShapeError {
                expected: format!("validation set with {} columns and matching targets", x.ncols()),
                actual: format!("{}x{} with {} targets", x_val.nrows(), x_val.ncols(), y_val.len()),
            });
        }
        self.train(x, y, Some((x_val, y_val)))
    }

    fn train(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        validation: Option<(&Array2<f64>, &Array1<f64>)>,
    ) -> Result<TrainingHistory> {
        self.config.validate()?;
        let n_samples = x.nrows();
        if n_samples == 0 {
            return Err(HousingError::TrainingError("no training samples".to_string()));
        }
        if y.len() != n_samples {
            return Err(HousingError::ShapeError {
                expected: format!("{} targets", n_samples),
                actual: format!("{} targets", y.len()),
            });
        }
        if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
            return Err(HousingError::TrainingError("training data contains non-finite values".to_string()));
        }

        self.n_features = x.ncols();
        let mut rng = match self.config.random_state {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::from_entropy(),
        };
        self.initialize_weights(&mut rng);

        let mut optimizer = OptimizerState::new(self.config.optimizer, &self.weights, &self.biases);
        let mut history = TrainingHistory::default();
        let mut best_val_loss = f64::INFINITY;
        let mut best_params: Option<(Vec<Array2<f64>>, Vec<Array1<f64>>)> = None;
        let mut wait = 0usize;
        let mut indices: Vec<usize> = (0..n_samples).collect();

        for epoch in 0..self.config.max_epochs {
            indices.shuffle(&mut rng);

            let mut epoch_loss = 0.0;
            for batch_indices in indices.chunks(self.config.batch_size) {
                let x_batch = x.select(Axis(0), batch_indices);
                let y_batch = y.select(Axis(0), batch_indices);

                let (activations, z_values) = self.forward(&x_batch);
                let output = activations[activations.len() - 1].column(0).to_owned();
                let batch_loss = mse(&y_batch, &output);
                epoch_loss += batch_loss * batch_indices.len() as f64;

                let gradients = self.backward(&y_batch, &activations, &z_values);
                optimizer.step(&mut self.weights, &mut self.biases, gradients, self.config.learning_rate);
            }
            epoch_loss /= n_samples as f64;

            if !epoch_loss.is_finite() {
                return Err(HousingError::TrainingError(format!(
                    "loss diverged at epoch {}",
                    epoch + 1
                )));
            }
            history.loss.push(epoch_loss);

            let Some((x_val, y_val)) = validation else {
                self.log_epoch(epoch, epoch_loss, None);
                continue;
            };

            let val_loss = mse(y_val, &self.forward_output(x_val));
            history.val_loss.push(val_loss);
            self.log_epoch(epoch, epoch_loss, Some(val_loss));

            if val_loss < best_val_loss {
                best_val_loss = val_loss;
                history.best_epoch = Some(epoch);
                wait = 0;
                if self.config.restore_best_weights {
                    best_params = Some((self.weights.clone(), self.biases.clone()));
                }
            } else {
                wait += 1;
                if let Some(patience) = self.config.early_stopping_patience {
                    if wait >= patience {
                        info!(epoch = epoch + 1, best_epoch = history.best_epoch.map(|e| e + 1), "early stopping");
                        history.stopped_epoch = Some(epoch);
                        break;
                    }
                }
            }
        }

        if let Some((weights, biases)) = best_params {
            self.weights = weights;
            self.biases = biases;
        }

        self.is_fitted = true;
        Ok(history)
    }

    /// Make predictions
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if !self.is_fitted {
            return Err(HousingError::ModelNotFitted);
        }
        if x.ncols() != self.n_features {
            return Err(HousingError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }
        Ok(self.forward_output(x))
    }

    /// Weight matrix (`n_in x n_out`) and bias of each layer, input to output
    pub fn layer_weights(&self) -> impl Iterator<Item = (&Array2<f64>, &Array1<f64>)> {
        self.weights.iter().zip(self.biases.iter())
    }

    /// Activation applied after every layer except the last
    pub fn hidden_activation(&self) -> Activation {
        self.config.activation
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn is_fitted(&self) -> bool {
        self.is_fitted
    }

    /// Total number of trainable parameters
    pub fn n_parameters(&self) -> usize {
        self.layer_weights().map(|(w, b)| w.len() + b.len()).sum()
    }

    fn log_epoch(&self, epoch: usize, loss: f64, val_loss: Option<f64>) {
        if self.config.verbose {
            info!(epoch = epoch + 1, loss, val_loss, "epoch");
        } else {
            debug!(epoch = epoch + 1, loss, val_loss, "epoch");
        }
    }

    /// Glorot-uniform weights, zero biases
    fn initialize_weights(&mut self, rng: &mut Xoshiro256PlusPlus) {
        self.weights.clear();
        self.biases.clear();

        let mut layer_sizes = vec![self.n_features];
        layer_sizes.extend(&self.config.hidden_layers);
        layer_sizes.push(1);

        for pair in layer_sizes.windows(2) {
            let (n_in, n_out) = (pair[0], pair[1]);
            let limit = (6.0 / (n_in + n_out) as f64).sqrt();

            self.weights
                .push(Array2::from_shape_fn((n_in, n_out), |_| rng.gen_range(-limit..limit)));
            self.biases.push(Array1::zeros(n_out));
        }
    }

    fn forward_output(&self, x: &Array2<f64>) -> Array1<f64> {
        let last = self.weights.len().saturating_sub(1);
        let mut a = x.to_owned();
        for (i, (w, b)) in self.layer_weights().enumerate() {
            let z = a.dot(w) + b;
            a = if i < last { self.config.activation.apply(&z) } else { z };
        }
        a.column(0).to_owned()
    }

    fn forward(&self, x: &Array2<f64>) -> (Vec<Array2<f64>>, Vec<Array2<f64>>) {
        let mut activations = vec![x.clone()];
        let mut z_values = Vec::with_capacity(self.weights.len());
        let last = self.weights.len() - 1;

        for (i, (w, b)) in self.layer_weights().enumerate() {
            let z = activations[i].dot(w) + b;
            let a = if i < last {
                self.config.activation.apply(&z)
            } else {
                z.clone() // Linear output for regression
            };
            z_values.push(z);
            activations.push(a);
        }

        (activations, z_values)
    }

    fn backward(
        &self,
        y: &Array1<f64>,
        activations: &[Array2<f64>],
        z_values: &[Array2<f64>],
    ) -> Vec<(Array2<f64>, Array1<f64>)> {
        let n = y.len() as f64;
        let mut gradients = Vec::with_capacity(self.weights.len());

        // d(MSE)/d(output)
        let y_2d = y.view().insert_axis(Axis(1));
        let output = &activations[activations.len() - 1];
        let mut delta = (output - &y_2d) * (2.0 / n);

        for i in (0..self.weights.len()).rev() {
            let mut grad_w = activations[i].t().dot(&delta);
            if self.config.alpha > 0.0 {
                grad_w = grad_w + &self.weights[i] * self.config.alpha;
            }
            let grad_b = delta.sum_axis(Axis(0));

            if i > 0 {
                delta = delta.dot(&self.weights[i].t()) * self.config.activation.derivative(&z_values[i - 1]);
            }
            gradients.push((grad_w, grad_b));
        }

        gradients.reverse();
        gradients
    }
}

/// First and second moment buffers for the update rule
struct OptimizerState {
    kind: OptimizerKind,
    step: i32,
    m_w: Vec<Array2<f64>>,
    m_b: Vec<Array1<f64>>,
    v_w: Vec<Array2<f64>>,
    v_b: Vec<Array1<f64>>,
}

impl OptimizerState {
    fn new(kind: OptimizerKind, weights: &[Array2<f64>], biases: &[Array1<f64>]) -> Self {
        let zeros_w = || weights.iter().map(|w| Array2::zeros(w.raw_dim())).collect::<Vec<_>>();
        let zeros_b = || biases.iter().map(|b| Array1::zeros(b.len())).collect::<Vec<_>>();
        Self {
            kind,
            step: 0,
            m_w: zeros_w(),
            m_b: zeros_b(),
            v_w: zeros_w(),
            v_b: zeros_b(),
        }
    }

    fn step(
        &mut self,
        weights: &mut [Array2<f64>],
        biases: &mut [Array1<f64>],
        gradients: Vec<(Array2<f64>, Array1<f64>)>,
        lr: f64,
    ) {
        self.step += 1;

        match self.kind {
            OptimizerKind::Adam { beta1, beta2, epsilon } => {
                let t = self.step;
                let lr_t = lr * (1.0 - beta2.powi(t)).sqrt() / (1.0 - beta1.powi(t));
                for (i, (grad_w, grad_b)) in gradients.iter().enumerate() {
                    adam_update(&mut weights[i], &mut self.m_w[i], &mut self.v_w[i], grad_w, beta1, beta2, epsilon, lr_t);
                    adam_update(&mut biases[i], &mut self.m_b[i], &mut self.v_b[i], grad_b, beta1, beta2, epsilon, lr_t);
                }
            }
            OptimizerKind::SgdMomentum { momentum } => {
                for (i, (grad_w, grad_b)) in gradients.iter().enumerate() {
                    momentum_update(&mut weights[i], &mut self.m_w[i], grad_w, momentum, lr);
                    momentum_update(&mut biases[i], &mut self.m_b[i], grad_b, momentum, lr);
                }
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn adam_update<D: Dimension>(
    param: &mut Array<f64, D>,
    m: &mut Array<f64, D>,
    v: &mut Array<f64, D>,
    grad: &Array<f64, D>,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    lr_t: f64,
) {
    Zip::from(param).and(m).and(v).and(grad).for_each(|p, m, v, &g| {
        *m = beta1 * *m + (1.0 - beta1) * g;
        *v = beta2 * *v + (1.0 - beta2) * g * g;
        *p -= lr_t * *m / (v.sqrt() + epsilon);
    });
}

fn momentum_update<D: Dimension>(
    param: &mut Array<f64, D>,
    velocity: &mut Array<f64, D>,
    grad: &Array<f64, D>,
    momentum: f64,
    lr: f64,
) {
    Zip::from(param).and(velocity).and(grad).for_each(|p, vel, &g| {
        *vel = momentum * *vel - lr * g;
        *p += *vel;
    });
}

fn mse(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (t - p).powi(2))
        .sum::<f64>()
        / y_true.len().max(1) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_data(n: usize) -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((n, 2), |(i, j)| ((i * (j + 3)) % 17) as f64 / 17.0 - 0.5);
        let y = x.map_axis(Axis(1), |row| 3.0 * row[0] - 2.0 * row[1] + 0.5);
        (x, y)
    }

    fn variance(y: &Array1<f64>) -> f64 {
        let mean = y.mean().unwrap();
        y.mapv(|v| (v - mean).powi(2)).mean().unwrap()
    }

    #[test]
    fn test_mlp_regressor_learns_linear_function() {
        let (x, y) = linear_data(200);
        let config = MLPConfig::default()
            .with_hidden_layers(vec![16])
            .with_learning_rate(0.01)
            .with_max_epochs(200)
            .with_patience(None);

        let mut mlp = MLPRegressor::new(config);
        let history = mlp.fit(&x, &y).unwrap();
        assert_eq!(history.epochs_run(), 200);

        let pred = mlp.predict(&x).unwrap();
        assert!(mse(&y, &pred) < 0.1 * variance(&y));
    }

    #[test]
    fn test_sgd_momentum_reduces_loss() {
        let (x, y) = linear_data(100);
        let config = MLPConfig::default()
            .with_hidden_layers(vec![8])
            .with_learning_rate(0.01)
            .with_max_epochs(50)
            .with_patience(None)
            .with_optimizer(OptimizerKind::SgdMomentum { momentum: 0.9 });

        let mut mlp = MLPRegressor::new(config);
        let history = mlp.fit(&x, &y).unwrap();
        assert!(history.loss.last().unwrap() < &history.loss[0]);
    }

    #[test]
    fn test_early_stopping_restores_best_weights() {
        let (x, y) = linear_data(80);
        // All-zero inputs: val loss is 2500 + f(0)^2, lowest near the zero-bias init,
        // while training pulls f(0) towards 0.5
        let x_val = Array2::zeros((20, 2));
        let y_val = Array1::from_shape_fn(20, |i| if i % 2 == 0 { 50.0 } else { -50.0 });

        let config = MLPConfig::default()
            .with_hidden_layers(vec![4])
            .with_max_epochs(500)
            .with_patience(Some(3));
        let mut mlp = MLPRegressor::new(config);
        let history = mlp.fit_with_validation(&x, &y, &x_val, &y_val).unwrap();

        let stopped = history.stopped_epoch.expect("should stop early");
        assert!(stopped < 499);
        assert_eq!(history.val_loss.len(), stopped + 1);

        let best = history.best_epoch.unwrap();
        assert_eq!(stopped - best, 3);
        let restored_loss = mse(&y_val, &mlp.predict(&x_val).unwrap());
        assert!((restored_loss - history.best_val_loss().unwrap()).abs() < 1e-9);
    }

    #[test]
    fn test_predict_before_fit_is_error() {
        let mlp = MLPRegressor::new(MLPConfig::default());
        let x = Array2::zeros((2, 3));
        assert!(matches!(mlp.predict(&x), Err(HousingError::ModelNotFitted)));
    }

    #[test]
    fn test_layer_weights_shapes() {
        let (x, y) = linear_data(40);
        let config = MLPConfig::default()
            .with_hidden_layers(vec![5, 3])
            .with_max_epochs(2);
        let mut mlp = MLPRegressor::new(config);
        mlp.fit(&x, &y).unwrap();

        let shapes: Vec<(usize, usize)> = mlp.layer_weights().map(|(w, _)| w.dim()).collect();
        assert_eq!(shapes, vec![(2, 5), (5, 3), (3, 1)]);
        assert_eq!(mlp.n_parameters(), 2 * 5 + 5 + 5 * 3 + 3 + 3 + 1);
    }

    #[test]
    fn test_same_seed_same_model() {
        let (x, y) = linear_data(50);
        let config = MLPConfig::default().with_max_epochs(5).with_random_state(Some(7));
        let mut a = MLPRegressor::new(config.clone());
        let mut b = MLPRegressor::new(config);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        assert_eq!(a.predict(&x).unwrap(), b.predict(&x).unwrap());
    }

    #[test]
    fn test_invalid_config() {
        let (x, y) = linear_data(10);
        let mut mlp = MLPRegressor::new(MLPConfig::default().with_batch_size(0));
        assert!(matches!(mlp.fit(&x, &y), Err(HousingError::InvalidParameter { .. })));
    }
}
