//! Sampling strategies for hyperparameter optimization

use super::search_space::{Parameter, ParameterType, ParameterValue, SearchSpace, TrialParams};
use rand::prelude::*;
use rand_distr::Normal;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

/// Type of sampler to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SamplerType {
    /// Random sampling
    Random,
    /// Tree-structured Parzen Estimator
    TPE,
}

/// Trait for hyperparameter samplers.
///
/// `history` holds completed trials as `(params, loss)` where lower is better.
pub trait Sampler: Send {
    /// Sample the next set of hyperparameters
    fn sample(&mut self, search_space: &SearchSpace, history: &[(TrialParams, f64)]) -> TrialParams;
}

fn seeded_rng(seed: Option<u64>) -> Xoshiro256PlusPlus {
    match seed {
        Some(s) => Xoshiro256PlusPlus::seed_from_u64(s),
        None => Xoshiro256PlusPlus::from_entropy(),
    }
}

/// Random sampler
#[derive(Debug)]
pub struct RandomSampler {
    rng: Xoshiro256PlusPlus,
}

impl RandomSampler {
    /// Create a new random sampler
    pub fn new(seed: Option<u64>) -> Self {
        Self { rng: seeded_rng(seed) }
    }
}

impl Sampler for RandomSampler {
    fn sample(&mut self, search_space: &SearchSpace, _history: &[(TrialParams, f64)]) -> TrialParams {
        search_space.sample(&mut self.rng)
    }
}

/// Tree-structured Parzen Estimator sampler
///
/// After `n_startup_trials` random trials, the history is split at the `gamma`
/// quantile into good and bad trials. Each parameter gets a Parzen estimator
/// `l(x)` over the good values and `g(x)` over the rest; `n_candidates` draws
/// from `l` are scored by `l(x) / g(x)` and the best one is kept.
#[derive(Debug)]
pub struct TPESampler {
    rng: Xoshiro256PlusPlus,
    n_startup_trials: usize,
    gamma: f64,
    n_candidates: usize,
    prior_weight: f64,
}

impl TPESampler {
    /// Create a new TPE sampler
    pub fn new(seed: Option<u64>) -> Self {
        Self {
            rng: seeded_rng(seed),
            n_startup_trials: 10,
            gamma: 0.25,
            n_candidates: 24,
            prior_weight: 1.0,
        }
    }

    /// Set number of startup trials
    pub fn with_n_startup(mut self, n: usize) -> Self {
        self.n_startup_trials = n;
        self
    }

    /// Set gamma (quantile for splitting good/bad)
    pub fn with_gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma.clamp(0.0, 1.0);
        self
    }

    /// Set the number of candidates drawn from `l(x)` per parameter
    pub fn with_n_candidates(mut self, n: usize) -> Self {
        self.n_candidates = n.max(1);
        self
    }

    fn sample_numeric(&mut self, param: &Parameter, good: &[f64], bad: &[f64]) -> ParameterValue {
        let Some((low, high)) = param.internal_bounds() else {
            return param.sample(&mut self.rng);
        };
        if high <= low {
            return param.from_internal(low);
        }

        let l = ParzenEstimator::new(good, low, high, self.prior_weight);
        let g = ParzenEstimator::new(bad, low, high, self.prior_weight);

        let mut best_x = l.sample(&mut self.rng);
        let mut best_score = f64::NEG_INFINITY;
        for _ in 0..self.n_candidates {
            let x = l.sample(&mut self.rng);
            let score = l.log_pdf(x) - g.log_pdf(x);
            if score > best_score {
                best_score = score;
                best_x = x;
            }
        }

        param.from_internal(best_x)
    }

    fn sample_categorical(&mut self, choices: &[String], good: &[&str], bad: &[&str]) -> ParameterValue {
        let l = self.category_weights(choices, good);
        let g = self.category_weights(choices, bad);

        let mut best_idx = 0;
        let mut best_score = f64::NEG_INFINITY;
        for _ in 0..self.n_candidates {
            let idx = weighted_index(&l, &mut self.rng);
            let score = l[idx].ln() - g[idx].ln();
            if score > best_score {
                best_score = score;
                best_idx = idx;
            }
        }

        ParameterValue::String(choices[best_idx].clone())
    }

    /// Smoothed category frequencies
    fn category_weights(&self, choices: &[String], observed: &[&str]) -> Vec<f64> {
        let k = choices.len() as f64;
        let total = observed.len() as f64 + self.prior_weight;
        choices
            .iter()
            .map(|c| {
                let count = observed.iter().filter(|&&o| o == c.as_str()).count() as f64;
                (count + self.prior_weight / k) / total
            })
            .collect()
    }
}

impl Sampler for TPESampler {
    fn sample(&mut self, search_space: &SearchSpace, history: &[(TrialParams, f64)]) -> TrialParams {
        // Use random sampling for startup trials
        if history.len() < self.n_startup_trials.max(2) {
            return search_space.sample(&mut self.rng);
        }

        let mut sorted: Vec<&(TrialParams, f64)> = history.iter().collect();
        sorted.sort_by(|a, b| a.1.total_cmp(&b.1));

        let n_good = ((sorted.len() as f64 * self.gamma).ceil() as usize).clamp(1, sorted.len() - 1);
        let (good, bad) = sorted.split_at(n_good);

        let mut params = TrialParams::new();
        for param in search_space.parameters() {
            let value = match &param.param_type {
                ParameterType::Categorical { choices } => {
                    let good_vals: Vec<&str> = good
                        .iter()
                        .filter_map(|(p, _)| p.get(&param.name).and_then(|v| v.as_string()))
                        .collect();
                    let bad_vals: Vec<&str> = bad
                        .iter()
                        .filter_map(|(p, _)| p.get(&param.name).and_then(|v| v.as_string()))
                        .collect();
                    self.sample_categorical(choices, &good_vals, &bad_vals)
                }
                _ => {
                    let internal = |trials: &[&(TrialParams, f64)]| -> Vec<f64> {
                        trials
                            .iter()
                            .filter_map(|(p, _)| p.get(&param.name).and_then(|v| param.to_internal(v)))
                            .filter(|x| x.is_finite())
                            .collect()
                    };
                    let good_vals = internal(good);
                    let bad_vals = internal(bad);
                    self.sample_numeric(param, &good_vals, &bad_vals)
                }
            };
            params.insert(param.name.clone(), value);
        }

        params
    }
}

/// Mixture of truncated Gaussians centred on observations, plus a flat prior component
#[derive(Debug, Clone)]
struct ParzenEstimator {
    mus: Vec<f64>,
    sigmas: Vec<f64>,
    weights: Vec<f64>,
    low: f64,
    high: f64,
}

impl ParzenEstimator {
    fn new(observations: &[f64], low: f64, high: f64, prior_weight: f64) -> Self {
        let range = high - low;
        let prior_mu = 0.5 * (low + high);

        let mut mus: Vec<f64> = observations.iter().map(|x| x.clamp(low, high)).collect();
        mus.sort_by(|a, b| a.total_cmp(b));

        // Bandwidth of each point: distance to its farther neighbour, bounds included
        let n = mus.len();
        let min_sigma = range / (1.0 + n as f64).min(100.0);
        let mut sigmas: Vec<f64> = (0..n)
            .map(|i| {
                let left = if i == 0 { mus[i] - low } else { mus[i] - mus[i - 1] };
                let right = if i + 1 == n { high - mus[i] } else { mus[i + 1] - mus[i] };
                left.max(right).clamp(min_sigma, range)
            })
            .collect();

        let mut weights = vec![1.0; n];
        mus.push(prior_mu);
        sigmas.push(range);
        weights.push(prior_weight);

        let total: f64 = weights.iter().sum();
        weights.iter_mut().for_each(|w| *w /= total);

        Self {
            mus,
            sigmas,
            weights,
            low,
            high,
        }
    }

    fn sample(&self, rng: &mut Xoshiro256PlusPlus) -> f64 {
        let idx = weighted_index(&self.weights, rng);
        let (mu, sigma) = (self.mus[idx], self.sigmas[idx]);

        let Ok(normal) = Normal::new(mu, sigma) else {
            return mu;
        };
        for _ in 0..100 {
            let x = normal.sample(rng);
            if x >= self.low && x <= self.high {
                return x;
            }
        }
        mu
    }

    fn log_pdf(&self, x: f64) -> f64 {
        let density: f64 = self
            .mus
            .iter()
            .zip(&self.sigmas)
            .zip(&self.weights)
            .map(|((&mu, &sigma), &w)| {
                let mass = normal_cdf((self.high - mu) / sigma) - normal_cdf((self.low - mu) / sigma);
                w * normal_pdf((x - mu) / sigma) / (sigma * mass.max(1e-12))
            })
            .sum();
        density.max(1e-300).ln()
    }
}

fn weighted_index(weights: &[f64], rng: &mut Xoshiro256PlusPlus) -> usize {
    let total: f64 = weights.iter().sum();
    let mut r = rng.gen::<f64>() * total;
    for (i, w) in weights.iter().enumerate() {
        r -= w;
        if r <= 0.0 {
            return i;
        }
    }
    weights.len().saturating_sub(1)
}

/// Standard normal CDF approximation
fn normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

/// Standard normal PDF
fn normal_pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / (2.0 * std::f64::consts::PI).sqrt()
}

/// Error function approximation (Abramowitz and Stegun)
fn erf(x: f64) -> f64 {
    let a1 = 0.254829592;
    let a2 = -0.284496736;
    let a3 = 1.421413741;
    let a4 = -1.453152027;
    let a5 = 1.061405429;
    let p = 0.3275911;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    let t = 1.0 / (1.0 + p * x);
    let y = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-x * x).exp();

    sign * y
}

/// Create a sampler from type
pub fn create_sampler(sampler_type: SamplerType, seed: Option<u64>, n_startup_trials: usize) -> Box<dyn Sampler> {
    match sampler_type {
        SamplerType::Random => Box::new(RandomSampler::new(seed)),
        SamplerType::TPE => Box::new(TPESampler::new(seed).with_n_startup(n_startup_trials)),
    }
}
