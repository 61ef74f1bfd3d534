//! Search space definition for hyperparameters

use rand::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Type of parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParameterType {
    /// Continuous float parameter
    Float {
        low: f64,
        high: f64,
        log_scale: bool,
    },
    /// Integer parameter taking values `low + k * step <= high`
    Int {
        low: i64,
        high: i64,
        step: i64,
    },
    /// Categorical parameter
    Categorical {
        choices: Vec<String>,
    },
}

/// A single hyperparameter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub param_type: ParameterType,
}

impl Parameter {
    /// Create a float parameter
    pub fn float(name: impl Into<String>, low: f64, high: f64) -> Self {
        Self {
            name: name.into(),
            param_type: ParameterType::Float {
                low,
                high,
                log_scale: false,
            },
        }
    }

    /// Create a log-scale float parameter
    pub fn log_float(name: impl Into<String>, low: f64, high: f64) -> Self {
        Self {
            name: name.into(),
            param_type: ParameterType::Float {
                low,
                high,
                log_scale: true,
            },
        }
    }

    /// Create an integer parameter
    pub fn int(name: impl Into<String>, low: i64, high: i64) -> Self {
        Self::int_step(name, low, high, 1)
    }

    /// Create an integer parameter on a grid of `step`
    pub fn int_step(name: impl Into<String>, low: i64, high: i64, step: i64) -> Self {
        Self {
            name: name.into(),
            param_type: ParameterType::Int {
                low,
                high,
                step: step.max(1),
            },
        }
    }

    /// Create a categorical parameter
    pub fn categorical(name: impl Into<String>, choices: Vec<&str>) -> Self {
        Self {
            name: name.into(),
            param_type: ParameterType::Categorical {
                choices: choices.into_iter().map(String::from).collect(),
            },
        }
    }

    /// Sample a random value
    pub fn sample(&self, rng: &mut impl Rng) -> ParameterValue {
        match &self.param_type {
            ParameterType::Float { low, high, log_scale } => {
                let val = if *log_scale {
                    let log_low = low.ln();
                    let log_high = high.ln();
                    (rng.gen::<f64>() * (log_high - log_low) + log_low).exp()
                } else {
                    rng.gen::<f64>() * (high - low) + low
                };
                ParameterValue::Float(val.clamp(*low, *high))
            }
            ParameterType::Int { low, high, step } => {
                let n_steps = (high - low) / step;
                ParameterValue::Int(low + rng.gen_range(0..=n_steps) * step)
            }
            ParameterType::Categorical { choices } => {
                let idx = rng.gen_range(0..choices.len());
                ParameterValue::String(choices[idx].clone())
            }
        }
    }

    /// Bounds of the continuous space the samplers model this parameter in.
    ///
    /// Log-scale floats are modelled on `ln(x)`. Categorical parameters have none.
    pub fn internal_bounds(&self) -> Option<(f64, f64)> {
        match &self.param_type {
            ParameterType::Float { low, high, log_scale: true } => Some((low.ln(), high.ln())),
            ParameterType::Float { low, high, .. } => Some((*low, *high)),
            ParameterType::Int { low, high, step } => {
                let top = low + (high - low) / step * step;
                Some((*low as f64, top as f64))
            }
            ParameterType::Categorical { .. } => None,
        }
    }

    /// Map a value into the continuous modelling space
    pub fn to_internal(&self, value: &ParameterValue) -> Option<f64> {
        match &self.param_type {
            ParameterType::Float { log_scale: true, .. } => value.as_float().map(f64::ln),
            ParameterType::Float { .. } | ParameterType::Int { .. } => value.as_float(),
            ParameterType::Categorical { .. } => None,
        }
    }

    /// Map a point of the modelling space back to a valid value, snapping ints to the grid
    pub fn from_internal(&self, x: f64) -> ParameterValue {
        match &self.param_type {
            ParameterType::Float { low, high, log_scale } => {
                let v = if *log_scale { x.exp() } else { x };
                ParameterValue::Float(v.clamp(*low, *high))
            }
            ParameterType::Int { low, high, step } => {
                let n_steps = (high - low) / step;
                let k = ((x - *low as f64) / *step as f64).round() as i64;
                ParameterValue::Int(low + k.clamp(0, n_steps) * step)
            }
            ParameterType::Categorical { choices } => {
                let idx = (x.round().max(0.0) as usize).min(choices.len().saturating_sub(1));
                ParameterValue::String(choices.get(idx).cloned().unwrap_or_default())
            }
        }
    }

    /// Whether `value` is a legal value of this parameter
    pub fn contains(&self, value: &ParameterValue) -> bool {
        match (&self.param_type, value) {
            (ParameterType::Float { low, high, .. }, ParameterValue::Float(v)) => v >= low && v <= high,
            (ParameterType::Int { low, high, step }, ParameterValue::Int(v)) => {
                v >= low && v <= high && (v - low) % step == 0
            }
            (ParameterType::Categorical { choices }, ParameterValue::String(s)) => choices.contains(s),
            _ => false,
        }
    }
}

/// Sampled parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Int(i64),
    Float(f64),
    String(String),
}

impl ParameterValue {
    /// Get as float
    pub fn as_float(&self) -> Option<f64> {
        match self {
            ParameterValue::Float(v) => Some(*v),
            ParameterValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Get as int
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParameterValue::Int(v) => Some(*v),
            ParameterValue::Float(v) => Some(*v as i64),
            _ => None,
        }
    }

    /// Get as string
    pub fn as_string(&self) -> Option<&str> {
        match self {
            ParameterValue::String(v) => Some(v),
            _ => None,
        }
    }
}

impl std::fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParameterValue::Int(v) => write!(f, "{}", v),
            ParameterValue::Float(v) => write!(f, "{:.6}", v),
            ParameterValue::String(v) => write!(f, "{}", v),
        }
    }
}

/// Search space for hyperparameter optimization
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchSpace {
    parameters: Vec<Parameter>,
}

impl SearchSpace {
    /// Create a new empty search space
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter to the search space
    pub fn add(mut self, param: Parameter) -> Self {
        self.parameters.push(param);
        self
    }

    /// Add a float parameter
    pub fn float(self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.add(Parameter::float(name, low, high))
    }

    /// Add a log-scale float parameter
    pub fn log_float(self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.add(Parameter::log_float(name, low, high))
    }

    /// Add an integer parameter
    pub fn int(self, name: impl Into<String>, low: i64, high: i64) -> Self {
        self.add(Parameter::int(name, low, high))
    }

    /// Add an integer parameter with a step
    pub fn int_step(self, name: impl Into<String>, low: i64, high: i64, step: i64) -> Self {
        self.add(Parameter::int_step(name, low, high, step))
    }

    /// Add a categorical parameter
    pub fn categorical(self, name: impl Into<String>, choices: Vec<&str>) -> Self {
        self.add(Parameter::categorical(name, choices))
    }

    /// Get all parameters
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Sample a random configuration
    pub fn sample(&self, rng: &mut impl Rng) -> TrialParams {
        self.parameters
            .iter()
            .map(|p| (p.name.clone(), p.sample(rng)))
            .collect()
    }

    /// Number of parameters
    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Get parameter names in order
    pub fn param_names(&self) -> Vec<String> {
        self.parameters.iter().map(|p| p.name.clone()).collect()
    }
}

/// Sampled configuration, keyed by parameter name
pub type TrialParams = BTreeMap<String, ParameterValue>;
