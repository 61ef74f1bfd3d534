//! Model sessions
//!
//! A [`Session`] maps a batch of scaled feature rows to predictions. The
//! [`ONNXSession`] evaluates an exported ONNX graph directly, node by node.

use crate::error::{HousingError, Result};
use crate::export::proto::{self, tensor_shape_proto::dimension, type_proto};
use crate::export::FEATURE_NAMES_KEY;
use ndarray::{Array2, ArrayD, Ix2, IxDyn};
use prost::Message;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Runs a model on `[n_rows, n_features]` inputs
pub trait Session {
    /// Predict a batch; the output has one row per input row
    fn run(&self, input: &Array2<f32>) -> Result<Array2<f32>>;

    /// Input width, if the model records it
    fn n_features(&self) -> Option<usize>;

    /// Ordered input feature names, if the model records them
    fn feature_names(&self) -> Option<&[String]> {
        None
    }
}

/// Evaluates an ONNX graph of dense layers.
///
/// Supported operators: `MatMul`, `Add`, `Gemm`, `Relu`, `Sigmoid`, `Tanh` and `Identity`.
#[derive(Debug, Clone)]
pub struct ONNXSession {
    nodes: Vec<proto::NodeProto>,
    initializers: HashMap<String, ArrayD<f32>>,
    input_name: String,
    output_name: String,
    n_features: Option<usize>,
    feature_names: Option<Vec<String>>,
    producer: String,
    opset: i64,
}

impl ONNXSession {
    /// Load an `.onnx` file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = fs::read(path.as_ref())?;
        Self::from_bytes(&bytes)
    }

    /// Decode an ONNX model from protobuf bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let model = proto::ModelProto::decode(bytes)?;
        let graph = model
            .graph
            .ok_or_else(|| HousingError::InferenceError("model has no graph".to_string()))?;

        let initializers = graph
            .initializer
            .iter()
            .map(|t| Ok((t.name.clone(), tensor_to_array(t)?)))
            .collect::<Result<HashMap<_, _>>>()?;

        // Older exporters also list initializers as graph inputs
        let input = graph
            .input
            .iter()
            .find(|i| !initializers.contains_key(&i.name))
            .ok_or_else(|| HousingError::InferenceError("graph has no input".to_string()))?;
        let output = graph
            .output
            .first()
            .ok_or_else(|| HousingError::InferenceError("graph has no output".to_string()))?;

        let feature_names = model
            .metadata_props
            .iter()
            .find(|p| p.key == FEATURE_NAMES_KEY)
            .map(|p| serde_json::from_str::<Vec<String>>(&p.value))
            .transpose()?;

        let opset = model
            .opset_import
            .iter()
            .find(|o| o.domain.is_empty() || o.domain == "ai.onnx")
            .map(|o| o.version)
            .unwrap_or(0);

        debug!(
            nodes = graph.node.len(),
            initializers = initializers.len(),
            opset,
            producer = %model.producer_name,
            "ONNX graph decoded"
        );

        Ok(Self {
            input_name: input.name.clone(),
            output_name: output.name.clone(),
            n_features: input_width(input),
            nodes: graph.node,
            initializers,
            feature_names,
            producer: model.producer_name,
            opset,
        })
    }

    pub fn producer(&self) -> &str {
        &self.producer
    }

    pub fn opset(&self) -> i64 {
        self.opset
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    fn lookup<'a>(
        &'a self,
        node: &proto::NodeProto,
        i: usize,
        values: &'a HashMap<String, ArrayD<f32>>,
    ) -> Result<&'a ArrayD<f32>> {
        let name = node
            .input
            .get(i)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| HousingError::InferenceError(format!("node '{}' is missing input {}", node.name, i)))?;
        values
            .get(name)
            .or_else(|| self.initializers.get(name))
            .ok_or_else(|| HousingError::InferenceError(format!("tensor '{}' is not available", name)))
    }

    fn eval_node(&self, node: &proto::NodeProto, values: &HashMap<String, ArrayD<f32>>) -> Result<ArrayD<f32>> {
        let arg = |i: usize| self.lookup(node, i, values);

        match node.op_type.as_str() {
            "MatMul" => matmul(arg(0)?, arg(1)?, false, false),
            "Add" => add(arg(0)?, arg(1)?),
            "Relu" => Ok(arg(0)?.mapv(|v| v.max(0.0))),
            "Sigmoid" => Ok(arg(0)?.mapv(|v| 1.0 / (1.0 + (-v).exp()))),
            "Tanh" => Ok(arg(0)?.mapv(f32::tanh)),
            "Identity" => Ok(arg(0)?.clone()),
            "Gemm" => {
                let alpha = attr_float(node, "alpha", 1.0);
                let beta = attr_float(node, "beta", 1.0);
                let trans_a = attr_int(node, "transA", 0) != 0;
                let trans_b = attr_int(node, "transB", 0) != 0;

                let y = matmul(arg(0)?, arg(1)?, trans_a, trans_b)? * alpha;
                if node.input.get(2).map_or(true, |n| n.is_empty()) {
                    return Ok(y);
                }
                add(&y, &(arg(2)? * beta))
            }
            other => Err(HousingError::InferenceError(format!(
                "unsupported operator '{}' in node '{}'",
                other, node.name
            ))),
        }
    }
}

impl Session for ONNXSession {
    fn run(&self, input: &Array2<f32>) -> Result<Array2<f32>> {
        if let Some(n) = self.n_features {
            if input.ncols() != n {
                return Err(HousingError::ShapeError {
                    expected: format!("{} features", n),
                    actual: format!("{} features", input.ncols()),
                });
            }
        }

        let mut values: HashMap<String, ArrayD<f32>> = HashMap::new();
        values.insert(self.input_name.clone(), input.clone().into_dyn());

        for node in &self.nodes {
            let result = self.eval_node(node, &values)?;
            let out = node
                .output
                .first()
                .ok_or_else(|| HousingError::InferenceError(format!("node '{}' has no output", node.name)))?;
            values.insert(out.clone(), result);
        }

        let output = values
            .remove(&self.output_name)
            .ok_or_else(|| HousingError::InferenceError(format!("output '{}' was never produced", self.output_name)))?;
        Ok(output.into_dimensionality::<Ix2>()?)
    }

    fn n_features(&self) -> Option<usize> {
        self.n_features
    }

    fn feature_names(&self) -> Option<&[String]> {
        self.feature_names.as_deref()
    }
}

fn input_width(info: &proto::ValueInfoProto) -> Option<usize> {
    let Some(type_proto::Value::TensorType(tensor)) = info.r#type.as_ref()?.value.as_ref() else {
        return None;
    };
    match tensor.shape.as_ref()?.dim.get(1)?.value {
        Some(dimension::Value::DimValue(n)) if n > 0 => Some(n as usize),
        _ => None,
    }
}

/// Decode a tensor from its typed field or little-endian `raw_data`
fn tensor_to_array(tensor: &proto::TensorProto) -> Result<ArrayD<f32>> {
    let dims = tensor
        .dims
        .iter()
        .map(|&d| usize::try_from(d))
        .collect::<std::result::Result<Vec<usize>, _>>()
        .map_err(|_| HousingError::InferenceError(format!("tensor '{}' has negative dims {:?}", tensor.name, tensor.dims)))?;
    let expected = dims
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| HousingError::InferenceError(format!("tensor '{}' dims {:?} overflow", tensor.name, dims)))?;
    let raw = &tensor.raw_data;

    let data: Vec<f32> = match tensor.data_type {
        proto::data_type::FLOAT if !tensor.float_data.is_empty() => tensor.float_data.clone(),
        proto::data_type::FLOAT => raw
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
        proto::data_type::DOUBLE if !tensor.double_data.is_empty() => {
            tensor.double_data.iter().map(|&v| v as f32).collect()
        }
        proto::data_type::DOUBLE => raw
            .chunks_exact(8)
            .map(|b| f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]) as f32)
            .collect(),
        proto::data_type::INT64 if !tensor.int64_data.is_empty() => {
            tensor.int64_data.iter().map(|&v| v as f32).collect()
        }
        proto::data_type::INT64 => raw
            .chunks_exact(8)
            .map(|b| i64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]) as f32)
            .collect(),
        other => {
            return Err(HousingError::InferenceError(format!(
                "tensor '{}' has unsupported data type {}",
                tensor.name, other
            )))
        }
    };

    if data.len() != expected {
        return Err(HousingError::InferenceError(format!(
            "tensor '{}' has {} values for dims {:?}",
            tensor.name,
            data.len(),
            dims
        )));
    }
    Ok(ArrayD::from_shape_vec(IxDyn(&dims), data)?)
}

fn matmul(a: &ArrayD<f32>, b: &ArrayD<f32>, trans_a: bool, trans_b: bool) -> Result<ArrayD<f32>> {
    let a = a.view().into_dimensionality::<Ix2>()?;
    let b = b.view().into_dimensionality::<Ix2>()?;
    let a = if trans_a { a.reversed_axes() } else { a };
    let b = if trans_b { b.reversed_axes() } else { b };

    if a.ncols() != b.nrows() {
        return Err(HousingError::ShapeError {
            expected: format!("inner dimension {}", a.ncols()),
            actual: format!("inner dimension {}", b.nrows()),
        });
    }
    Ok(a.dot(&b).into_dyn())
}

/// Elementwise add, broadcasting the smaller operand
fn add(a: &ArrayD<f32>, b: &ArrayD<f32>) -> Result<ArrayD<f32>> {
    if let Some(b_view) = b.broadcast(a.raw_dim()) {
        return Ok(a + &b_view);
    }
    if let Some(a_view) = a.broadcast(b.raw_dim()) {
        return Ok(&a_view + b);
    }
    Err(HousingError::ShapeError {
        expected: format!("shape broadcastable to {:?}", a.shape()),
        actual: format!("{:?}", b.shape()),
    })
}

fn attr_float(node: &proto::NodeProto, name: &str, default: f32) -> f32 {
    node.attribute.iter().find(|a| a.name == name).map_or(default, |a| a.f)
}

fn attr_int(node: &proto::NodeProto, name: &str, default: i64) -> i64 {
    node.attribute.iter().find(|a| a.name == name).map_or(default, |a| a.i)
}
