//! ONNX export functionality
//!
//! Models describe themselves as an [`ONNXGraph`]; [`ONNXExporter`] turns the graph
//! into a binary `ModelProto`.

use prost::Message;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

use super::proto::{self, attribute_type, tensor_shape_proto, type_proto};
use crate::error::{HousingError, Result};
use crate::training::{Activation, MLPRegressor};

/// Name of the graph input
pub const INPUT_NAME: &str = "input";
/// Name of the graph output
pub const OUTPUT_NAME: &str = "output";
/// Metadata key holding the JSON list of input feature names
pub const FEATURE_NAMES_KEY: &str = "feature_names";

/// ONNX configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ONNXConfig {
    /// ONNX opset version
    pub opset_version: i64,
    /// IR version written in the model header
    pub ir_version: i64,
    /// Producer name
    pub producer_name: String,
    /// Producer version
    pub producer_version: String,
    /// Model description
    pub description: String,
}

impl Default for ONNXConfig {
    fn default() -> Self {
        Self {
            opset_version: 13,
            ir_version: 7,
            producer_name: "housing-mlp".to_string(),
            producer_version: env!("CARGO_PKG_VERSION").to_string(),
            description: String::new(),
        }
    }
}

impl ONNXConfig {
    pub fn with_opset(mut self, opset: i64) -> Self {
        self.opset_version = opset;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// ONNX data types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ONNXDataType {
    Float = 1,
    Int64 = 7,
    Double = 11,
}

/// ONNX tensor shape dimension
#[derive(Debug, Clone, PartialEq)]
pub enum Dimension {
    /// Fixed size dimension
    Fixed(i64),
    /// Dynamic dimension with name
    Dynamic(String),
}

/// ONNX tensor specification
#[derive(Debug, Clone)]
pub struct TensorSpec {
    /// Tensor name
    pub name: String,
    /// Data type
    pub dtype: ONNXDataType,
    /// Shape dimensions
    pub shape: Vec<Dimension>,
}

impl TensorSpec {
    /// Create new tensor spec
    pub fn new(name: impl Into<String>, dtype: ONNXDataType, shape: Vec<Dimension>) -> Self {
        Self {
            name: name.into(),
            dtype,
            shape,
        }
    }

    /// Create float tensor with given shape
    pub fn float(name: impl Into<String>, shape: Vec<Dimension>) -> Self {
        Self::new(name, ONNXDataType::Float, shape)
    }

    fn to_proto(&self) -> proto::ValueInfoProto {
        let dim = self
            .shape
            .iter()
            .map(|d| tensor_shape_proto::Dimension {
                denotation: String::new(),
                value: Some(match d {
                    Dimension::Fixed(n) => tensor_shape_proto::dimension::Value::DimValue(*n),
                    Dimension::Dynamic(name) => tensor_shape_proto::dimension::Value::DimParam(name.clone()),
                }),
            })
            .collect();

        proto::ValueInfoProto {
            name: self.name.clone(),
            r#type: Some(proto::TypeProto {
                denotation: String::new(),
                value: Some(type_proto::Value::TensorType(type_proto::Tensor {
                    elem_type: self.dtype as i32,
                    shape: Some(proto::TensorShapeProto { dim }),
                })),
            }),
            doc_string: String::new(),
        }
    }
}

/// ONNX attribute value
#[derive(Debug, Clone, PartialEq)]
pub enum ONNXAttribute {
    Int(i64),
    Float(f32),
    String(String),
    Ints(Vec<i64>),
    Floats(Vec<f32>),
}

/// ONNX operator node
#[derive(Debug, Clone)]
pub struct ONNXNode {
    /// Node name
    pub name: String,
    /// Operator type (e.g., "MatMul", "Add", "Relu")
    pub op_type: String,
    /// Input tensor names
    pub inputs: Vec<String>,
    /// Output tensor names
    pub outputs: Vec<String>,
    /// Attributes, in insertion order
    pub attributes: Vec<(String, ONNXAttribute)>,
}

impl ONNXNode {
    /// Create new node
    pub fn new(
        name: impl Into<String>,
        op_type: impl Into<String>,
        inputs: Vec<String>,
        outputs: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            op_type: op_type.into(),
            inputs,
            outputs,
            attributes: Vec::new(),
        }
    }

    /// Add attribute
    pub fn with_attribute(mut self, key: impl Into<String>, value: ONNXAttribute) -> Self {
        self.attributes.push((key.into(), value));
        self
    }

    fn to_proto(&self) -> proto::NodeProto {
        let attribute = self
            .attributes
            .iter()
            .map(|(name, value)| {
                let mut attr = proto::AttributeProto {
                    name: name.clone(),
                    ..Default::default()
                };
                match value {
                    ONNXAttribute::Int(i) => {
                        attr.i = *i;
                        attr.r#type = attribute_type::INT;
                    }
                    ONNXAttribute::Float(f) => {
                        attr.f = *f;
                        attr.r#type = attribute_type::FLOAT;
                    }
                    ONNXAttribute::String(s) => {
                        attr.s = s.as_bytes().to_vec();
                        attr.r#type = attribute_type::STRING;
                    }
                    ONNXAttribute::Ints(v) => {
                        attr.ints = v.clone();
                        attr.r#type = attribute_type::INTS;
                    }
                    ONNXAttribute::Floats(v) => {
                        attr.floats = v.clone();
                        attr.r#type = attribute_type::FLOATS;
                    }
                }
                attr
            })
            .collect();

        proto::NodeProto {
            input: self.inputs.clone(),
            output: self.outputs.clone(),
            name: self.name.clone(),
            op_type: self.op_type.clone(),
            attribute,
            doc_string: String::new(),
            domain: String::new(),
        }
    }
}

/// ONNX initializer (constant float tensor)
#[derive(Debug, Clone)]
pub struct ONNXInitializer {
    /// Tensor name
    pub name: String,
    /// Shape
    pub dims: Vec<i64>,
    /// Row-major values
    pub data: Vec<f32>,
}

impl ONNXInitializer {
    /// Create float initializer
    pub fn float(name: impl Into<String>, dims: Vec<i64>, data: Vec<f32>) -> Self {
        Self {
            name: name.into(),
            dims,
            data,
        }
    }

    /// Stored as little-endian `raw_data`
    fn to_proto(&self) -> proto::TensorProto {
        let raw_data = self.data.iter().flat_map(|v| v.to_le_bytes()).collect();
        proto::TensorProto {
            dims: self.dims.clone(),
            data_type: proto::data_type::FLOAT,
            name: self.name.clone(),
            raw_data,
            ..Default::default()
        }
    }
}

/// ONNX graph representation
#[derive(Debug, Clone)]
pub struct ONNXGraph {
    /// Graph name
    pub name: String,
    /// Input tensors
    pub inputs: Vec<TensorSpec>,
    /// Output tensors
    pub outputs: Vec<TensorSpec>,
    /// Nodes, in topological order
    pub nodes: Vec<ONNXNode>,
    /// Initializers (weights, biases)
    pub initializers: Vec<ONNXInitializer>,
    /// Key/value pairs stored in the model's `metadata_props`
    pub metadata: Vec<(String, String)>,
}

impl ONNXGraph {
    /// Create new graph
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            nodes: Vec::new(),
            initializers: Vec::new(),
            metadata: Vec::new(),
        }
    }

    /// Add input
    pub fn add_input(mut self, spec: TensorSpec) -> Self {
        self.inputs.push(spec);
        self
    }

    /// Add output
    pub fn add_output(mut self, spec: TensorSpec) -> Self {
        self.outputs.push(spec);
        self
    }

    /// Add node
    pub fn add_node(mut self, node: ONNXNode) -> Self {
        self.nodes.push(node);
        self
    }

    /// Add initializer
    pub fn add_initializer(mut self, init: ONNXInitializer) -> Self {
        self.initializers.push(init);
        self
    }

    /// Add a metadata entry
    pub fn add_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.push((key.into(), value.into()));
        self
    }

    /// Check that every node input is produced before it is consumed
    pub fn validate(&self) -> Result<()> {
        if self.inputs.is_empty() || self.outputs.is_empty() {
            return Err(HousingError::ExportError("graph needs at least one input and one output".to_string()));
        }

        let mut available: std::collections::HashSet<&str> = self
            .inputs
            .iter()
            .map(|i| i.name.as_str())
            .chain(self.initializers.iter().map(|i| i.name.as_str()))
            .collect();

        for node in &self.nodes {
            if let Some(missing) = node.inputs.iter().find(|i| !available.contains(i.as_str())) {
                return Err(HousingError::ExportError(format!(
                    "node '{}' reads '{}' before it is produced",
                    node.name, missing
                )));
            }
            available.extend(node.outputs.iter().map(|o| o.as_str()));
        }

        if let Some(missing) = self.outputs.iter().find(|o| !available.contains(o.name.as_str())) {
            return Err(HousingError::ExportError(format!("graph output '{}' is never produced", missing.name)));
        }

        for init in &self.initializers {
            let expected: i64 = init.dims.iter().product();
            if expected as usize != init.data.len() {
                return Err(HousingError::ExportError(format!(
                    "initializer '{}' has {} values for dims {:?}",
                    init.name,
                    init.data.len(),
                    init.dims
                )));
            }
        }

        Ok(())
    }
}

/// Trait for models that can be exported to ONNX
pub trait ONNXExportable {
    /// Convert model to ONNX graph
    fn to_onnx_graph(&self) -> Result<ONNXGraph>;
}

impl ONNXExportable for MLPRegressor {
    /// `MatMul -> Add` per layer with the hidden activation between layers.
    /// Input `input: [N, n_features]`, output `output: [N, 1]`.
    fn to_onnx_graph(&self) -> Result<ONNXGraph> {
        if !self.is_fitted() {
            return Err(HousingError::ModelNotFitted);
        }

        let batch = Dimension::Dynamic("N".to_string());
        let mut graph = ONNXGraph::new("mlp_regressor").add_input(TensorSpec::float(
            INPUT_NAME,
            vec![batch.clone(), Dimension::Fixed(self.n_features() as i64)],
        ));

        let n_layers = self.layer_weights().count();
        let activation_op = match self.hidden_activation() {
            Activation::ReLU => Some("Relu"),
            Activation::Sigmoid => Some("Sigmoid"),
            Activation::Tanh => Some("Tanh"),
            Activation::Linear => None,
        };

        let mut current = INPUT_NAME.to_string();
        for (i, (w, b)) in self.layer_weights().enumerate() {
            let is_last = i + 1 == n_layers;
            let w_name = format!("dense_{}/kernel", i);
            let b_name = format!("dense_{}/bias", i);
            let matmul_out = format!("dense_{}/matmul", i);
            let add_out = if is_last {
                OUTPUT_NAME.to_string()
            } else {
                format!("dense_{}/linear", i)
            };

            graph = graph
                .add_initializer(ONNXInitializer::float(
                    w_name.clone(),
                    vec![w.nrows() as i64, w.ncols() as i64],
                    w.iter().map(|&v| v as f32).collect(),
                ))
                .add_initializer(ONNXInitializer::float(
                    b_name.clone(),
                    vec![b.len() as i64],
                    b.iter().map(|&v| v as f32).collect(),
                ))
                .add_node(ONNXNode::new(
                    format!("dense_{}/MatMul", i),
                    "MatMul",
                    vec![current, w_name],
                    vec![matmul_out.clone()],
                ))
                .add_node(ONNXNode::new(
                    format!("dense_{}/Add", i),
                    "Add",
                    vec![matmul_out, b_name],
                    vec![add_out.clone()],
                ));
            current = add_out;

            if let (false, Some(op)) = (is_last, activation_op) {
                let act_out = format!("dense_{}/{}", i, op.to_lowercase());
                graph = graph.add_node(ONNXNode::new(
                    format!("dense_{}/{}", i, op),
                    op,
                    vec![current],
                    vec![act_out.clone()],
                ));
                current = act_out;
            }
        }

        Ok(graph.add_output(TensorSpec::float(OUTPUT_NAME, vec![batch, Dimension::Fixed(1)])))
    }
}

/// ONNX model exporter
#[derive(Debug, Clone, Default)]
pub struct ONNXExporter {
    config: ONNXConfig,
}

impl ONNXExporter {
    /// Create new exporter with default config
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with custom config
    pub fn with_config(config: ONNXConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ONNXConfig {
        &self.config
    }

    /// Build the `ModelProto` for a graph
    pub fn to_model_proto(&self, graph: &ONNXGraph) -> Result<proto::ModelProto> {
        graph.validate()?;

        let graph_proto = proto::GraphProto {
            node: graph.nodes.iter().map(ONNXNode::to_proto).collect(),
            name: graph.name.clone(),
            initializer: graph.initializers.iter().map(ONNXInitializer::to_proto).collect(),
            doc_string: String::new(),
            input: graph.inputs.iter().map(TensorSpec::to_proto).collect(),
            output: graph.outputs.iter().map(TensorSpec::to_proto).collect(),
            value_info: Vec::new(),
        };

        Ok(proto::ModelProto {
            ir_version: self.config.ir_version,
            producer_name: self.config.producer_name.clone(),
            producer_version: self.config.producer_version.clone(),
            domain: String::new(),
            model_version: 1,
            doc_string: self.config.description.clone(),
            graph: Some(graph_proto),
            opset_import: vec![proto::OperatorSetIdProto {
                domain: String::new(),
                version: self.config.opset_version,
            }],
            metadata_props: graph
                .metadata
                .iter()
                .map(|(key, value)| proto::StringStringEntryProto {
                    key: key.clone(),
                    value: value.clone(),
                })
                .collect(),
        })
    }

    /// Encode a model as ONNX protobuf bytes
    pub fn export_bytes<M: ONNXExportable + ?Sized>(&self, model: &M) -> Result<Vec<u8>> {
        let graph = model.to_onnx_graph()?;
        let proto = self.to_model_proto(&graph)?;
        Ok(proto.encode_to_vec())
    }

    /// Write a model to an `.onnx` file
    pub fn export<M: ONNXExportable + ?Sized, P: AsRef<Path>>(&self, model: &M, path: P) -> Result<()> {
        let bytes = self.export_bytes(model)?;
        fs::write(path.as_ref(), &bytes)?;
        info!(
            path = %path.as_ref().display(),
            bytes = bytes.len(),
            opset = self.config.opset_version,
            "ONNX model written"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::MLPConfig;
    use ndarray::{Array1, Array2};

    fn fitted_mlp(hidden: Vec<usize>) -> MLPRegressor {
        let x = Array2::from_shape_fn((30, 3), |(i, j)| (i + j) as f64 / 30.0);
        let y = Array1::from_shape_fn(30, |i| i as f64 / 10.0);
        let mut mlp = MLPRegressor::new(MLPConfig::default().with_hidden_layers(hidden).with_max_epochs(3));
        mlp.fit(&x, &y).unwrap();
        mlp
    }

    #[test]
    fn test_mlp_graph_structure() {
        let mlp = fitted_mlp(vec![8, 4]);
        let graph = mlp.to_onnx_graph().unwrap();

        let ops: Vec<&str> = graph.nodes.iter().map(|n| n.op_type.as_str()).collect();
        assert_eq!(ops, vec!["MatMul", "Add", "Relu", "MatMul", "Add", "Relu", "MatMul", "Add"]);
        assert_eq!(graph.initializers.len(), 6);
        assert_eq!(graph.initializers[0].dims, vec![3, 8]);
        assert_eq!(graph.inputs[0].name, INPUT_NAME);
        assert_eq!(graph.nodes.last().unwrap().outputs, vec![OUTPUT_NAME.to_string()]);
        graph.validate().unwrap();
    }

    #[test]
    fn test_export_bytes_decode() {
        let mlp = fitted_mlp(vec![5]);
        let exporter = ONNXExporter::new();
        let bytes = exporter.export_bytes(&mlp).unwrap();

        let model = proto::ModelProto::decode(bytes.as_slice()).unwrap();
        assert_eq!(model.ir_version, 7);
        assert_eq!(model.producer_name, "housing-mlp");
        assert_eq!(model.opset_import[0].version, 13);
        assert_eq!(model.opset_import[0].domain, "");

        let graph = model.graph.unwrap();
        let input = &graph.input[0];
        assert_eq!(input.name, "input");
        let Some(type_proto::Value::TensorType(tensor)) = input.r#type.as_ref().and_then(|t| t.value.clone()) else {
            panic!("input is not a tensor");
        };
        assert_eq!(tensor.elem_type, proto::data_type::FLOAT);
        let dims: Vec<_> = tensor.shape.unwrap().dim.into_iter().map(|d| d.value).collect();
        assert_eq!(
            dims,
            vec![
                Some(tensor_shape_proto::dimension::Value::DimParam("N".to_string())),
                Some(tensor_shape_proto::dimension::Value::DimValue(3)),
            ]
        );

        let kernel = &graph.initializer[0];
        assert_eq!(kernel.raw_data.len(), 3 * 5 * 4);
    }

    #[test]
    fn test_unfitted_model_cannot_export() {
        let mlp = MLPRegressor::new(MLPConfig::default());
        assert!(matches!(
            ONNXExporter::new().export_bytes(&mlp),
            Err(HousingError::ModelNotFitted)
        ));
    }

    #[test]
    fn test_validate_rejects_dangling_input() {
        let graph = ONNXGraph::new("bad")
            .add_input(TensorSpec::float("input", vec![Dimension::Fixed(1)]))
            .add_node(ONNXNode::new("n", "Relu", vec!["missing".into()], vec!["output".into()]))
            .add_output(TensorSpec::float("output", vec![Dimension::Fixed(1)]));
        assert!(graph.validate().is_err());
    }

    #[test]
    fn test_attributes_encode() {
        let node = ONNXNode::new("g", "Gemm", vec![], vec![])
            .with_attribute("alpha", ONNXAttribute::Float(0.5))
            .with_attribute("transB", ONNXAttribute::Int(1));
        let p = node.to_proto();
        assert_eq!(p.attribute[0].f, 0.5);
        assert_eq!(p.attribute[0].r#type, attribute_type::FLOAT);
        assert_eq!(p.attribute[1].i, 1);
    }
}
