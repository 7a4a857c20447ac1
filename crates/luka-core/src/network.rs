//! Feed-forward ReLU network model.
//!
//! A network is an ordered list of layers. Each node is a pre-activation
//! affine functional `bias + Σ wₖ·xₖ` over the previous layer's outputs (or
//! over the network inputs for the first layer). Every layer except the last
//! is followed by a ReLU gate.

use crate::error::{LukaError, Result};
use serde::{Deserialize, Serialize};

/// One neuron: a bias plus one weight per predecessor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub bias: f64,
    pub weights: Vec<f64>,
}

impl Node {
    pub fn new(bias: f64, weights: Vec<f64>) -> Self {
        Self { bias, weights }
    }

    /// Pre-activation value for the given predecessor outputs.
    #[inline]
    pub fn evaluate(&self, inputs: &[f64]) -> f64 {
        self.bias
            + self
                .weights
                .iter()
                .zip(inputs)
                .map(|(w, x)| w * x)
                .sum::<f64>()
    }
}

/// An ordered list of nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub nodes: Vec<Node>,
}

impl Layer {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// A validated feed-forward ReLU network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Layer>", into = "Vec<Layer>")]
pub struct Network {
    layers: Vec<Layer>,
}

impl Network {
    /// Build a network, checking layer/node dimension consistency.
    pub fn new(layers: Vec<Layer>) -> Result<Self> {
        let first = layers
            .first()
            .ok_or_else(|| LukaError::MalformedNetwork("network has no layers".into()))?;
        let input_dim = first
            .nodes
            .first()
            .map(|node| node.weights.len())
            .ok_or_else(|| LukaError::MalformedNetwork("layer 0 has no nodes".into()))?;
        if input_dim == 0 {
            return Err(LukaError::MalformedNetwork(
                "layer 0 nodes have no input weights".into(),
            ));
        }

        let mut expected = input_dim;
        for (layer_idx, layer) in layers.iter().enumerate() {
            if layer.is_empty() {
                return Err(LukaError::MalformedNetwork(format!(
                    "layer {} has no nodes",
                    layer_idx
                )));
            }
            for (node_idx, node) in layer.nodes.iter().enumerate() {
                if node.weights.len() != expected {
                    return Err(LukaError::MalformedNetwork(format!(
                        "node {} of layer {} has {} weights, expected {}",
                        node_idx,
                        layer_idx,
                        node.weights.len(),
                        expected
                    )));
                }
                if !node.bias.is_finite() || node.weights.iter().any(|w| !w.is_finite()) {
                    return Err(LukaError::MalformedNetwork(format!(
                        "node {} of layer {} has a non-finite coefficient",
                        node_idx, layer_idx
                    )));
                }
            }
            expected = layer.len();
        }

        Ok(Self { layers })
    }

    /// Build a network from rows of `[bias, w1, …, wn]`, one row per node.
    pub fn from_rows(rows: Vec<Vec<Vec<f64>>>) -> Result<Self> {
        let layers = rows
            .into_iter()
            .enumerate()
            .map(|(layer_idx, layer)| {
                layer
                    .into_iter()
                    .map(|row| match row.split_first() {
                        Some((bias, weights)) => Ok(Node::new(*bias, weights.to_vec())),
                        None => Err(LukaError::MalformedNetwork(format!(
                            "empty node row in layer {}",
                            layer_idx
                        ))),
                    })
                    .collect::<Result<Vec<_>>>()
                    .map(Layer::new)
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(layers)
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer(&self, idx: usize) -> &Layer {
        &self.layers[idx]
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    /// Number of network inputs.
    pub fn input_dim(&self) -> usize {
        self.layers[0].nodes[0].weights.len()
    }

    /// Number of nodes in the final (ungated) layer.
    pub fn output_dim(&self) -> usize {
        self.layers[self.layers.len() - 1].len()
    }

    /// Forward pass: ReLU after every layer except the last.
    pub fn evaluate(&self, input: &[f64]) -> Result<Vec<f64>> {
        if input.len() != self.input_dim() {
            return Err(LukaError::MalformedNetwork(format!(
                "input has {} values, network expects {}",
                input.len(),
                self.input_dim()
            )));
        }
        let last = self.layers.len() - 1;
        let mut values = input.to_vec();
        for (idx, layer) in self.layers.iter().enumerate() {
            values = layer
                .nodes
                .iter()
                .map(|node| {
                    let pre = node.evaluate(&values);
                    if idx == last {
                        pre
                    } else {
                        pre.max(0.0)
                    }
                })
                .collect();
        }
        Ok(values)
    }
}

impl TryFrom<Vec<Layer>> for Network {
    type Error = LukaError;

    fn try_from(layers: Vec<Layer>) -> Result<Self> {
        Network::new(layers)
    }
}

impl From<Network> for Vec<Layer> {
    fn from(network: Network) -> Self {
        network.layers
    }
}
