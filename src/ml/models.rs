use candle_core::{Error, Result, Tensor};
use candle_nn::{Linear, Module};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Activation applied to the final layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum OutputActivation {
    /// Softmax for two or more outputs, sigmoid for one.
    #[default]
    Auto,
    Softmax,
    Sigmoid,
    None,
}

/// Dense binary classifier over a flattened one-hot sequence.
///
/// Weights are named `layer1.weight`, `layer1.bias`, `layer2.weight`, ...
/// with ReLU between layers.
#[derive(Clone)]
pub struct SequenceClassifier {
    layers: Vec<Linear>,
    dims: Vec<usize>,
    activation: OutputActivation,
}

impl SequenceClassifier {
    /// Build from named tensors, reading layer widths from the weights.
    pub fn from_tensors(
        mut tensors: HashMap<String, Tensor>,
        activation: OutputActivation,
    ) -> Result<Self> {
        let mut layers = Vec::new();
        let mut dims = Vec::new();

        for idx in 1.. {
            let Some(weight) = tensors.remove(&format!("layer{}.weight", idx)) else {
                break;
            };
            let bias = tensors.remove(&format!("layer{}.bias", idx));
            let (out_dim, in_dim) = weight.dims2()?;

            match dims.last() {
                None => dims.push(in_dim),
                Some(&prev) if prev != in_dim => {
                    return Err(Error::Msg(format!(
                        "layer{} expects {} inputs but previous layer emits {}",
                        idx, in_dim, prev
                    )));
                }
                Some(_) => {}
            }
            dims.push(out_dim);
            layers.push(Linear::new(weight, bias));
        }

        if layers.is_empty() {
            return Err(Error::Msg("no layer1.weight tensor found".to_string()));
        }

        Ok(Self {
            layers,
            dims,
            activation,
        })
    }

    pub fn input_dim(&self) -> usize {
        self.dims[0]
    }

    pub fn output_dim(&self) -> usize {
        self.dims[self.dims.len() - 1]
    }

    pub fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let last = self.layers.len() - 1;
        let mut xs = xs.clone();
        for (i, layer) in self.layers.iter().enumerate() {
            xs = layer.forward(&xs)?;
            if i < last {
                xs = xs.relu()?;
            }
        }

        match self.activation {
            OutputActivation::Softmax => candle_nn::ops::softmax(&xs, 1),
            OutputActivation::Sigmoid => candle_nn::ops::sigmoid(&xs),
            OutputActivation::None => Ok(xs),
            OutputActivation::Auto if self.output_dim() > 1 => candle_nn::ops::softmax(&xs, 1),
            OutputActivation::Auto => candle_nn::ops::sigmoid(&xs),
        }
    }
}
