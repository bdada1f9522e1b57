use anyhow::{Context, Result};
use std::io::Cursor;
use std::sync::Mutex;
use tch::{CModule, Kind, Tensor};

use super::Classifier;
use crate::error::InferenceError;
use crate::ml::RawOutput;
use crate::tensor::SampleTensor;

/// TorchScript classifier. Calls into the module are serialised.
pub struct TorchClassifier {
    model: Mutex<CModule>,
}

impl TorchClassifier {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let model = CModule::load_data(&mut Cursor::new(bytes))
            .context("Failed to load TorchScript model")?;
        Ok(Self {
            model: Mutex::new(model),
        })
    }
}

impl Classifier for TorchClassifier {
    fn name(&self) -> &str {
        "torch"
    }

    fn predict(&self, input: &SampleTensor) -> Result<RawOutput, InferenceError> {
        let tensor = Tensor::from_slice(input.values())
            .reshape([input.rows() as i64, input.cols() as i64]);

        let output = {
            let model = self.model.lock().map_err(|_| InferenceError::Poisoned)?;
            model
                .forward_ts(&[tensor])
                .map_err(InferenceError::backend)?
        };

        let shape = output.size().iter().map(|&d| d as usize).collect();
        let flat = output.flatten(0, -1).to_kind(Kind::Float);
        let values = Vec::<f32>::try_from(&flat).map_err(InferenceError::backend)?;
        Ok(RawOutput::new(values, shape))
    }
}
