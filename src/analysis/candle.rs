use anyhow::{Context, Result};
use candle_core::{Device, Tensor};
use tracing::info;

use super::Classifier;
use crate::error::InferenceError;
use crate::ml::models::{OutputActivation, SequenceClassifier};
use crate::ml::RawOutput;
use crate::tensor::SampleTensor;

/// Candle-backed dense classifier running on the CPU.
pub struct CandleClassifier {
    model: SequenceClassifier,
    device: Device,
}

impl CandleClassifier {
    pub fn new(model: SequenceClassifier) -> Self {
        Self {
            model,
            device: Device::Cpu,
        }
    }

    /// Load weights from an in-memory safetensors file.
    pub fn from_safetensors(bytes: &[u8], activation: OutputActivation) -> Result<Self> {
        let tensors = candle_core::safetensors::load_buffer(bytes, &Device::Cpu)
            .context("Failed to parse safetensors weights")?;
        let model = SequenceClassifier::from_tensors(tensors, activation)
            .context("Failed to build sequence classifier from weights")?;

        info!(
            "Loaded candle classifier: input width {}, {} output(s)",
            model.input_dim(),
            model.output_dim()
        );

        Ok(Self::new(model))
    }
}

impl Classifier for CandleClassifier {
    fn name(&self) -> &str {
        "candle"
    }

    fn input_width(&self) -> Option<usize> {
        Some(self.model.input_dim())
    }

    fn predict(&self, input: &SampleTensor) -> Result<RawOutput, InferenceError> {
        let expected = self.model.input_dim();
        if input.cols() != expected {
            return Err(InferenceError::InputWidth {
                expected,
                actual: input.cols(),
            });
        }

        let xs = Tensor::from_slice(input.values(), (input.rows(), input.cols()), &self.device)
            .map_err(InferenceError::backend)?;
        let output = self.model.forward(&xs).map_err(InferenceError::backend)?;

        let shape = output.dims().to_vec();
        let values = output
            .flatten_all()
            .and_then(|t| t.to_vec1::<f32>())
            .map_err(InferenceError::backend)?;

        Ok(RawOutput::new(values, shape))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::DType;
    use std::collections::HashMap;

    fn weights(input: usize, dspd_bias: f32) -> HashMap<String, Tensor> {
        let device = Device::Cpu;
        let mut tensors = HashMap::new();
        tensors.insert(
            "layer1.weight".to_string(),
            Tensor::zeros((2, input), DType::F32, &device).unwrap(),
        );
        tensors.insert(
            "layer1.bias".to_string(),
            Tensor::new(&[0.0f32, dspd_bias], &device).unwrap(),
        );
        tensors
    }

    #[test]
    fn test_safetensors_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.safetensors");
        candle_core::safetensors::save(&weights(8, 3.0), &path).unwrap();
        let bytes = std::fs::read(&path).unwrap();

        let classifier = CandleClassifier::from_safetensors(&bytes, OutputActivation::Auto).unwrap();
        assert_eq!(classifier.input_width(), Some(8));

        let output = classifier.predict(&SampleTensor::row(vec![1.0; 8])).unwrap();
        assert_eq!(output.shape(), &[1, 2]);
        assert!(output.values()[1] > 0.9);
    }

    #[test]
    fn test_width_mismatch_is_error() {
        let model = SequenceClassifier::from_tensors(weights(8, 0.0), OutputActivation::Auto).unwrap();
        let classifier = CandleClassifier::new(model);
        let err = classifier.predict(&SampleTensor::row(vec![1.0; 12])).unwrap_err();
        assert!(matches!(
            err,
            InferenceError::InputWidth {
                expected: 8,
                actual: 12
            }
        ));
    }

    #[test]
    fn test_garbage_bytes_rejected() {
        assert!(CandleClassifier::from_safetensors(b"not safetensors", OutputActivation::Auto).is_err());
    }
}
