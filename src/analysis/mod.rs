use anyhow::Result;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::InferenceError;
use crate::ml::models::OutputActivation;
use crate::ml::RawOutput;
use crate::tensor::SampleTensor;

pub mod candle;
#[cfg(feature = "torch")]
pub mod torch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// safetensors weights for the dense sequence classifier
    #[default]
    Candle,
    /// TorchScript module (requires the `torch` feature)
    Torch,
}

/// A loaded binary classifier: one input sample in, raw scores out.
pub trait Classifier: Send + Sync {
    /// Short backend name reported in responses.
    fn name(&self) -> &str;

    /// Input width the classifier was built for, when known.
    fn input_width(&self) -> Option<usize> {
        None
    }

    fn predict(&self, input: &SampleTensor) -> Result<RawOutput, InferenceError>;
}

/// Build a classifier of the given backend from serialized model bytes.
pub fn load_classifier(
    backend: Backend,
    bytes: &[u8],
    activation: OutputActivation,
) -> Result<Arc<dyn Classifier>> {
    match backend {
        Backend::Candle => Ok(Arc::new(candle::CandleClassifier::from_safetensors(
            bytes, activation,
        )?)),
        #[cfg(feature = "torch")]
        Backend::Torch => Ok(Arc::new(torch::TorchClassifier::from_bytes(bytes)?)),
        #[cfg(not(feature = "torch"))]
        Backend::Torch => {
            let _ = activation;
            anyhow::bail!("built without torch support; rebuild with --features torch")
        }
    }
}
