pub mod mock;
pub mod models;
pub mod normalize;

use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::analysis::Classifier;
use crate::metrics;
use crate::tensor::SampleTensor;

/// Classifier output for one input, passed through untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct RawOutput {
    values: Vec<f32>,
    shape: Vec<usize>,
}

impl RawOutput {
    pub fn new(values: Vec<f32>, shape: Vec<usize>) -> Self {
        Self { values, shape }
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Values of the first sample. The last dimension is the row width.
    pub fn first_row(&self) -> &[f32] {
        let width = match self.shape.as_slice() {
            [] | [_] => self.values.len(),
            dims => dims[dims.len() - 1],
        };
        &self.values[..width.min(self.values.len())]
    }

    /// The output nested along its full shape, e.g. `[[0.2, 0.8]]` for
    /// `[1, 2]`. Outputs with fewer than two dimensions, or whose shape does
    /// not match the value count, are returned as a single row.
    pub fn to_nested(&self) -> Value {
        fn nest(values: &[f32], dims: &[usize]) -> Value {
            match dims {
                [] | [_] => Value::from(values.to_vec()),
                [_, rest @ ..] => {
                    let stride: usize = rest.iter().product();
                    if stride == 0 {
                        return Value::Array(Vec::new());
                    }
                    Value::Array(values.chunks(stride).map(|c| nest(c, rest)).collect())
                }
            }
        }

        let consistent = self.shape.iter().product::<usize>() == self.values.len();
        if self.shape.len() < 2 || !consistent {
            return Value::Array(vec![Value::from(self.values.clone())]);
        }
        nest(&self.values, &self.shape)
    }
}

/// Where a prediction came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelStatus {
    Model { backend: String },
    Mock { reason: MockReason },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockReason {
    ModelNotLoaded,
    PredictionError(String),
}

impl ModelStatus {
    pub fn is_mock(&self) -> bool {
        matches!(self, ModelStatus::Mock { .. })
    }
}

impl fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelStatus::Model { backend } => write!(f, "model_prediction ({})", backend),
            ModelStatus::Mock {
                reason: MockReason::ModelNotLoaded,
            } => write!(f, "mock_prediction (model_not_loaded)"),
            ModelStatus::Mock {
                reason: MockReason::PredictionError(e),
            } => write!(f, "mock_prediction (prediction_error: {})", e),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Inference {
    pub output: RawOutput,
    pub status: ModelStatus,
}

/// Runs the configured classifier, or the deterministic stand-in when none
/// is loaded or the classifier fails.
///
/// `predict` takes `&self` and is called from many requests at once; the
/// classifier implementation is responsible for its own synchronisation.
#[derive(Clone, Default)]
pub struct InferenceAdapter {
    classifier: Option<Arc<dyn Classifier>>,
}

impl InferenceAdapter {
    pub fn new(classifier: Option<Arc<dyn Classifier>>) -> Self {
        Self { classifier }
    }

    /// Adapter with no classifier; every prediction is a stand-in.
    pub fn stand_in() -> Self {
        Self { classifier: None }
    }

    pub fn with_classifier(classifier: Arc<dyn Classifier>) -> Self {
        Self {
            classifier: Some(classifier),
        }
    }

    pub fn is_model_loaded(&self) -> bool {
        self.classifier.is_some()
    }

    pub fn backend_name(&self) -> &str {
        self.classifier
            .as_ref()
            .map(|c| c.name())
            .unwrap_or("mock")
    }

    /// Expected input width of the loaded classifier, if it declares one.
    pub fn input_width(&self) -> Option<usize> {
        self.classifier.as_ref().and_then(|c| c.input_width())
    }

    pub fn predict(&self, tensor: &SampleTensor) -> Inference {
        let Some(classifier) = &self.classifier else {
            debug!("No classifier loaded, using stand-in prediction");
            return Inference {
                output: mock::stand_in(tensor),
                status: ModelStatus::Mock {
                    reason: MockReason::ModelNotLoaded,
                },
            };
        };

        match classifier.predict(tensor) {
            Ok(output) => {
                debug!("Raw prediction {:?} (shape {:?})", output.values(), output.shape());
                Inference {
                    output,
                    status: ModelStatus::Model {
                        backend: classifier.name().to_string(),
                    },
                }
            }
            Err(e) => {
                warn!("Inference failed, falling back to stand-in: {}", e);
                metrics::INFERENCE_FAILURES_TOTAL.inc();
                Inference {
                    output: mock::stand_in(tensor),
                    status: ModelStatus::Mock {
                        reason: MockReason::PredictionError(e.to_string()),
                    },
                }
            }
        }
    }
}
