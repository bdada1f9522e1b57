use serde::{Serialize, Serializer};
use std::time::Instant;
use tracing::{debug, info};

use crate::config::ServiceConfig;
use crate::error::PipelineError;
use crate::metrics;
use crate::ml::normalize::{normalize, Label};
use crate::ml::InferenceAdapter;
use crate::preprocess::{load_array_with_limit, sanitize, SequenceEncoder, DEFAULT_MAX_ARRAY_BYTES};
use crate::tensor::SampleTensor;

/// How an upload is turned into a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    PreprocessedArray,
    SequenceText,
}

impl InputKind {
    /// Case-insensitive suffix match against `array_extensions`.
    pub fn from_filename(filename: &str, array_extensions: &[String]) -> Self {
        let lower = filename.to_ascii_lowercase();
        if array_extensions
            .iter()
            .any(|ext| lower.ends_with(&ext.to_ascii_lowercase()))
        {
            InputKind::PreprocessedArray
        } else {
            InputKind::SequenceText
        }
    }
}

/// Symbol count of a text upload; array uploads have none.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceLength {
    Symbols(usize),
    Preprocessed,
}

impl Serialize for SequenceLength {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            SequenceLength::Symbols(n) => serializer.serialize_u64(*n as u64),
            SequenceLength::Preprocessed => serializer.serialize_str("Preprocessed"),
        }
    }
}

/// A tensor ready for inference, plus how it was produced.
#[derive(Debug, Clone)]
pub struct PreparedInput {
    pub tensor: SampleTensor,
    pub sequence_length: SequenceLength,
    pub preprocessing_method: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PredictionResponse {
    pub prediction: Label,
    pub mutation_probability: f64,
    pub non_mutation_probability: f64,
    pub confidence: f64,
    pub processing_time: f64,
    pub sequence_length: SequenceLength,
    pub filename: String,
    pub processed_shape: Vec<usize>,
    pub preprocessing_method: String,
    pub backend_type: String,
    pub model_status: String,
    pub model_loaded: bool,
    pub raw_prediction: serde_json::Value,
}

/// Upload in, prediction payload out.
pub struct PredictionPipeline {
    encoder: SequenceEncoder,
    adapter: InferenceAdapter,
    array_extensions: Vec<String>,
    max_array_bytes: usize,
}

impl PredictionPipeline {
    pub fn new(encoder: SequenceEncoder, adapter: InferenceAdapter, array_extensions: Vec<String>) -> Self {
        Self {
            encoder,
            adapter,
            array_extensions,
            max_array_bytes: DEFAULT_MAX_ARRAY_BYTES,
        }
    }

    pub fn from_config(config: &ServiceConfig, adapter: InferenceAdapter) -> Self {
        Self::new(
            SequenceEncoder::new(config.max_length, config.alphabet),
            adapter,
            config.array_extensions.clone(),
        )
        .with_max_array_bytes(config.max_array_bytes)
    }

    /// Cap the decompressed size of array uploads.
    pub fn with_max_array_bytes(mut self, max_array_bytes: usize) -> Self {
        self.max_array_bytes = max_array_bytes;
        self
    }

    pub fn adapter(&self) -> &InferenceAdapter {
        &self.adapter
    }

    pub fn encoder(&self) -> &SequenceEncoder {
        &self.encoder
    }

    /// Route the upload by file name and build the single-sample tensor.
    pub fn prepare(&self, filename: &str, content: &[u8]) -> Result<PreparedInput, PipelineError> {
        match InputKind::from_filename(filename, &self.array_extensions) {
            InputKind::PreprocessedArray => {
                let array = load_array_with_limit(content, self.max_array_bytes)?;
                Ok(PreparedInput {
                    tensor: array.tensor,
                    sequence_length: SequenceLength::Preprocessed,
                    preprocessing_method: "NPZ (already preprocessed)".to_string(),
                })
            }
            InputKind::SequenceText => {
                let text = std::str::from_utf8(content)?;
                let seq = sanitize(text)?;
                debug!("Cleaned sequence length: {}", seq.len());
                let tensor = self.encoder.encode(&seq).flatten();
                Ok(PreparedInput {
                    tensor,
                    sequence_length: SequenceLength::Symbols(seq.len()),
                    preprocessing_method: self.encoder.describe(),
                })
            }
        }
    }

    /// Full prediction for one upload.
    pub fn run(&self, filename: &str, content: &[u8]) -> Result<PredictionResponse, PipelineError> {
        let start = Instant::now();
        info!("Processing file: {} ({} bytes)", filename, content.len());

        let prepared = self.prepare(filename, content)?;
        let processed_shape = prepared.tensor.shape().to_vec();
        debug!("Processed shape: {:?}", processed_shape);

        let inference = self.adapter.predict(&prepared.tensor);
        let result = normalize(&inference.output)?;

        if inference.status.is_mock() {
            metrics::STAND_IN_PREDICTIONS_TOTAL.inc();
        }
        metrics::PREDICTIONS_TOTAL
            .with_label_values(&[result.label.as_str()])
            .inc();

        let processing_time = start.elapsed().as_secs_f64();
        metrics::PREDICTION_SECONDS.observe(processing_time);
        info!(
            "Prediction complete: {} ({:.1}% confidence, {})",
            result.label,
            result.confidence * 100.0,
            inference.status
        );

        Ok(PredictionResponse {
            prediction: result.label,
            mutation_probability: result.primary_probability,
            non_mutation_probability: result.complementary_probability,
            confidence: result.confidence,
            processing_time,
            sequence_length: prepared.sequence_length,
            filename: filename.to_string(),
            processed_shape,
            preprocessing_method: prepared.preprocessing_method,
            backend_type: self.adapter.backend_name().to_string(),
            model_status: inference.status.to_string(),
            model_loaded: self.adapter.is_model_loaded(),
            raw_prediction: inference.output.to_nested(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Classifier;
    use crate::error::InferenceError;
    use crate::ml::RawOutput;
    use crate::preprocess::{AlphabetPolicy, NpzWriter};
    use std::sync::Arc;

    struct Scripted(Vec<f32>);

    impl Classifier for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn predict(&self, _input: &SampleTensor) -> Result<RawOutput, InferenceError> {
            Ok(RawOutput::new(self.0.clone(), vec![1, self.0.len()]))
        }
    }

    fn pipeline(adapter: InferenceAdapter) -> PredictionPipeline {
        PredictionPipeline::from_config(&ServiceConfig::default(), adapter)
    }

    #[test]
    fn test_input_routing() {
        let exts = vec![".npz".to_string()];
        assert_eq!(InputKind::from_filename("sample.NPZ", &exts), InputKind::PreprocessedArray);
        assert_eq!(InputKind::from_filename("seq.fasta", &exts), InputKind::SequenceText);
        assert_eq!(InputKind::from_filename("npz.txt", &exts), InputKind::SequenceText);
    }

    #[test]
    fn test_end_to_end_text_shape() {
        let pipeline = pipeline(InferenceAdapter::stand_in());
        let prepared = pipeline.prepare("seq.txt", b"ATGCATGCATGC").unwrap();
        assert_eq!(prepared.tensor.shape(), [1, 52_000]);
        assert_eq!(prepared.sequence_length, SequenceLength::Symbols(12));
        assert_eq!(prepared.preprocessing_method, "One-hot encoding (max_length=13000)");
    }

    #[test]
    fn test_observed_alphabet_width_flows_through() {
        let config = ServiceConfig {
            alphabet: AlphabetPolicy::Observed,
            max_length: 10,
            ..Default::default()
        };
        let pipeline = PredictionPipeline::from_config(&config, InferenceAdapter::stand_in());
        let prepared = pipeline.prepare("seq.txt", b"GAGA").unwrap();
        assert_eq!(prepared.tensor.shape(), [1, 20]);
    }

    #[test]
    fn test_text_errors() {
        let pipeline = pipeline(InferenceAdapter::stand_in());
        assert!(matches!(
            pipeline.run("seq.fasta", b">header only\n"),
            Err(PipelineError::EmptySequence)
        ));
        assert!(matches!(
            pipeline.run("seq.fasta", &[0xff, 0xfe, 0x41]),
            Err(PipelineError::InvalidText(_))
        ));
        assert!(matches!(
            pipeline.run("seq.npz", b"ACGT"),
            Err(PipelineError::MalformedContainer(_))
        ));
    }

    #[test]
    fn test_real_classifier_payload() {
        let adapter = InferenceAdapter::with_classifier(Arc::new(Scripted(vec![0.2, 0.8])));
        let response = pipeline(adapter).run("seq.fasta", b">s\nACGTACGT\n").unwrap();

        assert_eq!(response.prediction, Label::Dspd);
        assert!((response.mutation_probability - 0.8).abs() < 1e-6);
        assert!((response.non_mutation_probability - 0.2).abs() < 1e-6);
        assert!((response.confidence - 0.8).abs() < 1e-6);
        assert_eq!(response.model_status, "model_prediction (scripted)");
        assert_eq!(response.backend_type, "scripted");
        assert!(response.model_loaded);
        assert_eq!(response.raw_prediction, serde_json::json!([[0.2f32, 0.8f32]]));
        assert_eq!(response.sequence_length, SequenceLength::Symbols(8));
    }

    #[test]
    fn test_stand_in_payload_is_reproducible() {
        let pipeline = pipeline(InferenceAdapter::stand_in());
        let a = pipeline.run("seq.fasta", b"ACGTTTGACA").unwrap();
        let b = pipeline.run("seq.fasta", b"ACGTTTGACA").unwrap();

        assert_eq!(a.raw_prediction, b.raw_prediction);
        assert_eq!(a.model_status, "mock_prediction (model_not_loaded)");
        assert!(!a.model_loaded);
        assert!(a.mutation_probability >= 0.29 && a.mutation_probability <= 0.71);
    }

    #[test]
    fn test_array_upload() {
        let mut writer = NpzWriter::new();
        writer.add("data", &[2, 3], &[1.0, 0.0, 0.0, 0.0, 1.0, 0.0]).unwrap();
        let container = writer.finish().unwrap();

        let adapter = InferenceAdapter::with_classifier(Arc::new(Scripted(vec![0.4])));
        let response = pipeline(adapter).run("sample.npz", &container).unwrap();
        assert_eq!(response.processed_shape, vec![1, 3]);
        assert_eq!(response.sequence_length, SequenceLength::Preprocessed);
        assert_eq!(response.prediction, Label::NoDspd);
        assert!((response.confidence - 0.6).abs() < 1e-6);

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["sequence_length"], "Preprocessed");
        assert_eq!(json["prediction"], "No DSPD");
        assert_eq!(json["preprocessing_method"], "NPZ (already preprocessed)");
    }

    #[test]
    fn test_array_upload_over_decompressed_cap_rejected() {
        let mut writer = NpzWriter::new();
        writer.add("data", &[1, 50_000], &vec![0.0; 50_000]).unwrap();
        let container = writer.finish().unwrap();

        let config = ServiceConfig {
            max_array_bytes: 16 * 1024,
            ..Default::default()
        };
        let pipeline = PredictionPipeline::from_config(&config, InferenceAdapter::stand_in());
        let err = pipeline.run("sample.npz", &container).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedContainer(_)));
        assert!(err.is_client_error());
    }

    #[test]
    fn test_empty_classifier_output_is_server_error() {
        let adapter = InferenceAdapter::with_classifier(Arc::new(Scripted(vec![])));
        let err = pipeline(adapter).run("seq.txt", b"ACGT").unwrap_err();
        assert!(matches!(err, PipelineError::InvalidOutputShape { .. }));
        assert!(!err.is_client_error());
    }
}
