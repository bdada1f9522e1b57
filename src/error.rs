use thiserror::Error;

/// Failures the prediction pipeline reports to its caller.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Sanitisation left no A/C/G/T symbols.
    #[error("No valid nucleotides found in sequence")]
    EmptySequence,

    /// A sequence upload whose bytes are not UTF-8 text.
    #[error("Sequence file is not valid UTF-8 text: {0}")]
    InvalidText(#[from] std::str::Utf8Error),

    /// The preprocessed-array container is unreadable or holds no usable array.
    #[error("Error loading NPZ file: {0}")]
    MalformedContainer(String),

    /// The classifier produced an output the normalizer cannot interpret.
    #[error("Classifier returned an unusable output (shape {shape:?})")]
    InvalidOutputShape { shape: Vec<usize> },
}

impl PipelineError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        PipelineError::MalformedContainer(msg.into())
    }

    /// True for problems with the uploaded input rather than the service.
    pub fn is_client_error(&self) -> bool {
        match self {
            PipelineError::EmptySequence
            | PipelineError::InvalidText(_)
            | PipelineError::MalformedContainer(_) => true,
            PipelineError::InvalidOutputShape { .. } => false,
        }
    }
}

/// Failures raised by a classifier backend. These never reach the caller:
/// the inference adapter turns them into a stand-in prediction.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("input width {actual} does not match model input width {expected}")]
    InputWidth { expected: usize, actual: usize },

    #[error("{0}")]
    Backend(String),

    #[error("classifier lock poisoned")]
    Poisoned,
}

impl InferenceError {
    pub fn backend(err: impl std::fmt::Display) -> Self {
        InferenceError::Backend(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_classification() {
        assert!(PipelineError::EmptySequence.is_client_error());
        assert!(PipelineError::malformed("no arrays").is_client_error());
        assert!(!PipelineError::InvalidOutputShape { shape: vec![1, 0] }.is_client_error());
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            PipelineError::EmptySequence.to_string(),
            "No valid nucleotides found in sequence"
        );
        assert_eq!(
            PipelineError::malformed("No data found in NPZ file").to_string(),
            "Error loading NPZ file: No data found in NPZ file"
        );
    }
}
