use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use super::sanitize::{SanitizedSequence, NUCLEOTIDES};
use crate::tensor::SampleTensor;

/// Rows in an encoded sequence tensor unless configured otherwise.
pub const DEFAULT_MAX_LENGTH: usize = 13_000;

/// Which symbols define the one-hot columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum AlphabetPolicy {
    /// Always four columns, A C G T.
    #[default]
    Fixed,
    /// One column per distinct symbol present in the input, sorted.
    /// Matches models trained with a per-sequence fitted encoder; the width
    /// varies between inputs.
    Observed,
}

/// One-hot encoder with tail padding and truncation to `max_length` rows.
#[derive(Debug, Clone)]
pub struct SequenceEncoder {
    max_length: usize,
    policy: AlphabetPolicy,
}

impl Default for SequenceEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LENGTH, AlphabetPolicy::Fixed)
    }
}

impl SequenceEncoder {
    pub fn new(max_length: usize, policy: AlphabetPolicy) -> Self {
        Self { max_length, policy }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn policy(&self) -> AlphabetPolicy {
        self.policy
    }

    fn alphabet(&self, seq: &SanitizedSequence) -> Vec<u8> {
        match self.policy {
            AlphabetPolicy::Fixed => NUCLEOTIDES.to_vec(),
            AlphabetPolicy::Observed => seq.distinct_symbols(),
        }
    }

    /// Encode `seq` as a `(max_length, alphabet width)` tensor.
    ///
    /// Symbols past `max_length` are dropped; shorter sequences are followed
    /// by all-zero rows.
    pub fn encode(&self, seq: &SanitizedSequence) -> SampleTensor {
        let alphabet = self.alphabet(seq);
        let width = alphabet.len();

        let mut column = [usize::MAX; 256];
        for (idx, &sym) in alphabet.iter().enumerate() {
            column[sym as usize] = idx;
        }

        let mut tensor = SampleTensor::zeros(self.max_length, width);
        for (row, &sym) in seq.as_bytes().iter().take(self.max_length).enumerate() {
            tensor.set(row, column[sym as usize], 1.0);
        }
        tensor
    }

    /// Human-readable description reported alongside predictions.
    pub fn describe(&self) -> String {
        match self.policy {
            AlphabetPolicy::Fixed => {
                format!("One-hot encoding (max_length={})", self.max_length)
            }
            AlphabetPolicy::Observed => format!(
                "One-hot encoding, observed alphabet (max_length={})",
                self.max_length
            ),
        }
    }
}
