use serde::{Serialize, Serializer};
use std::fmt;

use super::RawOutput;
use crate::error::PipelineError;

/// Probabilities strictly above this are labelled DSPD.
pub const DECISION_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    Dspd,
    NoDspd,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Dspd => "DSPD",
            Label::NoDspd => "No DSPD",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Label {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    pub label: Label,
    pub primary_probability: f64,
    pub complementary_probability: f64,
    pub confidence: f64,
}

/// Interpret a classifier output for one sample.
///
/// With two or more values, index 1 is the DSPD probability and index 0 its
/// complement. A single value is the DSPD probability itself.
pub fn normalize(output: &RawOutput) -> Result<PredictionResult, PipelineError> {
    let row = output.first_row();
    let invalid = || PipelineError::InvalidOutputShape {
        shape: output.shape().to_vec(),
    };

    let (primary, complementary) = match row {
        [] => return Err(invalid()),
        [p] => (*p as f64, 1.0 - *p as f64),
        [c, p, ..] => (*p as f64, *c as f64),
    };
    if !primary.is_finite() || !complementary.is_finite() {
        return Err(invalid());
    }

    let label = if primary > DECISION_THRESHOLD {
        Label::Dspd
    } else {
        Label::NoDspd
    };

    Ok(PredictionResult {
        label,
        primary_probability: primary,
        complementary_probability: complementary,
        confidence: primary.max(complementary),
    })
}
