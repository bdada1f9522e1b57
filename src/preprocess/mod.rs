//! Turning uploads into classifier input tensors.
//!
//! Sequence text goes through [`sanitize`] and [`SequenceEncoder`];
//! NPZ containers go through [`load_array`]. Both paths end in a
//! [`SampleTensor`](crate::tensor::SampleTensor).

pub mod encode;
pub mod npy;
pub mod npz;
pub mod sanitize;

pub use encode::{AlphabetPolicy, SequenceEncoder, DEFAULT_MAX_LENGTH};
pub use npz::{load_array, load_array_with_limit, NpzWriter, PreprocessedArray, DEFAULT_MAX_ARRAY_BYTES};
pub use sanitize::{sanitize, SanitizedSequence, NUCLEOTIDES};
