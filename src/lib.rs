//! DSPD mutation prediction: nucleotide sequence or preprocessed array in,
//! binary DSPD / No DSPD prediction out.

pub mod analysis;
pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod metrics;
pub mod ml;
pub mod model_client;
pub mod preprocess;
pub mod processing;
pub mod storage;
pub mod tensor;
