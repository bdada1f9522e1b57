use rand::{rngs::StdRng, Rng, SeedableRng};
use sha2::{Digest, Sha256};

use super::RawOutput;
use crate::tensor::SampleTensor;

/// Leading elements of the input that seed the stand-in generator.
pub const SEED_PREFIX_LEN: usize = 100;

/// Range the stand-in DSPD probability is drawn from.
pub const STAND_IN_RANGE: std::ops::Range<f64> = 0.3..0.7;

fn seed_for(tensor: &SampleTensor) -> u64 {
    let mut hasher = Sha256::new();
    for v in tensor.values().iter().take(SEED_PREFIX_LEN) {
        hasher.update(v.to_le_bytes());
    }
    let digest = hasher.finalize();
    let mut seed = [0u8; 8];
    seed.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(seed)
}

/// Reproducible placeholder output `[1 - p, p]` with `p` in 0.3..0.7.
pub fn stand_in(tensor: &SampleTensor) -> RawOutput {
    let mut rng = StdRng::seed_from_u64(seed_for(tensor));
    let p = rng.gen_range(STAND_IN_RANGE);
    RawOutput::new(vec![(1.0 - p) as f32, p as f32], vec![1, 2])
}
