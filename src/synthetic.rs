//! Synthetic attention patterns for offline demos and tests
//!
//! Produces softmax-shaped causal data with the exact tensor layout the
//! backend serves, so every derivation path can run without a model.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::affinity::AffinityMatrix;
use crate::types::AttentionTensor;

/// Generate a ragged attention tensor for one (layer, head) grid.
///
/// Rows favor the diagonal slightly and are normalized to sum to 1,
/// like real softmax attention. Deterministic for a fixed seed.
pub fn synthetic_attention(
    n_tokens: usize,
    n_layers: usize,
    n_heads: usize,
    seed: u64,
) -> AttentionTensor {
    let mut rng = StdRng::seed_from_u64(seed);
    let steps = n_tokens.saturating_sub(1);

    (0..steps)
        .map(|step| {
            let row_len = step + 2;
            (0..n_layers)
                .map(|_| {
                    (0..n_heads)
                        .map(|_| {
                            let mut row: Vec<f32> = (0..row_len)
                                .map(|col| {
                                    if col == row_len - 1 {
                                        0.1 + rng.gen::<f32>() * 0.2
                                    } else {
                                        rng.gen::<f32>() * 0.8
                                    }
                                })
                                .collect();
                            let mass: f32 = row.iter().sum();
                            if mass > 0.0 {
                                for w in &mut row {
                                    *w /= mass;
                                }
                            }
                            row
                        })
                        .collect()
                })
                .collect()
        })
        .collect()
}

/// Convenience: a dense synthetic affinity matrix for one head
pub fn synthetic_affinity(n_tokens: usize, seed: u64) -> AffinityMatrix {
    let tensor = synthetic_attention(n_tokens, 1, 1, seed);
    AffinityMatrix::from_attention(Some(&tensor), 0, 0, n_tokens)
}
