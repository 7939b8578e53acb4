//! Value-weighted attention derivation
//!
//! Raw softmax attention is not information flow: a source token can be
//! attended to strongly while carrying a near-zero value vector. Scaling
//! each weight by the norm of the value vector at the source position
//! gives a better proxy for what the head actually moves.

use crate::types::AttentionTensor;

/// Value-vector norms, indexed `[layer][head][src_position]`
pub type ValueNorms = Vec<Vec<Vec<f32>>>;

/// Rescale every attention weight by the matching value-vector norm.
///
/// Output has exactly the shape of the input tensor and is consumed by
/// the same code paths (affinity building, highlight scoring). The
/// result is deliberately NOT renormalized: it is a relative-magnitude
/// signal, not a probability distribution.
///
/// Layers or heads the norms do not cover fall back to the raw weights,
/// treating them as already value-adjusted.
pub fn derive_value_weighted(
    attention: &AttentionTensor,
    value_norms: Option<&ValueNorms>,
) -> AttentionTensor {
    attention
        .iter()
        .map(|step| {
            step.iter()
                .enumerate()
                .map(|(layer, heads)| {
                    heads
                        .iter()
                        .enumerate()
                        .map(|(head, row)| weight_row(row, value_norms, layer, head))
                        .collect()
                })
                .collect()
        })
        .collect()
}

fn weight_row(
    row: &[f32],
    value_norms: Option<&ValueNorms>,
    layer: usize,
    head: usize,
) -> Vec<f32> {
    let norms = value_norms.and_then(|n| n.get(layer)).and_then(|l| l.get(head));
    match norms {
        Some(norms) => row
            .iter()
            .enumerate()
            .map(|(src, &w)| w * norms.get(src).copied().unwrap_or(1.0))
            .collect(),
        None => row.to_vec(),
    }
}
