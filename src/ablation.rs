//! Head-ablation delta computation
//!
//! The backend runs the two forward passes (head active, head zeroed at
//! one query position); this module is the consumer side. Given the two
//! logit vectors it ranks what the head promotes and suppresses, and
//! reduces the pair to the [`HeadDelta`] summary the token strip reads.

use crate::error::{CircuitError, Result};
use crate::indexing::{validate_head, validate_query_position};
use crate::types::{AblationResult, DeltaItem, HeadDelta, TopItem};

/// The two logit vectors an ablation pass produces, plus the vocabulary
/// for decoding ids.
#[derive(Debug, Clone)]
pub struct AblationPasses<'a> {
    /// Logits over the vocabulary with the head active
    pub with_logits: &'a [f32],
    /// Logits with the head's output contribution zeroed
    pub without_logits: &'a [f32],
    /// Decoded token text per vocabulary id
    pub vocab: &'a [String],
}

impl AblationPasses<'_> {
    fn check_shapes(&self) -> Result<()> {
        if self.with_logits.len() != self.without_logits.len()
            || self.with_logits.len() != self.vocab.len()
        {
            return Err(CircuitError::ShapeMismatch(format!(
                "with={} without={} vocab={}",
                self.with_logits.len(),
                self.without_logits.len(),
                self.vocab.len()
            )));
        }
        Ok(())
    }

    fn deltas(&self) -> Vec<f32> {
        self.with_logits
            .iter()
            .zip(self.without_logits.iter())
            .map(|(w, wo)| w - wo)
            .collect()
    }
}

/// Validate an ablation request against the input and model dimensions.
///
/// Position 0 carries no attention to ablate, so valid positions are
/// `1..=n_tokens - 1`; layer and head must sit inside the model's
/// configured dimensions.
pub fn validate_ablation(
    position: usize,
    n_tokens: usize,
    layer: usize,
    head: usize,
    n_layers: usize,
    n_heads: usize,
) -> Result<()> {
    validate_query_position(position, n_tokens)?;
    validate_head(layer, head, n_layers, n_heads)
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

fn top_by_prob(logits: &[f32], probs: &[f32], vocab: &[String], k: usize) -> Vec<TopItem> {
    let mut ids: Vec<usize> = (0..probs.len()).collect();
    ids.sort_by(|&a, &b| probs[b].total_cmp(&probs[a]).then(a.cmp(&b)));
    ids.truncate(k);
    ids.into_iter()
        .map(|id| TopItem {
            token: vocab[id].clone(),
            id: id as u32,
            logit: logits[id],
            prob: probs[id],
        })
        .collect()
}

/// Derive the four ablation tables from a pass pair.
///
/// `with_head` / `without_head` rank by probability within each pass;
/// `delta_positive` / `delta_negative` rank by `logit_with -
/// logit_without` descending and ascending. In the delta tables the
/// `logit` field carries the delta itself and `prob` the active-pass
/// probability. Deterministic for a fixed pass pair.
pub fn compute_ablation(passes: &AblationPasses<'_>, top_k: usize) -> Result<AblationResult> {
    passes.check_shapes()?;

    let with_probs = softmax(passes.with_logits);
    let without_probs = softmax(passes.without_logits);
    let deltas = passes.deltas();

    let mut by_delta: Vec<usize> = (0..deltas.len()).collect();
    by_delta.sort_by(|&a, &b| deltas[b].total_cmp(&deltas[a]).then(a.cmp(&b)));

    let delta_item = |id: usize| TopItem {
        token: passes.vocab[id].clone(),
        id: id as u32,
        logit: deltas[id],
        prob: with_probs[id],
    };
    let delta_positive: Vec<TopItem> = by_delta.iter().take(top_k).map(|&id| delta_item(id)).collect();
    let delta_negative: Vec<TopItem> = by_delta
        .iter()
        .rev()
        .take(top_k)
        .map(|&id| delta_item(id))
        .collect();

    Ok(AblationResult {
        with_head: top_by_prob(passes.with_logits, &with_probs, passes.vocab, top_k),
        without_head: top_by_prob(passes.without_logits, &without_probs, passes.vocab, top_k),
        delta_positive,
        delta_negative,
    })
}

/// Reduce a pass pair to the per-head summary shown on the token strip.
///
/// `magnitude` is the L2 norm of the full logit-delta vector;
/// `actual_token_delta` the delta on the ground-truth next token. The
/// promoted list only ever contains strictly positive deltas and the
/// suppressed list strictly negative ones, so a weak head yields short
/// (possibly empty) lists rather than sign-crossing entries.
pub fn compute_head_delta(
    passes: &AblationPasses<'_>,
    actual_token_id: u32,
    top_k: usize,
) -> Result<HeadDelta> {
    passes.check_shapes()?;
    let deltas = passes.deltas();

    let actual = actual_token_id as usize;
    if actual >= deltas.len() {
        return Err(CircuitError::OutOfRange {
            index: actual,
            len: deltas.len(),
        });
    }

    let magnitude = deltas.iter().map(|d| d * d).sum::<f32>().sqrt();

    let mut by_delta: Vec<usize> = (0..deltas.len()).collect();
    by_delta.sort_by(|&a, &b| deltas[b].total_cmp(&deltas[a]).then(a.cmp(&b)));

    let item = |id: usize| DeltaItem {
        token: passes.vocab[id].clone(),
        id: id as u32,
        delta: deltas[id],
    };
    let top_promoted: Vec<DeltaItem> = by_delta
        .iter()
        .take_while(|&&id| deltas[id] > 0.0)
        .take(top_k)
        .map(|&id| item(id))
        .collect();
    let top_suppressed: Vec<DeltaItem> = by_delta
        .iter()
        .rev()
        .take_while(|&&id| deltas[id] < 0.0)
        .take(top_k)
        .map(|&id| item(id))
        .collect();

    Ok(HeadDelta {
        magnitude,
        actual_token_delta: deltas[actual],
        top_promoted,
        top_suppressed,
    })
}
