//! Induction and previous-token pattern detection
//!
//! Answers, for one query position of one head: which source does it
//! attend to most, is the head copying that token, and is it doing
//! induction (predicting what followed an earlier occurrence of the
//! current token)?

use crate::affinity::AffinityMatrix;
use crate::types::{OvLogit, TokenInfo};

/// Verdict for one (head, query position) pair.
///
/// Pure data; safe to recompute on every hover event.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternVerdict {
    /// Source position with the highest attention weight
    pub attended_position: usize,
    /// That weight
    pub attention_weight: f32,
    /// The attended position's OV top-1 matches the attended token
    pub is_copying: bool,
    /// The attended position's OV top-1 matches the token that followed
    /// the previous occurrence of the query token
    pub is_induction: bool,
}

impl PatternVerdict {
    fn none() -> Self {
        Self {
            attended_position: 0,
            attention_weight: 0.0,
            is_copying: false,
            is_induction: false,
        }
    }
}

/// Most recent earlier occurrence of the query token's text.
///
/// Scans positions `0..query_position`, nearest first. Mirrors the
/// backend's `match_index` field so the two stay comparable.
pub fn previous_occurrence(tokens: &[TokenInfo], query_position: usize) -> Option<usize> {
    let query = tokens.get(query_position)?;
    (0..query_position)
        .rev()
        .find(|&i| tokens[i].text == query.text)
}

/// Detect copying and induction behavior at one query position.
///
/// `ov_predictions` holds the head's OV top-k list per source position
/// (see [`crate::types::AttentionPatternsResponse::head_ov`]); entries
/// the table does not cover read as empty and simply produce negative
/// verdicts. Tie-break on the attention argmax: lowest index wins.
///
/// A query token with no earlier occurrence is not an error; induction
/// is just not detected.
pub fn detect_pattern(
    affinity: &AffinityMatrix,
    ov_predictions: &[&[OvLogit]],
    query_position: usize,
    tokens: &[TokenInfo],
) -> PatternVerdict {
    let Some((attended_position, attention_weight)) = affinity.argmax_attended(query_position)
    else {
        return PatternVerdict::none();
    };

    let ov_top = ov_predictions
        .get(attended_position)
        .and_then(|list| list.first());

    let is_copying = match (ov_top, tokens.get(attended_position)) {
        (Some(top), Some(attended)) => top.token == attended.text,
        _ => false,
    };

    let is_induction = match (ov_top, previous_occurrence(tokens, query_position)) {
        (Some(top), Some(matched)) => tokens
            .get(matched + 1)
            .is_some_and(|next| top.token == next.text),
        _ => false,
    };

    PatternVerdict {
        attended_position,
        attention_weight,
        is_copying,
        is_induction,
    }
}
