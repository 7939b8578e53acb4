//! Token-strip highlight scoring
//!
//! Reduces whichever derived structure the view is showing — raw
//! attention, value-weighted attention, or ablation deltas — to one
//! scalar per token, then normalizes the strip for rendering.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{HeadDelta, ModelKey, PerModelAttention, PerModelHeadDeltas};

/// Which derived signal drives the token-strip colors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum HighlightMode {
    /// Raw softmax attention weight
    #[default]
    Attention,
    /// Attention scaled by value-vector norm
    ValueWeighted,
    /// Signed per-token ablation delta
    Delta,
}

impl fmt::Display for HighlightMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Attention => "attention",
            Self::ValueWeighted => "value-weighted",
            Self::Delta => "delta",
        })
    }
}

/// The single explicit view-state struct every derivation call reads.
///
/// Hover/lock/selection state lives here and only here; derivation
/// functions take it by reference and never store it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewState {
    /// Hovered (or locked-fallback) query position; `None` = no selection
    pub active_position: Option<usize>,
    /// Clicked-to-lock position, kept when the pointer leaves
    pub locked_position: Option<usize>,
    /// Model the view is inspecting
    pub selected_model: ModelKey,
    /// Layer of the inspected head
    pub selected_layer: usize,
    /// Head index
    pub selected_head: usize,
    /// Active highlight signal
    pub highlight_mode: HighlightMode,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            active_position: None,
            locked_position: None,
            selected_model: ModelKey::T2,
            selected_layer: 0,
            selected_head: 0,
            highlight_mode: HighlightMode::Attention,
        }
    }
}

impl ViewState {
    /// Delta-table key for the selected head
    pub fn head_key(&self) -> String {
        head_key(self.selected_layer, self.selected_head)
    }

    /// Position to derive for: the hovered one, else the locked one
    pub fn effective_position(&self) -> Option<usize> {
        self.active_position.or(self.locked_position)
    }
}

/// Delta-table key format shared with the backend (`L1H7` etc.)
pub fn head_key(layer: usize, head: usize) -> String {
    format!("L{layer}H{head}")
}

/// The derived structures for the active position, as the strip sees
/// them. Any of the three may be absent while a fetch is in flight.
#[derive(Debug, Clone, Copy, Default)]
pub struct HighlightData<'a> {
    /// Raw attention per model, `[layer][head][src]`
    pub attention: Option<&'a PerModelAttention>,
    /// Value-weighted attention, same shape
    pub value_weighted: Option<&'a PerModelAttention>,
    /// Per-head delta tables
    pub head_deltas: Option<&'a PerModelHeadDeltas>,
}

/// Score one token of the strip under the current view state.
///
/// Returns 0 when nothing is selected or the active position is the
/// BOS token, when the mode's data has not arrived, or when the
/// selected layer/head is absent from it. Delta mode returns the signed
/// delta (0 when the token sits in neither top list); the other modes
/// return the non-negative weight on this token as a source.
pub fn token_score(
    state: &ViewState,
    data: &HighlightData<'_>,
    token_index: usize,
    token_id: u32,
) -> f32 {
    match state.effective_position() {
        Some(p) if p > 0 => {}
        _ => return 0.0,
    }

    match state.highlight_mode {
        HighlightMode::Attention => attention_score(state, data.attention, token_index),
        HighlightMode::ValueWeighted => attention_score(state, data.value_weighted, token_index),
        HighlightMode::Delta => delta_score(state, data.head_deltas, token_id),
    }
}

fn attention_score(
    state: &ViewState,
    data: Option<&PerModelAttention>,
    token_index: usize,
) -> f32 {
    data.and_then(|d| d.for_model(state.selected_model))
        .and_then(|model| model.get(state.selected_layer))
        .and_then(|layer| layer.get(state.selected_head))
        .and_then(|row| row.get(token_index))
        .copied()
        .unwrap_or(0.0)
}

fn delta_score(state: &ViewState, data: Option<&PerModelHeadDeltas>, token_id: u32) -> f32 {
    let Some(head) = data
        .and_then(|d| d.for_model(state.selected_model))
        .and_then(|model| model.get(&state.head_key()))
    else {
        return 0.0;
    };
    find_delta(head, token_id).unwrap_or(0.0)
}

fn find_delta(head: &HeadDelta, token_id: u32) -> Option<f32> {
    head.top_promoted
        .iter()
        .chain(head.top_suppressed.iter())
        .find(|item| item.id == token_id)
        .map(|item| item.delta)
}

/// Normalized render intensities for the whole strip:
/// `|score| / max|score|`, with a zero max yielding all zeros.
pub fn strip_intensities(
    state: &ViewState,
    data: &HighlightData<'_>,
    token_ids: &[u32],
) -> Vec<f32> {
    let scores: Vec<f32> = token_ids
        .iter()
        .enumerate()
        .map(|(index, &id)| token_score(state, data, index, id))
        .collect();
    let max = scores.iter().map(|s| s.abs()).fold(0.0f32, f32::max);
    if max == 0.0 {
        return vec![0.0; scores.len()];
    }
    scores.into_iter().map(|s| s.abs() / max).collect()
}
