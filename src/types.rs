//! Wire and data model shared with the inference backend
//!
//! Every shape here mirrors a payload produced (or consumed) by the
//! backend's REST endpoints. The crate derives everything else from
//! these; it never produces them itself.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Raw per-head attention, indexed `[step][layer][head][src_position]`.
///
/// The step axis starts at query position 1 (position 0 is BOS and never
/// attends), so `tensor[p - 1]` holds the rows for query position `p`.
/// Rows are inclusive of the query's own position: the row for query
/// position `p` carries `p + 1` entries. See [`crate::indexing`] for the
/// conversion helpers.
///
/// The layer axis is positional in the *requested* layer list: a request
/// for `layers: [1]` puts that layer at index 0. The head axis is
/// absolute when the request asked for all heads.
pub type AttentionTensor = Vec<Vec<Vec<Vec<f32>>>>;

/// Per-position attention for one model, indexed `[layer][head][src]`
pub type ModelAttention = Vec<Vec<Vec<f32>>>;

/// OV top-k tables, indexed `[src_position][layer][head]` -> ranked logits
pub type OvTable = Vec<Vec<Vec<Vec<OvLogit>>>>;

/// Which served model a request or view targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ModelKey {
    /// Bigram baseline (no attention)
    Bigram,
    /// One-layer transformer
    T1,
    /// Two-layer transformer
    T2,
}

impl ModelKey {
    /// Wire name used in request payloads
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bigram => "bigram",
            Self::T1 => "t1",
            Self::T2 => "t2",
        }
    }
}

impl fmt::Display for ModelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single token as produced by the backend tokenizer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    /// Vocabulary id
    pub id: u32,
    /// Decoded text
    pub text: String,
}

/// A ranked next-token candidate with both logit and probability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopItem {
    /// Decoded token text
    pub token: String,
    /// Vocabulary id
    pub id: u32,
    /// Raw logit (or logit delta, in ablation delta tables)
    pub logit: f32,
    /// Softmax probability
    pub prob: f32,
}

/// One entry of an OV prediction list: a token whose logit is boosted by
/// attending to a source position through a head's output-value circuit.
/// Lists are ordered descending by logit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OvLogit {
    /// Decoded token text
    pub token: String,
    /// Vocabulary id
    pub id: u32,
    /// Logit contribution
    pub logit: f32,
}

/// A ranked candidate carrying only a probability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbItem {
    /// Decoded token text
    pub token: String,
    /// Vocabulary id
    pub id: u32,
    /// Softmax probability
    pub prob: f32,
}

/// One promoted or suppressed token in a head's ablation delta table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaItem {
    /// Decoded token text
    pub token: String,
    /// Vocabulary id
    pub id: u32,
    /// `logit_with - logit_without` for this token
    pub delta: f32,
}

/// Causal effect of one head at one query position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadDelta {
    /// Overall size of the head's effect (L2 norm of the logit delta vector)
    pub magnitude: f32,
    /// Delta on the ground-truth next token
    pub actual_token_delta: f32,
    /// Tokens whose logits rose most with the head active
    pub top_promoted: Vec<DeltaItem>,
    /// Tokens whose logits fell most with the head active
    pub top_suppressed: Vec<DeltaItem>,
}

/// Per-model top-k tables for one position; `None` when a model was not
/// requested or has no data for the slot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelTopk {
    /// Bigram baseline predictions
    #[serde(default)]
    pub bigram: Option<Vec<TopItem>>,
    /// One-layer model predictions
    #[serde(default)]
    pub t1: Option<Vec<TopItem>>,
    /// Two-layer model predictions
    #[serde(default)]
    pub t2: Option<Vec<TopItem>>,
}

/// Attention (or value-weighted attention) for both transformer models
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerModelAttention {
    /// One-layer model, `[layer][head][src]`
    pub t1: ModelAttention,
    /// Two-layer model, `[layer][head][src]`
    pub t2: ModelAttention,
}

impl PerModelAttention {
    /// Attention for the selected model; bigram has none
    pub fn for_model(&self, model: ModelKey) -> Option<&ModelAttention> {
        match model {
            ModelKey::T1 => Some(&self.t1),
            ModelKey::T2 => Some(&self.t2),
            ModelKey::Bigram => None,
        }
    }
}

/// Head-delta tables for both transformer models, keyed `L{layer}H{head}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerModelHeadDeltas {
    /// One-layer model deltas
    pub t1: HashMap<String, HeadDelta>,
    /// Two-layer model deltas
    pub t2: HashMap<String, HeadDelta>,
}

impl PerModelHeadDeltas {
    /// Delta table for the selected model; bigram has no heads
    pub fn for_model(&self, model: ModelKey) -> Option<&HashMap<String, HeadDelta>> {
        match model {
            ModelKey::T1 => Some(&self.t1),
            ModelKey::T2 => Some(&self.t2),
            ModelKey::Bigram => None,
        }
    }
}

/// Per-model loss at one position
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelLosses {
    /// Bigram loss
    #[serde(default)]
    pub bigram: Option<f32>,
    /// One-layer model loss
    #[serde(default)]
    pub t1: Option<f32>,
    /// Two-layer model loss
    #[serde(default)]
    pub t2: Option<f32>,
}

/// Attention weight each model puts on a matched earlier occurrence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchAttention {
    /// One-layer model weight
    pub t1: f32,
    /// Two-layer model weight
    pub t2: f32,
}

/// Everything the backend knows about one query position
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionInfo {
    /// Query position (1-based over the attention steps)
    pub t: usize,
    /// Token at the query position
    pub context_token: TokenInfo,
    /// Ground-truth next token
    pub next_token: TokenInfo,
    /// Per-model top-k predictions
    pub topk: ModelTopk,
    /// Raw attention, `[layer][head][src]` per model
    pub attn: PerModelAttention,
    /// Value-weighted attention, same shape as `attn`
    pub value_weighted_attn: PerModelAttention,
    /// Per-head ablation deltas, keyed `L{layer}H{head}`
    pub head_deltas: PerModelHeadDeltas,
    /// Per-model loss on the next token
    pub losses: ModelLosses,
    /// Whether the bigram table covers the context token
    pub bigram_available: bool,
    /// Most recent earlier occurrence of the context token, if any
    #[serde(default)]
    pub match_index: Option<usize>,
    /// Attention each model puts on that occurrence
    #[serde(default)]
    pub match_attention: Option<MatchAttention>,
    /// Whether this position sits inside a skip-trigram pattern
    #[serde(default)]
    pub skip_trigram: bool,
}

/// Response of `/api/analyze`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResponse {
    /// Tokenized input (position 0 is BOS)
    pub tokens: Vec<TokenInfo>,
    /// One entry per query position `1..n`
    pub positions: Vec<PositionInfo>,
    /// Device the backend ran on
    pub device: String,
    /// Layer count of the one-layer model
    pub t1_layers: usize,
    /// Head count of the one-layer model
    pub t1_heads: usize,
    /// Layer count of the two-layer model
    pub t2_layers: usize,
    /// Head count of the two-layer model
    pub t2_heads: usize,
}

impl AnalysisResponse {
    /// Position info for query position `p` (positions start at 1)
    pub fn position(&self, p: usize) -> Option<&PositionInfo> {
        p.checked_sub(1).and_then(|i| self.positions.get(i))
    }

    /// (n_layers, n_heads) for the selected model; bigram has neither
    pub fn model_dims(&self, model: ModelKey) -> Option<(usize, usize)> {
        match model {
            ModelKey::T1 => Some((self.t1_layers, self.t1_heads)),
            ModelKey::T2 => Some((self.t2_layers, self.t2_heads)),
            ModelKey::Bigram => None,
        }
    }
}

/// Request body for `/api/analyze`
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeRequest {
    /// Input text
    pub text: String,
    /// Top-k size for prediction tables
    pub top_k: usize,
    /// Whether to run the per-head ablation passes (expensive)
    pub compute_ablations: bool,
}

/// Request body for `/api/attention-patterns`
#[derive(Debug, Clone, Serialize)]
pub struct AttentionPatternsRequest {
    /// Input text
    pub text: String,
    /// Target model (`t1` or `t2`)
    pub model_name: String,
    /// Layers to extract; `None` means all
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layers: Option<Vec<usize>>,
    /// Heads to extract; `None` means all
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heads: Option<Vec<usize>>,
    /// Whether to compute OV top-k tables
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compute_ov: Option<bool>,
    /// Whether OV tables carry probabilities instead of raw logit boosts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalize_ov: Option<bool>,
}

/// Response of `/api/attention-patterns`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttentionPatternsResponse {
    /// Tokenized input
    pub tokens: Vec<TokenInfo>,
    /// Raw attention, `[step][layer][head][src]`
    pub attention: AttentionTensor,
    /// Model the patterns came from
    pub model_name: String,
    /// Layer count of that model
    pub n_layers: usize,
    /// Head count of that model
    pub n_heads: usize,
    /// OV top-k tables, `[src][layer][head]`
    #[serde(default)]
    pub ov_predictions: Option<OvTable>,
    /// Full next-token predictions per position
    #[serde(default)]
    pub full_predictions: Option<Vec<Vec<ProbItem>>>,
    /// Same, normalized to logit form
    #[serde(default)]
    pub full_predictions_normalized: Option<Vec<Vec<OvLogit>>>,
}

impl AttentionPatternsResponse {
    /// Ragged attention row for one (step, layer, head) triple.
    ///
    /// `layer` indexes into the requested layer list, not the model.
    pub fn head_row(&self, step: usize, layer: usize, head: usize) -> Option<&[f32]> {
        self.attention
            .get(step)?
            .get(layer)?
            .get(head)
            .map(Vec::as_slice)
    }

    /// OV prediction lists for one (layer, head), indexed by source position.
    ///
    /// Positions the table does not cover yield empty slices.
    pub fn head_ov(&self, layer: usize, head: usize) -> Vec<&[OvLogit]> {
        let Some(table) = &self.ov_predictions else {
            return Vec::new();
        };
        table
            .iter()
            .map(|src| {
                src.get(layer)
                    .and_then(|l| l.get(head))
                    .map_or(&[][..], Vec::as_slice)
            })
            .collect()
    }
}

/// Request body for `/api/ablate-head`
#[derive(Debug, Clone, Serialize)]
pub struct AblateHeadRequest {
    /// Input text
    pub text: String,
    /// Query position to ablate at
    pub position: usize,
    /// Target model
    pub model_name: String,
    /// Layer of the head
    pub layer: usize,
    /// Head index
    pub head: usize,
    /// Top-k size for the four result tables
    pub k: usize,
}

/// Response of `/api/ablate-head`: top-k tables for the active and
/// ablated passes plus the signed delta rankings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AblationResult {
    /// Top-k by probability, head active
    pub with_head: Vec<TopItem>,
    /// Top-k by probability, head zeroed
    pub without_head: Vec<TopItem>,
    /// Top-k by `logit_with - logit_without`, descending
    pub delta_positive: Vec<TopItem>,
    /// Top-k by `logit_with - logit_without`, ascending
    pub delta_negative: Vec<TopItem>,
}

/// Request body for `/api/composition-scores`
#[derive(Debug, Clone, Serialize)]
pub struct CompositionRequest {
    /// Target model (must have at least 2 layers)
    pub model_name: String,
}

/// Q/K/V composition strengths, each `[layer1_head][layer0_head]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionScores {
    /// How strongly each L1 query reads from each L0 output
    pub q_composition: Vec<Vec<f32>>,
    /// How strongly each L1 key reads from each L0 output
    pub k_composition: Vec<Vec<f32>>,
    /// How strongly each L1 value reads from each L0 output
    pub v_composition: Vec<Vec<f32>>,
}

/// Request body for `/api/bigram-topk` and `/api/bigram-batch`
#[derive(Debug, Clone, Serialize)]
pub struct BigramRequest {
    /// Input text
    pub text: String,
    /// Top-k size
    pub k: usize,
}

/// One bigram continuation candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BigramPrediction {
    /// Decoded token text
    pub token: String,
    /// Bigram probability
    pub prob: f32,
    /// Raw count-based logit when the backend provides one
    #[serde(default)]
    pub logit: Option<f32>,
}

/// Response of `/api/bigram-topk`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BigramTopkResponse {
    /// Continuations for the last token
    pub predictions: Vec<BigramPrediction>,
}

/// Response of `/api/bigram-batch`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BigramBatchResponse {
    /// Tokenized input
    pub tokens: Vec<TokenInfo>,
    /// Continuations per position
    pub predictions: Vec<Vec<BigramPrediction>>,
}

/// Request body for `/api/attention-topk`
#[derive(Debug, Clone, Serialize)]
pub struct AttentionTopkRequest {
    /// Input text
    pub text: String,
    /// Target model
    pub model_name: String,
    /// Query position
    pub position: usize,
    /// Top-k size
    pub k: usize,
}

/// Response of `/api/attention-topk`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttentionTopkResponse {
    /// Ranked next-token predictions at the query position
    pub predictions: Vec<OvLogit>,
}
