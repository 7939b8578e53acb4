// Pedantic clippy configuration for numerical/analysis code:
#![allow(clippy::cast_precision_loss)] // usize→f32 intentional in score math
#![allow(clippy::cast_possible_truncation)] // vocab index→u32 token ids
#![allow(clippy::many_single_char_names)] // p, j, k standard in matrix code
#![allow(clippy::similar_names)] // related variables like `head`/`heads`
#![allow(clippy::module_name_repetitions)] // AffinityMatrix in affinity.rs is fine
#![allow(clippy::doc_markdown)] // backticks for every technical term is excessive
#![allow(clippy::missing_errors_doc)] // # Errors section for every Result fn
#![allow(clippy::must_use_candidate)] // #[must_use] on every pure fn is excessive
#![allow(clippy::return_self_not_must_use)] // #[must_use] on Self returns

//! clens-rs: Circuit Lens
//!
//! Derives the attention-circuit artifacts an induction-head explainer
//! renders from the payloads of a served small-transformer backend:
//! affinity matrices, value-weighted attention, Q/K/V head-composition
//! scores, head-ablation deltas, and copy/induction pattern verdicts.
//! The backend runs the models; this crate never does.
//!
//! ## Architecture
//!
//! - `types`: wire/data model shared with the backend endpoints
//! - `error`: typed error taxonomy for derivation and transport
//! - `indexing`: attention-step ↔ token-position conversions
//! - `affinity`: dense causal affinity matrix construction
//! - `value_weighted`: attention × value-norm information-flow signal
//! - `composition`: weight-only Q/K/V head-composition scoring
//! - `ablation`: with/without-head delta tables and summaries
//! - `pattern`: copy and induction detection per query position
//! - `highlight`: view state and token-strip intensity scoring
//! - `session`: per-text caches and stale-response generations
//! - `client`: blocking REST client for the inference backend
//! - `synthetic`: seeded softmax-shaped data for offline runs
//! - `analysis`: end-to-end runner used by the CLI

pub mod ablation;
pub mod affinity;
pub mod analysis;
pub mod client;
pub mod composition;
pub mod error;
pub mod highlight;
pub mod indexing;
pub mod pattern;
pub mod session;
pub mod synthetic;
pub mod types;
pub mod value_weighted;

pub use ablation::{compute_ablation, compute_head_delta, validate_ablation, AblationPasses};
pub use affinity::AffinityMatrix;
pub use analysis::{AnalysisConfig, AnalysisReport, AnalysisRunner, PositionReport};
pub use client::{BackendClient, DEFAULT_BACKEND_URL};
pub use composition::{composition_scores, HeadProjections, LayerWeights, ModelWeights};
pub use error::{CircuitError, Result};
pub use highlight::{
    head_key, strip_intensities, token_score, HighlightData, HighlightMode, ViewState,
};
pub use indexing::{causal_len, position_for_step, step_index_for};
pub use pattern::{detect_pattern, previous_occurrence, PatternVerdict};
pub use session::{AblationKey, AnalysisSession, GenerationCounter};
pub use synthetic::{synthetic_affinity, synthetic_attention};
pub use types::{
    AblationResult, AnalysisResponse, AttentionPatternsRequest, AttentionPatternsResponse,
    AttentionTensor, CompositionScores, HeadDelta, ModelKey, OvLogit, PositionInfo, TokenInfo,
    TopItem,
};
pub use value_weighted::{derive_value_weighted, ValueNorms};
