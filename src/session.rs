//! Session-scoped caches and stale-response handling
//!
//! Derivation itself needs no memoization; these caches exist so the
//! expensive collaborator calls (ablation passes, composition scoring)
//! run once per slot. Everything keyed to the input text dies with it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{CircuitError, Result};
use crate::types::{AblationResult, AnalysisResponse, CompositionScores, ModelKey};

/// Monotonic request generation for discarding superseded responses.
///
/// Every outgoing request takes `begin()`; when its response lands,
/// `accept()` rejects it unless it still carries the newest generation.
/// A rejected response must be dropped, never merged.
#[derive(Debug, Default)]
pub struct GenerationCounter {
    current: AtomicU64,
}

impl GenerationCounter {
    /// Start tracking a new request, superseding all earlier ones
    pub fn begin(&self) -> u64 {
        self.current.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Newest generation issued so far
    pub fn current(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }

    /// Check a response's generation against the newest one
    pub fn accept(&self, generation: u64) -> Result<()> {
        let current = self.current();
        if generation < current {
            return Err(CircuitError::Stale {
                response: generation,
                current,
            });
        }
        Ok(())
    }
}

/// Cache key for one ablation slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AblationKey {
    /// Target model
    pub model: ModelKey,
    /// Query position the head was ablated at
    pub position: usize,
    /// Layer of the head
    pub layer: usize,
    /// Head index
    pub head: usize,
}

/// Everything cached for one input text.
///
/// Changing the text invalidates the analysis and every ablation slot.
/// Composition scores survive text changes: they depend only on frozen
/// weights.
#[derive(Debug, Default)]
pub struct AnalysisSession {
    text: String,
    analysis: Option<AnalysisResponse>,
    ablations: HashMap<AblationKey, AblationResult>,
    composition: HashMap<ModelKey, CompositionScores>,
}

impl AnalysisSession {
    /// Start a session for one input text
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// The session's input text
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Switch to a new input text, dropping everything keyed to the old
    /// one. A no-op when the text is unchanged.
    pub fn set_text(&mut self, text: impl Into<String>) {
        let text = text.into();
        if text == self.text {
            return;
        }
        self.text = text;
        self.analysis = None;
        self.ablations.clear();
    }

    /// Cached full analysis, if one has landed
    pub fn analysis(&self) -> Option<&AnalysisResponse> {
        self.analysis.as_ref()
    }

    /// Store the full analysis for the current text
    pub fn store_analysis(&mut self, analysis: AnalysisResponse) {
        self.analysis = Some(analysis);
    }

    /// Cached ablation result for a slot
    pub fn ablation(&self, key: &AblationKey) -> Option<&AblationResult> {
        self.ablations.get(key)
    }

    /// Cache an ablation result
    pub fn store_ablation(&mut self, key: AblationKey, result: AblationResult) {
        self.ablations.insert(key, result);
    }

    /// Number of ablation slots computed this session
    pub fn n_cached_ablations(&self) -> usize {
        self.ablations.len()
    }

    /// Cached composition scores for a model
    pub fn composition(&self, model: ModelKey) -> Option<&CompositionScores> {
        self.composition.get(&model)
    }

    /// Cache composition scores (weights are immutable, so these never
    /// need invalidation)
    pub fn store_composition(&mut self, model: ModelKey, scores: CompositionScores) {
        self.composition.insert(model, scores);
    }
}
