//! Analysis orchestration
//!
//! Drives the backend for one input text and one selected head, builds
//! the derived artifacts, and runs the pattern detector at every query
//! position. The CLI and integration flows both go through here.

use anyhow::Result;
use tracing::{info, warn};

use crate::affinity::AffinityMatrix;
use crate::client::{BackendClient, DEFAULT_BACKEND_URL};
use crate::pattern::{detect_pattern, PatternVerdict};
use crate::types::{AttentionPatternsRequest, ModelKey, TokenInfo};

/// Configuration for one analysis run
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Backend base URL
    pub backend_url: String,
    /// Model to inspect
    pub model: ModelKey,
    /// Layer of the inspected head
    pub layer: usize,
    /// Head index
    pub head: usize,
    /// Whether to request OV tables (needed for pattern verdicts)
    pub compute_ov: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            model: ModelKey::T2,
            layer: 1,
            head: 0,
            compute_ov: true,
        }
    }
}

/// Pattern verdict for one query position
#[derive(Debug, Clone)]
pub struct PositionReport {
    /// Query position
    pub position: usize,
    /// Token at that position
    pub token: TokenInfo,
    /// Detector verdict for the selected head
    pub verdict: PatternVerdict,
}

/// Everything derived for one (text, model, layer, head) selection
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    /// Tokenized input
    pub tokens: Vec<TokenInfo>,
    /// Dense affinity matrix for the selected head
    pub affinity: AffinityMatrix,
    /// One verdict per query position `1..n`
    pub positions: Vec<PositionReport>,
}

impl AnalysisReport {
    /// Positions where the head behaved like an induction head
    pub fn induction_positions(&self) -> Vec<usize> {
        self.positions
            .iter()
            .filter(|p| p.verdict.is_induction)
            .map(|p| p.position)
            .collect()
    }

    /// Positions where the head copied the attended token
    pub fn copying_positions(&self) -> Vec<usize> {
        self.positions
            .iter()
            .filter(|p| p.verdict.is_copying)
            .map(|p| p.position)
            .collect()
    }

    /// Print one line per query position
    pub fn print_summary(&self) {
        println!("\n=== Pattern verdicts ===");
        for report in &self.positions {
            let flags = match (report.verdict.is_induction, report.verdict.is_copying) {
                (true, true) => " [induction, copying]",
                (true, false) => " [induction]",
                (false, true) => " [copying]",
                (false, false) => "",
            };
            let attended = self
                .tokens
                .get(report.verdict.attended_position)
                .map_or("?", |t| t.text.as_str());
            println!(
                "  pos {:2} {:>12} -> {:>12} ({:.3}){}",
                report.position,
                format!("\"{}\"", report.token.text.replace('\n', "\\n")),
                format!("\"{}\"", attended.replace('\n', "\\n")),
                report.verdict.attention_weight,
                flags
            );
        }
        println!(
            "\n{} induction, {} copying of {} positions",
            self.induction_positions().len(),
            self.copying_positions().len(),
            self.positions.len()
        );
    }
}

/// Runs analyses against one backend
pub struct AnalysisRunner {
    client: BackendClient,
    config: AnalysisConfig,
}

impl AnalysisRunner {
    /// Create a runner for the configured backend
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        let client = BackendClient::new(config.backend_url.clone())?;
        Ok(Self { client, config })
    }

    /// Borrow the underlying client
    pub fn client(&self) -> &BackendClient {
        &self.client
    }

    /// Fetch patterns for a text and derive the report for the selected
    /// head.
    pub fn run(&self, text: &str) -> Result<AnalysisReport> {
        info!(
            model = %self.config.model,
            layer = self.config.layer,
            head = self.config.head,
            "fetching attention patterns"
        );

        // Requesting a single layer; the tensor's layer axis then holds
        // it at index 0 while the head axis stays absolute.
        let request = AttentionPatternsRequest {
            text: text.to_string(),
            model_name: self.config.model.as_str().to_string(),
            layers: Some(vec![self.config.layer]),
            heads: None,
            compute_ov: Some(self.config.compute_ov),
            normalize_ov: Some(false),
        };
        let response = self.client.attention_patterns(&request)?;
        info!(
            n_tokens = response.tokens.len(),
            n_layers = response.n_layers,
            n_heads = response.n_heads,
            "patterns received"
        );
        if self.config.head >= response.n_heads {
            warn!(
                head = self.config.head,
                n_heads = response.n_heads,
                "head beyond model dimensions; affinity falls back to identity"
            );
        }

        let n_tokens = response.tokens.len();
        let affinity =
            AffinityMatrix::from_attention(Some(&response.attention), 0, self.config.head, n_tokens);
        let ov_lists = response.head_ov(0, self.config.head);

        let positions = (1..n_tokens)
            .map(|position| PositionReport {
                position,
                token: response.tokens[position].clone(),
                verdict: detect_pattern(&affinity, &ov_lists, position, &response.tokens),
            })
            .collect();

        Ok(AnalysisReport {
            tokens: response.tokens,
            affinity,
            positions,
        })
    }
}
