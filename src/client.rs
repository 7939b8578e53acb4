//! REST client for the inference backend
//!
//! The backend owns the models and runs every forward pass; this client
//! only moves the payloads defined in [`crate::types`]. No retries —
//! transport failures surface to the caller, and staleness is handled
//! above this layer with a [`crate::session::GenerationCounter`].

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::{CircuitError, Result};
use crate::types::{
    AblateHeadRequest, AblationResult, AnalysisResponse, AnalyzeRequest,
    AttentionPatternsRequest, AttentionPatternsResponse, AttentionTopkRequest,
    AttentionTopkResponse, BigramBatchResponse, BigramRequest, BigramTopkResponse,
    CompositionRequest, CompositionScores,
};

/// Default backend address for local development
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";

/// Blocking client for the explainer backend
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::blocking::Client,
    base_url: String,
}

impl BackendClient {
    /// Connect to a backend at the given base URL
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Ok(Self { http, base_url })
    }

    /// The backend base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn post<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        endpoint: &str,
        request: &Req,
    ) -> Result<Resp> {
        let url = format!("{}{endpoint}", self.base_url);
        debug!(endpoint, "POST");
        let response = self
            .http
            .post(&url)
            .json(request)
            .send()?
            .error_for_status()?;
        let body = response.text()?;
        serde_json::from_str(&body).map_err(|err| CircuitError::MalformedResponse {
            endpoint: endpoint.to_string(),
            detail: err.to_string(),
        })
    }

    /// Full per-position analysis of a text (`/api/analyze`)
    pub fn analyze(&self, request: &AnalyzeRequest) -> Result<AnalysisResponse> {
        self.post("/api/analyze", request)
    }

    /// Raw attention tensors and OV tables (`/api/attention-patterns`)
    pub fn attention_patterns(
        &self,
        request: &AttentionPatternsRequest,
    ) -> Result<AttentionPatternsResponse> {
        self.post("/api/attention-patterns", request)
    }

    /// With/without tables for one ablated head (`/api/ablate-head`)
    pub fn ablate_head(&self, request: &AblateHeadRequest) -> Result<AblationResult> {
        self.post("/api/ablate-head", request)
    }

    /// Weight-only composition scores (`/api/composition-scores`)
    pub fn composition_scores(&self, request: &CompositionRequest) -> Result<CompositionScores> {
        self.post("/api/composition-scores", request)
    }

    /// Bigram continuations for the last token (`/api/bigram-topk`)
    pub fn bigram_topk(&self, request: &BigramRequest) -> Result<BigramTopkResponse> {
        self.post("/api/bigram-topk", request)
    }

    /// Bigram continuations for every position (`/api/bigram-batch`)
    pub fn bigram_batch(&self, request: &BigramRequest) -> Result<BigramBatchResponse> {
        self.post("/api/bigram-batch", request)
    }

    /// Model top-k at one position (`/api/attention-topk`)
    pub fn attention_topk(&self, request: &AttentionTopkRequest) -> Result<AttentionTopkResponse> {
        self.post("/api/attention-topk", request)
    }
}
