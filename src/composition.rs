//! Head-composition scoring
//!
//! Measures how strongly each layer-1 head reads from each layer-0
//! head's output, purely from trained weights. Input text never enters
//! the computation, so scores are computed once per model and cached for
//! the life of the session.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{CircuitError, Result};
use crate::types::CompositionScores;

/// Projection matrices for one attention head.
///
/// `w_q`, `w_k`, `w_v` map the residual stream into head space
/// (`d_head × d_model`); `w_o` maps head space back out
/// (`d_model × d_head`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeadProjections {
    /// Query projection
    pub w_q: Array2<f32>,
    /// Key projection
    pub w_k: Array2<f32>,
    /// Value projection
    pub w_v: Array2<f32>,
    /// Output projection
    pub w_o: Array2<f32>,
}

impl HeadProjections {
    /// The head's OV operator `W_O · W_V` (`d_model × d_model`): what the
    /// head writes into the residual stream per unit of attention.
    pub fn ov(&self) -> Result<Array2<f32>> {
        if self.w_o.ncols() != self.w_v.nrows() {
            return Err(CircuitError::ShapeMismatch(format!(
                "w_o is {:?} but w_v is {:?}",
                self.w_o.dim(),
                self.w_v.dim()
            )));
        }
        Ok(self.w_o.dot(&self.w_v))
    }
}

/// All head projections for one layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerWeights {
    /// Per-head projections
    pub heads: Vec<HeadProjections>,
}

/// Frozen attention weights for a served model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelWeights {
    /// Model name as reported by the backend
    pub name: String,
    /// Layers in order; composition reads layers 0 and 1
    pub layers: Vec<LayerWeights>,
}

impl ModelWeights {
    /// Load weights from a JSON file
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Head count of a layer (0 when the layer is absent)
    pub fn n_heads(&self, layer: usize) -> usize {
        self.layers.get(layer).map_or(0, |l| l.heads.len())
    }
}

/// Frobenius norm of a matrix
fn frobenius(m: &Array2<f32>) -> f32 {
    m.iter().map(|v| v * v).sum::<f32>().sqrt()
}

/// Magnitude of `w` composed through `ov`, relative to `w` alone.
///
/// Zero-norm projections score 0 rather than dividing by zero.
fn composition_ratio(w: &Array2<f32>, ov: &Array2<f32>) -> Result<f32> {
    if w.ncols() != ov.nrows() {
        return Err(CircuitError::ShapeMismatch(format!(
            "projection is {:?} but OV operator is {:?}",
            w.dim(),
            ov.dim()
        )));
    }
    let baseline = frobenius(w);
    if baseline == 0.0 {
        return Ok(0.0);
    }
    Ok(frobenius(&w.dot(ov)) / baseline)
}

/// Compute Q/K/V composition strength for every (layer-1 head,
/// layer-0 head) pair.
///
/// Each score is `‖W_x¹ · W_OV⁰‖_F / ‖W_x¹‖_F` for
/// `x ∈ {Q, K, V}`: how much of the layer-1 projection's operation runs
/// through what the layer-0 head wrote. Scores are **unsigned** (norm
/// ratios, always ≥ 0) and comparable across head pairs; typical values
/// for trained toy models sit in `0..~0.1`.
///
/// Output matrices are fully populated, `[layer1_head][layer0_head]`.
/// Deterministic: the same frozen weights always yield identical scores.
///
/// Fails with [`CircuitError::UnsupportedModel`] when the model has
/// fewer than two layers — composition is meaningless for a one-layer
/// model, and UI callers are expected to check the layer count first.
pub fn composition_scores(model: &ModelWeights) -> Result<CompositionScores> {
    if model.layers.len() < 2 {
        return Err(CircuitError::UnsupportedModel {
            model: model.name.clone(),
            n_layers: model.layers.len(),
        });
    }
    let layer0 = &model.layers[0];
    let layer1 = &model.layers[1];

    let ov0: Vec<Array2<f32>> = layer0
        .heads
        .iter()
        .map(HeadProjections::ov)
        .collect::<Result<_>>()?;

    let mut q = Vec::with_capacity(layer1.heads.len());
    let mut k = Vec::with_capacity(layer1.heads.len());
    let mut v = Vec::with_capacity(layer1.heads.len());
    for h1 in &layer1.heads {
        let mut q_row = Vec::with_capacity(ov0.len());
        let mut k_row = Vec::with_capacity(ov0.len());
        let mut v_row = Vec::with_capacity(ov0.len());
        for ov in &ov0 {
            q_row.push(composition_ratio(&h1.w_q, ov)?);
            k_row.push(composition_ratio(&h1.w_k, ov)?);
            v_row.push(composition_ratio(&h1.w_v, ov)?);
        }
        q.push(q_row);
        k.push(k_row);
        v.push(v_row);
    }

    Ok(CompositionScores {
        q_composition: q,
        k_composition: k,
        v_composition: v,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn head(scale: f32) -> HeadProjections {
        // d_model = 2, d_head = 1
        HeadProjections {
            w_q: array![[scale, 0.0]],
            w_k: array![[0.0, scale]],
            w_v: array![[scale, scale]],
            w_o: array![[scale], [0.0]],
        }
    }

    fn two_layer_model() -> ModelWeights {
        ModelWeights {
            name: "t2".to_string(),
            layers: vec![
                LayerWeights {
                    heads: vec![head(1.0), head(2.0)],
                },
                LayerWeights {
                    heads: vec![head(1.0)],
                },
            ],
        }
    }

    #[test]
    fn test_one_layer_model_unsupported() {
        let model = ModelWeights {
            name: "t1".to_string(),
            layers: vec![LayerWeights { heads: vec![head(1.0)] }],
        };
        assert!(matches!(
            composition_scores(&model),
            Err(CircuitError::UnsupportedModel { n_layers: 1, .. })
        ));
    }

    #[test]
    fn test_fully_populated_and_unsigned() {
        let scores = composition_scores(&two_layer_model()).unwrap();
        assert_eq!(scores.q_composition.len(), 1);
        assert_eq!(scores.q_composition[0].len(), 2);
        for matrix in [
            &scores.q_composition,
            &scores.k_composition,
            &scores.v_composition,
        ] {
            for row in matrix {
                for &score in row {
                    assert!(score >= 0.0);
                }
            }
        }
    }

    #[test]
    fn test_hand_computed_k_composition() {
        // ov for head(1.0): w_o [[1],[0]] · w_v [[1,1]] = [[1,1],[0,0]]
        // w_k of l1 head: [[0,1]]; w_k·ov = [[0,0]]; ratio 0/1 = 0
        let scores = composition_scores(&two_layer_model()).unwrap();
        assert!((scores.k_composition[0][0] - 0.0).abs() < 1e-6);

        // w_q [[1,0]] · ov = [[1,1]], ‖·‖=√2, baseline 1 → √2
        assert!((scores.q_composition[0][0] - 2f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn test_deterministic() {
        let model = two_layer_model();
        let a = composition_scores(&model).unwrap();
        let b = composition_scores(&model).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_asymmetric_by_construction() {
        // K and Q composition need not agree for the same pair
        let scores = composition_scores(&two_layer_model()).unwrap();
        assert_ne!(scores.q_composition[0][0], scores.k_composition[0][0]);
    }

    #[test]
    fn test_shape_mismatch_detected() {
        let mut model = two_layer_model();
        model.layers[1].heads[0].w_q = array![[1.0, 0.0, 0.0]];
        assert!(matches!(
            composition_scores(&model),
            Err(CircuitError::ShapeMismatch(_))
        ));
    }
}
