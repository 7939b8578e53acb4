//! Integration tests for clens-rs
//!
//! Exercises the derivation pipeline end-to-end over hand-constructed
//! backend payloads. No network or model is involved; the backend's
//! wire shapes are reproduced as JSON fixtures.

use std::io::Write;

use clens_rs::types::{AttentionPatternsResponse, TokenInfo};
use clens_rs::{
    compute_ablation, compute_head_delta, detect_pattern, strip_intensities, AblationPasses,
    AffinityMatrix, AttentionTensor, HighlightData, HighlightMode, ModelWeights, ViewState,
};
use tempfile::NamedTempFile;

fn tokens(texts: &[&str]) -> Vec<TokenInfo> {
    texts
        .iter()
        .enumerate()
        .map(|(id, text)| TokenInfo {
            id: id as u32,
            text: (*text).to_string(),
        })
        .collect()
}

/// Ragged tensor for a single (layer, head) with the given rows
fn single_head_tensor(rows: &[&[f32]]) -> AttentionTensor {
    rows.iter().map(|row| vec![vec![row.to_vec()]]).collect()
}

/// A bracket-closing head: the `)` token attends back to its `(`
#[test]
fn test_bracket_closer_scenario() {
    let toks = tokens(&["A", "model", "(", "like", "this", "one", ")", "works"]);
    let tensor = single_head_tensor(&[
        &[0.5, 0.5],
        &[0.2, 0.3, 0.5],
        &[0.1, 0.1, 0.6, 0.2],
        &[0.1, 0.1, 0.5, 0.2, 0.1],
        &[0.1, 0.1, 0.4, 0.2, 0.1, 0.1],
        // Row for the `)` at position 6: maximum at the `(` at column 2
        &[0.02, 0.02, 0.88, 0.02, 0.02, 0.02, 0.02],
        &[0.1, 0.1, 0.1, 0.1, 0.1, 0.1, 0.2, 0.2],
    ]);
    let affinity = AffinityMatrix::from_attention(Some(&tensor), 0, 0, toks.len());

    let verdict = detect_pattern(&affinity, &[], 6, &toks);
    assert_eq!(verdict.attended_position, 2);
    assert!((verdict.attention_weight - 0.88).abs() < 1e-6);
}

/// "My name is Regan. My name is" — the second " is" attends to the
/// first one's successor and the OV circuit boosts " Regan"
#[test]
fn test_induction_scenario() {
    let toks = tokens(&[
        "<|BOS|>", "My", " name", " is", " Regan", ".", " My", " name", " is",
    ]);
    // Query position 8 (second " is") puts its mass on position 3,
    // the first " is"; " Regan" follows it at position 4.
    let mut rows: Vec<Vec<f32>> = (1..=8)
        .map(|p| {
            let mut row = vec![0.0; p + 1];
            row[p] = 1.0;
            row
        })
        .collect();
    rows[7] = vec![0.01, 0.01, 0.01, 0.9, 0.02, 0.01, 0.02, 0.01, 0.01];
    let tensor: AttentionTensor = rows.into_iter().map(|r| vec![vec![r]]).collect();
    let affinity = AffinityMatrix::from_attention(Some(&tensor), 0, 0, toks.len());

    let json = serde_json::json!([
        {"token": " Regan", "id": 4, "logit": 4.2},
        {"token": " name", "id": 2, "logit": 0.7}
    ]);
    let boosted: Vec<clens_rs::OvLogit> = serde_json::from_value(json).unwrap();
    let empty: Vec<clens_rs::OvLogit> = Vec::new();
    let ov_lists: Vec<&[clens_rs::OvLogit]> = (0..toks.len())
        .map(|i| {
            if i == 3 {
                boosted.as_slice()
            } else {
                empty.as_slice()
            }
        })
        .collect();

    let verdict = detect_pattern(&affinity, &ov_lists, 8, &toks);
    assert_eq!(verdict.attended_position, 3);
    assert!(verdict.is_induction);
    // The OV boost is " Regan", not the attended " is": no copying
    assert!(!verdict.is_copying);
}

/// Requesting a layer beyond the model's dimensions degrades to the
/// identity matrix instead of failing
#[test]
fn test_missing_data_fallback() {
    let tensor = single_head_tensor(&[&[0.4, 0.6]]);
    let m = AffinityMatrix::from_attention(Some(&tensor), 3, 0, 2);
    for row in 0..2 {
        for col in 0..2 {
            let expected = if row == col { 1.0 } else { 0.0 };
            assert_eq!(m.get(row, col), expected);
        }
    }
}

/// Two equal maxima: the earlier position wins
#[test]
fn test_tie_break_lowest_index() {
    let tensor = single_head_tensor(&[
        &[1.0, 0.0],
        &[0.5, 0.5, 0.0],
        &[0.2, 0.3, 0.3, 0.2],
        &[0.1, 0.2, 0.2, 0.2, 0.3],
        &[0.1, 0.1, 0.3, 0.1, 0.1, 0.3],
    ]);
    let affinity = AffinityMatrix::from_attention(Some(&tensor), 0, 0, 6);
    assert_eq!(affinity.argmax_attended(5), Some((2, 0.3)));
}

/// With no active position every mode scores every token 0
#[test]
fn test_highlight_no_selection() {
    let state = ViewState::default();
    let data = HighlightData::default();
    for mode in [
        HighlightMode::Attention,
        HighlightMode::ValueWeighted,
        HighlightMode::Delta,
    ] {
        let state = ViewState {
            highlight_mode: mode,
            ..state.clone()
        };
        let intensities = strip_intensities(&state, &data, &[0, 1, 2, 3]);
        assert_eq!(intensities, vec![0.0; 4]);
    }
}

/// Promoted deltas are strictly positive and suppressed strictly
/// negative, and both agree with the logit difference
#[test]
fn test_ablation_sign_consistency() {
    let vocab: Vec<String> = (0..12).map(|i| format!("tok{i}")).collect();
    let with_logits: Vec<f32> = (0..12).map(|i| (i as f32 * 0.7).sin() * 3.0).collect();
    let without_logits: Vec<f32> = (0..12).map(|i| (i as f32 * 1.3).cos() * 2.0).collect();
    let passes = AblationPasses {
        with_logits: &with_logits,
        without_logits: &without_logits,
        vocab: &vocab,
    };

    let result = compute_ablation(&passes, 6).unwrap();
    for item in &result.delta_positive {
        let id = item.id as usize;
        assert!((item.logit - (with_logits[id] - without_logits[id])).abs() < 1e-6);
    }
    for pair in result.delta_negative.windows(2) {
        assert!(pair[0].logit <= pair[1].logit);
    }

    let delta = compute_head_delta(&passes, 0, 6).unwrap();
    assert!(delta.top_promoted.iter().all(|i| i.delta > 0.0));
    assert!(delta.top_suppressed.iter().all(|i| i.delta < 0.0));
}

/// Composition scoring is a pure function of frozen weights
#[test]
fn test_composition_determinism_from_file() {
    let weights_json = r#"{
        "name": "t2",
        "layers": [
            {"heads": [{
                "w_q": {"v": 1, "dim": [1, 2], "data": [1.0, 0.0]},
                "w_k": {"v": 1, "dim": [1, 2], "data": [0.0, 1.0]},
                "w_v": {"v": 1, "dim": [1, 2], "data": [0.5, 0.5]},
                "w_o": {"v": 1, "dim": [2, 1], "data": [1.0, 1.0]}
            }]},
            {"heads": [{
                "w_q": {"v": 1, "dim": [1, 2], "data": [0.7, 0.7]},
                "w_k": {"v": 1, "dim": [1, 2], "data": [0.7, -0.7]},
                "w_v": {"v": 1, "dim": [1, 2], "data": [1.0, 0.0]},
                "w_o": {"v": 1, "dim": [2, 1], "data": [0.0, 1.0]}
            }]}
        ]
    }"#;
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(weights_json.as_bytes()).unwrap();

    let weights = ModelWeights::load(file.path().to_str().unwrap()).unwrap();
    let a = clens_rs::composition_scores(&weights).unwrap();
    let b = clens_rs::composition_scores(&weights).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.k_composition.len(), 1);
    assert_eq!(a.k_composition[0].len(), 1);
}

/// A captured attention-patterns payload drives the whole pipeline
#[test]
fn test_patterns_payload_end_to_end() {
    let json = r#"{
        "tokens": [
            {"id": 0, "text": "<|BOS|>"},
            {"id": 11, "text": " is"},
            {"id": 12, "text": " Regan"},
            {"id": 11, "text": " is"}
        ],
        "attention": [
            [[[0.3, 0.7]]],
            [[[0.2, 0.5, 0.3]]],
            [[[0.1, 0.1, 0.7, 0.1]]]
        ],
        "model_name": "t2",
        "n_layers": 2,
        "n_heads": 8,
        "ov_predictions": [
            [[[{"token": " a", "id": 1, "logit": 1.0}]]],
            [[[{"token": " b", "id": 2, "logit": 1.0}]]],
            [[[{"token": " Regan", "id": 12, "logit": 3.5}]]],
            [[[{"token": " c", "id": 3, "logit": 1.0}]]]
        ]
    }"#;
    let response: AttentionPatternsResponse = serde_json::from_str(json).unwrap();

    let affinity = AffinityMatrix::from_attention(
        Some(&response.attention),
        0,
        0,
        response.tokens.len(),
    );
    // Row mass holds for every real query row
    for row in 1..response.tokens.len() {
        let mass: f32 = (0..=row).map(|col| affinity.get(row, col)).sum();
        assert!((mass - 1.0).abs() < 1e-6);
    }

    let ov_lists = response.head_ov(0, 0);
    let verdict = detect_pattern(&affinity, &ov_lists, 3, &response.tokens);
    assert_eq!(verdict.attended_position, 2);
    // Attended " Regan" boosts itself: copying; and " Regan" followed
    // the earlier " is": induction
    assert!(verdict.is_copying);
    assert!(verdict.is_induction);
}
