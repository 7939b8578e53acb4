//! Affinity matrix construction
//!
//! Materializes the ragged per-step attention rows of one (layer, head)
//! into a dense causal `N×N` matrix: `matrix[row][col]` is the attention
//! weight from query token `row` to source token `col`.

use ndarray::{Array2, ArrayView1};

use crate::indexing::step_index_for;
use crate::types::AttentionTensor;

/// Dense causal attention matrix for one (model, layer, head) triple.
///
/// Invariants:
/// - `matrix[row][col] == 0` for `col > row` (causal mask)
/// - `matrix[0][0] == 1` (BOS self-attention sentinel; position 0 has no
///   real predecessors)
///
/// Derived on demand and never persisted; rebuild whenever the model,
/// layer, head, or input text changes.
#[derive(Debug, Clone, PartialEq)]
pub struct AffinityMatrix {
    matrix: Array2<f32>,
}

impl AffinityMatrix {
    /// Build the matrix from a raw attention tensor.
    ///
    /// Reads the ragged row at step `p - 1` for each query position `p`
    /// and copies entries `0..=p` into row `p`. Entries beyond a row's
    /// length (a backend using the exclusive row convention) stay zero.
    ///
    /// When the tensor is absent or does not carry the requested
    /// (layer, head), returns the identity fallback so consumers render
    /// "no data" instead of crashing.
    pub fn from_attention(
        attention: Option<&AttentionTensor>,
        layer: usize,
        head: usize,
        n_tokens: usize,
    ) -> Self {
        let Some(attention) = attention else {
            return Self::identity(n_tokens);
        };
        let covered = attention
            .first()
            .and_then(|step| step.get(layer))
            .is_some_and(|l| l.get(head).is_some());
        if !covered {
            return Self::identity(n_tokens);
        }

        let mut matrix = Array2::zeros((n_tokens, n_tokens));
        if n_tokens > 0 {
            matrix[[0, 0]] = 1.0;
        }
        for p in 1..n_tokens {
            let Some(step) = step_index_for(p) else {
                continue;
            };
            let Some(row) = attention
                .get(step)
                .and_then(|s| s.get(layer))
                .and_then(|l| l.get(head))
            else {
                continue;
            };
            for (col, &weight) in row.iter().enumerate().take(p + 1) {
                matrix[[p, col]] = weight;
            }
        }
        Self { matrix }
    }

    /// Identity fallback: `matrix[i][j] == 1` iff `i == j`.
    ///
    /// Signals "no data for this selection" while keeping every
    /// consumer-facing invariant intact.
    pub fn identity(n_tokens: usize) -> Self {
        Self {
            matrix: Array2::eye(n_tokens),
        }
    }

    /// Token count `N`
    pub fn n_tokens(&self) -> usize {
        self.matrix.nrows()
    }

    /// Weight from query `row` to source `col`; 0 outside the matrix
    pub fn get(&self, row: usize, col: usize) -> f32 {
        if row < self.matrix.nrows() && col < self.matrix.ncols() {
            self.matrix[[row, col]]
        } else {
            0.0
        }
    }

    /// Full row for one query position
    pub fn row(&self, row: usize) -> Option<ArrayView1<'_, f32>> {
        if row < self.matrix.nrows() {
            Some(self.matrix.row(row))
        } else {
            None
        }
    }

    /// The position a query attends to most, with its weight.
    ///
    /// Scans the causally valid range `0..=query_position`; on ties the
    /// lowest index wins. `None` only when the query is outside the
    /// matrix.
    pub fn argmax_attended(&self, query_position: usize) -> Option<(usize, f32)> {
        let row = self.row(query_position)?;
        let limit = query_position.min(row.len().saturating_sub(1));
        let mut best = (0, row[0]);
        for col in 1..=limit {
            if row[col] > best.1 {
                best = (col, row[col]);
            }
        }
        Some(best)
    }

    /// Top-k attended positions for a query, strongest first
    pub fn top_attended(&self, query_position: usize, k: usize) -> Vec<(usize, f32)> {
        let Some(row) = self.row(query_position) else {
            return Vec::new();
        };
        let limit = query_position.min(row.len().saturating_sub(1));
        let mut indexed: Vec<(usize, f32)> = (0..=limit).map(|col| (col, row[col])).collect();
        indexed.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        indexed.truncate(k);
        indexed
    }

    /// Borrow the dense matrix
    pub fn as_array(&self) -> &Array2<f32> {
        &self.matrix
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One layer, one head, rows for query positions 1 and 2
    fn small_tensor() -> AttentionTensor {
        vec![
            vec![vec![vec![0.25, 0.75]]],
            vec![vec![vec![0.10, 0.30, 0.60]]],
        ]
    }

    #[test]
    fn test_build_copies_ragged_rows() {
        let tensor = small_tensor();
        let m = AffinityMatrix::from_attention(Some(&tensor), 0, 0, 3);

        assert_eq!(m.get(0, 0), 1.0);
        assert_eq!(m.get(1, 0), 0.25);
        assert_eq!(m.get(1, 1), 0.75);
        assert_eq!(m.get(2, 2), 0.60);
    }

    #[test]
    fn test_causal_mask_invariant() {
        let tensor = small_tensor();
        let m = AffinityMatrix::from_attention(Some(&tensor), 0, 0, 3);
        for row in 0..3 {
            for col in (row + 1)..3 {
                assert_eq!(m.get(row, col), 0.0, "future leak at [{row}][{col}]");
            }
        }
    }

    #[test]
    fn test_row_mass_invariant() {
        let tensor = small_tensor();
        let m = AffinityMatrix::from_attention(Some(&tensor), 0, 0, 3);
        for row in 1..3 {
            let mass: f32 = (0..=row).map(|col| m.get(row, col)).sum();
            assert!((mass - 1.0).abs() < 1e-6, "row {row} mass {mass}");
        }
    }

    #[test]
    fn test_bos_sentinel() {
        let tensor = small_tensor();
        let m = AffinityMatrix::from_attention(Some(&tensor), 0, 0, 3);
        assert_eq!(m.get(0, 0), 1.0);
        assert_eq!(m.get(0, 1), 0.0);
        assert_eq!(m.get(0, 2), 0.0);
    }

    #[test]
    fn test_missing_layer_falls_back_to_identity() {
        let tensor = small_tensor();
        let m = AffinityMatrix::from_attention(Some(&tensor), 5, 0, 3);
        assert_eq!(m, AffinityMatrix::identity(3));

        let m = AffinityMatrix::from_attention(None, 0, 0, 3);
        assert_eq!(m.get(1, 1), 1.0);
        assert_eq!(m.get(1, 0), 0.0);
    }

    #[test]
    fn test_short_rows_leave_zeros() {
        // Exclusive-convention backend: row for position 2 has 2 entries
        let tensor: AttentionTensor =
            vec![vec![vec![vec![1.0]]], vec![vec![vec![0.4, 0.6]]]];
        let m = AffinityMatrix::from_attention(Some(&tensor), 0, 0, 3);
        assert_eq!(m.get(2, 0), 0.4);
        assert_eq!(m.get(2, 1), 0.6);
        assert_eq!(m.get(2, 2), 0.0);
    }

    #[test]
    fn test_argmax_lowest_index_wins_ties() {
        let tensor: AttentionTensor = vec![
            vec![vec![vec![1.0, 0.0]]],
            vec![vec![vec![0.1, 0.8, 0.1]]],
            vec![vec![vec![0.1, 0.1, 0.1, 0.7]]],
            vec![vec![vec![0.0, 0.0, 0.4, 0.0, 0.2]]],
            vec![vec![vec![0.0, 0.0, 0.4, 0.0, 0.0, 0.4]]],
        ];
        let m = AffinityMatrix::from_attention(Some(&tensor), 0, 0, 6);
        // Equal maxima at columns 2 and 5: first occurrence wins
        assert_eq!(m.argmax_attended(5), Some((2, 0.4)));
    }

    #[test]
    fn test_top_attended_ordering() {
        let tensor = small_tensor();
        let m = AffinityMatrix::from_attention(Some(&tensor), 0, 0, 3);
        let top = m.top_attended(2, 2);
        assert_eq!(top, vec![(2, 0.60), (1, 0.30)]);
    }
}
