//! Step-index and position conversions
//!
//! The attention tensor is indexed by *attention step*, not by absolute
//! token position: position 0 (BOS) never attends, so the row for query
//! position `p` lives at step `p - 1`. Every call site goes through the
//! named conversions here instead of repeating the arithmetic inline.

use crate::error::{CircuitError, Result};

/// Attention-step index for an absolute query position.
///
/// Returns `None` for position 0, which has no attention row.
pub fn step_index_for(position: usize) -> Option<usize> {
    position.checked_sub(1)
}

/// Absolute query position for an attention-step index
pub fn position_for_step(step: usize) -> usize {
    step + 1
}

/// Number of causally valid sources for a query position.
///
/// Rows are inclusive of the query's own position, so a query at `p`
/// may attend to `p + 1` sources (`0..=p`).
pub fn causal_len(position: usize) -> usize {
    position + 1
}

/// Check a query position against the token count.
///
/// Valid positions are `1..=n_tokens - 1`; position 0 is BOS.
pub fn validate_query_position(position: usize, n_tokens: usize) -> Result<()> {
    let max = n_tokens.saturating_sub(1);
    if position == 0 || position > max {
        return Err(CircuitError::InvalidPosition { position, max });
    }
    Ok(())
}

/// Check a (layer, head) pair against the model's configured dimensions
pub fn validate_head(layer: usize, head: usize, n_layers: usize, n_heads: usize) -> Result<()> {
    if layer >= n_layers || head >= n_heads {
        return Err(CircuitError::InvalidHead {
            layer,
            head,
            n_layers,
            n_heads,
        });
    }
    Ok(())
}
