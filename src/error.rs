//! Error taxonomy for circuit derivation

use thiserror::Error;

/// Errors produced by the derivation pipeline and the backend boundary.
///
/// Out-of-range indices fail loudly (caller bugs), while missing data is
/// handled by the derivation functions themselves with neutral fallbacks
/// and never reaches this enum.
#[derive(Debug, Error)]
pub enum CircuitError {
    /// Composition scoring requested for a model without a second layer
    #[error("model '{model}' has {n_layers} layer(s); head composition needs at least 2")]
    UnsupportedModel {
        /// Model name as reported by the backend
        model: String,
        /// Layer count of the offending model
        n_layers: usize,
    },

    /// Query position outside `[1, n_tokens - 1]`
    ///
    /// Position 0 is the BOS token: it has no incoming attention and
    /// nothing to ablate.
    #[error("position {position} out of range [1, {max}]")]
    InvalidPosition {
        /// Requested query position
        position: usize,
        /// Largest valid position (`n_tokens - 1`)
        max: usize,
    },

    /// Layer or head index beyond the model's configured dimensions
    #[error("layer {layer} / head {head} out of range (model has {n_layers} layers, {n_heads} heads)")]
    InvalidHead {
        /// Requested layer index
        layer: usize,
        /// Requested head index
        head: usize,
        /// Layer count of the model
        n_layers: usize,
        /// Head count of the model
        n_heads: usize,
    },

    /// Generic index past the end of a vector (vocab id, token index)
    #[error("index {index} out of range (len {len})")]
    OutOfRange {
        /// Offending index
        index: usize,
        /// Length of the indexed collection
        len: usize,
    },

    /// Matrix dimensions that cannot be composed
    #[error("projection shape mismatch: {0}")]
    ShapeMismatch(String),

    /// A response arrived after a newer request superseded it.
    ///
    /// Must be discarded silently by callers, never merged into state.
    #[error("response for request generation {response} superseded by generation {current}")]
    Stale {
        /// Generation the response was issued under
        response: u64,
        /// Generation currently in flight
        current: u64,
    },

    /// Backend payload that does not match the expected shape
    #[error("malformed backend response from {endpoint}: {detail}")]
    MalformedResponse {
        /// Endpoint path the payload came from
        endpoint: String,
        /// Decode error description
        detail: String,
    },

    /// Network or HTTP failure talking to the inference backend
    #[error("backend transport failure: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Result alias for circuit derivation
pub type Result<T> = std::result::Result<T, CircuitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_bounds() {
        let err = CircuitError::InvalidPosition {
            position: 12,
            max: 7,
        };
        assert_eq!(err.to_string(), "position 12 out of range [1, 7]");

        let err = CircuitError::InvalidHead {
            layer: 3,
            head: 0,
            n_layers: 2,
            n_heads: 8,
        };
        assert!(err.to_string().contains("layer 3"));
        assert!(err.to_string().contains("2 layers"));
    }
}
