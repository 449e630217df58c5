//! Error types for PLSA estimation.

use thiserror::Error;

/// PLSA error type.
///
/// Every variant is a local precondition violation detected at the API
/// boundary; nothing here is transient or retryable. Numeric
/// degeneracies during training (posterior underflow, collapsed
/// classes) are not errors and are handled inside the EM sweep.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlsaError {
    /// The number of latent classes must be at least 1.
    #[error("number of latent classes must be at least 1, got {0}")]
    InvalidClassCount(usize),

    /// The user and item sequences must be the same length.
    #[error("users ({users}) and items ({items}) must have equal length")]
    DimensionMismatch { users: usize, items: usize },

    /// The observation set is empty.
    #[error("observation set is empty")]
    EmptyInput,

    /// An observation index falls outside the dense range `0..n_uniq`
    /// of its side.
    #[error("{side} index {index} at observation {position} is out of range for {n_uniq} distinct values")]
    IndexOutOfRange {
        side: &'static str,
        index: usize,
        position: usize,
        n_uniq: usize,
    },

    /// A reporting method was called before any training sweep completed.
    #[error("model has not been trained; call train() first")]
    NotTrained,
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, PlsaError>;
