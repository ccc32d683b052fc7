//! Error taxonomy of the matching pipeline.

use std::path::PathBuf;

use thiserror::Error;

/// Failures the matching pipeline can observe.
///
/// Only [`MatchError::UnsupportedAlgorithm`] ever reaches the caller of
/// [`crate::matcher::calculate_similarity`]. `Cancelled` turns into an empty
/// result, and the per-item variants are rendered into
/// `SimilarityResult::processing_errors`.
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("unsupported similarity algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("unable to score {}: {reason}", path.display())]
    ScanItem { path: PathBuf, reason: String },

    #[error("unable to load image {}: {reason}", path.display())]
    Decode {
        path: PathBuf,
        reason: String,
        transient: bool,
    },

    #[error("operation cancelled")]
    Cancelled,
}

impl MatchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, MatchError::Decode { transient: true, .. })
    }
}

pub type MatchResult<T> = Result<T, MatchError>;
