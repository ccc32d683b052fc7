use itertools::Itertools;

use crate::models::SimilarityResult;

use super::cancel::CancellationGate;
use super::materializer::MaterializeOutput;

/// Builds the final ranking. Items that failed to load are left out of
/// `ranked_images`; their messages are already part of the error list.
/// Equal scores keep the order they were loaded in.
pub fn assemble(
    scan_errors: Vec<String>,
    materialized: MaterializeOutput,
    cancel: &CancellationGate,
) -> SimilarityResult {
    if cancel.is_cancelled() {
        return SimilarityResult::empty();
    }

    let ranked_images = materialized
        .images
        .into_iter()
        .filter(|image| image.is_loaded())
        .sorted_by(|a, b| b.score.total_cmp(&a.score))
        .collect();

    let processing_errors = scan_errors
        .into_iter()
        .chain(materialized.errors)
        .collect();

    SimilarityResult {
        ranked_images,
        processing_errors,
    }
}
