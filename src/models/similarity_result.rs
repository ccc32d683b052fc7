use super::candidate::MaterializedImage;

/// The answer to one query: images ranked by descending score plus the
/// messages for files that could not be scored or loaded.
#[derive(Debug, Clone, Default)]
pub struct SimilarityResult {
    pub ranked_images: Vec<MaterializedImage>,
    pub processing_errors: Vec<String>,
}

impl SimilarityResult {
    pub fn empty() -> Self {
        SimilarityResult::default()
    }

    pub fn is_empty(&self) -> bool {
        self.ranked_images.is_empty() && self.processing_errors.is_empty()
    }

    pub fn best(&self) -> Option<&MaterializedImage> {
        self.ranked_images.first()
    }
}
