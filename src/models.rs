pub mod candidate;
pub mod similarity_result;

pub use candidate::{Candidate, DecodedImage, MaterializedImage};
pub use similarity_result::SimilarityResult;
