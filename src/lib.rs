pub mod error;
pub mod matcher;
pub mod models;
pub mod names;
pub mod opt;
pub mod roms;
pub mod settings;

pub use error::{MatchError, MatchResult};
pub use matcher::{calculate_similarity, Algorithm, CancellationGate, MatchOptions, QueryTracker};
pub use models::{Candidate, DecodedImage, MaterializedImage, SimilarityResult};
pub use settings::Settings;
