use std::fmt::{self, Display, Formatter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::{DynamicImage, GenericImageView};

/// An image file whose name scored against a target.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub file_path: PathBuf,
    pub display_name: String,
    pub score: f64,
}

impl Candidate {
    pub fn new(file_path: PathBuf, display_name: String, score: f64) -> Self {
        Candidate {
            file_path,
            display_name,
            score,
        }
    }

    pub fn file_name(&self) -> String {
        file_name_of(&self.file_path)
    }
}

impl Display for Candidate {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "[{:>6.2}] {}", self.score, self.display_name)
    }
}

/// A decoded image that owns its pixels and a canonical PNG encoding.
///
/// Nothing here refers back to the source file, so it can outlive it and be
/// shared across threads behind an `Arc`.
#[derive(Debug)]
pub struct DecodedImage {
    pixels: DynamicImage,
    png_bytes: Vec<u8>,
}

impl DecodedImage {
    pub(crate) fn new(pixels: DynamicImage, png_bytes: Vec<u8>) -> Self {
        DecodedImage { pixels, png_bytes }
    }

    pub fn width(&self) -> u32 {
        self.pixels.dimensions().0
    }

    pub fn height(&self) -> u32 {
        self.pixels.dimensions().1
    }

    pub fn pixels(&self) -> &DynamicImage {
        &self.pixels
    }

    pub fn png_bytes(&self) -> &[u8] {
        &self.png_bytes
    }
}

#[derive(Debug, Clone)]
pub struct MaterializedImage {
    pub file_path: PathBuf,
    pub display_name: String,
    pub score: f64,
    pub image: Option<Arc<DecodedImage>>,
}

impl MaterializedImage {
    pub fn loaded(candidate: Candidate, image: DecodedImage) -> Self {
        MaterializedImage {
            file_path: candidate.file_path,
            display_name: candidate.display_name,
            score: candidate.score,
            image: Some(Arc::new(image)),
        }
    }

    pub fn failed(candidate: Candidate) -> Self {
        MaterializedImage {
            file_path: candidate.file_path,
            display_name: candidate.display_name,
            score: candidate.score,
            image: None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.image.is_some()
    }

    pub fn file_name(&self) -> String {
        file_name_of(&self.file_path)
    }
}

impl Display for MaterializedImage {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match &self.image {
            Some(image) => write!(
                f,
                "[{:>6.2}] {:40} {}x{}",
                self.score,
                self.file_name(),
                image.width(),
                image.height()
            ),
            None => write!(f, "[{:>6.2}] {:40} (not loaded)", self.score, self.file_name()),
        }
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}
