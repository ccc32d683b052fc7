use std::path::Path;
use std::time::Duration;

use crate::error::{MatchError, MatchResult};
use crate::models::SimilarityResult;
use crate::opt::*;
use crate::settings::Settings;

pub mod assembler;
pub mod cancel;
pub mod materializer;
pub mod scanner;
pub mod similarity;

pub use cancel::{CancellationGate, QueryTracker};
pub use materializer::LoadPolicy;
pub use scanner::{ScanOutput, ScanRequest};
pub use similarity::{score, Algorithm};

fn log(s: String) {
    log_if(s.as_str(), DbgFlg::Scan);
}

/// Limits applied to one query.
#[derive(Debug, Clone)]
pub struct MatchOptions {
    pub max_images_to_load: usize,
    pub load_policy: LoadPolicy,
}

impl Default for MatchOptions {
    fn default() -> Self {
        MatchOptions::from(&Settings::default())
    }
}

impl From<&Settings> for MatchOptions {
    fn from(settings: &Settings) -> Self {
        let settings = settings.sanitized();
        MatchOptions {
            max_images_to_load: settings.max_images_to_load,
            load_policy: LoadPolicy {
                concurrency_limit: settings.image_loader_max_concurrency,
                max_retries: settings.image_loader_max_retries,
                retry_delay: Duration::from_millis(settings.image_loader_retry_delay_ms),
            },
        }
    }
}

/// Finds the images in `folder` whose names best match `target_name`.
///
/// Fails only for an unknown algorithm name. A cancelled query resolves to an
/// empty result, and unreadable or undecodable files show up in
/// `processing_errors` instead of failing the call.
pub async fn calculate_similarity(
    target_name: &str,
    folder: &Path,
    threshold: f64,
    algorithm_name: &str,
    cancel: &CancellationGate,
    options: &MatchOptions,
) -> MatchResult<SimilarityResult> {
    let algorithm = Algorithm::from_name(algorithm_name)?;

    match run_pipeline(target_name, folder, threshold, algorithm, cancel, options).await {
        Err(MatchError::Cancelled) => {
            log(format!("Query for \"{}\" cancelled", target_name));
            Ok(SimilarityResult::empty())
        }
        other => other,
    }
}

async fn run_pipeline(
    target_name: &str,
    folder: &Path,
    threshold: f64,
    algorithm: Algorithm,
    cancel: &CancellationGate,
    options: &MatchOptions,
) -> MatchResult<SimilarityResult> {
    cancel.check()?;

    let scan_output = {
        let target_name = target_name.to_string();
        let folder = folder.to_path_buf();
        let cancel = cancel.clone();
        let max_results = options.max_images_to_load;

        tokio::task::spawn_blocking(move || {
            let request = ScanRequest {
                target_name: &target_name,
                folder: &folder,
                threshold,
                algorithm,
                max_results,
            };
            scanner::scan(&request, &cancel)
        })
        .await
        .unwrap_or_else(|err| {
            Ok(ScanOutput {
                candidates: Vec::new(),
                errors: vec![format!("Scan task failed: {}", err)],
            })
        })?
    };

    let materialized =
        materializer::materialize(scan_output.candidates, &options.load_policy, cancel).await?;

    Ok(assembler::assemble(scan_output.errors, materialized, cancel))
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs::File;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const JARO_WINKLER: &str = "Jaro-Winkler Distance";

    fn write_image(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        image::RgbImage::new(2, 2)
            .save(&path)
            .expect("Failed to write image");
        path
    }

    fn options(max_images_to_load: usize) -> MatchOptions {
        MatchOptions {
            max_images_to_load,
            load_policy: LoadPolicy {
                concurrency_limit: 2,
                max_retries: 0,
                retry_delay: Duration::ZERO,
            },
        }
    }

    #[tokio::test]
    async fn test_exact_name_ranks_first() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        write_image(dir.path(), "sonik2.jpg");
        write_image(dir.path(), "sonic2.png");

        let result = calculate_similarity(
            "sonic2",
            dir.path(),
            70.0,
            JARO_WINKLER,
            &CancellationGate::new(),
            &options(30),
        )
        .await
        .expect("query failed");

        let ranked = result
            .ranked_images
            .iter()
            .map(|image| (image.file_name(), image.score))
            .collect::<Vec<_>>();
        assert_eq!(
            ranked,
            vec![("sonic2.png".to_string(), 100.0), ("sonik2.jpg".to_string(), 93.33)]
        );
        assert!(result.processing_errors.is_empty());
    }

    #[tokio::test]
    async fn test_empty_folder_path() {
        let result = calculate_similarity(
            "sonic2",
            Path::new(""),
            70.0,
            JARO_WINKLER,
            &CancellationGate::new(),
            &options(30),
        )
        .await
        .expect("query failed");
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_image_is_reported() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        write_image(dir.path(), "sonic2.png");
        File::create(dir.path().join("sonic2 (beta).png")).expect("Failed to create file");

        let result = calculate_similarity(
            "sonic2",
            dir.path(),
            70.0,
            JARO_WINKLER,
            &CancellationGate::new(),
            &options(30),
        )
        .await
        .expect("query failed");

        assert_eq!(result.ranked_images.len(), 1);
        assert_eq!(result.ranked_images[0].file_name(), "sonic2.png");
        assert_eq!(result.processing_errors.len(), 1);
        assert!(result.processing_errors[0].contains("sonic2 (beta).png"));
    }

    #[tokio::test]
    async fn test_unsupported_algorithm() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        write_image(dir.path(), "sonic2.png");

        let result = calculate_similarity(
            "sonic2",
            dir.path(),
            70.0,
            "Hamming Distance",
            &CancellationGate::new(),
            &options(30),
        )
        .await;
        assert!(matches!(result, Err(MatchError::UnsupportedAlgorithm(_))));
    }

    #[tokio::test]
    async fn test_result_is_capped() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        for i in 0..12 {
            write_image(dir.path(), &format!("sonic{}.png", i));
        }

        let result = calculate_similarity(
            "sonic",
            dir.path(),
            0.0,
            "Levenshtein Distance",
            &CancellationGate::new(),
            &options(4),
        )
        .await
        .expect("query failed");
        assert_eq!(result.ranked_images.len(), 4);
        assert!(result
            .ranked_images
            .windows(2)
            .all(|pair| pair[0].score >= pair[1].score));
    }

    #[tokio::test]
    async fn test_cancelled_query_is_empty() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        write_image(dir.path(), "sonic2.png");

        let tracker = QueryTracker::new();
        let stale = tracker.begin();
        let _fresh = tracker.begin();

        let result = calculate_similarity(
            "sonic2",
            dir.path(),
            0.0,
            JARO_WINKLER,
            &stale,
            &options(30),
        )
        .await
        .expect("cancelled query should not fail");
        assert!(result.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_cancel_while_running_is_empty() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        for i in 0..30 {
            image::RgbImage::from_fn(512, 512, |x, y| image::Rgb([x as u8, y as u8, i as u8]))
                .save(dir.path().join(format!("sonic{}.png", i)))
                .expect("Failed to write image");
        }

        let cancel = CancellationGate::new();
        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                cancel.cancel();
            })
        };

        let mut options = options(30);
        options.load_policy.concurrency_limit = 1;
        let result = calculate_similarity("sonic", dir.path(), 0.0, JARO_WINKLER, &cancel, &options)
            .await
            .expect("cancelled query should not fail");
        canceller.await.expect("canceller failed");

        assert!(cancel.is_cancelled());
        assert!(result.is_empty());
        assert!(result.processing_errors.is_empty());
    }

    #[test]
    fn test_options_from_settings() {
        let settings = Settings {
            max_images_to_load: 0,
            image_loader_retry_delay_ms: 50,
            ..Settings::default()
        };
        let options = MatchOptions::from(&settings);
        assert_eq!(options.max_images_to_load, 1);
        assert_eq!(options.load_policy.retry_delay, Duration::from_millis(50));
    }
}
