use std::io::{self, Cursor};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use image::{GenericImageView, ImageOutputFormat};
use tokio::sync::Semaphore;

use crate::error::{MatchError, MatchResult};
use crate::models::{Candidate, DecodedImage, MaterializedImage};
use crate::opt::*;

use super::cancel::CancellationGate;

// Windows sharing and lock violations.
const ERROR_SHARING_VIOLATION: i32 = 32;
const ERROR_LOCK_VIOLATION: i32 = 33;

fn log(s: String) {
    log_if(s.as_str(), DbgFlg::Load);
}

#[derive(Debug, Clone)]
pub struct LoadPolicy {
    pub concurrency_limit: usize,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for LoadPolicy {
    fn default() -> Self {
        LoadPolicy {
            concurrency_limit: 4,
            max_retries: 3,
            retry_delay: Duration::from_millis(200),
        }
    }
}

#[derive(Debug, Default)]
pub struct MaterializeOutput {
    pub images: Vec<MaterializedImage>,
    pub errors: Vec<String>,
}

fn is_transient_io(err: &io::Error) -> bool {
    let locked = cfg!(windows)
        && matches!(
            err.raw_os_error(),
            Some(ERROR_SHARING_VIOLATION) | Some(ERROR_LOCK_VIOLATION)
        );

    locked
        || matches!(
            err.kind(),
            io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted | io::ErrorKind::TimedOut
        )
}

fn decode_failure(path: &Path, reason: impl ToString) -> MatchError {
    MatchError::Decode {
        path: path.to_path_buf(),
        reason: reason.to_string(),
        transient: false,
    }
}

/// Reads and decodes `path`, keeping a PNG re-encoding so the result owns
/// all of its data.
pub fn decode_image(path: &Path) -> MatchResult<DecodedImage> {
    let bytes = std::fs::read(path).map_err(|err| MatchError::Decode {
        path: path.to_path_buf(),
        transient: is_transient_io(&err),
        reason: err.to_string(),
    })?;
    if bytes.is_empty() {
        return Err(decode_failure(path, "file is empty"));
    }

    let pixels = image::load_from_memory(&bytes).map_err(|err| decode_failure(path, err))?;
    let (width, height) = pixels.dimensions();
    if width == 0 || height == 0 {
        return Err(decode_failure(path, "image has zero dimensions"));
    }

    let mut png = Cursor::new(Vec::new());
    pixels
        .write_to(&mut png, ImageOutputFormat::Png)
        .map_err(|err| decode_failure(path, err))?;

    Ok(DecodedImage::new(pixels, png.into_inner()))
}

async fn retry_transient<T, F>(
    path: &Path,
    op: Arc<F>,
    policy: &LoadPolicy,
    cancel: &CancellationGate,
) -> MatchResult<T>
where
    T: Send + 'static,
    F: Fn() -> MatchResult<T> + Send + Sync + 'static,
{
    let mut retries = 0;
    loop {
        cancel.check()?;

        let attempt = op.clone();
        let outcome = tokio::task::spawn_blocking(move || (*attempt)())
            .await
            .unwrap_or_else(|err| Err(decode_failure(path, format!("loader task failed: {}", err))));

        match outcome {
            Err(err) if err.is_transient() && retries < policy.max_retries => {
                retries += 1;
                log(format!(
                    "{} is busy, retry {}/{}",
                    path.display(),
                    retries,
                    policy.max_retries
                ));
                tokio::time::sleep(policy.retry_delay).await;
            }
            other => return other,
        }
    }
}

async fn load_candidate(
    candidate: Candidate,
    policy: LoadPolicy,
    cancel: CancellationGate,
    semaphore: Arc<Semaphore>,
) -> MatchResult<(MaterializedImage, Option<String>)> {
    let _permit = semaphore
        .acquire_owned()
        .await
        .map_err(|_| MatchError::Cancelled)?;
    cancel.check()?;

    let path: PathBuf = candidate.file_path.clone();
    let op_path = path.clone();
    let loaded = retry_transient(
        &path,
        Arc::new(move || decode_image(&op_path)),
        &policy,
        &cancel,
    )
    .await;

    match loaded {
        Ok(image) => Ok((MaterializedImage::loaded(candidate, image), None)),
        Err(MatchError::Cancelled) => Err(MatchError::Cancelled),
        Err(err) => {
            log(err.to_string());
            Ok((MaterializedImage::failed(candidate), Some(err.to_string())))
        }
    }
}

/// Decodes each candidate with at most `concurrency_limit` loads in flight.
///
/// Output order follows input order. A failed item stays in the output with
/// no image and contributes one message to `errors`.
pub async fn materialize(
    candidates: Vec<Candidate>,
    policy: &LoadPolicy,
    cancel: &CancellationGate,
) -> MatchResult<MaterializeOutput> {
    let semaphore = Arc::new(Semaphore::new(policy.concurrency_limit.max(1)));

    let handles = candidates
        .into_iter()
        .map(|candidate| {
            tokio::spawn(load_candidate(
                candidate,
                policy.clone(),
                cancel.clone(),
                semaphore.clone(),
            ))
        })
        .collect::<Vec<_>>();

    let mut output = MaterializeOutput::default();
    let mut cancelled = false;
    for handle in handles {
        if cancelled {
            handle.abort();
            continue;
        }

        match handle.await {
            Ok(Ok((image, error))) => {
                output.images.push(image);
                output.errors.extend(error);
            }
            Ok(Err(MatchError::Cancelled)) => cancelled = true,
            Ok(Err(err)) => output.errors.push(err.to_string()),
            Err(err) => output.errors.push(format!("Image loader task failed: {}", err)),
        }
    }

    if cancelled {
        return Err(MatchError::Cancelled);
    }
    cancel.check()?;

    log(format!(
        "Loaded {} of {} images",
        output.images.iter().filter(|image| image.is_loaded()).count(),
        output.images.len()
    ));
    Ok(output)
}
