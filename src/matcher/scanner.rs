use std::fs;
use std::path::{Path, PathBuf};

use itertools::Itertools;
use rayon::prelude::*;

use crate::error::{MatchError, MatchResult};
use crate::models::Candidate;
use crate::opt::*;

use super::cancel::CancellationGate;
use super::similarity::{self, Algorithm};

pub const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];
const MAX_SCAN_WORKERS: usize = 8;

fn log(s: String) {
    log_if(s.as_str(), DbgFlg::Scan);
}

#[derive(Debug, Clone, Copy)]
pub struct ScanRequest<'a> {
    pub target_name: &'a str,
    pub folder: &'a Path,
    pub threshold: f64,
    pub algorithm: Algorithm,
    pub max_results: usize,
}

#[derive(Debug, Default)]
pub struct ScanOutput {
    pub candidates: Vec<Candidate>,
    pub errors: Vec<String>,
}

pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|supported| ext.eq_ignore_ascii_case(supported))
        })
        .unwrap_or(false)
}

/// Image files directly inside `folder`, sorted by file name.
fn list_image_files(folder: &Path) -> Res<(Vec<PathBuf>, Vec<String>)> {
    let entries = fs::read_dir(folder)
        .map_err(|err| format!("Unable to read folder {}: {}", folder.display(), err))?;

    let mut files = Vec::new();
    let mut errors = Vec::new();
    for entry in entries {
        match entry {
            Ok(entry) => {
                let path = entry.path();
                if path.is_file() && is_image_file(&path) {
                    files.push(path);
                }
            }
            Err(err) => errors.push(format!(
                "Unable to read an entry of {}: {}",
                folder.display(),
                err
            )),
        }
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok((files, errors))
}

fn scan_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(MAX_SCAN_WORKERS)
}

fn score_file(path: &Path, target_name: &str, algorithm: Algorithm) -> MatchResult<Candidate> {
    let display_name = path
        .file_stem()
        .ok_or_else(|| MatchError::ScanItem {
            path: path.to_path_buf(),
            reason: "file has no name".to_string(),
        })?
        .to_str()
        .ok_or_else(|| MatchError::ScanItem {
            path: path.to_path_buf(),
            reason: "file name is not valid UTF-8".to_string(),
        })?
        .to_string();

    let score = similarity::score(target_name, &display_name, algorithm);
    Ok(Candidate::new(path.to_path_buf(), display_name, score))
}

fn score_all(
    files: &[PathBuf],
    request: &ScanRequest,
    cancel: &CancellationGate,
) -> MatchResult<Vec<MatchResult<Candidate>>> {
    files
        .par_iter()
        .map(|path| {
            cancel.check()?;
            Ok(score_file(path, request.target_name, request.algorithm))
        })
        .collect()
}

/// Highest scores first, equal scores keep their listing order.
pub fn select_top(candidates: Vec<Candidate>, max_results: usize) -> Vec<Candidate> {
    candidates
        .into_iter()
        .sorted_by(|a, b| b.score.total_cmp(&a.score))
        .take(max_results)
        .collect()
}

/// Scores every image in the request folder and keeps the best matches at or
/// above the threshold. No image bytes are read here.
pub fn scan(request: &ScanRequest, cancel: &CancellationGate) -> MatchResult<ScanOutput> {
    if request.folder.as_os_str().is_empty() {
        return Ok(ScanOutput::default());
    }

    let (files, mut errors) = match list_image_files(request.folder) {
        Ok(listing) => listing,
        Err(err) => {
            return Ok(ScanOutput {
                candidates: Vec::new(),
                errors: vec![err],
            })
        }
    };
    log(format!(
        "Scanning {} images in {} for \"{}\"",
        files.len(),
        request.folder.display(),
        request.target_name
    ));

    let workers = scan_worker_count();
    let outcomes = match rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("cover-scan-{}", i))
        .build()
    {
        Ok(pool) => pool.install(|| score_all(&files, request, cancel))?,
        Err(err) => {
            log(format!("Unable to build scan pool, using global pool: {}", err));
            score_all(&files, request, cancel)?
        }
    };
    cancel.check()?;

    let mut candidates = Vec::new();
    for outcome in outcomes {
        match outcome {
            Ok(candidate) if candidate.score >= request.threshold => candidates.push(candidate),
            Ok(_) => {}
            Err(err) => errors.push(err.to_string()),
        }
    }

    let matched = candidates.len();
    let candidates = select_top(candidates, request.max_results);
    log(format!(
        "{} of {} images passed threshold {}, keeping {}",
        matched,
        files.len(),
        request.threshold,
        candidates.len()
    ));

    Ok(ScanOutput { candidates, errors })
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs::File;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        File::create(&path).expect("Failed to create file");
        path
    }

    fn request<'a>(target: &'a str, folder: &'a Path, threshold: f64) -> ScanRequest<'a> {
        ScanRequest {
            target_name: target,
            folder,
            threshold,
            algorithm: Algorithm::JaroWinkler,
            max_results: 30,
        }
    }

    #[test]
    fn test_is_image_file() {
        assert!(is_image_file(Path::new("a.png")));
        assert!(is_image_file(Path::new("a.JPG")));
        assert!(is_image_file(Path::new("a.jpeg")));
        assert!(!is_image_file(Path::new("a.gif")));
        assert!(!is_image_file(Path::new("png")));
    }

    #[test]
    fn test_empty_folder_path() {
        let output = scan(&request("sonic2", Path::new(""), 70.0), &CancellationGate::new())
            .expect("scan failed");
        assert!(output.candidates.is_empty());
        assert!(output.errors.is_empty());
    }

    #[test]
    fn test_missing_folder_is_reported() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let missing = dir.path().join("missing");
        let output = scan(&request("sonic2", &missing, 70.0), &CancellationGate::new())
            .expect("scan failed");
        assert!(output.candidates.is_empty());
        assert_eq!(output.errors.len(), 1);
    }

    #[test]
    fn test_scan_filters_and_ranks() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        touch(dir.path(), "sonik2.jpg");
        touch(dir.path(), "sonic2.png");
        touch(dir.path(), "tetris.png");
        touch(dir.path(), "sonic2.txt");
        fs::create_dir(dir.path().join("sonic2.jpeg")).expect("Failed to create dir");

        let output = scan(&request("sonic2", dir.path(), 70.0), &CancellationGate::new())
            .expect("scan failed");

        let names = output
            .candidates
            .iter()
            .map(|c| c.file_name())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["sonic2.png", "sonik2.jpg"]);
        assert_eq!(output.candidates[0].score, 100.0);
        assert!(output.candidates.iter().all(|c| c.score >= 70.0));
        assert!(output.errors.is_empty());
    }

    #[test]
    fn test_scan_caps_results() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        for i in 0..50 {
            touch(dir.path(), &format!("game{:02}.png", i));
        }

        let mut req = request("game", dir.path(), 0.0);
        req.max_results = 5;
        let output = scan(&req, &CancellationGate::new()).expect("scan failed");
        assert_eq!(output.candidates.len(), 5);
    }

    #[test]
    fn test_scan_cancelled() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        touch(dir.path(), "sonic2.png");

        let cancel = CancellationGate::new();
        cancel.cancel();
        let result = scan(&request("sonic2", dir.path(), 0.0), &cancel);
        assert!(matches!(result, Err(MatchError::Cancelled)));
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_name_is_reported() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = TempDir::new().expect("Failed to create temp dir");
        let bad_name = OsStr::from_bytes(b"sonic\xff.png");
        if File::create(dir.path().join(bad_name)).is_err() {
            // Some filesystems refuse non-UTF-8 names outright.
            return;
        }
        touch(dir.path(), "sonic2.png");

        let output = scan(&request("sonic2", dir.path(), 0.0), &CancellationGate::new())
            .expect("scan failed");
        assert_eq!(output.candidates.len(), 1);
        assert_eq!(output.errors.len(), 1);
        assert!(output.errors[0].contains("not valid UTF-8"));
    }

    #[test]
    fn test_select_top_is_stable() {
        let make = |name: &str, score: f64| {
            Candidate::new(PathBuf::from(name), name.to_string(), score)
        };
        let top = select_top(
            vec![make("a", 80.0), make("b", 90.0), make("c", 80.0), make("d", 70.0)],
            3,
        );
        let names = top.iter().map(|c| c.display_name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["b", "a", "c"]);
    }
}
