use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::matcher::Algorithm;
use crate::opt::*;

const APP_NAME: &str = "rom-cover-finder";
const APP_AUTHOR: &str = "rom-cover-finder";
const APP_QUALIFIER: &str = "com";

const SETTINGS_FILE_NAME: &str = "settings.json";
const SETTINGS_PATH_ENV: &str = "ROM_COVER_SETTINGS";

const DEFAULT_ROM_EXTENSIONS: &[&str] = &[
    "zip", "7z", "rar", "iso", "chd", "cue", "bin", "img", "nes", "sfc", "smc", "gb", "gbc",
    "gba", "nds", "md", "gen", "sms", "gg", "n64", "z64", "v64", "pce", "a26", "cso", "pbp",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub similarity_threshold: f64,
    pub max_images_to_load: usize,
    pub image_loader_max_retries: u32,
    #[serde(rename = "imageLoaderRetryDelayMilliseconds")]
    pub image_loader_retry_delay_ms: u64,
    pub image_loader_max_concurrency: usize,
    pub supported_extensions: Vec<String>,
    pub algorithm: String,
    pub image_folder: Option<PathBuf>,
    pub rom_folder: Option<PathBuf>,
    pub name_database_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            similarity_threshold: 70.0,
            max_images_to_load: 30,
            image_loader_max_retries: 3,
            image_loader_retry_delay_ms: 200,
            image_loader_max_concurrency: 4,
            supported_extensions: DEFAULT_ROM_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            algorithm: Algorithm::default().to_string(),
            image_folder: None,
            rom_folder: None,
            name_database_path: None,
        }
    }
}

impl Settings {
    pub fn load_from_file(path: &Path) -> Res<Settings> {
        if !path.exists() {
            return Ok(Settings::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|err| format!("Failed to read {}: {}", path.display(), err))?;
        serde_json::from_str(&contents)
            .map_err(|err| format!("Failed to parse {}: {}", path.display(), err))
    }

    pub fn save(&self, path: &Path) -> Res<()> {
        let content = serde_json::to_string_pretty(self).err_to_str()?;
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|err| format!("Failed to open {}: {}", path.display(), err))?;
        file.write_all(content.as_bytes()).err_to_str()
    }

    /// Copy with every limit pulled into its valid range.
    pub fn sanitized(&self) -> Settings {
        let mut settings = self.clone();
        settings.similarity_threshold = if settings.similarity_threshold.is_nan() {
            Settings::default().similarity_threshold
        } else {
            settings.similarity_threshold.clamp(0.0, 100.0)
        };
        settings.max_images_to_load = settings.max_images_to_load.max(1);
        settings.image_loader_max_concurrency = settings.image_loader_max_concurrency.max(1);
        settings
    }

    /// Updates one setting from its command-line spelling.
    pub fn set(&mut self, key: &str, value: &str) -> Res<()> {
        match key {
            "threshold" => {
                let threshold = value.parse::<f64>().err_to_str()?;
                if !(0.0..=100.0).contains(&threshold) {
                    return Err(format!("threshold must be within 0..100, got {}", threshold));
                }
                self.similarity_threshold = threshold;
            }
            "algorithm" => {
                let algorithm = Algorithm::from_name(value).err_to_str()?;
                self.algorithm = algorithm.to_string();
            }
            "max-images" => self.max_images_to_load = value.parse().err_to_str()?,
            "retries" => self.image_loader_max_retries = value.parse().err_to_str()?,
            "retry-delay" => self.image_loader_retry_delay_ms = value.parse().err_to_str()?,
            "concurrency" => self.image_loader_max_concurrency = value.parse().err_to_str()?,
            "images" => self.image_folder = optional_path(value),
            "roms" => self.rom_folder = optional_path(value),
            "names" => self.name_database_path = optional_path(value),
            "extensions" => {
                self.supported_extensions = value
                    .split(',')
                    .map(|ext| ext.trim().trim_start_matches('.').to_lowercase())
                    .filter(|ext| !ext.is_empty())
                    .collect();
            }
            _ => return Err(format!("unknown setting: {}", key)),
        }

        Ok(())
    }
}

fn optional_path(value: &str) -> Option<PathBuf> {
    if value.is_empty() {
        None
    } else {
        Some(PathBuf::from(value))
    }
}

/// `ROM_COVER_SETTINGS` if set, otherwise `settings.json` in the local data
/// directory, which is created on demand.
pub fn settings_file_path() -> Res<PathBuf> {
    if let Ok(path) = std::env::var(SETTINGS_PATH_ENV) {
        return Ok(PathBuf::from(path));
    }

    let project_dirs = ProjectDirs::from(APP_QUALIFIER, APP_AUTHOR, APP_NAME)
        .ok_or("Failed to get the project directory")?;
    let runtime_dir = project_dirs.data_local_dir();
    fs::create_dir_all(runtime_dir)
        .map_err(|err| format!("Failed to create {}: {}", runtime_dir.display(), err))?;

    Ok(runtime_dir.join(SETTINGS_FILE_NAME))
}
