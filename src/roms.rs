use std::fs;
use std::path::{Path, PathBuf};

use crate::models::DecodedImage;
use crate::opt::*;

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            extensions
                .iter()
                .any(|supported| supported.trim_start_matches('.').eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

/// ROM files directly inside `folder`, sorted by name.
pub fn list_roms(folder: &Path, extensions: &[String]) -> Res<Vec<PathBuf>> {
    let entries = fs::read_dir(folder)
        .map_err(|err| format!("Unable to read folder {}: {}", folder.display(), err))?;

    let mut roms = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && has_extension(path, extensions))
        .collect::<Vec<_>>();
    roms.sort();

    Ok(roms)
}

/// The name a ROM is matched by: its file name without extension.
pub fn rom_name(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(|stem| stem.to_string())
}

const RESERVED_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// `name` as a single file name component: separators and characters
/// Windows rejects become `_`, and leading or trailing dots are dropped.
fn export_stem(name: &str) -> Res<String> {
    let stem = name
        .trim()
        .chars()
        .map(|c| {
            if RESERVED_CHARS.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect::<String>();
    let stem = stem.trim_matches('.');
    if stem.is_empty() {
        return Err(format!("Invalid export name \"{}\"", name));
    }

    Ok(stem.to_string())
}

/// Writes `image` as `<rom_name>.png` into `out_dir`.
pub fn export_image(image: &DecodedImage, out_dir: &Path, rom_name: &str) -> Res<PathBuf> {
    let stem = export_stem(rom_name)?;
    fs::create_dir_all(out_dir)
        .map_err(|err| format!("Failed to create {}: {}", out_dir.display(), err))?;

    let path = out_dir.join(format!("{}.png", stem));
    fs::write(&path, image.png_bytes())
        .map_err(|err| format!("Failed to write {}: {}", path.display(), err))?;

    Ok(path)
}
