//! Input and output path checks, run before anything is spawned.

use limeout_core::{LimeoutError, Result};
use std::path::{Path, PathBuf};

/// Container extensions accepted as input.
pub const SUPPORTED_INPUT_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv", "webm", "m4v"];

/// WebM is the only output container that carries VP9 alpha.
pub const OUTPUT_EXTENSION: &str = "webm";

fn extension_lowercase(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// The input must exist, be a regular file and have a supported extension.
pub fn validate_input_path(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(LimeoutError::NotFound(format!(
            "Video file not found: {}",
            path.display()
        )));
    }
    if !path.is_file() {
        return Err(LimeoutError::invalid(format!(
            "Path is not a file: {}",
            path.display()
        )));
    }
    match extension_lowercase(path) {
        Some(ext) if SUPPORTED_INPUT_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
        other => Err(LimeoutError::UnsupportedFormat(format!(
            "{} (supported: .{})",
            other.map_or_else(|| "no extension".to_string(), |e| format!(".{e}")),
            SUPPORTED_INPUT_EXTENSIONS.join(" .")
        ))),
    }
}

/// The output must be `.webm`. Missing parent directories are created.
pub fn validate_output_path(path: &Path) -> Result<PathBuf> {
    if extension_lowercase(path).as_deref() != Some(OUTPUT_EXTENSION) {
        return Err(LimeoutError::UnsupportedFormat(format!(
            "output must be WebM for transparency support, got {}",
            path.display()
        )));
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
        if !parent.is_dir() {
            return Err(LimeoutError::invalid(format!(
                "output parent is not a directory: {}",
                parent.display()
            )));
        }
    }
    Ok(path.to_path_buf())
}

/// `<input stem>_transparent.webm` next to the input.
pub fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    input.with_file_name(format!("{stem}_transparent.{OUTPUT_EXTENSION}"))
}
