use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use plate_core::RunSummary;
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("output directory missing or not writable: {0}")]
    OutputDir(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("could not encode summary: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub available_filename: String,
    pub manifest_filename: Option<String>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            available_filename: "available.txt".to_string(),
            manifest_filename: Some("summary.json".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportPaths {
    pub available_path: PathBuf,
    pub manifest_path: Option<PathBuf>,
}

/// Writes the available list (one candidate per line) and, optionally, the
/// whole summary as JSON. Each file is replaced atomically.
pub fn write_summary(
    output_dir: &Path,
    summary: &RunSummary,
    options: &ExportOptions,
) -> Result<ExportPaths, ExportError> {
    ensure_output_dir(output_dir)?;

    let mut listing = summary.available.join("\n");
    if !listing.is_empty() {
        listing.push('\n');
    }
    let available_path = write_atomic(output_dir, &options.available_filename, &listing)?;

    let manifest_path = match &options.manifest_filename {
        Some(name) => {
            let manifest = serde_json::to_string_pretty(summary)?;
            Some(write_atomic(output_dir, name, &manifest)?)
        }
        None => None,
    };

    Ok(ExportPaths {
        available_path,
        manifest_path,
    })
}

/// Ensure output directory exists; create if missing.
pub fn ensure_output_dir(dir: &Path) -> Result<(), ExportError> {
    if dir.exists() {
        let meta = fs::metadata(dir).map_err(|e| ExportError::OutputDir(e.to_string()))?;
        if !meta.is_dir() {
            return Err(ExportError::OutputDir(format!("{} is not a directory", dir.display())));
        }
        return Ok(());
    }
    fs::create_dir_all(dir).map_err(|e| ExportError::OutputDir(e.to_string()))
}

fn write_atomic(dir: &Path, filename: &str, content: &str) -> Result<PathBuf, ExportError> {
    let target = dir.join(filename);
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.flush()?;
    tmp.as_file_mut().sync_all()?;
    tmp.persist(&target).map_err(|e| ExportError::Io(e.error))?;
    Ok(target)
}
