//! RAW preview extraction.
//!
//! RAW files are not decoded directly. Instead an external tool writes the
//! embedded JPEG preview to a scratch file and reports the orientation tag,
//! and the pipeline processes that preview like any other input.
//!
//! | Extension | Tool | Commands |
//! |---|---|---|
//! | `cr3` | `exiftool` | `-b -PreviewImage`, `-S -Orientation#` |
//!
//! When the tool is missing the item is skipped, never failed, and the
//! batch continues.

use image::metadata::Orientation;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tracing::debug;

/// Extensions routed through preview extraction.
pub const RAW_EXTENSIONS: &[&str] = &["cr3"];

/// Skip reason when the extraction tool is not installed.
pub const TOOL_MISSING_REASON: &str = "Exiftool not found for CR3 conversion";

/// Skip reason when the tool ran but produced no usable preview.
pub const EXTRACTION_FAILED_REASON: &str = "CR3 extraction failed";

#[derive(Error, Debug)]
pub enum RawError {
    #[error("{0} is not available")]
    ToolUnavailable(String),
    #[error("Preview extraction failed for {path}: {message}")]
    ExtractionFailed { path: PathBuf, message: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RawError {
    /// Reason recorded on the skipped item.
    pub fn skip_reason(&self) -> &'static str {
        match self {
            RawError::ToolUnavailable(_) => TOOL_MISSING_REASON,
            _ => EXTRACTION_FAILED_REASON,
        }
    }
}

/// Whether `path` is handled through preview extraction.
pub fn is_raw(path: &Path) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .is_some_and(|e| RAW_EXTENSIONS.contains(&e.as_str()))
}

/// An extracted preview on disk. The caller removes the file when done.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPreview {
    pub path: PathBuf,
    /// Orientation reported by the tool, when it reported one.
    pub orientation: Option<Orientation>,
}

/// Extracts a decodable preview from a RAW file.
///
/// `Sync` because one extractor is shared by every worker.
pub trait PreviewExtractor: Sync {
    /// Whether the underlying tool can be run at all.
    fn is_available(&self) -> bool;

    /// Write the preview of `source` into `scratch_dir`.
    fn extract(&self, source: &Path, scratch_dir: &Path) -> Result<RawPreview, RawError>;
}

/// [`PreviewExtractor`] backed by the `exiftool` command.
#[derive(Debug)]
pub struct ExiftoolExtractor {
    program: PathBuf,
    available: OnceLock<bool>,
    counter: AtomicU64,
}

impl Default for ExiftoolExtractor {
    fn default() -> Self {
        Self::with_program("exiftool")
    }
}

impl ExiftoolExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific executable instead of `exiftool` from `PATH`.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            available: OnceLock::new(),
            counter: AtomicU64::new(0),
        }
    }

    fn read_orientation(&self, source: &Path) -> Option<Orientation> {
        let output = Command::new(&self.program)
            .args(["-S", "-Orientation#"])
            .arg(source)
            .output()
            .ok()?;
        if !output.status.success() {
            return None;
        }
        parse_orientation(&String::from_utf8_lossy(&output.stdout))
    }
}

impl PreviewExtractor for ExiftoolExtractor {
    fn is_available(&self) -> bool {
        *self.available.get_or_init(|| {
            Command::new(&self.program)
                .arg("-ver")
                .output()
                .map(|o| o.status.success())
                .unwrap_or(false)
        })
    }

    fn extract(&self, source: &Path, scratch_dir: &Path) -> Result<RawPreview, RawError> {
        if !self.is_available() {
            return Err(RawError::ToolUnavailable(self.program.display().to_string()));
        }
        let failed = |message: String| RawError::ExtractionFailed {
            path: source.to_path_buf(),
            message,
        };

        let output = Command::new(&self.program)
            .args(["-b", "-PreviewImage"])
            .arg(source)
            .output()?;
        if !output.status.success() {
            return Err(failed(String::from_utf8_lossy(&output.stderr).trim().to_string()));
        }
        if output.stdout.is_empty() {
            return Err(failed("no embedded preview".into()));
        }

        std::fs::create_dir_all(scratch_dir)?;
        let stem = source
            .file_stem()
            .map(|s| crate::naming::sanitize_stem(&s.to_string_lossy()))
            .unwrap_or_default();
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        let path = scratch_dir.join(format!("{stem}_{n}_preview.jpg"));
        std::fs::write(&path, &output.stdout)?;

        let orientation = self.read_orientation(source);
        debug!(source = %source.display(), preview = %path.display(), ?orientation, "extracted RAW preview");
        Ok(RawPreview { path, orientation })
    }
}

/// Parse `exiftool -S -Orientation#` output (`Orientation: 6` or `6`).
pub fn parse_orientation(output: &str) -> Option<Orientation> {
    let value: u8 = output.split_whitespace().last()?.parse().ok()?;
    Orientation::from_exif(value)
}
