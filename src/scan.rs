//! Input enumeration.
//!
//! Walks an input directory and produces the ordered [`InputItem`] list a
//! batch runs over. The scheduler itself never scans or filters.
//!
//! ## Rules
//!
//! - Only files with a supported extension are listed (case-insensitive):
//!   every extension with a compiled-in decoder, plus the RAW extensions
//!   handled through [`raw`](crate::raw).
//! - Hidden entries (leading `.`) are skipped, which keeps the delta-sync
//!   cache document out of a batch when input and output overlap.
//! - Non-recursive scans list only the top level.
//! - Items are sorted by relative path; relative paths use `/` separators.

use crate::imaging::supported_input_extensions;
use crate::raw::RAW_EXTENSIONS;
use crate::types::InputItem;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Input is not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("Failed to walk input directory: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Whether `path` has an extension the pipeline can process.
pub fn is_supported(path: &Path) -> bool {
    let Some(ext) = path.extension() else {
        return false;
    };
    let ext = ext.to_string_lossy().to_lowercase();
    supported_input_extensions().contains(&ext.as_str()) || RAW_EXTENSIONS.contains(&ext.as_str())
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0 && entry.file_name().to_string_lossy().starts_with('.')
}

/// Enumerate supported files under `root`.
pub fn scan(root: &Path, recursive: bool) -> Result<Vec<InputItem>, ScanError> {
    if !root.is_dir() {
        return Err(ScanError::NotADirectory(root.to_path_buf()));
    }

    let walker = WalkDir::new(root)
        .max_depth(if recursive { usize::MAX } else { 1 })
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_hidden(e));

    let mut items = Vec::new();
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() || !is_supported(entry.path()) {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        items.push(InputItem::new(relative, entry.metadata()?.len()));
    }

    items.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(items)
}
