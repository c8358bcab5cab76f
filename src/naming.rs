//! Deterministic output naming.
//!
//! Every output name is a pure function of the source name, the transform
//! config and the batch timestamp:
//!
//! - `Holiday Photo (1).JPG` at 800px → `holiday_photo__1_800w_20260314_091500.webp`
//! - same, cropping → `holiday_photo__1_800x800_20260314_091500.webp`
//!
//! Outputs mirror the input tree under a session root named
//! `run_<timestamp>` (or `run_<timestamp>_test` for a verification pass).
//!
//! Distinct sources can sanitize to the same name (`Photo.png`, `photo.png`,
//! `photo.jpg`). [`batch_output_paths`] numbers the later ones in
//! relative-path order: `photo_800w_…`, `photo_2_800w_…`, `photo_3_800w_…`.

use crate::config::TransformConfig;
use crate::types::InputItem;
use chrono::{DateTime, TimeZone};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;

/// `strftime` layout of batch timestamps.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Used when a stem sanitizes to nothing.
const FALLBACK_STEM: &str = "image";

/// Format a batch timestamp.
pub fn batch_timestamp<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Lowercase alphanumerics, map everything else to `_`, trim `_` from both ends.
pub fn sanitize_stem(stem: &str) -> String {
    let mapped: String = stem
        .chars()
        .flat_map(|c| {
            if c.is_alphanumeric() {
                c.to_lowercase().collect::<Vec<_>>()
            } else {
                vec!['_']
            }
        })
        .collect();
    mapped.trim_matches('_').to_string()
}

/// Output filename for a source file name (not path). `number` appends
/// `_<n>` to the stem to tell colliding sources apart.
pub fn output_filename(
    source_name: &str,
    config: &TransformConfig,
    timestamp: &str,
    number: Option<u32>,
) -> String {
    let stem = Path::new(source_name)
        .file_stem()
        .map(|s| s.to_string_lossy())
        .unwrap_or_default();
    let mut clean = sanitize_stem(&stem);
    if clean.is_empty() {
        clean = FALLBACK_STEM.to_string();
    }
    if let Some(n) = number {
        clean = format!("{clean}_{n}");
    }
    let size = config.size();
    let size_suffix = if config.crop().is_some() {
        format!("{size}x{size}")
    } else {
        format!("{size}w")
    };
    format!(
        "{clean}_{size_suffix}_{timestamp}.{}",
        config.format().extension()
    )
}

/// Session root directory name.
pub fn session_dir_name(timestamp: &str, test_pass: bool) -> String {
    if test_pass {
        format!("run_{timestamp}_test")
    } else {
        format!("run_{timestamp}")
    }
}

/// Output path for an input, mirroring its relative directory under
/// `session_root`.
///
/// `relative_path` is `/`-separated, as produced by input enumeration.
pub fn mirrored_output_path(
    session_root: &Path,
    relative_path: &str,
    config: &TransformConfig,
    timestamp: &str,
    number: Option<u32>,
) -> PathBuf {
    let (dir, name) = match relative_path.rsplit_once('/') {
        Some((dir, name)) => (Some(dir), name),
        None => (None, relative_path),
    };
    let mut path = session_root.to_path_buf();
    if let Some(dir) = dir {
        path.extend(dir.split('/').filter(|part| !part.is_empty()));
    }
    path.join(output_filename(name, config, timestamp, number))
}

/// Output paths for a whole batch, index-aligned with `items`.
///
/// Items are visited in relative-path order. Each takes its plain mirrored
/// path unless an earlier item already holds it (compared case-insensitively),
/// in which case the first free `_2`, `_3`, … variant is used. The result
/// depends only on the set of items, not on their order in the slice.
pub fn batch_output_paths(
    session_root: &Path,
    items: &[InputItem],
    config: &TransformConfig,
    timestamp: &str,
) -> Vec<PathBuf> {
    let mut order: Vec<usize> = (0..items.len()).collect();
    order.sort_by(|&a, &b| items[a].relative_path.cmp(&items[b].relative_path));

    let mut taken = HashSet::new();
    let mut paths = vec![PathBuf::new(); items.len()];
    for index in order {
        let relative = items[index].relative_path.as_str();
        let mut number = None;
        let path = loop {
            let candidate = mirrored_output_path(session_root, relative, config, timestamp, number);
            if taken.insert(candidate.to_string_lossy().to_lowercase()) {
                break candidate;
            }
            number = Some(number.map_or(2, |n| n + 1));
        };
        if number.is_some() {
            debug!(item = relative, output = %path.display(), "output name taken, numbered");
        }
        paths[index] = path;
    }
    paths
}
