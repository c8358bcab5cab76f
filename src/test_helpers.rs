//! Shared test utilities for the delta-resize test suite.
//!
//! Synthetic images are generated in-process so tests never depend on
//! binary fixtures.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = tempfile::TempDir::new().unwrap();
//! write_png(&tmp.path().join("a.png"), 64, 48, 1);
//! let items = enumerate(tmp.path());
//! ```

use image::{DynamicImage, Rgb, RgbImage};
use std::path::Path;

use crate::types::InputItem;

// =========================================================================
// Synthetic images
// =========================================================================

/// Deterministic RGB gradient; `seed` shifts the pattern so distinct seeds
/// give distinct bytes.
pub fn gradient_image(width: u32, height: u32, seed: u32) -> DynamicImage {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            ((x * 7 + seed * 13) % 256) as u8,
            ((y * 5 + seed * 29) % 256) as u8,
            ((x + y + seed * 3) % 256) as u8,
        ])
    });
    DynamicImage::ImageRgb8(img)
}

/// Write a gradient PNG, creating parent directories.
pub fn write_png(path: &Path, width: u32, height: u32, seed: u32) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    gradient_image(width, height, seed).save(path).unwrap();
}

// =========================================================================
// Batch helpers
// =========================================================================

/// Build input items for every file directly or transitively under `root`,
/// sorted by relative path.
pub fn enumerate(root: &Path) -> Vec<InputItem> {
    crate::scan::scan(root, true).unwrap()
}

/// Assert the batch accounting identities hold for `stats`.
pub fn assert_consistent(stats: &crate::types::SessionStats, dispatched: usize) {
    assert_eq!(
        stats.processed + stats.skipped,
        dispatched,
        "processed + skipped must equal dispatched: {stats:?}"
    );
    assert_eq!(
        stats.upscaled + stats.downscaled + stats.kept_original + stats.synced,
        stats.processed,
        "action buckets must sum to processed: {stats:?}"
    );
}
