//! Shared types used across the batch pipeline.
//!
//! Results and stats are serialized into the session report, so their
//! serde shape is part of the report format.

use crate::imaging::Dimensions;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// One file of a batch, as supplied by input enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputItem {
    /// Path relative to the batch root, `/`-separated.
    pub relative_path: String,
    /// Size of the source file in bytes.
    pub bytes: u64,
}

impl InputItem {
    pub fn new(relative_path: impl Into<String>, bytes: u64) -> Self {
        Self {
            relative_path: relative_path.into(),
            bytes,
        }
    }
}

/// What happened to an item's dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeAction {
    Upscaled,
    Downscaled,
    KeptOriginal,
    /// Output restored from the delta-sync cache; no transform ran.
    SyncedFromCache,
}

impl fmt::Display for ResizeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ResizeAction::Upscaled => "upscaled",
            ResizeAction::Downscaled => "downscaled",
            ResizeAction::KeptOriginal => "kept original",
            ResizeAction::SyncedFromCache => "synced (cached)",
        };
        f.write_str(label)
    }
}

/// Details of a successfully written output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedOutput {
    /// Absent for cache restores, where the source is never decoded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original: Option<Dimensions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<Dimensions>,
    pub action: ResizeAction,
    pub output_path: PathBuf,
    pub output_bytes: u64,
    pub summary: String,
}

/// Per-item outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemStatus {
    Success(ProcessedOutput),
    Skipped { reason: String },
    Failed { reason: String },
}

/// Result of processing one [`InputItem`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub relative_path: String,
    #[serde(flatten)]
    pub status: ItemStatus,
}

/// Aggregate counters for one batch.
///
/// Identities (checked by tests):
/// - `processed + skipped == dispatched`
/// - `upscaled + downscaled + kept_original + synced == processed`
///
/// `failed` is the subset of `skipped` that errored rather than being
/// deliberately passed over. `cancelled` counts items never dispatched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    pub dispatched: usize,
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub upscaled: usize,
    pub downscaled: usize,
    pub kept_original: usize,
    pub synced: usize,
    pub cancelled: usize,
    pub input_bytes: u64,
    pub output_bytes: u64,
}

impl SessionStats {
    /// Fold one result into the counters. Order-independent.
    pub fn record(&mut self, item: &InputItem, result: &ProcessingResult) {
        self.dispatched += 1;
        match &result.status {
            ItemStatus::Success(out) => {
                self.processed += 1;
                self.input_bytes += item.bytes;
                self.output_bytes += out.output_bytes;
                match out.action {
                    ResizeAction::Upscaled => self.upscaled += 1,
                    ResizeAction::Downscaled => self.downscaled += 1,
                    ResizeAction::KeptOriginal => self.kept_original += 1,
                    ResizeAction::SyncedFromCache => self.synced += 1,
                }
            }
            ItemStatus::Skipped { .. } => self.skipped += 1,
            ItemStatus::Failed { .. } => {
                self.skipped += 1;
                self.failed += 1;
            }
        }
    }

    /// Input bytes per output byte over processed items (`2.5` reads `2.5:1`).
    pub fn compression_ratio(&self) -> Option<f64> {
        (self.output_bytes > 0).then(|| self.input_bytes as f64 / self.output_bytes as f64)
    }
}
