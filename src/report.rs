//! Session report: the machine-readable record of one batch.
//!
//! Written as `session.json` in the session root once the batch ends,
//! including cancelled batches.
//!
//! ```json
//! {
//!   "version": "0.1.0",
//!   "timestamp": "20260314_091500",
//!   "input_root": "photos",
//!   "session_root": "out/run_20260314_091500",
//!   "test_pass": false,
//!   "config": { "format": "webp", "size": 800, … },
//!   "workers": 12,
//!   "cancelled": false,
//!   "elapsed_secs": 4.2,
//!   "stats": { "processed": 40, "skipped": 1, … },
//!   "cache": { "hits": 12, "stale": 0, "misses": 29 },
//!   "compression_ratio": 6.1,
//!   "results": [ { "relative_path": "a.jpg", "status": "success", … } ]
//! }
//! ```

use crate::cache::CacheStats;
use crate::config::{TransformConfig, TransformSettings};
use crate::process::{BatchOutcome, write_atomic};
use crate::types::{ProcessingResult, SessionStats};
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};

/// Name of the report file inside the session root.
pub const REPORT_FILENAME: &str = "session.json";

#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub version: &'static str,
    pub timestamp: String,
    pub input_root: PathBuf,
    pub session_root: PathBuf,
    pub test_pass: bool,
    pub config: TransformSettings,
    pub workers: usize,
    pub cancelled: bool,
    pub elapsed_secs: f64,
    pub stats: SessionStats,
    pub cache: CacheStats,
    pub compression_ratio: Option<f64>,
    pub results: Vec<ProcessingResult>,
}

/// Where a batch ran, for the report header.
#[derive(Debug, Clone)]
pub struct SessionInfo<'a> {
    pub timestamp: &'a str,
    pub input_root: &'a Path,
    pub session_root: &'a Path,
    pub test_pass: bool,
    pub config: &'a TransformConfig,
}

impl SessionReport {
    pub fn new(info: &SessionInfo<'_>, outcome: &BatchOutcome) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            timestamp: info.timestamp.to_string(),
            input_root: info.input_root.to_path_buf(),
            session_root: info.session_root.to_path_buf(),
            test_pass: info.test_pass,
            config: info.config.clone().into(),
            workers: outcome.workers,
            cancelled: outcome.cancelled,
            elapsed_secs: outcome.elapsed.as_secs_f64(),
            stats: outcome.stats.clone(),
            cache: outcome.cache_stats.clone(),
            compression_ratio: outcome.stats.compression_ratio(),
            results: outcome.results.clone(),
        }
    }

    /// Write to `<session_root>/session.json`, returning the path.
    pub fn write(&self) -> io::Result<PathBuf> {
        let path = self.session_root.join(REPORT_FILENAME);
        let json = serde_json::to_string_pretty(self)?;
        write_atomic(&path, json.as_bytes())?;
        Ok(path)
    }
}
