//! CLI output formatting.
//!
//! # Output Format
//!
//! ## Plan
//!
//! ```text
//! Preview
//!     Images:   42
//!     Format:   WEBP
//!     Size:     800px (short edge)
//!     Quality:  85
//!     Crop:     none
//!     Upscale:  no
//! Breakdown
//!     (-) downscale: 30
//!     (+) upscale:   0
//!     (=) keep:      12
//! ```
//!
//! ## Run
//!
//! One line per item, in completion order:
//!
//! ```text
//! [OK]   trips/a.jpg                    | 800x1200   |    182 KB | 1000x1500 → 800x1200 (downscaled), Q85
//! [SYNC] trips/b.jpg                    | cached     |    170 KB | Delta Sync Restore
//! [SKIP] raw/c.cr3                      | Exiftool not found for CR3 conversion
//! [FAIL] broken.png                     | Failed to decode: …
//! ```
//!
//! followed by a summary block.
//!
//! # Architecture
//!
//! Each display has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions do no I/O.

use crate::config::TransformConfig;
use crate::process::{BatchOutcome, BatchPlan, ProcessEvent};
use crate::types::{ItemStatus, ProcessingResult};
use std::path::Path;

/// Width of the path column in item lines.
const PATH_WIDTH: usize = 30;

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Whole kibibytes, rounded down.
fn kib(bytes: u64) -> u64 {
    bytes / 1024
}

/// Format byte counts for humans: `512 B`, `12.3 KB`, `4.56 MB`.
pub fn human_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    let b = bytes as f64;
    if b >= MB {
        format!("{:.2} MB", b / MB)
    } else if b >= KB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{bytes} B")
    }
}

// ============================================================================
// Plan
// ============================================================================

pub fn format_plan(plan: &BatchPlan, config: &TransformConfig) -> Vec<String> {
    let crop = match config.crop() {
        Some(crop) => format!("{} ({})", crop.aspect, crop.anchor),
        None => "none".to_string(),
    };
    let mut lines = vec![
        "Preview".to_string(),
        format!("{}Images:   {}", indent(1), plan.total()),
        format!("{}Format:   {}", indent(1), config.format()),
        format!("{}Size:     {}px (short edge)", indent(1), config.size()),
        format!("{}Quality:  {}", indent(1), config.quality().value()),
        format!("{}Crop:     {}", indent(1), crop),
        format!(
            "{}Upscale:  {}",
            indent(1),
            if config.allow_upscale() { "yes" } else { "no" }
        ),
        "Breakdown".to_string(),
        format!("{}(-) downscale: {}", indent(1), plan.downscale),
        format!("{}(+) upscale:   {}", indent(1), plan.upscale),
        format!("{}(=) keep:      {}", indent(1), plan.keep),
    ];
    if plan.failed > 0 {
        lines.push(format!("{}(!) unreadable: {}", indent(1), plan.failed));
    }
    lines
}

pub fn print_plan(plan: &BatchPlan, config: &TransformConfig) {
    for line in format_plan(plan, config) {
        println!("{}", line);
    }
}

// ============================================================================
// Run
// ============================================================================

/// Format one item result as a single line.
pub fn format_result(result: &ProcessingResult) -> String {
    let path = &result.relative_path;
    match &result.status {
        ItemStatus::Success(out) => {
            let (tag, dims) = match out.dimensions {
                Some(d) => ("[OK]  ", d.to_string()),
                None => ("[SYNC]", "cached".to_string()),
            };
            format!(
                "{tag} {path:<PATH_WIDTH$} | {dims:<10} | {:>6} KB | {}",
                kib(out.output_bytes),
                out.summary
            )
        }
        ItemStatus::Skipped { reason } => format!("[SKIP] {path:<PATH_WIDTH$} | {reason}"),
        ItemStatus::Failed { reason } => format!("[FAIL] {path:<PATH_WIDTH$} | {reason}"),
    }
}

pub fn format_process_event(event: &ProcessEvent) -> Vec<String> {
    match event {
        ProcessEvent::Started { total, workers } => {
            vec![format!("Processing {total} images with {workers} workers")]
        }
        ProcessEvent::ItemFinished { result, .. } => vec![format_result(result)],
    }
}

/// Format the end-of-batch summary.
pub fn format_summary(outcome: &BatchOutcome, session_root: &Path) -> Vec<String> {
    let stats = &outcome.stats;
    let mut lines = vec![if outcome.cancelled {
        "Cancelled".to_string()
    } else {
        "Complete".to_string()
    }];
    lines.push(format!("{}Processed:   {}", indent(1), stats.processed));
    lines.push(format!("{}Skipped:     {}", indent(1), stats.skipped));
    if stats.failed > 0 {
        lines.push(format!("{}  of which failed: {}", indent(1), stats.failed));
    }
    if stats.cancelled > 0 {
        lines.push(format!("{}Not started: {}", indent(1), stats.cancelled));
    }
    lines.push(format!("{}Input:       {}", indent(1), human_bytes(stats.input_bytes)));
    lines.push(format!("{}Output:      {}", indent(1), human_bytes(stats.output_bytes)));
    if let Some(ratio) = stats.compression_ratio() {
        lines.push(format!("{}Compression: {:.1}:1", indent(1), ratio));
    }
    lines.push(format!(
        "{}Time:        {:.2}s",
        indent(1),
        outcome.elapsed.as_secs_f64()
    ));
    lines.push("Resize".to_string());
    lines.push(format!("{}(+) upscaled:   {}", indent(1), stats.upscaled));
    lines.push(format!("{}(-) downscaled: {}", indent(1), stats.downscaled));
    lines.push(format!("{}(=) kept:       {}", indent(1), stats.kept_original));
    lines.push(format!("{}(~) synced:     {}", indent(1), stats.synced));
    lines.push(format!("Cache: {}", outcome.cache_stats));
    lines.push(format!("Output: {}", session_root.display()));
    lines
}

pub fn print_summary(outcome: &BatchOutcome, session_root: &Path) {
    for line in format_summary(outcome, session_root) {
        println!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheStats;
    use crate::imaging::Dimensions;
    use crate::types::{InputItem, ProcessedOutput, ResizeAction, SessionStats};
    use std::path::PathBuf;
    use std::time::Duration;

    fn transformed() -> ProcessingResult {
        ProcessingResult {
            relative_path: "trips/a.jpg".into(),
            status: ItemStatus::Success(ProcessedOutput {
                original: Some(Dimensions::new(1000, 1500)),
                dimensions: Some(Dimensions::new(800, 1200)),
                action: ResizeAction::Downscaled,
                output_path: PathBuf::from("out/a.webp"),
                output_bytes: 186_880,
                summary: "1000x1500 → 800x1200 (downscaled), Q85".into(),
            }),
        }
    }

    #[test]
    fn transformed_line() {
        assert_eq!(
            format_result(&transformed()),
            "[OK]   trips/a.jpg                    | 800x1200   |    182 KB | 1000x1500 → 800x1200 (downscaled), Q85"
        );
    }

    #[test]
    fn synced_line() {
        let result = ProcessingResult {
            relative_path: "b.jpg".into(),
            status: ItemStatus::Success(ProcessedOutput {
                original: None,
                dimensions: None,
                action: ResizeAction::SyncedFromCache,
                output_path: PathBuf::from("out/b.webp"),
                output_bytes: 2048,
                summary: "Delta Sync Restore".into(),
            }),
        };
        let line = format_result(&result);
        assert!(line.starts_with("[SYNC] b.jpg "));
        assert!(line.contains("| cached     |      2 KB | Delta Sync Restore"));
    }

    #[test]
    fn skipped_and_failed_lines() {
        let skipped = ProcessingResult {
            relative_path: "c.cr3".into(),
            status: ItemStatus::Skipped {
                reason: "CR3 extraction failed".into(),
            },
        };
        assert!(format_result(&skipped).starts_with("[SKIP] c.cr3"));
        assert!(format_result(&skipped).ends_with("| CR3 extraction failed"));

        let failed = ProcessingResult {
            relative_path: "d.png".into(),
            status: ItemStatus::Failed {
                reason: "boom".into(),
            },
        };
        assert!(format_result(&failed).starts_with("[FAIL] d.png"));
    }

    #[test]
    fn started_event_line() {
        let lines = format_process_event(&ProcessEvent::Started {
            total: 5,
            workers: 2,
        });
        assert_eq!(lines, vec!["Processing 5 images with 2 workers"]);
    }

    #[test]
    fn human_bytes_units() {
        assert_eq!(human_bytes(512), "512 B");
        assert_eq!(human_bytes(1536), "1.5 KB");
        assert_eq!(human_bytes(3 * 1024 * 1024), "3.00 MB");
    }

    #[test]
    fn plan_lists_breakdown() {
        let plan = BatchPlan {
            downscale: 3,
            upscale: 1,
            keep: 2,
            failed: 0,
        };
        let lines = format_plan(&plan, &TransformConfig::default());
        assert!(lines.contains(&"    Images:   6".to_string()));
        assert!(lines.contains(&"    Format:   WEBP".to_string()));
        assert!(lines.contains(&"    (-) downscale: 3".to_string()));
        assert!(!lines.iter().any(|l| l.contains("unreadable")));
    }

    #[test]
    fn summary_mentions_cancellation_and_cache() {
        let mut stats = SessionStats::default();
        stats.record(&InputItem::new("trips/a.jpg", 400_000), &transformed());
        stats.cancelled = 2;
        let outcome = BatchOutcome {
            stats,
            cache_stats: CacheStats {
                hits: 0,
                stale: 0,
                misses: 1,
            },
            results: vec![transformed()],
            workers: 2,
            cancelled: true,
            elapsed: Duration::from_secs(3),
        };
        let lines = format_summary(&outcome, Path::new("out/run_ts"));
        assert_eq!(lines[0], "Cancelled");
        assert!(lines.contains(&"    Not started: 2".to_string()));
        assert!(lines.contains(&"    (-) downscaled: 1".to_string()));
        assert!(lines.contains(&"Cache: 1 encoded".to_string()));
        assert_eq!(lines.last().unwrap(), "Output: out/run_ts");
    }
}
