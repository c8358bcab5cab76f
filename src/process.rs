//! Batch scheduling: fingerprint, sync from cache or transform, write, tally.
//!
//! ## Per-item flow
//!
//! ```text
//! pending ─┬─ fingerprint hit + artifact on disk ──→ copy  ──→ success (synced)
//!          └─ miss / stale / no fingerprint ──────→ transform → write → cache put
//!                                                              └──→ failed | skipped
//! ```
//!
//! A failed cache copy falls through to a full transform.
//!
//! ## Concurrency
//!
//! Items run on a dedicated [rayon](https://docs.rs/rayon) pool sized per
//! batch. Two independent locks are involved:
//!
//! - the cache lock, inside [`DeltaCache`], held for single map operations
//! - the progress lock, guarding [`SessionStats`] and the result list
//!
//! Completion order is unspecified; the counters are commutative, so the
//! final stats do not depend on it.
//!
//! ## Cancellation
//!
//! A [`CancellationToken`] is checked before each item starts. Items already
//! running finish normally; items never started are counted as `cancelled`.
//! The cache is saved once at batch end whether or not the batch completed.
//!
//! ## Output files
//!
//! Outputs and cache restores are written to a hidden temp file in the
//! destination directory and renamed into place, so an interrupted write
//! never leaves a truncated file under a final name.

use crate::cache::{CacheEntry, CacheStats, DeltaCache};
use crate::config::{MAX_WORKERS, TransformConfig};
use crate::fingerprint::fingerprint;
use crate::imaging::{BackendError, Dimensions, ImageBackend, SourceImage, TransformOutput, plan_resize, transform};
use crate::naming::batch_output_paths;
use crate::raw::{PreviewExtractor, RawError, is_raw};
use crate::types::{InputItem, ItemStatus, ProcessedOutput, ProcessingResult, ResizeAction, SessionStats};
use rayon::prelude::*;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Scratch directory for RAW previews, inside the session root.
const SCRATCH_DIR: &str = ".raw-previews";

/// Batch setup failures. Per-item problems never surface here.
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Failed to start worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Why a single item did not produce an output.
#[derive(Error, Debug)]
pub enum ItemError {
    #[error("{0}")]
    Image(#[from] BackendError),
    #[error("{0}")]
    Raw(#[from] RawError),
    #[error("Failed to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

impl ItemError {
    /// RAW extraction problems skip the item; everything else fails it.
    pub fn into_status(self) -> ItemStatus {
        match self {
            ItemError::Raw(e) => ItemStatus::Skipped {
                reason: e.skip_reason().to_string(),
            },
            other => ItemStatus::Failed {
                reason: other.to_string(),
            },
        }
    }
}

/// Cooperative stop signal shared between the caller and the scheduler.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Progress notifications, sent as items complete.
#[derive(Debug, Clone)]
pub enum ProcessEvent {
    Started {
        total: usize,
        workers: usize,
    },
    ItemFinished {
        /// Items finished so far, including this one.
        completed: usize,
        total: usize,
        result: ProcessingResult,
    },
}

/// Everything a batch needs to know about its inputs and outputs.
#[derive(Debug, Clone)]
pub struct Batch<'a> {
    pub items: &'a [InputItem],
    pub input_root: &'a Path,
    /// Session output root; outputs mirror the input tree below it.
    pub session_root: &'a Path,
    /// Batch timestamp used in output names.
    pub timestamp: &'a str,
    pub config: &'a TransformConfig,
    pub workers: usize,
}

/// Final state of a batch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    pub stats: SessionStats,
    pub cache_stats: CacheStats,
    /// Per-item results, sorted by relative path.
    pub results: Vec<ProcessingResult>,
    pub workers: usize,
    pub cancelled: bool,
    #[serde(serialize_with = "serialize_secs")]
    pub elapsed: Duration,
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

/// Counters and results behind the progress lock.
#[derive(Default)]
struct Progress {
    stats: SessionStats,
    cache_stats: CacheStats,
    results: Vec<ProcessingResult>,
}

/// How the cache took part in one item.
enum CacheUse {
    Hit,
    Stale,
    Miss,
}

struct Worker<'a, B: ImageBackend> {
    backend: &'a B,
    extractor: &'a dyn PreviewExtractor,
    cache: &'a DeltaCache,
    batch: &'a Batch<'a>,
    scratch: PathBuf,
}

/// Run a batch to completion or cancellation.
///
/// Only setup failures (session root, worker pool) return `Err`; every
/// per-item problem is recorded in the outcome.
pub fn run_batch<B: ImageBackend>(
    backend: &B,
    extractor: &dyn PreviewExtractor,
    cache: &DeltaCache,
    batch: &Batch<'_>,
    cancel: &CancellationToken,
    events: Option<Sender<ProcessEvent>>,
) -> Result<BatchOutcome, ProcessError> {
    let started = Instant::now();
    let workers = batch.workers.clamp(1, MAX_WORKERS);
    let total = batch.items.len();

    fs::create_dir_all(batch.session_root)?;
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("resize-worker-{i}"))
        .build()?;

    info!(
        items = total,
        workers,
        root = %batch.session_root.display(),
        cache = %cache.path().display(),
        cached_entries = cache.len(),
        "batch started"
    );
    if let Some(tx) = &events {
        tx.send(ProcessEvent::Started { total, workers }).ok();
    }

    let worker = Worker {
        backend,
        extractor,
        cache,
        batch,
        scratch: batch.session_root.join(SCRATCH_DIR),
    };
    let progress = Mutex::new(Progress::default());
    let output_paths = batch_output_paths(
        batch.session_root,
        batch.items,
        batch.config,
        batch.timestamp,
    );

    pool.install(|| {
        batch.items.par_iter().zip(output_paths.par_iter()).for_each(|(item, output_path)| {
            if cancel.is_cancelled() {
                return;
            }
            let (result, cache_use) = worker.process_item(item, output_path);

            let mut p = progress.lock().unwrap_or_else(PoisonError::into_inner);
            p.stats.record(item, &result);
            match cache_use {
                CacheUse::Hit => p.cache_stats.hit(),
                CacheUse::Stale => {
                    p.cache_stats.stale();
                    p.cache_stats.miss();
                }
                CacheUse::Miss => p.cache_stats.miss(),
            }
            let completed = p.stats.dispatched;
            if let Some(tx) = &events {
                tx.send(ProcessEvent::ItemFinished {
                    completed,
                    total,
                    result: result.clone(),
                })
                .ok();
            }
            p.results.push(result);
        });
    });

    cache.save();
    if worker.scratch.exists()
        && let Err(e) = fs::remove_dir_all(&worker.scratch)
    {
        debug!(error = %e, "could not remove RAW scratch directory");
    }

    let Progress {
        mut stats,
        cache_stats,
        mut results,
    } = progress.into_inner().unwrap_or_else(PoisonError::into_inner);
    stats.cancelled = total - stats.dispatched;
    results.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    let cancelled = cancel.is_cancelled() && stats.cancelled > 0;

    info!(
        processed = stats.processed,
        skipped = stats.skipped,
        cancelled = stats.cancelled,
        cache = %cache_stats,
        "batch finished"
    );

    Ok(BatchOutcome {
        stats,
        cache_stats,
        results,
        workers,
        cancelled,
        elapsed: started.elapsed(),
    })
}

impl<B: ImageBackend> Worker<'_, B> {
    fn process_item(&self, item: &InputItem, output_path: &Path) -> (ProcessingResult, CacheUse) {
        let batch = self.batch;
        let source = batch.input_root.join(&item.relative_path);
        let output_path = output_path.to_path_buf();
        let digest = fingerprint(&source, batch.config);

        let mut cache_use = CacheUse::Miss;
        if let Some(entry) = digest.as_deref().and_then(|d| self.cache.get(d)) {
            if entry.artifact_exists() {
                match copy_atomic(&entry.output_path, &output_path) {
                    Ok(bytes) => {
                        debug!(item = %item.relative_path, from = %entry.output_path.display(), "synced from cache");
                        let result = ProcessingResult {
                            relative_path: item.relative_path.clone(),
                            status: ItemStatus::Success(ProcessedOutput {
                                original: None,
                                dimensions: None,
                                action: ResizeAction::SyncedFromCache,
                                output_path,
                                output_bytes: bytes,
                                summary: "Delta Sync Restore".to_string(),
                            }),
                        };
                        return (result, CacheUse::Hit);
                    }
                    Err(e) => {
                        warn!(item = %item.relative_path, error = %e, "cache restore failed, reprocessing");
                    }
                }
            } else {
                cache_use = CacheUse::Stale;
            }
        }

        let status = match self.transform_item(&source, &output_path) {
            Ok(out) => {
                if let Some(digest) = digest {
                    self.cache.put(digest, CacheEntry::new(&output_path));
                }
                debug!(item = %item.relative_path, action = %out.action, quality = %out.quality, "transformed");
                ItemStatus::Success(ProcessedOutput {
                    original: Some(out.original),
                    dimensions: Some(out.dimensions),
                    action: out.action,
                    summary: describe(&out),
                    output_bytes: out.bytes.len() as u64,
                    output_path,
                })
            }
            Err(e) => {
                debug!(item = %item.relative_path, error = %e, "item not processed");
                e.into_status()
            }
        };
        let result = ProcessingResult {
            relative_path: item.relative_path.clone(),
            status,
        };
        (result, cache_use)
    }

    fn transform_item(&self, source: &Path, output_path: &Path) -> Result<TransformOutput, ItemError> {
        let loaded = if is_raw(source) {
            self.load_raw(source)?
        } else {
            self.backend.load(source)?
        };
        let out = transform(self.backend, loaded, self.batch.config)?;

        let write_err = |e: io::Error| ItemError::Write {
            path: output_path.to_path_buf(),
            source: e,
        };
        if let Some(parent) = output_path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        write_atomic(output_path, &out.bytes).map_err(write_err)?;
        Ok(out)
    }

    fn load_raw(&self, source: &Path) -> Result<SourceImage, ItemError> {
        if !self.extractor.is_available() {
            return Err(RawError::ToolUnavailable("exiftool".into()).into());
        }
        let preview = self.extractor.extract(source, &self.scratch)?;
        let loaded = self.backend.load(&preview.path);
        fs::remove_file(&preview.path).ok();

        let mut loaded = loaded?;
        if let Some(orientation) = preview.orientation {
            loaded.orientation = orientation;
        }
        Ok(loaded)
    }
}

/// One-line summary of a transform for the log sink.
fn describe(out: &TransformOutput) -> String {
    let mut summary = format!("{} → {} ({})", out.original, out.dimensions, out.action);
    if out.lossless {
        summary.push_str(", lossless");
    } else {
        summary.push_str(&format!(", {}", out.quality));
    }
    summary
}

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Hidden, unique temp path next to `path`.
fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    path.with_file_name(format!(".{name}.{}.{n}.tmp", std::process::id()))
}

/// Write `bytes` to `path` via a temp file and rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let tmp = temp_sibling(path);
    let result = fs::write(&tmp, bytes).and_then(|()| fs::rename(&tmp, path));
    if result.is_err() {
        fs::remove_file(&tmp).ok();
    }
    result
}

/// Copy `from` to `to` via a temp file and rename. Returns bytes copied.
pub fn copy_atomic(from: &Path, to: &Path) -> io::Result<u64> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = temp_sibling(to);
    let result = fs::copy(from, &tmp).and_then(|n| fs::rename(&tmp, to).map(|()| n));
    if result.is_err() {
        fs::remove_file(&tmp).ok();
    }
    result
}

// ============================================================================
// Planning
// ============================================================================

/// Projected resize actions for a batch, from header dimensions only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchPlan {
    pub downscale: usize,
    pub upscale: usize,
    pub keep: usize,
    /// Inputs whose dimensions could not be read (including RAW files).
    pub failed: usize,
}

impl BatchPlan {
    pub fn total(&self) -> usize {
        self.downscale + self.upscale + self.keep + self.failed
    }
}

fn read_dimensions(path: &Path) -> Option<Dimensions> {
    let reader = image::ImageReader::open(path).ok()?.with_guessed_format().ok()?;
    let (width, height) = reader.into_dimensions().ok()?;
    Some(Dimensions::new(width, height))
}

/// Tally what [`run_batch`] would do to each item's size, without decoding
/// pixels or touching the cache.
pub fn plan_batch(items: &[InputItem], input_root: &Path, config: &TransformConfig) -> BatchPlan {
    items
        .par_iter()
        .map(|item| {
            let mut plan = BatchPlan::default();
            match read_dimensions(&input_root.join(&item.relative_path)) {
                Some(dims) => match plan_resize(dims, config.size(), config.allow_upscale()).action {
                    ResizeAction::Downscaled => plan.downscale += 1,
                    ResizeAction::Upscaled => plan.upscale += 1,
                    _ => plan.keep += 1,
                },
                None => plan.failed += 1,
            }
            plan
        })
        .reduce(BatchPlan::default, |a, b| BatchPlan {
            downscale: a.downscale + b.downscale,
            upscale: a.upscale + b.upscale,
            keep: a.keep + b.keep,
            failed: a.failed + b.failed,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OutputFormat, TransformSettings};
    use crate::imaging::RustBackend;
    use crate::imaging::backend::tests::MockBackend;
    use crate::raw::tests::FixedPreview;
    use crate::raw::{EXTRACTION_FAILED_REASON, ExiftoolExtractor, TOOL_MISSING_REASON};
    use crate::test_helpers::{assert_consistent, enumerate, write_png};
    use image::metadata::Orientation;
    use tempfile::TempDir;

    fn png_config(size: u32) -> TransformConfig {
        TransformConfig::try_from(TransformSettings {
            format: OutputFormat::Png,
            size,
            ..TransformSettings::default()
        })
        .unwrap()
    }

    struct Fixture {
        tmp: TempDir,
        items: Vec<InputItem>,
        config: TransformConfig,
    }

    impl Fixture {
        fn new(config: TransformConfig) -> Self {
            let tmp = TempDir::new().unwrap();
            let input = tmp.path().join("in");
            write_png(&input.join("big.png"), 120, 80, 1);
            write_png(&input.join("small.png"), 20, 30, 2);
            write_png(&input.join("nested/deep.png"), 90, 60, 3);
            let items = enumerate(&input);
            Self { tmp, items, config }
        }

        fn input(&self) -> PathBuf {
            self.tmp.path().join("in")
        }

        fn cache(&self) -> DeltaCache {
            DeltaCache::load(self.tmp.path().join("out/.delta-sync.json"))
        }

        fn run(
            &self,
            backend: &impl ImageBackend,
            extractor: &dyn PreviewExtractor,
            session: &str,
            workers: usize,
            cancel: &CancellationToken,
        ) -> BatchOutcome {
            let cache = self.cache();
            let input = self.input();
            let session_root = self.tmp.path().join("out").join(session);
            let batch = Batch {
                items: &self.items,
                input_root: &input,
                session_root: &session_root,
                timestamp: session,
                config: &self.config,
                workers,
            };
            run_batch(backend, extractor, &cache, &batch, cancel, None).unwrap()
        }

        fn run_simple(&self, backend: &impl ImageBackend, session: &str) -> BatchOutcome {
            self.run(
                backend,
                &ExiftoolExtractor::new(),
                session,
                4,
                &CancellationToken::new(),
            )
        }
    }

    fn success(outcome: &BatchOutcome, path: &str) -> ProcessedOutput {
        let result = outcome
            .results
            .iter()
            .find(|r| r.relative_path == path)
            .unwrap_or_else(|| panic!("no result for {path}"));
        match &result.status {
            ItemStatus::Success(out) => out.clone(),
            other => panic!("{path} not successful: {other:?}"),
        }
    }

    // =========================================================================
    // Transform path
    // =========================================================================

    #[test]
    fn first_run_transforms_everything() {
        let fx = Fixture::new(png_config(40));
        let backend = MockBackend::new();
        let outcome = fx.run_simple(&backend, "s1");

        assert_eq!(outcome.stats.processed, 3);
        assert_eq!(outcome.stats.downscaled, 2);
        assert_eq!(outcome.stats.kept_original, 1);
        assert_eq!(outcome.cache_stats.misses, 3);
        assert_eq!(backend.encode_count(), 3);
        assert_consistent(&outcome.stats, 3);

        let big = success(&outcome, "big.png");
        assert_eq!(big.dimensions, Some(Dimensions::new(60, 40)));
        assert!(big.output_path.is_file());
        assert_eq!(fs::metadata(&big.output_path).unwrap().len(), big.output_bytes);
    }

    #[test]
    fn outputs_mirror_input_tree() {
        let fx = Fixture::new(png_config(40));
        let outcome = fx.run_simple(&RustBackend::new(), "s1");
        let deep = success(&outcome, "nested/deep.png");
        assert_eq!(
            deep.output_path,
            fx.tmp.path().join("out/s1/nested/deep_40w_s1.png")
        );
    }

    #[test]
    fn colliding_names_get_distinct_outputs() {
        let fx = Fixture::new(png_config(40));
        write_png(&fx.input().join("photo.png"), 30, 20, 10);
        write_png(&fx.input().join("Photo.png"), 30, 20, 250);
        let fx = Fixture {
            items: enumerate(&fx.input()),
            ..fx
        };

        let first = fx.run_simple(&RustBackend::new(), "s1");
        assert_eq!(first.stats.processed, 5);
        let upper = success(&first, "Photo.png").output_path;
        let lower = success(&first, "photo.png").output_path;
        assert_eq!(upper, fx.tmp.path().join("out/s1/photo_40w_s1.png"));
        assert_eq!(lower, fx.tmp.path().join("out/s1/photo_2_40w_s1.png"));
        assert_ne!(fs::read(&upper).unwrap(), fs::read(&lower).unwrap());
        assert_eq!(fx.cache().len(), 5);

        // Each source restores its own earlier output.
        let backend = MockBackend::new();
        let second = fx.run_simple(&backend, "s2");
        assert_eq!(second.stats.synced, 5);
        assert_eq!(backend.encode_count(), 0);
        for (name, earlier) in [("Photo.png", &upper), ("photo.png", &lower)] {
            let restored = success(&second, name).output_path;
            assert_eq!(fs::read(restored).unwrap(), fs::read(earlier).unwrap());
        }
    }

    #[test]
    fn no_temp_files_left_behind() {
        let fx = Fixture::new(png_config(40));
        fx.run_simple(&RustBackend::new(), "s1");
        let leftovers: Vec<_> = walkdir::WalkDir::new(fx.tmp.path().join("out"))
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty(), "{leftovers:?}");
    }

    #[test]
    fn corrupt_input_fails_without_stopping_batch() {
        let fx = Fixture::new(png_config(40));
        fs::write(fx.input().join("big.png"), b"not a png").unwrap();
        let outcome = fx.run_simple(&RustBackend::new(), "s1");

        assert_eq!(outcome.stats.processed, 2);
        assert_eq!(outcome.stats.skipped, 1);
        assert_eq!(outcome.stats.failed, 1);
        assert_consistent(&outcome.stats, 3);
        let big = outcome.results.iter().find(|r| r.relative_path == "big.png").unwrap();
        assert!(matches!(big.status, ItemStatus::Failed { .. }));
    }

    // =========================================================================
    // Cache path
    // =========================================================================

    #[test]
    fn second_run_syncs_everything_from_cache() {
        let fx = Fixture::new(png_config(40));
        fx.run_simple(&RustBackend::new(), "s1");

        let backend = MockBackend::new();
        let outcome = fx.run_simple(&backend, "s2");

        assert_eq!(outcome.stats.synced, 3);
        assert_eq!(outcome.stats.processed, 3);
        assert_eq!(outcome.cache_stats.hits, 3);
        assert_eq!(backend.encode_count(), 0);
        assert_consistent(&outcome.stats, 3);

        let big = success(&outcome, "big.png");
        assert_eq!(big.action, ResizeAction::SyncedFromCache);
        assert_eq!(big.output_path, fx.tmp.path().join("out/s2/big_40w_s2.png"));
        assert!(big.output_path.is_file());
    }

    #[test]
    fn deleted_artifact_is_stale_and_reprocessed() {
        let fx = Fixture::new(png_config(40));
        let first = fx.run_simple(&RustBackend::new(), "s1");
        fs::remove_file(success(&first, "big.png").output_path).unwrap();

        let backend = MockBackend::new();
        let outcome = fx.run_simple(&backend, "s2");

        assert_eq!(outcome.cache_stats.hits, 2);
        assert_eq!(outcome.cache_stats.stale, 1);
        assert_eq!(backend.encode_count(), 1);
        assert_eq!(success(&outcome, "big.png").action, ResizeAction::Downscaled);
    }

    #[test]
    fn failed_restore_falls_through_to_transform() {
        let fx = Fixture::new(png_config(40));
        fx.run_simple(&RustBackend::new(), "s1");
        // A directory on the destination makes the restore's rename fail.
        fs::create_dir_all(fx.tmp.path().join("out/s2/big_40w_s2.png/occupied")).unwrap();

        let backend = MockBackend::new();
        let outcome = fx.run_simple(&backend, "s2");

        assert_eq!(outcome.cache_stats.hits, 2);
        assert_eq!(outcome.cache_stats.misses, 1);
        assert_eq!(outcome.cache_stats.stale, 0);
        assert_eq!(backend.encode_count(), 1);
        let big = outcome.results.iter().find(|r| r.relative_path == "big.png").unwrap();
        assert!(matches!(big.status, ItemStatus::Failed { .. }));
        assert_eq!(outcome.stats.synced, 2);
        assert_consistent(&outcome.stats, 3);
    }

    #[test]
    fn changed_bytes_miss_the_cache() {
        let fx = Fixture::new(png_config(40));
        fx.run_simple(&RustBackend::new(), "s1");
        write_png(&fx.input().join("small.png"), 20, 30, 99);

        let backend = MockBackend::new();
        let outcome = fx.run_simple(&backend, "s2");
        assert_eq!(outcome.stats.synced, 2);
        assert_eq!(backend.encode_count(), 1);
    }

    #[test]
    fn cache_is_saved_at_batch_end() {
        let fx = Fixture::new(png_config(40));
        fx.run_simple(&RustBackend::new(), "s1");
        assert_eq!(fx.cache().len(), 3);
    }

    // =========================================================================
    // Cancellation
    // =========================================================================

    #[test]
    fn cancelled_before_start_dispatches_nothing() {
        let fx = Fixture::new(png_config(40));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let backend = MockBackend::new();
        let outcome = fx.run(&backend, &ExiftoolExtractor::new(), "s1", 2, &cancel);

        assert!(outcome.cancelled);
        assert_eq!(outcome.stats.dispatched, 0);
        assert_eq!(outcome.stats.cancelled, 3);
        assert_eq!(backend.encode_count(), 0);
        assert!(fx.tmp.path().join("out/.delta-sync.json").is_file());
    }

    #[test]
    fn token_is_shared_between_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        assert!(token.is_cancelled());
    }

    // =========================================================================
    // RAW previews
    // =========================================================================

    fn raw_fixture() -> (Fixture, PathBuf) {
        let fx = Fixture::new(png_config(800));
        fs::write(fx.input().join("shot.cr3"), b"raw bytes").unwrap();
        let preview = fx.tmp.path().join("preview.png");
        write_png(&preview, 30, 20, 4);
        let fx = Fixture {
            items: enumerate(&fx.input()),
            ..fx
        };
        (fx, preview)
    }

    #[test]
    fn raw_preview_is_processed_with_reported_orientation() {
        let (fx, preview) = raw_fixture();
        let extractor = FixedPreview {
            preview: Some(preview),
            orientation: Some(Orientation::Rotate90),
        };
        let outcome = fx.run(&RustBackend::new(), &extractor, "s1", 2, &CancellationToken::new());

        let shot = success(&outcome, "shot.cr3");
        assert_eq!(shot.original, Some(Dimensions::new(20, 30)));
        assert!(!fx.tmp.path().join("out/s1").join(SCRATCH_DIR).exists());
    }

    #[test]
    fn raw_extraction_failure_skips_item() {
        let (fx, _) = raw_fixture();
        let extractor = FixedPreview {
            preview: None,
            orientation: None,
        };
        let outcome = fx.run(&RustBackend::new(), &extractor, "s1", 2, &CancellationToken::new());

        let shot = outcome.results.iter().find(|r| r.relative_path == "shot.cr3").unwrap();
        assert_eq!(
            shot.status,
            ItemStatus::Skipped {
                reason: EXTRACTION_FAILED_REASON.into()
            }
        );
        assert_eq!(outcome.stats.failed, 0);
        assert_consistent(&outcome.stats, 4);
    }

    #[test]
    fn source_without_fingerprint_is_processed_but_never_cached() {
        let (fx, preview) = raw_fixture();
        // The RAW file is gone, but the extractor still yields a preview.
        fs::remove_file(fx.input().join("shot.cr3")).unwrap();
        let extractor = FixedPreview {
            preview: Some(preview),
            orientation: None,
        };

        let first = fx.run(&RustBackend::new(), &extractor, "s1", 2, &CancellationToken::new());
        assert!(success(&first, "shot.cr3").output_path.is_file());
        assert_eq!(first.cache_stats.misses, 4);
        assert_eq!(fx.cache().len(), 3);

        let backend = MockBackend::new();
        let second = fx.run(&backend, &extractor, "s2", 2, &CancellationToken::new());
        assert_eq!(second.cache_stats.hits, 3);
        assert_eq!(second.cache_stats.misses, 1);
        assert_eq!(backend.encode_count(), 1);
        assert_eq!(success(&second, "shot.cr3").action, ResizeAction::KeptOriginal);
        assert_eq!(fx.cache().len(), 3);
    }

    #[test]
    fn missing_raw_tool_skips_item() {
        let (fx, _) = raw_fixture();
        let extractor = ExiftoolExtractor::with_program(fx.tmp.path().join("no-exiftool"));
        let outcome = fx.run(&RustBackend::new(), &extractor, "s1", 2, &CancellationToken::new());

        let shot = outcome.results.iter().find(|r| r.relative_path == "shot.cr3").unwrap();
        assert_eq!(
            shot.status,
            ItemStatus::Skipped {
                reason: TOOL_MISSING_REASON.into()
            }
        );
        assert_eq!(outcome.stats.processed, 3);
    }

    // =========================================================================
    // Events
    // =========================================================================

    #[test]
    fn events_report_every_item() {
        let fx = Fixture::new(png_config(40));
        let cache = fx.cache();
        let input = fx.input();
        let session_root = fx.tmp.path().join("out/s1");
        let batch = Batch {
            items: &fx.items,
            input_root: &input,
            session_root: &session_root,
            timestamp: "s1",
            config: &fx.config,
            workers: 3,
        };
        let (tx, rx) = std::sync::mpsc::channel();
        run_batch(
            &RustBackend::new(),
            &ExiftoolExtractor::new(),
            &cache,
            &batch,
            &CancellationToken::new(),
            Some(tx),
        )
        .unwrap();

        let events: Vec<ProcessEvent> = rx.iter().collect();
        assert!(matches!(events[0], ProcessEvent::Started { total: 3, workers: 3 }));
        let mut completed: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                ProcessEvent::ItemFinished { completed, .. } => Some(*completed),
                _ => None,
            })
            .collect();
        completed.sort();
        assert_eq!(completed, vec![1, 2, 3]);
    }

    // =========================================================================
    // Atomic writes and planning
    // =========================================================================

    #[test]
    fn write_atomic_replaces_existing_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("out.bin");
        fs::write(&path, b"old").unwrap();
        write_atomic(&path, b"new").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"new");
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 1);
    }

    #[test]
    fn copy_atomic_creates_parent() {
        let tmp = TempDir::new().unwrap();
        let from = tmp.path().join("a.bin");
        fs::write(&from, b"12345").unwrap();
        let to = tmp.path().join("x/y/b.bin");
        assert_eq!(copy_atomic(&from, &to).unwrap(), 5);
        assert_eq!(fs::read(&to).unwrap(), b"12345");
    }

    #[test]
    fn plan_batch_tallies_actions() {
        let fx = Fixture::new(png_config(40));
        fs::write(fx.input().join("broken.png"), b"nope").unwrap();
        let items = enumerate(&fx.input());

        let plan = plan_batch(&items, &fx.input(), &fx.config);
        assert_eq!(
            plan,
            BatchPlan {
                downscale: 2,
                upscale: 0,
                keep: 1,
                failed: 1
            }
        );
        assert_eq!(plan.total(), 4);
    }
}
