//! # delta-resize
//!
//! Batch image resizer and re-encoder. Every input is brought to a target
//! short edge, optionally cropped to a fixed aspect ratio, and re-encoded to
//! one output format. A content-addressed cache remembers what each
//! `(source bytes, transform settings)` pair produced, so re-running a batch
//! copies prior outputs instead of re-encoding them ("delta sync").
//!
//! # Architecture
//!
//! ```text
//! scan      input dir  →  Vec<InputItem>
//! process   items      →  fingerprint → cache hit?  ─ yes → copy prior output
//!                                                   └ no  → decode → resize → crop → encode
//! report    outcome    →  session.json + summary lines
//! ```
//!
//! The batch runs under one immutable [`config::TransformConfig`], shared
//! read-only by all workers. The cache document is loaded once before the
//! batch and saved once after it, even when cancelled.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`config`] | TOML profile loading, stock-default merge, validation into `TransformConfig` |
//! | [`fingerprint`] | SHA-256 over source bytes plus canonical transform settings |
//! | [`cache`] | Persistent fingerprint → output map (`.delta-sync.json`) and hit/miss stats |
//! | [`imaging`] | Codec boundary, resize and crop math, the transform pipeline, quality search |
//! | [`raw`] | Embedded-preview extraction for camera RAW files via `exiftool` |
//! | [`naming`] | Sanitized output filenames and session directory names |
//! | [`scan`] | Input enumeration |
//! | [`process`] | Parallel scheduler, cancellation, batch planning, atomic writes |
//! | [`types`] | Items, per-item results, aggregate stats |
//! | [`report`] | JSON session report |
//! | [`output`] | CLI line formatting |
//! | [`logging`] | `tracing` subscriber setup for the binary |
//!
//! # Design Decisions
//!
//! ## Fingerprints Cover Settings
//!
//! The cache key is computed over the source bytes *and* the serialized
//! transform settings. Changing any setting (even quality by one step)
//! yields new keys for every item, so stale outputs are never reused.
//!
//! ## Soft Cache Failures
//!
//! A missing, corrupt, or unwritable cache document never fails a batch.
//! The worst case is recomputation. Cache entries whose output file has
//! vanished are treated as misses.
//!
//! ## Pure-Rust Codecs
//!
//! Decoding, resampling, and most encoders come from the `image` crate.
//! Lossy WebP uses `libwebp` through the `webp` crate, and PDF output wraps
//! a JPEG stream with `lopdf`. The only external program is `exiftool`,
//! needed solely for RAW previews.

pub mod cache;
pub mod config;
pub mod fingerprint;
pub mod imaging;
pub mod logging;
pub mod naming;
pub mod output;
pub mod process;
pub mod raw;
pub mod report;
pub mod scan;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
