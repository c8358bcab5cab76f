//! Delta-sync cache: skip re-encoding inputs already processed under an
//! identical configuration.
//!
//! # Design
//!
//! The cache is **content-addressed**: keys are [fingerprints](crate::fingerprint)
//! of (source bytes, transform config), values point at the output file the
//! last run produced for that key. Renaming or moving an input does not
//! invalidate its entry; changing its bytes or any transform field does.
//!
//! The cache is advisory. A missing, corrupt or wrong-version document loads
//! as empty, and a failed save is logged and dropped. Neither costs anything
//! but recomputation.
//!
//! Entries are never evicted. An entry whose output file has since been
//! deleted is a miss; callers re-verify the file with
//! [`CacheEntry::artifact_exists`] before using it.
//!
//! ## Storage
//!
//! A JSON document, by default `<output base>/.delta-sync.json`:
//!
//! ```json
//! {
//!   "version": 1,
//!   "entries": {
//!     "3f2a…": { "output_path": "/out/run_…/a_800w_….webp", "timestamp": "2026-…Z" }
//!   }
//! }
//! ```
//!
//! ## Concurrency
//!
//! All workers share one [`DeltaCache`]. `get` and `put` take the internal
//! mutex for the duration of a single map operation only; it is never held
//! across file I/O.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// Name of the cache document within the output base directory.
const CACHE_FILENAME: &str = ".delta-sync.json";

/// Version of the cache document format. Bump this to invalidate all
/// existing caches when the format or fingerprint computation changes.
const CACHE_VERSION: u32 = 1;

/// Where and when an output was produced for a fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheEntry {
    pub output_path: PathBuf,
    pub timestamp: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(output_path: impl Into<PathBuf>) -> Self {
        Self {
            output_path: output_path.into(),
            timestamp: Utc::now(),
        }
    }

    /// Whether the referenced output is still on disk.
    pub fn artifact_exists(&self) -> bool {
        self.output_path.is_file()
    }
}

/// On-disk shape. Sorted so saved documents diff cleanly.
#[derive(Debug, Serialize, Deserialize)]
struct CacheDocument {
    version: u32,
    entries: BTreeMap<String, CacheEntry>,
}

/// The shared fingerprint → output map.
#[derive(Debug)]
pub struct DeltaCache {
    path: PathBuf,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl DeltaCache {
    /// Default cache location for an output base directory.
    pub fn default_path(output_base: &Path) -> PathBuf {
        output_base.join(CACHE_FILENAME)
    }

    /// An empty cache that will save to `path` (used for `--no-cache`).
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Load from `path`. Returns an empty cache if the file doesn't exist
    /// or can't be parsed (version mismatch, corruption).
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match read_document(&path) {
            Some(doc) => doc.entries.into_iter().collect(),
            None => HashMap::new(),
        };
        debug!(path = %path.display(), entries = entries.len(), "delta cache loaded");
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        // A panic while holding the lock cannot leave a half-written entry
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, digest: &str) -> Option<CacheEntry> {
        self.lock().get(digest).cloned()
    }

    /// Insert or overwrite; the last writer for a digest wins.
    pub fn put(&self, digest: impl Into<String>, entry: CacheEntry) {
        self.lock().insert(digest.into(), entry);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Persist the cache, returning any error.
    pub fn try_save(&self) -> io::Result<()> {
        let doc = CacheDocument {
            version: CACHE_VERSION,
            entries: self
                .lock()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        };
        let json = serde_json::to_string_pretty(&doc)?;
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        crate::process::write_atomic(&self.path, json.as_bytes())
    }

    /// Best-effort persist. Failures are logged, never raised.
    pub fn save(&self) {
        match self.try_save() {
            Ok(()) => debug!(path = %self.path.display(), entries = self.len(), "delta cache saved"),
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to save delta cache"),
        }
    }
}

fn read_document(path: &Path) -> Option<CacheDocument> {
    let content = std::fs::read_to_string(path).ok()?;
    let doc: CacheDocument = match serde_json::from_str(&content) {
        Ok(doc) => doc,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring unreadable delta cache");
            return None;
        }
    };
    if doc.version != CACHE_VERSION {
        debug!(found = doc.version, expected = CACHE_VERSION, "delta cache version mismatch");
        return None;
    }
    Some(doc)
}

/// Summary of cache performance for a batch.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Outputs restored from the cache.
    pub hits: u32,
    /// Entries found whose output file no longer exists.
    pub stale: u32,
    /// Items transformed from scratch.
    pub misses: u32,
}

impl CacheStats {
    pub fn hit(&mut self) {
        self.hits += 1;
    }

    pub fn stale(&mut self) {
        self.stale += 1;
    }

    pub fn miss(&mut self) {
        self.misses += 1;
    }

    pub fn total(&self) -> u32 {
        self.hits + self.misses
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hits == 0 {
            return write!(f, "{} encoded", self.misses);
        }
        write!(
            f,
            "{} synced, {} encoded ({} total)",
            self.hits,
            self.misses,
            self.total()
        )?;
        if self.stale > 0 {
            write!(f, ", {} stale", self.stale)?;
        }
        Ok(())
    }
}
