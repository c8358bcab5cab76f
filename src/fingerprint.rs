//! Content + config fingerprints for delta-sync lookups.
//!
//! A fingerprint is the SHA-256 of the source file bytes followed by the
//! canonical JSON serialization of the effective [`TransformConfig`].
//! Content-based rather than mtime-based, so it survives copies and
//! `git checkout`.
//!
//! The file is streamed in fixed-size chunks, so peak memory does not
//! depend on the input size.

use crate::config::TransformConfig;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use tracing::warn;

/// Read buffer size for hashing.
const CHUNK_SIZE: usize = 64 * 1024;

/// Separator between the content and config sections of the digest input.
const CONFIG_SEPARATOR: &[u8] = b"\0config\0";

/// Canonical serialization of `config`.
///
/// Goes through `serde_json::Value`, whose object map is sorted, so the
/// output does not depend on struct field order.
pub fn canonical_config(config: &TransformConfig) -> String {
    serde_json::to_value(config)
        .map(|value| value.to_string())
        .unwrap_or_default()
}

/// Stream `reader` and `config` through SHA-256 and return a hex digest.
pub fn fingerprint_reader(reader: impl Read, config: &TransformConfig) -> io::Result<String> {
    let mut hasher = Sha256::new();
    io::copy(&mut BufReader::with_capacity(CHUNK_SIZE, reader), &mut hasher)?;
    hasher.update(CONFIG_SEPARATOR);
    hasher.update(canonical_config(config).as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

/// Fingerprint a file under `config`.
///
/// Returns `None` when the file cannot be read. That is a soft failure:
/// the caller skips the cache for this item and recomputes.
pub fn fingerprint(path: &Path, config: &TransformConfig) -> Option<String> {
    let result = File::open(path).and_then(|file| fingerprint_reader(file, config));
    match result {
        Ok(digest) => Some(digest),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "fingerprint unavailable");
            None
        }
    }
}
