//! Image codec backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the three codec operations the
//! transform pipeline needs: load a source file (with its orientation tag),
//! encode pixels to a target format, and decode encoded bytes back into
//! pixels for the quality trial.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend). Tests substitute a
//! recording backend to count encodes and inject trial failures.

use crate::config::OutputFormat;
use image::DynamicImage;
use image::metadata::Orientation;
use std::path::Path;
use thiserror::Error;

use super::params::Quality;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to decode: {0}")]
    Decode(String),
    #[error("Failed to encode {format}: {message}")]
    Encode {
        format: OutputFormat,
        message: String,
    },
}

/// A decoded source image plus the orientation recorded alongside it.
///
/// The pixels are stored as decoded; the pipeline applies `orientation`.
#[derive(Debug, Clone)]
pub struct SourceImage {
    pub image: DynamicImage,
    pub orientation: Orientation,
}

impl SourceImage {
    /// An upright image with no orientation metadata.
    pub fn upright(image: DynamicImage) -> Self {
        Self {
            image,
            orientation: Orientation::NoTransforms,
        }
    }
}

/// Trait for image codec backends.
///
/// `Sync` because one backend instance is shared by every worker.
pub trait ImageBackend: Sync {
    /// Decode a file from disk, reporting its embedded orientation.
    fn load(&self, path: &Path) -> Result<SourceImage, BackendError>;

    /// Encode `image` as `format`.
    ///
    /// `lossless` selects the lossless mode for formats that have one.
    fn encode(
        &self,
        image: &DynamicImage,
        format: OutputFormat,
        quality: Quality,
        lossless: bool,
    ) -> Result<Vec<u8>, BackendError>;

    /// Decode previously encoded bytes.
    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, BackendError>;
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::imaging::RustBackend;
    use std::sync::Mutex;

    /// Backend that delegates to [`RustBackend`] and records every call.
    ///
    /// `fail_decode` makes the trial-side `decode` fail, simulating an I/O
    /// error while comparing quality candidates.
    /// Uses Mutex (not RefCell) so it is Sync and works with rayon's par_iter.
    #[derive(Default)]
    pub struct MockBackend {
        inner: RustBackend,
        pub fail_decode: bool,
        pub operations: Mutex<Vec<RecordedOp>>,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub enum RecordedOp {
        Load(String),
        Encode {
            format: OutputFormat,
            quality: u32,
            lossless: bool,
        },
        Decode,
    }

    impl MockBackend {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing_decode() -> Self {
            Self {
                fail_decode: true,
                ..Self::default()
            }
        }

        pub fn get_operations(&self) -> Vec<RecordedOp> {
            self.operations.lock().unwrap().clone()
        }

        pub fn encode_count(&self) -> usize {
            self.get_operations()
                .iter()
                .filter(|op| matches!(op, RecordedOp::Encode { .. }))
                .count()
        }
    }

    impl ImageBackend for MockBackend {
        fn load(&self, path: &Path) -> Result<SourceImage, BackendError> {
            self.operations
                .lock()
                .unwrap()
                .push(RecordedOp::Load(path.to_string_lossy().to_string()));
            self.inner.load(path)
        }

        fn encode(
            &self,
            image: &DynamicImage,
            format: OutputFormat,
            quality: Quality,
            lossless: bool,
        ) -> Result<Vec<u8>, BackendError> {
            self.operations.lock().unwrap().push(RecordedOp::Encode {
                format,
                quality: quality.value(),
                lossless,
            });
            self.inner.encode(image, format, quality, lossless)
        }

        fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, BackendError> {
            self.operations.lock().unwrap().push(RecordedOp::Decode);
            if self.fail_decode {
                return Err(BackendError::Io(std::io::Error::other(
                    "simulated decode failure",
                )));
            }
            self.inner.decode(bytes)
        }
    }

    #[test]
    fn mock_records_encode() {
        let backend = MockBackend::new();
        let img = DynamicImage::new_rgb8(4, 4);

        backend
            .encode(&img, OutputFormat::Png, Quality::new(90), false)
            .unwrap();

        let ops = backend.get_operations();
        assert_eq!(ops.len(), 1);
        assert!(matches!(
            &ops[0],
            RecordedOp::Encode {
                format: OutputFormat::Png,
                quality: 90,
                lossless: false
            }
        ));
    }

    #[test]
    fn mock_failing_decode_reports_io_error() {
        let backend = MockBackend::failing_decode();
        let result = backend.decode(&[]);
        assert!(matches!(result, Err(BackendError::Io(_))));
        assert_eq!(backend.get_operations(), vec![RecordedOp::Decode]);
    }
}
