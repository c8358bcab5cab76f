//! Image processing: pure Rust codecs plus the transform pipeline.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode** | `image::ImageReader` (orientation from the decoder) |
//! | **Resize** | `resize_exact` with Lanczos3 (down) or Catmull-Rom (up) |
//! | **Encode WebP** | `webp` (lossy and lossless) |
//! | **Encode PDF** | `lopdf` wrapping a JPEG stream |
//! | **Encode others** | `image` codecs |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Small value types (`Quality`, `Dimensions`)
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Operations**: [`transform`], combining calculations + backend

pub mod backend;
mod calculations;
pub mod operations;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, ImageBackend, SourceImage};
pub use calculations::{CropRect, ResizePlan, calculate_crop, plan_resize, scale_to_short_edge};
pub use operations::{TransformOutput, encode_with_search, rms_difference, transform};
pub use params::{Dimensions, Quality, QualitySearch};
pub use rust_backend::{RustBackend, supported_input_extensions};
