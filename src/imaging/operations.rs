//! The per-image transform pipeline.
//!
//! [`transform`] runs the fixed step sequence on a decoded image:
//!
//! 1. **Orient**: apply the source orientation (all 8 EXIF values)
//! 2. **Alpha**: flatten onto white when the target cannot carry alpha
//! 3. **Resize**: short-edge policy from [`plan_resize`]
//! 4. **Crop**: optional anchored crop from [`calculate_crop`]
//! 5. **Fit**: shrink into the format's size limit (ICO: 256px)
//! 6. **Encode**: with an optional reduced-quality trial
//!
//! Everything except the codec calls is deterministic pixel math, so the
//! same source and config always produce the same bytes.

use super::backend::{BackendError, ImageBackend, SourceImage};
use super::calculations::{calculate_crop, plan_resize};
use super::params::{Dimensions, Quality, QualitySearch};
use crate::config::{OutputFormat, TransformConfig};
use crate::types::ResizeAction;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, Rgb, RgbImage};
use tracing::debug;

/// Result type for image operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// Encoded output of one transform.
#[derive(Debug, Clone)]
pub struct TransformOutput {
    pub bytes: Vec<u8>,
    /// Upright source dimensions, before resize and crop.
    pub original: Dimensions,
    /// Dimensions of the encoded image.
    pub dimensions: Dimensions,
    pub action: ResizeAction,
    /// Quality actually used (lower than requested when the trial won).
    pub quality: Quality,
    pub lossless: bool,
}

/// Run the full pipeline on a decoded source image.
pub fn transform(
    backend: &impl ImageBackend,
    source: SourceImage,
    config: &TransformConfig,
) -> Result<TransformOutput> {
    let SourceImage {
        mut image,
        orientation,
    } = source;
    image.apply_orientation(orientation);
    let original = Dimensions::new(image.width(), image.height());

    let image = normalize_alpha(image, config.format());
    let keeps_alpha = image.color().has_alpha();

    let plan = plan_resize(original, config.size(), config.allow_upscale());
    let image = match plan.action {
        ResizeAction::Downscaled => {
            image.resize_exact(plan.target.width, plan.target.height, FilterType::Lanczos3)
        }
        ResizeAction::Upscaled => {
            image.resize_exact(plan.target.width, plan.target.height, FilterType::CatmullRom)
        }
        _ => image,
    };

    let image = match config.crop() {
        Some(crop) => {
            let current = Dimensions::new(image.width(), image.height());
            let rect = calculate_crop(current, crop.aspect, crop.anchor);
            image.crop_imm(rect.x, rect.y, rect.width, rect.height)
        }
        None => image,
    };

    let image = match config.format().max_edge() {
        Some(max) if image.width() > max || image.height() > max => {
            image.resize(max, max, FilterType::Lanczos3)
        }
        _ => image,
    };

    let lossless = keeps_alpha && config.format().has_lossless_mode();
    let (bytes, quality) = encode_with_search(
        backend,
        &image,
        config.format(),
        config.quality(),
        lossless,
        config.smart_optimize(),
        &QualitySearch::default(),
    )?;

    Ok(TransformOutput {
        bytes,
        original,
        dimensions: Dimensions::new(image.width(), image.height()),
        action: plan.action,
        quality,
        lossless,
    })
}

/// Normalize the pixel layout for `format`.
///
/// - alpha + format without alpha → RGB flattened onto white
/// - alpha + format with alpha → RGBA8
/// - no alpha → RGB8
pub fn normalize_alpha(image: DynamicImage, format: OutputFormat) -> DynamicImage {
    if !image.color().has_alpha() {
        return match image {
            DynamicImage::ImageRgb8(_) => image,
            other => DynamicImage::ImageRgb8(other.to_rgb8()),
        };
    }
    if format.supports_alpha() {
        return match image {
            DynamicImage::ImageRgba8(_) => image,
            other => DynamicImage::ImageRgba8(other.to_rgba8()),
        };
    }
    DynamicImage::ImageRgb8(flatten_onto_white(&image))
}

fn flatten_onto_white(image: &DynamicImage) -> RgbImage {
    let rgba = image.to_rgba8();
    let mut out = RgbImage::new(rgba.width(), rgba.height());
    for (dst, src) in out.pixels_mut().zip(rgba.pixels()) {
        let alpha = src[3] as u32;
        let blend = |c: u8| ((c as u32 * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
        *dst = Rgb([blend(src[0]), blend(src[1]), blend(src[2])]);
    }
    out
}

/// Encode at `quality`, optionally trying a reduced quality.
///
/// The trial runs only when `smart` is set, the format supports it and the
/// encode is lossy. The reduced candidate is adopted when its mean channel
/// RMS difference from the standard candidate is below `search.threshold`.
/// Any trial error keeps the standard encode.
pub fn encode_with_search(
    backend: &impl ImageBackend,
    image: &DynamicImage,
    format: OutputFormat,
    quality: Quality,
    lossless: bool,
    smart: bool,
    search: &QualitySearch,
) -> Result<(Vec<u8>, Quality)> {
    let standard = backend.encode(image, format, quality, lossless)?;
    if !smart || lossless || !format.supports_quality_search() {
        return Ok((standard, quality));
    }

    let reduced = quality.reduced(search.step, search.floor);
    if reduced == quality {
        return Ok((standard, quality));
    }

    match try_reduced(backend, image, format, &standard, reduced) {
        Ok((candidate, diff)) if diff < search.threshold => {
            debug!(%format, from = %quality, to = %reduced, diff, "reduced quality accepted");
            Ok((candidate, reduced))
        }
        Ok((_, diff)) => {
            debug!(%format, %quality, diff, "reduced quality rejected");
            Ok((standard, quality))
        }
        Err(e) => {
            debug!(%format, error = %e, "reduced quality trial failed, keeping standard encode");
            Ok((standard, quality))
        }
    }
}

fn try_reduced(
    backend: &impl ImageBackend,
    image: &DynamicImage,
    format: OutputFormat,
    standard: &[u8],
    reduced: Quality,
) -> Result<(Vec<u8>, f64)> {
    let candidate = backend.encode(image, format, reduced, false)?;
    let standard_pixels = backend.decode(standard)?;
    let candidate_pixels = backend.decode(&candidate)?;
    Ok((candidate, rms_difference(&standard_pixels, &candidate_pixels)))
}

/// Mean over channels of the per-channel RMS pixel difference.
///
/// `b` is resized (nearest neighbour) to `a`'s dimensions when they differ,
/// and both are compared as RGBA when either has alpha, RGB otherwise.
pub fn rms_difference(a: &DynamicImage, b: &DynamicImage) -> f64 {
    let b = if a.dimensions() == b.dimensions() {
        std::borrow::Cow::Borrowed(b)
    } else {
        std::borrow::Cow::Owned(b.resize_exact(a.width(), a.height(), FilterType::Nearest))
    };

    let (left, right, channels) = if a.color().has_alpha() || b.color().has_alpha() {
        (a.to_rgba8().into_raw(), b.to_rgba8().into_raw(), 4)
    } else {
        (a.to_rgb8().into_raw(), b.to_rgb8().into_raw(), 3)
    };
    if left.is_empty() {
        return 0.0;
    }

    let mut sums = [0f64; 4];
    for (i, (x, y)) in left.iter().zip(right.iter()).enumerate() {
        let d = *x as f64 - *y as f64;
        sums[i % channels] += d * d;
    }
    let pixels = (left.len() / channels) as f64;
    sums[..channels]
        .iter()
        .map(|sum| (sum / pixels).sqrt())
        .sum::<f64>()
        / channels as f64
}
