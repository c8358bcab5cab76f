//! Pure calculation functions for image dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

use super::params::Dimensions;
use crate::config::{Anchor, AspectRatio, Horizontal, Vertical};
use crate::types::ResizeAction;

/// What the resize step will do to an image, decided from dimensions alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizePlan {
    pub action: ResizeAction,
    /// Dimensions after the resize step (equal to the source when kept).
    pub target: Dimensions,
}

/// Decide the resize policy for an image.
///
/// The short edge is compared with `target_short_edge`:
/// - larger → downscale
/// - smaller and `allow_upscale` → upscale
/// - smaller without upscaling, or equal → keep
///
/// # Examples
/// ```
/// # use delta_resize::imaging::{Dimensions, plan_resize};
/// # use delta_resize::types::ResizeAction;
/// let plan = plan_resize(Dimensions::new(1500, 1000), 800, false);
/// assert_eq!(plan.action, ResizeAction::Downscaled);
/// assert_eq!(plan.target, Dimensions::new(1200, 800));
/// ```
pub fn plan_resize(source: Dimensions, target_short_edge: u32, allow_upscale: bool) -> ResizePlan {
    let short_edge = source.short_edge();
    let action = if short_edge > target_short_edge {
        ResizeAction::Downscaled
    } else if short_edge < target_short_edge && allow_upscale {
        ResizeAction::Upscaled
    } else {
        ResizeAction::KeptOriginal
    };

    let target = match action {
        ResizeAction::KeptOriginal => source,
        _ => scale_to_short_edge(source, target_short_edge),
    };
    ResizePlan { action, target }
}

/// Scale so the short edge equals `short_edge`, long edge proportional
/// (truncated, never below 1).
pub fn scale_to_short_edge(source: Dimensions, short_edge: u32) -> Dimensions {
    let Dimensions { width, height } = source;
    let scale = |long: u32, short: u32| -> u32 {
        ((short_edge as u64 * long as u64) / short.max(1) as u64).max(1) as u32
    };
    if width < height {
        Dimensions::new(short_edge, scale(height, width))
    } else {
        Dimensions::new(scale(width, height), short_edge)
    }
}

/// A crop window inside an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Largest rectangle of `aspect` that fits in `source`, placed per `anchor`.
///
/// Integer arithmetic throughout, so exact ratios (e.g. 1600x900 at 16:9)
/// never lose a pixel to floating point.
///
/// # Examples
/// ```
/// # use delta_resize::config::{Anchor, AspectRatio};
/// # use delta_resize::imaging::{Dimensions, calculate_crop};
/// let rect = calculate_crop(
///     Dimensions::new(1000, 500),
///     AspectRatio::new(1, 1).unwrap(),
///     "top-left".parse::<Anchor>().unwrap(),
/// );
/// assert_eq!((rect.x, rect.y, rect.width, rect.height), (0, 0, 500, 500));
/// ```
pub fn calculate_crop(source: Dimensions, aspect: AspectRatio, anchor: Anchor) -> CropRect {
    let (w, h) = (source.width as u64, source.height as u64);
    let (aw, ah) = (aspect.width() as u64, aspect.height() as u64);

    // Source wider than target: full height, trimmed width
    let (crop_w, crop_h) = if w * ah > h * aw {
        ((h * aw / ah).max(1), h)
    } else {
        (w, (w * ah / aw).max(1))
    };
    let (crop_w, crop_h) = (crop_w.min(w) as u32, crop_h.min(h) as u32);

    let spare_x = source.width - crop_w;
    let spare_y = source.height - crop_h;
    let x = match anchor.horizontal {
        Horizontal::Left => 0,
        Horizontal::Center => spare_x / 2,
        Horizontal::Right => spare_x,
    };
    let y = match anchor.vertical {
        Vertical::Top => 0,
        Vertical::Center => spare_y / 2,
        Vertical::Bottom => spare_y,
    };

    CropRect {
        x,
        y,
        width: crop_w,
        height: crop_h,
    }
}
