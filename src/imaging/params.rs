//! Small value types shared by the transform pipeline.
//!
//! - [`Quality`]: Lossy encoding quality (1–100). Clamped on construction;
//!   the profile layer narrows the accepted range further (50–100).
//! - [`Dimensions`]: Pixel width and height of a decoded or encoded image.
//! - [`QualitySearch`]: Constants of the optional reduced-quality trial.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quality(u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }

    /// Quality lowered by `step`, never below `floor`.
    pub fn reduced(self, step: u32, floor: u32) -> Self {
        Self::new(self.0.saturating_sub(step).max(floor))
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(85)
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Q{}", self.0)
    }
}

/// Width and height of an image in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn short_edge(self) -> u32 {
        self.width.min(self.height)
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Parameters of the reduced-quality trial.
///
/// - `step`: how far below the requested quality the candidate is encoded
/// - `floor`: lowest quality a candidate may use
/// - `threshold`: mean channel RMS difference under which the candidate wins
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualitySearch {
    pub step: u32,
    pub floor: u32,
    pub threshold: f64,
}

impl Default for QualitySearch {
    fn default() -> Self {
        Self {
            step: 15,
            floor: 50,
            threshold: 2.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_clamps_to_valid_range() {
        assert_eq!(Quality::new(0).value(), 1);
        assert_eq!(Quality::new(50).value(), 50);
        assert_eq!(Quality::new(150).value(), 100);
    }

    #[test]
    fn quality_default_is_85() {
        assert_eq!(Quality::default().value(), 85);
    }

    #[test]
    fn reduced_quality_steps_down() {
        assert_eq!(Quality::new(85).reduced(15, 50).value(), 70);
    }

    #[test]
    fn reduced_quality_respects_floor() {
        assert_eq!(Quality::new(60).reduced(15, 50).value(), 50);
        assert_eq!(Quality::new(50).reduced(15, 50).value(), 50);
    }

    #[test]
    fn short_edge_picks_smaller_side() {
        assert_eq!(Dimensions::new(1000, 500).short_edge(), 500);
        assert_eq!(Dimensions::new(300, 900).short_edge(), 300);
    }

    #[test]
    fn dimensions_display() {
        assert_eq!(Dimensions::new(800, 600).to_string(), "800x600");
    }
}
