//! Transform profile configuration.
//!
//! A batch runs under exactly one [`TransformConfig`]. It is built from a
//! sparse TOML profile merged over stock defaults, optionally overridden from
//! the command line, and validated once at the boundary. After construction
//! it is immutable and shared read-only by every worker.
//!
//! ## Profile File
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [transform]
//! format = "webp"           # webp | jpeg | png | tiff | bmp | ico | pdf | avif
//! size = 800                # Target short edge in pixels
//! quality = 85              # Encoding quality (50-100)
//! allow_upscale = false     # Enlarge images smaller than `size`
//! crop = false              # Crop to `aspect` after resizing
//! # aspect = [1, 1]         # Required when crop = true
//! # anchor = "center"       # Region kept when cropping, e.g. "top-left"
//! smart_optimize = false    # Try a lower quality and keep it if indistinguishable
//!
//! [processing]
//! # max_workers = 8         # Parallel workers (omit for auto = cores + 4, max 32)
//! # cache_file = "resized_images/.delta-sync.json"
//! ```
//!
//! Unknown keys are rejected to catch typos early. Invalid combinations
//! (crop without aspect, aspect without crop) are rejected when the profile
//! is converted into a [`TransformConfig`], not when it is used.

use crate::imaging::Quality;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Hard ceiling on the worker pool size.
pub const MAX_WORKERS: usize = 32;

/// Accepted range for the encoding quality.
pub const QUALITY_RANGE: std::ops::RangeInclusive<u32> = 50..=100;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

// =============================================================================
// Value types
// =============================================================================

/// Target encoding format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum OutputFormat {
    Webp,
    Jpeg,
    Png,
    Tiff,
    Bmp,
    Ico,
    Pdf,
    Avif,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 8] = [
        OutputFormat::Webp,
        OutputFormat::Jpeg,
        OutputFormat::Png,
        OutputFormat::Tiff,
        OutputFormat::Bmp,
        OutputFormat::Ico,
        OutputFormat::Pdf,
        OutputFormat::Avif,
    ];

    /// Lowercase name, also used as the output file extension.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Webp => "webp",
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Png => "png",
            OutputFormat::Tiff => "tiff",
            OutputFormat::Bmp => "bmp",
            OutputFormat::Ico => "ico",
            OutputFormat::Pdf => "pdf",
            OutputFormat::Avif => "avif",
        }
    }

    /// Whether the encoded file can carry an alpha channel.
    ///
    /// Sources with alpha are flattened onto white for the others.
    pub fn supports_alpha(self) -> bool {
        matches!(
            self,
            OutputFormat::Webp | OutputFormat::Png | OutputFormat::Ico | OutputFormat::Avif
        )
    }

    /// Whether the format has a lossless mode distinct from its lossy one.
    pub fn has_lossless_mode(self) -> bool {
        matches!(self, OutputFormat::Webp)
    }

    /// Largest width or height the format can store, if limited.
    pub fn max_edge(self) -> Option<u32> {
        match self {
            OutputFormat::Ico => Some(256),
            _ => None,
        }
    }

    /// Formats eligible for the reduced-quality trial.
    pub fn supports_quality_search(self) -> bool {
        matches!(self, OutputFormat::Jpeg | OutputFormat::Webp)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.extension().to_ascii_uppercase())
    }
}

impl FromStr for OutputFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        let format = match lower.as_str() {
            "jpg" => OutputFormat::Jpeg,
            "tif" => OutputFormat::Tiff,
            other => OutputFormat::ALL
                .into_iter()
                .find(|f| f.extension() == other)
                .ok_or_else(|| {
                    ConfigError::Validation(format!("unknown output format '{s}'"))
                })?,
        };
        Ok(format)
    }
}

impl TryFrom<String> for OutputFormat {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<OutputFormat> for String {
    fn from(format: OutputFormat) -> Self {
        format.extension().to_string()
    }
}

/// Crop aspect ratio as `width:height`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "[u32; 2]", into = "[u32; 2]")]
pub struct AspectRatio {
    width: u32,
    height: u32,
}

impl AspectRatio {
    pub fn new(width: u32, height: u32) -> Result<Self, ConfigError> {
        if width == 0 || height == 0 {
            return Err(ConfigError::Validation(
                "transform.aspect values must be non-zero".into(),
            ));
        }
        Ok(Self { width, height })
    }

    pub fn width(self) -> u32 {
        self.width
    }

    pub fn height(self) -> u32 {
        self.height
    }

    pub fn ratio(self) -> f64 {
        self.width as f64 / self.height as f64
    }
}

impl TryFrom<[u32; 2]> for AspectRatio {
    type Error = ConfigError;

    fn try_from([w, h]: [u32; 2]) -> Result<Self, Self::Error> {
        Self::new(w, h)
    }
}

impl From<AspectRatio> for [u32; 2] {
    fn from(aspect: AspectRatio) -> Self {
        [aspect.width, aspect.height]
    }
}

impl FromStr for AspectRatio {
    type Err = ConfigError;

    /// Parse `"16:9"` (or `"16x9"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::Validation(format!("invalid aspect ratio '{s}'"));
        let (w, h) = s.split_once([':', 'x']).ok_or_else(invalid)?;
        let w = w.trim().parse().map_err(|_| invalid())?;
        let h = h.trim().parse().map_err(|_| invalid())?;
        Self::new(w, h)
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.width, self.height)
    }
}

/// Vertical component of a crop anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Vertical {
    Top,
    Center,
    Bottom,
}

/// Horizontal component of a crop anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Horizontal {
    Left,
    Center,
    Right,
}

/// Which region survives a crop: one of the 9 vertical × horizontal positions.
///
/// Written as `"<vertical>-<horizontal>"`, e.g. `"top-left"`,
/// `"center-right"`, `"bottom-center"`. `"middle"` is accepted for the
/// vertical center and a bare `"center"` means `"center-center"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Anchor {
    pub vertical: Vertical,
    pub horizontal: Horizontal,
}

impl Anchor {
    pub const CENTER: Anchor = Anchor {
        vertical: Vertical::Center,
        horizontal: Horizontal::Center,
    };

    pub fn new(vertical: Vertical, horizontal: Horizontal) -> Self {
        Self {
            vertical,
            horizontal,
        }
    }
}

impl Default for Anchor {
    fn default() -> Self {
        Self::CENTER
    }
}

impl FromStr for Anchor {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        if lower == "center" || lower == "middle" {
            return Ok(Self::CENTER);
        }
        let invalid = || ConfigError::Validation(format!("invalid crop anchor '{s}'"));
        let (v, h) = lower.split_once(['-', '_', ' ']).ok_or_else(invalid)?;
        let vertical = match v {
            "top" => Vertical::Top,
            "center" | "middle" => Vertical::Center,
            "bottom" => Vertical::Bottom,
            _ => return Err(invalid()),
        };
        let horizontal = match h {
            "left" => Horizontal::Left,
            "center" | "middle" => Horizontal::Center,
            "right" => Horizontal::Right,
            _ => return Err(invalid()),
        };
        Ok(Self::new(vertical, horizontal))
    }
}

impl fmt::Display for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = match self.vertical {
            Vertical::Top => "top",
            Vertical::Center => "center",
            Vertical::Bottom => "bottom",
        };
        let h = match self.horizontal {
            Horizontal::Left => "left",
            Horizontal::Center => "center",
            Horizontal::Right => "right",
        };
        write!(f, "{v}-{h}")
    }
}

impl TryFrom<String> for Anchor {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Anchor> for String {
    fn from(anchor: Anchor) -> Self {
        anchor.to_string()
    }
}

// =============================================================================
// Validated transform configuration
// =============================================================================

/// Crop target: only exists when cropping is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct CropSpec {
    pub aspect: AspectRatio,
    pub anchor: Anchor,
}

/// The effective, validated transform policy for a batch.
///
/// Fields are private: the only way to obtain one is through
/// [`TransformSettings`], so every instance has passed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransformConfig {
    format: OutputFormat,
    size: u32,
    quality: Quality,
    allow_upscale: bool,
    crop: Option<CropSpec>,
    smart_optimize: bool,
}

impl TransformConfig {
    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Target short edge in pixels.
    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn quality(&self) -> Quality {
        self.quality
    }

    pub fn allow_upscale(&self) -> bool {
        self.allow_upscale
    }

    pub fn crop(&self) -> Option<CropSpec> {
        self.crop
    }

    pub fn smart_optimize(&self) -> bool {
        self.smart_optimize
    }
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Webp,
            size: 800,
            quality: Quality::new(85),
            allow_upscale: false,
            crop: None,
            smart_optimize: false,
        }
    }
}

/// Raw `[transform]` table as written in a profile.
///
/// This is the sparse, user-facing shape; convert it with
/// `TransformConfig::try_from` to validate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransformSettings {
    pub format: OutputFormat,
    pub size: u32,
    pub quality: u32,
    pub allow_upscale: bool,
    pub crop: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aspect: Option<AspectRatio>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anchor: Option<Anchor>,
    pub smart_optimize: bool,
}

impl Default for TransformSettings {
    fn default() -> Self {
        TransformConfig::default().into()
    }
}

impl From<TransformConfig> for TransformSettings {
    fn from(config: TransformConfig) -> Self {
        Self {
            format: config.format,
            size: config.size,
            quality: config.quality.value(),
            allow_upscale: config.allow_upscale,
            crop: config.crop.is_some(),
            aspect: config.crop.map(|c| c.aspect),
            anchor: config.crop.map(|c| c.anchor),
            smart_optimize: config.smart_optimize,
        }
    }
}

impl TryFrom<TransformSettings> for TransformConfig {
    type Error = ConfigError;

    fn try_from(settings: TransformSettings) -> Result<Self, Self::Error> {
        if settings.size == 0 {
            return Err(ConfigError::Validation(
                "transform.size must be positive".into(),
            ));
        }
        if !QUALITY_RANGE.contains(&settings.quality) {
            return Err(ConfigError::Validation(format!(
                "transform.quality must be {}-{}",
                QUALITY_RANGE.start(),
                QUALITY_RANGE.end()
            )));
        }
        let crop = match (settings.crop, settings.aspect, settings.anchor) {
            (true, Some(aspect), anchor) => Some(CropSpec {
                aspect,
                anchor: anchor.unwrap_or_default(),
            }),
            (true, None, _) => {
                return Err(ConfigError::Validation(
                    "transform.crop requires transform.aspect".into(),
                ));
            }
            (false, None, None) => None,
            (false, _, _) => {
                return Err(ConfigError::Validation(
                    "transform.aspect and transform.anchor are only valid with crop = true"
                        .into(),
                ));
            }
        };
        Ok(Self {
            format: settings.format,
            size: settings.size,
            quality: Quality::new(settings.quality),
            allow_upscale: settings.allow_upscale,
            crop,
            smart_optimize: settings.smart_optimize,
        })
    }
}

// =============================================================================
// Processing settings and the full profile
// =============================================================================

/// Parallel processing and cache settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel workers. When absent, defaults to
    /// `cores + 4`. Always clamped to `1..=MAX_WORKERS`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_workers: Option<usize>,
    /// Location of the delta-sync cache document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_file: Option<PathBuf>,
}

/// Resolve the worker count for a batch.
///
/// - `single_item` (verification pass) → always 1
/// - `None` → `cores + 4`
/// - `Some(n)` → `n`
///
/// The result is clamped to `1..=MAX_WORKERS`.
pub fn effective_workers(config: &ProcessingConfig, single_item: bool) -> usize {
    if single_item {
        return 1;
    }
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_workers
        .unwrap_or(cores + 4)
        .clamp(1, MAX_WORKERS)
}

/// A complete profile file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Profile {
    pub transform: TransformSettings,
    pub processing: ProcessingConfig,
}

impl Profile {
    /// Validate and freeze the `[transform]` table.
    pub fn transform_config(&self) -> Result<TransformConfig, ConfigError> {
        TransformConfig::try_from(self.transform.clone())
    }
}

// =============================================================================
// Loading and merging
// =============================================================================

/// Returns the stock default profile as a `toml::Value::Table`.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(Profile::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a profile, merging it over stock defaults.
///
/// `None` yields the stock profile. A given path must exist.
/// The `[transform]` table is validated before returning.
pub fn load_profile(path: Option<&Path>) -> Result<Profile, ConfigError> {
    let base = stock_defaults_value()?;
    let merged = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            let overlay: toml::Value = toml::from_str(&content)?;
            merge_toml(base, overlay)
        }
        None => base,
    };
    let profile: Profile = merged.try_into()?;
    profile.transform_config()?;
    Ok(profile)
}

/// Returns a fully-commented stock profile with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# delta-resize profile
# ====================
# All settings are optional. Values shown below are the defaults.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Transform policy (part of every cache fingerprint)
# ---------------------------------------------------------------------------
[transform]
# Output format: webp, jpeg, png, tiff, bmp, ico, pdf, avif.
format = "webp"

# Target size of the short edge, in pixels.
size = 800

# Encoding quality, 50-100.
quality = 85

# Enlarge images whose short edge is below `size`.
allow_upscale = false

# Crop to a fixed aspect ratio after resizing.
crop = false

# Aspect ratio as [width, height]. Required when crop = true.
# aspect = [1, 1]

# Region kept when cropping: top|center|bottom - left|center|right.
# anchor = "center"

# Try quality - 15 (min 50) and keep it when visually indistinguishable.
# Applies to jpeg and webp.
smart_optimize = false

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Max parallel workers. Omit for auto (CPU cores + 4, capped at 32).
# max_workers = 8

# Delta-sync cache location. Defaults to <output>/.delta-sync.json.
# cache_file = "resized_images/.delta-sync.json"
"##
}
