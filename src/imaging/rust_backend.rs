//! Pure Rust codec backend.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, TIFF, WebP, BMP, ICO) | `image` crate decoders |
//! | Orientation tag | `image::ImageDecoder::orientation` |
//! | Encode → JPEG, PNG, TIFF, BMP, ICO | `image::codecs::*` |
//! | Encode → AVIF | `image::codecs::avif::AvifEncoder` (rav1e, speed 6) |
//! | Encode → WebP | `webp` (libwebp, lossy or lossless) |
//! | Encode → PDF | `lopdf` single page wrapping a JPEG (`DCTDecode`) stream |

use super::backend::{BackendError, ImageBackend, SourceImage};
use super::params::Quality;
use crate::config::OutputFormat;
use image::codecs::avif::AvifEncoder;
use image::codecs::bmp::BmpEncoder;
use image::codecs::ico::IcoEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::codecs::tiff::TiffEncoder;
use image::metadata::Orientation;
use image::imageops::FilterType as ResizeFilter;
use image::{DynamicImage, ImageDecoder, ImageFormat, ImageReader};
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};
use std::borrow::Cow;
use std::io::Cursor;
use std::path::Path;
use std::sync::LazyLock;

/// Extensions whose decoders are compiled in and known to work.
///
/// AVIF is not listed: the `"avif"` feature only enables the encoder.
const DECODE_CANDIDATES: &[(&str, ImageFormat)] = &[
    ("jpg", ImageFormat::Jpeg),
    ("jpeg", ImageFormat::Jpeg),
    ("png", ImageFormat::Png),
    ("tif", ImageFormat::Tiff),
    ("tiff", ImageFormat::Tiff),
    ("webp", ImageFormat::WebP),
    ("bmp", ImageFormat::Bmp),
    ("ico", ImageFormat::Ico),
];

static SUPPORTED_EXTENSIONS: LazyLock<Vec<&'static str>> = LazyLock::new(|| {
    DECODE_CANDIDATES
        .iter()
        .filter(|(_, fmt)| fmt.reading_enabled())
        .map(|(ext, _)| *ext)
        .collect()
});

/// Returns the set of image file extensions that have working decoders compiled in.
pub fn supported_input_extensions() -> &'static [&'static str] {
    &SUPPORTED_EXTENSIONS
}

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
#[derive(Debug, Default, Clone, Copy)]
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

fn encode_error(format: OutputFormat, err: impl std::fmt::Display) -> BackendError {
    BackendError::Encode {
        format,
        message: err.to_string(),
    }
}

/// Drop alpha for encoders that only take opaque pixels.
fn opaque(img: &DynamicImage) -> Cow<'_, DynamicImage> {
    match img {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageLuma8(_) => Cow::Borrowed(img),
        other => Cow::Owned(DynamicImage::ImageRgb8(other.to_rgb8())),
    }
}

/// Normalize to the two layouts libwebp accepts.
fn rgb_or_rgba(img: &DynamicImage) -> Cow<'_, DynamicImage> {
    match img {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => Cow::Borrowed(img),
        other if other.color().has_alpha() => Cow::Owned(DynamicImage::ImageRgba8(other.to_rgba8())),
        other => Cow::Owned(DynamicImage::ImageRgb8(other.to_rgb8())),
    }
}

/// Shrink to fit within the largest icon size, keeping the aspect ratio.
fn fit_icon(img: &DynamicImage) -> Cow<'_, DynamicImage> {
    match OutputFormat::Ico.max_edge() {
        Some(max) if img.width() > max || img.height() > max => {
            Cow::Owned(img.resize(max, max, ResizeFilter::Lanczos3))
        }
        _ => Cow::Borrowed(img),
    }
}

fn encode_jpeg(img: &DynamicImage, quality: Quality) -> Result<Vec<u8>, BackendError> {
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality.value() as u8);
    opaque(img)
        .write_with_encoder(encoder)
        .map_err(|e| encode_error(OutputFormat::Jpeg, e))?;
    Ok(buf)
}

fn encode_webp(img: &DynamicImage, quality: Quality, lossless: bool) -> Result<Vec<u8>, BackendError> {
    let img = rgb_or_rgba(img);
    let encoder =
        webp::Encoder::from_image(&img).map_err(|e| encode_error(OutputFormat::Webp, e))?;
    let memory = if lossless {
        encoder.encode_lossless()
    } else {
        encoder.encode(quality.value() as f32)
    };
    Ok(memory.to_vec())
}

/// Wrap a JPEG encode of `img` as the only page of a PDF, one point per pixel.
fn encode_pdf(img: &DynamicImage, quality: Quality) -> Result<Vec<u8>, BackendError> {
    let jpeg = encode_jpeg(img, quality)?;
    let (width, height) = (img.width() as i64, img.height() as i64);
    let color_space = if matches!(opaque(img).as_ref(), DynamicImage::ImageLuma8(_)) {
        "DeviceGray"
    } else {
        "DeviceRGB"
    };

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let image_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width,
            "Height" => height,
            "ColorSpace" => color_space,
            "BitsPerComponent" => 8_i64,
            "Filter" => "DCTDecode",
        },
        jpeg,
    ));
    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    Object::Integer(width),
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(height),
                    Object::Integer(0),
                    Object::Integer(0),
                ],
            ),
            Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
            Operation::new("Q", vec![]),
        ],
    };
    let content_bytes = content
        .encode()
        .map_err(|e| encode_error(OutputFormat::Pdf, e))?;
    let content_id = doc.add_object(Stream::new(dictionary! {}, content_bytes));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "MediaBox" => vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(width),
            Object::Integer(height),
        ],
        "Resources" => dictionary! {
            "XObject" => dictionary! { "Im0" => image_id },
        },
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => 1_i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf)
        .map_err(|e| encode_error(OutputFormat::Pdf, e))?;
    Ok(buf)
}

impl ImageBackend for RustBackend {
    fn load(&self, path: &Path) -> Result<SourceImage, BackendError> {
        let reader = ImageReader::open(path)?.with_guessed_format()?;
        let mut decoder = reader.into_decoder().map_err(|e| {
            BackendError::Decode(format!("{}: {}", path.display(), e))
        })?;
        // A malformed EXIF block is not worth failing the item over
        let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
        let image = DynamicImage::from_decoder(decoder)
            .map_err(|e| BackendError::Decode(format!("{}: {}", path.display(), e)))?;
        Ok(SourceImage { image, orientation })
    }

    fn encode(
        &self,
        image: &DynamicImage,
        format: OutputFormat,
        quality: Quality,
        lossless: bool,
    ) -> Result<Vec<u8>, BackendError> {
        let mut buf = Vec::new();
        let written = match format {
            OutputFormat::Jpeg => return encode_jpeg(image, quality),
            OutputFormat::Webp => return encode_webp(image, quality, lossless),
            OutputFormat::Pdf => return encode_pdf(image, quality),
            OutputFormat::Png => image.write_with_encoder(PngEncoder::new_with_quality(
                &mut buf,
                CompressionType::Best,
                PngFilter::Adaptive,
            )),
            OutputFormat::Tiff => image.write_with_encoder(TiffEncoder::new(Cursor::new(&mut buf))),
            OutputFormat::Bmp => image.write_with_encoder(BmpEncoder::new(&mut buf)),
            OutputFormat::Ico => fit_icon(image).write_with_encoder(IcoEncoder::new(&mut buf)),
            OutputFormat::Avif => image.write_with_encoder(AvifEncoder::new_with_speed_quality(
                &mut buf,
                6,
                quality.value() as u8,
            )),
        };
        written.map_err(|e| encode_error(format, e))?;
        Ok(buf)
    }

    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, BackendError> {
        image::load_from_memory(bytes).map_err(|e| BackendError::Decode(e.to_string()))
    }
}
