//! Pure Rust image processing backend.
//!
//! Everything is statically linked into the binary.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG) | `image` crate, format sniffed from content |
//! | Resample | `image::imageops::resize` with `Lanczos3` filter |
//! | Cover crop | `DynamicImage::crop_imm` |
//! | Contain letterbox | `image::imageops::overlay` onto a black canvas |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` |
//! | EXIF carry-over | `img-parts` APP1 segment copy |

use super::backend::{BackendError, Dimensions, ImageBackend};
use super::calculations::{FitLayout, Placement, calculate_fit_layout};
use super::params::ResizeParams;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader, RgbImage};
use img_parts::jpeg::Jpeg;
use img_parts::png::Png;
use img_parts::{Bytes, ImageEXIF};
use std::io::{BufWriter, Cursor, Write};
use std::path::Path;

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode an in-memory image, sniffing the format from its magic bytes.
fn decode_bytes(data: &[u8], origin: &Path) -> Result<DynamicImage, BackendError> {
    ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(BackendError::Io)?
        .decode()
        .map_err(|e| {
            BackendError::ProcessingFailed(format!("Failed to decode {}: {}", origin.display(), e))
        })
}

/// Extract the raw EXIF block (without the `Exif\0\0` prefix) from a JPEG or PNG.
pub(crate) fn exif_segment(data: &Bytes) -> Option<Bytes> {
    if let Ok(jpeg) = Jpeg::from_bytes(data.clone()) {
        return jpeg.exif();
    }
    if let Ok(png) = Png::from_bytes(data.clone()) {
        return png.exif();
    }
    None
}

/// Resample and place `img` according to `layout`.
fn apply_layout(img: DynamicImage, layout: &FitLayout) -> DynamicImage {
    let (scaled_w, scaled_h) = layout.scaled;
    let scaled = if (img.width(), img.height()) == layout.scaled {
        img
    } else {
        img.resize_exact(scaled_w, scaled_h, FilterType::Lanczos3)
    };

    let (canvas_w, canvas_h) = layout.canvas;
    match layout.placement {
        Placement::Exact => scaled,
        Placement::Crop { x, y } => scaled.crop_imm(x, y, canvas_w, canvas_h),
        Placement::Pad { x, y } => {
            let mut canvas = RgbImage::new(canvas_w, canvas_h);
            image::imageops::overlay(&mut canvas, &scaled.to_rgb8(), x as i64, y as i64);
            DynamicImage::ImageRgb8(canvas)
        }
    }
}

/// Encode as baseline JPEG. Alpha is dropped; JPEG has no alpha channel.
fn encode_jpeg(img: &DynamicImage, quality: u32) -> Result<Vec<u8>, BackendError> {
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100) as u8);
    DynamicImage::ImageRgb8(img.to_rgb8())
        .write_with_encoder(encoder)
        .map_err(|e| BackendError::ProcessingFailed(format!("JPEG encode failed: {}", e)))?;
    Ok(buf)
}

/// Write `encoded` JPEG bytes to `path`, splicing in `exif` when present.
fn save_with_exif(encoded: Vec<u8>, exif: Option<Bytes>, path: &Path) -> Result<(), BackendError> {
    let bytes = match exif {
        Some(exif) => {
            let mut jpeg = Jpeg::from_bytes(Bytes::from(encoded)).map_err(|e| {
                BackendError::ProcessingFailed(format!("Failed to reparse encoded JPEG: {}", e))
            })?;
            jpeg.set_exif(Some(exif));
            let mut spliced = Vec::new();
            jpeg.encoder().write_to(&mut spliced)?;
            spliced
        }
        None => encoded,
    };

    let write = || -> std::io::Result<()> {
        let mut writer = BufWriter::new(std::fs::File::create(path)?);
        writer.write_all(&bytes)?;
        writer.flush()
    };
    write().map_err(|source| BackendError::Write {
        path: path.display().to_string(),
        source,
    })
}

impl ImageBackend for RustBackend {
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError> {
        let (width, height) = ImageReader::open(path)
            .map_err(BackendError::Io)?
            .with_guessed_format()
            .map_err(BackendError::Io)?
            .into_dimensions()
            .map_err(|e| {
                BackendError::ProcessingFailed(format!("Failed to read dimensions: {}", e))
            })?;
        Ok(Dimensions { width, height })
    }

    fn resize(&self, params: &ResizeParams) -> Result<Dimensions, BackendError> {
        let data = Bytes::from(std::fs::read(&params.source).map_err(BackendError::Io)?);
        let img = decode_bytes(&data, &params.source)?;

        let layout = calculate_fit_layout(
            (img.width(), img.height()),
            (params.width, params.height),
            params.fit,
        );
        let out = apply_layout(img, &layout);
        let encoded = encode_jpeg(&out, params.quality.value())?;
        save_with_exif(encoded, exif_segment(&data), &params.output)?;

        Ok(Dimensions {
            width: out.width(),
            height: out.height(),
        })
    }
}
