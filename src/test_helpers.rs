//! Shared test utilities for the geoshot test suite.
//!
//! Synthetic images are generated in memory so tests never depend on
//! fixture files.
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let payload = jpeg_payload(100, 100);
//! let tmp = TempDir::new().unwrap();
//! // ... ingest ...
//! assert_eq!(store_files(tmp.path()), vec!["p1-thumb.jpg", "p1.jpg"]);
//! ```

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, RgbImage};
use std::io::Cursor;
use std::path::Path;

fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x * 7 % 256) as u8, (y * 11 % 256) as u8, 128])
    })
}

/// Encode a gradient as a baseline JPEG.
pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut buf = Vec::new();
    gradient(width, height)
        .write_with_encoder(JpegEncoder::new_with_quality(&mut buf, 85))
        .unwrap();
    buf
}

/// Encode a gradient as PNG.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    gradient(width, height)
        .write_to(&mut buf, ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

/// Base64 upload payload for a `width`×`height` JPEG.
pub fn jpeg_payload(width: u32, height: u32) -> String {
    STANDARD.encode(jpeg_bytes(width, height))
}

/// Sorted file names directly under `dir`.
pub fn store_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
