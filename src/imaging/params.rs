//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it. They are the
//! interface between the high-level [`operations`](super::operations) module
//! (which decides what derivatives to create) and the [`backend`](super::backend)
//! (which does the actual pixel work). This separation allows swapping backends
//! (e.g. for testing with a mock) without changing operation logic.
//!
//! ## Types
//!
//! - [`Fit`]: how source aspect ratio interacts with the target box.
//! - [`Quality`]: JPEG encoding quality (1–100, default 90). Clamped on construction.
//! - [`ResizeParams`]: full specification for one derivative: source, output, box, fit, quality.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Resize strategy for a derivative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Fit {
    /// Scale to fill both dimensions, cropping the excess.
    Cover,
    /// Scale to fit within both dimensions, letterboxing the remainder.
    Contain,
    /// Stretch each axis independently to the exact dimensions.
    Fill,
    /// Scale to fit within both dimensions, never upscale.
    Inside,
    /// Scale to cover both dimensions, never downscale.
    Outside,
}

impl fmt::Display for Fit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Fit::Cover => "cover",
            Fit::Contain => "contain",
            Fit::Fill => "fill",
            Fit::Inside => "inside",
            Fit::Outside => "outside",
        };
        f.write_str(name)
    }
}

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(90)
    }
}

/// Parameters for one derivative resize.
#[derive(Debug, Clone, PartialEq)]
pub struct ResizeParams {
    pub source: PathBuf,
    pub output: PathBuf,
    /// Target box.
    pub width: u32,
    pub height: u32,
    pub fit: Fit,
    pub quality: Quality,
}
