//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the operations every backend must
//! support: identify and resize.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), pure Rust, built on the
//! `image` crate with `img-parts` carrying EXIF across re-encodes.

use super::params::ResizeParams;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
    /// The output file could not be written; the image itself was fine.
    #[error("Failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result of an identify operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Trait for image processing backends.
///
/// `Sync` so derivative generation can fan out over rayon.
pub trait ImageBackend: Sync {
    /// Get image dimensions.
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError>;

    /// Write one derivative and return its final dimensions.
    ///
    /// Embedded metadata of `params.source` must be carried into
    /// `params.output`.
    fn resize(&self, params: &ResizeParams) -> Result<Dimensions, BackendError>;
}
