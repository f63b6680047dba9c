//! Image processing in pure Rust.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | `image::ImageReader::into_dimensions` |
//! | **Resize → JPEG** | Lanczos3 + `JpegEncoder`, per [`Fit`] policy |
//! | **EXIF carry-over** | `img-parts` APP1 segment copy |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for fit geometry (unit testable)
//! - **Parameters**: Data structures describing image operations
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Operations**: High-level functions combining calculations + backend

pub mod backend;
mod calculations;
pub mod operations;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, Dimensions, ImageBackend};
pub use calculations::{FitLayout, Placement, calculate_fit_layout};
pub use operations::{
    DerivativeFailure, DerivativeJob, GeneratedDerivative, create_derivatives, get_dimensions,
    plan_derivative,
};
pub use params::{Fit, Quality, ResizeParams};
pub use rust_backend::RustBackend;
