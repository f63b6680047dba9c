//! # Geoshot
//!
//! Photo ingestion for location-aware capture apps. A client uploads a photo
//! as a base64 string together with where and when it was taken; geoshot
//! stores the original with that information embedded as EXIF and produces a
//! set of resized JPEG derivatives that carry the same metadata.
//!
//! # Architecture: One Pipeline, Strict Order
//!
//! ```text
//! 1. Decode     payload   →  bytes           (nothing on disk yet)
//! 2. Store      bytes     →  {id}.jpg        (verbatim original)
//! 3. Tag        {id}.jpg  →  {id}.jpg        (capture date, GPS, bearing)
//! 4. Resize     {id}.jpg  →  {id}-{size}.jpg (one per size-table entry)
//! ```
//!
//! Derivatives are produced from the tagged original, never from the upload,
//! so every file in the store carries the geotag. Any failure rolls back
//! every file the call created; the store never holds a half-ingested id.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`pipeline`] | `Pipeline::ingest`: composes the steps under one cleanup guard |
//! | [`original`] | Base64 decoding and verbatim original write |
//! | [`geotag`] | `TagWriter` trait, in-process EXIF writer, exiftool writer |
//! | [`imaging`] | Fit geometry, `ImageBackend` trait, pure-Rust resize backend |
//! | [`cleanup`] | RAII guard that deletes acquired files unless committed |
//! | [`store`] | Store layout: original, derivative and sidecar paths, store reset |
//! | [`urls`] | Public URLs for stored media |
//! | [`config`] | `geoshot.toml` loading, merging onto stock defaults, validation |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Capabilities as Traits
//!
//! Image work goes through [`imaging::ImageBackend`] and metadata work
//! through [`geotag::TagWriter`]. The pipeline is generic over both, so tests
//! run the whole flow against recording mocks without decoding a pixel, and
//! deployments can switch between the in-process EXIF writer and exiftool
//! with one config key.
//!
//! ## Cleanup by Ownership
//!
//! Every file is registered with [`cleanup::CleanupGuard`] before the step
//! that may create it. Early returns and panics drop the guard, which
//! removes the registered files in reverse order. Only a committed guard
//! leaves the original and derivatives behind. The tag writer's sidecar is
//! removed either way.
//!
//! ## Explicit Configuration
//!
//! The size table, base URL and store root are loaded once into
//! [`config::MediaConfig`] and handed to [`pipeline::Pipeline::new`]. There
//! are no globals; two pipelines with different stores can coexist.

pub mod cleanup;
pub mod config;
pub mod geotag;
pub mod imaging;
pub mod original;
pub mod output;
pub mod pipeline;
pub mod store;
pub mod urls;

#[cfg(test)]
pub(crate) mod test_helpers;
