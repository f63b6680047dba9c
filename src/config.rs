//! Media pipeline configuration.
//!
//! Handles loading, validating, and merging `geoshot.toml`. Stock defaults
//! are serialized to a TOML value and the user file is deep-merged on top, so
//! a config file only needs the keys it wants to override.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [media]
//! base_url = "http://localhost:3000/media"  # Public prefix for derivative URLs
//! quality = 90                              # JPEG quality for derivatives (1-100)
//!
//! [media.store]
//! path = "media"            # Store root, relative to the application base dir
//!
//! [[media.sizes]]           # Replaces the whole default table when given
//! id = "thumb"
//! width = 300
//! height = 300
//! fit = "cover"             # cover | contain | fill | inside | outside
//!
//! [media.tagger]
//! kind = "exif"             # "exif" (in-process) or "exiftool" (external)
//! exiftool_path = "exiftool"
//!
//! [media.processing]
//! parallel = false          # Generate derivatives on the rayon pool
//! max_processes = 4         # Max parallel workers (omit for auto = CPU cores)
//! ```
//!
//! Arrays are not merged element-wise: a `[[media.sizes]]` entry in the user
//! file replaces the stock size table.
//!
//! Unknown keys are rejected to catch typos early.

use crate::imaging::Fit;
use crate::store::is_valid_name;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Root of `geoshot.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub media: MediaConfig,
}

impl AppConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.media.validate()
    }
}

/// Everything the ingestion pipeline and URL resolver read at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MediaConfig {
    /// Public prefix under which the store root is served.
    pub base_url: String,
    /// JPEG encoding quality for derivatives (1 = worst, 100 = best).
    pub quality: u32,
    pub store: StoreConfig,
    /// Derivative size table. Order is fixed at load time.
    pub sizes: Vec<SizeSpec>,
    pub tagger: TaggerConfig,
    pub processing: ProcessingConfig,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000/media".to_string(),
            quality: 90,
            store: StoreConfig::default(),
            sizes: vec![
                SizeSpec::new("thumb", 300, 300, Fit::Cover),
                SizeSpec::new("medium", 800, 800, Fit::Inside),
                SizeSpec::new("large", 1600, 1600, Fit::Inside),
            ],
            tagger: TaggerConfig::default(),
            processing: ProcessingConfig::default(),
        }
    }
}

impl MediaConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::Validation(
                "media.base_url must not be empty".into(),
            ));
        }
        if self.quality == 0 || self.quality > 100 {
            return Err(ConfigError::Validation("media.quality must be 1-100".into()));
        }
        if self.store.path.trim().is_empty() {
            return Err(ConfigError::Validation(
                "media.store.path must not be empty".into(),
            ));
        }
        if self.sizes.is_empty() {
            return Err(ConfigError::Validation(
                "media.sizes must not be empty".into(),
            ));
        }

        let mut seen = HashSet::new();
        for size in &self.sizes {
            if !is_valid_name(&size.id) {
                return Err(ConfigError::Validation(format!(
                    "media.sizes id {:?} is not a valid file name fragment",
                    size.id
                )));
            }
            if size.width == 0 || size.height == 0 {
                return Err(ConfigError::Validation(format!(
                    "media.sizes '{}' must have non-zero width and height",
                    size.id
                )));
            }
            if !seen.insert(size.id.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "media.sizes id '{}' is defined more than once",
                    size.id
                )));
            }
        }
        Ok(())
    }

    /// Resolve the store root against the application base directory.
    ///
    /// Absolute `store.path` values are used as-is.
    pub fn store_root(&self, base_dir: &Path) -> PathBuf {
        let path = Path::new(&self.store.path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }
}

/// Where the original and derivative files live.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Filesystem root, relative to the application base directory.
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: "media".to_string(),
        }
    }
}

/// One row of the derivative size table.
///
/// All fields are required; a size entry has no meaningful defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SizeSpec {
    /// Suffix used in file names and URLs (`{id}-{size}.jpg`).
    pub id: String,
    pub width: u32,
    pub height: u32,
    pub fit: Fit,
}

impl SizeSpec {
    pub fn new(id: impl Into<String>, width: u32, height: u32, fit: Fit) -> Self {
        Self {
            id: id.into(),
            width,
            height,
            fit,
        }
    }
}

/// Which geotag writer the pipeline uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaggerKind {
    /// In-process EXIF rewrite.
    #[default]
    Exif,
    /// External `exiftool` process.
    Exiftool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TaggerConfig {
    pub kind: TaggerKind,
    /// Binary invoked when `kind = "exiftool"`.
    pub exiftool_path: String,
}

impl Default for TaggerConfig {
    fn default() -> Self {
        Self {
            kind: TaggerKind::Exif,
            exiftool_path: "exiftool".to_string(),
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Generate the derivatives of one photo concurrently.
    pub parallel: bool,
    /// Maximum number of parallel image processing workers.
    /// When absent or null, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

/// Stock defaults as a TOML value, the base layer every user file merges onto.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(AppConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay (arrays included) replace base values entirely.
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

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<AppConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: AppConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from the given file.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// and validates the result. A missing file yields the stock defaults.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let base = stock_defaults_value();
    let overlay = load_raw_config(path)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `geoshot.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# geoshot configuration
# =====================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys will cause an error.

[media]
# Public prefix under which the store root is served. Derivative URLs are
# "{base_url}/{id}-{size}.jpg".
base_url = "http://localhost:3000/media"

# JPEG encoding quality for derivatives (1 = worst, 100 = best).
quality = 90

# ---------------------------------------------------------------------------
# Store
# ---------------------------------------------------------------------------
[media.store]
# Directory holding originals and derivatives. Relative paths are resolved
# against the application base directory (--base-dir).
path = "media"

# ---------------------------------------------------------------------------
# Derivative sizes
# ---------------------------------------------------------------------------
# Each entry produces "{id}-{size id}.jpg". Declaring any entry replaces the
# whole table. fit is one of:
#   cover   - fill both dimensions, crop the excess
#   contain - fit within both dimensions, letterbox the rest
#   fill    - stretch to the exact dimensions
#   inside  - fit within, never upscale
#   outside - cover both dimensions, never downscale
[[media.sizes]]
id = "thumb"
width = 300
height = 300
fit = "cover"

[[media.sizes]]
id = "medium"
width = 800
height = 800
fit = "inside"

[[media.sizes]]
id = "large"
width = 1600
height = 1600
fit = "inside"

# ---------------------------------------------------------------------------
# Geotag writer
# ---------------------------------------------------------------------------
[media.tagger]
# "exif" rewrites the EXIF block in-process; "exiftool" shells out.
kind = "exif"

# Binary used when kind = "exiftool".
exiftool_path = "exiftool"

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[media.processing]
# Generate the derivatives of one photo concurrently.
parallel = false

# Maximum parallel image-processing workers.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4
"##
}
