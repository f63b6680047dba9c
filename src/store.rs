//! Media store layout.
//!
//! Every media id maps to a fixed set of file names under the store root:
//!
//! ```text
//! media/
//! ├── {id}.jpg                 # tagged original
//! ├── {id}-{size}.jpg          # one per configured size
//! └── {id}.jpg_original        # tag-writer sidecar, never survives an ingest
//! ```
//!
//! Path resolution is pure. The only I/O here is [`StorePaths::reset_store`]
//! and [`StorePaths::ensure_root`].

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Extension of originals and derivatives.
pub const MEDIA_EXTENSION: &str = "jpg";

/// Suffix appended to the original's file name for the tag-writer sidecar.
pub const SIDECAR_SUFFIX: &str = "_original";

/// Resolves file paths for media ids under a fixed store root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    root: PathBuf,
}

impl StorePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `{root}/{id}.jpg`
    pub fn original_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{id}.{MEDIA_EXTENSION}"))
    }

    /// `{root}/{id}-{size_id}.jpg`
    pub fn derivative_path(&self, id: &str, size_id: &str) -> PathBuf {
        self.root.join(format!("{id}-{size_id}.{MEDIA_EXTENSION}"))
    }

    /// Create the store root if it does not exist yet.
    pub fn ensure_root(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root)
    }

    /// Delete everything inside the store root, keeping the root itself.
    ///
    /// Creates the root when missing. Destructive and process-wide: callers
    /// must make sure no ingest is in flight.
    pub fn reset_store(&self) -> io::Result<()> {
        if !self.root.exists() {
            return fs::create_dir_all(&self.root);
        }
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                fs::remove_dir_all(&path)?;
            } else {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }
}

/// Whether `name` stays a single file-name fragment once joined onto the
/// store root. Applies to media ids and size ids alike.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(['/', '\\', '\0']) && !name.contains("..")
}

/// Sidecar path for an arbitrary file: the file name with [`SIDECAR_SUFFIX`] appended.
pub fn sidecar_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(SIDECAR_SUFFIX);
    path.with_file_name(name)
}
