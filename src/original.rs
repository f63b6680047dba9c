//! Canonical original persistence.
//!
//! The upload arrives as a base64 string. It is decoded and written to the
//! store verbatim: no re-encode, so any metadata already embedded by the
//! camera survives untouched.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OriginalError {
    #[error("payload is not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),
    #[error("payload decoded to zero bytes")]
    Empty,
    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// Decode a standard-alphabet base64 payload.
///
/// Leading and trailing whitespace is ignored; embedded whitespace is not.
pub fn decode_payload(payload: &str) -> Result<Vec<u8>, OriginalError> {
    let bytes = STANDARD.decode(payload.trim())?;
    if bytes.is_empty() {
        return Err(OriginalError::Empty);
    }
    Ok(bytes)
}

/// Write `bytes` to `path`, flushed and synced.
pub fn write_original(path: &Path, bytes: &[u8]) -> Result<(), OriginalError> {
    let write = || -> io::Result<()> {
        let mut file = File::create(path)?;
        file.write_all(bytes)?;
        file.sync_all()
    };
    write().map_err(|source| OriginalError::Write {
        path: path.display().to_string(),
        source,
    })
}
