//! Geotag embedding.
//!
//! A [`TagWriter`] stamps capture time, GPS position and bearing into an
//! image file in place. Two writers ship:
//!
//! | Writer | How | Sidecar |
//! |---|---|---|
//! | [`ExifTagWriter`] | `kamadak-exif` builds the IFDs, `img-parts` splices the APP1 block | staging file, renamed over the target |
//! | [`ExiftoolTagWriter`] | external `exiftool` process | exiftool's `_original` backup |
//!
//! Both leave (or may leave) a file at [`sidecar_for`]`(target)`. The pipeline
//! registers that path as transient before calling the writer.
//!
//! Tags written:
//!
//! | Tag | Value |
//! |---|---|
//! | `DateTime`, `DateTimeOriginal`, `DateTimeDigitized` | `created_at` |
//! | `GPSLatitudeRef` / `GPSLatitude` | `N`/`S`, `|lat|` |
//! | `GPSLongitudeRef` / `GPSLongitude` | `E`/`W`, `|lon|` |
//! | `GPSDestBearingRef` / `GPSDestBearing` | `T`, `heading` |

use crate::config::{TaggerConfig, TaggerKind};
use crate::store::sidecar_for;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use exif::experimental::Writer;
use exif::{Field, In, Rational, Tag, Value};
use img_parts::jpeg::Jpeg;
use img_parts::png::Png;
use img_parts::{Bytes, ImageEXIF};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Cursor, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use thiserror::Error;

/// EXIF date format (`YYYY:MM:DD HH:MM:SS`).
const EXIF_DATE_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// Fractional seconds kept for GPS coordinates (1/10000 s ≈ 3 mm).
const SECONDS_DENOM: u64 = 10_000;

/// How often a running exiftool is checked against the deadline.
const EXIFTOOL_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Error, Debug)]
pub enum TagError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("EXIF error: {0}")]
    Exif(#[from] exif::Error),
    #[error("unsupported container: {0}")]
    Container(String),
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("{program} exited with {status}: {stderr}")]
    Tool {
        program: String,
        status: String,
        stderr: String,
    },
    #[error("{program} killed after the deadline elapsed")]
    DeadlineElapsed { program: String },
}

/// Location and capture time for one photo.
///
/// Coordinates are assumed to be range-checked by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTag {
    pub lon: f64,
    pub lat: f64,
    /// Camera bearing in degrees, relative to true north.
    pub heading: f64,
    pub created_at: DateTime<Utc>,
}

impl GeoTag {
    pub fn latitude_ref(&self) -> &'static str {
        if self.lat >= 0.0 { "N" } else { "S" }
    }

    pub fn longitude_ref(&self) -> &'static str {
        if self.lon >= 0.0 { "E" } else { "W" }
    }
}

/// Capability that writes a [`GeoTag`] into an image file in place.
pub trait TagWriter: Sync {
    fn write_tags(&self, path: &Path, tag: &GeoTag) -> Result<(), TagError>;

    /// Like [`write_tags`](Self::write_tags), but give up once `deadline`
    /// passes. Writers that can be interrupted return
    /// [`TagError::DeadlineElapsed`]; the rest run to completion.
    fn write_tags_until(
        &self,
        path: &Path,
        tag: &GeoTag,
        _deadline: Option<Instant>,
    ) -> Result<(), TagError> {
        self.write_tags(path, tag)
    }

    /// File the writer may leave next to `target`, whatever the outcome.
    fn sidecar_path(&self, target: &Path) -> Option<PathBuf> {
        Some(sidecar_for(target))
    }
}

impl<T: TagWriter + ?Sized> TagWriter for Box<T> {
    fn write_tags(&self, path: &Path, tag: &GeoTag) -> Result<(), TagError> {
        (**self).write_tags(path, tag)
    }

    fn write_tags_until(
        &self,
        path: &Path,
        tag: &GeoTag,
        deadline: Option<Instant>,
    ) -> Result<(), TagError> {
        (**self).write_tags_until(path, tag, deadline)
    }

    fn sidecar_path(&self, target: &Path) -> Option<PathBuf> {
        (**self).sidecar_path(target)
    }
}

/// Build the writer selected by `media.tagger`.
pub fn tagger_from_config(config: &TaggerConfig) -> Box<dyn TagWriter> {
    match config.kind {
        TaggerKind::Exif => Box::new(ExifTagWriter::new()),
        TaggerKind::Exiftool => Box::new(ExiftoolTagWriter::new(config.exiftool_path.clone())),
    }
}

// ============================================================================
// In-process writer
// ============================================================================

/// Rewrites the EXIF block without leaving the process.
///
/// Existing primary-IFD tags are kept; the geotag fields replace any
/// previous values. The result is staged next to the target and renamed
/// over it, so a failed write never truncates the original.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExifTagWriter;

impl ExifTagWriter {
    pub fn new() -> Self {
        Self
    }
}

impl TagWriter for ExifTagWriter {
    #[tracing::instrument(skip_all, fields(path = %path.display()))]
    fn write_tags(&self, path: &Path, tag: &GeoTag) -> Result<(), TagError> {
        let data = Bytes::from(fs::read(path)?);
        let mut encoded = Vec::new();

        if let Ok(mut jpeg) = Jpeg::from_bytes(data.clone()) {
            let exif = build_exif(jpeg.exif(), tag)?;
            jpeg.set_exif(Some(Bytes::from(exif)));
            jpeg.encoder().write_to(&mut encoded)?;
        } else if let Ok(mut png) = Png::from_bytes(data) {
            let exif = build_exif(png.exif(), tag)?;
            png.set_exif(Some(Bytes::from(exif)));
            png.encoder().write_to(&mut encoded)?;
        } else {
            return Err(TagError::Container(format!(
                "{} is neither JPEG nor PNG",
                path.display()
            )));
        }

        let staging = sidecar_for(path);
        {
            let mut writer = BufWriter::new(File::create(&staging)?);
            writer.write_all(&encoded)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&staging, path)?;
        Ok(())
    }
}

/// Fields owned by the geotag; anything else in the existing block is kept.
fn geotag_fields(tag: &GeoTag) -> Vec<Field> {
    let date = ascii(&tag.created_at.format(EXIF_DATE_FORMAT).to_string());
    let primary = |tag: Tag, value: Value| Field {
        tag,
        ifd_num: In::PRIMARY,
        value,
    };

    vec![
        primary(Tag::DateTime, date.clone()),
        primary(Tag::DateTimeOriginal, date.clone()),
        primary(Tag::DateTimeDigitized, date),
        primary(Tag::GPSVersionID, Value::Byte(vec![2, 3, 0, 0])),
        primary(Tag::GPSLatitudeRef, ascii(tag.latitude_ref())),
        primary(Tag::GPSLatitude, Value::Rational(to_dms(tag.lat.abs()).to_vec())),
        primary(Tag::GPSLongitudeRef, ascii(tag.longitude_ref())),
        primary(Tag::GPSLongitude, Value::Rational(to_dms(tag.lon.abs()).to_vec())),
        primary(Tag::GPSDestBearingRef, ascii("T")),
        primary(
            Tag::GPSDestBearing,
            Value::Rational(vec![Rational {
                num: (tag.heading.rem_euclid(360.0) * 100.0).round() as u32,
                denom: 100,
            }]),
        ),
    ]
}

fn ascii(s: &str) -> Value {
    Value::Ascii(vec![s.as_bytes().to_vec()])
}

/// Tags the EXIF writer lays out itself.
const LAYOUT_TAGS: [Tag; 7] = [
    Tag::ExifIFDPointer,
    Tag::GPSInfoIFDPointer,
    Tag::InteropIFDPointer,
    Tag::JPEGInterchangeFormat,
    Tag::JPEGInterchangeFormatLength,
    Tag::StripOffsets,
    Tag::StripByteCounts,
];

fn is_carried_over(field: &Field) -> bool {
    field.ifd_num == In::PRIMARY
        && !matches!(field.value, Value::Unknown(..))
        && !LAYOUT_TAGS.contains(&field.tag)
}

/// Serialize existing primary-IFD fields plus the geotag into a TIFF block.
fn build_exif(existing: Option<Bytes>, tag: &GeoTag) -> Result<Vec<u8>, TagError> {
    let geotag = geotag_fields(tag);
    let mut kept = Vec::new();
    let mut little_endian = false;

    if let Some(raw) = existing {
        match exif::Reader::new().read_raw(raw.to_vec()) {
            Ok(parsed) => {
                little_endian = parsed.little_endian();
                kept = parsed
                    .fields()
                    .filter(|f| is_carried_over(f) && !geotag.iter().any(|g| g.tag == f.tag))
                    .cloned()
                    .collect();
            }
            Err(e) => tracing::warn!(error = %e, "Existing EXIF unreadable, replacing it"),
        }
    }

    let mut writer = Writer::new();
    for field in kept.iter().chain(geotag.iter()) {
        writer.push_field(field);
    }
    let mut buf = Cursor::new(Vec::new());
    writer.write(&mut buf, little_endian)?;
    Ok(buf.into_inner())
}

/// Split decimal degrees into degree, minute and second rationals.
fn to_dms(degrees: f64) -> [Rational; 3] {
    let total = (degrees * 3600.0 * SECONDS_DENOM as f64).round() as u64;
    let deg = total / (3600 * SECONDS_DENOM);
    let rem = total % (3600 * SECONDS_DENOM);
    let min = rem / (60 * SECONDS_DENOM);
    let sec = rem % (60 * SECONDS_DENOM);
    [
        Rational {
            num: deg as u32,
            denom: 1,
        },
        Rational {
            num: min as u32,
            denom: 1,
        },
        Rational {
            num: sec as u32,
            denom: SECONDS_DENOM as u32,
        },
    ]
}

fn from_dms(parts: &[Rational]) -> Option<f64> {
    let [deg, min, sec] = parts else {
        return None;
    };
    Some(deg.to_f64() + min.to_f64() / 60.0 + sec.to_f64() / 3600.0)
}

// ============================================================================
// Reading tags back
// ============================================================================

/// Read the geotag stored in `path`, if it has a complete one.
pub fn read_geotag(path: &Path) -> Result<Option<GeoTag>, TagError> {
    let mut reader = BufReader::new(File::open(path)?);
    let exif = match exif::Reader::new().read_from_container(&mut reader) {
        Ok(exif) => exif,
        Err(exif::Error::NotFound(_)) => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let ascii_of = |tag: Tag| match exif.get_field(tag, In::PRIMARY).map(|f| &f.value) {
        Some(Value::Ascii(parts)) => parts
            .first()
            .map(|p| String::from_utf8_lossy(p).trim_end_matches('\0').to_string()),
        _ => None,
    };
    let rationals_of = |tag: Tag| match exif.get_field(tag, In::PRIMARY).map(|f| &f.value) {
        Some(Value::Rational(parts)) => Some(parts.clone()),
        _ => None,
    };

    let (Some(lat_ref), Some(lat), Some(lon_ref), Some(lon)) = (
        ascii_of(Tag::GPSLatitudeRef),
        rationals_of(Tag::GPSLatitude).as_deref().and_then(from_dms),
        ascii_of(Tag::GPSLongitudeRef),
        rationals_of(Tag::GPSLongitude).as_deref().and_then(from_dms),
    ) else {
        return Ok(None);
    };
    let heading = rationals_of(Tag::GPSDestBearing)
        .and_then(|parts| parts.first().map(|r| r.to_f64()))
        .unwrap_or_default();
    let Some(created_at) = ascii_of(Tag::DateTimeOriginal)
        .and_then(|s| NaiveDateTime::parse_from_str(&s, EXIF_DATE_FORMAT).ok())
        .map(|naive| naive.and_utc())
    else {
        return Ok(None);
    };

    Ok(Some(GeoTag {
        lat: if lat_ref == "S" { -lat } else { lat },
        lon: if lon_ref == "W" { -lon } else { lon },
        heading,
        created_at,
    }))
}

// ============================================================================
// exiftool writer
// ============================================================================

/// Shells out to `exiftool`.
///
/// exiftool keeps the untouched file as `{target}_original`; the pipeline
/// removes it after the call. With a deadline the process is killed once it
/// passes.
#[derive(Debug, Clone)]
pub struct ExiftoolTagWriter {
    program: String,
}

impl ExiftoolTagWriter {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for ExiftoolTagWriter {
    fn default() -> Self {
        Self::new("exiftool")
    }
}

/// Command-line arguments exiftool needs to write `tag` into `path`.
pub fn exiftool_args(path: &Path, tag: &GeoTag) -> Vec<String> {
    vec![
        format!(
            "-AllDates={}",
            tag.created_at.to_rfc3339_opts(SecondsFormat::Secs, true)
        ),
        format!("-GPSLatitudeRef={}", tag.latitude_ref()),
        format!("-GPSLatitude={}", tag.lat.abs()),
        format!("-GPSLongitudeRef={}", tag.longitude_ref()),
        format!("-GPSLongitude={}", tag.lon.abs()),
        "-GPSDestBearingRef=T".to_string(),
        format!("-GPSDestBearing={}", tag.heading),
        path.display().to_string(),
    ]
}

impl TagWriter for ExiftoolTagWriter {
    fn write_tags(&self, path: &Path, tag: &GeoTag) -> Result<(), TagError> {
        self.write_tags_until(path, tag, None)
    }

    #[tracing::instrument(skip_all, fields(
        process.executable.name = "exiftool",
        process.executable.path = %self.program,
        path = %path.display()
    ))]
    fn write_tags_until(
        &self,
        path: &Path,
        tag: &GeoTag,
        deadline: Option<Instant>,
    ) -> Result<(), TagError> {
        let mut child = Command::new(&self.program)
            .args(exiftool_args(path, tag))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| TagError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if let Some(deadline) = deadline {
            while child.try_wait()?.is_none() {
                if Instant::now() >= deadline {
                    if let Err(e) = child.kill() {
                        tracing::warn!(error = %e, "Failed to kill exiftool");
                    }
                    child.wait()?;
                    return Err(TagError::DeadlineElapsed {
                        program: self.program.clone(),
                    });
                }
                std::thread::sleep(EXIFTOOL_POLL_INTERVAL);
            }
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(TagError::Tool {
                program: self.program.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}
