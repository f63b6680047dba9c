//! CLI output formatting.
//!
//! # Information-First Display
//!
//! Every entity leads with its identity (media id, size id) and shows
//! filesystem paths and URLs as indented context lines, so the output reads
//! as an inventory of what was stored.
//!
//! # Output Format
//!
//! ## Ingest
//!
//! ```text
//! p1 → media/p1.jpg
//!     URL: http://localhost:3000/media/p1.jpg
//!     001 thumb 300x300 → media/p1-thumb.jpg
//!         URL: http://localhost:3000/media/p1-thumb.jpg
//!     002 large 1600x1200 → media/p1-large.jpg
//!         URL: http://localhost:3000/media/p1-large.jpg
//!
//! Stored 1 original, 2 derivatives
//! ```
//!
//! ## Urls
//!
//! ```text
//! p1
//!     original → http://localhost:3000/media/p1.jpg
//!     thumb → http://localhost:3000/media/p1-thumb.jpg
//! ```
//!
//! ## Inspect
//!
//! ```text
//! media/p1.jpg
//!     Dimensions: 1600x1200
//!     Captured: 2023-01-01T00:00:00Z
//!     Position: 30.000000 S, 30.000000 E
//!     Heading: 8.00° T
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::geotag::GeoTag;
use crate::pipeline::{IngestError, IngestReport};
use crate::urls::SizeUrls;
use chrono::SecondsFormat;
use std::path::Path;

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Show `path` relative to `root` when it lives underneath it.
fn display_path(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{n} {word}")
    } else {
        format!("{n} {word}s")
    }
}

// ============================================================================
// Ingest
// ============================================================================

pub fn format_ingest_report(report: &IngestReport, root: &Path) -> Vec<String> {
    let mut lines = vec![
        format!(
            "{} \u{2192} {}",
            report.id,
            display_path(&report.original, root)
        ),
        format!("    URL: {}", report.original_url),
    ];

    for (idx, derivative) in report.derivatives.iter().enumerate() {
        lines.push(format!(
            "    {} {} {}x{} \u{2192} {}",
            format_index(idx + 1),
            derivative.size_id,
            derivative.width,
            derivative.height,
            display_path(&derivative.path, root)
        ));
        if let Some(url) = report.urls.get(&derivative.size_id) {
            lines.push(format!("        URL: {}", url));
        }
    }

    lines.push(String::new());
    lines.push(format!(
        "Stored 1 original, {}",
        plural(report.derivatives.len(), "derivative")
    ));
    lines
}

pub fn print_ingest_report(report: &IngestReport, root: &Path) {
    for line in format_ingest_report(report, root) {
        println!("{}", line);
    }
}

/// Format an ingest failure, classified the way a request layer would map it.
pub fn format_ingest_error(err: &IngestError) -> Vec<String> {
    let class = if err.is_client_error() {
        "rejected payload"
    } else {
        "server error"
    };
    vec![
        format!("Ingest failed ({}): {}", class, err),
        "    Store rolled back".to_string(),
    ]
}

pub fn print_ingest_error(err: &IngestError) {
    for line in format_ingest_error(err) {
        eprintln!("{}", line);
    }
}

// ============================================================================
// Urls
// ============================================================================

pub fn format_urls(id: &str, original_url: &str, urls: &SizeUrls) -> Vec<String> {
    let mut lines = vec![
        id.to_string(),
        format!("    original \u{2192} {}", original_url),
    ];
    lines.extend(
        urls.iter()
            .map(|(size_id, url)| format!("    {} \u{2192} {}", size_id, url)),
    );
    lines
}

pub fn print_urls(id: &str, original_url: &str, urls: &SizeUrls) {
    for line in format_urls(id, original_url, urls) {
        println!("{}", line);
    }
}

// ============================================================================
// Inspect
// ============================================================================

pub fn format_inspect(path: &Path, dimensions: (u32, u32), tag: Option<&GeoTag>) -> Vec<String> {
    let mut lines = vec![
        path.display().to_string(),
        format!("    Dimensions: {}x{}", dimensions.0, dimensions.1),
    ];
    match tag {
        Some(tag) => {
            lines.push(format!(
                "    Captured: {}",
                tag.created_at.to_rfc3339_opts(SecondsFormat::Secs, true)
            ));
            lines.push(format!(
                "    Position: {:.6} {}, {:.6} {}",
                tag.lat.abs(),
                tag.latitude_ref(),
                tag.lon.abs(),
                tag.longitude_ref()
            ));
            lines.push(format!("    Heading: {:.2}\u{b0} T", tag.heading));
        }
        None => lines.push("    Geotag: none".to_string()),
    }
    lines
}

pub fn print_inspect(path: &Path, dimensions: (u32, u32), tag: Option<&GeoTag>) {
    for line in format_inspect(path, dimensions, tag) {
        println!("{}", line);
    }
}
