//! Pure calculation functions for derivative dimensions.
//!
//! All functions here are pure and testable without any I/O or images.
//! The backend turns a [`FitLayout`] into pixels: resample to `scaled`, then
//! apply the [`Placement`] to reach `canvas`.

use super::params::Fit;

/// How the resampled image lands on the output canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// The resampled image is the output.
    Exact,
    /// Crop a `canvas`-sized window starting at `(x, y)` of the resampled image.
    Crop { x: u32, y: u32 },
    /// Paste the resampled image at `(x, y)` onto an empty `canvas`.
    Pad { x: u32, y: u32 },
}

/// Resolved geometry for one derivative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FitLayout {
    /// Dimensions the source is resampled to.
    pub scaled: (u32, u32),
    /// Final output dimensions.
    pub canvas: (u32, u32),
    pub placement: Placement,
}

impl FitLayout {
    fn exact(dims: (u32, u32)) -> Self {
        Self {
            scaled: dims,
            canvas: dims,
            placement: Placement::Exact,
        }
    }
}

/// Calculate dimensions needed to fill a target area (resize before crop).
///
/// Returns dimensions that completely cover the target area while maintaining
/// the source aspect ratio. One dimension will match exactly, the other may exceed.
///
/// # Arguments
/// * `source` - Original image dimensions (width, height)
/// * `target` - Target area dimensions (width, height)
///
/// # Returns
/// * `(width, height)` - Fill dimensions (at least one matches target)
pub fn calculate_fill_dimensions(source: (u32, u32), target: (u32, u32)) -> (u32, u32) {
    let (src_w, src_h) = source;
    let (tgt_w, tgt_h) = target;

    let src_aspect = src_w as f64 / src_h as f64;
    let tgt_aspect = tgt_w as f64 / tgt_h as f64;

    if src_aspect > tgt_aspect {
        // Source is wider: height will match, width will exceed
        let h = tgt_h;
        let w = ((h as f64 * src_aspect).round() as u32).max(tgt_w);
        (w, h)
    } else {
        // Source is taller: width will match, height will exceed
        let w = tgt_w;
        let h = ((w as f64 / src_aspect).round() as u32).max(tgt_h);
        (w, h)
    }
}

/// Calculate the largest dimensions that fit within a target area.
///
/// Aspect ratio is preserved; one dimension matches the target, the other is
/// at most the target. Never returns a zero dimension.
pub fn calculate_fit_within_dimensions(source: (u32, u32), target: (u32, u32)) -> (u32, u32) {
    let (src_w, src_h) = source;
    let (tgt_w, tgt_h) = target;

    let ratio = (tgt_w as f64 / src_w as f64).min(tgt_h as f64 / src_h as f64);
    let w = ((src_w as f64 * ratio).round() as u32).clamp(1, tgt_w);
    let h = ((src_h as f64 * ratio).round() as u32).clamp(1, tgt_h);
    (w, h)
}

/// Resolve the resample size and canvas for a derivative.
///
/// | Fit | Output |
/// |---|---|
/// | `cover` | exactly `target`, centre-cropped |
/// | `contain` | exactly `target`, centred and letterboxed |
/// | `fill` | exactly `target`, aspect ignored |
/// | `inside` | fits within `target`, never larger than `source` |
/// | `outside` | covers `target`, never smaller than `source` |
pub fn calculate_fit_layout(source: (u32, u32), target: (u32, u32), fit: Fit) -> FitLayout {
    let (src_w, src_h) = source;
    let (tgt_w, tgt_h) = target;

    match fit {
        Fit::Fill => FitLayout::exact(target),
        Fit::Cover => {
            let scaled = calculate_fill_dimensions(source, target);
            FitLayout {
                scaled,
                canvas: target,
                placement: Placement::Crop {
                    x: (scaled.0 - tgt_w) / 2,
                    y: (scaled.1 - tgt_h) / 2,
                },
            }
        }
        Fit::Contain => {
            let scaled = calculate_fit_within_dimensions(source, target);
            FitLayout {
                scaled,
                canvas: target,
                placement: Placement::Pad {
                    x: (tgt_w - scaled.0) / 2,
                    y: (tgt_h - scaled.1) / 2,
                },
            }
        }
        Fit::Inside => {
            if src_w <= tgt_w && src_h <= tgt_h {
                FitLayout::exact(source)
            } else {
                FitLayout::exact(calculate_fit_within_dimensions(source, target))
            }
        }
        Fit::Outside => {
            if src_w >= tgt_w && src_h >= tgt_h {
                FitLayout::exact(source)
            } else {
                FitLayout::exact(calculate_fill_dimensions(source, target))
            }
        }
    }
}
