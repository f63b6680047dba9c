//! High-level image operations.
//!
//! These functions combine calculations with backend execution.
//! They take a size table, compute parameters, and call the backend.

use super::backend::{BackendError, ImageBackend};
use super::params::{Fit, Quality, ResizeParams};
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for image operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// Get image dimensions using the backend.
pub fn get_dimensions(backend: &impl ImageBackend, path: &Path) -> Result<(u32, u32)> {
    let dims = backend.identify(path)?;
    Ok((dims.width, dims.height))
}

/// One derivative to produce.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivativeJob {
    pub size_id: String,
    pub params: ResizeParams,
}

/// A derivative that was written to disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedDerivative {
    pub size_id: String,
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

/// The first derivative (in table order) that could not be produced.
#[derive(Error, Debug)]
#[error("derivative '{size_id}' failed: {source}")]
pub struct DerivativeFailure {
    pub size_id: String,
    #[source]
    pub source: BackendError,
}

/// Plan a derivative resize without executing it.
pub fn plan_derivative(
    source: &Path,
    output: &Path,
    size_id: &str,
    (width, height): (u32, u32),
    fit: Fit,
    quality: Quality,
) -> DerivativeJob {
    DerivativeJob {
        size_id: size_id.to_string(),
        params: ResizeParams {
            source: source.to_path_buf(),
            output: output.to_path_buf(),
            width,
            height,
            fit,
            quality,
        },
    }
}

fn run_job(backend: &impl ImageBackend, job: &DerivativeJob) -> std::result::Result<GeneratedDerivative, DerivativeFailure> {
    backend
        .resize(&job.params)
        .map(|dims| GeneratedDerivative {
            size_id: job.size_id.clone(),
            path: job.params.output.clone(),
            width: dims.width,
            height: dims.height,
        })
        .map_err(|source| DerivativeFailure {
            size_id: job.size_id.clone(),
            source,
        })
}

/// Produce every derivative in `jobs`.
///
/// `on_attempt` is called with each output path immediately before the
/// backend touches it, so a caller can account for partially written files.
///
/// Sequentially, jobs run in table order and stop at the first failure.
/// In parallel, every job runs on the rayon pool; outputs come back in table
/// order and the first failure in table order is reported.
pub fn create_derivatives<F>(
    backend: &impl ImageBackend,
    jobs: &[DerivativeJob],
    parallel: bool,
    on_attempt: F,
) -> std::result::Result<Vec<GeneratedDerivative>, DerivativeFailure>
where
    F: Fn(&Path) + Sync,
{
    if !parallel {
        let mut generated = Vec::with_capacity(jobs.len());
        for job in jobs {
            on_attempt(&job.params.output);
            generated.push(run_job(backend, job)?);
        }
        return Ok(generated);
    }

    let results: Vec<_> = jobs
        .par_iter()
        .map(|job| {
            on_attempt(&job.params.output);
            run_job(backend, job)
        })
        .collect();
    results.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::Dimensions;
    use crate::imaging::backend::tests::{MockBackend, RecordedOp};
    use std::sync::Mutex;

    fn jobs(ids: &[(&str, Fit)]) -> Vec<DerivativeJob> {
        ids.iter()
            .map(|(id, fit)| {
                plan_derivative(
                    Path::new("/store/p1.jpg"),
                    &PathBuf::from(format!("/store/p1-{id}.jpg")),
                    id,
                    (50, 50),
                    *fit,
                    Quality::new(85),
                )
            })
            .collect()
    }

    #[test]
    fn get_dimensions_calls_backend() {
        let backend = MockBackend {
            source_dims: Dimensions {
                width: 1920,
                height: 1080,
            },
            ..MockBackend::default()
        };
        let dims = get_dimensions(&backend, Path::new("/test.jpg")).unwrap();
        assert_eq!(dims, (1920, 1080));
    }

    #[test]
    fn plan_derivative_fills_params() {
        let job = plan_derivative(
            Path::new("/store/p1.jpg"),
            Path::new("/store/p1-thumb.jpg"),
            "thumb",
            (64, 32),
            Fit::Contain,
            Quality::new(70),
        );
        assert_eq!(job.size_id, "thumb");
        assert_eq!(job.params.width, 64);
        assert_eq!(job.params.height, 32);
        assert_eq!(job.params.fit, Fit::Contain);
        assert_eq!(job.params.quality.value(), 70);
    }

    #[test]
    fn sequential_runs_in_table_order() {
        let backend = MockBackend::new();
        let generated = create_derivatives(
            &backend,
            &jobs(&[("thumb", Fit::Cover), ("medium", Fit::Inside)]),
            false,
            |_| {},
        )
        .unwrap();

        let ids: Vec<&str> = generated.iter().map(|g| g.size_id.as_str()).collect();
        assert_eq!(ids, vec!["thumb", "medium"]);

        let outputs: Vec<String> = backend
            .get_operations()
            .into_iter()
            .map(|op| match op {
                RecordedOp::Resize { output, .. } => output,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(outputs, vec!["/store/p1-thumb.jpg", "/store/p1-medium.jpg"]);
    }

    #[test]
    fn sequential_stops_at_first_failure() {
        let backend = MockBackend::new().failing_on("-medium.jpg");
        let attempted = Mutex::new(Vec::new());
        let err = create_derivatives(
            &backend,
            &jobs(&[("thumb", Fit::Cover), ("medium", Fit::Inside), ("large", Fit::Inside)]),
            false,
            |p| attempted.lock().unwrap().push(p.to_path_buf()),
        )
        .unwrap_err();

        assert_eq!(err.size_id, "medium");
        assert_eq!(
            attempted.into_inner().unwrap(),
            vec![
                PathBuf::from("/store/p1-thumb.jpg"),
                PathBuf::from("/store/p1-medium.jpg"),
            ]
        );
        // "large" is never attempted
        assert_eq!(backend.get_operations().len(), 2);
    }

    #[test]
    fn parallel_reports_every_attempt_and_first_failure() {
        let backend = MockBackend::new().failing_on("-medium.jpg");
        let attempted = Mutex::new(Vec::new());
        let err = create_derivatives(
            &backend,
            &jobs(&[("thumb", Fit::Cover), ("medium", Fit::Inside), ("large", Fit::Inside)]),
            true,
            |p| attempted.lock().unwrap().push(p.to_path_buf()),
        )
        .unwrap_err();

        assert_eq!(err.size_id, "medium");
        let mut attempted = attempted.into_inner().unwrap();
        attempted.sort();
        assert_eq!(attempted.len(), 3);
    }

    #[test]
    fn parallel_success_keeps_table_order() {
        let backend = MockBackend::new();
        let generated = create_derivatives(
            &backend,
            &jobs(&[("a", Fit::Cover), ("b", Fit::Fill), ("c", Fit::Contain)]),
            true,
            |_| {},
        )
        .unwrap();
        let ids: Vec<&str> = generated.iter().map(|g| g.size_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!(generated.iter().all(|g| (g.width, g.height) == (50, 50)));
    }
}
