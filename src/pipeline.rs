//! Photo ingestion.
//!
//! One call turns a base64 upload into a geotagged original plus one resized
//! derivative per configured size:
//!
//! ```text
//! payload ─decode─▶ {id}.jpg ─tag─▶ {id}.jpg (EXIF) ─resize─▶ {id}-{size}.jpg …
//! ```
//!
//! Steps run strictly in that order, and derivatives are only produced from
//! the tagged original so they inherit its metadata.
//!
//! ## Failure handling
//!
//! The media id is checked before anything touches the disk: it must be a
//! single file-name fragment, so no id can address a path outside the store.
//!
//! Every file is registered with a [`CleanupGuard`] before the step that may
//! create it. Any error (or an elapsed deadline) drops the guard uncommitted,
//! which deletes the original and every derivative written so far. The tag
//! writer's sidecar is removed on success too. After an `Err` the store
//! holds nothing for that id.

use crate::cleanup::CleanupGuard;
use crate::config::{MediaConfig, SizeSpec};
use crate::geotag::{GeoTag, TagError, TagWriter};
use crate::imaging::{
    BackendError, DerivativeFailure, GeneratedDerivative, ImageBackend, Quality,
    create_derivatives, plan_derivative,
};
use crate::original::{OriginalError, decode_payload, write_original};
use crate::store::{StorePaths, is_valid_name};
use crate::urls::{SizeUrls, UrlResolver};
use serde::Serialize;
use std::io;
use std::path::PathBuf;
use std::time::Instant;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("invalid media id {id:?}: must be a single file name")]
    InvalidId { id: String },
    #[error("invalid payload: {0}")]
    Decode(#[source] OriginalError),
    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to tag {path}: {source}")]
    Tag {
        path: String,
        #[source]
        source: TagError,
    },
    #[error(transparent)]
    Resize(DerivativeFailure),
    #[error("deadline elapsed before {step}")]
    Timeout { step: &'static str },
}

impl IngestError {
    /// Whether the caller sent something unusable, as opposed to a server-side failure.
    pub fn is_client_error(&self) -> bool {
        matches!(self, IngestError::Decode(_) | IngestError::InvalidId { .. })
    }
}

impl From<DerivativeFailure> for IngestError {
    /// A derivative that could not be stored is a write failure; anything
    /// else the backend reports is a resize failure.
    fn from(failure: DerivativeFailure) -> Self {
        match failure.source {
            BackendError::Write { path, source } => IngestError::Write { path, source },
            source => IngestError::Resize(DerivativeFailure {
                size_id: failure.size_id,
                source,
            }),
        }
    }
}

impl From<OriginalError> for IngestError {
    fn from(err: OriginalError) -> Self {
        match err {
            OriginalError::Write { path, source } => IngestError::Write { path, source },
            other => IngestError::Decode(other),
        }
    }
}

/// What a successful ingest left in the store.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub id: String,
    pub original: PathBuf,
    pub original_url: String,
    /// In size-table order.
    pub derivatives: Vec<GeneratedDerivative>,
    pub urls: SizeUrls,
}

/// Ingestion pipeline bound to one store, one size table and one pair of
/// capabilities.
pub struct Pipeline<B: ImageBackend, T: TagWriter> {
    store: StorePaths,
    urls: UrlResolver,
    sizes: Vec<SizeSpec>,
    quality: Quality,
    parallel: bool,
    backend: B,
    tagger: T,
}

impl<B: ImageBackend, T: TagWriter> Pipeline<B, T> {
    pub fn new(config: &MediaConfig, store: StorePaths, backend: B, tagger: T) -> Self {
        Self {
            store,
            urls: UrlResolver::from_config(config),
            sizes: config.sizes.clone(),
            quality: Quality::new(config.quality),
            parallel: config.processing.parallel,
            backend,
            tagger,
        }
    }

    pub fn store(&self) -> &StorePaths {
        &self.store
    }

    pub fn urls(&self) -> &UrlResolver {
        &self.urls
    }

    /// Ingest one photo with no time limit.
    pub fn ingest(&self, id: &str, payload: &str, tag: &GeoTag) -> Result<IngestReport, IngestError> {
        self.run(id, payload, tag, None)
    }

    /// Ingest one photo, giving up once `deadline` has passed.
    ///
    /// The deadline is checked between steps and handed to the tag writer,
    /// which kills an external tool that overruns it. A running resize is not
    /// interrupted.
    pub fn ingest_with_deadline(
        &self,
        id: &str,
        payload: &str,
        tag: &GeoTag,
        deadline: Instant,
    ) -> Result<IngestReport, IngestError> {
        self.run(id, payload, tag, Some(deadline))
    }

    #[tracing::instrument(name = "ingest", skip_all, fields(id = %id))]
    fn run(
        &self,
        id: &str,
        payload: &str,
        tag: &GeoTag,
        deadline: Option<Instant>,
    ) -> Result<IngestReport, IngestError> {
        let started = Instant::now();
        let result = self.run_steps(id, payload, tag, deadline);
        match &result {
            Ok(report) => tracing::info!(
                derivatives = report.derivatives.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Ingested"
            ),
            Err(e) => tracing::warn!(error = %e, "Ingest failed, store rolled back"),
        }
        result
    }

    fn run_steps(
        &self,
        id: &str,
        payload: &str,
        tag: &GeoTag,
        deadline: Option<Instant>,
    ) -> Result<IngestReport, IngestError> {
        let check = |step: &'static str| match deadline {
            Some(deadline) if Instant::now() >= deadline => Err(IngestError::Timeout { step }),
            _ => Ok(()),
        };

        if !is_valid_name(id) {
            return Err(IngestError::InvalidId { id: id.to_string() });
        }

        check("decode")?;
        let bytes = decode_payload(payload)?;
        tracing::debug!(bytes = bytes.len(), "Decoded payload");

        let guard = CleanupGuard::new();
        let original = self.store.original_path(id);

        check("write")?;
        self.store.ensure_root().map_err(|source| IngestError::Write {
            path: self.store.root().display().to_string(),
            source,
        })?;
        guard.own(&original);
        write_original(&original, &bytes)?;

        check("tag")?;
        if let Some(sidecar) = self.tagger.sidecar_path(&original) {
            guard.transient(&sidecar);
        }
        self.tagger
            .write_tags_until(&original, tag, deadline)
            .map_err(|source| match source {
                TagError::DeadlineElapsed { .. } => IngestError::Timeout { step: "tag" },
                source => IngestError::Tag {
                    path: original.display().to_string(),
                    source,
                },
            })?;
        tracing::debug!(lat = tag.lat, lon = tag.lon, heading = tag.heading, "Tagged original");

        check("resize")?;
        let jobs: Vec<_> = self
            .sizes
            .iter()
            .map(|size| {
                plan_derivative(
                    &original,
                    &self.store.derivative_path(id, &size.id),
                    &size.id,
                    (size.width, size.height),
                    size.fit,
                    self.quality,
                )
            })
            .collect();
        let derivatives = create_derivatives(&self.backend, &jobs, self.parallel, |path| {
            guard.own(path)
        })?;

        check("commit")?;
        let report = IngestReport {
            id: id.to_string(),
            original,
            original_url: self.urls.original_url_for(id),
            derivatives,
            urls: self.urls.all_urls_for(id),
        };
        guard.commit();
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geotag::tests::{FakeTagWriter, sample_tag};
    use crate::imaging::Fit;
    use crate::imaging::backend::tests::{MockBackend, RecordedOp};
    use crate::test_helpers::{jpeg_payload, store_files};
    use std::time::Duration;
    use tempfile::TempDir;

    fn config(parallel: bool) -> MediaConfig {
        let mut config = MediaConfig {
            sizes: vec![
                SizeSpec::new("thumb", 50, 50, Fit::Cover),
                SizeSpec::new("large", 1600, 1600, Fit::Inside),
            ],
            ..MediaConfig::default()
        };
        config.processing.parallel = parallel;
        config
    }

    fn pipeline<T: TagWriter>(
        tmp: &TempDir,
        backend: MockBackend,
        tagger: T,
    ) -> Pipeline<MockBackend, T> {
        Pipeline::new(&config(false), StorePaths::new(tmp.path()), backend, tagger)
    }

    #[test]
    fn success_leaves_original_and_derivatives_only() {
        let tmp = TempDir::new().unwrap();
        let p = pipeline(&tmp, MockBackend::touching(), FakeTagWriter::exiftool_like());

        let report = p.ingest("p1", &jpeg_payload(100, 100), &sample_tag()).unwrap();

        assert_eq!(
            store_files(tmp.path()),
            vec!["p1-large.jpg", "p1-thumb.jpg", "p1.jpg"]
        );
        assert_eq!(report.original, tmp.path().join("p1.jpg"));
        let ids: Vec<_> = report.derivatives.iter().map(|d| d.size_id.as_str()).collect();
        assert_eq!(ids, vec!["thumb", "large"]);
        assert_eq!(report.urls.keys().collect::<Vec<_>>(), vec!["thumb", "large"]);
        assert_eq!(report.original_url, "http://localhost:3000/media/p1.jpg");
    }

    #[test]
    fn derivatives_follow_tagging_and_read_the_original() {
        let tmp = TempDir::new().unwrap();
        let tagger = FakeTagWriter::exiftool_like();
        let backend = MockBackend::touching();
        let p = pipeline(&tmp, backend, tagger);

        p.ingest("p1", &jpeg_payload(100, 100), &sample_tag()).unwrap();

        let calls = p.tagger.calls.lock().unwrap().clone();
        assert_eq!(calls, vec![(tmp.path().join("p1.jpg"), sample_tag())]);

        let original = tmp.path().join("p1.jpg").to_string_lossy().to_string();
        let ops = p.backend.get_operations();
        assert_eq!(ops.len(), 2);
        for op in ops {
            assert!(matches!(op, RecordedOp::Resize { ref source, quality: 90, .. } if *source == original));
        }
    }

    #[test]
    fn undecodable_payload_creates_nothing() {
        let tmp = TempDir::new().unwrap();
        let p = pipeline(&tmp, MockBackend::touching(), FakeTagWriter::exiftool_like());

        let err = p.ingest("p1", "%%%not base64%%%", &sample_tag()).unwrap_err();

        assert!(matches!(err, IngestError::Decode(_)));
        assert!(err.is_client_error());
        assert!(store_files(tmp.path()).is_empty());
        assert!(p.tagger.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn tag_failure_removes_original_and_sidecar() {
        let tmp = TempDir::new().unwrap();
        let p = pipeline(&tmp, MockBackend::touching(), FakeTagWriter::failing());

        let err = p.ingest("p1", &jpeg_payload(100, 100), &sample_tag()).unwrap_err();

        assert!(matches!(err, IngestError::Tag { .. }));
        assert!(!err.is_client_error());
        assert!(store_files(tmp.path()).is_empty());
        assert!(p.backend.get_operations().is_empty());
    }

    #[test]
    fn resize_failure_removes_everything() {
        let tmp = TempDir::new().unwrap();
        let backend = MockBackend::touching().failing_on("-large.jpg");
        let p = pipeline(&tmp, backend, FakeTagWriter::exiftool_like());

        let err = p.ingest("p1", &jpeg_payload(100, 100), &sample_tag()).unwrap_err();

        match err {
            IngestError::Resize(failure) => assert_eq!(failure.size_id, "large"),
            other => panic!("expected resize error, got {other:?}"),
        }
        assert!(store_files(tmp.path()).is_empty());
    }

    #[test]
    fn parallel_resize_failure_removes_everything() {
        let tmp = TempDir::new().unwrap();
        let backend = MockBackend::touching().failing_on("-thumb.jpg");
        let p = Pipeline::new(
            &config(true),
            StorePaths::new(tmp.path()),
            backend,
            FakeTagWriter::exiftool_like(),
        );

        let err = p.ingest("p1", &jpeg_payload(100, 100), &sample_tag()).unwrap_err();

        assert!(matches!(err, IngestError::Resize(ref f) if f.size_id == "thumb"));
        assert!(store_files(tmp.path()).is_empty());
    }

    #[test]
    fn elapsed_deadline_creates_nothing() {
        let tmp = TempDir::new().unwrap();
        let p = pipeline(&tmp, MockBackend::touching(), FakeTagWriter::exiftool_like());

        let err = p
            .ingest_with_deadline("p1", &jpeg_payload(8, 8), &sample_tag(), Instant::now())
            .unwrap_err();

        assert!(matches!(err, IngestError::Timeout { step: "decode" }));
        assert!(store_files(tmp.path()).is_empty());
    }

    struct SlowTagWriter(Duration);

    impl TagWriter for SlowTagWriter {
        fn write_tags(&self, _path: &std::path::Path, _tag: &GeoTag) -> Result<(), TagError> {
            std::thread::sleep(self.0);
            Ok(())
        }
    }

    #[test]
    fn deadline_passing_during_tagging_rolls_back() {
        let tmp = TempDir::new().unwrap();
        let p = pipeline(
            &tmp,
            MockBackend::touching(),
            SlowTagWriter(Duration::from_millis(200)),
        );
        let deadline = Instant::now() + Duration::from_millis(50);

        let err = p
            .ingest_with_deadline("p1", &jpeg_payload(8, 8), &sample_tag(), deadline)
            .unwrap_err();

        assert!(matches!(err, IngestError::Timeout { step: "resize" }));
        assert!(store_files(tmp.path()).is_empty());
        assert!(p.backend.get_operations().is_empty());
    }

    /// Tagger that overran its deadline and was stopped.
    struct KilledTagWriter;

    impl TagWriter for KilledTagWriter {
        fn write_tags(&self, path: &std::path::Path, _tag: &GeoTag) -> Result<(), TagError> {
            std::fs::copy(path, crate::store::sidecar_for(path))?;
            Err(TagError::DeadlineElapsed {
                program: "exiftool".to_string(),
            })
        }
    }

    #[test]
    fn tagger_stopped_at_deadline_is_a_timeout() {
        let tmp = TempDir::new().unwrap();
        let p = pipeline(&tmp, MockBackend::touching(), KilledTagWriter);
        let deadline = Instant::now() + Duration::from_secs(60);

        let err = p
            .ingest_with_deadline("p1", &jpeg_payload(8, 8), &sample_tag(), deadline)
            .unwrap_err();

        assert!(matches!(err, IngestError::Timeout { step: "tag" }));
        assert!(!err.is_client_error());
        assert!(store_files(tmp.path()).is_empty());
        assert!(p.backend.get_operations().is_empty());
    }

    #[test]
    fn generous_deadline_succeeds() {
        let tmp = TempDir::new().unwrap();
        let p = pipeline(&tmp, MockBackend::touching(), FakeTagWriter::exiftool_like());
        let deadline = Instant::now() + Duration::from_secs(60);
        assert!(
            p.ingest_with_deadline("p1", &jpeg_payload(8, 8), &sample_tag(), deadline)
                .is_ok()
        );
    }

    #[test]
    fn missing_store_root_is_created() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("media");
        let p = Pipeline::new(
            &config(false),
            StorePaths::new(&root),
            MockBackend::touching(),
            FakeTagWriter::exiftool_like(),
        );
        p.ingest("p1", &jpeg_payload(8, 8), &sample_tag()).unwrap();
        assert_eq!(store_files(&root).len(), 3);
    }

    #[test]
    fn reingest_after_rollback_succeeds() {
        let tmp = TempDir::new().unwrap();
        let failing = pipeline(&tmp, MockBackend::touching(), FakeTagWriter::failing());
        assert!(failing.ingest("p1", &jpeg_payload(8, 8), &sample_tag()).is_err());

        let ok = pipeline(&tmp, MockBackend::touching(), FakeTagWriter::exiftool_like());
        ok.ingest("p1", &jpeg_payload(8, 8), &sample_tag()).unwrap();
        assert_eq!(store_files(tmp.path()).len(), 3);
    }

    #[test]
    fn store_root_occupied_by_file_is_a_write_error() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("media");
        std::fs::write(&root, b"not a directory").unwrap();
        let p = Pipeline::new(
            &config(false),
            StorePaths::new(&root),
            MockBackend::touching(),
            FakeTagWriter::exiftool_like(),
        );

        let err = p.ingest("p1", &jpeg_payload(8, 8), &sample_tag()).unwrap_err();

        assert!(matches!(err, IngestError::Write { ref path, .. } if *path == root.display().to_string()));
        assert!(!err.is_client_error());
        assert_eq!(store_files(tmp.path()), vec!["media"]);
        assert!(p.tagger.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn unwritable_original_is_a_write_error() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir(tmp.path().join("p1.jpg")).unwrap();
        let p = pipeline(&tmp, MockBackend::touching(), FakeTagWriter::exiftool_like());

        let err = p.ingest("p1", &jpeg_payload(8, 8), &sample_tag()).unwrap_err();

        assert!(matches!(err, IngestError::Write { .. }));
        assert!(!err.is_client_error());
        assert_eq!(store_files(tmp.path()), vec!["p1.jpg"]);
        assert!(tmp.path().join("p1.jpg").is_dir());
        assert!(p.tagger.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn unwritable_derivative_is_a_write_error() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir(tmp.path().join("p1-large.jpg")).unwrap();
        let p = pipeline(&tmp, MockBackend::touching(), FakeTagWriter::exiftool_like());

        let err = p.ingest("p1", &jpeg_payload(8, 8), &sample_tag()).unwrap_err();

        match &err {
            IngestError::Write { path, .. } => assert!(path.ends_with("p1-large.jpg")),
            other => panic!("expected write error, got {other:?}"),
        }
        assert!(!err.is_client_error());
        // Original and thumbnail rolled back; the directory was never ours to remove.
        assert_eq!(store_files(tmp.path()), vec!["p1-large.jpg"]);
    }

    #[test]
    fn parallel_unwritable_derivative_is_a_write_error() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir(tmp.path().join("p1-thumb.jpg")).unwrap();
        let p = Pipeline::new(
            &config(true),
            StorePaths::new(tmp.path()),
            MockBackend::touching(),
            FakeTagWriter::exiftool_like(),
        );

        let err = p.ingest("p1", &jpeg_payload(8, 8), &sample_tag()).unwrap_err();

        assert!(matches!(err, IngestError::Write { .. }));
        assert_eq!(store_files(tmp.path()), vec!["p1-thumb.jpg"]);
    }

    #[test]
    fn ids_that_leave_the_store_are_rejected() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("media");
        let p = Pipeline::new(
            &config(false),
            StorePaths::new(&root),
            MockBackend::touching(),
            FakeTagWriter::exiftool_like(),
        );

        for id in ["../x", "a/b", "", ".."] {
            let err = p.ingest(id, &jpeg_payload(8, 8), &sample_tag()).unwrap_err();
            assert!(matches!(err, IngestError::InvalidId { .. }), "{id:?}");
            assert!(err.is_client_error());
        }
        assert_eq!(store_files(tmp.path()), Vec::<String>::new());
        assert!(p.tagger.calls.lock().unwrap().is_empty());
        assert!(p.backend.get_operations().is_empty());
    }

    #[test]
    fn only_decode_and_bad_ids_are_client_errors() {
        let timeout = IngestError::Timeout { step: "tag" };
        assert!(!timeout.is_client_error());
        let write = IngestError::Write {
            path: "/x".into(),
            source: io::Error::other("disk full"),
        };
        assert!(!write.is_client_error());
        assert!(IngestError::InvalidId { id: "a/b".into() }.is_client_error());
        assert!(IngestError::from(OriginalError::Empty).is_client_error());
    }

    #[test]
    fn derivative_failures_split_into_write_and_resize() {
        let write = IngestError::from(DerivativeFailure {
            size_id: "thumb".to_string(),
            source: BackendError::Write {
                path: "/s/p1-thumb.jpg".to_string(),
                source: io::Error::other("disk full"),
            },
        });
        assert!(matches!(write, IngestError::Write { ref path, .. } if path == "/s/p1-thumb.jpg"));

        let resize = IngestError::from(DerivativeFailure {
            size_id: "thumb".to_string(),
            source: BackendError::ProcessingFailed("bad scan".to_string()),
        });
        assert!(matches!(resize, IngestError::Resize(ref f) if f.size_id == "thumb"));
    }
}
