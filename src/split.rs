//! Splitting entry points.
//!
//! [`DocumentSplitter::split`] drives one document through the pipeline:
//!
//! ```text
//! Idle ─▶ Detecting ─▶ Deciding ─┬─▶ NotSplit
//!                                └─▶ Splitting ─▶ Placing ─▶ Done
//! ```
//!
//! Everything up to `Deciding` degrades to [`SplitOutcome::NotSplit`]; only a
//! failure while splitting or placing is returned as `Err`. All intermediate
//! files live in a [`WorkingCopy`] that is removed when the call returns,
//! whatever the outcome.

use crate::config::{DocumentSource, SplitterConfig};
use crate::error::SplitError;
use crate::output::{Mark, NotSplitReason, SplitOutcome, SplitPlan, Stage};
use crate::pipeline::catalog::BarcodeCatalogBuilder;
use crate::pipeline::input::{self, DocumentKind};
use crate::pipeline::place::{destination_dir, place_segments};
use crate::pipeline::plan::{plan_splits, SplitMap};
use crate::pipeline::render::{PageRasterizer, PdfiumRasterizer};
use crate::pipeline::scan::{reader_for, BarcodeReader};
use crate::pipeline::segment::{count_pages, plan_segments, write_segments};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, instrument, warn};

/// One document handed to the engine.
#[derive(Debug, Clone)]
pub struct SplitRequest {
    /// The document on disk. Never modified or deleted.
    pub path: PathBuf,
    /// Declared MIME type, e.g. `application/pdf`.
    pub mime_type: String,
    /// Where the document came from; selects the destination directory.
    pub source: DocumentSource,
    /// When set, piece `i` is named `<i>_<override_filename>`.
    pub override_filename: Option<String>,
}

impl SplitRequest {
    pub fn new(path: impl Into<PathBuf>, mime_type: impl Into<String>, source: DocumentSource) -> Self {
        Self {
            path: path.into(),
            mime_type: mime_type.into(),
            source,
            override_filename: None,
        }
    }

    pub fn with_override_filename(mut self, name: impl Into<String>) -> Self {
        self.override_filename = Some(name.into());
        self
    }
}

/// Private scratch directory for one document.
///
/// Holds rendered pages, the PDF converted from a TIFF and the segments until
/// they are placed. Deleted on drop.
#[derive(Debug)]
pub struct WorkingCopy {
    dir: TempDir,
}

impl WorkingCopy {
    /// Create a fresh working copy under `scratch_dir`, or the system temp dir.
    pub fn create(scratch_dir: Option<&Path>) -> Result<Self, SplitError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("barsplit-");
        let dir = match scratch_dir {
            Some(parent) => builder.tempdir_in(parent).map_err(|e| SplitError::io(parent, e))?,
            None => builder
                .tempdir()
                .map_err(|e| SplitError::io(std::env::temp_dir(), e))?,
        };
        debug!("Working copy at {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// Result of the detection phase of one document.
struct Detection {
    /// Scannable PDF: the original, or the conversion of a TIFF.
    pdf_path: Option<PathBuf>,
    pages_scanned: usize,
    marks: Vec<Mark>,
    unreadable: bool,
}

/// The splitting engine.
///
/// Holds a configuration plus the rasteriser and barcode reader it drives.
/// One splitter can process any number of documents; each call works in its
/// own [`WorkingCopy`].
pub struct DocumentSplitter {
    config: SplitterConfig,
    rasterizer: Box<dyn PageRasterizer>,
    reader: Box<dyn BarcodeReader>,
}

impl std::fmt::Debug for DocumentSplitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentSplitter")
            .field("config", &self.config)
            .field("reader", &self.reader.name())
            .finish_non_exhaustive()
    }
}

impl DocumentSplitter {
    /// Splitter using pdfium for rendering and the configured decoding backend.
    pub fn new(config: SplitterConfig) -> Self {
        let rasterizer = Box::new(PdfiumRasterizer::new(config.pdfium_library.clone()));
        let reader = reader_for(&config);
        Self::with_components(config, rasterizer, reader)
    }

    /// Splitter with caller-supplied rendering and decoding.
    pub fn with_components(
        config: SplitterConfig,
        rasterizer: Box<dyn PageRasterizer>,
        reader: Box<dyn BarcodeReader>,
    ) -> Self {
        Self {
            config,
            rasterizer,
            reader,
        }
    }

    pub fn config(&self) -> &SplitterConfig {
        &self.config
    }

    /// Scan `request.path` and, when split points are found, cut it and place
    /// the pieces.
    ///
    /// # Returns
    /// `Ok(SplitOutcome::Split)` with the placed files in segment order, or
    /// `Ok(SplitOutcome::NotSplit)` telling the caller to process the document
    /// whole. The original file is left in place either way.
    ///
    /// # Errors
    /// [`SplitError::FileNotFound`] for a missing input. After split points
    /// were found: [`SplitError::SegmentationFailed`],
    /// [`SplitError::DestinationExists`], [`SplitError::MissingConsumptionDir`]
    /// or [`SplitError::PlacementFailed`]. No placed output is left behind on
    /// any of these.
    #[instrument(skip_all, fields(path = %request.path.display()))]
    pub fn split(&self, request: &SplitRequest) -> Result<SplitOutcome, SplitError> {
        enter(Stage::Idle);
        if !self.config.enabled {
            debug!("Barcode splitting disabled");
            return Ok(not_split(NotSplitReason::Disabled));
        }

        let Some(kind) = input::supported(&request.mime_type, &self.config) else {
            warn!(
                "Unsupported file format for barcode reader: {}",
                request.mime_type
            );
            return Ok(not_split(NotSplitReason::UnsupportedFormat {
                mime_type: request.mime_type.clone(),
            }));
        };
        input::require_exists(&request.path)?;

        let working = WorkingCopy::create(self.config.scratch_dir.as_deref())?;

        enter(Stage::Detecting);
        let detection = self.detect(&request.path, kind, working.path());

        enter(Stage::Deciding);
        let (Some(pdf_path), false) = (detection.pdf_path, detection.unreadable) else {
            return Ok(not_split(NotSplitReason::UnreadableSource));
        };
        let split_map = plan_splits(&detection.marks, &self.config);
        if split_map.is_empty() {
            debug!(
                pages = detection.pages_scanned,
                marks = detection.marks.len(),
                "No split points"
            );
            return Ok(not_split(NotSplitReason::NoSplitPoints));
        }
        info!(
            "Found {} split points in {} pages",
            split_map.len(),
            detection.pages_scanned
        );

        enter(Stage::Splitting);
        let segment_dir = working.path().join("segments");
        std::fs::create_dir(&segment_dir).map_err(|e| SplitError::io(&segment_dir, e))?;
        let segments = write_segments(&pdf_path, &request.path, &split_map, &segment_dir)?;

        enter(Stage::Placing);
        let dest = destination_dir(
            request.source,
            &request.path,
            self.config.consumption_dir.as_deref(),
        )?;
        let documents = place_segments(&segments, &dest, request.override_filename.as_deref())?;

        enter(Stage::Done);
        info!(
            "Split {} into {} documents",
            request.path.display(),
            documents.len()
        );
        Ok(SplitOutcome::Split { documents })
    }

    /// Scan a document and report what [`Self::split`] would do, without
    /// writing any output.
    ///
    /// # Errors
    /// [`SplitError::FileNotFound`] for a missing input, or an I/O error when
    /// the working copy cannot be created.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn inspect(&self, path: &Path, mime_type: &str) -> Result<SplitPlan, SplitError> {
        let empty_plan = |reason| SplitPlan {
            page_count: 0,
            pages_scanned: 0,
            marks: Vec::new(),
            split_map: SplitMap::new(),
            segments: Vec::new(),
            not_split: Some(reason),
        };

        if !self.config.enabled {
            return Ok(empty_plan(NotSplitReason::Disabled));
        }
        input::require_exists(path)?;
        let Some(kind) = input::supported(mime_type, &self.config) else {
            return Ok(empty_plan(NotSplitReason::UnsupportedFormat {
                mime_type: mime_type.to_string(),
            }));
        };

        let working = WorkingCopy::create(self.config.scratch_dir.as_deref())?;
        let detection = self.detect(path, kind, working.path());
        let (Some(pdf_path), false) = (detection.pdf_path, detection.unreadable) else {
            return Ok(empty_plan(NotSplitReason::UnreadableSource));
        };

        let page_count = count_pages(&pdf_path).unwrap_or(detection.pages_scanned);
        let split_map = plan_splits(&detection.marks, &self.config);
        let (segments, not_split) = if split_map.is_empty() {
            (Vec::new(), Some(NotSplitReason::NoSplitPoints))
        } else {
            (plan_segments(page_count, &split_map), None)
        };
        Ok(SplitPlan {
            page_count,
            pages_scanned: detection.pages_scanned,
            marks: detection.marks,
            split_map,
            segments,
            not_split,
        })
    }

    /// Normalise the input to PDF and build its barcode catalog.
    fn detect(&self, original: &Path, kind: DocumentKind, work_dir: &Path) -> Detection {
        let pdf_path = match input::normalize_to_pdf(original, kind, work_dir) {
            Ok(path) => path,
            Err(e) => {
                warn!("Cannot convert {} to PDF: {e}", original.display());
                return Detection {
                    pdf_path: None,
                    pages_scanned: 0,
                    marks: Vec::new(),
                    unreadable: true,
                };
            }
        };

        let mut catalog = BarcodeCatalogBuilder::new(
            self.rasterizer.as_ref(),
            self.reader.as_ref(),
            self.config.dpi,
            self.config.page_limit(),
        )
        .with_progress(self.config.progress_callback.clone());
        catalog.detect(&pdf_path, work_dir);

        Detection {
            pages_scanned: catalog.pages_scanned(),
            unreadable: catalog.source_unreadable(),
            marks: catalog.into_marks(),
            pdf_path: Some(pdf_path),
        }
    }
}

fn enter(stage: Stage) {
    debug!(?stage, "Stage");
}

fn not_split(reason: NotSplitReason) -> SplitOutcome {
    enter(Stage::NotSplit);
    debug!(?reason, "Document left whole");
    SplitOutcome::NotSplit(reason)
}

/// Split one document with a pdfium-backed [`DocumentSplitter`].
///
/// Blocking; use [`split_document_async`] from async code.
pub fn split_document(
    request: &SplitRequest,
    config: &SplitterConfig,
) -> Result<SplitOutcome, SplitError> {
    DocumentSplitter::new(config.clone()).split(request)
}

/// Async wrapper around [`split_document`].
///
/// Rendering and decoding are CPU-bound, so the work runs on tokio's blocking
/// thread pool.
pub async fn split_document_async(
    request: SplitRequest,
    config: SplitterConfig,
) -> Result<SplitOutcome, SplitError> {
    tokio::task::spawn_blocking(move || split_document(&request, &config))
        .await
        .map_err(|e| SplitError::Internal(format!("split task panicked: {e}")))?
}
