//! Error types for the barsplit library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`SplitError`] — **Fatal**: the request cannot be served at all (input
//!   file missing, invalid configuration) or a split that was already decided
//!   could not be carried out (segmentation or placement failed). Returned as
//!   `Err(SplitError)` from [`crate::split::DocumentSplitter::split`].
//!
//! * [`PageError`] — **Non-fatal**: rendering or decoding went wrong before any
//!   split decision was made. These are logged, reported to the progress
//!   callback and folded into "no barcodes found"; they never escape as `Err`.
//!
//! Everything up to "no split points" is recovered locally. Only failures after
//! the decision to split may propagate, so no partially split document is ever
//! left behind.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the barsplit library.
#[derive(Debug, Error)]
pub enum SplitError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// A filesystem operation on `path` failed.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Split errors ──────────────────────────────────────────────────────
    /// The normalised PDF could not be reopened or a segment could not be
    /// written. No output from this document is kept.
    #[error("Segmentation of '{path}' failed: {detail}")]
    SegmentationFailed { path: PathBuf, detail: String },

    // ── Placement errors ──────────────────────────────────────────────────
    /// Moving a finished segment to its destination failed.
    #[error("Failed to place '{path}': {source}")]
    PlacementFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A file with the target name already exists in the destination directory.
    #[error("Refusing to overwrite existing file '{path}'")]
    DestinationExists { path: PathBuf },

    /// The document did not come from the consume folder and no consumption
    /// directory is configured to receive its pieces.
    #[error("No consumption directory configured for documents outside the consume folder")]
    MissingConsumptionDir,

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SplitError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SplitError::Io {
            path: path.into(),
            source,
        }
    }
}

/// A non-fatal error for a single page or for the rasterisation pass.
///
/// Reported through [`crate::progress::ScanProgressCallback::on_page_error`]
/// and the log; the page simply contributes no marks.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// The source is encrypted or otherwise protected so its page count
    /// cannot be determined.
    #[error("Source is unreadable: {detail}")]
    Unreadable { detail: String },

    /// The rasteriser failed (library missing, corrupt file, render glitch).
    #[error("Page {page}: rasterisation failed: {detail}")]
    RenderFailed { page: usize, detail: String },

    /// A rendered page image could not be loaded back for decoding.
    #[error("Page {page}: rendered image could not be loaded: {detail}")]
    ImageLoadFailed { page: usize, detail: String },

    /// The barcode backend raised an error on this page.
    #[error("Page {page}: barcode decoding failed: {detail}")]
    DecodeFailed { page: usize, detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segmentation_failed_display() {
        let e = SplitError::SegmentationFailed {
            path: PathBuf::from("/tmp/scan.pdf"),
            detail: "xref damaged".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("scan.pdf"), "got: {msg}");
        assert!(msg.contains("xref damaged"), "got: {msg}");
    }

    #[test]
    fn destination_exists_display() {
        let e = SplitError::DestinationExists {
            path: PathBuf::from("/consume/0_foo.pdf"),
        };
        assert!(e.to_string().contains("0_foo.pdf"));
    }

    #[test]
    fn page_error_display_carries_page() {
        let e = PageError::DecodeFailed {
            page: 3,
            detail: "bad finder pattern".into(),
        };
        assert!(e.to_string().contains("Page 3"));
        assert!(e.to_string().contains("bad finder pattern"));
    }

    #[test]
    fn io_helper_keeps_source() {
        let e = SplitError::io(
            "/nope",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(std::error::Error::source(&e).is_some());
    }
}
