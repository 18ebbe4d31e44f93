//! Progress-callback trait for per-page scanning events.
//!
//! Inject an [`Arc<dyn ScanProgressCallback>`] via
//! [`crate::config::SplitterConfigBuilder::progress_callback`] to receive
//! events while the catalog builder walks the rendered pages.
//!
//! # Example
//!
//! ```rust
//! use barsplit::{ScanProgressCallback, SplitterConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct MarkCounter {
//!     marks: AtomicUsize,
//! }
//!
//! impl ScanProgressCallback for MarkCounter {
//!     fn on_page_scanned(&self, page: usize, marks_found: usize) {
//!         self.marks.fetch_add(marks_found, Ordering::SeqCst);
//!         eprintln!("page {page}: {marks_found} barcodes");
//!     }
//! }
//!
//! let counter = Arc::new(MarkCounter { marks: AtomicUsize::new(0) });
//!
//! let config = SplitterConfig::builder()
//!     .progress_callback(counter as Arc<dyn ScanProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the catalog builder as it scans each rendered page.
///
/// Implementations must be `Send + Sync`: the engine itself is single-threaded
/// per document, but one config (and therefore one callback) may be shared by
/// workers processing different documents in parallel. All methods have no-op
/// defaults.
pub trait ScanProgressCallback: Send + Sync {
    /// Called once after rasterisation, before the first page is decoded.
    ///
    /// # Arguments
    /// * `total_pages` — number of rendered pages that will be scanned
    fn on_scan_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called after a page has been decoded.
    ///
    /// # Arguments
    /// * `page`        — 0-indexed page number
    /// * `marks_found` — decoded values found on the page
    fn on_page_scanned(&self, page: usize, marks_found: usize) {
        let _ = (page, marks_found);
    }

    /// Called when a page could not be decoded. Scanning continues.
    ///
    /// # Arguments
    /// * `page`  — 0-indexed page number
    /// * `error` — human-readable error description
    fn on_page_error(&self, page: usize, error: &str) {
        let _ = (page, error);
    }

    /// Called once after all rendered pages have been attempted.
    ///
    /// # Arguments
    /// * `total_pages` — pages scanned
    /// * `total_marks` — marks recorded across the whole document
    fn on_scan_complete(&self, total_pages: usize, total_marks: usize) {
        let _ = (total_pages, total_marks);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ScanProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::SplitterConfig`].
pub type ProgressCallback = Arc<dyn ScanProgressCallback>;
