//! # barsplit
//!
//! Split scanned batches into separate documents using the barcodes printed
//! on their pages.
//!
//! A scanner operator feeds a stack of paper through in one go and puts a
//! separator sheet (a page carrying a `PATCHT` code) between documents, or
//! labels the first page of each document with an Archive Serial Number
//! barcode. This crate finds those codes and cuts the batch at them.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF / TIFF
//!  │
//!  ├─ 1. Input    accept the MIME type, convert TIFF to PDF
//!  ├─ 2. Render   rasterise pages via pdfium into a private working copy
//!  ├─ 3. Scan     decode every barcode on every page (rxing or rqrr)
//!  ├─ 4. Plan     separator pages are dropped, ASN pages open a new document
//!  ├─ 5. Segment  write one PDF per segment (lopdf)
//!  └─ 6. Place    move the pieces into the consumption directory
//! ```
//!
//! A document without split points, in an unsupported format, or that cannot
//! be read comes back as [`SplitOutcome::NotSplit`]; the caller then processes
//! it whole. The original file is never modified or deleted.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use barsplit::{split_document, DocumentSource, SplitRequest, SplitterConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SplitterConfig::builder()
//!         .enable_asn(true)
//!         .consumption_dir("/srv/consume")
//!         .build()?;
//!     let request = SplitRequest::new("batch.pdf", "application/pdf", DocumentSource::ApiUpload);
//!
//!     let outcome = split_document(&request, &config)?;
//!     for doc in outcome.documents() {
//!         println!("{}", doc.display());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `barsplit` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! barsplit = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod split;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{DecoderBackend, DocumentSource, SplitterConfig, SplitterConfigBuilder};
pub use error::{PageError, SplitError};
pub use output::{Mark, NotSplitReason, SplitOutcome, SplitPlan, Stage};
pub use pipeline::plan::SplitMap;
pub use pipeline::render::PageRasterizer;
pub use pipeline::scan::BarcodeReader;
pub use progress::{NoopProgressCallback, ProgressCallback, ScanProgressCallback};
pub use split::{split_document, split_document_async, DocumentSplitter, SplitRequest};
