//! Pipeline stages for barcode-driven document splitting.
//!
//! Each submodule implements exactly one step, so each can be tested on its
//! own and the rendering or decoding backend swapped without touching the
//! others.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ scan ──▶ catalog ──▶ plan ──▶ segment ──▶ place
//! (TIFF→PDF) (pdfium)  (decode)  (marks)   (SplitMap)  (lopdf)   (move)
//! ```
//!
//! 1. [`input`]   — decide whether the MIME type is handled; convert TIFF to PDF
//! 2. [`render`]  — rasterise pages to PNG files in the working copy
//! 3. [`scan`]    — decode every barcode on one page image
//! 4. [`catalog`] — drive render + scan once per document, isolating page failures
//! 5. [`plan`]    — turn marks into split points
//! 6. [`segment`] — write one PDF per segment
//! 7. [`place`]   — move the segments to their destination
//!
//! [`fsmeta`] copies file stats onto every file the pipeline produces.

pub mod catalog;
pub mod fsmeta;
pub mod input;
pub mod place;
pub mod plan;
pub mod render;
pub mod scan;
pub mod segment;
