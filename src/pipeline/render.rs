//! PDF rasterisation: render each page to a PNG inside the working copy.
//!
//! Rendering goes through the [`PageRasterizer`] trait so the engine can be
//! driven by another renderer (or a test double) without touching the
//! detection logic. [`PdfiumRasterizer`] is the production implementation.
//!
//! Rendered pages are written to disk rather than kept in memory: a
//! 300 DPI A4 page is ~25 MB of RGBA, and only one page at a time needs to be
//! decoded.

use crate::error::PageError;
use image::ImageFormat;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable naming an existing pdfium library.
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// Renders the pages of a PDF to image files.
pub trait PageRasterizer: Send + Sync {
    /// Render pages of `pdf_path` in document order into `out_dir`.
    ///
    /// At most `max_pages` pages are rendered when set. The returned paths are
    /// ordered by page: element `i` is page `i`.
    ///
    /// # Errors
    /// [`PageError::Unreadable`] when the page count cannot be determined
    /// (encrypted or DRM-protected source); any other variant for rendering
    /// failures.
    fn rasterize(
        &self,
        pdf_path: &Path,
        dpi: u32,
        max_pages: Option<usize>,
        out_dir: &Path,
    ) -> Result<Vec<PathBuf>, PageError>;
}

/// File name of the rendered image for `page` (0-indexed).
pub fn page_image_name(page: usize) -> String {
    format!("page-{page:05}.png")
}

/// [`PageRasterizer`] backed by Google's pdfium.
#[derive(Debug, Clone, Default)]
pub struct PdfiumRasterizer {
    library_path: Option<PathBuf>,
}

impl PdfiumRasterizer {
    /// Rasteriser that binds to `library_path` when given, otherwise to the
    /// library named by `PDFIUM_LIB_PATH`, the platform library in the
    /// current directory, or the system library, in that order.
    pub fn new(library_path: Option<PathBuf>) -> Self {
        Self { library_path }
    }

    fn bind(&self) -> Result<Pdfium, PageError> {
        let bind_failed = |detail: String| PageError::RenderFailed { page: 0, detail };

        let explicit = self
            .library_path
            .clone()
            .or_else(|| std::env::var_os(PDFIUM_LIB_PATH_ENV).map(PathBuf::from));

        let bindings = match explicit {
            Some(path) => Pdfium::bind_to_library(&path)
                .map_err(|e| bind_failed(format!("cannot bind pdfium at {}: {e}", path.display())))?,
            None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                .or_else(|_| Pdfium::bind_to_system_library())
                .map_err(|e| bind_failed(format!("cannot bind pdfium: {e}")))?,
        };
        Ok(Pdfium::new(bindings))
    }
}

impl PageRasterizer for PdfiumRasterizer {
    fn rasterize(
        &self,
        pdf_path: &Path,
        dpi: u32,
        max_pages: Option<usize>,
        out_dir: &Path,
    ) -> Result<Vec<PathBuf>, PageError> {
        let pdfium = self.bind()?;

        let document = pdfium
            .load_pdf_from_file(pdf_path, None)
            .map_err(|e| classify_load_error(pdf_path, e))?;

        let pages = document.pages();
        let total_pages = pages.len() as usize;
        let limit = max_pages.map_or(total_pages, |m| m.min(total_pages));
        info!("PDF loaded: {} pages, rendering {}", total_pages, limit);

        let render_config = PdfRenderConfig::new().scale_page_by_factor(dpi as f32 / 72.0);
        let mut rendered = Vec::with_capacity(limit);

        for (idx, page) in pages.iter().enumerate().take(limit) {
            let bitmap = page
                .render_with_config(&render_config)
                .map_err(|e| PageError::RenderFailed {
                    page: idx,
                    detail: format!("{e:?}"),
                })?;

            let image = bitmap.as_image();
            let path = out_dir.join(page_image_name(idx));
            image
                .save_with_format(&path, ImageFormat::Png)
                .map_err(|e| PageError::RenderFailed {
                    page: idx,
                    detail: format!("cannot write {}: {e}", path.display()),
                })?;

            debug!(
                "Rendered page {} → {}x{} px",
                idx,
                image.width(),
                image.height()
            );
            rendered.push(path);
        }

        Ok(rendered)
    }
}

fn classify_load_error(pdf_path: &Path, error: PdfiumError) -> PageError {
    match error {
        PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::PasswordError) => {
            warn!("{} is password protected", pdf_path.display());
            PageError::Unreadable {
                detail: "password required".to_string(),
            }
        }
        PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::SecurityError) => {
            PageError::Unreadable {
                detail: "unsupported security handler".to_string(),
            }
        }
        other => PageError::RenderFailed {
            page: 0,
            detail: format!("cannot open {}: {other:?}", pdf_path.display()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_image_names_sort_in_page_order() {
        let mut names: Vec<String> = [10, 2, 0, 100].iter().map(|&p| page_image_name(p)).collect();
        names.sort();
        assert_eq!(
            names,
            vec!["page-00000.png", "page-00002.png", "page-00010.png", "page-00100.png"]
        );
    }

    #[test]
    fn password_error_is_unreadable() {
        let err = classify_load_error(
            Path::new("locked.pdf"),
            PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::PasswordError),
        );
        assert!(matches!(err, PageError::Unreadable { .. }));
    }

    #[test]
    fn format_error_is_a_render_failure() {
        let err = classify_load_error(
            Path::new("broken.pdf"),
            PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::FormatError),
        );
        assert!(matches!(err, PageError::RenderFailed { .. }));
    }
}
