//! Barcode catalog: rasterise the document once and record every mark.
//!
//! [`BarcodeCatalogBuilder::detect`] is guarded by an explicit `scanned` flag;
//! a second call returns the existing catalog without rendering again.
//! Failures never escape: an unreadable source or a broken renderer leaves an
//! empty catalog, and a page that fails to decode contributes no marks while
//! scanning moves on to the next page.

use crate::error::PageError;
use crate::output::Mark;
use crate::pipeline::render::PageRasterizer;
use crate::pipeline::scan::BarcodeReader;
use crate::progress::ProgressCallback;
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

/// Accumulates the marks of one document.
pub struct BarcodeCatalogBuilder<'a> {
    rasterizer: &'a dyn PageRasterizer,
    reader: &'a dyn BarcodeReader,
    dpi: u32,
    max_pages: Option<usize>,
    progress: Option<ProgressCallback>,
    scanned: bool,
    unreadable: bool,
    pages_scanned: usize,
    marks: Vec<Mark>,
}

impl<'a> BarcodeCatalogBuilder<'a> {
    pub fn new(
        rasterizer: &'a dyn PageRasterizer,
        reader: &'a dyn BarcodeReader,
        dpi: u32,
        max_pages: Option<usize>,
    ) -> Self {
        Self {
            rasterizer,
            reader,
            dpi,
            max_pages,
            progress: None,
            scanned: false,
            unreadable: false,
            pages_scanned: 0,
            marks: Vec::new(),
        }
    }

    pub fn with_progress(mut self, progress: Option<ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Scan `pdf_path`, rendering into `work_dir`, unless already done.
    pub fn detect(&mut self, pdf_path: &Path, work_dir: &Path) -> &[Mark] {
        if self.scanned {
            return &self.marks;
        }
        self.scanned = true;

        let pages = match self
            .rasterizer
            .rasterize(pdf_path, self.dpi, self.max_pages, work_dir)
        {
            Ok(pages) => pages,
            Err(PageError::Unreadable { detail }) => {
                warn!(
                    "{} cannot be read ({detail}); scanning no pages",
                    pdf_path.display()
                );
                self.unreadable = true;
                Vec::new()
            }
            Err(e) => {
                error!("Rasterising {} failed: {e}", pdf_path.display());
                Vec::new()
            }
        };

        self.scan_pages(&pages);
        &self.marks
    }

    fn scan_pages(&mut self, pages: &[PathBuf]) {
        if let Some(cb) = &self.progress {
            cb.on_scan_start(pages.len());
        }

        for (page, path) in pages.iter().enumerate() {
            match self.decode_page(page, path) {
                Ok(values) => {
                    debug!(page, found = values.len(), backend = self.reader.name(), "Page decoded");
                    if let Some(cb) = &self.progress {
                        cb.on_page_scanned(page, values.len());
                    }
                    self.marks
                        .extend(values.into_iter().map(|value| Mark::new(page, value)));
                }
                Err(e) => {
                    warn!("{e}; continuing with the next page");
                    if let Some(cb) = &self.progress {
                        cb.on_page_error(page, &e.to_string());
                    }
                }
            }
        }

        self.pages_scanned = pages.len();
        if let Some(cb) = &self.progress {
            cb.on_scan_complete(pages.len(), self.marks.len());
        }
    }

    fn decode_page(&self, page: usize, path: &Path) -> Result<Vec<String>, PageError> {
        let image = image::open(path).map_err(|e| PageError::ImageLoadFailed {
            page,
            detail: e.to_string(),
        })?;
        self.reader
            .decode(&image)
            .map_err(|detail| PageError::DecodeFailed { page, detail })
    }

    /// True once [`Self::detect`] has run.
    pub fn is_scanned(&self) -> bool {
        self.scanned
    }

    /// True when the rasteriser reported the source as unreadable.
    pub fn source_unreadable(&self) -> bool {
        self.unreadable
    }

    pub fn pages_scanned(&self) -> usize {
        self.pages_scanned
    }

    pub fn marks(&self) -> &[Mark] {
        &self.marks
    }

    pub fn into_marks(self) -> Vec<Mark> {
        self.marks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::render::page_image_name;
    use image::{DynamicImage, GrayImage};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Writes `pages` blank PNGs and counts its invocations.
    struct BlankRasterizer {
        pages: usize,
        calls: AtomicUsize,
        fail: Option<PageError>,
    }

    impl BlankRasterizer {
        fn new(pages: usize) -> Self {
            Self {
                pages,
                calls: AtomicUsize::new(0),
                fail: None,
            }
        }
    }

    impl PageRasterizer for BlankRasterizer {
        fn rasterize(
            &self,
            _pdf_path: &Path,
            _dpi: u32,
            max_pages: Option<usize>,
            out_dir: &Path,
        ) -> Result<Vec<PathBuf>, PageError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(e) = &self.fail {
                return Err(e.clone());
            }
            let count = max_pages.map_or(self.pages, |m| m.min(self.pages));
            Ok((0..count)
                .map(|page| {
                    let path = out_dir.join(page_image_name(page));
                    DynamicImage::ImageLuma8(GrayImage::new(4, 4)).save(&path).unwrap();
                    path
                })
                .collect())
        }
    }

    /// Returns one scripted result per decode call, in order.
    struct ScriptedReader(Mutex<VecDeque<Result<Vec<String>, String>>>);

    impl ScriptedReader {
        fn new(script: Vec<Result<Vec<&str>, &str>>) -> Self {
            Self(Mutex::new(
                script
                    .into_iter()
                    .map(|r| {
                        r.map(|v| v.into_iter().map(String::from).collect())
                            .map_err(String::from)
                    })
                    .collect(),
            ))
        }
    }

    impl BarcodeReader for ScriptedReader {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn decode(&self, _image: &DynamicImage) -> Result<Vec<String>, String> {
            self.0.lock().unwrap().pop_front().unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    #[test]
    fn records_marks_with_their_page() {
        let dir = tempfile::tempdir().unwrap();
        let raster = BlankRasterizer::new(3);
        let reader = ScriptedReader::new(vec![Ok(vec![]), Ok(vec!["PATCHT", "x"]), Ok(vec!["ASN1"])]);
        let mut builder = BarcodeCatalogBuilder::new(&raster, &reader, 300, None);

        let marks = builder.detect(Path::new("doc.pdf"), dir.path()).to_vec();

        assert_eq!(
            marks,
            vec![Mark::new(1, "PATCHT"), Mark::new(1, "x"), Mark::new(2, "ASN1")]
        );
        assert_eq!(builder.pages_scanned(), 3);
        assert!(!builder.source_unreadable());
    }

    #[test]
    fn detect_runs_once() {
        let dir = tempfile::tempdir().unwrap();
        let raster = BlankRasterizer::new(2);
        let reader = ScriptedReader::new(vec![Ok(vec!["PATCHT"]), Ok(vec![]), Ok(vec!["late"])]);
        let mut builder = BarcodeCatalogBuilder::new(&raster, &reader, 300, None);

        assert!(!builder.is_scanned());
        let first = builder.detect(Path::new("doc.pdf"), dir.path()).to_vec();
        let second = builder.detect(Path::new("doc.pdf"), dir.path()).to_vec();

        assert_eq!(raster.calls.load(Ordering::SeqCst), 1);
        assert_eq!(first, second);
        assert!(builder.is_scanned());
    }

    #[test]
    fn page_failure_does_not_stop_the_scan() {
        let dir = tempfile::tempdir().unwrap();
        let raster = BlankRasterizer::new(3);
        let reader = ScriptedReader::new(vec![Ok(vec!["a"]), Err("decoder crashed"), Ok(vec!["PATCHT"])]);
        let mut builder = BarcodeCatalogBuilder::new(&raster, &reader, 300, None);

        let marks = builder.detect(Path::new("doc.pdf"), dir.path()).to_vec();

        assert_eq!(marks, vec![Mark::new(0, "a"), Mark::new(2, "PATCHT")]);
    }

    #[test]
    fn unloadable_page_image_is_skipped() {
        struct CorruptRasterizer;
        impl PageRasterizer for CorruptRasterizer {
            fn rasterize(
                &self,
                _: &Path,
                _: u32,
                _: Option<usize>,
                out_dir: &Path,
            ) -> Result<Vec<PathBuf>, PageError> {
                let bad = out_dir.join(page_image_name(0));
                std::fs::write(&bad, b"not a png").unwrap();
                let good = out_dir.join(page_image_name(1));
                DynamicImage::ImageLuma8(GrayImage::new(4, 4)).save(&good).unwrap();
                Ok(vec![bad, good])
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let reader = ScriptedReader::new(vec![Ok(vec!["PATCHT"])]);
        let mut builder = BarcodeCatalogBuilder::new(&CorruptRasterizer, &reader, 300, None);

        // The first decode call is spent on page 1, page 0 never reached the reader.
        assert_eq!(
            builder.detect(Path::new("doc.pdf"), dir.path()),
            &[Mark::new(1, "PATCHT")]
        );
    }

    #[test]
    fn unreadable_source_yields_empty_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let mut raster = BlankRasterizer::new(3);
        raster.fail = Some(PageError::Unreadable {
            detail: "password required".into(),
        });
        let reader = ScriptedReader::new(vec![]);
        let mut builder = BarcodeCatalogBuilder::new(&raster, &reader, 300, None);

        assert!(builder.detect(Path::new("locked.pdf"), dir.path()).is_empty());
        assert!(builder.source_unreadable());
        assert_eq!(builder.pages_scanned(), 0);
    }

    #[test]
    fn render_failure_yields_empty_catalog_without_unreadable_flag() {
        let dir = tempfile::tempdir().unwrap();
        let mut raster = BlankRasterizer::new(3);
        raster.fail = Some(PageError::RenderFailed {
            page: 0,
            detail: "pdfium missing".into(),
        });
        let reader = ScriptedReader::new(vec![]);
        let mut builder = BarcodeCatalogBuilder::new(&raster, &reader, 300, None);

        assert!(builder.detect(Path::new("doc.pdf"), dir.path()).is_empty());
        assert!(!builder.source_unreadable());
    }

    #[test]
    fn page_limit_is_forwarded() {
        let dir = tempfile::tempdir().unwrap();
        let raster = BlankRasterizer::new(10);
        let reader = ScriptedReader::new(vec![]);
        let mut builder = BarcodeCatalogBuilder::new(&raster, &reader, 300, Some(4));
        builder.detect(Path::new("doc.pdf"), dir.path());
        assert_eq!(builder.pages_scanned(), 4);
    }
}
