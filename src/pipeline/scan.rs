//! Barcode decoding: machine-readable codes → text, one page image at a time.
//!
//! Two interchangeable backends implement [`BarcodeReader`]:
//!
//! | Backend | Crate | Symbologies |
//! |---------|-------|-------------|
//! | [`RxingReader`] | `rxing` | 1D (Code 128/39/93, EAN, UPC, ITF, Codabar) and 2D (QR, Data Matrix, PDF417, Aztec) |
//! | [`RqrrReader`]  | `rqrr`  | QR only |
//!
//! Both hand the decoder an 8-bit greyscale copy of the page. Empty payloads
//! are dropped and NUL characters stripped. The order of returned values is
//! whatever the backend produces; it is not a spatial ordering.

use crate::config::{DecoderBackend, SplitterConfig};
use image::imageops::FilterType;
use image::DynamicImage;
use rxing::Exceptions;
use std::borrow::Cow;
use tracing::debug;

/// Decodes the barcodes on one rendered page.
pub trait BarcodeReader: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// All decoded payloads on `image`. Finding nothing is `Ok(vec![])`.
    ///
    /// # Errors
    /// A backend failure other than "no code found", as a message.
    fn decode(&self, image: &DynamicImage) -> Result<Vec<String>, String>;
}

/// Construct the reader selected by `config.backend`, applying its upscale factor.
pub fn reader_for(config: &SplitterConfig) -> Box<dyn BarcodeReader> {
    match config.backend {
        DecoderBackend::Rxing => Box::new(RxingReader::new(config.upscale)),
        DecoderBackend::Rqrr => Box::new(RqrrReader::new(config.upscale)),
    }
}

/// ZXing-compatible multi-format reader.
#[derive(Debug, Clone, Default)]
pub struct RxingReader {
    upscale: f32,
}

impl RxingReader {
    pub fn new(upscale: f32) -> Self {
        Self { upscale }
    }
}

impl BarcodeReader for RxingReader {
    fn name(&self) -> &'static str {
        "rxing"
    }

    fn decode(&self, image: &DynamicImage) -> Result<Vec<String>, String> {
        let image = upscaled(image, self.upscale);
        let luma = image.to_luma8();
        let (width, height) = luma.dimensions();

        match rxing::helpers::detect_multiple_in_luma(luma.into_raw(), width, height) {
            Ok(results) => Ok(clean_values(results.iter().map(|r| r.getText().to_string()))),
            Err(Exceptions::NotFoundException(..)) => Ok(Vec::new()),
            Err(e) => Err(e.to_string()),
        }
    }
}

/// QR-only reader.
#[derive(Debug, Clone, Default)]
pub struct RqrrReader {
    upscale: f32,
}

impl RqrrReader {
    pub fn new(upscale: f32) -> Self {
        Self { upscale }
    }
}

impl BarcodeReader for RqrrReader {
    fn name(&self) -> &'static str {
        "rqrr"
    }

    fn decode(&self, image: &DynamicImage) -> Result<Vec<String>, String> {
        let image = upscaled(image, self.upscale);
        let luma = image.to_luma8();
        let (width, height) = luma.dimensions();

        let mut prepared =
            rqrr::PreparedImage::prepare_from_greyscale(width as usize, height as usize, |x, y| {
                luma.get_pixel(x as u32, y as u32).0[0]
            });

        let mut values = Vec::new();
        for grid in prepared.detect_grids() {
            match grid.decode() {
                Ok((_meta, content)) => values.push(content),
                // A grid that fails to decode is an undecodable code, not a page failure.
                Err(e) => debug!("rqrr: skipping undecodable grid: {e:?}"),
            }
        }
        Ok(clean_values(values))
    }
}

fn upscaled(image: &DynamicImage, factor: f32) -> Cow<'_, DynamicImage> {
    if factor <= 1.0 {
        return Cow::Borrowed(image);
    }
    let width = (image.width() as f32 * factor).round() as u32;
    let height = (image.height() as f32 * factor).round() as u32;
    Cow::Owned(image.resize_exact(width, height, FilterType::Lanczos3))
}

fn clean_values(values: impl IntoIterator<Item = String>) -> Vec<String> {
    values
        .into_iter()
        .map(|v| if v.contains('\0') { v.replace('\0', "") } else { v })
        .filter(|v| !v.is_empty())
        .collect()
}
