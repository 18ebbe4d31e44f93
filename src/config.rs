//! Configuration types for barcode-driven document splitting.
//!
//! All engine behaviour is controlled through [`SplitterConfig`], built via its
//! [`SplitterConfigBuilder`]. The per-request inputs (file path, MIME type,
//! origin, override name) live in [`crate::split::SplitRequest`] instead, so a
//! single config can be shared by every worker that calls the engine.

use crate::error::SplitError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Lowest accepted rasterisation DPI.
pub const MIN_DPI: u32 = 72;
/// Highest accepted rasterisation DPI.
pub const MAX_DPI: u32 = 600;
/// Largest accepted upscale factor.
pub const MAX_UPSCALE: f32 = 8.0;

/// Configuration for the splitting engine.
///
/// Built via [`SplitterConfig::builder()`] or using
/// [`SplitterConfig::default()`].
///
/// # Example
/// ```rust
/// use barsplit::{DecoderBackend, SplitterConfig};
///
/// let config = SplitterConfig::builder()
///     .separator_string("PATCHT")
///     .enable_asn(true)
///     .backend(DecoderBackend::Rqrr)
///     .dpi(200)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone, Serialize, Deserialize)]
pub struct SplitterConfig {
    /// Master switch. When false no document is ever scanned. Default: true.
    pub enabled: bool,

    /// Accept `image/tiff` input and convert it to PDF before scanning. Default: false.
    pub tiff_support: bool,

    /// Decoded value that marks a separator page (exact match). Default: "PATCHT".
    pub separator_string: String,

    /// Treat ASN marks as split points. Default: false.
    pub enable_asn: bool,

    /// Prefix identifying an Archive Serial Number mark. Default: "ASN".
    pub asn_prefix: String,

    /// Barcode decoding backend. Default: [`DecoderBackend::Rxing`].
    pub backend: DecoderBackend,

    /// Rasterisation DPI. Range: 72–600. Default: 300.
    ///
    /// Small 1D codes need a fairly dense render to resolve their narrow bars.
    pub dpi: u32,

    /// Number of pages to scan from the start of the document. 0 scans all pages. Default: 0.
    pub max_pages: usize,

    /// Factor by which each page image is enlarged before decoding.
    /// Values ≤ 1.0 disable upscaling; at most [`MAX_UPSCALE`]. Default: 0.0.
    pub upscale: f32,

    /// Consumption root that receives the pieces of documents which did not
    /// come from the consume folder.
    pub consumption_dir: Option<PathBuf>,

    /// Parent directory for per-document working copies. System temp dir when unset.
    pub scratch_dir: Option<PathBuf>,

    /// Explicit path to the pdfium shared library.
    pub pdfium_library: Option<PathBuf>,

    /// Optional per-page progress callback.
    #[serde(skip)]
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tiff_support: false,
            separator_string: "PATCHT".to_string(),
            enable_asn: false,
            asn_prefix: "ASN".to_string(),
            backend: DecoderBackend::default(),
            dpi: 300,
            max_pages: 0,
            upscale: 0.0,
            consumption_dir: None,
            scratch_dir: None,
            pdfium_library: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for SplitterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SplitterConfig")
            .field("enabled", &self.enabled)
            .field("tiff_support", &self.tiff_support)
            .field("separator_string", &self.separator_string)
            .field("enable_asn", &self.enable_asn)
            .field("asn_prefix", &self.asn_prefix)
            .field("backend", &self.backend)
            .field("dpi", &self.dpi)
            .field("max_pages", &self.max_pages)
            .field("upscale", &self.upscale)
            .field("consumption_dir", &self.consumption_dir)
            .field("scratch_dir", &self.scratch_dir)
            .field("pdfium_library", &self.pdfium_library)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ScanProgressCallback>"),
            )
            .finish()
    }
}

impl SplitterConfig {
    /// Create a new builder for `SplitterConfig`.
    pub fn builder() -> SplitterConfigBuilder {
        SplitterConfigBuilder {
            config: Self::default(),
        }
    }

    /// Page limit as an `Option`, `None` meaning "all pages".
    pub fn page_limit(&self) -> Option<usize> {
        (self.max_pages > 0).then_some(self.max_pages)
    }
}

/// Builder for [`SplitterConfig`].
#[derive(Debug)]
pub struct SplitterConfigBuilder {
    config: SplitterConfig,
}

impl SplitterConfigBuilder {
    pub fn enabled(mut self, v: bool) -> Self {
        self.config.enabled = v;
        self
    }

    pub fn tiff_support(mut self, v: bool) -> Self {
        self.config.tiff_support = v;
        self
    }

    pub fn separator_string(mut self, s: impl Into<String>) -> Self {
        self.config.separator_string = s.into();
        self
    }

    pub fn enable_asn(mut self, v: bool) -> Self {
        self.config.enable_asn = v;
        self
    }

    pub fn asn_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.asn_prefix = prefix.into();
        self
    }

    pub fn backend(mut self, backend: DecoderBackend) -> Self {
        self.config.backend = backend;
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi;
        self
    }

    pub fn max_pages(mut self, n: usize) -> Self {
        self.config.max_pages = n;
        self
    }

    pub fn upscale(mut self, factor: f32) -> Self {
        self.config.upscale = factor;
        self
    }

    pub fn consumption_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.consumption_dir = Some(dir.into());
        self
    }

    pub fn scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.scratch_dir = Some(dir.into());
        self
    }

    pub fn pdfium_library(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library = Some(path.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<SplitterConfig, SplitError> {
        let c = &self.config;
        if c.separator_string.is_empty() {
            return Err(SplitError::InvalidConfig(
                "Separator string must not be empty".into(),
            ));
        }
        if c.enable_asn && c.asn_prefix.is_empty() {
            return Err(SplitError::InvalidConfig(
                "ASN prefix must not be empty when ASN splitting is enabled".into(),
            ));
        }
        if !(MIN_DPI..=MAX_DPI).contains(&c.dpi) {
            return Err(SplitError::InvalidConfig(format!(
                "DPI must be {MIN_DPI}–{MAX_DPI}, got {}",
                c.dpi
            )));
        }
        if !(0.0..=MAX_UPSCALE).contains(&c.upscale) {
            return Err(SplitError::InvalidConfig(format!(
                "Upscale factor must be 0–{MAX_UPSCALE}, got {}",
                c.upscale
            )));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Barcode decoding backend.
///
/// Both backends satisfy the same [`crate::pipeline::scan::BarcodeReader`]
/// contract; they differ only in which symbologies they recognise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecoderBackend {
    /// ZXing port: Code 128, Code 39, EAN/UPC, ITF, QR, Data Matrix, PDF417, Aztec. (default)
    #[default]
    Rxing,
    /// QR codes only.
    Rqrr,
}

/// Where the original document came from.
///
/// Only used to choose the destination directory for split output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentSource {
    /// Uploaded through the API.
    ApiUpload,
    /// Picked up by the consume-folder watcher.
    ConsumeFolder,
    /// Fetched from a mail account.
    MailFetch,
    /// Sent by a mobile client.
    MobileApp,
    /// Uploaded through the web interface.
    WebUi,
}

impl DocumentSource {
    /// True when the document was discovered in the consume folder itself.
    pub fn is_consume_folder(self) -> bool {
        matches!(self, DocumentSource::ConsumeFolder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = SplitterConfig::default();
        assert!(c.enabled);
        assert!(!c.tiff_support);
        assert_eq!(c.separator_string, "PATCHT");
        assert!(!c.enable_asn);
        assert_eq!(c.asn_prefix, "ASN");
        assert_eq!(c.backend, DecoderBackend::Rxing);
        assert_eq!(c.dpi, 300);
        assert_eq!(c.page_limit(), None);
    }

    #[test]
    fn builder_rejects_empty_separator() {
        let err = SplitterConfig::builder().separator_string("").build();
        assert!(matches!(err, Err(SplitError::InvalidConfig(_))));
    }

    #[test]
    fn builder_rejects_empty_asn_prefix_only_when_enabled() {
        assert!(SplitterConfig::builder().asn_prefix("").build().is_ok());
        let err = SplitterConfig::builder().enable_asn(true).asn_prefix("").build();
        assert!(matches!(err, Err(SplitError::InvalidConfig(_))));
    }

    #[test]
    fn builder_rejects_out_of_range_dpi() {
        assert!(SplitterConfig::builder().dpi(71).build().is_err());
        assert!(SplitterConfig::builder().dpi(601).build().is_err());
        assert!(SplitterConfig::builder().dpi(600).build().is_ok());
    }

    #[test]
    fn builder_rejects_bad_upscale() {
        assert!(SplitterConfig::builder().upscale(-1.0).build().is_err());
        assert!(SplitterConfig::builder().upscale(f32::NAN).build().is_err());
        assert!(SplitterConfig::builder().upscale(1.5).build().is_ok());
        assert!(SplitterConfig::builder().upscale(MAX_UPSCALE).build().is_ok());
        assert!(SplitterConfig::builder().upscale(MAX_UPSCALE + 0.5).build().is_err());
        assert!(SplitterConfig::builder().upscale(f32::INFINITY).build().is_err());
    }

    #[test]
    fn page_limit_maps_zero_to_all() {
        let c = SplitterConfig::builder().max_pages(3).build().unwrap();
        assert_eq!(c.page_limit(), Some(3));
    }

    #[test]
    fn source_serialises_kebab_case() {
        let json = serde_json::to_string(&DocumentSource::ConsumeFolder).unwrap();
        assert_eq!(json, "\"consume-folder\"");
        assert!(DocumentSource::ConsumeFolder.is_consume_folder());
        assert!(!DocumentSource::MailFetch.is_consume_folder());
    }

    #[test]
    fn debug_hides_callback() {
        let c = SplitterConfig::builder()
            .progress_callback(std::sync::Arc::new(crate::progress::NoopProgressCallback))
            .build()
            .unwrap();
        assert!(format!("{c:?}").contains("<dyn ScanProgressCallback>"));
    }
}
