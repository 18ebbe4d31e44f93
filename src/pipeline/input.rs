//! Input normalisation: decide whether a file can be scanned and turn TIFF
//! input into a PDF the rest of the pipeline can render and cut.
//!
//! The original file is never modified. A TIFF is decoded frame by frame,
//! any alpha channel is flattened away, and the frames are packed into a new
//! PDF inside the working copy. The derived PDF receives the original's file
//! stats so the segments cut from it do too.

use crate::config::SplitterConfig;
use crate::error::{PageError, SplitError};
use crate::pipeline::fsmeta::copy_file_stats;
use image::{DynamicImage, GrayAlphaImage, GrayImage, ImageBuffer, RgbImage, RgbaImage};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tiff::decoder::{Decoder, DecodingResult};
use tiff::tags::Tag;
use tiff::ColorType as TiffColorType;
use tracing::{debug, info};

/// Resolution assumed for TIFF frames that carry no resolution tags.
pub const DEFAULT_TIFF_DPI: f32 = 72.0;

/// File formats the engine knows how to scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Tiff,
}

impl DocumentKind {
    /// Map a MIME type to a kind, regardless of configuration.
    pub fn from_mime(mime_type: &str) -> Option<Self> {
        let essence = mime_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "application/pdf" => Some(DocumentKind::Pdf),
            "image/tiff" => Some(DocumentKind::Tiff),
            _ => None,
        }
    }
}

/// Kind of `mime_type` if the current configuration lets the engine scan it.
///
/// PDF is always supported; TIFF only with `tiff_support` enabled.
pub fn supported(mime_type: &str, config: &SplitterConfig) -> Option<DocumentKind> {
    match DocumentKind::from_mime(mime_type)? {
        DocumentKind::Pdf => Some(DocumentKind::Pdf),
        DocumentKind::Tiff if config.tiff_support => Some(DocumentKind::Tiff),
        DocumentKind::Tiff => None,
    }
}

/// Return a PDF path for `original`, converting TIFF input into `work_dir`.
///
/// PDF input is returned unchanged. TIFF conversion failures are reported as
/// [`PageError::Unreadable`]; the caller treats them like an encrypted PDF.
pub fn normalize_to_pdf(
    original: &Path,
    kind: DocumentKind,
    work_dir: &Path,
) -> Result<PathBuf, PageError> {
    match kind {
        DocumentKind::Pdf => Ok(original.to_path_buf()),
        DocumentKind::Tiff => tiff_to_pdf(original, work_dir),
    }
}

fn tiff_to_pdf(original: &Path, work_dir: &Path) -> Result<PathBuf, PageError> {
    let unreadable = |detail: String| PageError::Unreadable { detail };

    let (frames, dpi) = read_tiff_frames(original).map_err(unreadable)?;
    let had_alpha = frames.iter().any(|f| f.color().has_alpha());
    let flattened: Vec<DynamicImage> = frames.into_iter().map(flatten_alpha).collect();
    if had_alpha {
        debug!("Flattened alpha channel of {}", original.display());
    }

    let mut document = images_to_pdf(&flattened, dpi)
        .map_err(|e| unreadable(format!("cannot build PDF: {e}")))?;

    let stem = original
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    let pdf_path = work_dir.join(format!("{stem}.pdf"));
    document
        .save(&pdf_path)
        .map_err(|e| unreadable(format!("cannot write {}: {e}", pdf_path.display())))?;
    copy_file_stats(original, &pdf_path)
        .map_err(|e| unreadable(format!("cannot copy file stats: {e}")))?;

    info!(
        "Converted TIFF {} ({} pages) to PDF",
        original.display(),
        flattened.len()
    );
    Ok(pdf_path)
}

/// Decode every frame of a TIFF file, plus the resolution of the first frame.
fn read_tiff_frames(path: &Path) -> Result<(Vec<DynamicImage>, f32), String> {
    let file = std::fs::File::open(path).map_err(|e| format!("cannot open: {e}"))?;
    let mut decoder =
        Decoder::new(BufReader::new(file)).map_err(|e| format!("not a TIFF: {e}"))?;

    let dpi = tiff_dpi(&mut decoder).unwrap_or(DEFAULT_TIFF_DPI);
    let mut frames = Vec::new();

    loop {
        let (width, height) = decoder
            .dimensions()
            .map_err(|e| format!("bad dimensions: {e}"))?;
        let color_type = decoder
            .colortype()
            .map_err(|e| format!("bad colour type: {e}"))?;
        let data = decoder
            .read_image()
            .map_err(|e| format!("cannot decode frame {}: {e}", frames.len()))?;

        frames.push(frame_to_image(width, height, color_type, data)?);

        if !decoder.more_images() {
            break;
        }
        decoder
            .next_image()
            .map_err(|e| format!("cannot advance to frame {}: {e}", frames.len()))?;
    }

    Ok((frames, dpi))
}

fn tiff_dpi<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> Option<f32> {
    let value = decoder.find_tag(Tag::XResolution).ok()??;
    let dpi = match value {
        tiff::decoder::ifd::Value::Rational(n, d) if d != 0 => n as f32 / d as f32,
        tiff::decoder::ifd::Value::Unsigned(n) => n as f32,
        tiff::decoder::ifd::Value::Short(n) => n as f32,
        _ => return None,
    };
    // ResolutionUnit 3 is centimetres.
    let unit = decoder.get_tag_u32(Tag::ResolutionUnit).unwrap_or(2);
    let dpi = if unit == 3 { dpi * 2.54 } else { dpi };
    (dpi.is_finite() && dpi > 0.0).then_some(dpi)
}

fn frame_to_image(
    width: u32,
    height: u32,
    color_type: TiffColorType,
    data: DecodingResult,
) -> Result<DynamicImage, String> {
    let mismatch = || format!("{color_type:?} frame {width}x{height} does not match its buffer");

    let image = match (data, color_type) {
        (DecodingResult::U8(buf), TiffColorType::Gray(1)) => {
            DynamicImage::ImageLuma8(unpack_bilevel(width, height, &buf).ok_or_else(mismatch)?)
        }
        (DecodingResult::U8(buf), TiffColorType::Gray(8)) => {
            DynamicImage::ImageLuma8(GrayImage::from_raw(width, height, buf).ok_or_else(mismatch)?)
        }
        (DecodingResult::U8(buf), TiffColorType::GrayA(8)) => DynamicImage::ImageLumaA8(
            GrayAlphaImage::from_raw(width, height, buf).ok_or_else(mismatch)?,
        ),
        (DecodingResult::U8(buf), TiffColorType::RGB(8)) => {
            DynamicImage::ImageRgb8(RgbImage::from_raw(width, height, buf).ok_or_else(mismatch)?)
        }
        (DecodingResult::U8(buf), TiffColorType::RGBA(8)) => {
            DynamicImage::ImageRgba8(RgbaImage::from_raw(width, height, buf).ok_or_else(mismatch)?)
        }
        (DecodingResult::U16(buf), TiffColorType::Gray(16)) => DynamicImage::ImageLuma16(
            ImageBuffer::from_raw(width, height, buf).ok_or_else(mismatch)?,
        ),
        (DecodingResult::U16(buf), TiffColorType::RGB(16)) => DynamicImage::ImageRgb16(
            ImageBuffer::from_raw(width, height, buf).ok_or_else(mismatch)?,
        ),
        (DecodingResult::U16(buf), TiffColorType::RGBA(16)) => DynamicImage::ImageRgba16(
            ImageBuffer::from_raw(width, height, buf).ok_or_else(mismatch)?,
        ),
        (_, other) => return Err(format!("unsupported TIFF colour type {other:?}")),
    };
    Ok(image)
}

/// Expand 1-bit rows (padded to whole bytes) to 8-bit grey.
fn unpack_bilevel(width: u32, height: u32, packed: &[u8]) -> Option<GrayImage> {
    let row_bytes = (width as usize).div_ceil(8);
    if packed.len() < row_bytes * height as usize {
        return None;
    }
    Some(GrayImage::from_fn(width, height, |x, y| {
        let byte = packed[y as usize * row_bytes + x as usize / 8];
        let bit = (byte >> (7 - (x % 8))) & 1;
        image::Luma([if bit == 1 { 255 } else { 0 }])
    }))
}

/// Drop the alpha channel, keeping grey images grey.
fn flatten_alpha(image: DynamicImage) -> DynamicImage {
    if !image.color().has_alpha() {
        return image;
    }
    if image.color().has_color() {
        DynamicImage::ImageRgb8(image.to_rgb8())
    } else {
        DynamicImage::ImageLuma8(image.to_luma8())
    }
}

/// Build a PDF with one page per image, each page sized to the image at `dpi`.
///
/// Grey images are embedded as `DeviceGray`, everything else as `DeviceRGB`,
/// both Flate-compressed.
pub fn images_to_pdf(images: &[DynamicImage], dpi: f32) -> Result<Document, lopdf::Error> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids: Vec<Object> = Vec::with_capacity(images.len());

    for image in images {
        let (width, height) = (image.width(), image.height());
        let (color_space, pixels) = if image.color().has_color() {
            ("DeviceRGB", image.to_rgb8().into_raw())
        } else {
            ("DeviceGray", image.to_luma8().into_raw())
        };

        let mut xobject = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width as i64,
                "Height" => height as i64,
                "ColorSpace" => color_space,
                "BitsPerComponent" => 8,
            },
            pixels,
        );
        xobject.compress()?;
        let image_id = doc.add_object(xobject);

        let page_w = width as f32 * 72.0 / dpi;
        let page_h = height as f32 * 72.0 / dpi;
        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        Object::Real(page_w),
                        0.into(),
                        0.into(),
                        Object::Real(page_h),
                        0.into(),
                        0.into(),
                    ],
                ),
                Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
                Operation::new("Q", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), Object::Real(page_w), Object::Real(page_h)],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im0" => image_id },
            },
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    Ok(doc)
}

/// Fail with [`SplitError::FileNotFound`] when `path` does not exist.
pub fn require_exists(path: &Path) -> Result<(), SplitError> {
    if path.exists() {
        Ok(())
    } else {
        Err(SplitError::FileNotFound {
            path: path.to_path_buf(),
        })
    }
}
