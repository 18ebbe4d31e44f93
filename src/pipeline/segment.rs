//! PDF segmentation: cut the normalised source into one file per segment.
//!
//! Segments are computed by walking the source pages in order (see
//! [`plan_segments`]); each non-empty segment is then written as an
//! independent PDF holding only its own pages and the objects they reach.
//! The source is loaded once; no segment copies the whole document.

use crate::error::SplitError;
use crate::pipeline::fsmeta::copy_file_stats;
use crate::pipeline::plan::SplitMap;
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Page trees deeper than this are treated as cyclic.
const MAX_TREE_DEPTH: usize = 64;

/// Group pages `0..page_count` into segments according to `split_map`.
///
/// A split point closes the current segment. With `keep: true` the page opens
/// the next segment; with `keep: false` it is dropped. Empty segments (a split
/// point on page 0, or two split points in a row) are discarded.
pub fn plan_segments(page_count: usize, split_map: &SplitMap) -> Vec<Vec<usize>> {
    let mut segments = Vec::new();
    let mut current = Vec::new();

    for page in 0..page_count {
        match split_map.get(page) {
            Some(keep) => {
                segments.push(std::mem::take(&mut current));
                if keep {
                    current.push(page);
                }
            }
            None => current.push(page),
        }
    }
    segments.push(current);

    segments.retain(|segment| !segment.is_empty());
    segments
}

/// Number of pages in `pdf`, or `None` when lopdf cannot open it.
pub fn count_pages(pdf: &Path) -> Option<usize> {
    Document::load(pdf).ok().map(|doc| doc.get_pages().len())
}

/// File name for the segment at `index`: `<stem>_document_<index>.pdf`.
pub fn segment_file_name(original: &Path, index: usize) -> String {
    let stem = original
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    format!("{stem}_document_{index}.pdf")
}

/// Write one PDF per segment of `source_pdf` into `out_dir`.
///
/// `original` is the file the caller handed in (before any TIFF conversion);
/// it supplies the output stem and the file stats copied onto every segment.
///
/// # Errors
/// Any failure here is fatal for the document: the caller keeps none of the
/// files written so far.
#[instrument(skip_all, fields(source = %source_pdf.display(), split_points = split_map.len()))]
pub fn write_segments(
    source_pdf: &Path,
    original: &Path,
    split_map: &SplitMap,
    out_dir: &Path,
) -> Result<Vec<PathBuf>, SplitError> {
    let failed = |detail: String| SplitError::SegmentationFailed {
        path: source_pdf.to_path_buf(),
        detail,
    };

    let document = Document::load(source_pdf).map_err(|e| failed(format!("cannot reopen: {e}")))?;
    // lopdf decrypts on load when the user password is empty.
    if document.is_encrypted() && document.encryption_state.is_none() {
        return Err(failed("document requires a password".to_string()));
    }

    let page_ids: Vec<ObjectId> = document.get_pages().into_values().collect();
    let page_count = page_ids.len();
    if let Some(last) = split_map.last_page() {
        if last >= page_count {
            return Err(failed(format!(
                "split point on page {last} but the document has {page_count} pages"
            )));
        }
    }

    let segments = plan_segments(page_count, split_map);
    debug!(page_count, segments = segments.len(), "Segments planned");

    let mut written = Vec::with_capacity(segments.len());
    for (index, segment) in segments.iter().enumerate() {
        let pages: Vec<ObjectId> = segment.iter().map(|&page| page_ids[page]).collect();
        let mut part = extract_pages(&document, &pages);

        let path = out_dir.join(segment_file_name(original, index));
        part.save(&path)
            .map_err(|e| failed(format!("cannot write {}: {e}", path.display())))?;
        copy_file_stats(original, &path).map_err(|e| SplitError::io(&path, e))?;

        debug!(
            index,
            first_page = segment[0],
            pages = segment.len(),
            "Segment written"
        );
        written.push(path);
    }

    info!("Wrote {} segments from {} pages", written.len(), page_count);
    Ok(written)
}

/// Build a new document holding `pages` of `source`, in order.
///
/// Only objects reachable from those pages (and the document info) are
/// copied, keeping their ids. Inherited page attributes are pushed down onto
/// each page since the original page tree is not carried over. The result is
/// never encrypted: lopdf has already decrypted the objects on load.
fn extract_pages(source: &Document, pages: &[ObjectId]) -> Document {
    let mut part = Document::with_version(source.version.clone());
    part.reference_table.cross_reference_type = source.reference_table.cross_reference_type;
    let pages_id = (source.max_id + 1, 0);
    let catalog_id = (source.max_id + 2, 0);

    let mut pending = Vec::new();
    let mut kids = Vec::with_capacity(pages.len());
    for &page_id in pages {
        let Ok(original) = source.get_dictionary(page_id) else {
            continue;
        };
        let mut page = original.clone();
        for key in INHERITABLE {
            if !page.has(key) {
                if let Some(value) = inherited_attribute(source, original, key) {
                    page.set(key, value);
                }
            }
        }
        page.set("Parent", pages_id);
        collect_references(&Object::Dictionary(page.clone()), &mut pending);
        part.objects.insert(page_id, Object::Dictionary(page));
        kids.push(Object::Reference(page_id));
    }

    if let Ok(info) = source.trailer.get(b"Info").and_then(Object::as_reference) {
        pending.push(info);
        part.trailer.set("Info", info);
    }

    while let Some(id) = pending.pop() {
        if part.objects.contains_key(&id) {
            continue;
        }
        if let Some(object) = source.objects.get(&id) {
            collect_references(object, &mut pending);
            part.objects.insert(id, object.clone());
        }
    }

    let count = kids.len() as i64;
    part.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    part.objects.insert(
        catalog_id,
        Object::Dictionary(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        }),
    );
    part.trailer.set("Root", catalog_id);
    part.max_id = catalog_id.0;
    part
}

/// First value of `key` found walking up the page tree from `page`.
fn inherited_attribute(source: &Document, page: &Dictionary, key: &[u8]) -> Option<Object> {
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    for _ in 0..MAX_TREE_DEPTH {
        let node = source.get_dictionary(parent?).ok()?;
        if let Ok(value) = node.get(key) {
            return Some(value.clone());
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
    }
    None
}

/// Push every indirect reference inside `object` onto `out`, except `Parent`
/// links, which lead back into the source page tree.
fn collect_references(object: &Object, out: &mut Vec<ObjectId>) {
    match object {
        Object::Reference(id) => out.push(*id),
        Object::Array(items) => items.iter().for_each(|item| collect_references(item, out)),
        Object::Dictionary(dict) => collect_dictionary(dict, out),
        Object::Stream(stream) => collect_dictionary(&stream.dict, out),
        _ => {}
    }
}

fn collect_dictionary(dict: &Dictionary, out: &mut Vec<ObjectId>) {
    for (key, value) in dict.iter() {
        if key.as_slice() != b"Parent" {
            collect_references(value, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::input::images_to_pdf;
    use image::{DynamicImage, GrayImage, Luma};

    fn map(points: &[(usize, bool)]) -> SplitMap {
        points.iter().copied().collect()
    }

    /// N-page PDF whose page `i` is `10 + i` pixels wide, so pages can be told apart.
    fn numbered_pdf(path: &Path, pages: usize) {
        let images: Vec<DynamicImage> = (0..pages)
            .map(|i| DynamicImage::ImageLuma8(GrayImage::from_pixel(10 + i as u32, 10, Luma([255]))))
            .collect();
        let mut doc = images_to_pdf(&images, 72.0).unwrap();
        doc.save(path).unwrap();
    }

    fn page_widths(path: &Path) -> Vec<i64> {
        let doc = Document::load(path).unwrap();
        doc.get_pages()
            .values()
            .map(|&id| {
                let page = doc.get_dictionary(id).unwrap();
                let media_box = page.get(b"MediaBox").unwrap().as_array().unwrap();
                media_box[2].as_float().unwrap().round() as i64
            })
            .collect()
    }

    #[test]
    fn separator_in_the_middle() {
        assert_eq!(plan_segments(5, &map(&[(2, false)])), vec![vec![0, 1], vec![3, 4]]);
    }

    #[test]
    fn asn_in_the_middle() {
        assert_eq!(
            plan_segments(6, &map(&[(3, true)])),
            vec![vec![0, 1, 2], vec![3, 4, 5]]
        );
    }

    #[test]
    fn leading_and_trailing_separators_leave_no_empty_segments() {
        assert_eq!(
            plan_segments(5, &map(&[(0, false), (4, false)])),
            vec![vec![1, 2, 3]]
        );
    }

    #[test]
    fn consecutive_split_points() {
        assert_eq!(
            plan_segments(6, &map(&[(2, false), (3, false), (4, true)])),
            vec![vec![0, 1], vec![4, 5]]
        );
    }

    #[test]
    fn all_separators_yield_nothing() {
        assert!(plan_segments(2, &map(&[(0, false), (1, false)])).is_empty());
    }

    #[test]
    fn empty_map_is_one_segment() {
        assert_eq!(plan_segments(3, &SplitMap::new()), vec![vec![0, 1, 2]]);
    }

    #[test]
    fn union_of_segments_is_every_kept_page_in_order() {
        let cases: Vec<(usize, SplitMap)> = vec![
            (1, map(&[(0, true)])),
            (7, map(&[(1, false), (2, true), (6, false)])),
            (9, map(&[(0, false), (3, true), (4, true), (5, false), (8, true)])),
            (4, map(&[(3, false), (1, false)])),
        ];
        for (pages, split_map) in cases {
            let segments = plan_segments(pages, &split_map);
            let flattened: Vec<usize> = segments.iter().flatten().copied().collect();
            let expected: Vec<usize> = (0..pages).filter(|&p| split_map.get(p) != Some(false)).collect();
            assert_eq!(flattened, expected, "pages={pages} map={split_map:?}");

            for (page, keep) in split_map.iter() {
                if keep {
                    let starts = segments.iter().filter(|s| s[0] == page).count();
                    assert_eq!(starts, 1, "kept split page {page} must open one segment");
                }
            }
        }
    }

    #[test]
    fn segment_names_use_original_stem() {
        assert_eq!(
            segment_file_name(Path::new("/in/scan 01.tiff"), 2),
            "scan 01_document_2.pdf"
        );
    }

    #[test]
    fn writes_one_pdf_per_segment() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("batch.pdf");
        numbered_pdf(&source, 5);
        let out = dir.path().join("out");
        std::fs::create_dir(&out).unwrap();

        let written = write_segments(&source, &source, &map(&[(2, false)]), &out).unwrap();

        assert_eq!(
            written,
            vec![out.join("batch_document_0.pdf"), out.join("batch_document_1.pdf")]
        );
        assert_eq!(page_widths(&written[0]), vec![10, 11]);
        assert_eq!(page_widths(&written[1]), vec![13, 14]);
    }

    #[test]
    fn output_carries_original_modification_time() {
        use std::fs::{File, FileTimes};
        use std::time::{Duration, SystemTime};

        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("dated.pdf");
        numbered_pdf(&source, 3);
        let past = SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000);
        File::options()
            .write(true)
            .open(&source)
            .unwrap()
            .set_times(FileTimes::new().set_modified(past))
            .unwrap();

        let written = write_segments(&source, &source, &map(&[(1, true)]), dir.path()).unwrap();
        for path in written {
            assert_eq!(std::fs::metadata(path).unwrap().modified().unwrap(), past);
        }
    }

    #[test]
    fn split_point_past_the_end_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("short.pdf");
        numbered_pdf(&source, 2);
        let err = write_segments(&source, &source, &map(&[(5, false)]), dir.path()).unwrap_err();
        assert!(matches!(err, SplitError::SegmentationFailed { .. }));
    }

    #[test]
    fn pdf_with_owner_password_only_is_cut() {
        use lopdf::xref::XrefType;
        use lopdf::{EncryptionState, EncryptionVersion, Permissions};

        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("locked.pdf");
        numbered_pdf(&source, 4);

        let mut doc = Document::load(&source).unwrap();
        let file_id = Object::string_literal(b"0123456789abcdef".to_vec());
        doc.trailer.set("ID", vec![file_id.clone(), file_id]);
        doc.reference_table.cross_reference_type = XrefType::CrossReferenceTable;
        let state = EncryptionState::try_from(EncryptionVersion::V2 {
            document: &doc,
            owner_password: "owner",
            user_password: "",
            key_length: 128,
            permissions: Permissions::all(),
        })
        .unwrap();
        doc.encrypt(&state).unwrap();
        doc.save(&source).unwrap();

        let out = dir.path().join("out");
        std::fs::create_dir(&out).unwrap();
        let written = write_segments(&source, &source, &map(&[(2, true)]), &out).unwrap();

        assert_eq!(page_widths(&written[0]), vec![10, 11]);
        assert_eq!(page_widths(&written[1]), vec![12, 13]);
        for path in &written {
            let part = Document::load(path).unwrap();
            assert!(!part.is_encrypted(), "{} must be written in the clear", path.display());
        }
    }

    #[test]
    fn segments_hold_only_their_own_images() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("batch.pdf");
        numbered_pdf(&source, 6);

        let written = write_segments(&source, &source, &map(&[(1, false), (4, true)]), dir.path()).unwrap();

        let image_counts: Vec<usize> = written
            .iter()
            .map(|path| {
                let doc = Document::load(path).unwrap();
                doc.objects
                    .values()
                    .filter_map(|object| object.as_stream().ok())
                    .filter(|stream| stream.dict.has_type(b"XObject"))
                    .count()
            })
            .collect();
        assert_eq!(image_counts, vec![1, 2, 2]);
    }

    #[test]
    fn inherited_page_attributes_survive_the_cut() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("inherited.pdf");
        numbered_pdf(&source, 3);

        // Hoist the MediaBox of every page up to the page tree root.
        let mut doc = Document::load(&source).unwrap();
        let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();
        for id in &page_ids {
            doc.get_dictionary_mut(*id).unwrap().remove(b"MediaBox");
        }
        let root = doc.catalog().unwrap().get(b"Pages").unwrap().as_reference().unwrap();
        doc.get_dictionary_mut(root).unwrap().set(
            "MediaBox",
            vec![0.into(), 0.into(), 40.into(), 50.into()],
        );
        doc.save(&source).unwrap();

        let written = write_segments(&source, &source, &map(&[(1, true)]), dir.path()).unwrap();

        assert_eq!(page_widths(&written[0]), vec![40]);
        assert_eq!(page_widths(&written[1]), vec![40, 40]);
    }

    #[test]
    fn unreadable_source_fails() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("garbage.pdf");
        std::fs::write(&source, b"this is not a pdf").unwrap();
        let err = write_segments(&source, &source, &map(&[(1, false)]), dir.path()).unwrap_err();
        assert!(matches!(err, SplitError::SegmentationFailed { .. }));
    }
}
