//! Output placement: move finished segments out of the working copy.
//!
//! Documents that arrived through the consume folder get their pieces written
//! next to the original, where the folder watcher picks them up again. Every
//! other source needs a configured consumption directory.
//!
//! Placement runs in two phases. All target names are checked first so a
//! collision is reported before any file moves; only then are the segments
//! moved. A move that fails midway takes back every piece already placed, so
//! the destination ends up as it was. The original document is never touched
//! here.

use crate::config::DocumentSource;
use crate::error::SplitError;
use crate::pipeline::fsmeta::copy_file_stats;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Directory that receives the pieces of `original`.
///
/// # Errors
/// [`SplitError::MissingConsumptionDir`] when `source` is not the consume
/// folder and `consumption_dir` is `None`.
pub fn destination_dir(
    source: DocumentSource,
    original: &Path,
    consumption_dir: Option<&Path>,
) -> Result<PathBuf, SplitError> {
    if source.is_consume_folder() {
        return Ok(original
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")));
    }
    consumption_dir
        .map(Path::to_path_buf)
        .ok_or(SplitError::MissingConsumptionDir)
}

/// Final file name of the segment at `index`.
///
/// With an override the name is `<index>_<override>`; otherwise the segment
/// keeps the name it was written under.
pub fn target_name(segment: &Path, index: usize, override_filename: Option<&str>) -> String {
    match override_filename {
        Some(name) => format!("{index}_{name}"),
        None => segment
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("{index}.pdf")),
    }
}

/// Move `segments` into `dest_dir` and return their final paths, in order.
///
/// # Errors
/// [`SplitError::DestinationExists`] if any target name is taken (nothing is
/// moved in that case); [`SplitError::PlacementFailed`] if a move fails, after
/// the pieces placed so far have been taken back out of `dest_dir`.
pub fn place_segments(
    segments: &[PathBuf],
    dest_dir: &Path,
    override_filename: Option<&str>,
) -> Result<Vec<PathBuf>, SplitError> {
    let targets: Vec<PathBuf> = segments
        .iter()
        .enumerate()
        .map(|(index, segment)| dest_dir.join(target_name(segment, index, override_filename)))
        .collect();

    if let Some(taken) = targets.iter().find(|t| t.exists()) {
        warn!("{} already exists; placing nothing", taken.display());
        return Err(SplitError::DestinationExists {
            path: taken.clone(),
        });
    }

    fs::create_dir_all(dest_dir).map_err(|e| SplitError::PlacementFailed {
        path: dest_dir.to_path_buf(),
        source: e,
    })?;

    for (placed, (segment, target)) in segments.iter().zip(&targets).enumerate() {
        if let Err(e) = move_file(segment, target) {
            warn!("Cannot place {}: {e}; taking back {placed} placed pieces", target.display());
            unplace(&segments[..placed], &targets[..placed]);
            return Err(SplitError::PlacementFailed {
                path: target.clone(),
                source: e,
            });
        }
        debug!("Placed {} → {}", segment.display(), target.display());
    }

    info!("Placed {} documents in {}", targets.len(), dest_dir.display());
    Ok(targets)
}

/// Undo a partial placement: move each placed piece back to its segment
/// path, deleting it outright if that fails too.
fn unplace(segments: &[PathBuf], targets: &[PathBuf]) {
    for (segment, target) in segments.iter().zip(targets) {
        if move_file(target, segment).is_ok() {
            continue;
        }
        if let Err(e) = fs::remove_file(target) {
            error!("Cannot remove partially placed {}: {e}", target.display());
        }
    }
}

/// Rename, falling back to copy-and-delete when `from` and `to` sit on
/// different filesystems.
fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    fs::copy(from, to)?;
    copy_file_stats(from, to)?;
    fs::remove_file(from)
}
