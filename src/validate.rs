//! Reference-graph checks run on the in-memory package before any byte is
//! written.
//!
//! Every id the spine or navigation names must resolve in the manifest,
//! navigation must follow the spine, and the planned archive must hold
//! exactly the files the manifest declares. A failure here means the
//! assembler allocated ids inconsistently.

use std::collections::BTreeSet;

use crate::book::PackageEntry;
use crate::error::IntegrityViolation;
use crate::metadata::{Manifest, CONTAINER_PATH, MEDIA_XHTML};
use crate::navigation::Navigation;
use crate::spine::Spine;
use crate::zip::Compression;

/// Run every check, stopping at the first violation.
pub fn check_package(
    manifest: &Manifest,
    spine: &Spine,
    navigation: &Navigation,
    entries: &[PackageEntry],
    cover_page_id: &str,
) -> Result<(), IntegrityViolation> {
    check_spine(manifest, spine, cover_page_id)?;
    check_navigation(manifest, spine, navigation)?;
    check_archive_layout(manifest, entries)?;
    Ok(())
}

/// Spine ids resolve to XHTML manifest items and the cover page leads.
pub fn check_spine(
    manifest: &Manifest,
    spine: &Spine,
    cover_page_id: &str,
) -> Result<(), IntegrityViolation> {
    if !manifest.contains(spine.toc_id()) {
        return Err(IntegrityViolation::SpineIdrefMissing {
            idref: spine.toc_id().to_string(),
        });
    }
    for idref in spine.idrefs() {
        let item = manifest
            .get(idref)
            .ok_or_else(|| IntegrityViolation::SpineIdrefMissing {
                idref: idref.clone(),
            })?;
        if item.media_type != MEDIA_XHTML {
            return Err(IntegrityViolation::SpineItemNotXhtml {
                idref: idref.clone(),
            });
        }
    }
    if spine.idrefs().first().map(String::as_str) != Some(cover_page_id) {
        return Err(IntegrityViolation::CoverNotFirst);
    }
    Ok(())
}

/// Navigation targets resolve in the manifest and follow spine order.
pub fn check_navigation(
    manifest: &Manifest,
    spine: &Spine,
    navigation: &Navigation,
) -> Result<(), IntegrityViolation> {
    for point in &navigation.points {
        if manifest.find_by_href(&point.src).is_none() {
            return Err(IntegrityViolation::NavTargetMissing {
                nav_id: point.id.clone(),
                src: point.src.clone(),
            });
        }
    }

    let count = spine.len().max(navigation.len());
    for index in 0..count {
        let spine_href = spine
            .idrefs()
            .get(index)
            .and_then(|idref| manifest.get(idref))
            .map(|item| item.href.as_str());
        let nav_src = navigation.points.get(index).map(|point| point.src.as_str());
        if spine_href.is_none() || spine_href != nav_src {
            return Err(IntegrityViolation::NavOrderMismatch { index });
        }
    }
    Ok(())
}

/// The planned archive holds `mimetype` first and stored, then the
/// container, then exactly one file per manifest item.
pub fn check_archive_layout(
    manifest: &Manifest,
    entries: &[PackageEntry],
) -> Result<(), IntegrityViolation> {
    match entries.first() {
        Some(first) if first.path == "mimetype" && first.compression == Compression::Stored => {}
        _ => return Err(IntegrityViolation::MimetypeLayout),
    }

    let mut seen = BTreeSet::new();
    for entry in entries {
        if !seen.insert(entry.path.as_str()) {
            return Err(IntegrityViolation::DuplicateArchivePath {
                path: entry.path.clone(),
            });
        }
    }

    let opf = crate::metadata::opf_path();
    let declared: BTreeSet<String> = manifest
        .items()
        .iter()
        .map(|item| item.archive_path())
        .collect();
    for entry in &entries[1..] {
        let path = entry.path.as_str();
        if path == CONTAINER_PATH || path == opf {
            continue;
        }
        if !declared.contains(path) {
            return Err(IntegrityViolation::FileNotInManifest {
                path: entry.path.clone(),
            });
        }
    }
    for item in manifest.items() {
        if !seen.contains(item.archive_path().as_str()) {
            return Err(IntegrityViolation::ManifestFileMissing {
                id: item.id.clone(),
            });
        }
    }
    Ok(())
}
