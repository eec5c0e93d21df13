//! Catalog and exposure persistence.
//!
//! Reference catalogs travel as versioned JSON documents (optionally
//! gzipped) carrying the reference WCS alongside the records; exposures are
//! bincode fixture files; measurement output is written as pretty JSON with
//! an optional footprint-stripping storage flag.

use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;
use thiserror::Error;

use crate::catalog::measurement::MeasurementCatalog;
use crate::catalog::reference::ReferenceCatalog;
use crate::core::image::Exposure;
use crate::core::record::ReferenceRecord;
use crate::core::wcs::{TanWcs, WcsError};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse catalog document: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("failed to decode exposure fixture: {0}")]
    Decode(#[from] bincode::Error),

    #[error("catalog document has an invalid WCS: {0}")]
    Wcs(#[from] WcsError),
}

/// Reference-catalog document version for compatibility checking.
pub const CATALOG_VERSION: &str = "2";

/// On-disk reference catalog document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefCatalogData {
    pub version: String,
    pub created_at: String,

    /// WCS the catalog's footprints are defined in
    pub wcs: TanWcs,

    pub records: Vec<ReferenceRecord>,
}

/// Load a reference catalog (and its WCS) from a JSON or gzipped-JSON file.
///
/// # Errors
///
/// Returns `StoreError` on I/O failures, malformed documents, or a
/// non-invertible stored WCS. A missing WCS fails the parse: references
/// without a frame are unusable for forced photometry.
pub fn load_reference_catalog(path: &Path) -> Result<(ReferenceCatalog, TanWcs), StoreError> {
    let raw = std::fs::read(path)?;
    let text = if is_gzip(path, &raw) {
        let mut decoder = GzDecoder::new(raw.as_slice());
        let mut out = String::new();
        decoder.read_to_string(&mut out)?;
        out
    } else {
        String::from_utf8(raw).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?
    };

    let data: RefCatalogData = serde_json::from_str(&text)?;
    if data.version != CATALOG_VERSION {
        tracing::warn!(
            expected = CATALOG_VERSION,
            found = %data.version,
            "reference catalog version mismatch"
        );
    }

    let mut wcs = data.wcs;
    wcs.rebuild_inverse()?;
    Ok((ReferenceCatalog::from_records(data.records), wcs))
}

/// Serialize a reference catalog and its WCS to a JSON document string.
///
/// # Errors
///
/// Returns `StoreError::Parse` when serialization fails.
pub fn reference_catalog_to_json(
    catalog: &ReferenceCatalog,
    wcs: &TanWcs,
) -> Result<String, StoreError> {
    let data = RefCatalogData {
        version: CATALOG_VERSION.to_string(),
        created_at: chrono::Utc::now().to_rfc3339(),
        wcs: wcs.clone(),
        records: catalog.records().to_vec(),
    };
    Ok(serde_json::to_string_pretty(&data)?)
}

fn is_gzip(path: &Path, raw: &[u8]) -> bool {
    let by_name = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("gz"));
    by_name || raw.starts_with(&[0x1f, 0x8b])
}

/// Read an exposure fixture file.
///
/// # Errors
///
/// Returns `StoreError` on I/O or decode failures, or when the stored WCS
/// cannot be inverted.
pub fn load_exposure(path: &Path) -> Result<Exposure, StoreError> {
    let raw = std::fs::read(path)?;
    let mut exposure: Exposure = bincode::deserialize(&raw)?;
    exposure.wcs.rebuild_inverse()?;
    Ok(exposure)
}

/// Write an exposure fixture file.
///
/// # Errors
///
/// Returns `StoreError` on I/O or encode failures.
pub fn save_exposure(path: &Path, exposure: &Exposure) -> Result<(), StoreError> {
    let raw = bincode::serialize(exposure)?;
    std::fs::write(path, raw)?;
    Ok(())
}

/// On-disk forced measurement output document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasurementData {
    pub version: String,
    pub created_at: String,

    /// Exposure identifier the catalog was computed for
    pub exposure_id: u64,

    pub catalog: MeasurementCatalog,
}

/// Write a measurement catalog as pretty JSON.
///
/// With `strip_footprints`, footprints are dropped before persistence -
/// positions, identifiers and fields are what downstream joins need, and
/// footprints dominate the document size.
///
/// # Errors
///
/// Returns `StoreError` on I/O or serialization failures.
pub fn save_measurement_catalog(
    path: &Path,
    catalog: &MeasurementCatalog,
    exposure_id: u64,
    strip_footprints: bool,
) -> Result<(), StoreError> {
    let mut catalog = catalog.clone();
    if strip_footprints {
        catalog.strip_footprints();
    }
    let data = MeasurementData {
        version: CATALOG_VERSION.to_string(),
        created_at: chrono::Utc::now().to_rfc3339(),
        exposure_id,
        catalog,
    };
    std::fs::write(path, serde_json::to_string_pretty(&data)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::footprint::{Footprint, Span};
    use crate::core::geom::{PixelBox, PixelPoint, SkyPoint};
    use crate::core::image::PsfModel;
    use crate::core::types::RefId;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn sample_catalog() -> (ReferenceCatalog, TanWcs) {
        let wcs = TanWcs::north_up(
            PixelPoint::new(10.0, 10.0),
            SkyPoint::new(210.0, -33.0),
            0.2 / 3600.0,
        )
        .unwrap();
        let catalog = ReferenceCatalog::from_records(vec![ReferenceRecord::new(
            RefId(7),
            SkyPoint::new(210.0, -33.0),
        )
        .with_footprint(Footprint::from_spans(vec![Span::new(10, 9, 11)]))]);
        (catalog, wcs)
    }

    #[test]
    fn test_reference_catalog_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("refcat.json");
        let (catalog, wcs) = sample_catalog();

        let json = reference_catalog_to_json(&catalog, &wcs).unwrap();
        std::fs::write(&path, json).unwrap();

        let (loaded, loaded_wcs) = load_reference_catalog(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.get(0).unwrap().id, RefId(7));
        // The rebuilt inverse must actually work
        let p = loaded_wcs.sky_to_pixel(SkyPoint::new(210.0, -33.0)).unwrap();
        assert!((p.x - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_gzipped_catalog_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("refcat.json.gz");
        let (catalog, wcs) = sample_catalog();
        let json = reference_catalog_to_json(&catalog, &wcs).unwrap();

        let file = std::fs::File::create(&path).unwrap();
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(json.as_bytes()).unwrap();
        encoder.finish().unwrap();

        let (loaded, _) = load_reference_catalog(&path).unwrap();
        assert_eq!(loaded.len(), 1);
    }

    #[test]
    fn test_missing_wcs_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{"version":"2","created_at":"","records":[]}"#).unwrap();
        assert!(matches!(
            load_reference_catalog(&path),
            Err(StoreError::Parse(_))
        ));
    }

    #[test]
    fn test_exposure_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exp.bin");
        let (_, wcs) = sample_catalog();
        let exposure = Exposure::blank(
            PixelBox::from_dimensions(0, 0, 8, 8),
            wcs,
            PsfModel::new(1.8),
        )
        .unwrap();

        save_exposure(&path, &exposure).unwrap();
        let loaded = load_exposure(&path).unwrap();
        assert_eq!(loaded.bbox, exposure.bbox);
        assert!(loaded.wcs.sky_to_pixel(SkyPoint::new(210.0, -33.0)).is_ok());
    }
}
