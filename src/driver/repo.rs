//! File-backed dataset collaborators.
//!
//! Thin filesystem implementations of the provider traits, used by the CLI:
//! exposures as bincode fixture files, reference catalogs as (optionally
//! gzipped) JSON documents, output as pretty JSON. File names follow fixed
//! locator-derived conventions so a repository is just a directory.

use std::path::{Path, PathBuf};

use crate::catalog::reference::ReferenceCatalog;
use crate::catalog::store;
use crate::core::geom::SkyPoint;
use crate::core::image::Exposure;
use crate::core::wcs::TanWcs;
use crate::driver::ccd::CcdLocator;
use crate::driver::coadd::CoaddLocator;
use crate::driver::{ExposureProvider, OutputSink, ProviderError, ReferenceProvider};
use crate::pipeline::engine::PipelineResult;

/// File-name stem for a locator's datasets.
pub trait DatasetKey {
    fn dataset_key(&self) -> String;
}

impl DatasetKey for CcdLocator {
    fn dataset_key(&self) -> String {
        format!("visit-{:06}-det-{:03}", self.visit, self.detector)
    }
}

impl DatasetKey for CoaddLocator {
    fn dataset_key(&self) -> String {
        format!(
            "tract-{:04}-patch-{}-{}-{}",
            self.tract, self.patch.0, self.patch.1, self.band
        )
    }
}

/// Exposure fixtures under one root directory, one `<key>.exp` per target.
pub struct FileExposureStore {
    root: PathBuf,
}

impl FileExposureStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn exposure_path(&self, key: &impl DatasetKey) -> PathBuf {
        self.root.join(format!("{}.exp", key.dataset_key()))
    }

    fn fetch(&self, key: &impl DatasetKey) -> Result<Exposure, ProviderError> {
        let path = self.exposure_path(key);
        if !path.exists() {
            return Err(ProviderError::NotFound(path.display().to_string()));
        }
        Ok(store::load_exposure(&path)?)
    }
}

impl<L: DatasetKey> ExposureProvider<L> for FileExposureStore {
    fn fetch_exposure(&self, locator: &L) -> Result<Exposure, ProviderError> {
        self.fetch(locator)
    }
}

/// Reference catalogs on disk: a single all-sky document for cone
/// selection, a directory of per-tile documents for tile selection, or
/// both.
pub struct FileReferenceSource {
    single: Option<(ReferenceCatalog, TanWcs)>,
    tile_root: Option<PathBuf>,
}

impl FileReferenceSource {
    /// Load one catalog document; cone queries filter it in memory.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError` when the document cannot be loaded.
    pub fn from_file(path: &Path) -> Result<Self, ProviderError> {
        let loaded = store::load_reference_catalog(path)?;
        Ok(Self {
            single: Some(loaded),
            tile_root: None,
        })
    }

    /// Per-tile documents `ref-<tract>-<x>-<y>.json[.gz]` under `root`.
    #[must_use]
    pub fn tiled(root: impl Into<PathBuf>) -> Self {
        Self {
            single: None,
            tile_root: Some(root.into()),
        }
    }

    fn tile_path(root: &Path, tract: u32, patch: (u32, u32)) -> Option<PathBuf> {
        let stem = format!("ref-{:04}-{}-{}", tract, patch.0, patch.1);
        for ext in ["json", "json.gz"] {
            let candidate = root.join(format!("{stem}.{ext}"));
            if candidate.exists() {
                return Some(candidate);
            }
        }
        None
    }
}

impl ReferenceProvider for FileReferenceSource {
    fn fetch_in_cone(
        &self,
        center: SkyPoint,
        radius_deg: f64,
    ) -> Result<(ReferenceCatalog, TanWcs), ProviderError> {
        let (catalog, wcs) = self.single.as_ref().ok_or_else(|| {
            ProviderError::Other("no all-sky reference catalog configured".to_string())
        })?;
        let selected = catalog.filtered(|r| center.separation_deg(&r.coord) <= radius_deg);
        Ok((selected, wcs.clone()))
    }

    fn fetch_tile(
        &self,
        tract: u32,
        patch: (u32, u32),
    ) -> Result<(ReferenceCatalog, TanWcs), ProviderError> {
        if let Some(root) = &self.tile_root {
            let path = Self::tile_path(root, tract, patch).ok_or_else(|| {
                ProviderError::NotFound(format!(
                    "reference tile tract={tract} patch={},{} under {}",
                    patch.0,
                    patch.1,
                    root.display()
                ))
            })?;
            return Ok(store::load_reference_catalog(&path)?);
        }
        // A single document may serve as one pre-tiled catalog.
        self.single.clone().ok_or_else(|| {
            ProviderError::Other("no tiled reference catalog configured".to_string())
        })
    }
}

/// Measurement output as `forced-src-<key>.json` under one root directory.
pub struct JsonOutputSink {
    root: PathBuf,
    strip_footprints: bool,
}

impl JsonOutputSink {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, strip_footprints: bool) -> Self {
        Self {
            root: root.into(),
            strip_footprints,
        }
    }

    #[must_use]
    pub fn output_path(&self, key: &impl DatasetKey) -> PathBuf {
        self.root.join(format!("forced-src-{}.json", key.dataset_key()))
    }
}

impl<L: DatasetKey> OutputSink<L> for JsonOutputSink {
    fn write(&self, locator: &L, result: &PipelineResult) -> Result<(), ProviderError> {
        std::fs::create_dir_all(&self.root)
            .map_err(|e| ProviderError::Store(store::StoreError::Io(e)))?;
        store::save_measurement_catalog(
            &self.output_path(locator),
            &result.catalog,
            result.exposure_id,
            self.strip_footprints,
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geom::PixelPoint;
    use crate::core::record::ReferenceRecord;
    use crate::core::types::RefId;

    fn write_refcat(path: &Path, records: Vec<ReferenceRecord>) {
        let wcs = TanWcs::north_up(
            PixelPoint::new(0.0, 0.0),
            SkyPoint::new(150.0, 2.0),
            0.2 / 3600.0,
        )
        .unwrap();
        let catalog = ReferenceCatalog::from_records(records);
        let json = store::reference_catalog_to_json(&catalog, &wcs).unwrap();
        std::fs::write(path, json).unwrap();
    }

    #[test]
    fn test_cone_selection_filters() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("refcat.json");
        write_refcat(
            &path,
            vec![
                ReferenceRecord::new(RefId(1), SkyPoint::new(150.0, 2.0)),
                ReferenceRecord::new(RefId(2), SkyPoint::new(150.0, 3.5)),
            ],
        );

        let source = FileReferenceSource::from_file(&path).unwrap();
        let (selected, _) = source
            .fetch_in_cone(SkyPoint::new(150.0, 2.0), 0.5)
            .unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected.get(0).unwrap().id, RefId(1));
    }

    #[test]
    fn test_tile_lookup() {
        let dir = tempfile::tempdir().unwrap();
        write_refcat(
            &dir.path().join("ref-0003-1-2.json"),
            vec![ReferenceRecord::new(RefId(5), SkyPoint::new(10.0, 10.0))],
        );

        let source = FileReferenceSource::tiled(dir.path());
        let (tile, _) = source.fetch_tile(3, (1, 2)).unwrap();
        assert_eq!(tile.len(), 1);

        let missing = source.fetch_tile(3, (9, 9));
        assert!(matches!(missing, Err(ProviderError::NotFound(_))));
    }

    #[test]
    fn test_dataset_keys() {
        let ccd = CcdLocator {
            visit: 42,
            detector: 7,
        };
        assert_eq!(ccd.dataset_key(), "visit-000042-det-007");

        let coadd = CoaddLocator {
            tract: 3,
            patch: (1, 2),
            band: "i".to_string(),
        };
        assert_eq!(coadd.dataset_key(), "tract-0003-patch-1-2-i");
    }

    #[test]
    fn test_missing_exposure_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let exposures = FileExposureStore::new(dir.path());
        let result = exposures.fetch(&CcdLocator {
            visit: 1,
            detector: 1,
        });
        assert!(matches!(result, Err(ProviderError::NotFound(_))));
    }
}
