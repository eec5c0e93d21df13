//! Measurement-catalog construction.
//!
//! The builder turns a reference catalog into a blank, row-aligned
//! measurement catalog for one target image: one output row per reference
//! record in reference order, a packed identifier per row, reference-frame
//! fields forwarded per the configured copy list, and the reference
//! footprint projected into the target frame.
//!
//! A reference record with no usable footprint degrades to an empty
//! footprint and a `no_footprint` flag on that row; identifier-budget
//! violations abort the whole build.

use thiserror::Error;
use tracing::warn;

use crate::catalog::measurement::MeasurementCatalog;
use crate::catalog::reference::ReferenceCatalog;
use crate::core::geom::PixelPoint;
use crate::core::ident::{IdError, SourceIdFactory};
use crate::core::image::Exposure;
use crate::core::record::MeasurementRecord;
use crate::core::types::FLAG_NO_FOOTPRINT;
use crate::core::wcs::TanWcs;
use crate::pipeline::project::{FlattenProjector, FootprintProjector};

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("reference catalog is empty")]
    EmptyReferenceCatalog,

    #[error("identifier budget exhausted: {0}")]
    Id(#[from] IdError),
}

/// Builds blank measurement catalogs from reference catalogs.
pub struct MeasurementCatalogBuilder {
    /// Reference-frame fields forwarded into each output row
    copy_fields: Vec<String>,

    /// Projector used to attach footprints in the target frame
    projector: Box<dyn FootprintProjector>,
}

impl Default for MeasurementCatalogBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MeasurementCatalogBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            copy_fields: Vec::new(),
            projector: Box::new(FlattenProjector),
        }
    }

    /// Forward the named reference-frame fields into each output row,
    /// prefixed with `ref_`.
    #[must_use]
    pub fn copy_fields(mut self, fields: Vec<String>) -> Self {
        self.copy_fields = fields;
        self
    }

    /// Swap the footprint projector. The default discards deblend structure;
    /// supply an alternative to preserve it.
    #[must_use]
    pub fn with_projector(mut self, projector: Box<dyn FootprintProjector>) -> Self {
        self.projector = projector;
        self
    }

    /// Build the blank measurement catalog for one exposure.
    ///
    /// Row `i` of the result corresponds to reference record `i`;
    /// identifiers come from `id_factory` in row order.
    ///
    /// # Errors
    ///
    /// Returns `BuildError::EmptyReferenceCatalog` when there is nothing to
    /// measure, or `BuildError::Id` when the identifier bit budget is
    /// exhausted; both abort the invocation.
    pub fn build(
        &self,
        references: &ReferenceCatalog,
        exposure: &Exposure,
        ref_wcs: &TanWcs,
        id_factory: &mut SourceIdFactory,
    ) -> Result<MeasurementCatalog, BuildError> {
        if references.is_empty() {
            return Err(BuildError::EmptyReferenceCatalog);
        }

        let mut records = Vec::with_capacity(references.len());
        for reference in references {
            let id = id_factory.next_id()?;

            // A reference position that does not project onto this image
            // keeps its row (order is load-bearing) with a NaN centroid.
            let centroid = exposure
                .wcs
                .sky_to_pixel(reference.coord)
                .unwrap_or(PixelPoint::new(f64::NAN, f64::NAN));

            let mut record = MeasurementRecord::new(id, reference.id, centroid);

            for name in &self.copy_fields {
                if let Some(value) = reference.fields.get(name) {
                    record.set_field(format!("ref_{name}"), *value);
                }
            }

            match &reference.footprint {
                Some(footprint) if !footprint.is_empty() => {
                    record.footprint = self.projector.project(
                        footprint,
                        ref_wcs,
                        &exposure.wcs,
                        exposure.bbox,
                    );
                }
                _ => {
                    warn!(
                        ref_id = %reference.id,
                        "reference record has no footprint; degrading to empty"
                    );
                    record.set_flag(FLAG_NO_FOOTPRINT);
                }
            }

            records.push(record);
        }

        Ok(MeasurementCatalog::from_records(records))
    }
}
