//! The per-object measurement contract.
//!
//! The pipeline does not own any pixel-level algorithm; it drives a
//! `MeasurementEngine` supplied by the caller over every record. Engine
//! failures are per-record: the pipeline flags the record and moves on, so
//! one pathological object cannot take down the batch.
//!
//! `ApertureFluxEngine` is the bundled minimal engine: a straight sum of
//! image pixels over the record's footprint with a variance-propagated
//! error. It exists so the binary and the integration tests have a real
//! engine to drive; anything smarter (PSF fitting, shape measurement)
//! belongs to an external engine implementing this trait.

use thiserror::Error;

use crate::core::image::Exposure;
use crate::core::record::MeasurementRecord;

#[derive(Error, Debug)]
pub enum MeasureError {
    #[error("record has an empty footprint")]
    EmptyFootprint,

    #[error("centroid is not finite")]
    BadCentroid,

    #[error("{0}")]
    Algorithm(String),
}

/// Per-object measurement algorithm driven by the pipeline.
pub trait MeasurementEngine {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Measure one record against the target image, writing named fields
    /// into the record.
    ///
    /// # Errors
    ///
    /// An error flags this record as failed; it never aborts the batch.
    fn measure(
        &self,
        record: &mut MeasurementRecord,
        exposure: &Exposure,
    ) -> Result<(), MeasureError>;
}

/// Field written by [`ApertureFluxEngine`]: summed footprint flux.
pub const FIELD_APER_FLUX: &str = "aper_flux";

/// Field written by [`ApertureFluxEngine`]: 1-sigma flux uncertainty.
pub const FIELD_APER_FLUX_ERR: &str = "aper_flux_err";

/// Footprint-sum flux engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApertureFluxEngine;

impl MeasurementEngine for ApertureFluxEngine {
    fn name(&self) -> &'static str {
        "aperture_flux"
    }

    fn measure(
        &self,
        record: &mut MeasurementRecord,
        exposure: &Exposure,
    ) -> Result<(), MeasureError> {
        if record.footprint.is_empty() {
            return Err(MeasureError::EmptyFootprint);
        }

        let mut flux = 0.0f64;
        let mut variance = 0.0f64;
        for (x, y) in record.footprint.pixels() {
            if let Some(value) = exposure.pixel(x, y) {
                flux += f64::from(value);
                variance += f64::from(exposure.variance_at(x, y).unwrap_or(0.0));
            }
        }

        record.set_field(FIELD_APER_FLUX, flux);
        record.set_field(FIELD_APER_FLUX_ERR, variance.sqrt());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::footprint::{Footprint, Span};
    use crate::core::geom::{PixelBox, PixelPoint, SkyPoint};
    use crate::core::image::PsfModel;
    use crate::core::types::{RefId, SourceId};
    use crate::core::wcs::TanWcs;

    fn exposure_with_values() -> Exposure {
        let wcs = TanWcs::north_up(
            PixelPoint::new(5.0, 5.0),
            SkyPoint::new(10.0, -5.0),
            0.2 / 3600.0,
        )
        .unwrap();
        let mut exposure = Exposure::blank(
            PixelBox::from_dimensions(0, 0, 10, 10),
            wcs,
            PsfModel::new(2.0),
        )
        .unwrap();
        exposure.set_pixel(2, 3, 1.5);
        exposure.set_pixel(3, 3, 2.5);
        exposure
    }

    #[test]
    fn test_aperture_sum() {
        let exposure = exposure_with_values();
        let mut record =
            MeasurementRecord::new(SourceId(1), RefId(1), PixelPoint::new(2.5, 3.0));
        record.footprint = Footprint::from_spans(vec![Span::new(3, 2, 3)]);

        ApertureFluxEngine.measure(&mut record, &exposure).unwrap();
        assert_eq!(record.field(FIELD_APER_FLUX), Some(4.0));
        // Two unit-variance pixels
        assert!((record.field(FIELD_APER_FLUX_ERR).unwrap() - 2.0_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_empty_footprint_fails() {
        let exposure = exposure_with_values();
        let mut record =
            MeasurementRecord::new(SourceId(1), RefId(1), PixelPoint::new(2.5, 3.0));
        let result = ApertureFluxEngine.measure(&mut record, &exposure);
        assert!(matches!(result, Err(MeasureError::EmptyFootprint)));
    }
}
