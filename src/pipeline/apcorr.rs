//! Aperture-correction application.
//!
//! Rescales flux-like fields by the correction surface the calibration
//! attached to the exposure, evaluated at each record's centroid. Fields
//! without a surface in the map are left alone; a non-finite or
//! non-positive factor flags the record instead of corrupting it.

use tracing::warn;

use crate::catalog::measurement::MeasurementCatalog;
use crate::core::image::ApCorrMap;
use crate::core::types::FLAG_APCORR_FAILED;

/// Apply `map` to every record of `catalog` in place.
///
/// For each flux field named in the map that a record carries, the field and
/// its `<name>_err` sibling are multiplied by the surface evaluated at the
/// record centroid.
pub fn apply_ap_corr(catalog: &mut MeasurementCatalog, map: &ApCorrMap) {
    for record in catalog.iter_mut() {
        for (field, surface) in &map.fields {
            let Some(flux) = record.field(field) else {
                continue;
            };
            let factor = surface.evaluate(record.centroid);
            if !factor.is_finite() || factor <= 0.0 {
                warn!(
                    id = %record.id,
                    field,
                    factor,
                    "invalid aperture-correction factor"
                );
                record.set_flag(FLAG_APCORR_FAILED);
                continue;
            }
            record.set_field(field.clone(), flux * factor);

            let err_field = format!("{field}_err");
            if let Some(err) = record.field(&err_field) {
                record.set_field(err_field, err * factor);
            }
        }
    }
}
