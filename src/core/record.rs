//! Catalog record types.
//!
//! `ReferenceRecord` is one row of the external reference catalog: the fixed
//! position, shape and reference-frame quantities measurement is forced at.
//! `MeasurementRecord` is the corresponding output row, created blank by the
//! catalog builder and filled in place by the pipeline stages.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::core::footprint::Footprint;
use crate::core::geom::{PixelPoint, SkyPoint};
use crate::core::types::{RefId, SourceId};

/// One object of the reference catalog. Immutable once loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceRecord {
    /// Stable survey-wide identifier
    pub id: RefId,

    /// Sky position measurement is forced at
    pub coord: SkyPoint,

    /// Detection footprint in the reference image's pixel frame.
    /// Absent footprints degrade to empty ones at catalog build time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footprint: Option<Footprint>,

    /// Reference-frame quantities (fluxes, shapes, ...) by field name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, f64>,
}

impl ReferenceRecord {
    #[must_use]
    pub fn new(id: RefId, coord: SkyPoint) -> Self {
        Self {
            id,
            coord,
            footprint: None,
            fields: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_footprint(mut self, footprint: Footprint) -> Self {
        self.footprint = Some(footprint);
        self
    }

    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: f64) -> Self {
        self.fields.insert(name.into(), value);
        self
    }
}

/// One row of the forced measurement output, aligned by position with its
/// reference record. Mutated in place by the pipeline stages; the row set
/// itself is fixed at build time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasurementRecord {
    /// Packed survey-unique source identifier
    pub id: SourceId,

    /// Identifier of the reference record this row was generated from
    pub ref_id: RefId,

    /// Reference position mapped into the target image's pixel frame
    pub centroid: PixelPoint,

    /// Footprint in the target image's pixel frame (possibly empty)
    pub footprint: Footprint,

    /// Named measurement fields written by pipeline stages
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, f64>,

    /// Per-record degradation flags
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub flags: BTreeSet<String>,
}

impl MeasurementRecord {
    #[must_use]
    pub fn new(id: SourceId, ref_id: RefId, centroid: PixelPoint) -> Self {
        Self {
            id,
            ref_id,
            centroid,
            footprint: Footprint::empty(),
            fields: BTreeMap::new(),
            flags: BTreeSet::new(),
        }
    }

    /// Read a named measurement field.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<f64> {
        self.fields.get(name).copied()
    }

    /// Write a named measurement field.
    pub fn set_field(&mut self, name: impl Into<String>, value: f64) {
        self.fields.insert(name.into(), value);
    }

    pub fn set_flag(&mut self, flag: &str) {
        self.flags.insert(flag.to_string());
    }

    #[must_use]
    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.contains(flag)
    }
}
