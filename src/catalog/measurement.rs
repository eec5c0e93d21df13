use serde::{Deserialize, Serialize};

use crate::core::record::MeasurementRecord;
use crate::core::types::SourceId;

/// The forced measurement output catalog.
///
/// One row per reference record, in reference-catalog order. The row set is
/// fixed when the builder creates it; pipeline stages mutate rows in place
/// but never add or remove them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MeasurementCatalog {
    records: Vec<MeasurementRecord>,
}

impl MeasurementCatalog {
    #[must_use]
    pub fn from_records(records: Vec<MeasurementRecord>) -> Self {
        Self { records }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&MeasurementRecord> {
        self.records.get(index)
    }

    #[must_use]
    pub fn get_by_id(&self, id: SourceId) -> Option<&MeasurementRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MeasurementRecord> {
        self.records.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, MeasurementRecord> {
        self.records.iter_mut()
    }

    #[must_use]
    pub fn records(&self) -> &[MeasurementRecord] {
        &self.records
    }

    /// Drop every footprint, for sinks persisting positions and fields only.
    pub fn strip_footprints(&mut self) {
        for record in &mut self.records {
            record.footprint = crate::core::footprint::Footprint::empty();
        }
    }
}

impl<'a> IntoIterator for &'a MeasurementCatalog {
    type Item = &'a MeasurementRecord;
    type IntoIter = std::slice::Iter<'a, MeasurementRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
