use serde::{Deserialize, Serialize};

/// Stable identifier of an object in a reference catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RefId(pub u64);

impl std::fmt::Display for RefId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Packed 64-bit identifier of a forced source, unique across the survey
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceId(pub u64);

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Flag set when a reference record had no usable footprint and the
/// measurement record degraded to an empty one.
pub const FLAG_NO_FOOTPRINT: &str = "no_footprint";

/// Flag set when the measurement engine failed on a record.
pub const FLAG_MEASUREMENT_FAILED: &str = "measurement_failed";

/// Flag set when an aperture-correction factor was invalid for a record.
pub const FLAG_APCORR_FAILED: &str = "apcorr_failed";
