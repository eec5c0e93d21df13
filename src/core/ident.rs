//! Source identifier packing.
//!
//! Every forced source gets a 64-bit identifier built from two pieces: an
//! externally supplied exposure identifier (itself packed from survey
//! metadata such as visit/detector or tract/patch) and a per-source sequence
//! number. The exposure identifier occupies the high bits, the sequence
//! number the low `source_bits` bits, so any two sources from different
//! exposures, or different sequence numbers on the same exposure, can never
//! collide as long as the exposure identifier is survey-unique.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::types::SourceId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdError {
    #[error("source bit width {0} leaves no room for an exposure identifier")]
    BitWidthTooLarge(u32),

    #[error("exposure identifier {id:#x} does not fit in {available} bits")]
    ExposureIdOverflow { id: u64, available: u32 },

    #[error("sequence number {seq} exceeds the {bits}-bit per-exposure budget")]
    SequenceOverflow { seq: u64, bits: u32 },
}

/// An externally supplied exposure identifier plus the number of low bits
/// of the packed source identifier reserved for per-source numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExposureIdent {
    /// Survey-unique exposure identifier
    pub id: u64,

    /// Low bits of the 64-bit source id reserved for sequence numbers
    pub source_bits: u32,
}

impl ExposureIdent {
    #[must_use]
    pub fn new(id: u64, source_bits: u32) -> Self {
        Self { id, source_bits }
    }

    /// Validate that this identifier fits its bit budget.
    ///
    /// # Errors
    ///
    /// Returns `IdError` when `source_bits >= 64` or the exposure identifier
    /// does not fit in the remaining high bits. Both are configuration
    /// errors that abort a catalog build.
    pub fn validate(&self) -> Result<(), IdError> {
        if self.source_bits >= 64 {
            return Err(IdError::BitWidthTooLarge(self.source_bits));
        }
        let available = 64 - self.source_bits;
        if available < 64 && self.id >> available != 0 {
            return Err(IdError::ExposureIdOverflow {
                id: self.id,
                available,
            });
        }
        Ok(())
    }
}

/// Pack an exposure identifier and a per-source sequence number into one
/// collision-free 64-bit source identifier.
///
/// Pure: the same inputs always produce the same output.
///
/// # Errors
///
/// Returns `IdError` when either piece exceeds its bit budget.
pub fn pack_source_id(exposure: ExposureIdent, seq: u64) -> Result<SourceId, IdError> {
    exposure.validate()?;
    if seq >> exposure.source_bits != 0 {
        return Err(IdError::SequenceOverflow {
            seq,
            bits: exposure.source_bits,
        });
    }
    Ok(SourceId((exposure.id << exposure.source_bits) | seq))
}

/// Factory yielding packed identifiers in sequence order for one exposure.
///
/// Sequence numbers are assigned by catalog position, so identifiers are
/// reproducible for a given input order.
#[derive(Debug, Clone)]
pub struct SourceIdFactory {
    exposure: ExposureIdent,
    next_seq: u64,
}

impl SourceIdFactory {
    /// # Errors
    ///
    /// Returns `IdError` when the exposure identifier violates its bit budget.
    pub fn new(exposure: ExposureIdent) -> Result<Self, IdError> {
        exposure.validate()?;
        Ok(Self {
            exposure,
            next_seq: 0,
        })
    }

    /// The next packed identifier.
    ///
    /// # Errors
    ///
    /// Returns `IdError::SequenceOverflow` once the per-exposure sequence
    /// budget is exhausted; the whole build aborts.
    pub fn next_id(&mut self) -> Result<SourceId, IdError> {
        let id = pack_source_id(self.exposure, self.next_seq)?;
        self.next_seq += 1;
        Ok(id)
    }

    /// Number of identifiers handed out so far.
    #[must_use]
    pub fn issued(&self) -> u64 {
        self.next_seq
    }
}
