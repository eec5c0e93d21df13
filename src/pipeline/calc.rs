//! Catalog-level derived quantities.
//!
//! The last pipeline stage runs a configured, ordered list of calculators
//! over the finished catalog. Calculators read and write catalog fields
//! only; they never touch pixels. None are configured by default, and no
//! calculator may assume a particular flux field exists.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::catalog::measurement::MeasurementCatalog;
use crate::core::types::{FLAG_APCORR_FAILED, FLAG_MEASUREMENT_FAILED, FLAG_NO_FOOTPRINT};

/// Enumerated identifiers for the bundled calculators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum CalculatorId {
    /// Combine per-stage degradation flags into one `any_failed` flag
    FlagSummary,
    /// Flag records whose measured fields contain non-finite values
    NonFiniteFlux,
}

/// A derived-quantity computation over the whole catalog.
pub trait CatalogCalculator {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Compute derived fields in place.
    fn calculate(&self, catalog: &mut MeasurementCatalog);
}

/// Map an enumerated id onto a calculator instance.
#[must_use]
pub fn make_calculator(id: CalculatorId) -> Box<dyn CatalogCalculator> {
    match id {
        CalculatorId::FlagSummary => Box::new(FlagSummaryCalculator),
        CalculatorId::NonFiniteFlux => Box::new(NonFiniteFluxCalculator),
    }
}

/// Flag written by [`FlagSummaryCalculator`].
pub const FLAG_ANY_FAILED: &str = "any_failed";

/// Sets `any_failed` on records carrying any per-stage degradation flag.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlagSummaryCalculator;

impl CatalogCalculator for FlagSummaryCalculator {
    fn name(&self) -> &'static str {
        "flag_summary"
    }

    fn calculate(&self, catalog: &mut MeasurementCatalog) {
        for record in catalog.iter_mut() {
            let failed = [FLAG_NO_FOOTPRINT, FLAG_MEASUREMENT_FAILED, FLAG_APCORR_FAILED]
                .iter()
                .any(|flag| record.has_flag(flag));
            if failed {
                record.set_flag(FLAG_ANY_FAILED);
            }
        }
    }
}

/// Flag written by [`NonFiniteFluxCalculator`].
pub const FLAG_NON_FINITE: &str = "non_finite_field";

/// Flags records with NaN or infinite measurement fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct NonFiniteFluxCalculator;

impl CatalogCalculator for NonFiniteFluxCalculator {
    fn name(&self) -> &'static str {
        "non_finite_flux"
    }

    fn calculate(&self, catalog: &mut MeasurementCatalog) {
        for record in catalog.iter_mut() {
            if record.fields.values().any(|v| !v.is_finite()) {
                record.set_flag(FLAG_NON_FINITE);
            }
        }
    }
}
