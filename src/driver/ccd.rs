//! Forced photometry on a single-detector exposure.
//!
//! The CCD driver locates its target by (visit, detector), selects
//! references by a sky cone around the exposure's bounding box, and packs
//! the exposure identifier from visit and detector numbers.

use serde::{Deserialize, Serialize};

use crate::catalog::reference::ReferenceCatalog;
use crate::core::geom::SkyPoint;
use crate::core::ident::{ExposureIdent, SourceIdFactory};
use crate::core::image::Exposure;
use crate::core::wcs::TanWcs;
use crate::driver::{
    DriverError, DriverHooks, ExposureProvider, OutputSink, ProviderError, ReferenceProvider,
};
use crate::pipeline::engine::PipelineResult;

/// Locator of one single-detector exposure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CcdLocator {
    pub visit: u64,
    pub detector: u32,
}

impl std::fmt::Display for CcdLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "visit={} detector={}", self.visit, self.detector)
    }
}

/// Identifier layout and reference selection for the CCD driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CcdConfig {
    /// Bits of the exposure identifier holding the detector number
    pub detector_bits: u32,

    /// Low bits of the source identifier reserved for sequence numbers
    pub source_bits: u32,

    /// Extra reference-selection margin beyond the exposure bounds, degrees
    pub ref_margin_deg: f64,
}

impl Default for CcdConfig {
    fn default() -> Self {
        Self {
            detector_bits: 8,
            source_bits: 16,
            ref_margin_deg: 0.01,
        }
    }
}

/// The single-exposure driver: dataset hooks over injected providers.
pub struct CcdDriver {
    exposures: Box<dyn ExposureProvider<CcdLocator>>,
    references: Box<dyn ReferenceProvider>,
    sink: Box<dyn OutputSink<CcdLocator>>,
    config: CcdConfig,
}

impl CcdDriver {
    #[must_use]
    pub fn new(
        exposures: Box<dyn ExposureProvider<CcdLocator>>,
        references: Box<dyn ReferenceProvider>,
        sink: Box<dyn OutputSink<CcdLocator>>,
        config: CcdConfig,
    ) -> Self {
        Self {
            exposures,
            references,
            sink,
            config,
        }
    }

    /// Pack visit and detector into the survey-unique exposure identifier:
    /// visit in the high bits, detector in the low `detector_bits`.
    fn packed_exposure_id(&self, locator: &CcdLocator) -> Result<u64, DriverError> {
        let bits = self.config.detector_bits;
        if bits >= 64 {
            return Err(DriverError::InvalidLocator(format!(
                "detector_bits {bits} leaves no room for a visit number"
            )));
        }
        if u64::from(locator.detector) >> bits != 0 {
            return Err(DriverError::InvalidLocator(format!(
                "detector {} does not fit in {bits} bits",
                locator.detector
            )));
        }
        if locator.visit >> (64 - bits) != 0 {
            return Err(DriverError::InvalidLocator(format!(
                "visit {} does not fit in {} bits",
                locator.visit,
                64 - bits
            )));
        }
        Ok((locator.visit << bits) | u64::from(locator.detector))
    }

    /// Selection cone covering the exposure plus the configured margin.
    fn selection_cone(&self, exposure: &Exposure) -> (SkyPoint, f64) {
        let corners = exposure.sky_corners();
        let mut sum = [0.0f64; 3];
        for corner in &corners {
            let v = corner.to_unit();
            sum[0] += v[0];
            sum[1] += v[1];
            sum[2] += v[2];
        }
        let center = SkyPoint::from_unit(sum);
        let radius = corners
            .iter()
            .map(|c| center.separation_deg(c))
            .fold(0.0f64, f64::max);
        (center, radius + self.config.ref_margin_deg)
    }
}

impl DriverHooks for CcdDriver {
    type Locator = CcdLocator;

    fn get_exposure(&self, locator: &CcdLocator) -> Result<Exposure, DriverError> {
        self.exposures
            .fetch_exposure(locator)
            .map_err(|e| DriverError::hook("get_exposure", e))
    }

    fn fetch_references(
        &self,
        _locator: &CcdLocator,
        exposure: &Exposure,
    ) -> Result<(ReferenceCatalog, TanWcs), DriverError> {
        let (center, radius) = self.selection_cone(exposure);
        self.references
            .fetch_in_cone(center, radius)
            .map_err(|e| DriverError::hook("fetch_references", e))
    }

    fn make_id_factory(&self, locator: &CcdLocator) -> Result<SourceIdFactory, DriverError> {
        let exposure_id = self.packed_exposure_id(locator)?;
        SourceIdFactory::new(ExposureIdent::new(exposure_id, self.config.source_bits)).map_err(
            |e| {
                DriverError::hook(
                    "make_id_factory",
                    ProviderError::Other(e.to_string()),
                )
            },
        )
    }

    fn exposure_id(&self, locator: &CcdLocator) -> Result<u64, DriverError> {
        self.packed_exposure_id(locator)
    }

    fn write_output(
        &self,
        locator: &CcdLocator,
        result: &PipelineResult,
    ) -> Result<(), DriverError> {
        self.sink
            .write(locator, result)
            .map_err(|e| DriverError::hook("write_output", e))
    }
}
