//! Forced photometry on a coadded image.
//!
//! The coadd driver locates its target by (tract, patch, band). Reference
//! datasets for coadds are tiled the same way the coadds are, so reference
//! selection is a tile lookup rather than a geometric query, and the
//! exposure identifier is packed from the tiling coordinates plus the band
//! index.

use serde::{Deserialize, Serialize};

use crate::catalog::reference::ReferenceCatalog;
use crate::core::ident::{ExposureIdent, SourceIdFactory};
use crate::core::image::Exposure;
use crate::core::wcs::TanWcs;
use crate::driver::{
    DriverError, DriverHooks, ExposureProvider, OutputSink, ProviderError, ReferenceProvider,
};
use crate::pipeline::engine::PipelineResult;

/// Locator of one coadd patch in one band.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CoaddLocator {
    pub tract: u32,
    pub patch: (u32, u32),
    pub band: String,
}

impl std::fmt::Display for CoaddLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "tract={} patch={},{} band={}",
            self.tract, self.patch.0, self.patch.1, self.band
        )
    }
}

/// Identifier layout for the coadd driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoaddConfig {
    /// Bands of the survey, in identifier order
    pub bands: Vec<String>,

    /// Bits per patch axis in the exposure identifier
    pub patch_bits: u32,

    /// Bits for the band index in the exposure identifier
    pub band_bits: u32,

    /// Low bits of the source identifier reserved for sequence numbers
    pub source_bits: u32,
}

impl Default for CoaddConfig {
    fn default() -> Self {
        Self {
            bands: ["u", "g", "r", "i", "z", "y"]
                .iter()
                .map(ToString::to_string)
                .collect(),
            patch_bits: 5,
            band_bits: 3,
            source_bits: 16,
        }
    }
}

/// The coadd driver: dataset hooks over injected providers.
pub struct CoaddDriver {
    exposures: Box<dyn ExposureProvider<CoaddLocator>>,
    references: Box<dyn ReferenceProvider>,
    sink: Box<dyn OutputSink<CoaddLocator>>,
    config: CoaddConfig,
}

impl CoaddDriver {
    #[must_use]
    pub fn new(
        exposures: Box<dyn ExposureProvider<CoaddLocator>>,
        references: Box<dyn ReferenceProvider>,
        sink: Box<dyn OutputSink<CoaddLocator>>,
        config: CoaddConfig,
    ) -> Self {
        Self {
            exposures,
            references,
            sink,
            config,
        }
    }

    /// Pack tract, patch and band into the exposure identifier:
    /// `tract | patch.x | patch.y | band`, high to low.
    fn packed_exposure_id(&self, locator: &CoaddLocator) -> Result<u64, DriverError> {
        let CoaddConfig {
            patch_bits,
            band_bits,
            ..
        } = self.config;

        let band_index = self
            .config
            .bands
            .iter()
            .position(|b| *b == locator.band)
            .ok_or_else(|| {
                DriverError::InvalidLocator(format!("unknown band `{}`", locator.band))
            })? as u64;

        for (value, bits, what) in [
            (u64::from(locator.patch.0), patch_bits, "patch x"),
            (u64::from(locator.patch.1), patch_bits, "patch y"),
            (band_index, band_bits, "band index"),
        ] {
            if bits >= 64 || value >> bits != 0 {
                return Err(DriverError::InvalidLocator(format!(
                    "{what} {value} does not fit in {bits} bits"
                )));
            }
        }

        let tract_shift = 2 * patch_bits + band_bits;
        if tract_shift >= 64 || u64::from(locator.tract) >> (64 - tract_shift) != 0 {
            return Err(DriverError::InvalidLocator(format!(
                "tract {} does not fit in {} bits",
                locator.tract,
                64 - tract_shift
            )));
        }

        Ok((u64::from(locator.tract) << tract_shift)
            | (u64::from(locator.patch.0) << (patch_bits + band_bits))
            | (u64::from(locator.patch.1) << band_bits)
            | band_index)
    }
}

impl DriverHooks for CoaddDriver {
    type Locator = CoaddLocator;

    fn get_exposure(&self, locator: &CoaddLocator) -> Result<Exposure, DriverError> {
        self.exposures
            .fetch_exposure(locator)
            .map_err(|e| DriverError::hook("get_exposure", e))
    }

    fn fetch_references(
        &self,
        locator: &CoaddLocator,
        _exposure: &Exposure,
    ) -> Result<(ReferenceCatalog, TanWcs), DriverError> {
        self.references
            .fetch_tile(locator.tract, locator.patch)
            .map_err(|e| DriverError::hook("fetch_references", e))
    }

    fn make_id_factory(&self, locator: &CoaddLocator) -> Result<SourceIdFactory, DriverError> {
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

    fn exposure_id(&self, locator: &CoaddLocator) -> Result<u64, DriverError> {
        self.packed_exposure_id(locator)
    }

    fn write_output(
        &self,
        locator: &CoaddLocator,
        result: &PipelineResult,
    ) -> Result<(), DriverError> {
        self.sink
            .write(locator, result)
            .map_err(|e| DriverError::hook("write_output", e))
    }
}
