//! Driver orchestration.
//!
//! `ForcedPhotDriver` owns the fixed control flow of one forced photometry
//! invocation; everything dataset-shaped is behind the [`DriverHooks`]
//! trait. A concrete driver supplies the four dataset hooks (get the
//! exposure, fetch references, make an identifier factory, name the
//! exposure); the hooks it does not supply fail with a typed
//! `HookNotImplemented` error naming the missing hook. The footprint
//! projector and the output write have working defaults a driver may
//! override.
//!
//! The two shipped drivers, [`ccd::CcdDriver`] and [`coadd::CoaddDriver`],
//! differ only in how they locate inputs and pack exposure identifiers; the
//! orchestration and the pipeline are reused unchanged.

pub mod ccd;
pub mod coadd;
pub mod repo;

use thiserror::Error;
use tracing::info;

use crate::catalog::builder::{BuildError, MeasurementCatalogBuilder};
use crate::catalog::reference::ReferenceCatalog;
use crate::catalog::store::StoreError;
use crate::core::ident::SourceIdFactory;
use crate::core::image::Exposure;
use crate::core::wcs::TanWcs;
use crate::pipeline::engine::{MeasurementPipeline, PipelineError, PipelineResult};
use crate::pipeline::project::{FlattenProjector, FootprintProjector};

/// Failures from dataset collaborators.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("dataset not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{0}")]
    Other(String),
}

/// A fatal invocation failure, tagged with the stage or hook that failed.
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("hook `{hook}` is not implemented by this driver")]
    HookNotImplemented { hook: &'static str },

    #[error("locator is invalid: {0}")]
    InvalidLocator(String),

    #[error("hook `{hook}` failed: {source}")]
    Hook {
        hook: &'static str,
        #[source]
        source: ProviderError,
    },

    #[error("catalog build failed: {0}")]
    Build(#[from] BuildError),

    #[error("pipeline failed: {0}")]
    Pipeline(#[from] PipelineError),
}

impl DriverError {
    pub(crate) fn hook(hook: &'static str, source: ProviderError) -> Self {
        Self::Hook { hook, source }
    }
}

/// Collaborator that materializes the target image for a locator.
pub trait ExposureProvider<L> {
    /// # Errors
    ///
    /// Returns `ProviderError` when the exposure cannot be materialized.
    fn fetch_exposure(&self, locator: &L) -> Result<Exposure, ProviderError>;
}

/// Collaborator that loads reference records for a target.
///
/// The two access patterns mirror the two target kinds: an arbitrary sky
/// region for single exposures, a tile of the survey tiling for coadds.
pub trait ReferenceProvider {
    /// References within `radius_deg` of `center`, with their WCS.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError` when the catalog cannot be loaded.
    fn fetch_in_cone(
        &self,
        center: crate::core::geom::SkyPoint,
        radius_deg: f64,
    ) -> Result<(ReferenceCatalog, TanWcs), ProviderError>;

    /// References of one survey tile, with their WCS.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError` when the tile is unknown or cannot be loaded.
    fn fetch_tile(
        &self,
        tract: u32,
        patch: (u32, u32),
    ) -> Result<(ReferenceCatalog, TanWcs), ProviderError>;
}

/// Collaborator that persists finished catalogs.
pub trait OutputSink<L> {
    /// # Errors
    ///
    /// Returns `ProviderError` when persistence fails.
    fn write(&self, locator: &L, result: &PipelineResult) -> Result<(), ProviderError>;
}

/// The hook set a concrete driver supplies.
///
/// The four dataset hooks default to `HookNotImplemented`; a driver that
/// forgets one gets a typed error naming it, not a panic. The projector and
/// output hooks have working defaults.
pub trait DriverHooks {
    /// Dataset locator, e.g. visit/detector or tract/patch/band.
    type Locator: std::fmt::Display;

    /// Materialize the target image.
    ///
    /// # Errors
    ///
    /// Defaults to `DriverError::HookNotImplemented`.
    fn get_exposure(&self, locator: &Self::Locator) -> Result<Exposure, DriverError> {
        let _ = locator;
        Err(DriverError::HookNotImplemented {
            hook: "get_exposure",
        })
    }

    /// Fetch the reference catalog (and its WCS) covering this target.
    ///
    /// # Errors
    ///
    /// Defaults to `DriverError::HookNotImplemented`.
    fn fetch_references(
        &self,
        locator: &Self::Locator,
        exposure: &Exposure,
    ) -> Result<(ReferenceCatalog, TanWcs), DriverError> {
        let _ = (locator, exposure);
        Err(DriverError::HookNotImplemented {
            hook: "fetch_references",
        })
    }

    /// Make the identifier factory for this target's forced sources.
    ///
    /// # Errors
    ///
    /// Defaults to `DriverError::HookNotImplemented`.
    fn make_id_factory(&self, locator: &Self::Locator) -> Result<SourceIdFactory, DriverError> {
        let _ = locator;
        Err(DriverError::HookNotImplemented {
            hook: "make_id_factory",
        })
    }

    /// The survey-unique exposure identifier for this target.
    ///
    /// # Errors
    ///
    /// Defaults to `DriverError::HookNotImplemented`.
    fn exposure_id(&self, locator: &Self::Locator) -> Result<u64, DriverError> {
        let _ = locator;
        Err(DriverError::HookNotImplemented {
            hook: "exposure_id",
        })
    }

    /// Footprint projector used at catalog build time. The default discards
    /// deblend structure; override to preserve it.
    fn footprint_projector(&self) -> Box<dyn FootprintProjector> {
        Box::new(FlattenProjector)
    }

    /// Persist the finished catalog. The default does nothing; callers that
    /// only consume the returned result may leave it.
    ///
    /// # Errors
    ///
    /// Implementations surface persistence failures.
    fn write_output(
        &self,
        locator: &Self::Locator,
        result: &PipelineResult,
    ) -> Result<(), DriverError> {
        let _ = (locator, result);
        Ok(())
    }
}

/// The orchestration skeleton: one invocation, start to finish.
pub struct ForcedPhotDriver<H: DriverHooks> {
    hooks: H,
    pipeline: MeasurementPipeline,

    /// Reference-frame fields forwarded into the output catalog
    copy_fields: Vec<String>,
}

impl<H: DriverHooks> ForcedPhotDriver<H> {
    #[must_use]
    pub fn new(hooks: H, pipeline: MeasurementPipeline) -> Self {
        Self {
            hooks,
            pipeline,
            copy_fields: Vec::new(),
        }
    }

    #[must_use]
    pub fn copy_fields(mut self, fields: Vec<String>) -> Self {
        self.copy_fields = fields;
        self
    }

    #[must_use]
    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    /// Perform forced measurement on one target.
    ///
    /// Sequence: get exposure, apply the optional PSF cache hint, fetch
    /// references, make the identifier factory, build the measurement
    /// catalog, run the pipeline, write the output. The result is also
    /// returned so in-process callers need no sink.
    ///
    /// # Errors
    ///
    /// Any hook, build, or pipeline failure aborts the invocation with a
    /// `DriverError` naming the failing stage. Per-record degradations do
    /// not surface here.
    pub fn run(
        &self,
        locator: &H::Locator,
        psf_cache: Option<usize>,
    ) -> Result<PipelineResult, DriverError> {
        let mut exposure = self.hooks.get_exposure(locator)?;
        if let Some(size) = psf_cache {
            exposure.psf.set_cache_size(size);
        }

        let (references, ref_wcs) = self.hooks.fetch_references(locator, &exposure)?;
        let mut id_factory = self.hooks.make_id_factory(locator)?;

        let catalog = MeasurementCatalogBuilder::new()
            .copy_fields(self.copy_fields.clone())
            .with_projector(self.hooks.footprint_projector())
            .build(&references, &exposure, &ref_wcs, &mut id_factory)?;

        let exposure_id = self.hooks.exposure_id(locator)?;
        info!(%locator, rows = catalog.len(), "performing forced measurement");

        let result = self
            .pipeline
            .run(catalog, &exposure, &references, exposure_id)?;

        self.hooks.write_output(locator, &result)?;
        Ok(result)
    }
}
