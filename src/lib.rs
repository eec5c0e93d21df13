//! # forced-phot
//!
//! A library for forced photometry: measuring, for every object of an
//! existing reference catalog, a fixed set of properties on a *different*
//! image - a single exposure or a coadd - using the reference only to fix
//! positions and shapes, never re-detecting.
//!
//! When a survey measures the same patch of sky many times, per-exposure
//! detections disagree about what exists where. Forcing measurement at the
//! positions of one authoritative catalog gives light curves and colors
//! with consistent object identity across epochs and bands.
//!
//! ## Features
//!
//! - **Collision-free identifiers**: packed 64-bit source ids from a
//!   survey-unique exposure identifier plus a per-row sequence number
//! - **Footprint projection**: reference footprints mapped into the target
//!   image's pixel frame through the shared sky coordinates
//! - **Row-aligned catalogs**: one output row per reference row, in order
//! - **Staged pipeline**: measurement, gated aperture correction, and
//!   catalog calculation, with per-record failure isolation
//! - **Variant-agnostic driver**: the same orchestration serves the CCD
//!   and coadd drivers through injected dataset hooks
//!
//! ## Example
//!
//! ```rust,no_run
//! use forced_phot::catalog::builder::MeasurementCatalogBuilder;
//! use forced_phot::catalog::store::load_reference_catalog;
//! use forced_phot::core::ident::{ExposureIdent, SourceIdFactory};
//! use forced_phot::pipeline::engine::{MeasurementPipeline, PipelineConfig};
//! use forced_phot::pipeline::measure::ApertureFluxEngine;
//! use std::path::Path;
//!
//! let (references, ref_wcs) =
//!     load_reference_catalog(Path::new("refcat.json")).unwrap();
//! let exposure = forced_phot::catalog::store::load_exposure(
//!     Path::new("visit-002748-det-012.exp"),
//! )
//! .unwrap();
//!
//! let mut ids = SourceIdFactory::new(ExposureIdent::new(0x2748_0c, 16)).unwrap();
//! let catalog = MeasurementCatalogBuilder::new()
//!     .build(&references, &exposure, &ref_wcs, &mut ids)
//!     .unwrap();
//!
//! let pipeline = MeasurementPipeline::new(
//!     Box::new(ApertureFluxEngine),
//!     PipelineConfig::default(),
//! );
//! let result = pipeline.run(catalog, &exposure, &references, 0x2748_0c).unwrap();
//! println!("{} forced sources", result.catalog.len());
//! ```
//!
//! ## Modules
//!
//! - [`core`]: geometry, WCS, footprints, records, images, identifiers
//! - [`catalog`]: reference/measurement catalogs, builder, persistence
//! - [`pipeline`]: projection, measurement stages, the stage runner
//! - [`driver`]: orchestration skeleton and the CCD/coadd drivers
//! - [`cli`]: command-line interface implementation

pub mod catalog;
pub mod cli;
pub mod core;
pub mod driver;
pub mod pipeline;

// Re-export commonly used types for convenience
pub use catalog::builder::MeasurementCatalogBuilder;
pub use catalog::measurement::MeasurementCatalog;
pub use catalog::reference::ReferenceCatalog;
pub use crate::core::ident::{pack_source_id, ExposureIdent, SourceIdFactory};
pub use crate::core::image::Exposure;
pub use crate::core::record::{MeasurementRecord, ReferenceRecord};
pub use crate::core::types::{RefId, SourceId};
pub use crate::core::wcs::TanWcs;
pub use driver::{DriverHooks, ForcedPhotDriver};
pub use pipeline::engine::{MeasurementPipeline, PipelineConfig, PipelineResult};
