//! The forced measurement pipeline.
//!
//! - [`project`]: footprint projection between WCS frames
//! - [`measure`]: the per-object measurement-engine contract
//! - [`apcorr`]: aperture-correction application
//! - [`calc`]: catalog-level derived quantities
//! - [`engine`]: the fixed three-stage runner binding them together

pub mod apcorr;
pub mod calc;
pub mod engine;
pub mod measure;
pub mod project;
