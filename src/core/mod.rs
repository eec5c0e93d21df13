//! Core data model for forced photometry.
//!
//! This module provides the leaf types everything else is built from:
//!
//! - [`geom`]: sky points, pixel points, pixel bounding boxes
//! - [`wcs`]: the gnomonic (TAN) world coordinate system
//! - [`footprint`]: object pixel footprints, with optional deblend children
//! - [`record`]: reference and measurement catalog rows
//! - [`image`]: the target exposure with PSF and aperture-correction models
//! - [`ident`]: collision-free packed source identifiers
//!
//! ## Identifier layout
//!
//! A packed source identifier places the survey-unique exposure identifier
//! in the high bits and the per-source sequence number in the low bits:
//!
//! | Bits            | Content             |
//! |-----------------|---------------------|
//! | 63 .. source_bits | exposure identifier |
//! | source_bits .. 0  | sequence number     |
//!
//! Sequence numbers are assigned by catalog position, so a rebuilt catalog
//! with the same input order reproduces the same identifiers.

pub mod footprint;
pub mod geom;
pub mod ident;
pub mod image;
pub mod record;
pub mod types;
pub mod wcs;
