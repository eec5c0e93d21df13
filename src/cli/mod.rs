//! Command-line interface for forced-phot.
//!
//! This module implements the CLI using clap. Available commands:
//!
//! - **ccd**: forced photometry on one single-detector exposure
//! - **coadd**: forced photometry on one coadd patch
//! - **catalog**: inspect a reference catalog document
//!
//! ## Usage
//!
//! ```text
//! # Measure one CCD exposure against an all-sky reference catalog
//! forced-phot ccd --exposure-root repo/ --refcat refcat.json \
//!     --visit 2748 --detector 12 --output out/
//!
//! # Measure a coadd patch with aperture corrections and flag summary
//! forced-phot coadd --exposure-root repo/ --refcat-root refs/ \
//!     --tract 3 --patch 1,2 --band r --output out/ \
//!     --ap-corr --calculator flag-summary
//!
//! # Inspect a reference catalog
//! forced-phot catalog refcat.json.gz
//! ```

use clap::{Parser, Subcommand};

pub mod catalog;
pub mod measure;

#[derive(Parser)]
#[command(name = "forced-phot")]
#[command(version)]
#[command(about = "Forced photometry on survey images from a reference catalog")]
#[command(
    long_about = "forced-phot measures reference-catalog objects on a different image than the one they were detected on.\n\nReference positions and footprints are projected into the target image's frame, a row-aligned output catalog with survey-unique packed identifiers is built, and the measurement pipeline (measure, aperture correction, catalog calculation) runs over it."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Forced photometry on a single-detector exposure
    Ccd(measure::CcdArgs),

    /// Forced photometry on a coadd patch
    Coadd(measure::CoaddArgs),

    /// Inspect a reference catalog document
    Catalog(catalog::CatalogArgs),
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}
