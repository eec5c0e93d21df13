//! The `ccd` and `coadd` measurement subcommands.

use std::path::PathBuf;

use clap::Args;
use serde::Serialize;

use crate::cli::OutputFormat;
use crate::driver::ccd::{CcdConfig, CcdDriver, CcdLocator};
use crate::driver::coadd::{CoaddConfig, CoaddDriver, CoaddLocator};
use crate::driver::repo::{FileExposureStore, FileReferenceSource, JsonOutputSink};
use crate::driver::ForcedPhotDriver;
use crate::pipeline::calc::CalculatorId;
use crate::pipeline::engine::{MeasurementPipeline, PipelineConfig, PipelineResult};
use crate::pipeline::measure::ApertureFluxEngine;

/// Options shared by both measurement commands.
#[derive(Args)]
pub struct CommonArgs {
    /// Directory holding exposure fixture files
    #[arg(long)]
    pub exposure_root: PathBuf,

    /// Output directory for forced-source documents
    #[arg(short, long)]
    pub output: PathBuf,

    /// PSF realization cache-size hint
    #[arg(long)]
    pub psf_cache: Option<usize>,

    /// Apply aperture corrections when the exposure carries a map
    #[arg(long)]
    pub ap_corr: bool,

    /// Catalog calculators to run, in order
    #[arg(long = "calculator", value_enum)]
    pub calculators: Vec<CalculatorId>,

    /// Reference-frame fields to forward into the output (as ref_<name>)
    #[arg(long = "copy-field")]
    pub copy_fields: Vec<String>,

    /// Drop footprints from the persisted output
    #[arg(long)]
    pub strip_footprints: bool,

    /// Low identifier bits reserved for per-source numbering
    #[arg(long, default_value = "16")]
    pub source_bits: u32,
}

#[derive(Args)]
pub struct CcdArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// All-sky reference catalog document (JSON, optionally gzipped)
    #[arg(long)]
    pub refcat: PathBuf,

    /// Visit number
    #[arg(long)]
    pub visit: u64,

    /// Detector number within the visit
    #[arg(long)]
    pub detector: u32,

    /// Exposure-identifier bits holding the detector number
    #[arg(long, default_value = "8")]
    pub detector_bits: u32,
}

#[derive(Args)]
pub struct CoaddArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Directory of per-tile reference catalog documents
    #[arg(long)]
    pub refcat_root: PathBuf,

    /// Tract number
    #[arg(long)]
    pub tract: u32,

    /// Patch within the tract, as x,y
    #[arg(long, value_parser = parse_patch)]
    pub patch: (u32, u32),

    /// Band name
    #[arg(long)]
    pub band: String,
}

fn parse_patch(s: &str) -> Result<(u32, u32), String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected x,y, got `{s}`"))?;
    Ok((
        x.trim().parse().map_err(|e| format!("patch x: {e}"))?,
        y.trim().parse().map_err(|e| format!("patch y: {e}"))?,
    ))
}

#[derive(Serialize)]
struct MeasureSummary {
    target: String,
    exposure_id: u64,
    rows: usize,
    flagged: usize,
    output: String,
}

fn pipeline(common: &CommonArgs) -> MeasurementPipeline {
    MeasurementPipeline::new(
        Box::new(ApertureFluxEngine),
        PipelineConfig {
            apply_ap_corr: common.ap_corr,
            calculators: common.calculators.clone(),
        },
    )
}

fn report(
    locator_display: String,
    output: PathBuf,
    result: &PipelineResult,
    format: OutputFormat,
    verbose: bool,
) -> anyhow::Result<()> {
    let flagged = result
        .catalog
        .iter()
        .filter(|r| !r.flags.is_empty())
        .count();

    let summary = MeasureSummary {
        target: locator_display,
        exposure_id: result.exposure_id,
        rows: result.catalog.len(),
        flagged,
        output: output.display().to_string(),
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
        OutputFormat::Text => {
            println!(
                "{}: {} forced sources ({} flagged) -> {}",
                summary.target, summary.rows, summary.flagged, summary.output
            );
            if verbose {
                for record in &result.catalog {
                    println!(
                        "  {} ref={} flags=[{}]",
                        record.id,
                        record.ref_id,
                        record
                            .flags
                            .iter()
                            .cloned()
                            .collect::<Vec<_>>()
                            .join(",")
                    );
                }
            }
        }
    }
    Ok(())
}

/// Execute the `ccd` subcommand.
///
/// # Errors
///
/// Returns an error when inputs cannot be loaded or the invocation aborts.
pub fn run_ccd(args: CcdArgs, format: OutputFormat, verbose: bool) -> anyhow::Result<()> {
    let references = FileReferenceSource::from_file(&args.refcat)?;
    let sink = JsonOutputSink::new(&args.common.output, args.common.strip_footprints);
    let locator = CcdLocator {
        visit: args.visit,
        detector: args.detector,
    };
    let output_path = sink.output_path(&locator);

    let hooks = CcdDriver::new(
        Box::new(FileExposureStore::new(&args.common.exposure_root)),
        Box::new(references),
        Box::new(sink),
        CcdConfig {
            detector_bits: args.detector_bits,
            source_bits: args.common.source_bits,
            ..CcdConfig::default()
        },
    );

    let driver = ForcedPhotDriver::new(hooks, pipeline(&args.common))
        .copy_fields(args.common.copy_fields.clone());
    let result = driver.run(&locator, args.common.psf_cache)?;

    report(locator.to_string(), output_path, &result, format, verbose)
}

/// Execute the `coadd` subcommand.
///
/// # Errors
///
/// Returns an error when inputs cannot be loaded or the invocation aborts.
pub fn run_coadd(args: CoaddArgs, format: OutputFormat, verbose: bool) -> anyhow::Result<()> {
    let sink = JsonOutputSink::new(&args.common.output, args.common.strip_footprints);
    let locator = CoaddLocator {
        tract: args.tract,
        patch: args.patch,
        band: args.band.clone(),
    };
    let output_path = sink.output_path(&locator);

    let hooks = CoaddDriver::new(
        Box::new(FileExposureStore::new(&args.common.exposure_root)),
        Box::new(FileReferenceSource::tiled(&args.refcat_root)),
        Box::new(sink),
        CoaddConfig {
            source_bits: args.common.source_bits,
            ..CoaddConfig::default()
        },
    );

    let driver = ForcedPhotDriver::new(hooks, pipeline(&args.common))
        .copy_fields(args.common.copy_fields.clone());
    let result = driver.run(&locator, args.common.psf_cache)?;

    report(locator.to_string(), output_path, &result, format, verbose)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_patch() {
        assert_eq!(parse_patch("1,2").unwrap(), (1, 2));
        assert_eq!(parse_patch(" 3 , 4 ").unwrap(), (3, 4));
        assert!(parse_patch("5").is_err());
        assert!(parse_patch("a,b").is_err());
    }
}
