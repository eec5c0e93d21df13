//! The `catalog` inspection subcommand.

use std::path::PathBuf;

use clap::Args;
use serde::Serialize;

use crate::catalog::store::load_reference_catalog;
use crate::cli::OutputFormat;
use crate::core::footprint::Footprint;
use crate::core::types::RefId;

#[derive(Args)]
pub struct CatalogArgs {
    /// Reference catalog document (JSON, optionally gzipped)
    pub file: PathBuf,

    /// Print one record by reference id instead of the summary
    #[arg(long)]
    pub show: Option<u64>,
}

#[derive(Serialize)]
struct CatalogSummary {
    records: usize,
    with_footprint: usize,
    with_children: usize,
    total_footprint_area: u64,
    tangent_point: String,
}

/// Execute the `catalog` subcommand.
///
/// # Errors
///
/// Returns an error when the document cannot be loaded or the requested
/// record does not exist.
pub fn run(args: CatalogArgs, format: OutputFormat, _verbose: bool) -> anyhow::Result<()> {
    let (catalog, wcs) = load_reference_catalog(&args.file)?;

    if let Some(id) = args.show {
        let record = catalog
            .get_by_id(RefId(id))
            .ok_or_else(|| anyhow::anyhow!("no reference record with id {id}"))?;
        println!("{}", serde_json::to_string_pretty(record)?);
        return Ok(());
    }

    let with_footprint = catalog
        .iter()
        .filter(|r| r.footprint.as_ref().is_some_and(|f| !f.is_empty()))
        .count();
    let with_children = catalog
        .iter()
        .filter(|r| r.footprint.as_ref().is_some_and(Footprint::has_children))
        .count();
    let total_area: u64 = catalog
        .iter()
        .filter_map(|r| r.footprint.as_ref().map(Footprint::area))
        .sum();

    let summary = CatalogSummary {
        records: catalog.len(),
        with_footprint,
        with_children,
        total_footprint_area: total_area,
        tangent_point: wcs.tangent_point().to_string(),
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
        OutputFormat::Text => {
            println!("Records:          {}", summary.records);
            println!("With footprint:   {}", summary.with_footprint);
            println!("With deblends:    {}", summary.with_children);
            println!("Footprint pixels: {}", summary.total_footprint_area);
            println!("Tangent point:    {}", summary.tangent_point);
        }
    }
    Ok(())
}
