//! The three-stage measurement pipeline.
//!
//! Stages run in a fixed order over the whole catalog:
//!
//! 1. **measure** - the injected engine, per record, failures isolated;
//! 2. **aperture correction** - gated by configuration and by the exposure
//!    actually carrying a map;
//! 3. **catalog calculation** - the configured calculators, none by default.
//!
//! The ordering is a documented precondition of the stage contracts
//! (aperture correction reads fields measure wrote; calculators read both)
//! and is owned entirely by this type - collaborators cannot reorder it.

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::catalog::measurement::MeasurementCatalog;
use crate::catalog::reference::ReferenceCatalog;
use crate::core::image::Exposure;
use crate::core::types::FLAG_MEASUREMENT_FAILED;
use crate::pipeline::apcorr::apply_ap_corr;
use crate::pipeline::calc::{make_calculator, CalculatorId, CatalogCalculator};
use crate::pipeline::measure::MeasurementEngine;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("catalog has {catalog} rows but the reference catalog has {references}")]
    RowMismatch { catalog: usize, references: usize },
}

/// Pipeline configuration. The defaults make stages 2 and 3 no-ops: no
/// aperture correction, no calculators.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct PipelineConfig {
    /// Apply aperture corrections when the exposure carries a map
    pub apply_ap_corr: bool,

    /// Ordered calculator stage, empty by default
    pub calculators: Vec<CalculatorId>,
}

/// A finished pipeline invocation: the mutated catalog plus enough
/// metadata for the caller to route it to storage.
#[derive(Debug)]
pub struct PipelineResult {
    pub catalog: MeasurementCatalog,

    /// Exposure identifier the catalog was computed for
    pub exposure_id: u64,
}

/// The ordered stage runner.
pub struct MeasurementPipeline {
    engine: Box<dyn MeasurementEngine>,
    config: PipelineConfig,
    calculators: Vec<Box<dyn CatalogCalculator>>,
}

impl MeasurementPipeline {
    /// Assemble a pipeline from an engine and a configuration. Calculator
    /// ids are resolved to instances here, once.
    #[must_use]
    pub fn new(engine: Box<dyn MeasurementEngine>, config: PipelineConfig) -> Self {
        let calculators = config.calculators.iter().map(|&id| make_calculator(id)).collect();
        Self {
            engine,
            config,
            calculators,
        }
    }

    /// Replace the calculator stage with explicit instances (dependency
    /// injection for engines the id enumeration does not know about).
    #[must_use]
    pub fn with_calculators(mut self, calculators: Vec<Box<dyn CatalogCalculator>>) -> Self {
        self.calculators = calculators;
        self
    }

    /// Run all stages over `catalog` in place and wrap the result.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::RowMismatch` when the catalog was not built
    /// from this reference catalog. Per-record engine failures are not
    /// errors; they flag the record and processing continues.
    pub fn run(
        &self,
        mut catalog: MeasurementCatalog,
        exposure: &Exposure,
        references: &ReferenceCatalog,
        exposure_id: u64,
    ) -> Result<PipelineResult, PipelineError> {
        if catalog.len() != references.len() {
            return Err(PipelineError::RowMismatch {
                catalog: catalog.len(),
                references: references.len(),
            });
        }

        info!(
            rows = catalog.len(),
            engine = self.engine.name(),
            exposure_id,
            "running forced measurement"
        );

        let mut failed = 0usize;
        for record in catalog.iter_mut() {
            if let Err(err) = self.engine.measure(record, exposure) {
                warn!(id = %record.id, %err, "measurement failed");
                record.set_flag(FLAG_MEASUREMENT_FAILED);
                failed += 1;
            }
        }
        if failed > 0 {
            info!(failed, "records degraded during measurement");
        }

        if self.config.apply_ap_corr {
            match &exposure.ap_corr_map {
                Some(map) => apply_ap_corr(&mut catalog, map),
                None => debug!("aperture correction enabled but exposure has no map; skipping"),
            }
        }

        for calculator in &self.calculators {
            debug!(calculator = calculator.name(), "running catalog calculation");
            calculator.calculate(&mut catalog);
        }

        Ok(PipelineResult {
            catalog,
            exposure_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::builder::MeasurementCatalogBuilder;
    use crate::core::footprint::{Footprint, Span};
    use crate::core::geom::{PixelBox, PixelPoint, SkyPoint};
    use crate::core::ident::{ExposureIdent, SourceIdFactory};
    use crate::core::image::{ApCorrField, ApCorrMap, PsfModel};
    use crate::core::record::{MeasurementRecord, ReferenceRecord};
    use crate::core::types::RefId;
    use crate::core::wcs::TanWcs;
    use crate::pipeline::measure::MeasureError;

    /// Writes a constant flux for records with a non-empty footprint and
    /// fails on the rest.
    struct ConstantFluxEngine(f64);

    impl MeasurementEngine for ConstantFluxEngine {
        fn name(&self) -> &'static str {
            "constant_flux"
        }

        fn measure(
            &self,
            record: &mut MeasurementRecord,
            _exposure: &Exposure,
        ) -> Result<(), MeasureError> {
            if record.footprint.is_empty() {
                return Err(MeasureError::EmptyFootprint);
            }
            record.set_field("flux", self.0);
            Ok(())
        }
    }

    fn fixtures() -> (Exposure, TanWcs, ReferenceCatalog) {
        let center = SkyPoint::new(56.0, 24.0);
        let scale = 0.2 / 3600.0;
        let wcs = TanWcs::north_up(PixelPoint::new(50.0, 50.0), center, scale).unwrap();
        let ref_wcs = TanWcs::north_up(PixelPoint::new(50.0, 50.0), center, scale).unwrap();
        let exposure = Exposure::blank(
            PixelBox::from_dimensions(0, 0, 100, 100),
            wcs,
            PsfModel::new(2.0),
        )
        .unwrap();

        let mut references = ReferenceCatalog::new();
        for (i, (x, y)) in [(20, 20), (40, 40), (60, 60)].iter().enumerate() {
            let coord = ref_wcs.pixel_to_sky(PixelPoint::new(f64::from(*x), f64::from(*y)));
            let mut record = ReferenceRecord::new(RefId(10 + i as u64), coord);
            if i != 1 {
                record = record.with_footprint(Footprint::from_spans(vec![Span::new(
                    *y,
                    x - 1,
                    x + 1,
                )]));
            }
            references.push(record);
        }
        (exposure, ref_wcs, references)
    }

    fn build_catalog(
        exposure: &Exposure,
        ref_wcs: &TanWcs,
        references: &ReferenceCatalog,
    ) -> MeasurementCatalog {
        let mut factory = SourceIdFactory::new(ExposureIdent::new(0xABC, 8)).unwrap();
        MeasurementCatalogBuilder::new()
            .build(references, exposure, ref_wcs, &mut factory)
            .unwrap()
    }

    #[test]
    fn test_per_record_failure_isolated() {
        let (exposure, ref_wcs, references) = fixtures();
        let catalog = build_catalog(&exposure, &ref_wcs, &references);
        let pipeline = MeasurementPipeline::new(
            Box::new(ConstantFluxEngine(1.0)),
            PipelineConfig::default(),
        );

        let result = pipeline.run(catalog, &exposure, &references, 0xABC).unwrap();
        let rows = result.catalog;
        assert_eq!(rows.len(), 3);
        assert_eq!(rows.get(0).unwrap().field("flux"), Some(1.0));
        assert_eq!(rows.get(1).unwrap().field("flux"), None);
        assert!(rows.get(1).unwrap().has_flag(FLAG_MEASUREMENT_FAILED));
        assert_eq!(rows.get(2).unwrap().field("flux"), Some(1.0));
    }

    #[test]
    fn test_ap_corr_gating() {
        let (mut exposure, ref_wcs, references) = fixtures();
        let mut map = ApCorrMap::new();
        map.insert("flux", ApCorrField::constant(2.0));
        exposure.ap_corr_map = Some(map);

        let engine = || Box::new(ConstantFluxEngine(1.0)) as Box<dyn MeasurementEngine>;

        // Gate off: fluxes untouched even though the exposure has a map
        let off = MeasurementPipeline::new(engine(), PipelineConfig::default())
            .run(
                build_catalog(&exposure, &ref_wcs, &references),
                &exposure,
                &references,
                1,
            )
            .unwrap();
        assert_eq!(off.catalog.get(0).unwrap().field("flux"), Some(1.0));

        // Gate on: fluxes scaled
        let config = PipelineConfig {
            apply_ap_corr: true,
            calculators: Vec::new(),
        };
        let on = MeasurementPipeline::new(engine(), config)
            .run(
                build_catalog(&exposure, &ref_wcs, &references),
                &exposure,
                &references,
                1,
            )
            .unwrap();
        assert_eq!(on.catalog.get(0).unwrap().field("flux"), Some(2.0));
    }

    #[test]
    fn test_ap_corr_enabled_without_map_is_noop() {
        let (exposure, ref_wcs, references) = fixtures();
        let config = PipelineConfig {
            apply_ap_corr: true,
            calculators: Vec::new(),
        };
        let pipeline = MeasurementPipeline::new(Box::new(ConstantFluxEngine(1.0)), config);
        let result = pipeline
            .run(
                build_catalog(&exposure, &ref_wcs, &references),
                &exposure,
                &references,
                1,
            )
            .unwrap();
        assert_eq!(result.catalog.get(0).unwrap().field("flux"), Some(1.0));
    }

    #[test]
    fn test_zero_calculators_leave_catalog_unchanged() {
        let (exposure, ref_wcs, references) = fixtures();
        let engine = || Box::new(ConstantFluxEngine(1.0)) as Box<dyn MeasurementEngine>;

        let baseline = MeasurementPipeline::new(engine(), PipelineConfig::default())
            .run(
                build_catalog(&exposure, &ref_wcs, &references),
                &exposure,
                &references,
                1,
            )
            .unwrap();
        let rerun = MeasurementPipeline::new(engine(), PipelineConfig::default())
            .run(
                build_catalog(&exposure, &ref_wcs, &references),
                &exposure,
                &references,
                1,
            )
            .unwrap();

        for (a, b) in baseline.catalog.iter().zip(rerun.catalog.iter()) {
            assert_eq!(a.fields, b.fields);
            assert_eq!(a.flags, b.flags);
        }
    }

    #[test]
    fn test_calculator_stage_runs_in_order() {
        let (exposure, ref_wcs, references) = fixtures();
        let config = PipelineConfig {
            apply_ap_corr: false,
            calculators: vec![CalculatorId::FlagSummary],
        };
        let pipeline = MeasurementPipeline::new(Box::new(ConstantFluxEngine(1.0)), config);
        let result = pipeline
            .run(
                build_catalog(&exposure, &ref_wcs, &references),
                &exposure,
                &references,
                1,
            )
            .unwrap();
        // The record that failed measurement picks up the summary flag
        assert!(result
            .catalog
            .get(1)
            .unwrap()
            .has_flag(crate::pipeline::calc::FLAG_ANY_FAILED));
    }

    #[test]
    fn test_row_mismatch_is_fatal() {
        let (exposure, ref_wcs, references) = fixtures();
        let catalog = build_catalog(&exposure, &ref_wcs, &references);
        let shorter = ReferenceCatalog::from_records(
            references.records()[..2].to_vec(),
        );
        let pipeline = MeasurementPipeline::new(
            Box::new(ConstantFluxEngine(1.0)),
            PipelineConfig::default(),
        );
        let result = pipeline.run(catalog, &exposure, &shorter, 1);
        assert!(matches!(result, Err(PipelineError::RowMismatch { .. })));
    }
}
