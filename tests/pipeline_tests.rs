//! End-to-end pipeline tests through the public driver API.

use forced_phot::catalog::reference::ReferenceCatalog;
use forced_phot::core::footprint::{Footprint, Span};
use forced_phot::core::geom::{PixelBox, PixelPoint, SkyPoint};
use forced_phot::core::ident::{ExposureIdent, SourceIdFactory};
use forced_phot::core::image::{Exposure, PsfModel};
use forced_phot::core::record::{MeasurementRecord, ReferenceRecord};
use forced_phot::core::types::{RefId, FLAG_MEASUREMENT_FAILED};
use forced_phot::core::wcs::TanWcs;
use forced_phot::driver::{DriverError, DriverHooks, ForcedPhotDriver};
use forced_phot::pipeline::engine::{MeasurementPipeline, PipelineConfig};
use forced_phot::pipeline::measure::{MeasureError, MeasurementEngine};

const SOURCE_BITS: u32 = 8;
const EXPOSURE_ID: u64 = 0xABC;

/// Writes flux = 1.0 for every record with a non-empty footprint and fails
/// on the rest.
struct ConstantFluxEngine;

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
        record.set_field("flux", 1.0);
        Ok(())
    }
}

fn field_center() -> SkyPoint {
    SkyPoint::new(150.0, 2.2)
}

fn make_wcs(crpix: PixelPoint) -> TanWcs {
    TanWcs::north_up(crpix, field_center(), 0.2 / 3600.0).unwrap()
}

fn make_exposure() -> Exposure {
    Exposure::blank(
        PixelBox::from_dimensions(0, 0, 100, 100),
        make_wcs(PixelPoint::new(50.0, 50.0)),
        PsfModel::new(2.0),
    )
    .unwrap()
}

/// Three records with ids 10, 11, 12; record 11 has no footprint.
fn make_references(ref_wcs: &TanWcs) -> ReferenceCatalog {
    let mut references = ReferenceCatalog::new();
    for (i, (x, y)) in [(20, 20), (40, 40), (70, 70)].iter().enumerate() {
        let coord = ref_wcs.pixel_to_sky(PixelPoint::new(f64::from(*x), f64::from(*y)));
        let mut record = ReferenceRecord::new(RefId(10 + i as u64), coord);
        if i != 1 {
            record =
                record.with_footprint(Footprint::from_spans(vec![Span::new(*y, x - 1, x + 1)]));
        }
        references.push(record);
    }
    references
}

/// Test driver: in-memory datasets behind the hook trait.
struct FixtureHooks {
    exposure: Exposure,
    references: ReferenceCatalog,
    ref_wcs: TanWcs,
}

impl FixtureHooks {
    fn new() -> Self {
        let ref_wcs = make_wcs(PixelPoint::new(50.0, 50.0));
        Self {
            exposure: make_exposure(),
            references: make_references(&ref_wcs),
            ref_wcs,
        }
    }
}

impl DriverHooks for FixtureHooks {
    type Locator = String;

    fn get_exposure(&self, _locator: &String) -> Result<Exposure, DriverError> {
        Ok(self.exposure.clone())
    }

    fn fetch_references(
        &self,
        _locator: &String,
        _exposure: &Exposure,
    ) -> Result<(ReferenceCatalog, TanWcs), DriverError> {
        Ok((self.references.clone(), self.ref_wcs.clone()))
    }

    fn make_id_factory(&self, _locator: &String) -> Result<SourceIdFactory, DriverError> {
        SourceIdFactory::new(ExposureIdent::new(EXPOSURE_ID, SOURCE_BITS))
            .map_err(|e| DriverError::InvalidLocator(e.to_string()))
    }

    fn exposure_id(&self, _locator: &String) -> Result<u64, DriverError> {
        Ok(EXPOSURE_ID)
    }
}

fn run_fixture() -> forced_phot::pipeline::engine::PipelineResult {
    let driver = ForcedPhotDriver::new(
        FixtureHooks::new(),
        MeasurementPipeline::new(Box::new(ConstantFluxEngine), PipelineConfig::default()),
    );
    driver.run(&"fixture".to_string(), None).unwrap()
}

#[test]
fn end_to_end_scenario() {
    let result = run_fixture();
    let catalog = result.catalog;

    assert_eq!(result.exposure_id, EXPOSURE_ID);
    assert_eq!(catalog.len(), 3);

    // Identifiers are (0xABC << 8) | row, in input order
    for (i, record) in catalog.iter().enumerate() {
        assert_eq!(record.id.0, (EXPOSURE_ID << SOURCE_BITS) | i as u64);
        assert_eq!(record.ref_id, RefId(10 + i as u64));
    }

    // Two measured rows, one degraded
    assert_eq!(catalog.get(0).unwrap().field("flux"), Some(1.0));
    assert_eq!(catalog.get(2).unwrap().field("flux"), Some(1.0));

    let degraded = catalog.get(1).unwrap();
    assert_eq!(degraded.field("flux"), None);
    assert!(degraded.has_flag(FLAG_MEASUREMENT_FAILED));
}

#[test]
fn identifiers_are_reproducible() {
    let a = run_fixture();
    let b = run_fixture();
    for (x, y) in a.catalog.iter().zip(b.catalog.iter()) {
        assert_eq!(x.id, y.id);
    }
}

#[test]
fn psf_cache_hint_is_applied() {
    struct CacheProbe;
    impl MeasurementEngine for CacheProbe {
        fn name(&self) -> &'static str {
            "cache_probe"
        }
        fn measure(
            &self,
            record: &mut MeasurementRecord,
            exposure: &Exposure,
        ) -> Result<(), MeasureError> {
            // Surface the hint as a field so the test can observe it
            #[allow(clippy::cast_precision_loss)]
            record.set_field(
                "cache",
                exposure.psf.cache_size().unwrap_or(0) as f64,
            );
            Ok(())
        }
    }

    let driver = ForcedPhotDriver::new(
        FixtureHooks::new(),
        MeasurementPipeline::new(Box::new(CacheProbe), PipelineConfig::default()),
    );
    let result = driver.run(&"fixture".to_string(), Some(128)).unwrap();
    assert_eq!(result.catalog.get(0).unwrap().field("cache"), Some(128.0));
}

#[test]
fn footprints_land_in_target_frame() {
    // Shift the target frame 10 pixels relative to the reference frame; the
    // projected footprints must follow.
    struct ShiftedHooks(FixtureHooks);
    impl DriverHooks for ShiftedHooks {
        type Locator = String;
        fn get_exposure(&self, _locator: &String) -> Result<Exposure, DriverError> {
            Ok(Exposure::blank(
                PixelBox::from_dimensions(0, 0, 100, 100),
                make_wcs(PixelPoint::new(40.0, 50.0)),
                PsfModel::new(2.0),
            )
            .unwrap())
        }
        fn fetch_references(
            &self,
            locator: &String,
            exposure: &Exposure,
        ) -> Result<(ReferenceCatalog, TanWcs), DriverError> {
            self.0.fetch_references(locator, exposure)
        }
        fn make_id_factory(&self, locator: &String) -> Result<SourceIdFactory, DriverError> {
            self.0.make_id_factory(locator)
        }
        fn exposure_id(&self, locator: &String) -> Result<u64, DriverError> {
            self.0.exposure_id(locator)
        }
    }

    let driver = ForcedPhotDriver::new(
        ShiftedHooks(FixtureHooks::new()),
        MeasurementPipeline::new(Box::new(ConstantFluxEngine), PipelineConfig::default()),
    );
    let result = driver.run(&"fixture".to_string(), None).unwrap();

    // Reference footprint at x 19..=21, y 20 lands at x 9..=11 in the
    // shifted target frame.
    let footprint = &result.catalog.get(0).unwrap().footprint;
    assert_eq!(footprint.spans, vec![Span::new(20, 9, 11)]);
}
