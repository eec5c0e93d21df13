//! Footprint projection between coordinate systems.
//!
//! Forced photometry needs footprints in the pixel frame of the image being
//! measured, while reference detections live in the reference image's frame.
//! The projector maps a footprint through the sky coordinates the two frames
//! share.
//!
//! The default implementation flattens deblend hierarchies: the projected
//! footprint covers the transformed pixel extent of the input and all of its
//! children, but the per-child decomposition is discarded. Callers that need
//! to keep deblend structure supply their own `FootprintProjector`; this is
//! the one extension point a concrete driver is expected to override.

use crate::core::footprint::{Footprint, Peak};
use crate::core::geom::{PixelBox, PixelPoint};
use crate::core::wcs::TanWcs;

/// Maps footprints from a source WCS's pixel frame into a target frame.
pub trait FootprintProjector {
    /// Project `footprint` into `target_wcs`'s pixel frame, clipped to
    /// `region`. A footprint entirely outside `region` projects to an empty
    /// footprint; that is a valid result, not an error.
    fn project(
        &self,
        footprint: &Footprint,
        source_wcs: &TanWcs,
        target_wcs: &TanWcs,
        region: PixelBox,
    ) -> Footprint;
}

/// The default projector: pixel-by-pixel transform, deblend structure
/// discarded.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlattenProjector;

impl FootprintProjector for FlattenProjector {
    fn project(
        &self,
        footprint: &Footprint,
        source_wcs: &TanWcs,
        target_wcs: &TanWcs,
        region: PixelBox,
    ) -> Footprint {
        let flat = footprint.flatten();

        let mut pixels = Vec::new();
        for (x, y) in flat.pixels() {
            let sky = source_wcs.pixel_to_sky(PixelPoint::new(f64::from(x), f64::from(y)));
            // Positions that do not project (behind the tangent plane) are
            // simply outside the target image.
            let Ok(target) = target_wcs.sky_to_pixel(sky) else {
                continue;
            };
            let (tx, ty) = target.rounded();
            if region.contains(tx, ty) {
                pixels.push((tx, ty));
            }
        }

        let mut peaks = Vec::with_capacity(flat.peaks.len());
        for peak in &flat.peaks {
            let sky =
                source_wcs.pixel_to_sky(PixelPoint::new(f64::from(peak.x), f64::from(peak.y)));
            let Ok(target) = target_wcs.sky_to_pixel(sky) else {
                continue;
            };
            let (tx, ty) = target.rounded();
            if region.contains(tx, ty) {
                peaks.push(Peak {
                    x: tx,
                    y: ty,
                    value: peak.value,
                });
            }
        }

        let mut projected = Footprint::from_pixels(pixels);
        projected.peaks = peaks;
        projected
    }
}
