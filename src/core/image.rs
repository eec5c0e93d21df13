//! The target image and its attached models.
//!
//! An `Exposure` bundles everything measurement needs about one image:
//! pixel, mask and variance planes, the WCS, the PSF model, and the
//! aperture-correction map. It is read-only during measurement; the PSF
//! cache-size hint is the single mutation point.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::core::geom::{PixelBox, PixelPoint, SkyPoint};
use crate::core::wcs::TanWcs;

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("plane size {got} does not match bounding box {width}x{height}")]
    PlaneSizeMismatch { got: usize, width: u32, height: u32 },
}

/// Point-spread-function model attached to an exposure.
///
/// The model itself is opaque to this crate; what matters here is the
/// evaluation cache-size hint a driver may apply before measurement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PsfModel {
    /// Full width at half maximum, in pixels
    pub fwhm_pix: f64,

    /// Realization cache size hint; `None` leaves the model's default.
    /// No serde skip here: exposures travel as bincode, which requires
    /// every field present.
    #[serde(default)]
    cache_size: Option<usize>,
}

impl PsfModel {
    #[must_use]
    pub fn new(fwhm_pix: f64) -> Self {
        Self {
            fwhm_pix,
            cache_size: None,
        }
    }

    /// Hint how many PSF realizations to cache. Applied once per invocation,
    /// before measurement.
    pub fn set_cache_size(&mut self, size: usize) {
        self.cache_size = Some(size);
    }

    #[must_use]
    pub fn cache_size(&self) -> Option<usize> {
        self.cache_size
    }
}

/// An affine correction surface for one flux field: the multiplicative
/// factor at pixel (x, y) is `c0 + cx * x + cy * y`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ApCorrField {
    pub c0: f64,
    pub cx: f64,
    pub cy: f64,
}

impl ApCorrField {
    /// A position-independent correction factor.
    #[must_use]
    pub fn constant(factor: f64) -> Self {
        Self {
            c0: factor,
            cx: 0.0,
            cy: 0.0,
        }
    }

    /// Evaluate the correction factor at a pixel position.
    #[must_use]
    pub fn evaluate(&self, at: PixelPoint) -> f64 {
        self.c0 + self.cx * at.x + self.cy * at.y
    }
}

/// Aperture corrections for an exposure, one surface per flux field name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApCorrMap {
    /// Correction surfaces keyed by the flux field they apply to
    pub fields: BTreeMap<String, ApCorrField>,
}

impl ApCorrMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: impl Into<String>, surface: ApCorrField) {
        self.fields.insert(field.into(), surface);
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&ApCorrField> {
        self.fields.get(field)
    }
}

/// The pixel image measurement is performed on, with its models attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exposure {
    /// Pixel bounding box of the image on its parent grid
    pub bbox: PixelBox,

    /// Image plane, row-major within `bbox`
    pub image: Vec<f32>,

    /// Per-pixel mask plane
    pub mask: Vec<u32>,

    /// Per-pixel variance plane
    pub variance: Vec<f32>,

    /// World coordinate system of this image
    pub wcs: TanWcs,

    /// Point-spread-function model
    pub psf: PsfModel,

    /// Aperture-correction map, when the calibration produced one
    #[serde(default)]
    pub ap_corr_map: Option<ApCorrMap>,
}

impl Exposure {
    /// Bundle planes and models into an exposure, checking plane sizes.
    ///
    /// # Errors
    ///
    /// Returns `ImageError::PlaneSizeMismatch` when any plane does not match
    /// the bounding box.
    pub fn new(
        bbox: PixelBox,
        image: Vec<f32>,
        mask: Vec<u32>,
        variance: Vec<f32>,
        wcs: TanWcs,
        psf: PsfModel,
    ) -> Result<Self, ImageError> {
        let expected = bbox.width() as usize * bbox.height() as usize;
        for got in [image.len(), mask.len(), variance.len()] {
            if got != expected {
                return Err(ImageError::PlaneSizeMismatch {
                    got,
                    width: bbox.width(),
                    height: bbox.height(),
                });
            }
        }
        Ok(Self {
            bbox,
            image,
            mask,
            variance,
            wcs,
            psf,
            ap_corr_map: None,
        })
    }

    /// A blank exposure filled with zeros, unit variance.
    ///
    /// # Errors
    ///
    /// Never fails for a non-empty box; propagates the size check otherwise.
    pub fn blank(bbox: PixelBox, wcs: TanWcs, psf: PsfModel) -> Result<Self, ImageError> {
        let n = bbox.width() as usize * bbox.height() as usize;
        Self::new(bbox, vec![0.0; n], vec![0; n], vec![1.0; n], wcs, psf)
    }

    #[must_use]
    pub fn with_ap_corr_map(mut self, map: ApCorrMap) -> Self {
        self.ap_corr_map = Some(map);
        self
    }

    fn index_of(&self, x: i32, y: i32) -> Option<usize> {
        if !self.bbox.contains(x, y) {
            return None;
        }
        let col = (x - self.bbox.x_min) as usize;
        let row = (y - self.bbox.y_min) as usize;
        Some(row * self.bbox.width() as usize + col)
    }

    /// Image value at (x, y), `None` outside the bounding box.
    #[must_use]
    pub fn pixel(&self, x: i32, y: i32) -> Option<f32> {
        self.index_of(x, y).map(|i| self.image[i])
    }

    /// Variance value at (x, y), `None` outside the bounding box.
    #[must_use]
    pub fn variance_at(&self, x: i32, y: i32) -> Option<f32> {
        self.index_of(x, y).map(|i| self.variance[i])
    }

    /// Set one image pixel; out-of-box writes are ignored.
    pub fn set_pixel(&mut self, x: i32, y: i32, value: f32) {
        if let Some(i) = self.index_of(x, y) {
            self.image[i] = value;
        }
    }

    /// Sky corners of the image bounding box, for reference selection.
    #[must_use]
    pub fn sky_corners(&self) -> [SkyPoint; 4] {
        let corners = self.bbox.corners();
        [
            self.wcs.pixel_to_sky(corners[0]),
            self.wcs.pixel_to_sky(corners[1]),
            self.wcs.pixel_to_sky(corners[2]),
            self.wcs.pixel_to_sky(corners[3]),
        ]
    }
}
