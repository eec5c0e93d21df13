//! Gnomonic (tangent-plane) world coordinate system.
//!
//! A `TanWcs` maps between a pixel grid and equatorial sky coordinates via
//! the standard TAN projection: intermediate world coordinates are obtained
//! from pixel offsets through the CD matrix, then de-projected about the
//! tangent point. This is the projection used for small survey fields; both
//! the reference catalog's frame and the target image's frame are described
//! by one of these.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::geom::{PixelPoint, SkyPoint};

#[derive(Error, Debug)]
pub enum WcsError {
    #[error("CD matrix is singular (determinant {0:e})")]
    SingularMatrix(f64),

    #[error("Position {0} projects behind the tangent plane")]
    BehindTangentPlane(SkyPoint),
}

/// TAN-projection WCS: reference pixel, tangent point, and CD matrix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TanWcs {
    /// Reference pixel (CRPIX), in this image's pixel coordinates
    crpix: PixelPoint,

    /// Tangent point on the sky (CRVAL)
    crval: SkyPoint,

    /// CD matrix, degrees per pixel, row-major: [[cd11, cd12], [cd21, cd22]]
    cd: [[f64; 2]; 2],

    /// Inverse of the CD matrix, pixels per degree
    #[serde(skip, default = "default_inverse")]
    cd_inv: [[f64; 2]; 2],
}

fn default_inverse() -> [[f64; 2]; 2] {
    [[0.0; 2]; 2]
}

impl TanWcs {
    /// Construct a WCS from its FITS-style parameters.
    ///
    /// # Errors
    ///
    /// Returns `WcsError::SingularMatrix` if the CD matrix cannot be inverted.
    pub fn new(crpix: PixelPoint, crval: SkyPoint, cd: [[f64; 2]; 2]) -> Result<Self, WcsError> {
        let det = cd[0][0] * cd[1][1] - cd[0][1] * cd[1][0];
        if det.abs() < 1e-300 {
            return Err(WcsError::SingularMatrix(det));
        }
        let cd_inv = [
            [cd[1][1] / det, -cd[0][1] / det],
            [-cd[1][0] / det, cd[0][0] / det],
        ];
        Ok(Self {
            crpix,
            crval,
            cd,
            cd_inv,
        })
    }

    /// A north-up WCS with square pixels of `scale_deg` degrees at `crval`.
    ///
    /// # Errors
    ///
    /// Returns `WcsError::SingularMatrix` if `scale_deg` is zero.
    pub fn north_up(crpix: PixelPoint, crval: SkyPoint, scale_deg: f64) -> Result<Self, WcsError> {
        // Negative first element: RA increases to the left on sky images.
        Self::new(crpix, crval, [[-scale_deg, 0.0], [0.0, scale_deg]])
    }

    /// Rebuild the cached CD inverse after deserialization.
    ///
    /// # Errors
    ///
    /// Returns `WcsError::SingularMatrix` if the stored CD matrix is singular.
    pub fn rebuild_inverse(&mut self) -> Result<(), WcsError> {
        let rebuilt = Self::new(self.crpix, self.crval, self.cd)?;
        self.cd_inv = rebuilt.cd_inv;
        Ok(())
    }

    /// The tangent point of this projection.
    #[must_use]
    pub fn tangent_point(&self) -> SkyPoint {
        self.crval
    }

    /// Approximate pixel scale in degrees per pixel.
    #[must_use]
    pub fn pixel_scale_deg(&self) -> f64 {
        let det = self.cd[0][0] * self.cd[1][1] - self.cd[0][1] * self.cd[1][0];
        det.abs().sqrt()
    }

    /// Map a pixel position to the sky.
    #[must_use]
    pub fn pixel_to_sky(&self, pixel: PixelPoint) -> SkyPoint {
        let dx = pixel.x - self.crpix.x;
        let dy = pixel.y - self.crpix.y;
        let xi = (self.cd[0][0] * dx + self.cd[0][1] * dy).to_radians();
        let eta = (self.cd[1][0] * dx + self.cd[1][1] * dy).to_radians();

        let ra0 = self.crval.ra_deg.to_radians();
        let dec0 = self.crval.dec_deg.to_radians();
        let (sin_dec0, cos_dec0) = dec0.sin_cos();

        let denom = cos_dec0 - eta * sin_dec0;
        let ra = ra0 + xi.atan2(denom);
        let dec = ((sin_dec0 + eta * cos_dec0) / (xi * xi + denom * denom).sqrt()).atan();

        SkyPoint {
            ra_deg: ra.to_degrees().rem_euclid(360.0),
            dec_deg: dec.to_degrees(),
        }
    }

    /// Map a sky position to this image's pixel grid.
    ///
    /// # Errors
    ///
    /// Returns `WcsError::BehindTangentPlane` when the position is 90 degrees
    /// or more from the tangent point, where the gnomonic projection diverges.
    pub fn sky_to_pixel(&self, sky: SkyPoint) -> Result<PixelPoint, WcsError> {
        let ra0 = self.crval.ra_deg.to_radians();
        let dec0 = self.crval.dec_deg.to_radians();
        let ra = sky.ra_deg.to_radians();
        let dec = sky.dec_deg.to_radians();
        let (sin_dec0, cos_dec0) = dec0.sin_cos();
        let (sin_dec, cos_dec) = dec.sin_cos();
        let cos_dra = (ra - ra0).cos();

        let denom = sin_dec * sin_dec0 + cos_dec * cos_dec0 * cos_dra;
        if denom <= 0.0 {
            return Err(WcsError::BehindTangentPlane(sky));
        }

        let xi = (cos_dec * (ra - ra0).sin() / denom).to_degrees();
        let eta = ((sin_dec * cos_dec0 - cos_dec * sin_dec0 * cos_dra) / denom).to_degrees();

        Ok(PixelPoint {
            x: self.crpix.x + self.cd_inv[0][0] * xi + self.cd_inv[0][1] * eta,
            y: self.crpix.y + self.cd_inv[1][0] * xi + self.cd_inv[1][1] * eta,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_wcs() -> TanWcs {
        // 0.2 arcsec pixels centered at (RA 150, Dec 2.2), 1000x1000 frame
        TanWcs::north_up(
            PixelPoint::new(500.0, 500.0),
            SkyPoint::new(150.0, 2.2),
            0.2 / 3600.0,
        )
        .unwrap()
    }

    #[test]
    fn test_crpix_maps_to_crval() {
        let wcs = test_wcs();
        let sky = wcs.pixel_to_sky(PixelPoint::new(500.0, 500.0));
        assert!((sky.ra_deg - 150.0).abs() < 1e-9);
        assert!((sky.dec_deg - 2.2).abs() < 1e-9);
    }

    #[test]
    fn test_round_trip() {
        let wcs = test_wcs();
        for &(x, y) in &[(0.0, 0.0), (123.4, 987.6), (999.0, 1.0)] {
            let sky = wcs.pixel_to_sky(PixelPoint::new(x, y));
            let back = wcs.sky_to_pixel(sky).unwrap();
            assert!((back.x - x).abs() < 1e-6, "x: {} vs {}", back.x, x);
            assert!((back.y - y).abs() < 1e-6, "y: {} vs {}", back.y, y);
        }
    }

    #[test]
    fn test_singular_matrix_rejected() {
        let result = TanWcs::new(
            PixelPoint::new(0.0, 0.0),
            SkyPoint::new(0.0, 0.0),
            [[0.0, 0.0], [0.0, 0.0]],
        );
        assert!(matches!(result, Err(WcsError::SingularMatrix(_))));
    }

    #[test]
    fn test_antipode_rejected() {
        let wcs = test_wcs();
        let result = wcs.sky_to_pixel(SkyPoint::new(330.0, -2.2));
        assert!(matches!(result, Err(WcsError::BehindTangentPlane(_))));
    }

    #[test]
    fn test_pixel_scale() {
        let wcs = test_wcs();
        assert!((wcs.pixel_scale_deg() - 0.2 / 3600.0).abs() < 1e-12);
    }
}
