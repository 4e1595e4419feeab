//! Read-only configuration shared by every search task.

use crate::sky::{ARCSEC, SkyCoord};
use crate::wcs::SimpleWcs;

/// Pixel scale assumed when the image header carries none.
pub const DEFAULT_PIXEL_SCALE_ARCSEC: f64 = 1.52;

/// Number of search tasks.
pub const DEFAULT_WORKERS: usize = 16;

/// Per-image configuration of a correlation attempt.
///
/// Only the nominal center and the pixel scale act as priors; both are
/// expected to be good to a few percent.
#[derive(Clone, Debug, PartialEq)]
pub struct Context {
    /// Approximate pixel scale in arcsec/pixel.
    pub pixel_scale_arcsec: f64,
    /// Image width in pixels.
    pub width: f64,
    /// Image height in pixels.
    pub height: f64,
    /// Assumed camera rotation in radians.
    pub rotation: f64,
    /// Approximate sky position of the image center.
    pub nominal_center: SkyCoord,
    /// Number of search tasks to run.
    pub workers: usize,
}

impl Context {
    /// Create a context with the default pixel scale, no rotation and the default task count.
    pub fn new(width: f64, height: f64, nominal_center: SkyCoord) -> Self {
        Self {
            pixel_scale_arcsec: DEFAULT_PIXEL_SCALE_ARCSEC,
            width,
            height,
            rotation: 0.0,
            nominal_center,
            workers: DEFAULT_WORKERS,
        }
    }

    /// Set the pixel scale, falling back to [`DEFAULT_PIXEL_SCALE_ARCSEC`] if `None`.
    pub fn with_pixel_scale(mut self, arcsec_per_pixel: Option<f64>) -> Self {
        self.pixel_scale_arcsec = Self::pixel_scale_or_default(arcsec_per_pixel);
        self
    }

    /// Set the assumed rotation (radians).
    pub fn with_rotation(mut self, rotation: f64) -> Self {
        self.rotation = rotation;
        self
    }

    /// Set the number of search tasks. At least one task always runs.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// The header pixel scale if it is usable, the documented default otherwise.
    pub fn pixel_scale_or_default(arcsec_per_pixel: Option<f64>) -> f64 {
        match arcsec_per_pixel {
            Some(scale) if scale.is_finite() && scale > 0.0 => scale,
            _ => DEFAULT_PIXEL_SCALE_ARCSEC,
        }
    }

    /// Pixel scale in radians per pixel.
    pub fn pixel_scale_rad(&self) -> f64 {
        self.pixel_scale_arcsec * ARCSEC
    }

    /// Angular width of the image in radians.
    pub fn width_rad(&self) -> f64 {
        self.width * self.pixel_scale_rad()
    }

    /// Angular height of the image in radians.
    pub fn height_rad(&self) -> f64 {
        self.height * self.pixel_scale_rad()
    }

    /// Foreshortening of RA at the nominal center.
    pub fn cos_center_dec(&self) -> f64 {
        self.nominal_center.dec.cos()
    }

    /// The model implied by the priors alone, before any matching.
    pub fn nominal_model(&self) -> SimpleWcs {
        SimpleWcs::new(
            self.nominal_center,
            self.pixel_scale_arcsec,
            self.rotation,
            self.width,
            self.height,
        )
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn default_pixel_scale() {
        assert_eq!(Context::pixel_scale_or_default(None), DEFAULT_PIXEL_SCALE_ARCSEC);
        assert_eq!(Context::pixel_scale_or_default(Some(-1.)), DEFAULT_PIXEL_SCALE_ARCSEC);
        assert_eq!(Context::pixel_scale_or_default(Some(2.5)), 2.5);
    }

    #[test]
    fn angular_extent() {
        let ctx = Context::new(1000., 500., SkyCoord::default()).with_pixel_scale(Some(3.6));
        assert_abs_diff_eq!(ctx.width_rad().to_degrees(), 1., epsilon = 1e-12);
        assert_abs_diff_eq!(ctx.height_rad().to_degrees(), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn nominal_model_centered() {
        let center = SkyCoord::from_degrees_hours(20., 3.);
        let ctx = Context::new(800., 600., center).with_rotation(0.3);
        let sky = ctx.nominal_model().pixel_to_world(400., 300.);
        assert_abs_diff_eq!(sky.dec, center.dec, epsilon = 1e-12);
        assert_abs_diff_eq!(sky.ra, center.ra, epsilon = 1e-12);
    }

    #[test]
    fn at_least_one_worker() {
        let ctx = Context::new(10., 10., SkyCoord::default()).with_workers(0);
        assert_eq!(ctx.workers, 1);
    }
}
