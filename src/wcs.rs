//! Pixel to sky coordinate models.
//!
//! Two variants exist: [`SimpleWcs`], a pure rotation and scale about the image
//! center, and [`BilinearWcs`], which stores the sky positions of the four image
//! corners and interpolates between them. Both are wrapped by [`CoordinateModel`].
//!
//! Pixel coordinates have their origin in the lower left image corner; the
//! image spans `[0, width] x [0, height]`.

use log::warn;
use nalgebra::{Matrix2, Rotation2, Vector2};

use crate::sky::{ARCSEC, SkyCoord, ra_delta, unwrap_ra_near, wrap_ra};

/// Residual at which the bilinear inverse is considered converged (arcsec).
pub const INVERSE_EPSILON_ARCSEC: f64 = 0.001;

/// Maximum number of refinement rounds of the bilinear inverse.
pub const INVERSE_MAX_ROUNDS: usize = 12;

/// Rotation and scale about the image center.
#[derive(Clone, Debug, PartialEq)]
pub struct SimpleWcs {
    center: SkyCoord,
    /// Arcsec per pixel.
    scale: f64,
    /// Radians, counter-clockwise from sky to camera frame.
    rotation: f64,
    cos_dec: f64,
    width: f64,
    height: f64,
    valid: bool,
}

impl SimpleWcs {
    /// Create a new instance.
    pub fn new(center: SkyCoord, scale: f64, rotation: f64, width: f64, height: f64) -> Self {
        Self {
            center,
            scale,
            rotation,
            cos_dec: center.dec.cos(),
            width,
            height,
            valid: true,
        }
    }

    /// A model with all parameters unset, as read from an incomplete header.
    pub(crate) fn invalid(width: f64, height: f64) -> Self {
        Self {
            valid: false,
            ..Self::new(SkyCoord::default(), 0.0, 0.0, width, height)
        }
    }

    /// Build the model with the given scale and rotation whose center is chosen
    /// such that `pixel` maps exactly onto `target`.
    pub fn anchored(
        pixel: (f64, f64),
        target: SkyCoord,
        scale: f64,
        rotation: f64,
        width: f64,
        height: f64,
    ) -> Self {
        let probe = Self::new(SkyCoord::default(), scale, rotation, width, height);
        let offset = probe.offsets(pixel.0, pixel.1);
        let dec = target.dec - offset.y;
        let ra = wrap_ra(target.ra - offset.x / dec.cos());
        Self::new(SkyCoord::new(dec, ra), scale, rotation, width, height)
    }

    /// Sky position of the image center.
    pub fn center(&self) -> SkyCoord {
        self.center
    }

    /// Arcsec per pixel.
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Rotation in radians.
    pub fn rotation(&self) -> f64 {
        self.rotation
    }

    /// False for models that failed to load from a header.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// East-west and north-south offsets (radians on the sky) of a pixel from the center.
    fn offsets(&self, x: f64, y: f64) -> Vector2<f64> {
        let offset = Vector2::new(x - self.width / 2.0, y - self.height / 2.0);
        Rotation2::new(-self.rotation) * offset * (self.scale * ARCSEC)
    }

    /// Transforms from pixel to sky coordinate space.
    pub fn pixel_to_world(&self, x: f64, y: f64) -> SkyCoord {
        let offset = self.offsets(x, y);
        SkyCoord::new(
            self.center.dec + offset.y,
            wrap_ra(self.center.ra + offset.x / self.cos_dec),
        )
    }

    /// Transforms from sky coordinate to pixel space.
    pub fn world_to_pixel(&self, sky: SkyCoord) -> (f64, f64) {
        let delta = Vector2::new(
            ra_delta(sky.ra, self.center.ra) * self.cos_dec,
            sky.dec - self.center.dec,
        ) / (self.scale * ARCSEC);
        let pixel = Rotation2::new(self.rotation) * delta;
        (self.width / 2.0 + pixel.x, self.height / 2.0 + pixel.y)
    }

    /// The equivalent bilinear model through this model's corner positions.
    pub fn to_bilinear(&self) -> BilinearWcs {
        BilinearWcs::from_corners(
            self.pixel_to_world(0.0, self.height),
            self.pixel_to_world(self.width, self.height),
            self.pixel_to_world(0.0, 0.0),
            self.pixel_to_world(self.width, 0.0),
            self.width,
            self.height,
        )
    }
}

/// Sky positions of the four image corners, bilinearly interpolated.
#[derive(Clone, Debug, PartialEq)]
pub struct BilinearWcs {
    /// At pixel `(0, height)`.
    upper_left: SkyCoord,
    /// At pixel `(width, height)`.
    upper_right: SkyCoord,
    /// At pixel `(0, 0)`.
    lower_left: SkyCoord,
    /// At pixel `(width, 0)`.
    lower_right: SkyCoord,
    width: f64,
    height: f64,
    valid: bool,
}

impl BilinearWcs {
    /// Create a model from its corner positions.
    ///
    /// Corner right ascensions are shifted by whole turns so that none of them
    /// sits on the far side of the 0h seam from the others.
    pub fn from_corners(
        upper_left: SkyCoord,
        upper_right: SkyCoord,
        lower_left: SkyCoord,
        lower_right: SkyCoord,
        width: f64,
        height: f64,
    ) -> Self {
        let mut wcs = Self {
            upper_left,
            upper_right,
            lower_left,
            lower_right,
            width,
            height,
            valid: true,
        };
        wcs.normalize();
        wcs
    }

    pub(crate) fn invalid(width: f64, height: f64) -> Self {
        let zero = SkyCoord::default();
        Self {
            valid: false,
            ..Self::from_corners(zero, zero, zero, zero, width, height)
        }
    }

    fn normalize(&mut self) {
        let reference = self.lower_left.ra;
        for corner in [
            &mut self.upper_left,
            &mut self.upper_right,
            &mut self.lower_right,
        ] {
            corner.ra = unwrap_ra_near(corner.ra, reference);
        }
    }

    /// Corners in the order upper left, upper right, lower left, lower right.
    pub fn corners(&self) -> [SkyCoord; 4] {
        [
            self.upper_left,
            self.upper_right,
            self.lower_left,
            self.lower_right,
        ]
    }

    /// False for models that failed to load from a header.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Whether all four corners are finite positions.
    pub fn is_finite(&self) -> bool {
        self.corners().iter().all(SkyCoord::is_finite)
    }

    /// Interpolated position without folding RA back into `[0, 2π)`.
    fn interpolate(&self, x: f64, y: f64) -> SkyCoord {
        let fraction_x = x / self.width;
        let fraction_y = y / self.height;
        let top = lerp(self.upper_left, self.upper_right, fraction_x);
        let bottom = lerp(self.lower_left, self.lower_right, fraction_x);
        lerp(bottom, top, fraction_y)
    }

    /// Transforms from pixel to sky coordinate space.
    pub fn pixel_to_world(&self, x: f64, y: f64) -> SkyCoord {
        self.interpolate(x, y).wrapped()
    }

    /// Transforms from sky coordinate to pixel space.
    ///
    /// The search box starts as the whole image. Each round linearizes the model
    /// over the box, solves for the target, and shrinks the box to the quadrant
    /// between the estimate and the target. If the residual never drops below
    /// [`INVERSE_EPSILON_ARCSEC`], the last estimate is returned when it lies on
    /// the image and `None` otherwise.
    pub fn world_to_pixel(&self, sky: SkyCoord) -> Option<(f64, f64)> {
        let target = SkyCoord::new(sky.dec, unwrap_ra_near(sky.ra, self.lower_left.ra));
        let cos_dec = target.dec.cos();
        let offset = |x: f64, y: f64| {
            let p = self.interpolate(x, y);
            Vector2::new((p.ra - target.ra) * cos_dec, p.dec - target.dec)
        };

        let (mut x0, mut x1, mut y0, mut y1) = (0.0, self.width, 0.0, self.height);
        let mut point = Vector2::new(self.width / 2.0, self.height / 2.0);
        let mut estimate = None;
        for _ in 0..INVERSE_MAX_ROUNDS {
            let c00 = offset(x0, y0);
            let c10 = offset(x1, y0);
            let c01 = offset(x0, y1);
            let c11 = offset(x1, y1);
            let du = ((c10 - c00) + (c11 - c01)) / 2.0;
            let dv = ((c01 - c00) + (c11 - c10)) / 2.0;
            let Some(inverse) = Matrix2::from_columns(&[du, dv]).try_inverse() else {
                break;
            };

            // step from the current point, in units of the box size
            let fraction = -(inverse * offset(point.x, point.y));
            let next = Vector2::new(
                point.x + fraction.x * (x1 - x0),
                point.y + fraction.y * (y1 - y0),
            );
            if !(next.x.is_finite() && next.y.is_finite()) {
                break;
            }
            point = next;
            estimate = Some(point);

            let residual = offset(point.x, point.y);
            if residual.norm() <= INVERSE_EPSILON_ARCSEC * ARCSEC {
                return Some((point.x, point.y));
            }

            // keep the quadrant between the estimate and the target
            let step = -(inverse * residual);
            if x0 < point.x && point.x < x1 {
                if step.x > 0.0 {
                    x0 = point.x;
                } else {
                    x1 = point.x;
                }
            }
            if y0 < point.y && point.y < y1 {
                if step.y > 0.0 {
                    y0 = point.y;
                } else {
                    y1 = point.y;
                }
            }
        }

        let point = estimate?;
        if (0.0..=self.width).contains(&point.x) && (0.0..=self.height).contains(&point.y) {
            warn!("Bilinear inverse transform did not converge.");
            Some((point.x, point.y))
        } else {
            None
        }
    }

    /// Sky position of the image center.
    pub fn center(&self) -> SkyCoord {
        self.pixel_to_world(self.width / 2.0, self.height / 2.0)
    }

    /// Mean rotation (radians) and scale (arcsec/pixel) across the image.
    fn rotation_and_scale(&self) -> (f64, f64) {
        let cos_dec = self.interpolate(self.width / 2.0, self.height / 2.0).dec.cos();
        let sky_vector = |a: SkyCoord, b: SkyCoord| {
            Vector2::new((b.ra - a.ra) * cos_dec, b.dec - a.dec)
        };
        let x_axis = (sky_vector(self.upper_left, self.upper_right)
            + sky_vector(self.lower_left, self.lower_right))
            / (2.0 * self.width);
        let y_axis = (sky_vector(self.lower_left, self.upper_left)
            + sky_vector(self.lower_right, self.upper_right))
            / (2.0 * self.height);
        let rotation = -x_axis.y.atan2(x_axis.x);
        let scale = (x_axis.norm() + y_axis.norm()) / 2.0 / ARCSEC;
        (rotation, scale)
    }
}

fn lerp(a: SkyCoord, b: SkyCoord, t: f64) -> SkyCoord {
    SkyCoord::new(a.dec + t * (b.dec - a.dec), a.ra + t * (b.ra - a.ra))
}

/// Either coordinate model, chosen at runtime.
#[derive(Clone, Debug, PartialEq)]
pub enum CoordinateModel {
    /// Rotation and scale about the field center.
    Simple(SimpleWcs),
    /// Interpolation between the sky positions of the image corners.
    Bilinear(BilinearWcs),
}

impl CoordinateModel {
    /// Transforms from pixel to sky coordinate space.
    pub fn pixel_to_world(&self, x: f64, y: f64) -> SkyCoord {
        match self {
            CoordinateModel::Simple(wcs) => wcs.pixel_to_world(x, y),
            CoordinateModel::Bilinear(wcs) => wcs.pixel_to_world(x, y),
        }
    }

    /// Transforms from sky coordinate to pixel space.
    ///
    /// Only the bilinear variant can fail; see [`BilinearWcs::world_to_pixel`].
    pub fn world_to_pixel(&self, sky: SkyCoord) -> Option<(f64, f64)> {
        match self {
            CoordinateModel::Simple(wcs) => Some(wcs.world_to_pixel(sky)),
            CoordinateModel::Bilinear(wcs) => wcs.world_to_pixel(sky),
        }
    }

    /// Sky position of the image center.
    pub fn center(&self) -> SkyCoord {
        match self {
            CoordinateModel::Simple(wcs) => wcs.center(),
            CoordinateModel::Bilinear(wcs) => wcs.center(),
        }
    }

    /// Validity of the wrapped model.
    pub fn is_valid(&self) -> bool {
        match self {
            CoordinateModel::Simple(wcs) => wcs.is_valid(),
            CoordinateModel::Bilinear(wcs) => wcs.is_valid(),
        }
    }

    /// Rotation in radians and scale in arcsec/pixel.
    pub fn rotation_and_scale(&self) -> (f64, f64) {
        match self {
            CoordinateModel::Simple(wcs) => (wcs.rotation(), wcs.scale()),
            CoordinateModel::Bilinear(wcs) => wcs.rotation_and_scale(),
        }
    }
}

impl From<SimpleWcs> for CoordinateModel {
    fn from(wcs: SimpleWcs) -> Self {
        CoordinateModel::Simple(wcs)
    }
}

impl From<BilinearWcs> for CoordinateModel {
    fn from(wcs: BilinearWcs) -> Self {
        CoordinateModel::Bilinear(wcs)
    }
}
