//! Sky positions and small angular helpers.

use std::f64::consts::{PI, TAU};

/// One arcsecond in radians.
pub const ARCSEC: f64 = PI / (180.0 * 3600.0);

/// Convert arcseconds to radians.
pub fn arcsec_to_rad(arcsec: f64) -> f64 {
    arcsec * ARCSEC
}

/// Convert radians to arcseconds.
pub fn rad_to_arcsec(rad: f64) -> f64 {
    rad / ARCSEC
}

/// A position on the sky. Both components are in radians.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SkyCoord {
    /// Declination.
    pub dec: f64,
    /// Right ascension.
    pub ra: f64,
}

impl SkyCoord {
    /// Create a new position from declination and right ascension in radians.
    pub fn new(dec: f64, ra: f64) -> Self {
        Self { dec, ra }
    }

    /// Create a position from declination in degrees and right ascension in hours.
    pub fn from_degrees_hours(dec_deg: f64, ra_hours: f64) -> Self {
        Self {
            dec: dec_deg.to_radians(),
            ra: (ra_hours * 15.0).to_radians(),
        }
    }

    /// Right ascension in hours.
    pub fn ra_hours(&self) -> f64 {
        self.ra.to_degrees() / 15.0
    }

    /// Same position with right ascension folded into `[0, 2π)`.
    pub fn wrapped(self) -> Self {
        Self {
            dec: self.dec,
            ra: wrap_ra(self.ra),
        }
    }

    /// Small-angle separation, evaluating the RA foreshortening at `self.dec`.
    pub fn separation(&self, other: &SkyCoord) -> f64 {
        let d_dec = self.dec - other.dec;
        let d_ra = ra_delta(self.ra, other.ra) * self.dec.cos();
        (d_dec * d_dec + d_ra * d_ra).sqrt()
    }

    /// Whether both components are finite.
    pub fn is_finite(&self) -> bool {
        self.dec.is_finite() && self.ra.is_finite()
    }
}

/// Fold an RA into `[0, 2π)`.
pub fn wrap_ra(ra: f64) -> f64 {
    let wrapped = ra.rem_euclid(TAU);
    // rem_euclid can round up to exactly TAU for tiny negative inputs
    if wrapped >= TAU { 0.0 } else { wrapped }
}

/// Signed RA difference `a - b`, folded into `(-π, π]`.
pub fn ra_delta(a: f64, b: f64) -> f64 {
    let mut delta = (a - b).rem_euclid(TAU);
    if delta > PI {
        delta -= TAU;
    }
    delta
}

/// Shift `ra` by whole turns so that it lies within π of `reference`.
pub fn unwrap_ra_near(ra: f64, reference: f64) -> f64 {
    reference + ra_delta(ra, reference)
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn ra_delta_crosses_seam() {
        let a = SkyCoord::from_degrees_hours(0., 0.001);
        let b = SkyCoord::from_degrees_hours(0., 23.999);
        assert_abs_diff_eq!(ra_delta(a.ra, b.ra), (0.002f64 * 15.).to_radians(), epsilon = 1e-12);
        assert_abs_diff_eq!(ra_delta(b.ra, a.ra), -(0.002f64 * 15.).to_radians(), epsilon = 1e-12);
    }

    #[test]
    fn wrap_ra_range() {
        assert_abs_diff_eq!(wrap_ra(-0.1), TAU - 0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(wrap_ra(TAU + 0.1), 0.1, epsilon = 1e-12);
        assert_eq!(wrap_ra(-1e-20), 0.0);
    }

    #[test]
    fn unwrap_near_reference() {
        let near = unwrap_ra_near(TAU - 0.01, 0.02);
        assert_abs_diff_eq!(near, -0.01, epsilon = 1e-12);
    }

    #[test]
    fn separation_in_arcsec() {
        let a = SkyCoord::from_degrees_hours(60., 5.);
        let b = SkyCoord::new(a.dec, a.ra + arcsec_to_rad(10.));
        // 10 arcsec of RA at dec 60 is 5 arcsec on the sky
        assert_abs_diff_eq!(rad_to_arcsec(a.separation(&b)), 5., epsilon = 1e-6);
    }
}
