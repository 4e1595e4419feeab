//! Trial models from a single assumed correspondence of two star pairs.

use nalgebra::Vector2;

use crate::context::Context;
use crate::sky::{SkyCoord, ra_delta, rad_to_arcsec};
use crate::wcs::SimpleWcs;

/// Derive rotation and scale from an image pair and a catalog pair assumed to
/// be the same two stars, and anchor the model on the reference star.
///
/// The returned model maps `reference` exactly onto `cat_reference`.
/// Returns `None` if either pair is degenerate.
pub(crate) fn bootstrap(
    ctx: &Context,
    reference: (f64, f64),
    alternate: (f64, f64),
    cat_reference: SkyCoord,
    cat_alternate: SkyCoord,
) -> Option<SimpleWcs> {
    let pixel = Vector2::new(alternate.0 - reference.0, alternate.1 - reference.1);
    let sky = Vector2::new(
        ra_delta(cat_alternate.ra, cat_reference.ra) * ctx.cos_center_dec(),
        cat_alternate.dec - cat_reference.dec,
    );
    let pixel_length = pixel.norm();
    let sky_length = sky.norm();
    if !(pixel_length > 0.0 && sky_length > 0.0) {
        return None;
    }

    // counter-clockwise, from the sky into the camera frame
    let rotation = pixel.y.atan2(pixel.x) - sky.y.atan2(sky.x);
    let scale = rad_to_arcsec(sky_length) / pixel_length;
    if !(rotation.is_finite() && scale.is_finite()) {
        return None;
    }

    Some(SimpleWcs::anchored(
        reference,
        cat_reference,
        scale,
        rotation,
        ctx.width,
        ctx.height,
    ))
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;

    fn context() -> Context {
        Context::new(2000., 1500., SkyCoord::from_degrees_hours(33., 14.2))
    }

    #[test]
    fn reference_maps_exactly() {
        let ctx = context();
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..200 {
            let reference = (rng.random_range(0.0..2000.0), rng.random_range(0.0..1500.0));
            let alternate = (rng.random_range(0.0..2000.0), rng.random_range(0.0..1500.0));
            let cat_reference = SkyCoord::new(
                ctx.nominal_center.dec + rng.random_range(-0.01..0.01),
                ctx.nominal_center.ra + rng.random_range(-0.01..0.01),
            );
            let cat_alternate = SkyCoord::new(
                ctx.nominal_center.dec + rng.random_range(-0.01..0.01),
                ctx.nominal_center.ra + rng.random_range(-0.01..0.01),
            );
            let wcs = bootstrap(&ctx, reference, alternate, cat_reference, cat_alternate).unwrap();
            let sky = wcs.pixel_to_world(reference.0, reference.1);
            assert_abs_diff_eq!(sky.dec, cat_reference.dec, epsilon = 1e-12);
            assert_abs_diff_eq!(ra_delta(sky.ra, cat_reference.ra), 0., epsilon = 1e-12);
        }
    }

    #[test]
    fn recovers_rotation_and_scale() {
        let ctx = context();
        let truth = SimpleWcs::new(ctx.nominal_center, 1.5, 0.6, ctx.width, ctx.height);
        let (a, b) = ((400., 300.), (1210., 1050.));
        let wcs = bootstrap(
            &ctx,
            a,
            b,
            truth.pixel_to_world(a.0, a.1),
            truth.pixel_to_world(b.0, b.1),
        )
        .unwrap();
        assert_abs_diff_eq!(wcs.rotation(), 0.6, epsilon = 1e-6);
        assert_abs_diff_eq!(wcs.scale(), 1.5, epsilon = 1e-6);
        let far = wcs.pixel_to_world(1900., 100.);
        assert!(rad_to_arcsec(far.separation(&truth.pixel_to_world(1900., 100.))) < 0.05);
    }

    #[test]
    fn degenerate_pairs() {
        let ctx = context();
        let p = ctx.nominal_center;
        let q = SkyCoord::new(p.dec + 1e-4, p.ra);
        assert!(bootstrap(&ctx, (10., 10.), (10., 10.), p, q).is_none());
        assert!(bootstrap(&ctx, (10., 10.), (20., 10.), p, p).is_none());
    }
}
