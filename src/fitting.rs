//! Least-squares refit of a bilinear model from the current matches.

use nalgebra::{Matrix4, Vector4};

use crate::sky::SkyCoord;
use crate::stars::{CatStar, ImageStar};
use crate::wcs::BilinearWcs;

/// Design row `(1, u, v, uv)` of a pixel, with `u` and `v` centered on the image
/// and scaled to unit extent.
fn design_row(u: f64, v: f64) -> Vector4<f64> {
    Vector4::new(1.0, u, v, u * v)
}

/// Fit declination and RA independently as `a + b·u + c·v + d·uv` over the
/// matched stars and evaluate both at the image corners.
///
/// Catalog stars whose position is not to be trusted are left out. Returns
/// `None` for fewer than four usable matches, a singular system or a result
/// that is not finite.
pub(crate) fn fit_bilinear(
    width: f64,
    height: f64,
    catalog: &[CatStar],
    image: &[ImageStar],
) -> Option<BilinearWcs> {
    let mut normal = Matrix4::<f64>::zeros();
    let mut dec_rhs = Vector4::<f64>::zeros();
    let mut ra_rhs = Vector4::<f64>::zeros();
    let mut rows = 0;

    for star in image {
        let Some(rank) = star.matched else {
            continue;
        };
        let target = &catalog[rank];
        if target.do_not_trust {
            continue;
        }
        let row = design_row(star.x / width - 0.5, star.y / height - 0.5);
        normal += row * row.transpose();
        dec_rhs += row * target.location.dec;
        ra_rhs += row * target.location.ra;
        rows += 1;
    }
    if rows < 4 {
        return None;
    }

    let lu = normal.lu();
    let dec = lu.solve(&dec_rhs)?;
    let ra = lu.solve(&ra_rhs)?;
    let at = |u: f64, v: f64| {
        let row = design_row(u, v);
        SkyCoord::new(row.dot(&dec), row.dot(&ra))
    };

    let wcs = BilinearWcs::from_corners(
        at(-0.5, 0.5),
        at(0.5, 0.5),
        at(-0.5, -0.5),
        at(0.5, -0.5),
        width,
        height,
    );
    wcs.is_finite().then_some(wcs)
}
