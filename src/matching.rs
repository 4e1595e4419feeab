//! Cross matching of image stars against the catalog under a coordinate model.

use crate::context::Context;
use crate::grid::Grid;
use crate::sky::rad_to_arcsec;
use crate::stars::{CatStar, CatalogPoint, Correlation, DetectedPoint, ImageStar};
use crate::wcs::CoordinateModel;

/// Margin around the image footprint when restricting the catalog.
pub const FOOTPRINT_MARGIN: f64 = 1.02;

/// Highest catalog rank worth querying for a pool of `pool` image stars.
///
/// Walks the catalog in rank order and counts the stars falling on the image
/// footprint of `model`. Once that count exceeds 5/4 of the pool, fainter
/// catalog stars are no longer considered. If it never does, the whole
/// catalog is.
fn catalog_limit(
    ctx: &Context,
    grid: &Grid,
    model: &CoordinateModel,
    catalog: &[CatStar],
    pool: usize,
) -> usize {
    let center = grid.normalize(model.center());
    let cos_dec = center.dec.cos();
    let half_height = FOOTPRINT_MARGIN * ctx.height_rad() / 2.0;
    let half_width = FOOTPRINT_MARGIN * ctx.width_rad() / 2.0;
    let wanted = pool * 5 / 4;

    let mut on_image = 0;
    for (rank, star) in catalog.iter().enumerate() {
        let d_dec = (star.location.dec - center.dec).abs();
        let d_ra = ((star.location.ra - center.ra) * cos_dec).abs();
        if d_dec < half_height && d_ra < half_width {
            on_image += 1;
            if on_image > wanted {
                return rank;
            }
        }
    }
    catalog.len().saturating_sub(1)
}

/// Match the `pool` brightest image stars (all if `None`) against the catalog.
///
/// Every image star is transformed onto the sky and paired with the nearest
/// catalog star within `tolerance` (radians). A catalog star claimed by
/// several image stars keeps only the closest one. Returns the number of
/// surviving pairs; the pairing itself is left in `image` and `catalog`.
pub(crate) fn cross_match(
    ctx: &Context,
    grid: &Grid,
    model: &CoordinateModel,
    catalog: &mut [CatStar],
    image: &mut [ImageStar],
    pool: Option<usize>,
    tolerance: f64,
) -> usize {
    for star in image.iter_mut() {
        star.matched = None;
    }
    for star in catalog.iter_mut() {
        star.claims.clear();
    }
    if catalog.is_empty() {
        return 0;
    }

    let pool = pool.map_or(image.len(), |p| p.min(image.len()));
    let max_rank = catalog_limit(ctx, grid, model, catalog, pool);

    let mut count = 0;
    for (rank, star) in image[..pool].iter_mut().enumerate() {
        let sky = model.pixel_to_world(star.x, star.y);
        if let Some(neighbor) = grid.find_nearest(sky, tolerance, max_rank) {
            star.matched = Some(neighbor.rank);
            star.residual2 = neighbor.distance2;
            catalog[neighbor.rank].claims.push(rank);
            count += 1;
        }
    }

    for star in catalog.iter_mut().filter(|s| s.claims.len() > 1) {
        let mut winner = star.claims[0];
        for &claim in &star.claims[1..] {
            if image[claim].residual2 < image[winner].residual2 {
                winner = claim;
            }
        }
        for &claim in &star.claims {
            if claim != winner {
                image[claim].matched = None;
                count -= 1;
            }
        }
        star.claims = vec![winner];
    }

    count
}

/// Write the pairing found by [`cross_match`] back onto the caller's stars.
///
/// Correlated stars receive the catalog identity and position. Every other
/// detected point gets the position `model` maps it to.
pub(crate) fn commit(
    model: &CoordinateModel,
    catalog_points: &[CatalogPoint],
    catalog: &[CatStar],
    image: &[ImageStar],
    stars: &mut [DetectedPoint],
) {
    for star in stars.iter_mut() {
        star.sky = Some(model.pixel_to_world(star.x, star.y));
        star.correlation = None;
    }
    for image_star in image {
        let Some(rank) = image_star.matched else {
            continue;
        };
        let source = &catalog_points[catalog[rank].key];
        let star = &mut stars[image_star.key];
        star.sky = Some(source.location);
        star.correlation = Some(Correlation {
            label: source.label.clone(),
            magnitude: source.magnitude,
            roles: source.roles,
            residual_arcsec: rad_to_arcsec(image_star.residual2.sqrt()),
        });
    }
}
