//! Uniform bucket grid over catalog positions for bounded nearest-neighbor queries.

use std::f64::consts::{PI, TAU};

use itertools::{Itertools, MinMaxResult};
use log::debug;

use crate::error::CorrelateError;
use crate::sky::{SkyCoord, ra_delta, wrap_ra};

/// Upper limit on the number of cells a grid may allocate.
pub const MAX_GRID_CELLS: u64 = 1 << 24;

/// Declination/RA bounding box of the gridded points, RA normalized.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SkyBounds {
    /// Southernmost declination.
    pub min_dec: f64,
    /// Northernmost declination.
    pub max_dec: f64,
    /// Smallest normalized RA. Negative when the points straddle 0h.
    pub min_ra: f64,
    /// Largest normalized RA.
    pub max_ra: f64,
}

/// Result of a grid query.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Neighbor {
    /// Rank (index into the gridded slice) of the closest point.
    pub rank: usize,
    /// Squared small-angle distance in radians².
    pub distance2: f64,
}

#[derive(Clone, Copy, Debug)]
struct Entry {
    rank: usize,
    location: SkyCoord,
}

/// Grid of catalog positions.
///
/// Cells are `tolerance` high in declination and `tolerance / cos(dec)` wide in
/// RA, so a query with a tolerance no larger than the build tolerance only has
/// to look at the 3x3 cells around the query point. A grid belongs to the
/// slice it was built from: the ranks it returns index into that slice.
#[derive(Clone, Debug)]
pub struct Grid {
    wraparound: bool,
    bounds: SkyBounds,
    ra_center: f64,
    cos_dec: f64,
    dec_incr: f64,
    ra_incr: f64,
    num_dec_cells: usize,
    num_ra_cells: usize,
    cells: Vec<Vec<Entry>>,
}

fn min_max(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    match values.minmax_by(f64::total_cmp) {
        MinMaxResult::NoElements => None,
        MinMaxResult::OneElement(v) => Some((v, v)),
        MinMaxResult::MinMax(min, max) => Some((min, max)),
    }
}

/// RA folded into `[0, 2π)`, then moved by one turn if that brings it within π of `reference`.
fn fold_ra(ra: f64, reference: f64) -> f64 {
    let ra = wrap_ra(ra);
    if ra - reference > PI {
        ra - TAU
    } else if reference - ra > PI {
        ra + TAU
    } else {
        ra
    }
}

impl Grid {
    /// Build a grid over `locations`, whose index is taken as each point's rank.
    pub fn new(locations: &[SkyCoord], tolerance: f64) -> Result<Self, CorrelateError> {
        if !(tolerance.is_finite() && tolerance > 0.0) {
            return Err(CorrelateError::InvalidTolerance(tolerance));
        }

        let (min_dec, max_dec) = min_max(locations.iter().map(|l| l.dec)).unwrap_or_default();
        let (min_ra, max_ra) =
            min_max(locations.iter().map(|l| wrap_ra(l.ra))).unwrap_or_default();

        // a catalog straddling 0h looks like it spans most of the sky
        let wraparound = max_ra - min_ra > PI;
        let ra_center = if wraparound {
            let folded = locations.iter().map(|l| {
                let ra = wrap_ra(l.ra);
                if ra > PI { ra - TAU } else { ra }
            });
            let (min_ra, max_ra) = min_max(folded).unwrap_or_default();
            (min_ra + max_ra) / 2.0
        } else {
            (min_ra + max_ra) / 2.0
        };

        // bounds come from the stored values so every point lands inside its own grid
        let normalized: Vec<SkyCoord> = locations
            .iter()
            .map(|l| SkyCoord::new(l.dec, fold_ra(l.ra, ra_center)))
            .collect();
        let (min_ra, max_ra) = min_max(normalized.iter().map(|l| l.ra)).unwrap_or_default();

        let cos_dec = ((max_dec + min_dec) / 2.0).cos();
        let dec_incr = tolerance;
        let ra_incr = tolerance / cos_dec;
        let dec_cells = ((max_dec - min_dec) / dec_incr).floor() + 1.0;
        let ra_cells = if ra_incr.is_finite() {
            ((max_ra - min_ra) / ra_incr).floor() + 1.0
        } else {
            1.0
        };
        let total = dec_cells * ra_cells;
        if !total.is_finite() || total > MAX_GRID_CELLS as f64 {
            return Err(CorrelateError::GridTooLarge {
                cells: if total.is_finite() { total as u64 } else { u64::MAX },
            });
        }

        let mut grid = Self {
            wraparound,
            bounds: SkyBounds {
                min_dec,
                max_dec,
                min_ra,
                max_ra,
            },
            ra_center,
            cos_dec,
            dec_incr,
            ra_incr,
            num_dec_cells: dec_cells as usize,
            num_ra_cells: ra_cells as usize,
            cells: vec![Vec::new(); total as usize],
        };

        for (rank, location) in normalized.into_iter().enumerate() {
            let (dec, ra) = grid.cell_coords(&location);
            let dec = dec.clamp(0, grid.num_dec_cells as i64 - 1);
            let ra = ra.clamp(0, grid.num_ra_cells as i64 - 1);
            if let Some(cell) = grid.cell_index(dec, ra) {
                grid.cells[cell].push(Entry { rank, location });
            }
        }
        debug!(
            "Grid has {} x {} cells, {} empty. Wraparound: {}.",
            grid.num_dec_cells,
            grid.num_ra_cells,
            grid.cells.iter().filter(|c| c.is_empty()).count(),
            grid.wraparound
        );

        Ok(grid)
    }

    /// Whether the gridded points straddle RA 0h.
    pub fn wraparound(&self) -> bool {
        self.wraparound
    }

    /// Bounding box of the stored, normalized positions.
    pub fn bounds(&self) -> SkyBounds {
        self.bounds
    }

    /// Shift RA by whole turns into the grid's seamless range.
    ///
    /// Gridded points are stored exactly as this returns them.
    pub fn normalize(&self, location: SkyCoord) -> SkyCoord {
        SkyCoord::new(location.dec, fold_ra(location.ra, self.ra_center))
    }

    /// Squared small-angle distance, with RA foreshortened at the grid's mean declination.
    pub fn distance2(&self, a: &SkyCoord, b: &SkyCoord) -> f64 {
        let d_dec = a.dec - b.dec;
        let d_ra = ra_delta(a.ra, b.ra) * self.cos_dec;
        d_dec * d_dec + d_ra * d_ra
    }

    fn cell_coords(&self, location: &SkyCoord) -> (i64, i64) {
        let dec = ((location.dec - self.bounds.min_dec) / self.dec_incr).floor();
        let ra = if self.ra_incr.is_finite() {
            ((location.ra - self.bounds.min_ra) / self.ra_incr).floor()
        } else {
            0.0
        };
        (dec as i64, ra as i64)
    }

    fn cell_index(&self, dec: i64, ra: i64) -> Option<usize> {
        let in_range = (0..self.num_dec_cells as i64).contains(&dec)
            && (0..self.num_ra_cells as i64).contains(&ra);
        in_range.then(|| ra as usize + dec as usize * self.num_ra_cells)
    }

    /// Closest point of rank at most `max_rank` within `tolerance` (radians) of `location`.
    ///
    /// `tolerance` must not exceed the tolerance the grid was built with.
    pub fn find_nearest(
        &self,
        location: SkyCoord,
        tolerance: f64,
        max_rank: usize,
    ) -> Option<Neighbor> {
        let location = self.normalize(location);
        let (dec_i, ra_i) = self.cell_coords(&location);

        let mut closest: Option<Neighbor> = None;
        for dec in dec_i - 1..=dec_i + 1 {
            for ra in ra_i - 1..=ra_i + 1 {
                let Some(cell) = self.cell_index(dec, ra) else {
                    continue;
                };
                for entry in &self.cells[cell] {
                    if entry.rank > max_rank {
                        continue;
                    }
                    let distance2 = self.distance2(&location, &entry.location);
                    if closest.is_none_or(|c| distance2 < c.distance2) {
                        closest = Some(Neighbor {
                            rank: entry.rank,
                            distance2,
                        });
                    }
                }
            }
        }
        closest.filter(|c| c.distance2 <= tolerance * tolerance)
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;
    use crate::sky::arcsec_to_rad;

    fn brute_force(
        grid: &Grid,
        locations: &[SkyCoord],
        query: SkyCoord,
        tolerance: f64,
        max_rank: usize,
    ) -> Option<Neighbor> {
        locations
            .iter()
            .enumerate()
            .filter(|(rank, _)| *rank <= max_rank)
            .map(|(rank, l)| Neighbor {
                rank,
                distance2: grid.distance2(&grid.normalize(query), &grid.normalize(*l)),
            })
            .min_by(|a, b| a.distance2.total_cmp(&b.distance2))
            .filter(|n| n.distance2 <= tolerance * tolerance)
    }

    fn field(rng: &mut StdRng, center: SkyCoord, radius: f64, n: usize) -> Vec<SkyCoord> {
        (0..n)
            .map(|_| {
                let dec = center.dec + rng.random_range(-radius..radius);
                let ra = center.ra + rng.random_range(-radius..radius) / dec.cos();
                SkyCoord::new(dec, wrap_ra(ra))
            })
            .collect()
    }

    #[test]
    fn matches_linear_scan() {
        let mut rng = StdRng::seed_from_u64(3);
        let grid_tol = arcsec_to_rad(60.);
        for center in [
            SkyCoord::from_degrees_hours(25., 6.),
            SkyCoord::from_degrees_hours(-70., 13.),
            SkyCoord::from_degrees_hours(5., 0.),
            SkyCoord::from_degrees_hours(48., 23.99),
        ] {
            let locations = field(&mut rng, center, 0.5f64.to_radians(), 400);
            let grid = Grid::new(&locations, grid_tol).unwrap();
            for _ in 0..500 {
                let query = field(&mut rng, center, 0.55f64.to_radians(), 1)[0];
                let tolerance = grid_tol * rng.random_range(0.1..1.0);
                let max_rank = rng.random_range(0..locations.len());
                assert_eq!(
                    grid.find_nearest(query, tolerance, max_rank),
                    brute_force(&grid, &locations, query, tolerance, max_rank)
                );
            }
        }
    }

    #[test]
    fn every_point_finds_itself() {
        let mut rng = StdRng::seed_from_u64(11);
        let pair = vec![
            SkyCoord::from_degrees_hours(10., 23.999),
            SkyCoord::from_degrees_hours(10., 0.001),
        ];
        let catalogs = [
            pair,
            field(&mut rng, SkyCoord::from_degrees_hours(30., 4.), 0.3f64.to_radians(), 200),
            field(&mut rng, SkyCoord::from_degrees_hours(-45., 0.), 0.3f64.to_radians(), 200),
            field(&mut rng, SkyCoord::from_degrees_hours(60., 12.), 0.3f64.to_radians(), 200),
        ];
        for locations in catalogs {
            let tolerance = arcsec_to_rad(200.);
            let grid = Grid::new(&locations, tolerance).unwrap();
            let bounds = grid.bounds();
            for (rank, location) in locations.iter().enumerate() {
                let stored = grid.normalize(*location);
                assert!(bounds.min_ra <= stored.ra && stored.ra <= bounds.max_ra);

                let found = grid.find_nearest(*location, tolerance, rank).unwrap();
                assert_eq!(found.rank, rank);
                assert_eq!(found.distance2, 0.);
            }
        }
    }

    #[test]
    fn seam_neighbor_found() {
        let locations = [
            SkyCoord::from_degrees_hours(10., 23.999),
            SkyCoord::from_degrees_hours(10., 0.001),
        ];
        let grid = Grid::new(&locations, arcsec_to_rad(200.)).unwrap();
        assert!(grid.wraparound());

        let neighbor = grid
            .find_nearest(SkyCoord::from_degrees_hours(10., 0.001), arcsec_to_rad(200.), 0)
            .unwrap();
        assert_eq!(neighbor.rank, 0);
        // 0.002h of RA is 108 arcsec, foreshortened by cos(10 deg)
        let expected = arcsec_to_rad(108.) * 10f64.to_radians().cos();
        assert!((neighbor.distance2.sqrt() - expected).abs() < arcsec_to_rad(0.01));
    }

    #[test]
    fn empty_and_distant_queries() {
        let empty = Grid::new(&[], arcsec_to_rad(60.)).unwrap();
        assert_eq!(empty.find_nearest(SkyCoord::new(0.1, 0.1), arcsec_to_rad(10.), 10), None);

        let locations = [SkyCoord::new(0.5, 2.0), SkyCoord::new(0.5001, 2.0001)];
        let grid = Grid::new(&locations, arcsec_to_rad(60.)).unwrap();
        assert_eq!(grid.find_nearest(SkyCoord::new(-0.5, 5.0), arcsec_to_rad(60.), 10), None);
        let nearest = grid.find_nearest(SkyCoord::new(0.5, 2.0), arcsec_to_rad(1.), 1);
        assert_eq!(nearest.map(|n| n.rank), Some(0));
    }

    #[test]
    fn rank_cutoff() {
        let locations = [SkyCoord::new(0.3, 1.0), SkyCoord::new(0.3, 1.0 + arcsec_to_rad(1.))];
        let grid = Grid::new(&locations, arcsec_to_rad(60.)).unwrap();
        let query = SkyCoord::new(0.3, 1.0 + arcsec_to_rad(1.));
        assert_eq!(grid.find_nearest(query, arcsec_to_rad(10.), 1).map(|n| n.rank), Some(1));
        assert_eq!(grid.find_nearest(query, arcsec_to_rad(10.), 0).map(|n| n.rank), Some(0));
    }

    #[test]
    fn construction_errors() {
        assert_eq!(
            Grid::new(&[SkyCoord::default()], 0.).unwrap_err(),
            CorrelateError::InvalidTolerance(0.)
        );
        let wide = [SkyCoord::new(-1.0, 0.5), SkyCoord::new(1.0, 2.5)];
        assert!(matches!(
            Grid::new(&wide, 1e-9),
            Err(CorrelateError::GridTooLarge { .. })
        ));
    }
}
