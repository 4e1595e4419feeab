//! Search orchestration and acceptance of a solution.

use log::{debug, info};

use crate::context::Context;
use crate::error::CorrelateError;
use crate::grid::Grid;
use crate::matching::{commit, cross_match};
use crate::pipeline::{Search, SearchParameters, SearchTask, Solution, TaskOutcome};
use crate::sky::{SkyCoord, arcsec_to_rad};
use crate::stars::{
    CatStar, CatalogPoint, DetectedPoint, ImageStar, brightness_order, magnitude_order,
};
use crate::stats::{Histogram, ResidualStatistics};
use crate::wcs::CoordinateModel;

/// An accepted astrometric solution.
#[derive(Clone, Debug, PartialEq)]
pub struct Alignment {
    /// The best model of the search and the matches it achieved there.
    pub solution: Solution,
    /// Distance of the best match count from the mean of all attempts, in standard deviations.
    pub significance: f64,
    /// Number of stars correlated by the final, unrestricted match.
    pub correlated: usize,
    /// Residuals of the correlated stars, if there are any.
    pub residuals: Option<ResidualStatistics>,
    /// Match counts of every attempted correspondence.
    pub histogram: Histogram,
}

impl Alignment {
    /// The accepted coordinate model.
    pub fn model(&self) -> &CoordinateModel {
        &self.solution.model
    }
}

/// Entry point of the correlation.
///
/// Create with [`Correlator::new`] and adjust the search with the `with_*` functions.
/// All tolerances are given in arcsec.
#[derive(Clone, Debug)]
pub struct Correlator {
    context: Context,
    parameters: SearchParameters,
}

impl Correlator {
    /// Create a new instance using the default search parameters.
    /// Correlator with the default search parameters.
    pub fn new(context: Context) -> Self {
        Self {
            context,
            parameters: SearchParameters::default(),
        }
    }

    /// Image description and priors.
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Set the grid cell size.
    pub fn with_grid_tolerance(mut self, arcsec: f64) -> Self {
        self.parameters.grid_tolerance = arcsec_to_rad(arcsec);
        self
    }

    /// Set the match tolerance. Must not exceed the grid tolerance.
    pub fn with_match_tolerance(mut self, arcsec: f64) -> Self {
        self.parameters.match_tolerance = arcsec_to_rad(arcsec);
        self
    }

    /// Set the number of brightest detected points tried as references.
    pub fn with_reference_candidates(mut self, count: usize) -> Self {
        self.parameters.reference_candidates = count;
        self
    }

    /// Set the number of brightest catalog points tried for each detected point.
    pub fn with_catalog_candidates(mut self, count: usize) -> Self {
        self.parameters.catalog_candidates = count;
        self
    }

    /// Set the rank below which detected points are tried as alternates.
    pub fn with_alternate_limit(mut self, limit: usize) -> Self {
        self.parameters.alternate_limit = limit;
        self
    }

    /// Set the number of detected points matched under the bootstrap model and after the
    /// first refit.
    pub fn with_pools(mut self, coarse: usize, middle: usize) -> Self {
        self.parameters.coarse_pool = coarse;
        self.parameters.middle_pool = middle;
        self
    }

    /// Set the minimum number of matches a stage must keep.
    pub fn with_min_matches(mut self, min_matches: usize) -> Self {
        self.parameters.min_matches = min_matches;
        self
    }

    /// Set the significance required for acceptance, in standard deviations.
    pub fn with_accept_sigma(mut self, sigma: f64) -> Self {
        self.parameters.accept_sigma = sigma;
        self
    }

    /// Set the number of search tasks.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.context = self.context.with_workers(workers);
        self
    }

    /// Find the coordinate model of the image and correlate `stars` with `catalog`.
    ///
    /// On success, every detected point receives a sky position and the
    /// correlated ones additionally the catalog identity. On failure `stars`
    /// is left untouched.
    pub fn correlate(
        &self,
        stars: &mut [DetectedPoint],
        catalog: &[CatalogPoint],
    ) -> Result<Alignment, CorrelateError> {
        let parameters = &self.parameters;
        if parameters.match_tolerance > parameters.grid_tolerance {
            return Err(CorrelateError::InvalidTolerance(parameters.match_tolerance));
        }

        let image_order = brightness_order(stars);
        if image_order.len() < parameters.min_matches {
            return Err(CorrelateError::TooFewStars {
                found: image_order.len(),
                required: parameters.min_matches,
            });
        }

        let catalog_order = magnitude_order(catalog);
        let locations: Vec<SkyCoord> = catalog_order.iter().map(|&i| catalog[i].location).collect();
        let grid = Grid::new(&locations, parameters.grid_tolerance)?;
        info!(
            "Correlating {} image stars with {} catalog stars.",
            image_order.len(),
            catalog_order.len()
        );

        let image = ImageStar::from_detected(stars, &image_order);
        let cat_stars = CatStar::from_catalog(catalog, &catalog_order, |l| grid.normalize(l));
        let search = Search {
            ctx: &self.context,
            grid: &grid,
            parameters,
        };

        let tasks = self.tasks(&image, &cat_stars);
        info!("Starting {} search tasks.", tasks.len());
        let outcomes = run_tasks(tasks, &search, self.context.workers)?;

        let mut histogram = Histogram::new();
        let mut best: Option<Solution> = None;
        for outcome in outcomes {
            histogram.merge(&outcome.histogram);
            if let Some(candidate) = outcome.best {
                if best.as_ref().is_none_or(|b| candidate.matches > b.matches) {
                    best = Some(candidate);
                }
            }
        }

        let (mean, stddev) = (histogram.mean(), histogram.stddev());
        debug!(
            "{} correspondences tried, mean {mean:.3} matches, stddev {stddev:.3}.",
            histogram.total()
        );
        let Some(solution) = best else {
            return Err(CorrelateError::LowConfidence {
                best: 0,
                sigma: 0.0,
            });
        };
        let significance = histogram.sigma_of(solution.matches);
        if !histogram.stands_out(solution.matches, parameters.accept_sigma) {
            info!(
                "Best solution matched {} stars at {significance:.2} sigma; rejected.",
                solution.matches
            );
            return Err(CorrelateError::LowConfidence {
                best: solution.matches,
                sigma: significance,
            });
        }

        let (rotation, scale) = solution.model.rotation_and_scale();
        info!(
            "Accepted {} matches ({significance:.2} sigma): rotation {:.3} deg, scale {scale:.4}.",
            solution.matches,
            rotation.to_degrees()
        );

        let mut image = image;
        let mut cat_stars = cat_stars;
        let correlated = cross_match(
            &self.context,
            &grid,
            &solution.model,
            &mut cat_stars,
            &mut image,
            None,
            parameters.match_tolerance,
        );
        commit(&solution.model, catalog, &cat_stars, &image, stars);

        let residuals: Vec<f64> = stars
            .iter()
            .filter_map(|s| s.correlation.as_ref())
            .map(|c| c.residual_arcsec)
            .collect();
        let residuals = ResidualStatistics::from_residuals(&residuals);
        if let Some(r) = &residuals {
            info!(
                "{correlated} stars correlated. Residual avg {:.3}, median {:.3}, sd {:.3} arcsec.",
                r.average, r.median, r.stddev
            );
        }

        Ok(Alignment {
            solution,
            significance,
            correlated,
            residuals,
            histogram,
        })
    }

    /// Deal the reference candidates round-robin onto the workers, each with its own copies
    /// of the stars.
    fn tasks(&self, image: &[ImageStar], catalog: &[CatStar]) -> Vec<SearchTask> {
        let workers = self.context.workers.max(1);
        let references = self.parameters.reference_candidates.min(image.len());
        (0..workers)
            .map(|id| SearchTask {
                id,
                assignments: (id..references).step_by(workers).collect(),
                image: image.to_vec(),
                catalog: catalog.to_vec(),
            })
            .filter(|task| !task.assignments.is_empty())
            .collect()
    }
}

#[cfg(feature = "parallel")]
fn run_tasks(
    tasks: Vec<SearchTask>,
    search: &Search<'_>,
    workers: usize,
) -> Result<Vec<TaskOutcome>, CorrelateError> {
    use rayon::prelude::*;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build()
        .map_err(|e| CorrelateError::WorkerPool(e.to_string()))?;
    Ok(pool.install(|| tasks.into_par_iter().map(|task| task.run(search)).collect()))
}

#[cfg(not(feature = "parallel"))]
fn run_tasks(
    tasks: Vec<SearchTask>,
    search: &Search<'_>,
    _workers: usize,
) -> Result<Vec<TaskOutcome>, CorrelateError> {
    Ok(tasks.into_iter().map(|task| task.run(search)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn correlator(workers: usize) -> Correlator {
        Correlator::new(Context::new(100., 100., SkyCoord::default()).with_workers(workers))
    }

    #[test]
    fn round_robin_assignment() {
        let image: Vec<ImageStar> = (0..30)
            .map(|key| ImageStar {
                key,
                x: 0.,
                y: 0.,
                matched: None,
                residual2: 0.,
            })
            .collect();
        let tasks = correlator(4).tasks(&image, &[]);
        let assignments: Vec<Vec<usize>> = tasks.iter().map(|t| t.assignments.clone()).collect();
        assert_eq!(
            assignments,
            vec![vec![0, 4, 8], vec![1, 5, 9], vec![2, 6], vec![3, 7]]
        );

        // idle workers get no task
        let tasks = correlator(16).tasks(&image[..3], &[]);
        assert_eq!(tasks.len(), 3);
        assert!(tasks.iter().all(|t| t.image.len() == 3));
    }

    #[test]
    fn rejects_loose_match_tolerance() {
        let mut stars = vec![DetectedPoint::new(1., 1., 1.); 5];
        let result = correlator(1)
            .with_grid_tolerance(5.)
            .correlate(&mut stars, &[]);
        assert!(matches!(result, Err(CorrelateError::InvalidTolerance(_))));
    }

    #[test]
    fn too_few_usable_stars() {
        let mut stars = vec![
            DetectedPoint::new(1., 1., 10.),
            DetectedPoint::new(2., 1., 0.),
            DetectedPoint::new(3., 1., 10.),
            DetectedPoint::new(4., 1., 10.),
        ];
        assert_eq!(
            correlator(2).correlate(&mut stars, &[]),
            Err(CorrelateError::TooFewStars {
                found: 3,
                required: 4
            })
        );
        assert!(stars.iter().all(|s| s.sky.is_none()));
    }

    #[test]
    fn empty_catalog_finds_nothing() {
        let mut stars: Vec<DetectedPoint> = (0..6)
            .map(|i| DetectedPoint::new(10. * i as f64, 5. * i as f64, 100. - i as f64))
            .collect();
        assert_eq!(
            correlator(2).correlate(&mut stars, &[]),
            Err(CorrelateError::LowConfidence {
                best: 0,
                sigma: 0.0
            })
        );
    }
}
