//! Per-task exploration of bootstrap correspondences.

use log::debug;

use crate::context::Context;
use crate::fitting::fit_bilinear;
use crate::geometry::bootstrap;
use crate::grid::Grid;
use crate::matching::cross_match;
use crate::sky::arcsec_to_rad;
use crate::stars::{CatStar, ImageStar};
use crate::stats::Histogram;
use crate::wcs::CoordinateModel;

/// Grid cell size (arcsec).
pub const GRID_TOLERANCE_ARCSEC: f64 = 60.0;
/// Matcher tolerance in every stage and in the final commit (arcsec).
pub const MATCH_TOLERANCE_ARCSEC: f64 = 10.0;
/// Brightest detected points tried as bootstrap references.
pub const REFERENCE_CANDIDATES: usize = 10;
/// Brightest catalog points tried as reference and as alternate.
pub const CATALOG_CANDIDATES: usize = 40;
/// Detected points considered as alternates, counted from the brightest.
pub const ALTERNATE_LIMIT: usize = 40;
/// Detected points matched under the bootstrap model.
pub const COARSE_POOL: usize = 10;
/// Detected points matched after the first refit.
pub const MIDDLE_POOL: usize = 20;
/// A stage with fewer matches rejects the correspondence.
pub const MIN_MATCHES: usize = 4;
/// Required distance of the best match count from the mean, in standard deviations.
pub const ACCEPT_SIGMA: f64 = 4.0;

/// Tunables of the search.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct SearchParameters {
    pub grid_tolerance: f64,
    pub match_tolerance: f64,
    pub reference_candidates: usize,
    pub catalog_candidates: usize,
    pub alternate_limit: usize,
    pub coarse_pool: usize,
    pub middle_pool: usize,
    pub min_matches: usize,
    pub accept_sigma: f64,
}

impl Default for SearchParameters {
    fn default() -> Self {
        Self {
            grid_tolerance: arcsec_to_rad(GRID_TOLERANCE_ARCSEC),
            match_tolerance: arcsec_to_rad(MATCH_TOLERANCE_ARCSEC),
            reference_candidates: REFERENCE_CANDIDATES,
            catalog_candidates: CATALOG_CANDIDATES,
            alternate_limit: ALTERNATE_LIMIT,
            coarse_pool: COARSE_POOL,
            middle_pool: MIDDLE_POOL,
            min_matches: MIN_MATCHES,
            accept_sigma: ACCEPT_SIGMA,
        }
    }
}

/// A coordinate model and the number of stars it matched.
#[derive(Clone, Debug, PartialEq)]
pub struct Solution {
    /// Model the matches were counted with.
    pub model: CoordinateModel,
    /// Detected stars matched to a catalog star.
    pub matches: usize,
}

/// Read-only state shared by all tasks.
pub(crate) struct Search<'a> {
    pub ctx: &'a Context,
    pub grid: &'a Grid,
    pub parameters: &'a SearchParameters,
}

/// What a task reports back after its search.
#[derive(Clone, Debug, Default)]
pub(crate) struct TaskOutcome {
    pub best: Option<Solution>,
    pub histogram: Histogram,
}

/// One worker's assignment together with its private copies of the stars.
#[derive(Clone, Debug)]
pub(crate) struct SearchTask {
    pub id: usize,
    /// Image ranks used as bootstrap references.
    pub assignments: Vec<usize>,
    pub image: Vec<ImageStar>,
    pub catalog: Vec<CatStar>,
}

impl SearchTask {
    /// Try every correspondence seeded by the assigned references.
    pub fn run(mut self, search: &Search<'_>) -> TaskOutcome {
        let parameters = search.parameters;
        let cat_candidates = parameters.catalog_candidates.min(self.catalog.len());
        let alternate_limit = parameters.alternate_limit.min(self.image.len());

        let mut outcome = TaskOutcome::default();
        for reference in self.assignments.clone() {
            let ref_pixel = (self.image[reference].x, self.image[reference].y);
            for cat_reference in 0..cat_candidates {
                for alternate in reference + 1..alternate_limit {
                    let alt_pixel = (self.image[alternate].x, self.image[alternate].y);
                    for cat_alternate in (0..cat_candidates).filter(|&c| c != cat_reference) {
                        let Some(trial) = bootstrap(
                            search.ctx,
                            ref_pixel,
                            alt_pixel,
                            self.catalog[cat_reference].location,
                            self.catalog[cat_alternate].location,
                        ) else {
                            continue;
                        };

                        let (matches, model) = self.evaluate(search, trial.into());
                        outcome.histogram.record(matches);
                        if let Some(model) = model {
                            if outcome.best.as_ref().is_none_or(|b| matches > b.matches) {
                                outcome.best = Some(Solution { model, matches });
                            }
                        }
                    }
                }
            }
        }

        debug!(
            "Task {} tried {} correspondences, best matched {} stars.",
            self.id,
            outcome.histogram.total(),
            outcome.best.as_ref().map_or(0, |b| b.matches)
        );
        outcome
    }

    /// Take a bootstrap model through coarse matching and three refit/match rounds.
    ///
    /// Returns the match count of the last stage reached, plus the refined
    /// model if every stage kept at least the minimum number of matches.
    fn evaluate(
        &mut self,
        search: &Search<'_>,
        trial: CoordinateModel,
    ) -> (usize, Option<CoordinateModel>) {
        let parameters = search.parameters;
        let mut model = trial;
        let mut matches = self.match_stars(search, &model, Some(parameters.coarse_pool));
        if matches < parameters.min_matches {
            return (matches, None);
        }

        for pool in [Some(parameters.middle_pool), None, None] {
            let (width, height) = (search.ctx.width, search.ctx.height);
            let Some(refit) = fit_bilinear(width, height, &self.catalog, &self.image) else {
                return (0, None);
            };
            model = refit.into();
            matches = self.match_stars(search, &model, pool);
            if matches < parameters.min_matches {
                return (matches, None);
            }
        }

        (matches, Some(model))
    }

    fn match_stars(
        &mut self,
        search: &Search<'_>,
        model: &CoordinateModel,
        pool: Option<usize>,
    ) -> usize {
        cross_match(
            search.ctx,
            search.grid,
            model,
            &mut self.catalog,
            &mut self.image,
            pool,
            search.parameters.match_tolerance,
        )
    }
}
