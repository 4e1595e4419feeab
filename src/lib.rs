#![warn(missing_docs)]

//! Correlation of stars detected in a telescope image with a reference catalog. \
//! The result is a coordinate model mapping image pixels onto the sky, and the catalog
//! identity of every detected star the model brings onto a catalog star.
//!
//! Only an approximate pointing center and pixel scale are needed. The camera rotation
//! may be arbitrary.
//!
//! ## Interface
//! The central struct of this library is [`Correlator`]. It is created from a [`Context`]
//! describing the image and the priors, and tuned via `Correlator::with_*()` functions.
//! [`Correlator::correlate`] then searches for the model and writes the result onto the
//! detected points.
//!
//! Example:
//! ```rust,no_run
//! use starmatch::{CatalogPoint, Context, Correlator, DetectedPoint, SkyCoord};
//!
//! let context = Context::new(2048., 2048., SkyCoord::from_degrees_hours(22.5, 3.75))
//!     .with_pixel_scale(Some(1.52));
//! let mut stars: Vec<DetectedPoint> = Vec::new();
//! let catalog: Vec<CatalogPoint> = Vec::new();
//! match Correlator::new(context).with_match_tolerance(8.).correlate(&mut stars, &catalog) {
//!     Ok(alignment) => println!("{:?}", alignment.model()),
//!     Err(e) => eprintln!("{e}"),
//! }
//! ```
//!
//! ## Algorithm
//! Every pairing of two bright detected stars with two bright catalog stars yields a
//! trial model. The trial is matched against the catalog, refined by a least-squares
//! bilinear fit and matched again on a growing number of stars; attempts falling
//! below a minimum number of matches are dropped early. The match counts of all
//! attempts form a histogram, and the best attempt is only accepted if it stands out
//! of that histogram by [`ACCEPT_SIGMA`] standard deviations.
//!
//! The attempts are split across a fixed number of tasks, which run in parallel
//! with the `parallel` feature.
//!
//! ## Parameters
//! - `grid_tolerance`: Cell size of the catalog [`Grid`]. Bounds the match tolerance.
//! - `match_tolerance`: Maximum distance between a transformed detected star and its catalog star.
//! - `reference_candidates`, `catalog_candidates`, `alternate_limit`: Size of the
//!   combinatorial search.
//! - `pools`: Number of detected stars matched in the first two stages.
//! - `min_matches`: Matches a stage must keep for the attempt to continue.
//! - `accept_sigma`: Significance required to accept the best attempt.

pub(crate) mod context;
pub(crate) mod correlator;
pub(crate) mod error;
pub(crate) mod fitting;
pub(crate) mod geometry;
pub(crate) mod grid;
pub(crate) mod header;
pub(crate) mod matching;
pub(crate) mod pipeline;
pub(crate) mod sky;
pub(crate) mod stars;
pub(crate) mod stats;
pub mod wcs;

pub use context::{Context, DEFAULT_PIXEL_SCALE_ARCSEC, DEFAULT_WORKERS};
pub use correlator::{Alignment, Correlator};
pub use error::CorrelateError;
pub use grid::{Grid, MAX_GRID_CELLS, Neighbor, SkyBounds};
pub use header::{HeaderStore, WCSTYPE};
pub use matching::FOOTPRINT_MARGIN;
pub use pipeline::{
    ACCEPT_SIGMA, ALTERNATE_LIMIT, CATALOG_CANDIDATES, COARSE_POOL, GRID_TOLERANCE_ARCSEC,
    MATCH_TOLERANCE_ARCSEC, MIDDLE_POOL, MIN_MATCHES, REFERENCE_CANDIDATES, Solution,
};
pub use sky::{ARCSEC, SkyCoord, arcsec_to_rad, ra_delta, rad_to_arcsec, wrap_ra};
pub use stars::{CatalogPoint, Correlation, DetectedPoint, Roles};
pub use stats::{Histogram, ResidualStatistics};
pub use wcs::{BilinearWcs, CoordinateModel, SimpleWcs};
