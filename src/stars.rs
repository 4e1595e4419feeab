//! Detected and catalog star records.
//!
//! The public types are what drivers hand in and get back. Each search task
//! works on its own copies of the lightweight [`ImageStar`] and [`CatStar`]
//! records, which refer back to the caller's slices through an integer key.

use crate::sky::SkyCoord;

/// Roles a catalog star plays in photometry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Roles {
    /// Comparison star for differential photometry.
    pub comparison: bool,
    /// Check star, used to validate the comparison stars.
    pub check: bool,
    /// Measurements of this star are submitted.
    pub submit: bool,
}

/// A star of known position from the reference catalog.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CatalogPoint {
    /// Catalog designation.
    pub label: String,
    /// Catalog position.
    pub location: SkyCoord,
    /// Catalog magnitude, lower is brighter.
    pub magnitude: f64,
    /// Photometry roles.
    pub roles: Roles,
    /// The position is unreliable; the star is matched but never used for fitting.
    pub do_not_trust_position: bool,
}

impl CatalogPoint {
    /// Catalog star without roles.
    pub fn new(label: impl Into<String>, location: SkyCoord, magnitude: f64) -> Self {
        Self {
            label: label.into(),
            location,
            magnitude,
            ..Default::default()
        }
    }
}

/// Catalog identity copied onto a detected point by a committed match.
#[derive(Clone, Debug, PartialEq)]
pub struct Correlation {
    /// Label of the catalog star.
    pub label: String,
    /// Magnitude of the catalog star.
    pub magnitude: f64,
    /// Roles of the catalog star.
    pub roles: Roles,
    /// Distance between the transformed pixel position and the catalog position.
    pub residual_arcsec: f64,
}

/// A star found in the image by an external detector.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DetectedPoint {
    /// Pixel column.
    pub x: f64,
    /// Pixel row.
    pub y: f64,
    /// Background-subtracted counts. Points without a finite positive flux are ignored.
    pub flux: f64,
    /// Bright enough to seed a search, as judged by the detector.
    pub selected: bool,
    /// Sky position after a successful correlation. Catalog position if
    /// correlated, transformed pixel position otherwise.
    pub sky: Option<SkyCoord>,
    /// Catalog identity, if the star was correlated.
    pub correlation: Option<Correlation>,
}

impl DetectedPoint {
    /// Uncorrelated point.
    pub fn new(x: f64, y: f64, flux: f64) -> Self {
        Self {
            x,
            y,
            flux,
            ..Default::default()
        }
    }

    /// Whether the point can take part in the search.
    pub fn has_valid_flux(&self) -> bool {
        self.flux.is_finite() && self.flux > 0.0 && self.x.is_finite() && self.y.is_finite()
    }

    /// Instrumental magnitude.
    pub fn intensity(&self) -> f64 {
        -2.5 * self.flux.log10()
    }

    /// Whether a catalog star was assigned.
    pub fn is_correlated(&self) -> bool {
        self.correlation.is_some()
    }
}

/// Indices of the usable detected points, brightest first.
pub fn brightness_order(stars: &[DetectedPoint]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..stars.len())
        .filter(|&i| stars[i].has_valid_flux())
        .collect();
    order.sort_by(|&a, &b| stars[b].flux.total_cmp(&stars[a].flux));
    order
}

/// Indices of the catalog points, brightest (lowest magnitude) first.
pub fn magnitude_order(catalog: &[CatalogPoint]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..catalog.len()).collect();
    order.sort_by(|&a, &b| catalog[a].magnitude.total_cmp(&catalog[b].magnitude));
    order
}

/// A detected point as seen by one search task. Its index in the task's list is its rank.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct ImageStar {
    /// Index into the caller's detected points.
    pub key: usize,
    pub x: f64,
    pub y: f64,
    /// Rank of the catalog star this point is matched to.
    pub matched: Option<usize>,
    /// Squared distance to the matched catalog star (radians²).
    pub residual2: f64,
}

/// A catalog point as seen by one search task. Its index in the task's list is its rank.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct CatStar {
    /// Index into the caller's catalog.
    pub key: usize,
    /// Position with RA normalized by the grid.
    pub location: SkyCoord,
    pub do_not_trust: bool,
    /// Ranks of the image stars claiming this star.
    pub claims: Vec<usize>,
}

impl ImageStar {
    pub fn from_detected(stars: &[DetectedPoint], order: &[usize]) -> Vec<Self> {
        order
            .iter()
            .map(|&key| Self {
                key,
                x: stars[key].x,
                y: stars[key].y,
                matched: None,
                residual2: 0.0,
            })
            .collect()
    }
}

impl CatStar {
    pub fn from_catalog(
        catalog: &[CatalogPoint],
        order: &[usize],
        normalize: impl Fn(SkyCoord) -> SkyCoord,
    ) -> Vec<Self> {
        order
            .iter()
            .map(|&key| Self {
                key,
                location: normalize(catalog[key].location),
                do_not_trust: catalog[key].do_not_trust_position,
                claims: Vec::new(),
            })
            .collect()
    }
}
