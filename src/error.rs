use thiserror::Error;

/// Reasons a correlation attempt can fail.
///
/// Ambiguous matches, missing catalog overlap, singular refits and
/// non-converging inverse transforms are handled inside the search and never
/// show up here.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CorrelateError {
    /// Not enough detected stars with a usable flux to seed a solution.
    #[error("too few usable stars: found {found}, need at least {required}")]
    TooFewStars {
        /// Usable detected stars.
        found: usize,
        /// Minimum needed to form two bootstrap pairs and a refit.
        required: usize,
    },

    /// The best candidate did not stand out from the match-count distribution.
    #[error("no significant solution: best candidate matched {best} stars ({sigma:.1} sigma)")]
    LowConfidence {
        /// Matches of the best candidate, 0 if no candidate survived.
        best: usize,
        /// Distance of the best candidate from the mean, in standard deviations.
        sigma: f64,
    },

    /// The catalog spans too many grid cells for the requested tolerance.
    #[error("catalog grid would need {cells} cells")]
    GridTooLarge {
        /// Cells the grid would have needed.
        cells: u64,
    },

    /// Tolerances must be finite and positive, and matching may not be looser than the grid.
    #[error("invalid tolerance: {0}")]
    InvalidTolerance(f64),

    /// The worker pool could not be started.
    #[error("failed to start worker pool: {0}")]
    WorkerPool(String),

    /// `WCSTYPE` held a value other than `SIMPLE` or `BILINEAR`.
    #[error("unknown WCSTYPE: {0}")]
    UnknownModelType(String),
}
