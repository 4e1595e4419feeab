//! Match-count histograms and residual statistics.

use itertools::Itertools;

/// Number of correspondence attempts per resulting match count.
///
/// The histogram of all attempts forms the null distribution against which
/// the best attempt is tested.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Histogram {
    bins: Vec<u64>,
}

impl Histogram {
    /// Empty histogram.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one attempt that ended with `matches` matches.
    pub fn record(&mut self, matches: usize) {
        if self.bins.len() <= matches {
            self.bins.resize(matches + 1, 0);
        }
        self.bins[matches] += 1;
    }

    /// Add every bin of `other` to this histogram.
    pub fn merge(&mut self, other: &Histogram) {
        if self.bins.len() < other.bins.len() {
            self.bins.resize(other.bins.len(), 0);
        }
        for (bin, count) in self.bins.iter_mut().zip(&other.bins) {
            *bin += count;
        }
    }

    /// Attempts per match count, indexed by match count.
    pub fn bins(&self) -> &[u64] {
        &self.bins
    }

    /// Number of attempts recorded.
    pub fn total(&self) -> u64 {
        self.bins.iter().sum()
    }

    /// Mean match count, 0 for an empty histogram.
    pub fn mean(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        let sum: f64 = self
            .bins
            .iter()
            .enumerate()
            .map(|(matches, &n)| matches as f64 * n as f64)
            .sum();
        sum / total as f64
    }

    /// Population standard deviation.
    pub fn stddev(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        let mean = self.mean();
        let sum: f64 = self
            .bins
            .iter()
            .enumerate()
            .map(|(matches, &n)| n as f64 * (matches as f64 - mean).powi(2))
            .sum();
        (sum / total as f64).sqrt()
    }

    /// Distance of `matches` from the mean, in standard deviations.
    pub fn sigma_of(&self, matches: usize) -> f64 {
        let excess = matches as f64 - self.mean();
        let stddev = self.stddev();
        if stddev > 0.0 {
            excess / stddev
        } else if excess > 0.0 {
            f64::INFINITY
        } else {
            0.0
        }
    }

    /// Whether `matches` reaches at least `sigma` standard deviations above the mean.
    pub fn stands_out(&self, matches: usize, sigma: f64) -> bool {
        matches as f64 >= self.mean() + sigma * self.stddev()
    }
}

/// Summary of the sky residuals of the correlated stars, in arcsec.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResidualStatistics {
    /// Number of correlated stars.
    pub count: usize,
    /// Mean residual.
    pub average: f64,
    /// Median residual.
    pub median: f64,
    /// Population standard deviation.
    pub stddev: f64,
}

impl ResidualStatistics {
    /// Returns `None` for an empty set.
    pub fn from_residuals(residuals: &[f64]) -> Option<Self> {
        if residuals.is_empty() {
            return None;
        }
        let count = residuals.len();
        let sorted = residuals.iter().copied().sorted_by(f64::total_cmp).collect_vec();
        let median = if count % 2 == 1 {
            sorted[count / 2]
        } else {
            (sorted[count / 2 - 1] + sorted[count / 2]) / 2.0
        };
        let average = residuals.iter().sum::<f64>() / count as f64;
        let variance = residuals.iter().map(|r| (r - average).powi(2)).sum::<f64>() / count as f64;
        Some(Self {
            count,
            average,
            median,
            stddev: variance.sqrt(),
        })
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn histogram_moments() {
        let mut histogram = Histogram::new();
        for matches in [0, 0, 1, 1, 2, 4] {
            histogram.record(matches);
        }
        assert_eq!(histogram.bins(), &[2, 2, 1, 0, 1]);
        assert_eq!(histogram.total(), 6);
        assert_abs_diff_eq!(histogram.mean(), 8. / 6., epsilon = 1e-12);
        let variance: f64 = (2. * (16. / 9.) + 2. * (1. / 9.) + (4. / 9.) + (64. / 9.)) / 6.;
        assert_abs_diff_eq!(histogram.stddev(), variance.sqrt(), epsilon = 1e-12);
        assert_abs_diff_eq!(
            histogram.sigma_of(4),
            (4. - 8. / 6.) / variance.sqrt(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn merge_sums_bins() {
        let mut a = Histogram::new();
        a.record(1);
        let mut b = Histogram::new();
        b.record(1);
        b.record(3);
        a.merge(&b);
        assert_eq!(a.bins(), &[0, 2, 0, 1]);

        let mut empty = Histogram::new();
        empty.merge(&a);
        assert_eq!(empty, a);
    }

    #[test]
    fn degenerate_histograms() {
        let empty = Histogram::new();
        assert_eq!(empty.mean(), 0.);
        assert_eq!(empty.stddev(), 0.);

        let mut flat = Histogram::new();
        flat.record(2);
        flat.record(2);
        assert_eq!(flat.sigma_of(2), 0.);
        assert_eq!(flat.sigma_of(3), f64::INFINITY);
    }

    #[test]
    fn threshold_is_inclusive() {
        let mut histogram = Histogram::new();
        histogram.record(0);
        histogram.record(2);
        // mean 1, stddev 1
        assert!(histogram.stands_out(3, 2.));
        assert!(!histogram.stands_out(2, 2.));
        assert!(histogram.stands_out(2, 1.));
        assert!(!histogram.stands_out(1, 1.));
    }

    #[test]
    fn residual_statistics() {
        assert_eq!(ResidualStatistics::from_residuals(&[]), None);
        let stats = ResidualStatistics::from_residuals(&[0.4, 0.1, 0.3, 0.2]).unwrap();
        assert_eq!(stats.count, 4);
        assert_abs_diff_eq!(stats.average, 0.25, epsilon = 1e-12);
        assert_abs_diff_eq!(stats.median, 0.25, epsilon = 1e-12);
        assert_abs_diff_eq!(stats.stddev, 0.0125f64.sqrt(), epsilon = 1e-12);

        let odd = ResidualStatistics::from_residuals(&[3., 1., 2.]).unwrap();
        assert_eq!(odd.median, 2.);
    }
}
