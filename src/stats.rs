// Descriptive statistics over a buffered sample, and pairwise correlation.

use std::cmp::Ordering;

use itertools::Itertools;

use crate::table::ResultRow;

pub const STATISTIC_COLUMNS: [&str; 20] = [
    "Mean",
    "Median",
    "Geometric Mean",
    "Kurtosis",
    "Max",
    "Min",
    "Population Variance",
    "Quadratic Mean",
    "Skewness",
    "Standard Deviation",
    "Sum",
    "Sum Squared",
    "Variance",
    "Product",
    "Second Moment",
    "Harmonic Mean",
    "Moment 1 About Mean",
    "Moment 2 About Mean",
    "Moment 3 About Mean",
    "Moment 4 About Mean",
];

// Buffers values so that order statistics can be computed. One accumulator
// belongs to one worker and is cleared between work items.
#[derive(Clone, Debug, Default)]
pub struct DescriptiveStats {
    values: Vec<f64>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StatisticSet {
    pub mean: f64,
    pub median: f64,
    pub geometric_mean: f64,
    pub kurtosis: f64,
    pub max: f64,
    pub min: f64,
    pub population_variance: f64,
    pub quadratic_mean: f64,
    pub skewness: f64,
    pub standard_deviation: f64,
    pub sum: f64,
    pub sum_squared: f64,
    // sample (n - 1) variance
    pub variance: f64,
    pub product: f64,
    // sum of squared deviations from the mean
    pub second_moment: f64,
    pub harmonic_mean: f64,
    // mean of (x - mean)^k for k = 1..=4
    pub moments_about_mean: [f64; 4],
}

impl DescriptiveStats {
    pub fn new() -> Self {
        DescriptiveStats { values: Vec::new() }
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn add(&mut self, value: f64) {
        self.values.push(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return f64::NAN;
        }
        let n = self.values.len() as f64;
        let sum: f64 = self.values.iter().sum();
        let mean = sum / n;

        // second pass correction
        let correction: f64 = self.values.iter().map(|x| x - mean).sum();
        mean + correction / n
    }

    pub fn second_moment(&self) -> f64 {
        if self.values.is_empty() {
            return f64::NAN;
        }
        let mean = self.mean();
        self.values.iter().map(|x| (x - mean) * (x - mean)).sum()
    }

    pub fn variance(&self) -> f64 {
        match self.values.len() {
            0 => f64::NAN,
            1 => 0.0,
            n => self.second_moment() / (n - 1) as f64,
        }
    }

    pub fn population_variance(&self) -> f64 {
        match self.values.len() {
            0 => f64::NAN,
            n => self.second_moment() / n as f64,
        }
    }

    // Mean k-th power of the deviation from the mean.
    pub fn central_moment(&self, k: i32) -> f64 {
        if self.values.is_empty() {
            return f64::NAN;
        }
        let mean = self.mean();
        let total: f64 = self.values.iter().map(|x| (x - mean).powi(k)).sum();
        total / self.values.len() as f64
    }

    // Bias-corrected sample skewness.
    pub fn skewness(&self) -> f64 {
        let n = self.values.len();
        if n < 3 {
            return f64::NAN;
        }
        let mean = self.mean();
        let variance = self.variance();
        let m3: f64 = self.values.iter().map(|x| (x - mean).powi(3)).sum();
        let n = n as f64;
        (n / ((n - 1.0) * (n - 2.0))) * (m3 / (variance * variance.sqrt()))
    }

    // Bias-corrected excess kurtosis.
    pub fn kurtosis(&self) -> f64 {
        let n = self.values.len();
        if n < 4 {
            return f64::NAN;
        }
        let mean = self.mean();
        let variance = self.variance();
        let m4: f64 = self.values.iter().map(|x| (x - mean).powi(4)).sum();
        let n = n as f64;
        let coefficient = (n * (n + 1.0)) / ((n - 1.0) * (n - 2.0) * (n - 3.0));
        let term = (3.0 * (n - 1.0) * (n - 1.0)) / ((n - 2.0) * (n - 3.0));
        coefficient * (m4 / (variance * variance)) - term
    }

    // Percentile with the (n + 1)p position estimator, interpolating linearly
    // between neighbouring order statistics. `p` is in (0, 100].
    pub fn percentile(&self, p: f64) -> f64 {
        let n = self.values.len();
        if n == 0 {
            return f64::NAN;
        }
        if n == 1 {
            return self.values[0];
        }

        let sorted: Vec<f64> = self
            .values
            .iter()
            .cloned()
            .sorted_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal))
            .collect();

        let pos = p * (n as f64 + 1.0) / 100.0;
        let fpos = pos.floor();
        let intpos = fpos as usize;
        let dif = pos - fpos;

        if pos < 1.0 {
            return sorted[0];
        }
        if pos >= n as f64 {
            return sorted[n - 1];
        }
        let lower = sorted[intpos - 1];
        let upper = sorted[intpos];
        lower + dif * (upper - lower)
    }

    pub fn summarize(&self) -> StatisticSet {
        let n = self.values.len();
        if n == 0 {
            return StatisticSet::undefined();
        }
        let nf = n as f64;

        let sum: f64 = self.values.iter().sum();
        let sum_squared: f64 = self.values.iter().map(|x| x * x).sum();
        let sum_of_logs: f64 = self.values.iter().map(|x| x.ln()).sum();
        let sum_of_inverses: f64 = self.values.iter().map(|x| 1.0 / x).sum();
        let product: f64 = self.values.iter().product();
        let (min, max) = self
            .values
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| {
                (lo.min(x), hi.max(x))
            });
        let variance = self.variance();

        StatisticSet {
            mean: self.mean(),
            median: self.percentile(50.0),
            geometric_mean: (sum_of_logs / nf).exp(),
            kurtosis: self.kurtosis(),
            max,
            min,
            population_variance: self.population_variance(),
            quadratic_mean: (sum_squared / nf).sqrt(),
            skewness: self.skewness(),
            standard_deviation: variance.sqrt(),
            sum,
            sum_squared,
            variance,
            product,
            second_moment: self.second_moment(),
            harmonic_mean: nf / sum_of_inverses,
            moments_about_mean: [1, 2, 3, 4].map(|k| self.central_moment(k)),
        }
    }
}

impl StatisticSet {
    pub fn undefined() -> Self {
        StatisticSet {
            mean: f64::NAN,
            median: f64::NAN,
            geometric_mean: f64::NAN,
            kurtosis: f64::NAN,
            max: f64::NAN,
            min: f64::NAN,
            population_variance: f64::NAN,
            quadratic_mean: f64::NAN,
            skewness: f64::NAN,
            standard_deviation: f64::NAN,
            sum: f64::NAN,
            sum_squared: f64::NAN,
            variance: f64::NAN,
            product: f64::NAN,
            second_moment: f64::NAN,
            harmonic_mean: f64::NAN,
            moments_about_mean: [f64::NAN; 4],
        }
    }

    // Same order as STATISTIC_COLUMNS.
    pub fn values(&self) -> [f64; 20] {
        let [m1, m2, m3, m4] = self.moments_about_mean;
        [
            self.mean,
            self.median,
            self.geometric_mean,
            self.kurtosis,
            self.max,
            self.min,
            self.population_variance,
            self.quadratic_mean,
            self.skewness,
            self.standard_deviation,
            self.sum,
            self.sum_squared,
            self.variance,
            self.product,
            self.second_moment,
            self.harmonic_mean,
            m1,
            m2,
            m3,
            m4,
        ]
    }

    pub fn write_into(&self, row: &mut ResultRow, prefix: &str) {
        for (name, value) in STATISTIC_COLUMNS.iter().zip(self.values()) {
            if prefix.is_empty() {
                row.set(name, value);
            } else {
                row.set(&format!("{}{}", prefix, name), value);
            }
        }
    }
}

// Pearson's product-moment correlation. NaN when either sequence has zero
// variance or fewer than two paired samples exist.
pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    if n < 2 {
        return f64::NAN;
    }
    let nf = n as f64;
    let mx = x[..n].iter().sum::<f64>() / nf;
    let my = y[..n].iter().sum::<f64>() / nf;

    let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
    for (a, b) in x[..n].iter().zip(&y[..n]) {
        let dx = a - mx;
        let dy = b - my;
        sxx += dx * dx;
        syy += dy * dy;
        sxy += dx * dy;
    }

    let denom = (sxx * syy).sqrt();
    if denom == 0.0 || !denom.is_finite() {
        return f64::NAN;
    }
    (sxy / denom).clamp(-1.0, 1.0)
}

// Fractional ranks starting at 1; tied values share their average rank.
pub fn ranks(values: &[f64]) -> Vec<f64> {
    let order: Vec<usize> = (0..values.len())
        .sorted_by(|&a, &b| {
            values[a]
                .partial_cmp(&values[b])
                .unwrap_or(Ordering::Equal)
        })
        .collect();

    let mut ranks = vec![0.0; values.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i + 1;
        while j < order.len() && values[order[j]] == values[order[i]] {
            j += 1;
        }
        // positions i..j (0-based) share ranks i+1..=j
        let rank = (i + 1 + j) as f64 / 2.0;
        for &k in &order[i..j] {
            ranks[k] = rank;
        }
        i = j;
    }
    ranks
}

// Spearman's rank correlation: Pearson over ranks.
pub fn spearman(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    pearson(&ranks(&x[..n]), &ranks(&y[..n]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn stats_of(values: &[f64]) -> DescriptiveStats {
        let mut stats = DescriptiveStats::new();
        for &v in values {
            stats.add(v);
        }
        stats
    }

    #[test]
    fn test_one_to_five() {
        let s = stats_of(&[1.0, 2.0, 3.0, 4.0, 5.0]).summarize();
        assert_relative_eq!(s.mean, 3.0);
        assert_relative_eq!(s.median, 3.0);
        assert_relative_eq!(s.variance, 2.5);
        assert_relative_eq!(s.population_variance, 2.0);
        assert_relative_eq!(s.sum, 15.0);
        assert_relative_eq!(s.sum_squared, 55.0);
        assert_relative_eq!(s.min, 1.0);
        assert_relative_eq!(s.max, 5.0);
        assert_relative_eq!(s.product, 120.0);
        assert_relative_eq!(s.second_moment, 10.0);
        assert_relative_eq!(s.standard_deviation, 2.5f64.sqrt());
        assert_relative_eq!(s.quadratic_mean, 11.0f64.sqrt());
        assert_relative_eq!(s.geometric_mean, 120.0f64.powf(0.2), epsilon = 1e-12);
        assert_relative_eq!(s.skewness, 0.0, epsilon = 1e-12);
        assert_relative_eq!(s.kurtosis, -1.2, epsilon = 1e-12);
        assert_relative_eq!(s.harmonic_mean, 5.0 / (137.0 / 60.0), epsilon = 1e-12);
        assert_relative_eq!(s.moments_about_mean[0], 0.0, epsilon = 1e-12);
        assert_relative_eq!(s.moments_about_mean[1], 2.0, epsilon = 1e-12);
        assert_relative_eq!(s.moments_about_mean[2], 0.0, epsilon = 1e-12);
        assert_relative_eq!(s.moments_about_mean[3], 6.8, epsilon = 1e-12);
    }

    #[test]
    fn test_moments_of_skewed_sample() {
        let stats = stats_of(&[1.0, 1.0, 1.0, 5.0]);
        // mean 2, deviations -1, -1, -1, 3
        assert_relative_eq!(stats.central_moment(2), 3.0);
        assert_relative_eq!(stats.central_moment(3), 6.0);
        assert_relative_eq!(stats.central_moment(4), 21.0);

        let mut row = ResultRow::new();
        stats.summarize().write_into(&mut row, "");
        assert_relative_eq!(row.get_f64("Harmonic Mean").unwrap(), 1.25, epsilon = 1e-12);
        assert_relative_eq!(row.get_f64("Moment 3 About Mean").unwrap(), 6.0);
        assert!(stats_of(&[]).central_moment(1).is_nan());
    }

    #[test]
    fn test_median_interpolates() {
        let stats = stats_of(&[4.0, 1.0, 3.0, 2.0]);
        assert_relative_eq!(stats.percentile(50.0), 2.5);
        assert_relative_eq!(stats.percentile(1.0), 1.0);
        assert_relative_eq!(stats.percentile(100.0), 4.0);
    }

    #[test]
    fn test_small_samples() {
        let s = stats_of(&[7.0]).summarize();
        assert_eq!(s.median, 7.0);
        assert_eq!(s.variance, 0.0);
        assert!(s.skewness.is_nan());
        assert!(s.kurtosis.is_nan());

        let s = stats_of(&[]).summarize();
        assert!(s.values().iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_skewed_sample() {
        let s = stats_of(&[1.0, 1.0, 1.0, 10.0]).summarize();
        assert!(s.skewness > 1.9);
        assert_relative_eq!(s.skewness, 2.0, epsilon = 1e-12);
        assert_relative_eq!(s.kurtosis, 4.0, epsilon = 1e-12);
    }

    #[test]
    fn test_write_into_prefix() {
        let mut row = ResultRow::new();
        stats_of(&[2.0, 4.0]).summarize().write_into(&mut row, "DAPI_");
        assert_eq!(row.len(), STATISTIC_COLUMNS.len());
        assert_eq!(row.get_f64("DAPI_Mean"), Some(3.0));
        assert_eq!(row.get_f64("DAPI_Sum Squared"), Some(20.0));
    }

    #[test]
    fn test_perfect_anticorrelation() {
        let a = [1.0, 2.0, 3.0, 4.0];
        let b = [4.0, 3.0, 2.0, 1.0];
        assert_relative_eq!(pearson(&a, &b), -1.0);
        assert_relative_eq!(spearman(&a, &b), -1.0);
    }

    #[test]
    fn test_constant_channel_is_nan() {
        let a = [3.0, 3.0, 3.0];
        let b = [1.0, 2.0, 3.0];
        assert!(pearson(&a, &b).is_nan());
        assert!(spearman(&a, &b).is_nan());
        assert!(pearson(&[1.0], &[2.0]).is_nan());
    }

    #[test]
    fn test_ranks_with_ties() {
        assert_eq!(ranks(&[10.0, 20.0, 10.0, 30.0]), vec![1.5, 3.0, 1.5, 4.0]);
    }

    #[test]
    fn test_spearman_monotone_nonlinear() {
        let a = [1.0, 2.0, 3.0, 4.0, 5.0];
        let b = [1.0, 8.0, 27.0, 64.0, 125.0];
        assert_relative_eq!(spearman(&a, &b), 1.0);
        assert!(pearson(&a, &b) < 1.0);
    }
}
