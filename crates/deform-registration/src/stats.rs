//! Running statistics over a stream of samples.

/// Accumulated count, sum, sum of squares and extrema.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunStatistics {
    count: usize,
    sum: f64,
    sum_squared: f64,
    min: f64,
    max: f64,
}

impl Default for RunStatistics {
    fn default() -> Self {
        Self {
            count: 0,
            sum: 0.0,
            sum_squared: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }
}

impl RunStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one sample.
    pub fn tally(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.sum_squared += value * value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    /// Merge another accumulator into this one.
    pub fn merge(&mut self, other: &RunStatistics) {
        self.count += other.count;
        self.sum += other.sum;
        self.sum_squared += other.sum_squared;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    pub fn sum_squared(&self) -> f64 {
        self.sum_squared
    }

    /// Smallest sample, zero when empty.
    pub fn min(&self) -> f64 {
        if self.count == 0 { 0.0 } else { self.min }
    }

    /// Largest sample, zero when empty.
    pub fn max(&self) -> f64 {
        if self.count == 0 { 0.0 } else { self.max }
    }

    /// Mean, zero when empty.
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    /// Unbiased sample variance, zero for fewer than two samples.
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            return 0.0;
        }
        let n = self.count as f64;
        ((self.sum_squared * n - self.sum * self.sum) / (n * (n - 1.0))).max(0.0)
    }

    pub fn std(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Root mean square, zero when empty.
    pub fn rms(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            (self.sum_squared / self.count as f64).sqrt()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_statistics_are_zero() {
        let s = RunStatistics::new();
        assert_eq!(s.mean(), 0.0);
        assert_eq!(s.std(), 0.0);
        assert_eq!(s.min(), 0.0);
        assert_eq!(s.max(), 0.0);
        assert_eq!(s.rms(), 0.0);
    }

    #[test]
    fn test_single_sample_has_zero_std() {
        let mut s = RunStatistics::new();
        s.tally(3.0);
        assert_eq!(s.mean(), 3.0);
        assert_eq!(s.std(), 0.0);
    }

    #[test]
    fn test_moments() {
        let mut s = RunStatistics::new();
        for v in [1.0, 2.0, 3.0, 4.0] {
            s.tally(v);
        }
        assert!((s.mean() - 2.5).abs() < 1e-12);
        assert!((s.variance() - 5.0 / 3.0).abs() < 1e-12);
        assert!((s.rms() - (7.5f64).sqrt()).abs() < 1e-12);
        assert_eq!(s.min(), 1.0);
        assert_eq!(s.max(), 4.0);
    }

    #[test]
    fn test_merge_matches_tally() {
        let mut a = RunStatistics::new();
        let mut b = RunStatistics::new();
        let mut all = RunStatistics::new();
        for v in [0.5, 1.5] {
            a.tally(v);
            all.tally(v);
        }
        for v in [2.5, 7.0] {
            b.tally(v);
            all.tally(v);
        }
        a.merge(&b);
        assert_eq!(a, all);
    }
}
