//! Welch's t-test and adaptive-threshold helpers, grounded in
//! `statsqli.stats.TimingAnalyzer` from the original Python prototype.

use statrs::distribution::{ContinuousCDF, Normal, StudentsT};

/// Analyzes timing samples to decide whether a probe was delayed, without
/// triggering on ordinary network jitter (§4.2).
#[derive(Debug, Clone)]
pub struct TimingAnalyzer {
    pub confidence_level: f64,
    pub min_samples: usize,
}

impl Default for TimingAnalyzer {
    fn default() -> Self {
        Self {
            confidence_level: 0.95,
            min_samples: 5,
        }
    }
}

impl TimingAnalyzer {
    pub fn new(confidence_level: f64, min_samples: usize) -> Self {
        Self {
            confidence_level,
            min_samples,
        }
    }

    /// Welch's one-sided t-test: is `probe` stochastically greater than
    /// `baseline`? Returns `(decision, p_value)`.
    ///
    /// Rejects outright (returns `false`, p = 1.0) when either sample has
    /// fewer than `min_samples` observations — there isn't enough data to
    /// trust a variance estimate.
    pub fn significant(&self, baseline: &[f64], probe: &[f64]) -> (bool, f64) {
        if baseline.len() < self.min_samples || probe.len() < self.min_samples {
            return (false, 1.0);
        }

        let (mean_b, var_b) = mean_and_variance(baseline);
        let (mean_p, var_p) = mean_and_variance(probe);

        let n_b = baseline.len() as f64;
        let n_p = probe.len() as f64;

        let se_b = var_b / n_b;
        let se_p = var_p / n_p;
        let se_total = se_b + se_p;

        if se_total <= 0.0 {
            // Zero variance on both sides: decide on the raw means alone.
            let decision = mean_p > mean_b;
            return (decision, if decision { 0.0 } else { 1.0 });
        }

        let t_stat = (mean_p - mean_b) / se_total.sqrt();

        // Welch–Satterthwaite degrees of freedom.
        let df = se_total.powi(2)
            / ((se_b.powi(2) / (n_b - 1.0)) + (se_p.powi(2) / (n_p - 1.0)));
        let df = df.max(1.0);

        let p_value = match StudentsT::new(0.0, 1.0, df) {
            Ok(dist) => 1.0 - dist.cdf(t_stat),
            Err(_) => return (false, 1.0),
        };

        let alpha = 1.0 - self.confidence_level;
        (p_value < alpha, p_value)
    }

    /// `mean + 3*stdev`, floored at `1.10*mean` (§4.2). Used by the
    /// calibrator and the traditional-extractor threshold fallback.
    pub fn adaptive_threshold(&self, baseline: &[f64]) -> f64 {
        if baseline.len() < self.min_samples {
            return 1.0;
        }
        let (mean, var) = mean_and_variance(baseline);
        let stdev = var.sqrt();
        (mean + 3.0 * stdev).max(mean * 1.10)
    }

    /// Power-analysis sample size estimate for 80% power at the configured
    /// confidence, one-sided normal approximation. Lower-bounded by
    /// `min_samples`.
    pub fn sample_size(&self, effect: f64, stdev: f64) -> usize {
        if stdev <= 0.0 || effect <= 0.0 {
            return self.min_samples;
        }

        let normal = Normal::new(0.0, 1.0).expect("standard normal is always valid");
        let z_alpha = normal.inverse_cdf(self.confidence_level);
        let z_power = normal.inverse_cdf(0.8);

        let n = 2.0 * (z_alpha + z_power).powi(2) * (stdev / effect).powi(2);
        (n.ceil() as usize).max(self.min_samples)
    }
}

fn mean_and_variance(samples: &[f64]) -> (f64, f64) {
    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    if samples.len() < 2 {
        return (mean, 0.0);
    }
    let variance =
        samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, variance)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_when_samples_too_small() {
        let analyzer = TimingAnalyzer::default();
        let (decision, p) = analyzer.significant(&[0.1, 0.1], &[2.0, 2.0]);
        assert!(!decision);
        assert_eq!(p, 1.0);
    }

    #[test]
    fn detects_obvious_delay() {
        let analyzer = TimingAnalyzer::default();
        let baseline = vec![0.10, 0.11, 0.09, 0.10, 0.10, 0.11, 0.09];
        let probe = vec![2.10, 2.11, 2.09, 2.10, 2.10, 2.11, 2.09];
        let (decision, p) = analyzer.significant(&baseline, &probe);
        assert!(decision);
        assert!(p < 0.05);
    }

    #[test]
    fn rejects_identical_distributions() {
        let analyzer = TimingAnalyzer::default();
        let baseline = vec![0.10, 0.12, 0.09, 0.11, 0.10, 0.13, 0.08];
        let probe = vec![0.11, 0.10, 0.12, 0.09, 0.10, 0.11, 0.10];
        let (decision, _) = analyzer.significant(&baseline, &probe);
        assert!(!decision);
    }

    #[test]
    fn adaptive_threshold_is_floored_at_110_percent_mean() {
        let analyzer = TimingAnalyzer::default();
        // Zero-variance baseline: mean + 3*stdev == mean, so the 1.10x floor
        // must kick in.
        let baseline = vec![1.0; 10];
        let threshold = analyzer.adaptive_threshold(&baseline);
        assert!((threshold - 1.10).abs() < 1e-9);
    }

    #[test]
    fn sample_size_lower_bounded_by_min_samples() {
        let analyzer = TimingAnalyzer::default();
        assert_eq!(analyzer.sample_size(5.0, 0.001), analyzer.min_samples.max(analyzer.sample_size(5.0, 0.001)));
        assert!(analyzer.sample_size(0.01, 1.0) >= analyzer.min_samples);
    }

    #[test]
    fn monotone_in_baseline_size_for_identical_distribution() {
        // Adding more baseline samples drawn from the same distribution
        // should not flip a clear decision (§8 statistical monotonicity).
        let analyzer = TimingAnalyzer::default();
        let probe = vec![2.0; 7];
        let small_baseline = vec![0.1, 0.1, 0.1, 0.1, 0.1];
        let large_baseline = vec![0.1; 20];

        let (small_decision, _) = analyzer.significant(&small_baseline, &probe);
        let (large_decision, _) = analyzer.significant(&large_baseline, &probe);
        assert_eq!(small_decision, large_decision);
    }
}
