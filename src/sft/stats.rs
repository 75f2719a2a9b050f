//! Statistical checks shared by the feature tests.
//!
//! These are the distribution tests the regression suite applies to
//! simulator output: binomial confidence intervals, Poisson tail
//! probabilities, relative tolerances derived from the normal
//! approximation, and a one-sample Kolmogorov-Smirnov test.

use std::f64::consts::{FRAC_2_SQRT_PI, PI, SQRT_2};

use super::{Report, SftError};

/// p-value threshold below which a single statistic test fails.
pub const P_VALUE_THRESHOLD: f64 = 5e-2;
/// Probability under which an outcome no longer looks like chance.
const SMALL_PROB_EVENT: f64 = 1e-3;

/// Checks a binomial draw against the 95% confidence interval of its
/// expected distribution: mean n*p, bounds mean +/- 2 standard deviations.
///
/// The normal approximation needs n*p >= 5 and n*(1-p) >= 5; smaller
/// samples fail the check outright.
pub fn check_binomial_95ci(
    report: &mut Report,
    successes: u64,
    trials: u64,
    prob: f64,
    category: &str,
) -> bool {
    check_binomial(report, successes, trials, prob, category, 2.0, "95%")
}

/// Checks a binomial draw against the 99.73% confidence interval, bounds
/// mean +/- 3 standard deviations. Same sample-size requirement as
/// [`check_binomial_95ci`].
pub fn check_binomial_99ci(
    report: &mut Report,
    successes: u64,
    trials: u64,
    prob: f64,
    category: &str,
) -> bool {
    check_binomial(report, successes, trials, prob, category, 3.0, "99.73%")
}

fn check_binomial(
    report: &mut Report,
    successes: u64,
    trials: u64,
    prob: f64,
    category: &str,
    sigmas: f64,
    label: &str,
) -> bool {
    let n = trials as f64;
    let mean = n * prob;
    let remainder = n * (1.0 - prob);
    if mean < 5.0 || remainder < 5.0 {
        return report.record(
            false,
            format!(
                "There is not enough sample size in group {category}: \
                 mean = {mean}, sample size - mean = {remainder}."
            ),
        );
    }
    let sd = (mean * (1.0 - prob)).sqrt();
    let lower = mean - sigmas * sd;
    let upper = mean + sigmas * sd;
    let passed = (lower..=upper).contains(&(successes as f64));
    report.record(
        passed,
        format!(
            "For category {category}, the number of successes is {successes}, \
             expected the {label} confidence interval ({lower:.2}, {upper:.2})."
        ),
    )
}

/// Poisson probability of exactly `count` events at rate `mean`,
/// accumulated as pmf(k) = pmf(k-1) * mean / k to avoid the factorial.
pub fn poisson_pmf(mean: f64, count: u64) -> f64 {
    let mut pmf = (-mean).exp();
    for k in 1..=count {
        pmf *= mean / k as f64;
    }
    pmf
}

/// Poisson probability of at most `count` events: the pmf summed from zero.
pub fn poisson_cdf(mean: f64, count: u64) -> f64 {
    let mut term = (-mean).exp();
    let mut total = term;
    for k in 1..=count {
        term *= mean / k as f64;
        total += term;
    }
    total.min(1.0)
}

/// Moments of a Poisson binomial distribution, the sum of independent
/// Bernoulli draws with individual success probabilities.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoissonBinomial {
    pub mean: f64,
    pub variance: f64,
    pub standard_deviation: f64,
}

pub fn poisson_binomial(probabilities: &[f64]) -> PoissonBinomial {
    let mean = probabilities.iter().sum();
    let variance: f64 = probabilities.iter().map(|p| p * (1.0 - p)).sum();
    PoissonBinomial {
        mean,
        variance,
        standard_deviation: variance.sqrt(),
    }
}

/// Relative tolerance around a Poisson-distributed expectation such that
/// an observation drifts outside it with probability `prob`. The normal
/// approximation behind it needs an expected count of at least 10.
pub fn poisson_tolerance(expected: f64, prob: f64) -> Result<f64, SftError> {
    if expected < 10.0 {
        return Err(SftError::ToleranceDomain(expected));
    }
    Ok(-SQRT_2 * expected.sqrt() * erfinv(prob - 1.0) / expected)
}

/// Relative tolerance for a binomial expectation, tightened by the success
/// probability `binomial_p` of the underlying draw. Needs both the expected
/// count and the expected number of failures to reach 10.
pub fn binomial_tolerance(expected: f64, binomial_p: f64, prob: f64) -> Result<f64, SftError> {
    let remainder = expected * (1.0 - binomial_p);
    if expected < 10.0 || remainder < 10.0 {
        return Err(SftError::BinomialToleranceDomain {
            expected,
            remainder,
        });
    }
    Ok(-SQRT_2 * remainder.sqrt() * erfinv(prob - 1.0) / expected)
}

/// Critical value of the one-sample Kolmogorov-Smirnov statistic at the
/// 0.05 level: exact table values through n = 20, banded values through
/// n = 35, then the asymptotic 1.36 / sqrt(n).
pub fn ks_critical_value(num_trials: usize) -> f64 {
    const TABLE: [f64; 20] = [
        0.975, 0.842, 0.708, 0.624, 0.565, 0.521, 0.486, 0.457, 0.432, 0.410, 0.391, 0.375,
        0.361, 0.349, 0.338, 0.328, 0.318, 0.309, 0.301, 0.294,
    ];
    match num_trials {
        0..=20 => TABLE[num_trials.saturating_sub(1)],
        21..=25 => 0.270,
        26..=30 => 0.240,
        31..=35 => 0.230,
        n => 1.36 / (n as f64).sqrt(),
    }
}

/// Outcome of a one-sample Kolmogorov-Smirnov test.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KsResult {
    pub statistic: f64,
    pub p_value: f64,
}

impl KsResult {
    /// A test passes when its p-value clears the 0.05 threshold or its
    /// statistic stays under the critical value for the sample size.
    pub fn passes(&self, sample_size: usize) -> bool {
        self.p_value >= P_VALUE_THRESHOLD || self.statistic <= ks_critical_value(sample_size)
    }
}

/// One-sample Kolmogorov-Smirnov test of `samples` against an analytic
/// CDF. The statistic is the largest gap between the empirical CDF and
/// `cdf`, measured on both sides of each step.
pub fn ks_test(samples: &[f64], cdf: impl Fn(f64) -> f64) -> Result<KsResult, SftError> {
    if samples.is_empty() {
        return Err(SftError::EmptySample);
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let n = sorted.len() as f64;
    let mut statistic: f64 = 0.0;
    for (index, &value) in sorted.iter().enumerate() {
        let expected = cdf(value);
        let above = (index as f64 + 1.0) / n - expected;
        let below = expected - index as f64 / n;
        statistic = statistic.max(above.max(below));
    }
    Ok(KsResult {
        statistic,
        p_value: ks_p_value(sorted.len(), statistic),
    })
}

/// Asymptotic p-value of a KS statistic: the Kolmogorov survival series
/// 2 * sum (-1)^(k-1) e^(-2 k^2 lambda^2), with the small-sample
/// correction applied to lambda. Returns 1.0 when the series fails to
/// converge, which only happens for statistics too small to matter.
fn ks_p_value(num_trials: usize, statistic: f64) -> f64 {
    let sqrt_n = (num_trials as f64).sqrt();
    let lambda = (sqrt_n + 0.12 + 0.11 / sqrt_n) * statistic;
    let exponent = -2.0 * lambda * lambda;
    let mut sign = 1.0;
    let mut sum = 0.0;
    let mut previous = 0.0;
    for k in 1..=100u32 {
        let term = sign * (exponent * (k * k) as f64).exp();
        sum += term;
        if term.abs() <= 1e-3 * previous || term.abs() <= 1e-8 * sum.abs() {
            return (2.0 * sum).clamp(0.0, 1.0);
        }
        sign = -sign;
        previous = term.abs();
    }
    1.0
}

/// Gate over a batch of repeated statistic tests run at the 0.05 level.
/// The batch passes while failures stay under the expected mean, and
/// beyond that only while the observed failure count is not itself a
/// small-probability event under a Poisson model.
pub fn stats_test_pass(fail_count: usize, pass_count: usize) -> bool {
    let mean = (fail_count + pass_count) as f64 * P_VALUE_THRESHOLD;
    if (fail_count as f64) < mean {
        return true;
    }
    if fail_count == 0 {
        return true;
    }
    1.0 - poisson_cdf(mean, fail_count as u64 - 1) >= SMALL_PROB_EVENT
}

/// Error function, Abramowitz and Stegun 7.1.26. Absolute error stays
/// under 1.5e-7 over the whole real line.
pub fn erf(x: f64) -> f64 {
    const A1: f64 = 0.254829592;
    const A2: f64 = -0.284496736;
    const A3: f64 = 1.421413741;
    const A4: f64 = -1.453152027;
    const A5: f64 = 1.061405429;
    const P: f64 = 0.3275911;

    // the polynomial's coefficients sum to just under 1, so zero would
    // otherwise come back as ~1e-9
    if x == 0.0 {
        return 0.0;
    }
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + P * x);
    let y = 1.0 - ((((A5 * t + A4) * t + A3) * t + A2) * t + A1) * t * (-x * x).exp();
    sign * y
}

/// Inverse error function: a Winitzki seed refined with Newton steps
/// against [`erf`].
pub fn erfinv(y: f64) -> f64 {
    if y <= -1.0 {
        return f64::NEG_INFINITY;
    }
    if y >= 1.0 {
        return f64::INFINITY;
    }
    if y == 0.0 {
        return 0.0;
    }

    const A: f64 = 0.147;
    let ln_term = (1.0 - y * y).ln();
    let first = 2.0 / (PI * A) + ln_term / 2.0;
    let mut x = ((first * first - ln_term / A).sqrt() - first).sqrt().copysign(y);

    // erf'(x) = 2/sqrt(pi) * e^(-x^2)
    for _ in 0..3 {
        let error = erf(x) - y;
        x -= error / (FRAC_2_SQRT_PI * (-x * x).exp());
    }
    x
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binomial_95ci_accepts_values_inside_interval() {
        // n = 100, p = 0.5: mean 50, sd 5, interval (40, 60).
        let mut report = Report::new("t");
        assert!(check_binomial_95ci(&mut report, 50, 100, 0.5, "infected"));
        assert!(check_binomial_95ci(&mut report, 41, 100, 0.5, "infected"));
        assert!(check_binomial_95ci(&mut report, 60, 100, 0.5, "infected"));
        assert!(report.success());
    }

    #[test]
    fn test_binomial_95ci_rejects_values_outside_interval() {
        let mut report = Report::new("t");
        assert!(!check_binomial_95ci(&mut report, 39, 100, 0.5, "infected"));
        assert!(!check_binomial_95ci(&mut report, 61, 100, 0.5, "infected"));
        assert!(!report.success());
        assert!(report.lines()[1].starts_with("BAD: For category infected"));
    }

    #[test]
    fn test_binomial_99ci_is_wider() {
        // 37 successes sits outside 2 sigma but inside 3 sigma.
        let mut narrow = Report::new("t");
        assert!(!check_binomial_95ci(&mut narrow, 37, 100, 0.5, "infected"));
        let mut wide = Report::new("t");
        assert!(check_binomial_99ci(&mut wide, 37, 100, 0.5, "infected"));
    }

    #[test]
    fn test_binomial_insufficient_sample_fails() {
        // n * p = 3 is under the normal-approximation floor.
        let mut report = Report::new("t");
        assert!(!check_binomial_95ci(&mut report, 3, 6, 0.5, "recovered"));
        assert!(!report.success());
        assert!(report.lines()[1].contains("not enough sample size in group recovered"));
    }

    #[test]
    fn test_poisson_pmf() {
        assert!((poisson_pmf(1.0, 0) - (-1.0_f64).exp()).abs() < 1e-12);
        // e^-2.5 * 2.5^2 / 2!
        let expected = (-2.5_f64).exp() * 2.5 * 2.5 / 2.0;
        assert!((poisson_pmf(2.5, 2) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_poisson_pmf_large_count_stays_finite() {
        let p = poisson_pmf(100.0, 100);
        assert!(p > 0.0 && p < 1.0);
        // mode of the distribution, roughly 1 / sqrt(2 pi * 100)
        assert!((p - 0.03986).abs() < 1e-4);
    }

    #[test]
    fn test_poisson_cdf() {
        // e^-2 * (1 + 2 + 2)
        let expected = 5.0 * (-2.0_f64).exp();
        assert!((poisson_cdf(2.0, 2) - expected).abs() < 1e-12);
        assert!((poisson_cdf(2.0, 200) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_poisson_binomial_moments() {
        let pb = poisson_binomial(&[0.1, 0.2, 0.3]);
        assert!((pb.mean - 0.6).abs() < 1e-12);
        assert!((pb.variance - 0.46).abs() < 1e-12);
        assert!((pb.standard_deviation - 0.46_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_poisson_tolerance_known_value() {
        let tolerance = poisson_tolerance(100.0, 0.05).unwrap();
        assert!((tolerance - 0.196).abs() < 1e-3);
    }

    #[test]
    fn test_poisson_tolerance_domain() {
        assert!(matches!(
            poisson_tolerance(9.9, 0.05),
            Err(SftError::ToleranceDomain(_))
        ));
    }

    #[test]
    fn test_binomial_tolerance_known_value() {
        // remainder is 50, so the numerator is exactly sqrt(100) = 10.
        let tolerance = binomial_tolerance(100.0, 0.5, 0.05).unwrap();
        assert!((tolerance - 0.13859).abs() < 1e-4);
    }

    #[test]
    fn test_binomial_tolerance_domain() {
        assert!(binomial_tolerance(9.0, 0.5, 0.05).is_err());
        // expected failures 100 * 0.05 = 5 falls under the floor
        assert!(matches!(
            binomial_tolerance(100.0, 0.95, 0.05),
            Err(SftError::BinomialToleranceDomain { .. })
        ));
    }

    #[test]
    fn test_ks_critical_value_table() {
        assert_eq!(ks_critical_value(1), 0.975);
        assert_eq!(ks_critical_value(5), 0.565);
        assert_eq!(ks_critical_value(20), 0.294);
        assert_eq!(ks_critical_value(23), 0.270);
        assert_eq!(ks_critical_value(28), 0.240);
        assert_eq!(ks_critical_value(33), 0.230);
        assert!((ks_critical_value(100) - 0.136).abs() < 1e-12);
    }

    #[test]
    fn test_ks_exact_quantiles_pass() {
        // Mid-step quantiles of the uniform give the minimal statistic 1/(2n).
        let n = 20;
        let samples: Vec<f64> = (0..n).map(|i| (i as f64 + 0.5) / n as f64).collect();
        let result = ks_test(&samples, |x| x.clamp(0.0, 1.0)).unwrap();
        assert!((result.statistic - 1.0 / (2.0 * n as f64)).abs() < 1e-12);
        assert!(result.p_value > 0.99);
        assert!(result.passes(n));
    }

    #[test]
    fn test_ks_detects_mismatch() {
        // A point mass at 0.9 is nothing like the uniform.
        let samples = vec![0.9; 30];
        let result = ks_test(&samples, |x: f64| x.clamp(0.0, 1.0)).unwrap();
        assert!((result.statistic - 0.9).abs() < 1e-12);
        assert!(result.p_value < 1e-6);
        assert!(!result.passes(30));
    }

    #[test]
    fn test_ks_empty_sample_is_error() {
        assert!(matches!(
            ks_test(&[], |x: f64| x),
            Err(SftError::EmptySample)
        ));
    }

    #[test]
    fn test_stats_gate() {
        assert!(stats_test_pass(0, 0));
        assert!(stats_test_pass(0, 100));
        assert!(stats_test_pass(4, 96));
        // at the mean, the Poisson survival is still far from negligible
        assert!(stats_test_pass(5, 95));
        // survival of 12+ failures at mean 5 is ~0.0055
        assert!(stats_test_pass(12, 88));
        // survival of 15+ failures at mean 5 is ~0.00023
        assert!(!stats_test_pass(15, 85));
        assert!(!stats_test_pass(20, 80));
    }

    #[test]
    fn test_erf_known_values() {
        assert_eq!(erf(0.0), 0.0);
        assert!((erf(1.0) - 0.842_700_79).abs() < 5e-7);
        assert!((erf(2.0) - 0.995_322_27).abs() < 5e-7);
        assert!((erf(-1.0) + erf(1.0)).abs() < 1e-12);
    }

    #[test]
    fn test_erfinv_round_trip() {
        for y in [-0.99, -0.95, -0.5, 0.1, 0.5, 0.9, 0.99] {
            assert!((erf(erfinv(y)) - y).abs() < 1e-6, "round trip failed at {y}");
        }
        assert!((erfinv(-0.95) + 1.385_903_8).abs() < 1e-4);
        assert_eq!(erfinv(0.0), 0.0);
        assert_eq!(erfinv(1.0), f64::INFINITY);
        assert_eq!(erfinv(-1.0), f64::NEG_INFINITY);
    }
}
