//! Statistical validation for scientific feature tests.
//!
//! A scientific feature test runs the simulator against a configuration
//! with a known analytic outcome, then checks the observed output against
//! that expectation. This module carries the shared pieces: the report
//! file every test writes, and the statistical checks the tests lean on.

mod report;
mod stats;

pub use report::{Report, REPORT_FILE_NAME};
pub use stats::{
    binomial_tolerance, check_binomial_95ci, check_binomial_99ci, erf, erfinv, ks_critical_value,
    ks_test, poisson_binomial, poisson_cdf, poisson_pmf, poisson_tolerance, stats_test_pass,
    KsResult, PoissonBinomial, P_VALUE_THRESHOLD,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SftError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("tolerance is only valid for an expected value >= 10, got {0}")]
    ToleranceDomain(f64),
    #[error(
        "binomial tolerance needs expected >= 10 and expected * (1 - p) >= 10, \
         got {expected} and {remainder}"
    )]
    BinomialToleranceDomain { expected: f64, remainder: f64 },
    #[error("cannot run a Kolmogorov-Smirnov test on an empty sample")]
    EmptySample,
}
