//! The shared outcome of every fit.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};

use crate::lm::LmReport;

/// Drawn curve, parameters, 95 % confidence half-widths, standard errors,
/// R² and the success flag.
///
/// A failed fit has NaN everywhere and `do_fit == false`; callers must not
/// read parameters of a failed fit as results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveFit {
    pub curve: Vec<[f64; 2]>,
    pub params: Vec<f64>,
    pub ci: Vec<f64>,
    pub errors: Vec<f64>,
    pub r2: f64,
    pub do_fit: bool,
}

impl CurveFit {
    pub fn failed(n_params: usize) -> Self {
        Self {
            curve: Vec::new(),
            params: vec![f64::NAN; n_params],
            ci: vec![f64::NAN; n_params],
            errors: vec![f64::NAN; n_params],
            r2: f64::NAN,
            do_fit: false,
        }
    }

    pub fn param(&self, idx: usize) -> f64 {
        self.params.get(idx).copied().unwrap_or(f64::NAN)
    }

    /// Builds a result from a solver report; fails unless every number is finite.
    pub fn from_report(report: &LmReport, r2: f64, curve: Vec<[f64; 2]>) -> Self {
        let errors = report.std_errors();
        let t = t_quantile(report.dof);
        let ci = errors.iter().map(|e| e * t).collect();
        let ok = report.converged
            && report.params.iter().all(|p| p.is_finite())
            && r2.is_finite();
        if !ok {
            return Self::failed(report.params.len());
        }
        Self {
            curve,
            params: report.params.clone(),
            ci,
            errors,
            r2,
            do_fit: true,
        }
    }
}

/// Two-sided 95 % Student-t quantile for `dof` degrees of freedom.
pub fn t_quantile(dof: usize) -> f64 {
    if dof == 0 {
        return f64::NAN;
    }
    StudentsT::new(0.0, 1.0, dof as f64)
        .map(|dist| dist.inverse_cdf(0.975))
        .unwrap_or(f64::NAN)
}

/// Variance of `a / b` from the covariance of `(a, b)`.
pub fn ratio_variance(a: f64, b: f64, cov: &DMatrix<f64>, ia: usize, ib: usize) -> f64 {
    let ratio = a / b;
    ratio * ratio
        * (cov[(ia, ia)] / (a * a) + cov[(ib, ib)] / (b * b) - 2.0 * cov[(ia, ib)] / (a * b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn t_quantile_matches_tables() {
        assert!((t_quantile(10) - 2.228).abs() < 1e-3);
        assert!((t_quantile(1000) - 1.962).abs() < 1e-3);
        assert!(t_quantile(0).is_nan());
    }
}
