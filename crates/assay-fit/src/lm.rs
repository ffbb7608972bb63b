//! Damped least squares (Levenberg–Marquardt) on small dense problems.
//!
//! The Jacobian is taken by central differences. Bounds are enforced by
//! clamping each trial step. The reported covariance is
//! `(JᵀWJ)⁻¹ · s²` with `s² = cost / (n - k)`.

use assay_core::{AssayError, ErrorInfo};
use nalgebra::{DMatrix, DVector};

/// Box constraints on the parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Bounds {
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

impl Bounds {
    pub fn clamp(&self, params: &mut [f64]) {
        for (idx, value) in params.iter_mut().enumerate() {
            if let Some(lo) = self.lower.get(idx) {
                *value = value.max(*lo);
            }
            if let Some(hi) = self.upper.get(idx) {
                *value = value.min(*hi);
            }
        }
    }
}

/// Solver controls.
#[derive(Debug, Clone, PartialEq)]
pub struct LmOptions {
    pub max_iterations: usize,
    /// Relative cost decrease below which the fit is converged.
    pub tolerance: f64,
    pub bounds: Option<Bounds>,
}

impl Default for LmOptions {
    fn default() -> Self {
        Self {
            max_iterations: 400,
            tolerance: 1e-12,
            bounds: None,
        }
    }
}

/// Outcome of a least-squares run.
#[derive(Debug, Clone, PartialEq)]
pub struct LmReport {
    pub params: Vec<f64>,
    pub covariance: Option<DMatrix<f64>>,
    /// Weighted residual sum of squares.
    pub cost: f64,
    /// Points used minus parameters.
    pub dof: usize,
    pub iterations: usize,
    pub converged: bool,
}

impl LmReport {
    /// Standard error per parameter; NaN when the covariance is unavailable.
    pub fn std_errors(&self) -> Vec<f64> {
        match &self.covariance {
            Some(cov) => (0..self.params.len())
                .map(|i| {
                    let var = cov[(i, i)];
                    if var.is_finite() && var >= 0.0 {
                        var.sqrt()
                    } else {
                        f64::NAN
                    }
                })
                .collect(),
            None => vec![f64::NAN; self.params.len()],
        }
    }

    pub fn covariance_at(&self, i: usize, j: usize) -> f64 {
        self.covariance
            .as_ref()
            .map(|cov| cov[(i, j)])
            .unwrap_or(f64::NAN)
    }
}

fn underdetermined(code: &str, message: &str) -> AssayError {
    AssayError::FitUnderdetermined(ErrorInfo::new(code, message))
}

struct Problem<'a, F> {
    model: &'a F,
    xs: Vec<f64>,
    ys: Vec<f64>,
    sqrt_w: Vec<f64>,
}

impl<F> Problem<'_, F>
where
    F: Fn(f64, &[f64]) -> f64,
{
    fn residuals(&self, params: &[f64]) -> DVector<f64> {
        DVector::from_iterator(
            self.xs.len(),
            self.xs
                .iter()
                .zip(&self.ys)
                .zip(&self.sqrt_w)
                .map(|((x, y), w)| w * (y - (self.model)(*x, params))),
        )
    }

    fn cost(&self, params: &[f64]) -> f64 {
        self.residuals(params).norm_squared()
    }

    fn jacobian(&self, params: &[f64]) -> DMatrix<f64> {
        let n = self.xs.len();
        let k = params.len();
        let mut jac = DMatrix::<f64>::zeros(n, k);
        let mut shifted = params.to_vec();
        for j in 0..k {
            let h = 1e-6 * params[j].abs().max(1e-3);
            shifted[j] = params[j] + h;
            let upper: Vec<f64> = self.xs.iter().map(|x| (self.model)(*x, &shifted)).collect();
            shifted[j] = params[j] - h;
            for (i, x) in self.xs.iter().enumerate() {
                let lower = (self.model)(*x, &shifted);
                jac[(i, j)] = self.sqrt_w[i] * (upper[i] - lower) / (2.0 * h);
            }
            shifted[j] = params[j];
        }
        jac
    }
}

fn solve(system: DMatrix<f64>, rhs: &DVector<f64>) -> Option<DVector<f64>> {
    match system.clone().cholesky() {
        Some(chol) => Some(chol.solve(rhs)),
        None => system.lu().solve(rhs),
    }
}

/// Fits `model(x, params)` to the finite `(x, y)` pairs.
///
/// `sigma` weights each point by `1/σ²`; non-finite or non-positive σ take
/// the mean of the usable ones.
pub fn fit<F>(
    model: F,
    xs: &[f64],
    ys: &[f64],
    sigma: Option<&[f64]>,
    initial: &[f64],
    opts: &LmOptions,
) -> Result<LmReport, AssayError>
where
    F: Fn(f64, &[f64]) -> f64,
{
    let mut points = Vec::new();
    for (idx, (x, y)) in xs.iter().zip(ys).enumerate() {
        if !x.is_finite() || !y.is_finite() {
            continue;
        }
        let s = sigma
            .and_then(|s| s.get(idx).copied())
            .filter(|s| s.is_finite() && *s > 0.0);
        points.push((*x, *y, s));
    }
    let k = initial.len();
    if points.len() < k {
        return Err(underdetermined(
            "fit.too_few_points",
            "fewer points than parameters",
        ));
    }
    let usable: Vec<f64> = points.iter().filter_map(|p| p.2).collect();
    let fallback = if usable.is_empty() {
        1.0
    } else {
        usable.iter().sum::<f64>() / usable.len() as f64
    };
    let problem = Problem {
        model: &model,
        xs: points.iter().map(|p| p.0).collect(),
        ys: points.iter().map(|p| p.1).collect(),
        sqrt_w: points
            .iter()
            .map(|p| match sigma {
                Some(_) => 1.0 / p.2.unwrap_or(fallback),
                None => 1.0,
            })
            .collect(),
    };

    let mut params = initial.to_vec();
    if let Some(bounds) = &opts.bounds {
        bounds.clamp(&mut params);
    }
    let mut cost = problem.cost(&params);
    if !cost.is_finite() {
        return Err(underdetermined(
            "fit.non_finite",
            "model is not finite at the initial guess",
        ));
    }

    let mut lambda = 1e-3;
    let mut converged = false;
    let mut iterations = 0;
    'outer: while iterations < opts.max_iterations {
        iterations += 1;
        if cost <= f64::EPSILON * f64::EPSILON {
            converged = true;
            break;
        }
        let jac = problem.jacobian(&params);
        let resid = problem.residuals(&params);
        let jt = jac.transpose();
        let normal = &jt * &jac;
        let gradient = &jt * &resid;
        if gradient.amax() < 1e-15 {
            converged = true;
            break;
        }
        loop {
            let mut damped = normal.clone();
            for d in 0..k {
                damped[(d, d)] += lambda * normal[(d, d)].max(1e-12);
            }
            let Some(step) = solve(damped, &gradient) else {
                lambda *= 10.0;
                if lambda > 1e16 {
                    break 'outer;
                }
                continue;
            };
            let mut candidate: Vec<f64> = params.iter().zip(step.iter()).map(|(p, s)| p + s).collect();
            if let Some(bounds) = &opts.bounds {
                bounds.clamp(&mut candidate);
            }
            let next = problem.cost(&candidate);
            if next.is_finite() && next <= cost {
                let decrease = (cost - next) / cost.max(f64::MIN_POSITIVE);
                let moved = candidate
                    .iter()
                    .zip(&params)
                    .map(|(a, b)| (a - b).abs() / b.abs().max(1e-12))
                    .fold(0.0, f64::max);
                params = candidate;
                cost = next;
                lambda = (lambda / 10.0).max(1e-15);
                if (decrease < opts.tolerance && moved < 1e-8) || moved < 1e-12 {
                    converged = true;
                    break 'outer;
                }
                break;
            }
            lambda *= 10.0;
            if lambda > 1e16 {
                // No descent direction left: the current point is a minimum.
                converged = true;
                break 'outer;
            }
        }
    }

    let dof = problem.xs.len().saturating_sub(k);
    let covariance = if dof > 0 {
        let jac = problem.jacobian(&params);
        let s2 = cost / dof as f64;
        (jac.transpose() * jac).try_inverse().map(|inv| inv * s2)
    } else {
        None
    };
    Ok(LmReport {
        params,
        covariance,
        cost,
        dof,
        iterations,
        converged,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovers_a_line() {
        let xs: Vec<f64> = (0..10).map(f64::from).collect();
        let ys: Vec<f64> = xs.iter().map(|x| 3.0 * x - 2.0).collect();
        let report = fit(|x, p| p[0] * x + p[1], &xs, &ys, None, &[1.0, 0.0], &LmOptions::default())
            .unwrap();
        assert!(report.converged);
        assert!((report.params[0] - 3.0).abs() < 1e-8);
        assert!((report.params[1] + 2.0).abs() < 1e-8);
    }

    #[test]
    fn bounds_hold_at_the_solution() {
        let xs: Vec<f64> = (0..8).map(f64::from).collect();
        let ys: Vec<f64> = xs.iter().map(|_| 120.0).collect();
        let opts = LmOptions {
            bounds: Some(Bounds {
                lower: vec![0.0],
                upper: vec![100.0],
            }),
            ..LmOptions::default()
        };
        let report = fit(|_, p| p[0], &xs, &ys, None, &[50.0], &opts).unwrap();
        assert!((report.params[0] - 100.0).abs() < 1e-12);
    }

    #[test]
    fn too_few_points_is_underdetermined() {
        let err = fit(|x, p| p[0] + p[1] * x, &[1.0], &[2.0], None, &[0.0, 0.0], &LmOptions::default())
            .unwrap_err();
        assert!(matches!(err, AssayError::FitUnderdetermined(_)));
    }

    #[test]
    fn covariance_scales_with_noise() {
        let xs: Vec<f64> = (0..20).map(f64::from).collect();
        let ys: Vec<f64> = xs
            .iter()
            .enumerate()
            .map(|(i, x)| 2.0 * x + if i % 2 == 0 { 0.5 } else { -0.5 })
            .collect();
        let report = fit(|x, p| p[0] * x + p[1], &xs, &ys, None, &[1.0, 1.0], &LmOptions::default())
            .unwrap();
        let errors = report.std_errors();
        assert!(errors.iter().all(|e| e.is_finite() && *e > 0.0));
    }
}
