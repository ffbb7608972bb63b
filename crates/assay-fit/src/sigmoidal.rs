//! Dose-response fits: the do-fit gate, the free and the constrained
//! four-parameter logistic.
//!
//! Concentrations are molar; the models work on `log10(conc)`. Excluded
//! points arrive as NaN and are skipped.

use assay_core::stats::{nanmax, nanmin, r_squared};
use tracing::debug;

use crate::lm::{fit, Bounds, LmOptions};
use crate::models::{draw, sigmoid};
use crate::result::CurveFit;

pub const PARAMS: usize = 4;
pub const TOP: usize = 0;
pub const BOTTOM: usize = 1;
pub const HILL: usize = 2;
pub const LOG_IC50: usize = 3;

/// Thresholds of the do-fit gate, in % effect.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gate {
    pub min_points: usize,
    pub max_sem: f64,
    pub min_top: f64,
    pub max_bottom: f64,
}

impl Default for Gate {
    fn default() -> Self {
        Self {
            min_points: 6,
            max_sem: 20.0,
            min_top: 60.0,
            max_bottom: 40.0,
        }
    }
}

impl Gate {
    /// True when the curve is worth fitting.
    ///
    /// A point counts when its mean is finite and its SEM is below the
    /// limit; a single replicate (NaN SEM) counts.
    pub fn passes(&self, norm: &[f64], sem: &[f64]) -> bool {
        let good = norm
            .iter()
            .zip(sem.iter().chain(std::iter::repeat(&f64::NAN)))
            .filter(|(v, s)| v.is_finite() && (s.is_nan() || **s < self.max_sem))
            .count();
        if good < self.min_points {
            return false;
        }
        if nanmax(norm) < self.min_top {
            return false;
        }
        nanmin(norm) <= self.max_bottom
    }
}

/// Both sigmoidal fits of one sample.
#[derive(Debug, Clone, PartialEq)]
pub struct SigmoidalFits {
    pub free: CurveFit,
    pub constrained: CurveFit,
}

impl SigmoidalFits {
    pub fn failed() -> Self {
        Self {
            free: CurveFit::failed(PARAMS),
            constrained: CurveFit::failed(PARAMS),
        }
    }

    pub fn any(&self) -> bool {
        self.free.do_fit || self.constrained.do_fit
    }
}

fn log_points(conc: &[f64], values: &[f64]) -> (Vec<f64>, Vec<f64>) {
    conc.iter()
        .zip(values)
        .filter(|(c, v)| **c > 0.0 && c.is_finite() && v.is_finite())
        .map(|(c, v)| (c.log10(), *v))
        .unzip()
}

/// Starting values: plateaus from the extremes, IC50 where the data cross
/// half way.
pub fn initial_guess(xs: &[f64], ys: &[f64]) -> [f64; PARAMS] {
    let top = nanmax(ys);
    let bottom = nanmin(ys);
    let half = (top + bottom) / 2.0;
    let log_ic50 = xs
        .iter()
        .zip(ys)
        .min_by(|a, b| (a.1 - half).abs().total_cmp(&(b.1 - half).abs()))
        .map(|(x, _)| *x)
        .unwrap_or(f64::NAN);
    let (lo, hi) = (nanmin(xs), nanmax(xs));
    let rising = {
        let at_lo = xs.iter().zip(ys).filter(|(x, _)| **x == lo).map(|(_, y)| *y).next();
        let at_hi = xs.iter().zip(ys).filter(|(x, _)| **x == hi).map(|(_, y)| *y).next();
        match (at_lo, at_hi) {
            (Some(a), Some(b)) => b >= a,
            _ => true,
        }
    };
    let hill = if rising { 1.0 } else { -1.0 };
    [top, bottom, hill, log_ic50]
}

fn run(
    xs: &[f64],
    ys: &[f64],
    sigma: Option<&[f64]>,
    opts: &LmOptions,
) -> CurveFit {
    let guess = initial_guess(xs, ys);
    let mut start = guess;
    if let Some(bounds) = &opts.bounds {
        bounds.clamp(&mut start);
    }
    let report = match fit(sigmoid, xs, ys, sigma, &start, opts) {
        Ok(report) => report,
        Err(err) => {
            debug!(code = %err.info().code, "sigmoidal fit rejected");
            return CurveFit::failed(PARAMS);
        }
    };
    let predicted: Vec<f64> = xs.iter().map(|x| sigmoid(*x, &report.params)).collect();
    let r2 = r_squared(ys, &predicted);
    let params = report.params.clone();
    let curve = draw(|x| sigmoid(x, &params), nanmin(xs), nanmax(xs), 100);
    CurveFit::from_report(&report, r2, curve)
}

/// Unconstrained, unweighted fit.
pub fn fit_free(conc: &[f64], values: &[f64]) -> CurveFit {
    let (xs, ys) = log_points(conc, values);
    if xs.len() < PARAMS {
        return CurveFit::failed(PARAMS);
    }
    run(&xs, &ys, None, &LmOptions::default())
}

/// SEM-weighted fit with both plateaus held in `[0, 100]`.
pub fn fit_constrained(conc: &[f64], values: &[f64], sem: &[f64]) -> CurveFit {
    let mut xs = Vec::new();
    let mut ys = Vec::new();
    let mut sigma = Vec::new();
    for ((c, v), s) in conc
        .iter()
        .zip(values)
        .zip(sem.iter().chain(std::iter::repeat(&f64::NAN)))
    {
        if *c > 0.0 && c.is_finite() && v.is_finite() {
            xs.push(c.log10());
            ys.push(*v);
            sigma.push(*s);
        }
    }
    if xs.len() < PARAMS {
        return CurveFit::failed(PARAMS);
    }
    let opts = LmOptions {
        bounds: Some(Bounds {
            lower: vec![0.0, 0.0, f64::NEG_INFINITY, f64::NEG_INFINITY],
            upper: vec![100.0, 100.0, f64::INFINITY, f64::INFINITY],
        }),
        ..LmOptions::default()
    };
    run(&xs, &ys, Some(&sigma), &opts)
}

/// Gate, then both fits. A failing gate leaves both fits failed.
pub fn fit_sigmoidal(conc: &[f64], norm: &[f64], sem: &[f64], gate: &Gate) -> SigmoidalFits {
    if !gate.passes(norm, sem) {
        return SigmoidalFits::failed();
    }
    SigmoidalFits {
        free: fit_free(conc, norm),
        constrained: fit_constrained(conc, norm, sem),
    }
}

/// IC50 in molar from a fit, NaN unless the fit succeeded.
pub fn ic50(fit: &CurveFit) -> f64 {
    if fit.do_fit {
        10f64.powf(fit.param(LOG_IC50))
    } else {
        f64::NAN
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dilution(top: f64, steps: usize) -> Vec<f64> {
        (0..steps).map(|i| top / 3f64.powi(i as i32)).collect()
    }

    fn response(conc: &[f64], params: &[f64]) -> Vec<f64> {
        conc.iter().map(|c| sigmoid(c.log10(), params)).collect()
    }

    #[test]
    fn free_fit_recovers_parameters() {
        let conc = dilution(50e-6, 11);
        let truth = [98.0, 3.0, 1.1, -6.3];
        let ys = response(&conc, &truth);
        let fit = fit_free(&conc, &ys);
        assert!(fit.do_fit);
        assert!((fit.param(LOG_IC50) - truth[3]).abs() < 1e-4);
        assert!(fit.r2 > 0.999);
    }

    #[test]
    fn constrained_fit_stays_inside_bounds() {
        let conc = dilution(50e-6, 11);
        let ys = response(&conc, &[115.0, -10.0, 1.0, -6.0]);
        let sem = vec![2.0; ys.len()];
        let fit = fit_constrained(&conc, &ys, &sem);
        assert!(fit.do_fit);
        assert!(fit.param(TOP) <= 100.0 && fit.param(BOTTOM) >= 0.0);
    }

    #[test]
    fn gate_rejects_noisy_or_flat_curves() {
        let gate = Gate::default();
        let norm = [5.0, 10.0, 30.0, 50.0, 70.0, 90.0];
        assert!(gate.passes(&norm, &[1.0; 6]));
        let mut sem = [1.0; 6];
        sem[2] = 20.0;
        assert!(!gate.passes(&norm, &sem));
        assert!(!gate.passes(&[45.0, 46.0, 47.0, 48.0, 49.0, 59.0], &[1.0; 6]));
        assert!(!gate.passes(&[41.0, 50.0, 60.0, 70.0, 80.0, 90.0], &[1.0; 6]));
    }

    #[test]
    fn failed_gate_gives_nan_fits() {
        let conc = dilution(1e-5, 6);
        let fits = fit_sigmoidal(&conc, &[1.0; 6], &[0.5; 6], &Gate::default());
        assert!(!fits.any());
        assert!(fits.free.params.iter().all(|p| p.is_nan()));
        assert!(ic50(&fits.free).is_nan());
    }
}
