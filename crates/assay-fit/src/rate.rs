//! Two-stage rate analysis.
//!
//! Stage 1 fits [`log_mm`] to every progress curve inside a time window and
//! reports `v = p1 / p2` with its propagated error. Stage 2 maps the
//! velocities onto `[0, 100]` % effect between the solvent (high) and the
//! control (low) velocity and fits a free sigmoid across concentrations.

use assay_core::stats::{nanmax, nanmin, r_squared};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::lm::{fit, Bounds, LmOptions};
use crate::models::{draw, log_mm};
use crate::result::{ratio_variance, CurveFit};
use crate::sigmoidal::{fit_free, Gate};

pub const PARAMS: usize = 3;

/// Time window of stage 1, in the trace's time unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Window {
    pub start: f64,
    pub end: f64,
}

impl Default for Window {
    fn default() -> Self {
        Self {
            start: 0.0,
            end: 150.0,
        }
    }
}

impl Window {
    pub fn contains(&self, t: f64) -> bool {
        t >= self.start && t <= self.end
    }
}

/// Stage 1 result of one trace.
#[derive(Debug, Clone, PartialEq)]
pub struct Velocity {
    pub v: f64,
    pub error: f64,
    pub fit: CurveFit,
}

impl Velocity {
    pub fn failed() -> Self {
        Self {
            v: f64::NAN,
            error: f64::NAN,
            fit: CurveFit::failed(PARAMS),
        }
    }
}

/// Fits the progress curve `(times, signal)` inside `window`.
pub fn initial_velocity(times: &[f64], signal: &[f64], window: Window) -> Velocity {
    let (xs, ys): (Vec<f64>, Vec<f64>) = times
        .iter()
        .zip(signal)
        .filter(|(t, y)| t.is_finite() && y.is_finite() && window.contains(**t))
        .map(|(t, y)| (*t, *y))
        .unzip();
    if xs.len() <= PARAMS {
        return Velocity::failed();
    }
    let span = nanmax(&xs) - nanmin(&xs);
    let lead = xs.len().min(4);
    let early_slope = (ys[lead - 1] - ys[0]) / (xs[lead - 1] - xs[0]).max(f64::EPSILON);
    let p2 = (span / 2.0).max(f64::EPSILON);
    let start = [ys[0] - early_slope * xs[0], early_slope * p2, p2];
    let opts = LmOptions {
        bounds: Some(Bounds {
            lower: vec![f64::NEG_INFINITY, f64::NEG_INFINITY, 1e-9],
            upper: vec![f64::INFINITY; 3],
        }),
        ..LmOptions::default()
    };
    let report = match fit(log_mm, &xs, &ys, None, &start, &opts) {
        Ok(report) => report,
        Err(err) => {
            debug!(code = %err.info().code, "progress curve rejected");
            return Velocity::failed();
        }
    };
    let predicted: Vec<f64> = xs.iter().map(|t| log_mm(*t, &report.params)).collect();
    let params = report.params.clone();
    let curve = draw(|t| log_mm(t, &params), xs[0], xs[xs.len() - 1], 100);
    let fit = CurveFit::from_report(&report, r_squared(&ys, &predicted), curve);
    if !fit.do_fit {
        return Velocity::failed();
    }
    let (p1, p2) = (fit.params[1], fit.params[2]);
    let v = p1 / p2;
    let error = match &report.covariance {
        Some(cov) => ratio_variance(p1, p2, cov, 1, 2).max(0.0).sqrt(),
        None => f64::NAN,
    };
    Velocity { v, error, fit }
}

/// `100 · (high − v) / (high − low)`; NaN when the references coincide.
pub fn normalise_velocities(velocities: &[f64], high: f64, low: f64) -> Vec<f64> {
    let span = high - low;
    velocities
        .iter()
        .map(|v| {
            if span.abs() > f64::EPSILON {
                100.0 * (high - v) / span
            } else {
                f64::NAN
            }
        })
        .collect()
}

/// Stage 2 output.
#[derive(Debug, Clone, PartialEq)]
pub struct RateFit {
    pub velocities: Vec<Velocity>,
    pub normalised: Vec<f64>,
    pub fit: CurveFit,
}

/// Runs both stages for one sample.
///
/// `traces[i]` is the `(times, signal)` progress curve at `conc[i]`;
/// `high` and `low` are the solvent and control velocities.
pub fn fit_rate(
    conc: &[f64],
    traces: &[(Vec<f64>, Vec<f64>)],
    window: Window,
    high: f64,
    low: f64,
) -> RateFit {
    let velocities: Vec<Velocity> = traces
        .iter()
        .map(|(t, y)| initial_velocity(t, y, window))
        .collect();
    let raw: Vec<f64> = velocities.iter().map(|v| v.v).collect();
    let normalised = normalise_velocities(&raw, high, low);
    let usable = normalised.iter().filter(|v| v.is_finite()).count();
    let fit = if usable >= Gate::default().min_points {
        fit_free(conc, &normalised)
    } else {
        CurveFit::failed(crate::sigmoidal::PARAMS)
    };
    RateFit {
        velocities,
        normalised,
        fit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn velocity_of_an_exact_trace() {
        let times: Vec<f64> = (0..40).map(|i| i as f64 * 5.0).collect();
        let params = [100.0, 300.0, 60.0];
        let signal: Vec<f64> = times.iter().map(|t| log_mm(*t, &params)).collect();
        let velocity = initial_velocity(&times, &signal, Window::default());
        assert!((velocity.v - 5.0).abs() < 1e-4);
        assert!(velocity.error.is_finite());
    }

    #[test]
    fn window_drops_late_points() {
        let window = Window::default();
        assert!(window.contains(150.0));
        assert!(!window.contains(150.5));
    }

    #[test]
    fn solvent_is_zero_and_control_is_hundred() {
        let norm = normalise_velocities(&[10.0, 2.0, 6.0], 10.0, 2.0);
        assert_eq!(norm, vec![0.0, 100.0, 50.0]);
        assert!(normalise_velocities(&[1.0], 3.0, 3.0)[0].is_nan());
    }
}
