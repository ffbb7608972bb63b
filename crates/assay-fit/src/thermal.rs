//! Thermal melt fits.
//!
//! The Tm guess comes from the tallest first-derivative peak of the
//! Savitzky–Golay smoothed trace; a Boltzmann sigmoid is then fitted.

use assay_core::stats::{nanmax, nanmean, r_squared, round_to};
use tracing::debug;

use crate::lm::{fit, LmOptions};
use crate::models::{boltzmann, draw};
use crate::peaks::{find_peaks, tallest, PeakFilter};
use crate::result::CurveFit;
use crate::savgol::{savgol, DEFAULT_ORDER, DEFAULT_WINDOW};

pub const PARAMS: usize = 4;
pub const TM: usize = 2;

/// Boltzmann fit plus the derivative it was seeded from.
#[derive(Debug, Clone, PartialEq)]
pub struct MeltFit {
    pub fit: CurveFit,
    pub tm_guess: f64,
    /// Oriented first derivative (melt transitions point upwards).
    pub derivative: Vec<f64>,
}

impl MeltFit {
    fn failed(derivative: Vec<f64>) -> Self {
        Self {
            fit: CurveFit::failed(PARAMS),
            tm_guess: f64::NAN,
            derivative,
        }
    }

    /// Fitted Tm, NaN when the fit failed.
    pub fn tm(&self) -> f64 {
        if self.fit.do_fit {
            self.fit.param(TM)
        } else {
            f64::NAN
        }
    }
}

/// Fits one melt trace. Non-finite samples are dropped first.
pub fn fit_melt(temps: &[f64], signal: &[f64]) -> MeltFit {
    let (xs, ys): (Vec<f64>, Vec<f64>) = temps
        .iter()
        .zip(signal)
        .filter(|(t, y)| t.is_finite() && y.is_finite())
        .map(|(t, y)| (*t, *y))
        .unzip();
    if xs.len() <= DEFAULT_ORDER + PARAMS {
        return MeltFit::failed(Vec::new());
    }
    let smooth = savgol(&xs, &ys, DEFAULT_WINDOW, DEFAULT_ORDER);
    let n = smooth.values.len();
    let rising = smooth.values[n - 1] >= smooth.values[0];
    let derivative: Vec<f64> = smooth
        .derivative
        .iter()
        .map(|d| if rising { *d } else { -*d })
        .collect();

    let scale = smooth.values.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    if nanmax(&derivative) <= 1e-9 * scale.max(f64::MIN_POSITIVE) {
        debug!("melt trace is flat");
        return MeltFit::failed(derivative);
    }
    let Some(peak) = tallest(&find_peaks(&derivative, &PeakFilter::default())) else {
        debug!("melt derivative has no peak");
        return MeltFit::failed(derivative);
    };
    let tm_guess = xs[peak.index];
    let a = smooth.values[0];
    let b = smooth.values[n - 1];
    let steepest = smooth.derivative[peak.index];
    let slope = if steepest.abs() > f64::EPSILON {
        (b - a) / (4.0 * steepest)
    } else {
        1.0
    };
    let report = match fit(
        boltzmann,
        &xs,
        &ys,
        None,
        &[a, b, tm_guess, slope],
        &LmOptions::default(),
    ) {
        Ok(report) => report,
        Err(err) => {
            debug!(code = %err.info().code, "melt fit rejected");
            return MeltFit::failed(derivative);
        }
    };
    let predicted: Vec<f64> = xs.iter().map(|t| boltzmann(*t, &report.params)).collect();
    let params = report.params.clone();
    let curve = draw(|t| boltzmann(t, &params), xs[0], xs[xs.len() - 1], 200);
    let mut fit = CurveFit::from_report(&report, r_squared(&ys, &predicted), curve);
    let tm = fit.param(TM);
    if fit.do_fit && (tm < xs[0] || tm > xs[xs.len() - 1]) {
        debug!(tm, "fitted Tm outside the scanned range");
        fit = CurveFit::failed(PARAMS);
    }
    MeltFit {
        fit,
        tm_guess,
        derivative,
    }
}

/// Mean Tm of the reference wells of one protein; NaN when none fitted.
pub fn baseline(reference_tms: &[f64]) -> f64 {
    nanmean(reference_tms)
}

/// `round(tm - baseline, 2)`, NaN when either side is missing.
pub fn delta_tm(tm: f64, baseline: f64) -> f64 {
    round_to(tm - baseline, 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn melt(tm: f64, n: usize) -> (Vec<f64>, Vec<f64>) {
        let temps: Vec<f64> = (0..n).map(|i| 25.0 + 0.5 * i as f64).collect();
        let signal = temps.iter().map(|t| boltzmann(*t, &[0.8, 1.1, tm, 1.8])).collect();
        (temps, signal)
    }

    #[test]
    fn tm_is_recovered() {
        let (temps, signal) = melt(52.3, 120);
        let result = fit_melt(&temps, &signal);
        assert!(result.fit.do_fit);
        assert!((result.tm() - 52.3).abs() < 1e-3);
        assert!((result.tm_guess - 52.3).abs() < 1.0);
    }

    #[test]
    fn falling_melts_are_oriented() {
        let (temps, signal) = melt(60.0, 120);
        let inverted: Vec<f64> = signal.iter().map(|y| 2.0 - y).collect();
        let result = fit_melt(&temps, &inverted);
        assert!((result.tm() - 60.0).abs() < 1e-3);
    }

    #[test]
    fn flat_trace_has_no_tm() {
        let temps: Vec<f64> = (0..80).map(|i| 20.0 + i as f64).collect();
        let result = fit_melt(&temps, &vec![1.0; 80]);
        assert!(result.tm().is_nan());
        assert!(!result.fit.do_fit);
        assert!(delta_tm(result.tm(), 50.0).is_nan());
    }

    #[test]
    fn delta_is_rounded() {
        assert_eq!(delta_tm(55.4567, 50.0), 5.46);
        assert!(baseline(&[f64::NAN]).is_nan());
    }
}
