//! Savitzky–Golay smoothing and first derivative on irregular samples.
//!
//! Each point gets a local least-squares polynomial fitted over `window`
//! neighbours in actual x units; windows are shifted inwards at the edges.

use nalgebra::{DMatrix, DVector};

/// Smoothed values and first derivative, NaN when the input is too short.
#[derive(Debug, Clone, PartialEq)]
pub struct Smoothed {
    pub values: Vec<f64>,
    pub derivative: Vec<f64>,
}

pub const DEFAULT_WINDOW: usize = 20;
pub const DEFAULT_ORDER: usize = 2;

pub fn savgol(xs: &[f64], ys: &[f64], window: usize, order: usize) -> Smoothed {
    let n = xs.len().min(ys.len());
    let window = window.min(n);
    if window <= order {
        return Smoothed {
            values: vec![f64::NAN; n],
            derivative: vec![f64::NAN; n],
        };
    }
    let half = window / 2;
    let mut values = Vec::with_capacity(n);
    let mut derivative = Vec::with_capacity(n);
    for i in 0..n {
        let start = i.saturating_sub(half).min(n - window);
        let centre = xs[i];
        let design = DMatrix::from_fn(window, order + 1, |r, c| (xs[start + r] - centre).powi(c as i32));
        let target = DVector::from_iterator(window, ys[start..start + window].iter().copied());
        let normal = design.transpose() * &design;
        let rhs = design.transpose() * target;
        match normal.lu().solve(&rhs) {
            Some(coef) => {
                values.push(coef[0]);
                derivative.push(coef[1]);
            }
            None => {
                values.push(f64::NAN);
                derivative.push(f64::NAN);
            }
        }
    }
    Smoothed { values, derivative }
}
