//! NaN-aware reductions used by the reference engine and the fitting gate.
//!
//! Every reduction ignores NaN entries; an input without finite values
//! reduces to NaN rather than an error.

use serde::{Deserialize, Serialize};

fn finite(values: &[f64]) -> Vec<f64> {
    values.iter().copied().filter(|v| v.is_finite()).collect()
}

/// Number of finite entries.
pub fn count_finite(values: &[f64]) -> usize {
    values.iter().filter(|v| v.is_finite()).count()
}

/// Arithmetic mean of the finite entries.
pub fn nanmean(values: &[f64]) -> f64 {
    let kept = finite(values);
    if kept.is_empty() {
        return f64::NAN;
    }
    kept.iter().sum::<f64>() / kept.len() as f64
}

/// Median of the finite entries.
pub fn nanmedian(values: &[f64]) -> f64 {
    let mut kept = finite(values);
    if kept.is_empty() {
        return f64::NAN;
    }
    kept.sort_by(f64::total_cmp);
    let mid = kept.len() / 2;
    if kept.len() % 2 == 0 {
        (kept[mid - 1] + kept[mid]) / 2.0
    } else {
        kept[mid]
    }
}

/// Sample standard deviation (one delta degree of freedom).
pub fn nanstd(values: &[f64]) -> f64 {
    let kept = finite(values);
    if kept.len() < 2 {
        return f64::NAN;
    }
    let mean = kept.iter().sum::<f64>() / kept.len() as f64;
    let ss = kept.iter().map(|v| (v - mean).powi(2)).sum::<f64>();
    (ss / (kept.len() - 1) as f64).sqrt()
}

/// Standard error of the mean, `stdev / sqrt(n)`.
pub fn nansem(values: &[f64]) -> f64 {
    let n = count_finite(values);
    if n < 2 {
        return f64::NAN;
    }
    nanstd(values) / (n as f64).sqrt()
}

/// Median absolute deviation, `median(|x - median(x)|)`.
pub fn nanmad(values: &[f64]) -> f64 {
    let centre = nanmedian(values);
    if centre.is_nan() {
        return f64::NAN;
    }
    let deviations: Vec<f64> = finite(values).iter().map(|v| (v - centre).abs()).collect();
    nanmedian(&deviations)
}

/// Smallest finite entry.
pub fn nanmin(values: &[f64]) -> f64 {
    finite(values).into_iter().fold(f64::NAN, f64::min)
}

/// Largest finite entry.
pub fn nanmax(values: &[f64]) -> f64 {
    finite(values).into_iter().fold(f64::NAN, f64::max)
}

/// Rounds to the given number of decimal places.
pub fn round_to(value: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (value * scale).round() / scale
}

/// Coefficient of determination of `predicted` against `observed`.
///
/// Pairs with a NaN on either side are skipped.
pub fn r_squared(observed: &[f64], predicted: &[f64]) -> f64 {
    let pairs: Vec<(f64, f64)> = observed
        .iter()
        .zip(predicted.iter())
        .filter(|(o, p)| o.is_finite() && p.is_finite())
        .map(|(o, p)| (*o, *p))
        .collect();
    if pairs.len() < 2 {
        return f64::NAN;
    }
    let mean = pairs.iter().map(|(o, _)| o).sum::<f64>() / pairs.len() as f64;
    let ss_tot = pairs.iter().map(|(o, _)| (o - mean).powi(2)).sum::<f64>();
    let ss_res = pairs.iter().map(|(o, p)| (o - p).powi(2)).sum::<f64>();
    if ss_tot == 0.0 {
        return f64::NAN;
    }
    1.0 - ss_res / ss_tot
}

/// Pearson correlation between two replicate series, NaN pairs skipped.
pub fn pearson(xs: &[f64], ys: &[f64]) -> f64 {
    let pairs: Vec<(f64, f64)> = xs
        .iter()
        .zip(ys.iter())
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .map(|(x, y)| (*x, *y))
        .collect();
    if pairs.len() < 2 {
        return f64::NAN;
    }
    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|(_, y)| y).sum::<f64>() / n;
    let mut num = 0.0;
    let mut denom_x = 0.0;
    let mut denom_y = 0.0;
    for (x, y) in &pairs {
        let dx = x - mean_x;
        let dy = y - mean_y;
        num += dx * dy;
        denom_x += dx * dx;
        denom_y += dy * dy;
    }
    if denom_x == 0.0 || denom_y == 0.0 {
        return f64::NAN;
    }
    num / (denom_x.sqrt() * denom_y.sqrt())
}

/// Location and spread summary of one well category.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// Mean of the finite values.
    pub mean: f64,
    /// Median of the finite values.
    pub median: f64,
    /// Standard error of the mean.
    pub sem: f64,
    /// Sample standard deviation.
    pub stdev: f64,
    /// Median absolute deviation.
    pub mad: f64,
}

impl Summary {
    /// Summary of an absent category: NaN throughout.
    pub fn missing() -> Self {
        Self {
            mean: f64::NAN,
            median: f64::NAN,
            sem: f64::NAN,
            stdev: f64::NAN,
            mad: f64::NAN,
        }
    }

    /// Summarises the given values; an empty slice yields [`Summary::missing`].
    pub fn of(values: &[f64]) -> Self {
        if count_finite(values) == 0 {
            return Self::missing();
        }
        Self {
            mean: nanmean(values),
            median: nanmedian(values),
            sem: nansem(values),
            stdev: nanstd(values),
            mad: nanmad(values),
        }
    }

    /// True when the category held at least one finite value.
    pub fn is_present(&self) -> bool {
        self.mean.is_finite()
    }
}

impl Default for Summary {
    fn default() -> Self {
        Self::missing()
    }
}

/// Z' factor, `1 - 3 (sigma_pos + sigma_neg) / |mu_pos - mu_neg|`.
pub fn zprime(mu_pos: f64, sigma_pos: f64, mu_neg: f64, sigma_neg: f64) -> f64 {
    let window = (mu_pos - mu_neg).abs();
    if !window.is_finite() || window == 0.0 || !sigma_pos.is_finite() || !sigma_neg.is_finite() {
        return f64::NAN;
    }
    1.0 - 3.0 * (sigma_pos + sigma_neg) / window
}
