//! Model functions shared by the fits.

/// Four-parameter logistic on log10 molar concentration.
///
/// `params = [top, bottom, hill, log_ic50]`.
pub fn sigmoid(log_conc: f64, params: &[f64]) -> f64 {
    let (top, bottom, hill, log_ic50) = (params[0], params[1], params[2], params[3]);
    bottom + (top - bottom) / (1.0 + 10f64.powf((log_ic50 - log_conc) * hill))
}

/// Boltzmann melt, `params = [a, b, tm, slope]`.
pub fn boltzmann(temp: f64, params: &[f64]) -> f64 {
    let (a, b, tm, slope) = (params[0], params[1], params[2], params[3]);
    a + (b - a) / (1.0 + ((tm - temp) / slope).exp())
}

/// Logarithmic Michaelis–Menten progress curve, `params = [p0, p1, p2]`.
///
/// The initial velocity is `p1 / p2`.
pub fn log_mm(time: f64, params: &[f64]) -> f64 {
    let (p0, p1, p2) = (params[0], params[1], params[2]);
    p0 + p1 * (1.0 + time / p2).ln()
}

/// Evenly spaced samples of `model` between `lo` and `hi`.
pub fn draw(model: impl Fn(f64) -> f64, lo: f64, hi: f64, points: usize) -> Vec<[f64; 2]> {
    if !lo.is_finite() || !hi.is_finite() || points < 2 {
        return Vec::new();
    }
    let step = (hi - lo) / (points - 1) as f64;
    (0..points)
        .map(|i| {
            let x = lo + step * i as f64;
            [x, model(x)]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sigmoid_is_half_way_at_ic50() {
        let p = [100.0, 0.0, 1.2, -6.0];
        assert!((sigmoid(-6.0, &p) - 50.0).abs() < 1e-12);
        assert!(sigmoid(-3.0, &p) > 99.0);
        assert!(sigmoid(-9.0, &p) < 1.0);
    }

    #[test]
    fn boltzmann_is_half_way_at_tm() {
        let p = [1.0, 3.0, 55.0, 1.5];
        assert!((boltzmann(55.0, &p) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn log_mm_slope_at_origin_is_velocity() {
        let p = [0.0, 40.0, 20.0];
        let h = 1e-6;
        let slope = (log_mm(h, &p) - log_mm(0.0, &p)) / h;
        assert!((slope - 2.0).abs() < 1e-4);
    }
}
