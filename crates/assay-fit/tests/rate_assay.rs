use assay_fit::models::{log_mm, sigmoid};
use assay_fit::{fit_rate, Window};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const HIGH: f64 = 8.0;
const LOW: f64 = 0.5;

fn canonical_traces(conc: &[f64], rng: &mut StdRng) -> Vec<(Vec<f64>, Vec<f64>)> {
    let times: Vec<f64> = (0..60).map(|i| i as f64 * 5.0).collect();
    conc.iter()
        .map(|c| {
            let effect = sigmoid(c.log10(), &[100.0, 0.0, 1.0, -6.5]);
            let v = HIGH - effect / 100.0 * (HIGH - LOW);
            let p2 = 80.0;
            let signal = times
                .iter()
                .map(|t| log_mm(*t, &[200.0, v * p2, p2]) + rng.gen_range(-0.2..0.2))
                .collect();
            (times.clone(), signal)
        })
        .collect()
}

#[test]
fn eleven_concentrations_give_a_finite_ic50() {
    let mut rng = StdRng::seed_from_u64(7);
    let conc: Vec<f64> = (0..11).map(|i| 100e-6 / 3f64.powi(i)).collect();
    // Two replicate traces per concentration, averaged point-wise.
    let a = canonical_traces(&conc, &mut rng);
    let b = canonical_traces(&conc, &mut rng);
    let traces: Vec<(Vec<f64>, Vec<f64>)> = a
        .into_iter()
        .zip(b)
        .map(|((t, ya), (_, yb))| (t, ya.iter().zip(&yb).map(|(x, y)| (x + y) / 2.0).collect()))
        .collect();

    let result = fit_rate(&conc, &traces, Window::default(), HIGH, LOW);
    assert_eq!(result.velocities.len(), 11);
    assert!(result.velocities.iter().all(|v| v.v.is_finite() && v.error.is_finite()));
    assert!(result.fit.do_fit);
    assert!(assay_fit::ic50(&result.fit).is_finite());
    assert!(result.fit.r2 >= 0.9);
}

#[test]
fn failed_traces_are_left_out_of_stage_two() {
    let mut rng = StdRng::seed_from_u64(11);
    let conc: Vec<f64> = (0..8).map(|i| 100e-6 / 3f64.powi(i)).collect();
    let mut traces = canonical_traces(&conc, &mut rng);
    traces[3].1 = vec![f64::NAN; traces[3].0.len()];
    let result = fit_rate(&conc, &traces, Window::default(), HIGH, LOW);
    assert!(result.velocities[3].v.is_nan());
    assert!(result.normalised[3].is_nan());
    assert!(result.fit.do_fit);
}
