use assay_fit::models::sigmoid;
use assay_fit::sigmoidal::{LOG_IC50, TOP};
use assay_fit::{fit_sigmoidal, Gate};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn dilution() -> Vec<f64> {
    (0..11).map(|i| 50e-6 / 3f64.powi(i)).collect()
}

#[test]
fn noisy_replicates_fit_both_ways() {
    let mut rng = StdRng::seed_from_u64(42);
    let conc = dilution();
    let mut mean = Vec::new();
    let mut sem = Vec::new();
    for c in &conc {
        let truth = sigmoid(c.log10(), &[100.0, 0.0, 1.0, -6.0]);
        let reps: Vec<f64> = (0..3).map(|_| truth + rng.gen_range(-3.0..3.0)).collect();
        mean.push(assay_core::stats::nanmean(&reps));
        sem.push(assay_core::stats::nansem(&reps));
    }
    let fits = fit_sigmoidal(&conc, &mean, &sem, &Gate::default());
    assert!(fits.free.do_fit && fits.constrained.do_fit);
    assert!((fits.free.param(LOG_IC50) + 6.0).abs() < 0.1);
    assert!(fits.constrained.param(TOP) <= 100.0);
    assert!(fits.free.ci.iter().all(|c| c.is_finite()));
}

#[test]
fn six_points_with_one_sem_at_limit_is_not_fitted() {
    let conc: Vec<f64> = (0..6).map(|i| 10e-6 / 3f64.powi(i)).collect();
    let norm: Vec<f64> = conc.iter().map(|c| sigmoid(c.log10(), &[100.0, 0.0, 1.0, -6.5])).collect();
    let mut sem = vec![2.0; 6];
    sem[4] = 20.0;
    let fits = fit_sigmoidal(&conc, &norm, &sem, &Gate::default());
    assert!(!fits.any());
    assert!(fits.free.r2.is_nan());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn successful_fits_are_finite(log_ic50 in -8.0f64..-5.0, hill in 0.6f64..2.5) {
        let conc = dilution();
        let norm: Vec<f64> = conc.iter().map(|c| sigmoid(c.log10(), &[100.0, 0.0, hill, log_ic50])).collect();
        let fits = fit_sigmoidal(&conc, &norm, &vec![f64::NAN; conc.len()], &Gate::default());
        for fit in [&fits.free, &fits.constrained] {
            if fit.do_fit {
                prop_assert!(fit.params.iter().all(|p| p.is_finite()));
                prop_assert!(fit.r2.is_finite());
            }
        }
    }
}
