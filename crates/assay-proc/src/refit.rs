//! User-driven point exclusion.
//!
//! A toggle is transactional: when excluding a point would leave fewer
//! usable points than the gate needs, nothing changes and `None` comes
//! back. Restoring a point is always allowed.

use tracing::{debug, warn};

use crate::family::AssayFamily;
use crate::processed::{SampleRecord, Show};

/// Flips the mask of concentration `index` and refits.
///
/// Returns the new mask value, or `None` when the toggle was rejected.
pub fn toggle_point(
    record: &mut SampleRecord,
    index: usize,
    family: &dyn AssayFamily,
) -> Option<bool> {
    let current = *record.excluded.get(index)?;
    if !current {
        let remaining = record.usable_points()
            - usize::from(record.norm.get(index).is_some_and(|v| v.is_finite()));
        if remaining < family.gate().min_points {
            warn!(
                sample = %record.sample_id,
                index,
                remaining,
                "exclusion rejected, too few points would remain"
            );
            return None;
        }
    }
    record.excluded[index] = !current;
    family.fit(record);
    debug!(sample = %record.sample_id, index, excluded = !current, "refitted after toggle");
    Some(!current)
}

/// Changes the displayed fit without refitting.
pub fn select_show(record: &mut SampleRecord, show: Show) {
    record.show = show;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::family::Htrf;
    use assay_fit::models::sigmoid;

    fn fitted(points: usize) -> SampleRecord {
        let conc: Vec<f64> = (0..points).map(|i| 30e-6 / 3f64.powi(i as i32)).collect();
        let locations: Vec<Vec<usize>> = (0..points).map(|i| vec![i]).collect();
        let norm: Vec<f64> = conc
            .iter()
            .enumerate()
            .map(|(i, c)| sigmoid(c.log10(), &[100.0, 0.0, 1.0, -6.2]) + if i % 2 == 0 { 0.7 } else { -0.7 })
            .collect();
        let raw_data = norm.iter().map(|n| vec![1000.0 - 8.0 * n]).collect();
        let mut record = SampleRecord::new("X1", conc, locations, raw_data, 4);
        record.norm = norm;
        Htrf.fit(&mut record);
        record
    }

    #[test]
    fn exclude_then_restore_gives_the_same_fit() {
        let mut record = fitted(11);
        assert!(record.norm_fit_free.do_fit);
        let before = record.norm_fit_free.params.clone();
        assert_eq!(toggle_point(&mut record, 3, &Htrf), Some(true));
        assert!(record.norm_excluded()[3].is_nan());
        assert_eq!(toggle_point(&mut record, 3, &Htrf), Some(false));
        for (a, b) in before.iter().zip(&record.norm_fit_free.params) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn toggle_that_leaves_too_few_points_is_rejected() {
        let mut record = fitted(6);
        let mask = record.excluded.clone();
        assert_eq!(toggle_point(&mut record, 0, &Htrf), None);
        assert_eq!(record.excluded, mask);
    }

    #[test]
    fn show_can_be_switched_without_refit() {
        let mut record = fitted(11);
        let params = record.norm_fit_const.params.clone();
        select_show(&mut record, Show::Raw);
        assert_eq!(record.show, Show::Raw);
        assert!(record
            .norm_fit_const
            .params
            .iter()
            .zip(&params)
            .all(|(a, b)| a.to_bits() == b.to_bits()));
    }
}
