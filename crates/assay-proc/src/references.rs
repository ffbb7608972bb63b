//! Plate references: solvent, buffer and control summaries plus Z′.
//!
//! Solvent is every reference (`r`) well, buffer every `b` well, control
//! the wells of the control flagged for Z′. A category without finite
//! values is NaN throughout and makes Z′ NaN; it is not an error.

use assay_core::stats::{zprime, Summary};
use assay_layout::{Layout, WellType};
use serde::{Deserialize, Serialize};

/// Reference summaries of one plate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct References {
    pub solvent: Summary,
    pub buffer: Summary,
    pub control: Summary,
    pub zprime_mean: f64,
    pub zprime_median: f64,
}

impl Default for References {
    fn default() -> Self {
        Self {
            solvent: Summary::missing(),
            buffer: Summary::missing(),
            control: Summary::missing(),
            zprime_mean: f64::NAN,
            zprime_median: f64::NAN,
        }
    }
}

impl References {
    /// Solvent if present, else buffer: the 0 % effect reference.
    pub fn reference(&self) -> &Summary {
        if self.solvent.is_present() {
            &self.solvent
        } else {
            &self.buffer
        }
    }

    /// Mean of the 0 % reference.
    pub fn mu_ref(&self) -> f64 {
        self.reference().mean
    }

    /// Mean of the control, 0 when no control is available.
    pub fn mu_ctrl(&self) -> f64 {
        if self.control.is_present() {
            self.control.mean
        } else {
            0.0
        }
    }
}

fn gather(values: &[f64], wells: &[usize]) -> Vec<f64> {
    wells
        .iter()
        .map(|well| values.get(*well).copied().unwrap_or(f64::NAN))
        .collect()
}

/// Computes references from per-well values (NaN where a well has none).
pub fn compute_references(layout: &Layout, values: &[f64]) -> References {
    let solvent = Summary::of(&gather(values, &layout.wells_of(WellType::Reference)));
    let buffer = Summary::of(&gather(values, &layout.wells_of(WellType::Buffer)));
    let control = match layout.zprime_control() {
        Some(id) => Summary::of(&gather(values, &layout.control_wells(id))),
        None => Summary::missing(),
    };
    let positive = if solvent.is_present() { solvent } else { buffer };
    References {
        solvent,
        buffer,
        control,
        zprime_mean: zprime(positive.mean, positive.stdev, control.mean, control.stdev),
        zprime_median: zprime(positive.median, positive.mad, control.median, control.mad),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assay_core::plate::PlateFormat;
    use assay_layout::Entity;

    fn layout() -> Layout {
        let mut layout = Layout::new("P1", PlateFormat::Wells96);
        for well in 0..4 {
            let e = layout.entry_mut(well).unwrap();
            e.well_type = WellType::Reference;
            e.reference = Entity::named(0, "DMSO");
        }
        for well in 4..8 {
            let e = layout.entry_mut(well).unwrap();
            e.well_type = WellType::Control;
            e.control = Entity::named(0, "stauro");
        }
        layout.flag_zprime(0);
        layout
    }

    #[test]
    fn zprime_uses_solvent_and_flagged_control() {
        let mut values = vec![f64::NAN; 96];
        values[..4].copy_from_slice(&[100.0, 102.0, 98.0, 100.0]);
        values[4..8].copy_from_slice(&[10.0, 11.0, 9.0, 10.0]);
        let refs = compute_references(&layout(), &values);
        assert_eq!(refs.solvent.mean, 100.0);
        assert!(refs.zprime_mean > 0.8);
        assert!(refs.zprime_median > 0.8);
        assert!(!refs.buffer.is_present());
    }

    #[test]
    fn missing_control_gives_nan_zprime() {
        let mut layout = layout();
        for well in 4..8 {
            layout.entry_mut(well).unwrap().well_type = WellType::Unassigned;
        }
        let refs = compute_references(&layout, &vec![1.0; 96]);
        assert!(refs.zprime_mean.is_nan());
        assert_eq!(refs.mu_ctrl(), 0.0);
    }
}
