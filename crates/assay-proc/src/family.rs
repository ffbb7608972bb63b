//! Assay families: how each kind of assay normalises, fits and reports.
//!
//! The pipeline only talks to [`AssayFamily`]; every family is a unit
//! struct reachable through [`FamilyKind::family`].

use assay_core::stats::{nanmax, nanmin};
use assay_core::units::{write_ic50, write_percent, write_r2, write_tm};
use assay_fit::sigmoidal::{BOTTOM, HILL, TOP};
use assay_fit::{fit_free, fit_sigmoidal, ic50, CurveFit, Gate};
use serde::{Deserialize, Serialize};

use crate::processed::SampleRecord;
use crate::project::{AssayCategory, Details};
use crate::references::References;

/// Capability set of one assay family.
pub trait AssayFamily: Send + Sync {
    fn kind(&self) -> FamilyKind;

    /// Maps raw values to % effect (or a unit scale for melts).
    fn normalise(&self, values: &[f64], refs: &References) -> Vec<f64>;

    fn gate(&self) -> Gate {
        Gate::default()
    }

    /// Refits a record from its unmasked points.
    fn fit(&self, record: &mut SampleRecord);

    /// Column order of the result export.
    fn columns(&self) -> &'static [&'static str];

    /// One export row, formatted.
    fn row(&self, plate_id: &str, record: &SampleRecord) -> Vec<String>;
}

/// Serializable handle on a family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FamilyKind {
    /// HTRF, peptide displacement, AlphaScreen and Glo read-outs.
    Htrf,
    /// Fluorescence polarisation, including TAMRA tracers.
    Polarisation,
    ThermalShift,
    Rate,
}

static HTRF: Htrf = Htrf;
static POLARISATION: Polarisation = Polarisation;
static THERMAL: ThermalShift = ThermalShift;
static RATE: Rate = Rate;

impl FamilyKind {
    pub fn family(self) -> &'static dyn AssayFamily {
        match self {
            FamilyKind::Htrf => &HTRF,
            FamilyKind::Polarisation => &POLARISATION,
            FamilyKind::ThermalShift => &THERMAL,
            FamilyKind::Rate => &RATE,
        }
    }

    /// Family of a project's assay.
    pub fn for_details(details: &Details) -> Self {
        match details.category {
            AssayCategory::ThermalShift => return FamilyKind::ThermalShift,
            AssayCategory::Rate => return FamilyKind::Rate,
            _ => {}
        }
        let assay = details.assay_type.to_ascii_lowercase();
        if ["fp", "polaris", "tamra"].iter().any(|key| assay.contains(key)) {
            FamilyKind::Polarisation
        } else {
            FamilyKind::Htrf
        }
    }
}

/// `100 · (1 − (v − μ_ctrl) / (μ_ref − μ_ctrl))`.
pub fn inhibition(values: &[f64], refs: &References) -> Vec<f64> {
    let (mu_ref, mu_ctrl) = (refs.mu_ref(), refs.mu_ctrl());
    values
        .iter()
        .map(|v| 100.0 * (1.0 - (v - mu_ctrl) / (mu_ref - mu_ctrl)))
        .collect()
}

/// Inverse of [`inhibition`].
pub fn denormalise_inhibition(norm: &[f64], refs: &References) -> Vec<f64> {
    let (mu_ref, mu_ctrl) = (refs.mu_ref(), refs.mu_ctrl());
    norm.iter()
        .map(|n| mu_ctrl + (1.0 - n / 100.0) * (mu_ref - mu_ctrl))
        .collect()
}

fn fit_dose_response(record: &mut SampleRecord, gate: &Gate) {
    let norm = record.norm_excluded();
    let sem = record.norm_sem_excluded();
    let fits = fit_sigmoidal(&record.concentrations, &norm, &sem, gate);
    record.raw_fit = if fits.any() {
        fit_free(&record.concentrations, &record.raw_excluded())
    } else {
        CurveFit::failed(assay_fit::sigmoidal::PARAMS)
    };
    record.norm_fit_free = fits.free;
    record.norm_fit_const = fits.constrained;
    record.choose_show();
}

const DOSE_COLUMNS: &[&str] = &[
    "Plate", "Sample", "IC50", "Hill", "Top", "Bottom", "R²", "Fit", "Max %", "Min %",
];

fn dose_row(plate_id: &str, record: &SampleRecord) -> Vec<String> {
    let fit = record.shown_fit();
    let norm = record.norm_excluded();
    vec![
        plate_id.to_string(),
        record.sample_id.clone(),
        write_ic50(ic50(fit)),
        format!("{:.2}", fit.param(HILL)),
        write_percent(fit.param(TOP)),
        write_percent(fit.param(BOTTOM)),
        write_r2(fit.r2),
        u8::from(record.show).to_string(),
        write_percent(nanmax(&norm)),
        write_percent(nanmin(&norm)),
    ]
}

pub struct Htrf;

impl AssayFamily for Htrf {
    fn kind(&self) -> FamilyKind {
        FamilyKind::Htrf
    }

    fn normalise(&self, values: &[f64], refs: &References) -> Vec<f64> {
        inhibition(values, refs)
    }

    fn fit(&self, record: &mut SampleRecord) {
        fit_dose_response(record, &self.gate());
    }

    fn columns(&self) -> &'static [&'static str] {
        DOSE_COLUMNS
    }

    fn row(&self, plate_id: &str, record: &SampleRecord) -> Vec<String> {
        dose_row(plate_id, record)
    }
}

pub struct Polarisation;

impl AssayFamily for Polarisation {
    fn kind(&self) -> FamilyKind {
        FamilyKind::Polarisation
    }

    /// `100 · (v − μ_ref) / (μ_ctrl − μ_ref)`.
    fn normalise(&self, values: &[f64], refs: &References) -> Vec<f64> {
        let (mu_ref, mu_ctrl) = (refs.mu_ref(), refs.mu_ctrl());
        values
            .iter()
            .map(|v| 100.0 * (v - mu_ref) / (mu_ctrl - mu_ref))
            .collect()
    }

    fn fit(&self, record: &mut SampleRecord) {
        fit_dose_response(record, &self.gate());
    }

    fn columns(&self) -> &'static [&'static str] {
        DOSE_COLUMNS
    }

    fn row(&self, plate_id: &str, record: &SampleRecord) -> Vec<String> {
        dose_row(plate_id, record)
    }
}

pub struct ThermalShift;

impl AssayFamily for ThermalShift {
    fn kind(&self) -> FamilyKind {
        FamilyKind::ThermalShift
    }

    /// Min–max scaling of one trace onto `[0, 1]`.
    fn normalise(&self, values: &[f64], _refs: &References) -> Vec<f64> {
        let (lo, hi) = (nanmin(values), nanmax(values));
        let span = hi - lo;
        values
            .iter()
            .map(|v| if span > 0.0 { (v - lo) / span } else { f64::NAN })
            .collect()
    }

    /// A no-op. Each record holds one Tm per well and the melt trace
    /// stays with the plate's raw signal, so there are no points to refit
    /// and the record is left untouched.
    fn fit(&self, _record: &mut SampleRecord) {}

    fn columns(&self) -> &'static [&'static str] {
        &["Plate", "Sample", "Well", "Protein", "Tm", "ΔTm", "R²", "Fit"]
    }

    fn row(&self, plate_id: &str, record: &SampleRecord) -> Vec<String> {
        let well = record
            .locations
            .first()
            .and_then(|group| group.first())
            .map(|w| w.to_string())
            .unwrap_or_default();
        vec![
            plate_id.to_string(),
            record.sample_id.clone(),
            well,
            record.derived.protein.map(|p| p.to_string()).unwrap_or_default(),
            write_tm(record.derived.tm),
            if record.derived.delta_tm.is_finite() {
                format!("{:.2}", record.derived.delta_tm)
            } else {
                "n.d.".to_string()
            },
            write_r2(record.raw_fit.r2),
            record.raw_fit.do_fit.to_string(),
        ]
    }
}

pub struct Rate;

impl AssayFamily for Rate {
    fn kind(&self) -> FamilyKind {
        FamilyKind::Rate
    }

    /// Velocities between solvent (0 %) and control (100 %).
    fn normalise(&self, values: &[f64], refs: &References) -> Vec<f64> {
        inhibition(values, refs)
    }

    fn fit(&self, record: &mut SampleRecord) {
        let norm = record.norm_excluded();
        let usable = norm.iter().filter(|v| v.is_finite()).count();
        record.norm_fit_free = if usable >= self.gate().min_points {
            fit_free(&record.concentrations, &norm)
        } else {
            CurveFit::failed(assay_fit::sigmoidal::PARAMS)
        };
        record.norm_fit_const = CurveFit::failed(assay_fit::sigmoidal::PARAMS);
        record.choose_show();
    }

    fn columns(&self) -> &'static [&'static str] {
        &["Plate", "Sample", "IC50", "Hill", "R²", "Fit", "Velocities"]
    }

    fn row(&self, plate_id: &str, record: &SampleRecord) -> Vec<String> {
        let fit = &record.norm_fit_free;
        let velocities: Vec<String> = record
            .derived
            .velocities
            .iter()
            .map(|v| format!("{v:.4}"))
            .collect();
        vec![
            plate_id.to_string(),
            record.sample_id.clone(),
            write_ic50(ic50(fit)),
            format!("{:.2}", fit.param(HILL)),
            write_r2(fit.r2),
            u8::from(record.show).to_string(),
            format!("[{}]", velocities.join(", ")),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assay_core::stats::Summary;

    fn refs() -> References {
        References {
            solvent: Summary::of(&[2000.0, 2100.0, 1900.0]),
            control: Summary::of(&[300.0, 310.0, 290.0]),
            ..References::default()
        }
    }

    #[test]
    fn htrf_round_trip_reproduces_raw() {
        let raw = [2000.0, 1150.0, 300.0, 777.7];
        let norm = inhibition(&raw, &refs());
        assert!((norm[0] - 0.0).abs() < 1e-9);
        assert!((norm[2] - 100.0).abs() < 1e-9);
        let back = denormalise_inhibition(&norm, &refs());
        for (a, b) in raw.iter().zip(&back) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn polarisation_rises_towards_control() {
        let r = References {
            solvent: Summary::of(&[50.0]),
            control: Summary::of(&[250.0]),
            ..References::default()
        };
        let norm = Polarisation.normalise(&[50.0, 150.0, 250.0], &r);
        assert_eq!(norm, vec![0.0, 50.0, 100.0]);
    }

    #[test]
    fn missing_control_uses_zero() {
        let r = References {
            solvent: Summary::of(&[200.0]),
            ..References::default()
        };
        let norm = Htrf.normalise(&[100.0], &r);
        assert!((norm[0] - 50.0).abs() < 1e-12);
    }

    #[test]
    fn families_follow_assay_type() {
        let mut details = Details::template("TAMRA");
        assert_eq!(FamilyKind::for_details(&details), FamilyKind::Polarisation);
        details = Details::template("AlphaScreen");
        assert_eq!(FamilyKind::for_details(&details), FamilyKind::Htrf);
        details.category = AssayCategory::Rate;
        assert_eq!(FamilyKind::for_details(&details), FamilyKind::Rate);
    }

    #[test]
    fn melt_scaling_is_unit_range() {
        let scaled = ThermalShift.normalise(&[2.0, 4.0, 6.0], &References::default());
        assert_eq!(scaled, vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn thermal_fit_leaves_the_record_alone() {
        let mut record = SampleRecord::new("T1", vec![0.0], vec![vec![5]], vec![vec![52.3]], 2);
        record.derived.tm = 52.3;
        record.show = crate::processed::Show::NormFree;
        let fit_before = record.raw_fit.do_fit;
        ThermalShift.fit(&mut record);
        assert_eq!(record.show, crate::processed::Show::NormFree);
        assert_eq!(record.raw_fit.do_fit, fit_before);
        assert_eq!(record.derived.tm, 52.3);
    }
}
