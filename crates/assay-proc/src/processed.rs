//! Per-sample processed records.
//!
//! A record is a struct of parallel arrays indexed by concentration. The
//! exclusion mask is the single source of truth; the excluded views of
//! raw and normalised means are derived from it so they always agree.

use assay_core::stats::{nanmean, nansem};
use assay_fit::CurveFit;
use serde::{Deserialize, Serialize};

/// Which fit a record displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(into = "u8", try_from = "u8")]
pub enum Show {
    #[default]
    Raw,
    NormFree,
    NormConstrained,
}

impl From<Show> for u8 {
    fn from(show: Show) -> Self {
        match show {
            Show::Raw => 0,
            Show::NormFree => 1,
            Show::NormConstrained => 2,
        }
    }
}

impl TryFrom<u8> for Show {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Show::Raw),
            1 => Ok(Show::NormFree),
            2 => Ok(Show::NormConstrained),
            other => Err(format!("show selector {other} is not 0, 1 or 2")),
        }
    }
}

/// Family-specific results that do not fit the concentration arrays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Derived {
    pub tm: f64,
    pub delta_tm: f64,
    pub protein: Option<usize>,
    /// Stage-1 velocities and their propagated errors, per concentration.
    pub velocities: Vec<f64>,
    pub velocity_errors: Vec<f64>,
    /// Normalised means outside `[-20, 120]`.
    pub out_of_range: Vec<bool>,
}

impl Default for Derived {
    fn default() -> Self {
        Self {
            tm: f64::NAN,
            delta_tm: f64::NAN,
            protein: None,
            velocities: Vec::new(),
            velocity_errors: Vec::new(),
            out_of_range: Vec::new(),
        }
    }
}

/// One sample of one plate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRecord {
    pub sample_id: String,
    /// Molar, descending.
    pub concentrations: Vec<f64>,
    /// Replicate wells per concentration.
    pub locations: Vec<Vec<usize>>,
    /// Replicate values per concentration, parallel to `locations`.
    pub raw_data: Vec<Vec<f64>>,
    pub raw: Vec<f64>,
    pub raw_sem: Vec<f64>,
    pub norm: Vec<f64>,
    pub norm_sem: Vec<f64>,
    pub excluded: Vec<bool>,
    pub raw_fit: CurveFit,
    pub norm_fit_free: CurveFit,
    pub norm_fit_const: CurveFit,
    pub show: Show,
    pub derived: Derived,
}

impl SampleRecord {
    /// A record with empty fits; means are computed from `raw_data`.
    pub fn new(
        sample_id: impl Into<String>,
        concentrations: Vec<f64>,
        locations: Vec<Vec<usize>>,
        raw_data: Vec<Vec<f64>>,
        n_params: usize,
    ) -> Self {
        let raw = raw_data.iter().map(|group| nanmean(group)).collect();
        let raw_sem = raw_data.iter().map(|group| nansem(group)).collect();
        let n = concentrations.len();
        Self {
            sample_id: sample_id.into(),
            concentrations,
            locations,
            raw_data,
            raw,
            raw_sem,
            norm: vec![f64::NAN; n],
            norm_sem: vec![f64::NAN; n],
            excluded: vec![false; n],
            raw_fit: CurveFit::failed(n_params),
            norm_fit_free: CurveFit::failed(n_params),
            norm_fit_const: CurveFit::failed(n_params),
            show: Show::Raw,
            derived: Derived::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.concentrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.concentrations.is_empty()
    }

    fn masked(&self, values: &[f64]) -> Vec<f64> {
        values
            .iter()
            .zip(&self.excluded)
            .map(|(v, excluded)| if *excluded { f64::NAN } else { *v })
            .collect()
    }

    /// Raw means with excluded points as NaN.
    pub fn raw_excluded(&self) -> Vec<f64> {
        self.masked(&self.raw)
    }

    /// Normalised means with excluded points as NaN.
    pub fn norm_excluded(&self) -> Vec<f64> {
        self.masked(&self.norm)
    }

    pub fn norm_sem_excluded(&self) -> Vec<f64> {
        self.masked(&self.norm_sem)
    }

    /// Points that are neither excluded nor NaN.
    pub fn usable_points(&self) -> usize {
        self.norm_excluded().iter().filter(|v| v.is_finite()).count()
    }

    /// The fit selected by [`Show`].
    pub fn shown_fit(&self) -> &CurveFit {
        match self.show {
            Show::Raw => &self.raw_fit,
            Show::NormFree => &self.norm_fit_free,
            Show::NormConstrained => &self.norm_fit_const,
        }
    }

    /// Picks the best successful fit: constrained, then free, else raw.
    pub fn choose_show(&mut self) {
        self.show = if self.norm_fit_const.do_fit {
            Show::NormConstrained
        } else if self.norm_fit_free.do_fit {
            Show::NormFree
        } else {
            Show::Raw
        };
    }

    /// Checks that every parallel array has the concentration length and
    /// that locations lie inside the plate.
    pub fn is_consistent(&self, wells: usize) -> bool {
        let n = self.len();
        let lengths = [
            self.locations.len(),
            self.raw_data.len(),
            self.raw.len(),
            self.raw_sem.len(),
            self.norm.len(),
            self.norm_sem.len(),
            self.excluded.len(),
        ];
        lengths.iter().all(|len| *len == n)
            && self
                .locations
                .iter()
                .zip(&self.raw_data)
                .all(|(loc, data)| loc.len() == data.len() && loc.iter().all(|w| *w < wells))
    }
}

/// Processed records of one plate in transfer order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Processed {
    pub records: Vec<SampleRecord>,
}

impl Processed {
    pub fn get(&self, sample_id: &str) -> Option<&SampleRecord> {
        self.records.iter().find(|r| r.sample_id == sample_id)
    }

    pub fn get_mut(&mut self, sample_id: &str) -> Option<&mut SampleRecord> {
        self.records.iter_mut().find(|r| r.sample_id == sample_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> SampleRecord {
        SampleRecord::new(
            "X1",
            vec![1e-5, 1e-6],
            vec![vec![0, 1], vec![2, 3]],
            vec![vec![1.0, 3.0], vec![5.0, f64::NAN]],
            4,
        )
    }

    #[test]
    fn means_ignore_nan_replicates() {
        let r = record();
        assert_eq!(r.raw, vec![2.0, 5.0]);
        assert!(r.raw_sem[1].is_nan());
        assert!(r.is_consistent(96));
        assert!(!r.is_consistent(3));
    }

    #[test]
    fn excluded_views_agree() {
        let mut r = record();
        r.norm = vec![10.0, 90.0];
        r.excluded[1] = true;
        let raw = r.raw_excluded();
        let norm = r.norm_excluded();
        for (a, b) in raw.iter().zip(&norm) {
            assert_eq!(a.is_nan(), b.is_nan());
        }
        assert_eq!(r.usable_points(), 1);
    }

    #[test]
    fn show_serialises_as_digit() {
        let mut r = record();
        r.show = Show::NormConstrained;
        assert_eq!(u8::from(r.show), 2);
        assert!(Show::try_from(3).is_err());
    }
}
