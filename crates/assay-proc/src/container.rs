//! The processed project: one record per plate, in declared order.

use std::path::PathBuf;
use std::sync::Arc;

use assay_core::plate::PlateFormat;
use assay_core::AssayError;
use assay_layout::Layout;
use assay_read::RawSignal;
use serde::{Deserialize, Serialize};

use crate::family::FamilyKind;
use crate::processed::{Processed, Show};
use crate::project::AssayCategory;
use crate::references::References;
use crate::refit;

/// Per-sample metadata of a plate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleMeta {
    pub sample_id: String,
    pub wells: Vec<usize>,
    pub concentrations: Vec<f64>,
    pub volumes: Vec<f64>,
}

/// Everything known about one processed plate.
#[derive(Debug, Clone, PartialEq)]
pub struct PlateRecord {
    pub destination: String,
    pub format: PlateFormat,
    pub data_file: PathBuf,
    pub raw: RawSignal,
    pub samples: Vec<SampleMeta>,
    pub processed: Processed,
    /// Shared between plates when the project uses a global layout.
    pub layout: Arc<Layout>,
    pub references: References,
    pub plate_id: String,
}

/// A plate the pipeline skipped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlateWarning {
    pub index: usize,
    pub destination: String,
    pub error: AssayError,
}

/// Processed project.
#[derive(Debug, Clone, PartialEq)]
pub struct Container {
    pub family: FamilyKind,
    pub category: AssayCategory,
    pub plates: Vec<PlateRecord>,
    pub warnings: Vec<PlateWarning>,
}

impl Container {
    pub fn new(family: FamilyKind, category: AssayCategory) -> Self {
        Self {
            family,
            category,
            plates: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn plate_by_id(&self, plate_id: &str) -> Option<&PlateRecord> {
        self.plates.iter().find(|plate| plate.plate_id == plate_id)
    }

    /// Masks or restores one point and refits; `None` when rejected or
    /// when plate or sample do not exist.
    pub fn toggle_point(&mut self, plate: usize, sample_id: &str, index: usize) -> Option<bool> {
        let family = self.family.family();
        let record = self.plates.get_mut(plate)?.processed.get_mut(sample_id)?;
        refit::toggle_point(record, index, family)
    }

    pub fn select_show(&mut self, plate: usize, sample_id: &str, show: Show) -> Option<()> {
        let record = self.plates.get_mut(plate)?.processed.get_mut(sample_id)?;
        refit::select_show(record, show);
        Some(())
    }

    /// Number of per-sample result rows over all plates.
    pub fn result_count(&self) -> usize {
        self.plates.iter().map(|plate| plate.processed.records.len()).sum()
    }

    /// Structural invariants of every record: parallel lengths, in-plate
    /// locations, and finite parameters behind every successful fit.
    pub fn check_invariants(&self) -> bool {
        self.plates.iter().all(|plate| {
            plate.processed.records.iter().all(|record| {
                let fits_ok = [&record.raw_fit, &record.norm_fit_free, &record.norm_fit_const]
                    .iter()
                    .all(|fit| !fit.do_fit || (fit.params.iter().all(|p| p.is_finite()) && fit.r2.is_finite()));
                record.is_consistent(plate.format.wells()) && fits_ok
            })
        })
    }
}
