//! Per-plate well layout: what kind of content every well holds.

use std::collections::BTreeSet;
use std::fmt::{self, Display};

use assay_core::plate::{index_to_well, PlateFormat};
use assay_core::{AssayError, ErrorInfo};
use serde::{Deserialize, Serialize};

/// Content class of a well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum WellType {
    #[serde(rename = "s")]
    Sample,
    #[serde(rename = "r")]
    Reference,
    #[serde(rename = "c")]
    Control,
    #[serde(rename = "b")]
    Buffer,
    #[default]
    #[serde(rename = "na")]
    Unassigned,
}

impl WellType {
    pub fn code(self) -> &'static str {
        match self {
            WellType::Sample => "s",
            WellType::Reference => "r",
            WellType::Control => "c",
            WellType::Buffer => "b",
            WellType::Unassigned => "na",
        }
    }

    pub fn from_code(code: &str) -> Result<Self, AssayError> {
        match code.trim() {
            "s" => Ok(WellType::Sample),
            "r" => Ok(WellType::Reference),
            "c" => Ok(WellType::Control),
            "b" => Ok(WellType::Buffer),
            "na" | "" | "nan" => Ok(WellType::Unassigned),
            other => Err(AssayError::LayoutInconsistent(
                ErrorInfo::new("layout.well_type", "unknown well type").with_context("type", other),
            )),
        }
    }
}

impl Display for WellType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Numerical id, name and concentration of one well constituent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Zero-based numerical id within the plate.
    pub id: Option<usize>,
    pub name: String,
    pub concentration: f64,
}

impl Default for Entity {
    fn default() -> Self {
        Self {
            id: None,
            name: String::new(),
            concentration: f64::NAN,
        }
    }
}

impl Entity {
    pub fn named(id: usize, name: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            name: name.into(),
            concentration: f64::NAN,
        }
    }

    pub fn is_set(&self) -> bool {
        self.id.is_some()
    }
}

/// Everything the layout records about one well.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct WellEntry {
    pub well_type: WellType,
    #[serde(default)]
    pub protein: Entity,
    #[serde(default)]
    pub control: Entity,
    #[serde(default)]
    pub reference: Entity,
    #[serde(default)]
    pub sample: Entity,
    /// Marks the control used for Z′.
    #[serde(default)]
    pub zprime: bool,
}

/// Well layout of one plate, one entry per well index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layout {
    pub plate_id: String,
    pub format: PlateFormat,
    pub wells: Vec<WellEntry>,
}

impl Layout {
    /// A layout with every well unassigned.
    pub fn new(plate_id: impl Into<String>, format: PlateFormat) -> Self {
        Self {
            plate_id: plate_id.into(),
            format,
            wells: vec![WellEntry::default(); format.wells()],
        }
    }

    pub fn entry(&self, well: usize) -> Option<&WellEntry> {
        self.wells.get(well)
    }

    pub fn entry_mut(&mut self, well: usize) -> Result<&mut WellEntry, AssayError> {
        let format = self.format;
        self.wells.get_mut(well).ok_or_else(|| {
            AssayError::InvalidWell(
                ErrorInfo::new("layout.well", "well index outside the plate")
                    .with_context("well", well.to_string())
                    .with_context("format", format.to_string()),
            )
        })
    }

    pub fn well_type(&self, well: usize) -> WellType {
        self.entry(well).map(|e| e.well_type).unwrap_or_default()
    }

    /// Wells of the given type in index order.
    pub fn wells_of(&self, well_type: WellType) -> Vec<usize> {
        self.wells
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.well_type == well_type)
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Id of the control flagged for Z′, if any.
    pub fn zprime_control(&self) -> Option<usize> {
        self.wells
            .iter()
            .find(|entry| entry.well_type == WellType::Control && entry.zprime)
            .and_then(|entry| entry.control.id)
    }

    /// Wells holding the control with the given id.
    pub fn control_wells(&self, control: usize) -> Vec<usize> {
        self.wells
            .iter()
            .enumerate()
            .filter(|(_, e)| e.well_type == WellType::Control && e.control.id == Some(control))
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Distinct protein ids present on the plate.
    pub fn proteins(&self) -> BTreeSet<usize> {
        self.wells.iter().filter_map(|entry| entry.protein.id).collect()
    }

    /// Flags every well of `control` for Z′ and clears the flag elsewhere.
    pub fn flag_zprime(&mut self, control: usize) {
        for entry in &mut self.wells {
            entry.zprime = entry.well_type == WellType::Control && entry.control.id == Some(control);
        }
    }

    fn inconsistent(&self, code: &str, message: &str, well: Option<usize>) -> AssayError {
        let mut info =
            ErrorInfo::new(code, message).with_context("plate_id", self.plate_id.clone());
        if let Some(well) = well {
            let label = index_to_well(well, self.format).unwrap_or_else(|_| well.to_string());
            info = info.with_context("well", label);
        }
        AssayError::LayoutInconsistent(info)
    }

    /// Checks the per-well id invariants and the single Z′ control rule.
    pub fn validate(&self) -> Result<(), AssayError> {
        if self.wells.len() != self.format.wells() {
            return Err(self.inconsistent(
                "layout.size",
                "layout does not cover the plate format",
                None,
            ));
        }
        for (well, entry) in self.wells.iter().enumerate() {
            match entry.well_type {
                WellType::Control if !entry.control.is_set() => {
                    return Err(self.inconsistent(
                        "layout.control_id",
                        "control well without control id",
                        Some(well),
                    ))
                }
                WellType::Reference if !entry.reference.is_set() => {
                    return Err(self.inconsistent(
                        "layout.reference_id",
                        "reference well without reference id",
                        Some(well),
                    ))
                }
                _ => {}
            }
        }
        let flagged: BTreeSet<usize> = self
            .wells
            .iter()
            .filter(|entry| entry.zprime && entry.well_type == WellType::Control)
            .filter_map(|entry| entry.control.id)
            .collect();
        if flagged.len() > 1 {
            return Err(self.inconsistent(
                "layout.zprime_multiple",
                "more than one control is flagged for Z′",
                None,
            ));
        }
        let has_controls = self.wells.iter().any(|e| e.well_type == WellType::Control);
        if has_controls && flagged.is_empty() {
            return Err(self.inconsistent(
                "layout.zprime_missing",
                "controls are present but none is flagged for Z′",
                None,
            ));
        }
        Ok(())
    }
}
