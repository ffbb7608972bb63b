//! Liquid-handler transfer files.
//!
//! A transfer file lists one dispense per row. The header is found by
//! scanning for the mapped column names, optionally below a section marker
//! such as `[DETAILS]`. Rows are sorted by destination, then sample, then
//! destination concentration descending.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::Path;

use assay_core::plate::{sortable_well, PlateFormat};
use assay_core::serde::load_yaml;
use assay_core::{AssayError, ErrorInfo};
use assay_read::Table;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Canonical transfer columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Column {
    Destination,
    DestinationWell,
    DestinationPlateType,
    #[serde(rename = "SampleID")]
    SampleId,
    SampleName,
    SourceConcentration,
    DestinationConcentration,
    TransferVolume,
}

fn default_section() -> Option<String> {
    Some("[DETAILS]".to_string())
}

fn default_mapping() -> BTreeMap<String, Column> {
    [
        ("Destination Plate Barcode", Column::Destination),
        ("Destination Well", Column::DestinationWell),
        ("Destination Plate Type", Column::DestinationPlateType),
        ("Sample ID", Column::SampleId),
        ("Sample Name", Column::SampleName),
        ("Source Concentration", Column::SourceConcentration),
        ("Destination Concentration", Column::DestinationConcentration),
        ("Transfer Volume", Column::TransferVolume),
    ]
    .into_iter()
    .map(|(header, column)| (header.to_string(), column))
    .collect()
}

/// How to read one liquid-handler dialect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRules {
    /// Keyword that must appear somewhere in the file.
    #[serde(default)]
    pub verification: Option<String>,
    /// Section marker below which the header row is searched.
    #[serde(default = "default_section")]
    pub section: Option<String>,
    /// Foreign header name to canonical column.
    #[serde(default = "default_mapping")]
    pub mapping: BTreeMap<String, Column>,
    /// Keep transfers that carry no sample (solvent back-fills).
    #[serde(default)]
    pub catch_solvent_only: bool,
    /// Sample ids that denote control compounds.
    #[serde(default)]
    pub control_ids: Vec<String>,
}

impl Default for TransferRules {
    fn default() -> Self {
        Self {
            verification: None,
            section: default_section(),
            mapping: default_mapping(),
            catch_solvent_only: false,
            control_ids: Vec::new(),
        }
    }
}

impl TransferRules {
    fn maps(&self, column: Column) -> bool {
        self.mapping.values().any(|mapped| *mapped == column)
    }

    /// Checks that the mapping names every mandatory column.
    pub fn validate(&self) -> Result<(), AssayError> {
        let missing: Vec<&str> = [
            (Column::Destination, "Destination"),
            (Column::DestinationWell, "DestinationWell"),
        ]
        .into_iter()
        .filter(|(column, _)| !self.maps(*column))
        .map(|(_, name)| name)
        .collect();
        if !missing.is_empty() {
            return Err(AssayError::Config(
                ErrorInfo::new("transfer.mapping", "transfer mapping lacks required columns")
                    .with_context("columns", missing.join(", ")),
            ));
        }
        if !self.maps(Column::SampleId) && !self.maps(Column::SampleName) {
            return Err(AssayError::Config(
                ErrorInfo::new("transfer.mapping", "transfer mapping needs a sample column")
                    .with_hint("map a header to SampleID or SampleName"),
            ));
        }
        Ok(())
    }

    pub fn is_control(&self, sample: &str) -> bool {
        self.control_ids.iter().any(|id| id == sample)
    }
}

/// Loads transfer rules from YAML and validates them.
pub fn load_transfer_rules(path: &Path) -> Result<TransferRules, AssayError> {
    let rules: TransferRules = load_yaml(path)?;
    rules.validate()?;
    Ok(rules)
}

/// One dispense as read from the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRow {
    pub destination: String,
    /// Sortable well label (`A01`).
    pub well: String,
    pub plate_type: Option<String>,
    pub sample: Option<String>,
    pub source_concentration: f64,
    pub destination_concentration: f64,
    pub volume: f64,
}

/// The per-well part of a [`TransferRow`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    pub sample: Option<String>,
    pub source_concentration: f64,
    pub destination_concentration: f64,
    pub volume: f64,
}

impl From<&TransferRow> for Transfer {
    fn from(row: &TransferRow) -> Self {
        Self {
            sample: row.sample.clone(),
            source_concentration: row.source_concentration,
            destination_concentration: row.destination_concentration,
            volume: row.volume,
        }
    }
}

/// Destination plate to sortable well label to transfers in file order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TransferLayout {
    pub plates: BTreeMap<String, BTreeMap<String, Vec<Transfer>>>,
}

impl TransferLayout {
    pub fn plate(&self, destination: &str) -> Option<&BTreeMap<String, Vec<Transfer>>> {
        self.plates.get(destination)
    }

    pub fn destinations(&self) -> impl Iterator<Item = &str> {
        self.plates.keys().map(String::as_str)
    }
}

/// Flat rows plus the nested per-plate layout.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedTransfer {
    pub rows: Vec<TransferRow>,
    pub layout: TransferLayout,
}

impl ParsedTransfer {
    /// Sample ids of one destination in sorted row order, without repeats.
    pub fn samples_of(&self, destination: &str) -> Vec<String> {
        let mut seen: Vec<String> = Vec::new();
        for row in self.rows.iter().filter(|row| row.destination == destination) {
            if let Some(sample) = &row.sample {
                if !seen.contains(sample) {
                    seen.push(sample.clone());
                }
            }
        }
        seen
    }
}

/// Reads and parses a transfer file.
pub fn parse_transfer(
    path: &Path,
    rules: &TransferRules,
    fmt: PlateFormat,
) -> Result<ParsedTransfer, AssayError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());
    if matches!(extension.as_deref(), Some("xlsx" | "xls" | "xlsm")) {
        return Err(AssayError::ParseMismatch(
            ErrorInfo::new("transfer.workbook", "spreadsheet transfer files are not readable")
                .with_context("path", path.display().to_string())
                .with_hint("export the transfer sheet as CSV"),
        ));
    }
    let table = Table::from_path(path)?;
    let parsed = parse_transfer_table(&table, rules, fmt).map_err(|err| match err {
        AssayError::ParseMismatch(info) => {
            AssayError::ParseMismatch(info.with_context("path", path.display().to_string()))
        }
        other => other,
    })?;
    info!(
        path = %path.display(),
        rows = parsed.rows.len(),
        plates = parsed.layout.plates.len(),
        "parsed transfer file"
    );
    Ok(parsed)
}

fn find_header(
    table: &Table,
    rules: &TransferRules,
    from: usize,
) -> Option<(usize, BTreeMap<Column, usize>)> {
    (from..table.n_rows()).find_map(|row| {
        let mut columns = BTreeMap::new();
        for (col, cell) in table.row(row).iter().enumerate() {
            if let Some(column) = rules.mapping.get(cell.trim()) {
                columns.entry(*column).or_insert(col);
            }
        }
        let usable = columns.contains_key(&Column::Destination)
            && columns.contains_key(&Column::DestinationWell)
            && (columns.contains_key(&Column::SampleId)
                || columns.contains_key(&Column::SampleName));
        usable.then_some((row, columns))
    })
}

fn compare_rows(a: &TransferRow, b: &TransferRow) -> Ordering {
    a.destination
        .cmp(&b.destination)
        .then_with(|| a.sample.cmp(&b.sample))
        .then_with(|| {
            let (x, y) = (a.destination_concentration, b.destination_concentration);
            match (x.is_nan(), y.is_nan()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => y.total_cmp(&x),
            }
        })
}

/// Parses an already materialised transfer table.
pub fn parse_transfer_table(
    table: &Table,
    rules: &TransferRules,
    fmt: PlateFormat,
) -> Result<ParsedTransfer, AssayError> {
    if let Some(keyword) = &rules.verification {
        if table.find_keyword(keyword, false, 0).is_none() {
            return Err(AssayError::ParseMismatch(
                ErrorInfo::new("transfer.not_this_format", "verification keyword not found")
                    .with_context("keyword", keyword.as_str()),
            ));
        }
    }
    let from = match &rules.section {
        Some(section) => match table.find_keyword(section, false, 0) {
            Some((row, _)) => row + 1,
            None => 0,
        },
        None => 0,
    };
    let (header_row, columns) = find_header(table, rules, from)
        .ok_or_else(|| {
            AssayError::ParseMismatch(ErrorInfo::new(
                "transfer.header",
                "no header row with the mapped columns",
            ))
        })?;

    let sample_col = columns
        .get(&Column::SampleId)
        .or_else(|| columns.get(&Column::SampleName))
        .copied();
    let text = |row: usize, column: Column| {
        columns
            .get(&column)
            .map(|col| table.cell(row, *col).trim().to_string())
            .filter(|value| !value.is_empty())
    };
    let number = |row: usize, column: Column| {
        columns
            .get(&column)
            .and_then(|col| table.float(row, *col))
            .unwrap_or(f64::NAN)
    };
    let volumes_mapped = columns.contains_key(&Column::TransferVolume);

    let mut rows = Vec::new();
    for row in header_row + 1..table.n_rows() {
        if table.is_blank_row(row) || table.cell(row, 0).trim_start().starts_with('[') {
            break;
        }
        let Some(destination) = text(row, Column::Destination) else {
            continue;
        };
        let Some(raw_well) = text(row, Column::DestinationWell) else {
            continue;
        };
        let well = match sortable_well(&raw_well, fmt) {
            Ok(well) => well,
            Err(_) => {
                debug!(row, well = %raw_well, "transfer row outside the plate format");
                continue;
            }
        };
        let volume = number(row, Column::TransferVolume);
        if volumes_mapped && !volume.is_finite() {
            continue;
        }
        let sample = sample_col
            .map(|col| table.cell(row, col).trim().to_string())
            .filter(|value| !value.is_empty());
        if sample.is_none() && !rules.catch_solvent_only {
            continue;
        }
        rows.push(TransferRow {
            destination,
            well,
            plate_type: text(row, Column::DestinationPlateType),
            sample,
            source_concentration: number(row, Column::SourceConcentration),
            destination_concentration: number(row, Column::DestinationConcentration),
            volume,
        });
    }
    rows.sort_by(compare_rows);

    let mut layout = TransferLayout::default();
    for row in &rows {
        layout
            .plates
            .entry(row.destination.clone())
            .or_default()
            .entry(row.well.clone())
            .or_default()
            .push(Transfer::from(row));
    }
    Ok(ParsedTransfer { rows, layout })
}
