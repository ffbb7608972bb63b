//! Plate-reader grid exports (ratio and polarisation blocks).
//!
//! A block is introduced by a keyword cell (`Ratio`, `mP`) and followed by
//! a header row numbering the columns `1..cols`, then one row per plate row
//! starting with its letter.

use std::collections::BTreeMap;
use std::path::Path;

use assay_core::plate::{row_label, PlateFormat};
use tracing::debug;

use crate::signal::RawSignal;
use crate::table::Table;

/// Values of one plate-shaped block keyed by zero-based `(row, col)`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlateGrid {
    pub values: BTreeMap<(usize, usize), f64>,
}

impl PlateGrid {
    pub fn into_signal(self, fmt: PlateFormat) -> RawSignal {
        RawSignal::Scalar(
            self.values
                .into_iter()
                .map(|((row, col), value)| (row * fmt.cols() + col, value))
                .collect(),
        )
    }
}

/// Finds the next `1, 2, ..., cols` header row at or after `from`.
pub fn find_grid_header(table: &Table, from: usize, fmt: PlateFormat) -> Option<(usize, usize)> {
    (from..table.n_rows()).find_map(|row| {
        let cells = table.row(row);
        (0..cells.len()).find_map(|col| {
            let numbered = (0..fmt.cols())
                .all(|offset| table.cell(row, col + offset) == (offset + 1).to_string());
            numbered.then_some((row, col))
        })
    })
}

/// Reads the plate rows under a header found by [`find_grid_header`].
pub fn read_grid_at(
    table: &Table,
    header: (usize, usize),
    fmt: PlateFormat,
) -> Option<PlateGrid> {
    let (header_row, first_col) = header;
    let mut values = BTreeMap::new();
    for row in 0..fmt.rows() {
        let line = header_row + 1 + row;
        if line >= table.n_rows() {
            return None;
        }
        if first_col > 0 && table.cell(line, first_col - 1) != row_label(row) {
            return None;
        }
        for col in 0..fmt.cols() {
            if let Some(value) = table.float(line, first_col + col) {
                values.insert((row, col), value);
            }
        }
    }
    if values.values().all(|v| !v.is_finite()) {
        return None;
    }
    Some(PlateGrid { values })
}

fn read_keyword_grid(path: &Path, keyword: &str, fmt: PlateFormat) -> Option<PlateGrid> {
    let table = Table::from_path(path).ok()?;
    let Some((row, _)) = table.find_keyword(keyword, false, 0) else {
        debug!(path = %path.display(), keyword, "grid keyword not found");
        return None;
    };
    let header = find_grid_header(&table, row, fmt)?;
    read_grid_at(&table, header, fmt)
}

/// Ratio block (e.g. HTRF 665/620 ratio).
pub fn read_ratio_grid(path: &Path, fmt: PlateFormat) -> Option<PlateGrid> {
    read_keyword_grid(path, "Ratio", fmt)
}

/// Fluorescence polarisation block in mP.
pub fn read_polarisation_grid(path: &Path, fmt: PlateFormat) -> Option<PlateGrid> {
    read_keyword_grid(path, "mP", fmt)
}
