//! Imaging processor tables: `Row`, `Column` and an object count per well.

use std::collections::BTreeMap;
use std::path::Path;

use assay_core::plate::{parse_row_label, PlateFormat};
use tracing::debug;

use crate::table::{parse_float, Table};

fn parse_row(cell: &str) -> Option<usize> {
    let cell = cell.trim().to_ascii_uppercase();
    match parse_float(&cell) {
        Some(number) if number.is_finite() && number >= 1.0 => Some(number as usize - 1),
        _ => parse_row_label(&cell),
    }
}

/// Counts keyed by zero-based `(row, col)`.
pub fn read_imaging(path: &Path, fmt: PlateFormat) -> Option<BTreeMap<(usize, usize), f64>> {
    let table = Table::from_path(path).ok()?;
    let header_row = (0..table.n_rows()).find(|&row| {
        table.find_in_row(row, "Row", true).is_some()
            && table.find_in_row(row, "Column", true).is_some()
    });
    let Some(header_row) = header_row else {
        debug!(path = %path.display(), "imaging header not found");
        return None;
    };
    let row_col = table.find_in_row(header_row, "Row", true)?;
    let col_col = table.find_in_row(header_row, "Column", true)?;
    let count_col = table
        .row(header_row)
        .iter()
        .position(|cell| cell.to_ascii_lowercase().contains("count"))?;

    let mut counts = BTreeMap::new();
    for row in header_row + 1..table.n_rows() {
        let (Some(r), Some(c)) = (
            parse_row(table.cell(row, row_col)),
            table.float(row, col_col),
        ) else {
            continue;
        };
        if !(c.is_finite() && c >= 1.0) {
            continue;
        }
        let c = c as usize - 1;
        if r >= fmt.rows() || c >= fmt.cols() {
            continue;
        }
        if let Some(count) = table.float(row, count_col) {
            counts.insert((r, c), count);
        }
    }
    if counts.is_empty() {
        return None;
    }
    Some(counts)
}
