//! Plate-reader list exports: one row per well, one block per plate.

use std::collections::BTreeMap;
use std::path::Path;

use assay_core::plate::{sortable_well, PlateFormat};
use tracing::debug;

use crate::table::Table;

const VALUE_HEADERS: [&str; 5] = ["Raw Data", "Blank corrected", "Ratio", "Value", "Result"];

/// Wells of one plate inside a list file, keyed by sortable label.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ListBlock {
    pub plate_id: Option<String>,
    pub values: BTreeMap<String, f64>,
}

/// Every plate block found in a list file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlateList {
    pub blocks: Vec<ListBlock>,
}

impl PlateList {
    /// Block matching `plate_id`, falling back to the block at `position`.
    pub fn block_for(&self, plate_id: Option<&str>, position: usize) -> Option<&ListBlock> {
        if let Some(id) = plate_id {
            if let Some(block) = self
                .blocks
                .iter()
                .find(|block| block.plate_id.as_deref() == Some(id))
            {
                return Some(block);
            }
        }
        self.blocks.get(position)
    }
}

fn plate_marker(cell: &str, next: &str) -> Option<String> {
    let lowered = cell.to_ascii_lowercase();
    if !(lowered.starts_with("plate id") || lowered.starts_with("id1")) {
        return None;
    }
    let inline = cell.split_once(':').map(|(_, rest)| rest.trim()).unwrap_or("");
    Some(if inline.is_empty() { next.trim() } else { inline }.to_string())
}

/// Reads a list export; `None` when no `Well` header is present.
pub fn read_plate_list(path: &Path, fmt: PlateFormat) -> Option<PlateList> {
    let table = Table::from_path(path).ok()?;
    let mut blocks: Vec<ListBlock> = Vec::new();
    let mut columns: Option<(usize, usize)> = None;
    let mut pending_id: Option<String> = None;

    for row in 0..table.n_rows() {
        if let Some(id) = plate_marker(table.cell(row, 0), table.cell(row, 1)) {
            pending_id = Some(id);
            columns = None;
            continue;
        }
        if let Some(well_col) = table
            .row(row)
            .iter()
            .position(|cell| cell.eq_ignore_ascii_case("well"))
        {
            let header = table.row(row);
            let value_col = header
                .iter()
                .enumerate()
                .skip(well_col + 1)
                .find(|(_, cell)| VALUE_HEADERS.iter().any(|h| cell.contains(h)))
                .map(|(col, _)| col)
                .or_else(|| header.iter().rposition(|cell| !cell.is_empty()))
                .filter(|col| *col > well_col)?;
            columns = Some((well_col, value_col));
            blocks.push(ListBlock {
                plate_id: pending_id.take(),
                values: BTreeMap::new(),
            });
            continue;
        }
        let (Some((well_col, value_col)), Some(block)) = (columns, blocks.last_mut()) else {
            continue;
        };
        let Ok(label) = sortable_well(table.cell(row, well_col), fmt) else {
            continue;
        };
        if let Some(value) = table.float(row, value_col) {
            block.values.insert(label, value);
        }
    }

    blocks.retain(|block| !block.values.is_empty());
    if blocks.is_empty() {
        debug!(path = %path.display(), "no list block with a Well header");
        return None;
    }
    Some(PlateList { blocks })
}
