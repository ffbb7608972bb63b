//! Kinetic reads: one plate grid per cycle, each preceded by its time.

use std::collections::BTreeMap;
use std::path::Path;

use assay_core::plate::PlateFormat;
use tracing::debug;

use crate::readers::grid::{find_grid_header, read_grid_at};
use crate::signal::Series;
use crate::table::Table;

fn cycle_time(table: &Table, row: usize) -> Option<f64> {
    let label = table.cell(row, 0).to_ascii_lowercase();
    if !label.starts_with("time") {
        return None;
    }
    table.float(row, 1)
}

/// Reads every cycle block into per-well time series sorted by time.
pub fn read_time_course(path: &Path, fmt: PlateFormat) -> Option<BTreeMap<usize, Series>> {
    let table = Table::from_path(path).ok()?;
    let mut cycles: Vec<(f64, BTreeMap<(usize, usize), f64>)> = Vec::new();
    let mut row = 0;
    while row < table.n_rows() {
        let Some(time) = cycle_time(&table, row) else {
            row += 1;
            continue;
        };
        let Some(header) = find_grid_header(&table, row + 1, fmt) else {
            break;
        };
        let grid = read_grid_at(&table, header, fmt)?;
        cycles.push((time, grid.values));
        row = header.0 + fmt.rows() + 1;
    }
    if cycles.is_empty() {
        debug!(path = %path.display(), "no timed cycle blocks");
        return None;
    }
    cycles.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut wells: BTreeMap<usize, Series> = BTreeMap::new();
    for (time, values) in cycles {
        for ((r, c), value) in values {
            let series = wells.entry(r * fmt.cols() + c).or_default();
            series.x.push(time);
            series.y.push(value);
        }
    }
    Some(wells)
}
