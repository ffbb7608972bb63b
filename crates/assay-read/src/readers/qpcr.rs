//! qPCR melt-curve exports (`[Melt Curve Raw Data]` section).

use std::collections::BTreeMap;
use std::path::Path;

use assay_core::plate::{well_to_index, PlateFormat};
use tracing::debug;

use crate::signal::Series;
use crate::table::Table;

const SECTION: &str = "[Melt Curve Raw Data]";

/// Per-well melt readings: x is temperature, y fluorescence, label the sample name.
pub fn read_qpcr_melt(path: &Path, fmt: PlateFormat) -> Option<BTreeMap<usize, Series>> {
    let table = Table::from_path(path).ok()?;
    let Some((section_row, _)) = table.find_keyword(SECTION, true, 0) else {
        debug!(path = %path.display(), "melt curve section missing");
        return None;
    };
    let header_row = (section_row + 1..table.n_rows()).find(|&row| !table.is_blank_row(row))?;
    let column = |name: &str| table.find_in_row(header_row, name, true);
    let well_col = column("Well Position")?;
    let temp_col = column("Temperature")?;
    let fluor_col = column("Fluorescence")?;
    let name_col = column("Sample Name");

    let mut wells: BTreeMap<usize, Series> = BTreeMap::new();
    for row in header_row + 1..table.n_rows() {
        if table.is_blank_row(row) || table.cell(row, 0).starts_with('[') {
            break;
        }
        let Ok(well) = well_to_index(table.cell(row, well_col), fmt) else {
            continue;
        };
        let (Some(temp), Some(fluor)) = (table.float(row, temp_col), table.float(row, fluor_col))
        else {
            continue;
        };
        let series = wells.entry(well).or_default();
        series.x.push(temp);
        series.y.push(fluor);
        if series.label.is_none() {
            series.label = name_col
                .map(|col| table.cell(row, col).to_string())
                .filter(|name| !name.is_empty());
        }
    }
    if wells.is_empty() {
        return None;
    }
    Some(wells)
}
