//! Multi-wavelength capillary melts (nanoDSF style exports).
//!
//! Row 0 names each capillary at the first column of its group; row 1
//! names the quantity of every column; readings start on row 2.

use std::path::Path;

use tracing::debug;

use crate::signal::CapillaryTrace;
use crate::table::Table;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quantity {
    Time,
    Temperature,
    Ratio,
    F330,
    F350,
    Scattering,
    RatioDerivative,
    F330Derivative,
    F350Derivative,
}

fn classify(header: &str) -> Option<Quantity> {
    let lowered = header.to_ascii_lowercase();
    let derivative = lowered.contains("deriv");
    if lowered.contains("ratio") {
        return Some(if derivative { Quantity::RatioDerivative } else { Quantity::Ratio });
    }
    if lowered.contains("330") {
        return Some(if derivative { Quantity::F330Derivative } else { Quantity::F330 });
    }
    if lowered.contains("350") {
        return Some(if derivative { Quantity::F350Derivative } else { Quantity::F350 });
    }
    if lowered.contains("temp") {
        return Some(Quantity::Temperature);
    }
    if lowered.contains("time") {
        return Some(Quantity::Time);
    }
    if lowered.contains("scatter") {
        return Some(Quantity::Scattering);
    }
    None
}

/// Reads every capillary group; `None` when the quantity header is not recognised.
pub fn read_capillaries(path: &Path) -> Option<Vec<CapillaryTrace>> {
    let table = Table::from_path(path).ok()?;
    let quantities = table.row(1);
    let has_temp = quantities.iter().any(|cell| cell.contains("Temp"));
    let has_ratio = quantities.iter().any(|cell| cell.contains("Ratio"));
    if !has_temp || !has_ratio {
        debug!(path = %path.display(), "capillary quantity header not recognised");
        return None;
    }

    let width = table.n_cols();
    let group_starts: Vec<usize> = (0..width)
        .filter(|&col| !table.cell(0, col).is_empty())
        .collect();
    let mut traces = Vec::with_capacity(group_starts.len());
    for (idx, &start) in group_starts.iter().enumerate() {
        let end = group_starts.get(idx + 1).copied().unwrap_or(width);
        let columns: Vec<(usize, Quantity)> = (start..end)
            .filter_map(|col| classify(table.cell(1, col)).map(|q| (col, q)))
            .collect();
        let find = |q: Quantity| columns.iter().find(|(_, kind)| *kind == q).map(|(c, _)| *c);
        let (Some(temp_col), Some(ratio_col)) = (find(Quantity::Temperature), find(Quantity::Ratio))
        else {
            continue;
        };
        let mut trace = CapillaryTrace {
            name: table.cell(0, start).to_string(),
            ..CapillaryTrace::default()
        };
        let derivative_cols = (
            find(Quantity::RatioDerivative),
            find(Quantity::F330Derivative),
            find(Quantity::F350Derivative),
        );
        let mut ratio_d = Vec::new();
        let mut f330_d = Vec::new();
        let mut f350_d = Vec::new();
        let value = |row: usize, col: Option<usize>| {
            col.and_then(|c| table.float(row, c)).unwrap_or(f64::NAN)
        };
        for row in 2..table.n_rows() {
            let (Some(temp), Some(ratio)) = (table.float(row, temp_col), table.float(row, ratio_col))
            else {
                continue;
            };
            trace.time.push(value(row, find(Quantity::Time)));
            trace.temperature.push(temp);
            trace.ratio.push(ratio);
            trace.f330.push(value(row, find(Quantity::F330)));
            trace.f350.push(value(row, find(Quantity::F350)));
            trace.scattering.push(value(row, find(Quantity::Scattering)));
            ratio_d.push(value(row, derivative_cols.0));
            f330_d.push(value(row, derivative_cols.1));
            f350_d.push(value(row, derivative_cols.2));
        }
        if trace.ratio.is_empty() {
            continue;
        }
        trace.ratio_derivative = derivative_cols.0.map(|_| ratio_d);
        trace.f330_derivative = derivative_cols.1.map(|_| f330_d);
        trace.f350_derivative = derivative_cols.2.map(|_| f350_d);
        traces.push(trace);
    }
    if traces.is_empty() {
        return None;
    }
    Some(traces)
}
