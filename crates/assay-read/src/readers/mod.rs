//! Device readers.
//!
//! Every reader takes a path and returns `None` when the file is not in its
//! format; none of them panic on foreign input. [`Device`] selects the
//! reader through a static dispatch table.

pub mod capillary;
pub mod grid;
pub mod imaging;
pub mod list;
pub mod qpcr;
pub mod timecourse;

use std::collections::BTreeMap;
use std::path::Path;

use assay_core::plate::{well_to_index, PlateFormat};
use assay_core::{AssayError, ErrorInfo};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::locate::extract;
use crate::rules::{DataKind, RuleSet};
use crate::signal::{RawSignal, Series};
use crate::table::Table;

/// Instrument export a file is expected to come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Device {
    /// Grid export with a ratio block.
    Pherastar,
    /// Grid export with a polarisation (mP) block.
    Polarisation,
    /// One-row-per-well list export.
    PherastarList,
    /// Kinetic read, one grid per cycle.
    Timecourse,
    /// qPCR melt-curve export.
    Qpcr,
    /// Capillary melt export.
    Nanodsf,
    /// Imaging object counts.
    Imaging,
    /// Foreign layout described by a rule set.
    Rules,
}

impl Device {
    /// All devices in dispatch order.
    pub const ALL: [Device; 8] = [
        Device::Pherastar,
        Device::Polarisation,
        Device::PherastarList,
        Device::Timecourse,
        Device::Qpcr,
        Device::Nanodsf,
        Device::Imaging,
        Device::Rules,
    ];

    /// Name used in configuration files and on the command line.
    pub fn name(self) -> &'static str {
        match self {
            Device::Pherastar => "pherastar",
            Device::Polarisation => "polarisation",
            Device::PherastarList => "pherastar_list",
            Device::Timecourse => "timecourse",
            Device::Qpcr => "qpcr",
            Device::Nanodsf => "nanodsf",
            Device::Imaging => "imaging",
            Device::Rules => "rules",
        }
    }

    /// Looks a device up by its configuration name.
    pub fn from_name(name: &str) -> Result<Self, AssayError> {
        let wanted = name.trim().to_ascii_lowercase();
        Device::ALL
            .into_iter()
            .find(|device| device.name() == wanted)
            .ok_or_else(|| {
                AssayError::Config(
                    ErrorInfo::new("readers.unknown_device", "no reader for this device")
                        .with_context("device", name)
                        .with_hint(
                            Device::ALL
                                .iter()
                                .map(|d| d.name())
                                .collect::<Vec<_>>()
                                .join(", "),
                        ),
                )
            })
    }

    /// Whether the device produces one value per well (not a trace).
    pub fn is_scalar(self) -> bool {
        matches!(
            self,
            Device::Pherastar | Device::Polarisation | Device::PherastarList | Device::Imaging
        )
    }
}

/// Extra information a reader may need besides the path.
#[derive(Debug, Clone, Copy)]
pub struct ReadContext<'a> {
    pub fmt: PlateFormat,
    /// Required by [`Device::Rules`].
    pub rules: Option<&'a RuleSet>,
    /// Selects the matching block of a multi-plate file.
    pub plate_id: Option<&'a str>,
    /// Block used when no id matches.
    pub position: usize,
}

impl<'a> ReadContext<'a> {
    pub fn new(fmt: PlateFormat) -> Self {
        Self {
            fmt,
            rules: None,
            plate_id: None,
            position: 0,
        }
    }
}

/// Signature shared by every reader in the dispatch table.
pub type ReaderFn = fn(&Path, &ReadContext<'_>) -> Option<RawSignal>;

const DISPATCH: [(Device, ReaderFn); 8] = [
    (Device::Pherastar, read_pherastar),
    (Device::Polarisation, read_polarisation),
    (Device::PherastarList, read_list),
    (Device::Timecourse, read_timecourse),
    (Device::Qpcr, read_qpcr),
    (Device::Nanodsf, read_nanodsf),
    (Device::Imaging, read_imaging),
    (Device::Rules, read_rules),
];

/// Rejects workbook formats no reader understands.
pub fn check_supported(path: &Path) -> Result<(), AssayError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());
    match extension.as_deref() {
        Some("xlsx" | "xls" | "xlsm") => Err(AssayError::ParseMismatch(
            ErrorInfo::new("readers.workbook", "spreadsheet workbooks are not readable")
                .with_context("path", path.display().to_string())
                .with_hint("export the sheet as CSV or tab separated text"),
        )),
        _ => Ok(()),
    }
}

/// Reader registered for `device`.
pub fn reader_for(device: Device) -> ReaderFn {
    DISPATCH
        .iter()
        .find(|(candidate, _)| *candidate == device)
        .map(|(_, reader)| *reader)
        .unwrap_or(read_rules)
}

/// Reads `path` with the reader of `device`.
pub fn read_raw(device: Device, path: &Path, ctx: &ReadContext<'_>) -> Option<RawSignal> {
    let signal = reader_for(device)(path, ctx);
    match &signal {
        Some(raw) if !raw.is_empty() => {
            debug!(device = device.name(), path = %path.display(), wells = raw.len(), "read raw data");
        }
        _ => debug!(device = device.name(), path = %path.display(), "file not recognised"),
    }
    signal.filter(|raw| !raw.is_empty())
}

fn read_pherastar(path: &Path, ctx: &ReadContext<'_>) -> Option<RawSignal> {
    grid::read_ratio_grid(path, ctx.fmt).map(|grid| grid.into_signal(ctx.fmt))
}

fn read_polarisation(path: &Path, ctx: &ReadContext<'_>) -> Option<RawSignal> {
    grid::read_polarisation_grid(path, ctx.fmt).map(|grid| grid.into_signal(ctx.fmt))
}

fn read_list(path: &Path, ctx: &ReadContext<'_>) -> Option<RawSignal> {
    let list = list::read_plate_list(path, ctx.fmt)?;
    let block = list.block_for(ctx.plate_id, ctx.position)?;
    Some(RawSignal::Scalar(
        block
            .values
            .iter()
            .filter_map(|(label, value)| well_to_index(label, ctx.fmt).ok().map(|w| (w, *value)))
            .collect(),
    ))
}

fn read_timecourse(path: &Path, ctx: &ReadContext<'_>) -> Option<RawSignal> {
    timecourse::read_time_course(path, ctx.fmt).map(RawSignal::Series)
}

fn read_qpcr(path: &Path, ctx: &ReadContext<'_>) -> Option<RawSignal> {
    qpcr::read_qpcr_melt(path, ctx.fmt).map(RawSignal::Series)
}

fn read_nanodsf(path: &Path, _ctx: &ReadContext<'_>) -> Option<RawSignal> {
    capillary::read_capillaries(path).map(RawSignal::Capillary)
}

fn read_imaging(path: &Path, ctx: &ReadContext<'_>) -> Option<RawSignal> {
    let counts = imaging::read_imaging(path, ctx.fmt)?;
    Some(RawSignal::Scalar(
        counts
            .into_iter()
            .map(|((row, col), count)| (row * ctx.fmt.cols() + col, count))
            .collect(),
    ))
}

/// One block becomes a scalar plate; several blocks become a series per
/// entry indexed by block number.
fn read_rules(path: &Path, ctx: &ReadContext<'_>) -> Option<RawSignal> {
    let rules = ctx.rules?;
    let table = Table::from_path(path).ok()?;
    let datasets = match extract(&table, rules, ctx.fmt) {
        Ok(datasets) => datasets,
        Err(err) => {
            debug!(path = %path.display(), code = %err.info().code, "rule set did not match");
            return None;
        }
    };
    let dataset = datasets.get(ctx.position).or_else(|| datasets.first())?;

    if rules.kind == DataKind::Plate && dataset.blocks.len() == 1 {
        return Some(RawSignal::Scalar(dataset.blocks[0].by_well(ctx.fmt)));
    }

    let mut series: BTreeMap<usize, Series> = BTreeMap::new();
    let mut order: Vec<String> = Vec::new();
    for (block_idx, block) in dataset.blocks.iter().enumerate() {
        for (label, value) in &block.entries {
            let key = match rules.kind {
                DataKind::Plate => match well_to_index(label, ctx.fmt) {
                    Ok(well) => well,
                    Err(_) => continue,
                },
                DataKind::Sample => match order.iter().position(|known| known == label) {
                    Some(pos) => pos,
                    None => {
                        order.push(label.clone());
                        order.len() - 1
                    }
                },
            };
            let entry = series.entry(key).or_default();
            entry.x.push(block_idx as f64);
            entry.y.push(*value);
            if rules.kind == DataKind::Sample {
                entry.label = Some(label.clone());
            }
        }
    }
    Some(RawSignal::Series(series))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for device in Device::ALL {
            assert_eq!(Device::from_name(device.name()).unwrap(), device);
        }
    }

    #[test]
    fn unknown_device_is_a_config_error() {
        let err = Device::from_name("spectramax").unwrap_err();
        assert_eq!(err.info().code, "readers.unknown_device");
    }

    #[test]
    fn workbooks_are_rejected() {
        let err = check_supported(Path::new("plate.XLSX")).unwrap_err();
        assert!(matches!(err, AssayError::ParseMismatch(_)));
        assert!(check_supported(Path::new("plate.csv")).is_ok());
    }

    #[test]
    fn dispatch_covers_every_device() {
        for device in Device::ALL {
            assert!(DISPATCH.iter().any(|(d, _)| *d == device));
        }
    }
}
