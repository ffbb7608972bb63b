//! Result tables: the formatted per-family export and the flat rows handed
//! to a results database.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use assay_core::{AssayError, ErrorInfo};
use assay_fit::ic50;
use assay_fit::sigmoidal::{BOTTOM, HILL, TOP};
use csv::WriterBuilder;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::container::Container;
use crate::family::FamilyKind;
use crate::project::Details;

fn wrap_csv(code: &str, err: csv::Error) -> AssayError {
    AssayError::Io(ErrorInfo::new(code, err.to_string()))
}

/// Writes the family's result table, one row per sample and plate.
/// Returns the number of data rows.
pub fn write_results<W: Write>(container: &Container, writer: W) -> Result<usize, AssayError> {
    let family = container.family.family();
    let mut writer = WriterBuilder::new().from_writer(writer);
    writer
        .write_record(family.columns())
        .map_err(|err| wrap_csv("export.header", err))?;
    let mut rows = 0;
    for plate in &container.plates {
        for record in &plate.processed.records {
            writer
                .write_record(family.row(&plate.plate_id, record))
                .map_err(|err| wrap_csv("export.row", err))?;
            rows += 1;
        }
    }
    writer
        .flush()
        .map_err(|err| wrap_csv("export.flush", err.into()))?;
    Ok(rows)
}

pub fn write_results_csv(container: &Container, path: &Path) -> Result<usize, AssayError> {
    let file = File::create(path).map_err(|err| AssayError::io("export.create", path, err))?;
    let rows = write_results(container, BufWriter::new(file))?;
    info!(path = %path.display(), rows, "results exported");
    Ok(rows)
}

/// One result as stored by a results database, keyed by sample and plate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadRow {
    pub sample_id: String,
    pub plate_id: String,
    pub assay_type: String,
    pub researcher: String,
    pub date: String,
    /// Molar; NaN when no fit succeeded.
    pub ic50: f64,
    pub hill: f64,
    pub top: f64,
    pub bottom: f64,
    pub r2: f64,
    pub tm: f64,
    pub delta_tm: f64,
    pub zprime: f64,
}

/// Flattens a container into upload rows, ordered by plate then sample.
pub fn upload_rows(container: &Container, details: &Details) -> Vec<UploadRow> {
    let mut rows = Vec::with_capacity(container.result_count());
    for plate in &container.plates {
        for record in &plate.processed.records {
            let fit = match container.family {
                FamilyKind::ThermalShift => &record.raw_fit,
                _ => record.shown_fit(),
            };
            let dose = container.family != FamilyKind::ThermalShift;
            rows.push(UploadRow {
                sample_id: record.sample_id.clone(),
                plate_id: plate.plate_id.clone(),
                assay_type: details.assay_type.clone(),
                researcher: details.researcher.clone(),
                date: details.date.clone(),
                ic50: if dose { ic50(fit) } else { f64::NAN },
                hill: if dose { fit.param(HILL) } else { f64::NAN },
                top: if dose { fit.param(TOP) } else { f64::NAN },
                bottom: if dose { fit.param(BOTTOM) } else { f64::NAN },
                r2: fit.r2,
                tm: record.derived.tm,
                delta_tm: record.derived.delta_tm,
                zprime: plate.references.zprime_mean,
            });
        }
    }
    rows
}

pub fn write_upload_csv(rows: &[UploadRow], path: &Path) -> Result<(), AssayError> {
    let mut writer = WriterBuilder::new()
        .from_path(path)
        .map_err(|err| wrap_csv("export.upload_open", err))?;
    for row in rows {
        writer
            .serialize(row)
            .map_err(|err| wrap_csv("export.upload_row", err))?;
    }
    writer
        .flush()
        .map_err(|err| wrap_csv("export.upload_flush", err.into()))
}
