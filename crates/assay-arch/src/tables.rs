//! Per-plate tables of the archive: samples, raw data, processed records,
//! references and layouts.

use std::collections::BTreeMap;

use assay_core::plate::PlateFormat;
use assay_core::stats::Summary;
use assay_core::{AssayError, ErrorInfo};
use assay_fit::CurveFit;
use assay_layout::{Entity, Layout, WellType};
use assay_proc::{Derived, References, SampleMeta, SampleRecord, Show};
use assay_read::{CapillaryTrace, RawSignal, Series};

use crate::cell::{
    bools, encode_bools, encode_floats, encode_indices, encode_nested_floats,
    encode_nested_indices, encode_points, floats, fmt_float, indices, nested_floats,
    nested_indices, parse_bool, parse_float, parse_index, points,
};
use crate::frame::Frame;

fn table_error(code: &str, message: impl Into<String>, row: usize) -> AssayError {
    AssayError::Serde(ErrorInfo::new(code, message).with_context("row", row.to_string()))
}

fn optional_index(cell: &str) -> Result<Option<usize>, AssayError> {
    let cell = cell.trim();
    if cell.is_empty() || cell.eq_ignore_ascii_case("nan") {
        Ok(None)
    } else {
        parse_index(cell).map(Some)
    }
}

fn fmt_index(id: Option<usize>) -> String {
    id.map(|id| id.to_string()).unwrap_or_default()
}

pub fn encode_samples(samples: &[SampleMeta]) -> Frame {
    let mut frame = Frame::new(&["SampleID", "Wells", "Concentrations", "Volumes"]);
    for sample in samples {
        frame.push(vec![
            sample.sample_id.clone(),
            encode_indices(&sample.wells),
            encode_floats(&sample.concentrations),
            encode_floats(&sample.volumes),
        ]);
    }
    frame
}

pub fn decode_samples(frame: &Frame) -> Result<Vec<SampleMeta>, AssayError> {
    (0..frame.len())
        .map(|row| {
            Ok(SampleMeta {
                sample_id: frame.value(row, "SampleID")?.to_string(),
                wells: indices(frame.value(row, "Wells")?)?,
                concentrations: floats(frame.value(row, "Concentrations")?)?,
                volumes: floats(frame.value(row, "Volumes")?)?,
            })
        })
        .collect()
}

const CAPILLARY_COLUMNS: [&str; 11] = [
    "Capillary",
    "Name",
    "Time",
    "Temperature",
    "Ratio",
    "F330",
    "F350",
    "Scattering",
    "RatioDerivative",
    "F330Derivative",
    "F350Derivative",
];

fn encode_optional(values: &Option<Vec<f64>>) -> String {
    values.as_deref().map(encode_floats).unwrap_or_default()
}

fn decode_optional(cell: &str) -> Result<Option<Vec<f64>>, AssayError> {
    if cell.trim().is_empty() {
        Ok(None)
    } else {
        floats(cell).map(Some)
    }
}

/// The table shape follows the signal: `Well,Value`, `Well,X,Y,Label` or
/// one row per capillary.
pub fn encode_raw(raw: &RawSignal) -> Frame {
    match raw {
        RawSignal::Scalar(values) => {
            let mut frame = Frame::new(&["Well", "Value"]);
            for (well, value) in values {
                frame.push(vec![well.to_string(), fmt_float(*value)]);
            }
            frame
        }
        RawSignal::Series(series) => {
            let mut frame = Frame::new(&["Well", "X", "Y", "Label"]);
            for (well, s) in series {
                frame.push(vec![
                    well.to_string(),
                    encode_floats(&s.x),
                    encode_floats(&s.y),
                    s.label.clone().unwrap_or_default(),
                ]);
            }
            frame
        }
        RawSignal::Capillary(traces) => {
            let mut frame = Frame::new(&CAPILLARY_COLUMNS);
            for (index, trace) in traces.iter().enumerate() {
                frame.push(vec![
                    index.to_string(),
                    trace.name.clone(),
                    encode_floats(&trace.time),
                    encode_floats(&trace.temperature),
                    encode_floats(&trace.ratio),
                    encode_floats(&trace.f330),
                    encode_floats(&trace.f350),
                    encode_floats(&trace.scattering),
                    encode_optional(&trace.ratio_derivative),
                    encode_optional(&trace.f330_derivative),
                    encode_optional(&trace.f350_derivative),
                ]);
            }
            frame
        }
    }
}

pub fn decode_raw(frame: &Frame) -> Result<RawSignal, AssayError> {
    if frame.has("Capillary") {
        let traces = (0..frame.len())
            .map(|row| {
                Ok(CapillaryTrace {
                    name: frame.value(row, "Name")?.to_string(),
                    time: floats(frame.value(row, "Time")?)?,
                    temperature: floats(frame.value(row, "Temperature")?)?,
                    ratio: floats(frame.value(row, "Ratio")?)?,
                    f330: floats(frame.value(row, "F330")?)?,
                    f350: floats(frame.value(row, "F350")?)?,
                    scattering: floats(frame.value(row, "Scattering")?)?,
                    ratio_derivative: decode_optional(frame.value(row, "RatioDerivative")?)?,
                    f330_derivative: decode_optional(frame.value(row, "F330Derivative")?)?,
                    f350_derivative: decode_optional(frame.value(row, "F350Derivative")?)?,
                })
            })
            .collect::<Result<Vec<_>, AssayError>>()?;
        return Ok(RawSignal::Capillary(traces));
    }
    if frame.has("X") {
        let mut series = BTreeMap::new();
        for row in 0..frame.len() {
            let label = frame.value(row, "Label")?;
            series.insert(
                parse_index(frame.value(row, "Well")?)?,
                Series {
                    x: floats(frame.value(row, "X")?)?,
                    y: floats(frame.value(row, "Y")?)?,
                    label: (!label.is_empty()).then(|| label.to_string()),
                },
            );
        }
        return Ok(RawSignal::Series(series));
    }
    let mut values = BTreeMap::new();
    for row in 0..frame.len() {
        values.insert(
            parse_index(frame.value(row, "Well")?)?,
            parse_float(frame.value(row, "Value")?)?,
        );
    }
    Ok(RawSignal::Scalar(values))
}

const FITS: [&str; 3] = ["RawFit", "NormFitFree", "NormFitConst"];
const FIT_FIELDS: [&str; 6] = ["Params", "CI", "Errors", "R2", "DoFit", "Curve"];
const RECORD_COLUMNS: [&str; 11] = [
    "SampleID",
    "Concentrations",
    "Locations",
    "RawData",
    "Raw",
    "RawSEM",
    "Norm",
    "NormSEM",
    "RawExcluded",
    "NormExcluded",
    "Show",
];
const DERIVED_COLUMNS: [&str; 6] = [
    "Tm",
    "DeltaTm",
    "Protein",
    "Velocities",
    "VelocityErrors",
    "OutOfRange",
];

fn processed_headers() -> Vec<String> {
    let mut headers: Vec<String> = RECORD_COLUMNS.iter().map(|c| c.to_string()).collect();
    for fit in FITS {
        headers.extend(FIT_FIELDS.iter().map(|field| format!("{fit}{field}")));
    }
    headers.extend(DERIVED_COLUMNS.iter().map(|c| c.to_string()));
    headers
}

fn fit_cells(fit: &CurveFit) -> [String; 6] {
    [
        encode_floats(&fit.params),
        encode_floats(&fit.ci),
        encode_floats(&fit.errors),
        fmt_float(fit.r2),
        fit.do_fit.to_string(),
        encode_points(&fit.curve),
    ]
}

fn decode_fit(frame: &Frame, row: usize, prefix: &str) -> Result<CurveFit, AssayError> {
    let cell = |field: &str| frame.value(row, &format!("{prefix}{field}"));
    Ok(CurveFit {
        params: floats(cell("Params")?)?,
        ci: floats(cell("CI")?)?,
        errors: floats(cell("Errors")?)?,
        r2: parse_float(cell("R2")?)?,
        do_fit: parse_bool(cell("DoFit")?)?,
        curve: points(cell("Curve")?)?,
    })
}

pub fn encode_processed(records: &[SampleRecord]) -> Frame {
    let mut frame = Frame {
        headers: processed_headers(),
        rows: Vec::with_capacity(records.len()),
    };
    for record in records {
        let mut row = vec![
            record.sample_id.clone(),
            encode_floats(&record.concentrations),
            encode_nested_indices(&record.locations),
            encode_nested_floats(&record.raw_data),
            encode_floats(&record.raw),
            encode_floats(&record.raw_sem),
            encode_floats(&record.norm),
            encode_floats(&record.norm_sem),
            // Raw and normalised points share one mask.
            encode_bools(&record.excluded),
            encode_bools(&record.excluded),
            u8::from(record.show).to_string(),
        ];
        for fit in [&record.raw_fit, &record.norm_fit_free, &record.norm_fit_const] {
            row.extend(fit_cells(fit));
        }
        let derived = &record.derived;
        row.extend([
            fmt_float(derived.tm),
            fmt_float(derived.delta_tm),
            fmt_index(derived.protein),
            encode_floats(&derived.velocities),
            encode_floats(&derived.velocity_errors),
            encode_bools(&derived.out_of_range),
        ]);
        frame.push(row);
    }
    frame
}

/// `RawExcluded`, widened by `NormExcluded` when both are present.
fn decode_excluded(frame: &Frame, row: usize) -> Result<Vec<bool>, AssayError> {
    let mut mask = bools(frame.value(row, "RawExcluded")?)?;
    if frame.has("NormExcluded") {
        let norm = bools(frame.value(row, "NormExcluded")?)?;
        if norm.len() != mask.len() {
            return Err(table_error("archive.excluded", "raw and norm masks differ in length", row));
        }
        for (raw, norm) in mask.iter_mut().zip(norm) {
            *raw |= norm;
        }
    }
    Ok(mask)
}

pub fn decode_processed(frame: &Frame) -> Result<Vec<SampleRecord>, AssayError> {
    (0..frame.len())
        .map(|row| {
            let show_code = parse_index(frame.value(row, "Show")?)?;
            let show = u8::try_from(show_code)
                .ok()
                .and_then(|code| Show::try_from(code).ok())
                .ok_or_else(|| table_error("archive.show", "fit selector out of range", row))?;
            Ok(SampleRecord {
                sample_id: frame.value(row, "SampleID")?.to_string(),
                concentrations: floats(frame.value(row, "Concentrations")?)?,
                locations: nested_indices(frame.value(row, "Locations")?)?,
                raw_data: nested_floats(frame.value(row, "RawData")?)?,
                raw: floats(frame.value(row, "Raw")?)?,
                raw_sem: floats(frame.value(row, "RawSEM")?)?,
                norm: floats(frame.value(row, "Norm")?)?,
                norm_sem: floats(frame.value(row, "NormSEM")?)?,
                excluded: decode_excluded(frame, row)?,
                raw_fit: decode_fit(frame, row, FITS[0])?,
                norm_fit_free: decode_fit(frame, row, FITS[1])?,
                norm_fit_const: decode_fit(frame, row, FITS[2])?,
                show,
                derived: Derived {
                    tm: parse_float(frame.value(row, "Tm")?)?,
                    delta_tm: parse_float(frame.value(row, "DeltaTm")?)?,
                    protein: optional_index(frame.value(row, "Protein")?)?,
                    velocities: floats(frame.value(row, "Velocities")?)?,
                    velocity_errors: floats(frame.value(row, "VelocityErrors")?)?,
                    out_of_range: bools(frame.value(row, "OutOfRange")?)?,
                },
            })
        })
        .collect()
}

fn summary_cells(category: &str, s: &Summary) -> Vec<String> {
    vec![
        category.to_string(),
        fmt_float(s.mean),
        fmt_float(s.median),
        fmt_float(s.sem),
        fmt_float(s.stdev),
        fmt_float(s.mad),
    ]
}

/// One row per reference category plus a `zprime` row carrying the mean
/// and median based Z′.
pub fn encode_references(refs: &References) -> Frame {
    let mut frame = Frame::new(&["Category", "Mean", "Median", "SEM", "Stdev", "MAD"]);
    frame.push(summary_cells("solvent", &refs.solvent));
    frame.push(summary_cells("buffer", &refs.buffer));
    frame.push(summary_cells("control", &refs.control));
    frame.push(summary_cells(
        "zprime",
        &Summary {
            mean: refs.zprime_mean,
            median: refs.zprime_median,
            ..Summary::missing()
        },
    ));
    frame
}

pub fn decode_references(frame: &Frame) -> Result<References, AssayError> {
    let mut refs = References::default();
    for row in 0..frame.len() {
        let summary = Summary {
            mean: parse_float(frame.value(row, "Mean")?)?,
            median: parse_float(frame.value(row, "Median")?)?,
            sem: parse_float(frame.value(row, "SEM")?)?,
            stdev: parse_float(frame.value(row, "Stdev")?)?,
            mad: parse_float(frame.value(row, "MAD")?)?,
        };
        match frame.value(row, "Category")? {
            "solvent" => refs.solvent = summary,
            "buffer" => refs.buffer = summary,
            "control" => refs.control = summary,
            "zprime" => {
                refs.zprime_mean = summary.mean;
                refs.zprime_median = summary.median;
            }
            other => {
                return Err(table_error(
                    "archive.reference_category",
                    format!("unknown reference category {other}"),
                    row,
                ))
            }
        }
    }
    Ok(refs)
}

const ENTITIES: [&str; 4] = ["Protein", "Control", "Reference", "Sample"];

fn layout_headers() -> Vec<String> {
    let mut headers = vec!["Well".to_string(), "WellType".to_string()];
    for entity in ENTITIES {
        headers.push(format!("{entity}Numerical"));
        headers.push(format!("{entity}ID"));
        headers.push(format!("{entity}Concentration"));
    }
    headers.push("ZPrime".to_string());
    headers
}

pub fn encode_layout(layout: &Layout) -> Frame {
    let mut frame = Frame {
        headers: layout_headers(),
        rows: Vec::with_capacity(layout.wells.len()),
    };
    for (well, entry) in layout.wells.iter().enumerate() {
        let mut row = vec![well.to_string(), entry.well_type.code().to_string()];
        for entity in [&entry.protein, &entry.control, &entry.reference, &entry.sample] {
            row.push(fmt_index(entity.id));
            row.push(entity.name.clone());
            row.push(fmt_float(entity.concentration));
        }
        row.push(entry.zprime.to_string());
        frame.push(row);
    }
    frame
}

fn decode_entity(frame: &Frame, row: usize, entity: &str) -> Result<Entity, AssayError> {
    Ok(Entity {
        id: optional_index(frame.value(row, &format!("{entity}Numerical"))?)?,
        name: frame.value(row, &format!("{entity}ID"))?.to_string(),
        concentration: parse_float(frame.value(row, &format!("{entity}Concentration"))?)?,
    })
}

pub fn decode_layout(frame: &Frame, plate_id: &str, format: PlateFormat) -> Result<Layout, AssayError> {
    let mut layout = Layout::new(plate_id, format);
    for row in 0..frame.len() {
        let well = parse_index(frame.value(row, "Well")?)?;
        let protein = decode_entity(frame, row, "Protein")?;
        let control = decode_entity(frame, row, "Control")?;
        let reference = decode_entity(frame, row, "Reference")?;
        let sample = decode_entity(frame, row, "Sample")?;
        let entry = layout.entry_mut(well)?;
        entry.well_type = WellType::from_code(frame.value(row, "WellType")?)?;
        entry.protein = protein;
        entry.control = control;
        entry.reference = reference;
        entry.sample = sample;
        entry.zprime = parse_bool(frame.value(row, "ZPrime")?)?;
    }
    Ok(layout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn references_round_trip_through_rows() {
        let refs = References {
            solvent: Summary::of(&[1.0, 2.0, 3.0]),
            zprime_mean: 0.71,
            ..References::default()
        };
        let frame = encode_references(&refs);
        assert_eq!(frame.len(), 4);
        let back = decode_references(&frame).unwrap();
        assert_eq!(back.solvent.mean.to_bits(), refs.solvent.mean.to_bits());
        assert_eq!(back.zprime_mean, 0.71);
        assert!(back.buffer.mean.is_nan());
    }

    #[test]
    fn both_exclusion_columns_are_written_and_merged() {
        let mut record = SampleRecord::new(
            "S1",
            vec![1e-6, 1e-7],
            vec![vec![0], vec![1]],
            vec![vec![1.0], vec![2.0]],
            4,
        );
        record.excluded = vec![false, true];
        let mut frame = encode_processed(std::slice::from_ref(&record));
        assert_eq!(frame.value(0, "RawExcluded").unwrap(), "[false, true]");
        assert_eq!(frame.value(0, "NormExcluded").unwrap(), "[false, true]");

        let col = frame.headers.iter().position(|h| h == "NormExcluded").unwrap();
        frame.rows[0][col] = "[true, true]".to_string();
        let back = decode_processed(&frame).unwrap();
        assert_eq!(back[0].excluded, vec![true, true]);
    }

    #[test]
    fn legacy_exclusion_column_is_read() {
        let record = SampleRecord::new("S1", vec![1e-6], vec![vec![0]], vec![vec![1.0]], 4);
        let mut frame = encode_processed(std::slice::from_ref(&record));
        let norm = frame.headers.iter().position(|h| h == "NormExcluded").unwrap();
        frame.headers.remove(norm);
        frame.rows[0].remove(norm);
        assert!(frame.rename("RawExcluded", "Exclude"));
        let legacy = frame.headers.iter().position(|h| h == "Exclude").unwrap();
        frame.rows[0][legacy] = "[true]".to_string();
        crate::compat::upgrade("processed", &mut frame);
        let back = decode_processed(&frame).unwrap();
        assert_eq!(back[0].excluded, vec![true]);
    }

    #[test]
    fn layout_ids_keep_blanks() {
        let mut layout = Layout::new("P1", PlateFormat::Wells96);
        let entry = layout.entry_mut(5).unwrap();
        entry.well_type = WellType::Control;
        entry.control = Entity::named(0, "STAURO");
        entry.zprime = true;
        let back = decode_layout(&encode_layout(&layout), "P1", PlateFormat::Wells96).unwrap();
        assert_eq!(back.entry(5).unwrap().control.id, Some(0));
        assert_eq!(back.entry(4).unwrap().control.id, None);
        assert_eq!(back.zprime_control(), Some(0));
    }
}
