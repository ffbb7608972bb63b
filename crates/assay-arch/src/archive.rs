//! Saving and loading project archives.
//!
//! An archive holds the project configuration as YAML, project-level
//! tables as CSV and one directory of tables per processed plate. Layout
//! tables live under `layout/<index>/`. Entries are written in a fixed
//! order with zeroed timestamps so equal projects give equal bytes.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::{Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use assay_core::plate::PlateFormat;
use assay_core::serde::{from_json_slice, from_yaml_slice, to_canonical_json_bytes, to_yaml_string};
use assay_core::{AssayError, ErrorInfo};
use assay_layout::{Layout, TransferRules};
use assay_proc::{Container, Details, FamilyKind, PlateRecord, PlateSpec, PlateWarning, Processed, Project};
use assay_read::RuleSet;
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use zip::write::FileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

use crate::cell::{parse_bool, parse_index};
use crate::compat::{is_legacy, shift_ids, upgrade};
use crate::frame::Frame;
use crate::scratch::{scratch_root, Scratch};
use crate::tables;

const DETAILS: &str = "details.yaml";
const TRANSFER_RULES: &str = "transfer_rules.yaml";
const RAW_RULES: &str = "raw_rules.yaml";
const META: &str = "meta.csv";
const BOOLEAN: &str = "boolean.csv";
const PATHS: &str = "paths.csv";
const PLATES: &str = "plates.csv";
const WARNINGS: &str = "warnings.csv";

fn samples_entry(index: usize) -> String {
    format!("{index}/samples.csv")
}

fn raw_entry(index: usize) -> String {
    format!("{index}/rawdata.csv")
}

fn processed_entry(index: usize) -> String {
    format!("{index}/processed.csv")
}

fn references_entry(index: usize) -> String {
    format!("{index}/references.csv")
}

fn layout_entry(index: usize) -> String {
    format!("layout/{index}/layout.csv")
}

fn archive_error(code: &str, message: impl Into<String>, path: &Path) -> AssayError {
    AssayError::Io(ErrorInfo::new(code, message).with_context("path", path.display().to_string()))
}

fn zip_error(code: &str, path: &Path, err: zip::result::ZipError) -> AssayError {
    archive_error(code, err.to_string(), path)
}

struct EntryWriter<W: Write + Seek> {
    zip: ZipWriter<W>,
    options: FileOptions,
    path: PathBuf,
}

impl<W: Write + Seek> EntryWriter<W> {
    fn bytes(&mut self, name: &str, data: &[u8]) -> Result<(), AssayError> {
        self.zip
            .start_file(name, self.options)
            .map_err(|err| zip_error("archive.entry", &self.path, err))?;
        self.zip
            .write_all(data)
            .map_err(|err| AssayError::io("archive.entry_write", &self.path, err))
    }

    fn frame(&mut self, name: &str, frame: &Frame) -> Result<(), AssayError> {
        let data = frame.to_bytes(name)?;
        self.bytes(name, &data)
    }
}

/// Maps processed plates to their index among the project's plates.
///
/// Skipped plates are the ones named by the container's warnings; the
/// remaining indices must match the processed plates one to one.
fn processed_indices(project: &Project, container: &Container) -> Result<Vec<usize>, AssayError> {
    let skipped: BTreeSet<usize> = container.warnings.iter().map(|w| w.index).collect();
    let indices: Vec<usize> = (0..project.plates.len())
        .filter(|index| !skipped.contains(index))
        .collect();
    if indices.len() != container.plates.len() {
        return Err(AssayError::LayoutInconsistent(
            ErrorInfo::new("archive.plate_count", "container plates do not match project plates")
                .with_context("project", project.plates.len().to_string())
                .with_context("processed", container.plates.len().to_string())
                .with_context("skipped", skipped.len().to_string()),
        ));
    }
    Ok(indices)
}

fn path_cell(path: &Option<PathBuf>) -> String {
    path.as_ref().map(|p| p.display().to_string()).unwrap_or_default()
}

/// Writes `project` and, when given, its processed `container` to `path`.
///
/// The archive is written next to `path` and renamed into place, so a
/// failed save leaves any previous archive untouched.
pub fn save_archive(path: &Path, project: &Project, container: Option<&Container>) -> Result<(), AssayError> {
    let processed: BTreeMap<usize, &PlateRecord> = match container {
        Some(container) => processed_indices(project, container)?
            .into_iter()
            .zip(container.plates.iter())
            .collect(),
        None => BTreeMap::new(),
    };

    let mut part = path.as_os_str().to_owned();
    part.push(".part");
    let part = PathBuf::from(part);
    let file = File::create(&part).map_err(|err| AssayError::io("archive.create", &part, err))?;
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .unix_permissions(0o644);
    let mut out = EntryWriter {
        zip: ZipWriter::new(file),
        options,
        path: part.clone(),
    };

    out.bytes(DETAILS, to_yaml_string(&project.details)?.as_bytes())?;
    out.bytes(TRANSFER_RULES, to_yaml_string(&project.transfer_rules)?.as_bytes())?;
    if let Some(rules) = &project.raw_rules {
        out.bytes(RAW_RULES, to_yaml_string(rules)?.as_bytes())?;
    }

    let mut meta = Frame::new(&["Destination", "Wells", "DataFile", "PlateID"]);
    let mut plates = Frame::new(&["PlateID", "Marker"]);
    for (index, plate) in project.plates.iter().enumerate() {
        let plate_id = processed
            .get(&index)
            .map(|record| record.plate_id.clone())
            .unwrap_or_else(|| plate.plate_id.clone());
        meta.push(vec![
            plate.destination.clone(),
            project.details.format.wells().to_string(),
            plate.data_file.display().to_string(),
            plate_id.clone(),
        ]);
        plates.push(vec![plate_id, processed.contains_key(&index).to_string()]);
    }
    out.frame(META, &meta)?;

    let mut flags = Frame::new(&["Processed", "GlobalLayout", "UsePlateID"]);
    flags.push(vec![
        container.is_some().to_string(),
        project.details.global_layout.to_string(),
        project.details.use_plate_id.to_string(),
    ]);
    out.frame(BOOLEAN, &flags)?;

    let mut paths = Frame::new(&["TransferFile", "RawDataDir"]);
    paths.push(vec![path_cell(&project.transfer_file), path_cell(&project.raw_dir)]);
    out.frame(PATHS, &paths)?;
    out.frame(PLATES, &plates)?;

    let mut warnings = Frame::new(&["Index", "Destination", "Error"]);
    for warning in container.map(|c| c.warnings.as_slice()).unwrap_or_default() {
        let error = to_canonical_json_bytes(&warning.error)?;
        warnings.push(vec![
            warning.index.to_string(),
            warning.destination.clone(),
            String::from_utf8_lossy(&error).into_owned(),
        ]);
    }
    out.frame(WARNINGS, &warnings)?;

    for (index, record) in &processed {
        out.frame(&samples_entry(*index), &tables::encode_samples(&record.samples))?;
        out.frame(&raw_entry(*index), &tables::encode_raw(&record.raw))?;
        out.frame(&processed_entry(*index), &tables::encode_processed(&record.processed.records))?;
        out.frame(&references_entry(*index), &tables::encode_references(&record.references))?;
    }
    for index in 0..project.plates.len() {
        let layout = match processed.get(&index) {
            Some(record) => Some(record.layout.as_ref()),
            None => project.layout_for(index),
        };
        if let Some(layout) = layout {
            out.frame(&layout_entry(index), &tables::encode_layout(layout))?;
        }
    }

    out.zip
        .finish()
        .map_err(|err| zip_error("archive.finish", &part, err))?;
    fs::rename(&part, path).map_err(|err| AssayError::io("archive.rename", path, err))?;
    info!(
        path = %path.display(),
        plates = project.plates.len(),
        processed = processed.len(),
        "archive saved"
    );
    Ok(())
}

/// Where [`load_archive`] unpacks entries.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Defaults to `~/.assay/scratch`.
    pub scratch_root: Option<PathBuf>,
}

/// Result of [`load_archive`].
#[derive(Debug, Clone)]
pub struct LoadedArchive {
    pub project: Project,
    pub container: Option<Container>,
    /// The archive predates plate ids and was upgraded on load.
    pub legacy: bool,
}

/// Unpacked entries of one archive.
struct Entries {
    root: PathBuf,
    names: BTreeSet<String>,
}

impl Entries {
    fn has(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    fn bytes(&self, name: &str) -> Result<Vec<u8>, AssayError> {
        if !self.has(name) {
            return Err(AssayError::Io(
                ErrorInfo::new("archive.entry", "archive entry missing").with_context("entry", name),
            ));
        }
        let path = self.root.join(name);
        fs::read(&path).map_err(|err| AssayError::io("archive.entry_read", &path, err))
    }

    fn frame(&self, name: &str, table: &str) -> Result<Frame, AssayError> {
        let mut frame = Frame::from_bytes(&self.bytes(name)?, name)?;
        upgrade(table, &mut frame);
        Ok(frame)
    }

    fn optional_frame(&self, name: &str, table: &str) -> Result<Option<Frame>, AssayError> {
        if self.has(name) {
            self.frame(name, table).map(Some)
        } else {
            Ok(None)
        }
    }
}

fn extract(path: &Path, scratch: &Scratch) -> Result<Entries, AssayError> {
    let file = File::open(path).map_err(|err| AssayError::io("archive.open", path, err))?;
    let mut archive = ZipArchive::new(file).map_err(|err| zip_error("archive.parse", path, err))?;
    let mut names = BTreeSet::new();
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| zip_error("archive.entry", path, err))?;
        if entry.is_dir() {
            continue;
        }
        let relative = entry
            .enclosed_name()
            .map(Path::to_path_buf)
            .ok_or_else(|| archive_error("archive.entry_name", format!("unsafe entry name {}", entry.name()), path))?;
        let target = scratch.path().join(&relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|err| AssayError::io("archive.extract", parent, err))?;
        }
        let mut bytes = Vec::new();
        entry
            .read_to_end(&mut bytes)
            .map_err(|err| AssayError::io("archive.entry_read", path, err))?;
        fs::write(&target, &bytes).map_err(|err| AssayError::io("archive.extract", &target, err))?;
        names.insert(entry.name().to_string());
    }
    debug!(path = %path.display(), entries = names.len(), "archive extracted");
    Ok(Entries {
        root: scratch.path().to_path_buf(),
        names,
    })
}

fn optional_path(cell: &str) -> Option<PathBuf> {
    (!cell.is_empty()).then(|| PathBuf::from(cell))
}

/// Reads an archive written by [`save_archive`] or by an older release.
pub fn load_archive(path: &Path, opts: &LoadOptions) -> Result<LoadedArchive, AssayError> {
    let root = scratch_root(opts.scratch_root.as_deref())?;
    let name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "archive".to_string());
    let scratch = Scratch::create(&root, &name)?;
    let entries = extract(path, &scratch)?;
    let loaded = read_entries(&entries)?;
    scratch.finish()?;
    info!(
        path = %path.display(),
        plates = loaded.project.plates.len(),
        legacy = loaded.legacy,
        "archive loaded"
    );
    Ok(loaded)
}

fn read_entries(entries: &Entries) -> Result<LoadedArchive, AssayError> {
    let details: Details = from_yaml_slice(&entries.bytes(DETAILS)?)?;
    let transfer_rules: TransferRules = if entries.has(TRANSFER_RULES) {
        from_yaml_slice(&entries.bytes(TRANSFER_RULES)?)?
    } else {
        TransferRules::default()
    };
    let raw_rules: Option<RuleSet> = if entries.has(RAW_RULES) {
        Some(from_yaml_slice(&entries.bytes(RAW_RULES)?)?)
    } else {
        None
    };

    let raw_meta = Frame::from_bytes(&entries.bytes(META)?, META)?;
    let legacy = is_legacy(&raw_meta);
    let mut meta = raw_meta;
    upgrade("meta", &mut meta);

    let flags = entries.optional_frame(BOOLEAN, "boolean")?;
    let flag = |name: &str| -> Result<Option<bool>, AssayError> {
        match &flags {
            Some(frame) if frame.has(name) && !frame.is_empty() => parse_bool(frame.value(0, name)?).map(Some),
            _ => Ok(None),
        }
    };
    let was_processed = flag("Processed")?.unwrap_or_else(|| entries.has(&processed_entry(0)));
    let mut details = details;
    if let Some(global) = flag("GlobalLayout")? {
        details.global_layout = global;
    }
    if let Some(use_plate_id) = flag("UsePlateID")? {
        details.use_plate_id = use_plate_id;
    }

    let (transfer_file, raw_dir) = match entries.optional_frame(PATHS, "paths")? {
        Some(paths) if !paths.is_empty() => (
            optional_path(paths.value(0, "TransferFile")?),
            optional_path(paths.value(0, "RawDataDir")?),
        ),
        _ => (None, None),
    };

    let plates_frame = entries.optional_frame(PLATES, "plates")?;
    let format = details.format;

    let mut specs = Vec::with_capacity(meta.len());
    let mut layouts: Vec<Option<Layout>> = Vec::with_capacity(meta.len());
    for row in 0..meta.len() {
        let wells = parse_index(meta.value(row, "Wells")?)?;
        let plate_format = u32::try_from(wells)
            .map_err(|_| AssayError::config("archive.format", "plate format out of range"))
            .and_then(PlateFormat::from_wells)?;
        if plate_format != format {
            return Err(AssayError::LayoutInconsistent(
                ErrorInfo::new("archive.format", "plate format differs from project format")
                    .with_context("row", row.to_string()),
            ));
        }
        let plate_id = meta.value(row, "PlateID")?.to_string();
        let layout = match entries.optional_frame(&layout_entry(row), "layout")? {
            Some(mut frame) => {
                if legacy {
                    shift_ids(&mut frame);
                }
                Some(tables::decode_layout(&frame, &plate_id, format)?)
            }
            None => None,
        };
        specs.push(PlateSpec {
            destination: meta.value(row, "Destination")?.to_string(),
            data_file: PathBuf::from(meta.value(row, "DataFile")?),
            plate_id,
            layout: if details.global_layout { None } else { layout.clone() },
        });
        layouts.push(layout);
    }

    let global = if details.global_layout {
        layouts.iter().flatten().next().cloned()
    } else {
        None
    };
    let project = Project {
        details,
        raw_rules,
        transfer_rules,
        transfer_file,
        raw_dir,
        plates: specs,
        layout: global.clone(),
    };

    let container = if was_processed {
        Some(read_container(entries, &project, plates_frame.as_ref(), &layouts, global)?)
    } else {
        None
    };

    Ok(LoadedArchive {
        project,
        container,
        legacy,
    })
}

fn read_container(
    entries: &Entries,
    project: &Project,
    plates: Option<&Frame>,
    layouts: &[Option<Layout>],
    global: Option<Layout>,
) -> Result<Container, AssayError> {
    let details = &project.details;
    let mut container = Container::new(FamilyKind::for_details(details), details.category);

    if let Some(frame) = entries.optional_frame(WARNINGS, "warnings")? {
        for row in 0..frame.len() {
            container.warnings.push(PlateWarning {
                index: parse_index(frame.value(row, "Index")?)?,
                destination: frame.value(row, "Destination")?.to_string(),
                error: from_json_slice(frame.value(row, "Error")?.as_bytes())?,
            });
        }
    }

    let shared = global.map(Arc::new);
    for (index, spec) in project.plates.iter().enumerate() {
        let marked = match plates {
            Some(frame) if index < frame.len() => parse_bool(frame.value(index, "Marker")?)?,
            _ => true,
        };
        if !marked || !entries.has(&processed_entry(index)) {
            continue;
        }
        let layout = match (&shared, layouts.get(index).and_then(Option::as_ref)) {
            (Some(shared), Some(own)) if own.wells == shared.wells => Arc::clone(shared),
            (_, Some(own)) => Arc::new(own.clone()),
            (Some(shared), None) => Arc::clone(shared),
            (None, None) => Arc::new(Layout::new(spec.plate_id.clone(), details.format)),
        };
        let samples = match entries.optional_frame(&samples_entry(index), "samples")? {
            Some(frame) => tables::decode_samples(&frame)?,
            None => Vec::new(),
        };
        let raw = tables::decode_raw(&entries.frame(&raw_entry(index), "rawdata")?)?;
        let records = tables::decode_processed(&entries.frame(&processed_entry(index), "processed")?)?;
        let references = match entries.optional_frame(&references_entry(index), "references")? {
            Some(frame) => tables::decode_references(&frame)?,
            None => Default::default(),
        };
        container.plates.push(PlateRecord {
            destination: spec.destination.clone(),
            format: details.format,
            data_file: spec.data_file.clone(),
            raw,
            samples,
            processed: Processed { records },
            layout,
            references,
            plate_id: spec.plate_id.clone(),
        });
    }
    if !container.check_invariants() {
        return Err(AssayError::Serde(ErrorInfo::new(
            "archive.records",
            "processed records have inconsistent lengths",
        )));
    }
    Ok(container)
}

/// SHA-256 of every entry, keyed by entry name.
pub fn archive_digest(path: &Path) -> Result<BTreeMap<String, String>, AssayError> {
    let file = File::open(path).map_err(|err| AssayError::io("archive.open", path, err))?;
    let mut archive = ZipArchive::new(file).map_err(|err| zip_error("archive.parse", path, err))?;
    let names: Vec<String> = archive.file_names().map(str::to_string).collect();
    let mut digest = BTreeMap::new();
    for name in names {
        let bytes = read_entry(&mut archive, &name, path)?;
        digest.insert(name, hex::encode(Sha256::digest(&bytes)));
    }
    Ok(digest)
}

fn read_entry<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str, path: &Path) -> Result<Vec<u8>, AssayError> {
    let mut file = archive
        .by_name(name)
        .map_err(|err| zip_error("archive.entry", path, err))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)
        .map_err(|err| AssayError::io("archive.entry_read", path, err))?;
    Ok(bytes)
}
