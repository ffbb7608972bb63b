use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use assay_arch::{archive_digest, load_archive, save_archive, LoadOptions};
use assay_core::plate::PlateFormat;
use assay_core::stats::Summary;
use assay_core::{AssayError, ErrorInfo};
use assay_fit::CurveFit;
use assay_layout::{Entity, Layout, WellType};
use assay_proc::{
    Container, Details, FamilyKind, PlateRecord, PlateSpec, PlateWarning, Processed, Project, References,
    SampleMeta, SampleRecord, Show,
};
use assay_read::RawSignal;
use proptest::prelude::*;
use zip::write::FileOptions;
use zip::{ZipArchive, ZipWriter};

fn plate_layout(plate_id: &str) -> Layout {
    let mut layout = Layout::new(plate_id, PlateFormat::Wells384);
    for well in 0..4 {
        let entry = layout.entry_mut(well).unwrap();
        entry.well_type = WellType::Sample;
        entry.sample = Entity {
            id: Some(0),
            name: "CMP-1".into(),
            concentration: 1e-6 / 10f64.powi(well as i32),
        };
    }
    for well in [22, 23] {
        let entry = layout.entry_mut(well).unwrap();
        entry.well_type = WellType::Control;
        entry.control = Entity::named(0, "STAURO");
        entry.zprime = true;
    }
    layout.entry_mut(46).unwrap().well_type = WellType::Reference;
    layout
}

fn project(dir: &Path) -> Project {
    let mut details = Details::template("htrf");
    details.researcher = "lab".into();
    details.date = "2026-10-18".into();
    details.proteins = vec!["BRD4".into()];
    details.solvent_concentration = 0.1 + 0.2;
    Project {
        details,
        transfer_file: Some(dir.join("transfer.csv")),
        raw_dir: Some(dir.to_path_buf()),
        plates: vec![
            PlateSpec {
                destination: "DEST-1".into(),
                data_file: dir.join("plate1.csv"),
                plate_id: "P1".into(),
                layout: Some(plate_layout("P1")),
            },
            PlateSpec {
                destination: "DEST-2".into(),
                data_file: dir.join("plate2.csv"),
                plate_id: "P2".into(),
                layout: Some(plate_layout("P2")),
            },
        ],
        ..Project::default()
    }
}

fn container(project: &Project) -> Container {
    let mut record = SampleRecord::new(
        "CMP-1",
        vec![1e-6, 1e-7, 1e-8, 1e-9],
        vec![vec![0], vec![1], vec![2], vec![3]],
        vec![vec![812.5], vec![f64::NAN], vec![2400.0], vec![3100.25]],
        4,
    );
    record.norm = vec![91.2, f64::NAN, 31.0, 4.5];
    record.excluded[1] = true;
    record.raw_fit = CurveFit {
        curve: vec![[1e-9, 3100.0], [1e-6, 812.0]],
        params: vec![800.0, 3200.0, 1.1, -7.25],
        ci: vec![12.0, 30.0, 0.2, 0.05],
        errors: vec![6.0, 15.0, 0.1, 0.025],
        r2: 0.987,
        do_fit: true,
    };
    record.show = Show::NormFree;
    record.derived.out_of_range = vec![false; 4];

    let layout = Arc::new(project.plates[0].layout.clone().unwrap());
    let mut raw = BTreeMap::new();
    for (well, value) in [(0, 812.5), (2, 2400.0), (3, 3100.25), (22, 700.0), (23, 710.0), (46, 3300.0)] {
        raw.insert(well, value);
    }
    let mut container = Container::new(FamilyKind::Htrf, project.details.category);
    container.plates.push(PlateRecord {
        destination: "DEST-1".into(),
        format: PlateFormat::Wells384,
        data_file: project.plates[0].data_file.clone(),
        raw: RawSignal::Scalar(raw),
        samples: vec![SampleMeta {
            sample_id: "CMP-1".into(),
            wells: vec![0, 1, 2, 3],
            concentrations: vec![1e-6, 1e-7, 1e-8, 1e-9],
            volumes: vec![2.5e-9; 4],
        }],
        processed: Processed { records: vec![record] },
        layout,
        references: References {
            solvent: Summary::of(&[3300.0]),
            control: Summary::of(&[700.0, 710.0]),
            zprime_mean: 0.62,
            ..References::default()
        },
        plate_id: "P1".into(),
    });
    container.warnings.push(PlateWarning {
        index: 1,
        destination: "DEST-2".into(),
        error: AssayError::ParseMismatch(
            ErrorInfo::new("read.no_reader", "no reader accepted the file").with_context("file", "plate2.csv"),
        ),
    });
    container
}

fn load_opts(dir: &Path) -> LoadOptions {
    LoadOptions {
        scratch_root: Some(dir.join("scratch")),
    }
}

#[test]
fn save_load_save_gives_identical_entries() {
    let dir = tempfile::tempdir().unwrap();
    let project = project(dir.path());
    let container = container(&project);
    let first = dir.path().join("first.zip");
    save_archive(&first, &project, Some(&container)).unwrap();

    let loaded = load_archive(&first, &load_opts(dir.path())).unwrap();
    assert!(!loaded.legacy);
    let reloaded = loaded.container.as_ref().unwrap();
    assert_eq!(reloaded.plates.len(), 1);
    assert_eq!(reloaded.warnings.len(), 1);
    assert_eq!(reloaded.warnings[0].error.info().code, "read.no_reader");
    let record = &reloaded.plates[0].processed.records[0];
    assert_eq!(record.show, Show::NormFree);
    assert!(record.raw[1].is_nan());
    assert_eq!(record.raw_fit.params, vec![800.0, 3200.0, 1.1, -7.25]);
    assert_eq!(loaded.project.details, project.details);

    let second = dir.path().join("second.zip");
    save_archive(&second, &loaded.project, loaded.container.as_ref()).unwrap();
    assert_eq!(archive_digest(&first).unwrap(), archive_digest(&second).unwrap());
    assert!(!dir.path().join("scratch").join("first").exists());
}

#[test]
fn unprocessed_project_has_no_plate_tables() {
    let dir = tempfile::tempdir().unwrap();
    let project = project(dir.path());
    let path = dir.path().join("bare.zip");
    save_archive(&path, &project, None).unwrap();

    let digest = archive_digest(&path).unwrap();
    assert!(digest.contains_key("layout/1/layout.csv"));
    assert!(!digest.contains_key("0/processed.csv"));
    let loaded = load_archive(&path, &load_opts(dir.path())).unwrap();
    assert!(loaded.container.is_none());
    assert_eq!(loaded.project.plates[1].layout.as_ref().unwrap().zprime_control(), Some(0));
}

#[test]
fn mismatched_container_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let project = project(dir.path());
    let mut container = container(&project);
    container.warnings.clear();
    let path = dir.path().join("bad.zip");
    let err = save_archive(&path, &project, Some(&container)).unwrap_err();
    assert_eq!(err.info().code, "archive.plate_count");
    assert!(!path.exists());
}

fn write_zip(path: &Path, entries: &[(&str, &str)]) {
    let mut writer = ZipWriter::new(File::create(path).unwrap());
    for (name, content) in entries {
        writer.start_file(*name, FileOptions::default()).unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap();
}

fn entry_text(path: &PathBuf, name: &str) -> String {
    let mut archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
    let mut text = String::new();
    archive.by_name(name).unwrap().read_to_string(&mut text).unwrap();
    text
}

#[test]
fn legacy_archive_is_upgraded() {
    let dir = tempfile::tempdir().unwrap();
    let old = dir.path().join("v116.zip");
    write_zip(
        &old,
        &[
            ("details.yaml", "assay_type: HTRF\nresearcher: lab\n"),
            ("meta.csv", "Barcode,Format,RawDataFile\nDEST-1,384,plate1.csv\n"),
            ("plates.csv", "Selected\nTrue\n"),
            (
                "layout/0/layout.csv",
                "Well,Type,ProteinNumerical,ProteinID,ControlNumerical,ControlID,\
                 ReferenceNumerical,ReferenceID,SampleNumerical,SampleID,Concentration\n\
                 0,s,1,BRD4,,,,,2,CMP-2,1e-06\n\
                 1,c,1,BRD4,1,STAURO,,,,,\n\
                 2,r,,,,,1,DMSO,,,\n",
            ),
        ],
    );

    let loaded = load_archive(&old, &load_opts(dir.path())).unwrap();
    assert!(loaded.legacy);
    assert!(loaded.container.is_none());
    let plate = &loaded.project.plates[0];
    assert_eq!(plate.plate_id, "X999A");
    let layout = plate.layout.as_ref().unwrap();
    assert_eq!(layout.entry(0).unwrap().sample.id, Some(1));
    assert_eq!(layout.entry(0).unwrap().sample.concentration, 1e-6);
    assert_eq!(layout.entry(0).unwrap().protein.id, Some(0));
    assert_eq!(layout.entry(1).unwrap().control.id, Some(0));
    assert_eq!(layout.entry(2).unwrap().reference.id, Some(0));
    assert_eq!(layout.entry(2).unwrap().well_type, WellType::Reference);

    let current = dir.path().join("current.zip");
    save_archive(&current, &loaded.project, None).unwrap();
    assert!(entry_text(&current, "meta.csv").starts_with("Destination,Wells,DataFile,PlateID\n"));
    assert!(entry_text(&current, "layout/0/layout.csv").contains("SampleConcentration"));
    let again = load_archive(&current, &load_opts(dir.path())).unwrap();
    assert!(!again.legacy);
    assert_eq!(again.project.plates[0].layout, loaded.project.plates[0].layout);
}

fn same_float(a: f64, b: f64) -> bool {
    a.to_bits() == b.to_bits() || (a.is_nan() && b.is_nan())
}

proptest! {
    #[test]
    fn float_lists_survive_the_cell_codec(
        values in prop::collection::vec(prop_oneof![Just(f64::NAN), -1e12f64..1e12, -1e-9f64..1e-9], 0..12)
    ) {
        let text = assay_arch::cell::encode_floats(&values);
        let back = assay_arch::cell::floats(&text).unwrap();
        prop_assert_eq!(back.len(), values.len());
        for (a, b) in back.iter().zip(&values) {
            prop_assert!(same_float(*a, *b), "{} != {}", a, b);
        }
    }

    #[test]
    fn quoted_nested_indices_parse(groups in prop::collection::vec(prop::collection::vec(0usize..1536, 0..4), 0..6)) {
        let text = format!("'{}'", assay_arch::cell::encode_nested_indices(&groups));
        prop_assert_eq!(assay_arch::cell::nested_indices(&text).unwrap(), groups);
    }
}
