use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;

use assay_core::plate::{row_label, PlateFormat};
use assay_read::table::parse_float;
use assay_read::{read_raw, Device, RawSignal, ReadContext};
use proptest::prelude::*;
use tempfile::TempDir;

fn write(dir: &TempDir, name: &str, body: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, body).unwrap();
    path
}

fn grid_export(keyword: &str, fmt: PlateFormat, value: impl Fn(usize, usize) -> f64) -> String {
    let mut text = String::from("User: lab\nTest name: HTRF 384\n\n");
    writeln!(text, "{keyword}").unwrap();
    let header: Vec<String> = (1..=fmt.cols()).map(|c| c.to_string()).collect();
    writeln!(text, ",{}", header.join(",")).unwrap();
    for row in 0..fmt.rows() {
        let cells: Vec<String> = (0..fmt.cols()).map(|col| value(row, col).to_string()).collect();
        writeln!(text, "{},{}", row_label(row), cells.join(",")).unwrap();
    }
    text
}

#[test]
fn ratio_grid_is_read_by_well_index() {
    let dir = TempDir::new().unwrap();
    let fmt = PlateFormat::Wells384;
    let path = write(
        &dir,
        "plate.csv",
        &grid_export("Ratio 665/620", fmt, |r, c| (r * 100 + c) as f64),
    );
    let raw = read_raw(Device::Pherastar, &path, &ReadContext::new(fmt)).unwrap();
    assert_eq!(raw.len(), 384);
    assert_eq!(raw.scalar(0), 0.0);
    assert_eq!(raw.scalar(24 + 3), 103.0);
    assert_eq!(raw.scalar(383), 1523.0);
}

#[test]
fn truncated_grid_is_not_recognised() {
    let dir = TempDir::new().unwrap();
    let fmt = PlateFormat::Wells384;
    let full = grid_export("Ratio", fmt, |_, _| 1.0);
    let truncated: String = full.lines().take(12).map(|l| format!("{l}\n")).collect();
    let path = write(&dir, "short.csv", &truncated);
    assert!(read_raw(Device::Pherastar, &path, &ReadContext::new(fmt)).is_none());
}

#[test]
fn polarisation_reader_ignores_ratio_exports() {
    let dir = TempDir::new().unwrap();
    let fmt = PlateFormat::Wells96;
    let path = write(&dir, "plate.csv", &grid_export("Ratio", fmt, |_, _| 2.0));
    assert!(read_raw(Device::Polarisation, &path, &ReadContext::new(fmt)).is_none());
    let mp = write(&dir, "mp.csv", &grid_export("mP", fmt, |_, _| 150.0));
    let raw = read_raw(Device::Polarisation, &mp, &ReadContext::new(fmt)).unwrap();
    assert_eq!(raw.scalar(95), 150.0);
}

#[test]
fn list_blocks_are_selected_by_plate_id() {
    let dir = TempDir::new().unwrap();
    let body = "Plate ID: P-001\nWell,Content,Raw Data (665/620)\nA1,Sample X1,10\nA2,Sample X2,11\n\
                \nPlate ID: P-002\nWell,Content,Raw Data (665/620)\nA01,Sample X1,20\nB3,Sample X2,21\n";
    let path = write(&dir, "list.csv", body);
    let fmt = PlateFormat::Wells96;
    let mut ctx = ReadContext::new(fmt);
    ctx.plate_id = Some("P-002");
    let raw = read_raw(Device::PherastarList, &path, &ctx).unwrap();
    assert_eq!(raw.scalar(0), 20.0);
    assert_eq!(raw.scalar(14), 21.0);

    ctx.plate_id = Some("unknown");
    let raw = read_raw(Device::PherastarList, &path, &ctx).unwrap();
    assert_eq!(raw.scalar(1), 11.0);
}

#[test]
fn time_course_builds_sorted_series() {
    let dir = TempDir::new().unwrap();
    let fmt = PlateFormat::Wells96;
    let mut body = String::new();
    for (cycle, time) in [(1, 0.0), (2, 30.0), (3, 60.0)] {
        writeln!(body, "Cycle,{cycle}").unwrap();
        writeln!(body, "Time [s],{time}").unwrap();
        body.push_str(&grid_export("Raw", fmt, |r, c| time + (r * 12 + c) as f64));
        body.push('\n');
    }
    let path = write(&dir, "kinetic.csv", &body);
    let raw = read_raw(Device::Timecourse, &path, &ReadContext::new(fmt)).unwrap();
    let series = raw.series(13).unwrap();
    assert_eq!(series.x, vec![0.0, 30.0, 60.0]);
    assert_eq!(series.y, vec![13.0, 43.0, 73.0]);
}

#[test]
fn qpcr_melt_section_is_parsed() {
    let dir = TempDir::new().unwrap();
    let body = "* Block Type = 96-Well Block\n\n[Melt Curve Raw Data]\n\
                Well,Well Position,Sample Name,Reading,Temperature,Fluorescence\n\
                1,A1,Lysozyme,1,25.0,1000\n1,A1,Lysozyme,2,25.5,990\n2,A2,,1,25.0,500\n\n[Results]\n";
    let path = write(&dir, "melt.txt", body);
    let raw = read_raw(Device::Qpcr, &path, &ReadContext::new(PlateFormat::Wells96)).unwrap();
    let a1 = raw.series(0).unwrap();
    assert_eq!(a1.x, vec![25.0, 25.5]);
    assert_eq!(a1.label.as_deref(), Some("Lysozyme"));
    assert_eq!(raw.series(1).unwrap().label, None);
}

#[test]
fn capillary_groups_are_split_by_name_row() {
    let dir = TempDir::new().unwrap();
    let body = "Cap 1,,,,,,Cap 2,,,,,\n\
                Time [s],Temperature [°C],Ratio 350/330,330nm,350nm,Scattering,\
                Time [s],Temperature [°C],Ratio 350/330,330nm,350nm,Scattering\n\
                0,20.0,0.60,100,60,5,0,20.0,0.61,101,61,4\n\
                30,20.5,0.62,99,61,5,30,20.5,0.63,100,63,4\n";
    let path = write(&dir, "dsf.csv", body);
    let raw = read_raw(Device::Nanodsf, &path, &ReadContext::new(PlateFormat::Wells96)).unwrap();
    let RawSignal::Capillary(traces) = raw else {
        panic!("expected capillary traces");
    };
    assert_eq!(traces.len(), 2);
    assert_eq!(traces[1].name, "Cap 2");
    assert_eq!(traces[1].ratio, vec![0.61, 0.63]);
    assert!(traces[0].ratio_derivative.is_none());
}

#[test]
fn imaging_counts_accept_letter_and_number_rows() {
    let dir = TempDir::new().unwrap();
    let body = "Row,Column,Cell Count\nB,3,120\n3,1,80\nZ,1,5\n";
    let path = write(&dir, "counts.csv", body);
    let fmt = PlateFormat::Wells96;
    let raw = read_raw(Device::Imaging, &path, &ReadContext::new(fmt)).unwrap();
    assert_eq!(raw.scalar(14), 120.0);
    assert_eq!(raw.scalar(24), 80.0);
    assert_eq!(raw.len(), 2);
}

#[test]
fn foreign_files_never_panic() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "junk.txt", "\u{feff};;;\n\"unterminated\n,,,\n");
    let ctx = ReadContext::new(PlateFormat::Wells384);
    for device in Device::ALL {
        assert!(read_raw(device, &path, &ctx).is_none(), "{device:?}");
    }

    let path = write(&dir, "imaging.csv", "Row,Column,Count\nA,1,3\nB,NaN,5\nNaN,2,7\n");
    let raw = read_raw(Device::Imaging, &path, &ReadContext::new(PlateFormat::Wells96)).unwrap();
    assert_eq!(raw.len(), 1);
    assert_eq!(raw.scalar(0), 3.0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn float_cells_never_panic(cell in "\\PC{0,12}") {
        let _ = parse_float(&cell);
    }

    #[test]
    fn arbitrary_text_never_panics_a_reader(
        lines in prop::collection::vec(
            prop::collection::vec(prop_oneof![
                Just("NaN".to_string()),
                Just("Row".to_string()),
                Just("Column".to_string()),
                Just("Count".to_string()),
                Just("Ratio".to_string()),
                Just("-1".to_string()),
                "[A-P]",
                "-?[0-9]{1,4}(\\.[0-9]{1,3})?",
                "\\PC{0,6}",
            ], 0..6),
            0..12,
        )
    ) {
        let dir = TempDir::new().unwrap();
        let body: Vec<String> = lines.iter().map(|cells| cells.join(",")).collect();
        let path = write(&dir, "any.csv", &body.join("\n"));
        let ctx = ReadContext::new(PlateFormat::Wells96);
        for device in Device::ALL {
            let _ = read_raw(device, &path, &ctx);
        }
    }
}
