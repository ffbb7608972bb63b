use std::fs;

use assay_core::plate::{well_to_index, PlateFormat};
use assay_layout::{parse_transfer, resolve_plate, TransferRules, WellType};
use tempfile::TempDir;

const TRANSFER: &str = "[DETAILS]\n\
Destination Plate Barcode\tDestination Well\tSample ID\tDestination Concentration\tTransfer Volume\n\
PLATE-1\tB2\t\t\t50\n\
PLATE-1\tB3\t\t\t50\n\
PLATE-1\tB2\tCPD-7\t0.00001\t25\n\
PLATE-1\tC2\tCPD-7\t0.000001\t25\n";

#[test]
fn solvent_backfill_under_a_sample_stays_a_sample() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("transfer.csv");
    fs::write(&path, TRANSFER).unwrap();
    let rules = TransferRules {
        catch_solvent_only: true,
        ..TransferRules::default()
    };
    let fmt = PlateFormat::Wells96;
    let parsed = parse_transfer(&path, &rules, fmt).unwrap();
    let resolved = resolve_plate(
        "PLATE-1",
        fmt,
        parsed.layout.plate("PLATE-1"),
        None,
        |_| true,
        &rules,
    )
    .unwrap();

    let b2 = &resolved.wells[well_to_index("B2", fmt).unwrap()];
    assert_eq!(b2.well_type, WellType::Sample);
    assert_eq!(b2.sample.as_deref(), Some("CPD-7"));
    assert_eq!(b2.concentrations, vec![1e-5]);
    assert_eq!(
        resolved.wells[well_to_index("B3", fmt).unwrap()].well_type,
        WellType::Reference
    );
    assert_eq!(resolved.wells_of_sample("CPD-7").len(), 2);
}

#[test]
fn workbook_transfers_are_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("transfer.xlsx");
    fs::write(&path, b"PK").unwrap();
    let err = parse_transfer(&path, &TransferRules::default(), PlateFormat::Wells384).unwrap_err();
    assert_eq!(err.info().code, "transfer.workbook");
}
