//! Accepting archives written by older releases.
//!
//! Every column rename an archive table has carried stays in [`RENAMES`];
//! columns added since get the default in [`SENTINELS`]. Archives whose
//! plate table lacks `PlateID` predate zero-based layout ids and have
//! those ids shifted down by one.

use tracing::debug;

use crate::frame::Frame;

/// Plate id given to plates of archives that did not record one.
pub const LEGACY_PLATE_ID: &str = "X999A";

/// `(table, old, new)`.
pub const RENAMES: &[(&str, &str, &str)] = &[
    ("meta", "Barcode", "Destination"),
    ("meta", "Format", "Wells"),
    ("meta", "RawDataFile", "DataFile"),
    ("plates", "Plate", "PlateID"),
    ("plates", "Selected", "Marker"),
    ("samples", "Locations", "Wells"),
    ("processed", "Normalised", "Norm"),
    ("processed", "NormalisedSEM", "NormSEM"),
    ("processed", "Exclude", "RawExcluded"),
    ("processed", "Excluded", "RawExcluded"),
    ("processed", "NormExcluded", "RawExcluded"),
    ("processed", "FitSelection", "Show"),
    ("layout", "Type", "WellType"),
    ("layout", "Concentration", "SampleConcentration"),
];

/// `(table, column, default)`.
pub const SENTINELS: &[(&str, &str, &str)] = &[
    ("meta", "PlateID", LEGACY_PLATE_ID),
    ("plates", "PlateID", LEGACY_PLATE_ID),
    ("plates", "Marker", "true"),
    ("samples", "Volumes", "[]"),
    ("processed", "Show", "0"),
    ("processed", "Tm", "nan"),
    ("processed", "DeltaTm", "nan"),
    ("processed", "Protein", ""),
    ("processed", "Velocities", "[]"),
    ("processed", "VelocityErrors", "[]"),
    ("processed", "OutOfRange", "[]"),
    ("layout", "ZPrime", "false"),
    ("layout", "ProteinConcentration", "nan"),
    ("layout", "ControlConcentration", "nan"),
    ("layout", "ReferenceConcentration", "nan"),
];

/// Layout columns holding numerical ids.
pub const NUMERICAL_IDS: &[&str] = &[
    "ProteinNumerical",
    "ControlNumerical",
    "ReferenceNumerical",
    "SampleNumerical",
];

/// True when the plate table was written before plate ids existed.
pub fn is_legacy(meta: &Frame) -> bool {
    !meta.has("PlateID")
}

/// Applies renames and sentinels of `table` to `frame`.
pub fn upgrade(table: &str, frame: &mut Frame) {
    for (_, old, new) in RENAMES.iter().filter(|(t, _, _)| *t == table) {
        if frame.rename(old, new) {
            debug!(table, old, new, "renamed legacy column");
        }
    }
    for (_, column, default) in SENTINELS.iter().filter(|(t, _, _)| *t == table) {
        if frame.ensure(column, default) {
            debug!(table, column, default, "filled missing column");
        }
    }
}

/// Shifts one-based numerical ids to zero-based; blanks stay blank.
pub fn shift_ids(layout: &mut Frame) {
    for column in NUMERICAL_IDS {
        layout.map_column(column, |cell| match cell.trim().parse::<f64>() {
            Ok(id) if id.is_finite() && id >= 1.0 => format!("{}", id as usize - 1),
            _ => cell.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn old_meta_is_upgraded() {
        let mut meta = Frame::new(&["Barcode", "Format", "RawDataFile"]);
        meta.push(vec!["P1".into(), "384".into(), "p1.csv".into()]);
        assert!(is_legacy(&meta));
        upgrade("meta", &mut meta);
        assert_eq!(meta.value(0, "Destination").unwrap(), "P1");
        assert_eq!(meta.value(0, "PlateID").unwrap(), LEGACY_PLATE_ID);
        assert!(!is_legacy(&meta));
    }

    #[test]
    fn ids_shift_down() {
        let mut layout = Frame::new(&["Well", "SampleNumerical", "ControlNumerical"]);
        layout.push(vec!["0".into(), "3".into(), "".into()]);
        layout.push(vec!["1".into(), "1.0".into(), "nan".into()]);
        shift_ids(&mut layout);
        assert_eq!(layout.value(0, "SampleNumerical").unwrap(), "2");
        assert_eq!(layout.value(0, "ControlNumerical").unwrap(), "");
        assert_eq!(layout.value(1, "SampleNumerical").unwrap(), "0");
        assert_eq!(layout.value(1, "ControlNumerical").unwrap(), "nan");
    }
}
