//! Plate geometry: well labels, indices and plate formats.
//!
//! Wells are numbered row-major, `index = row * cols + col`, with rows
//! labelled `A..Z` followed by `AA..AF` on 1536-well plates.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::{AssayError, ErrorInfo};

/// Supported microtitre plate formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum PlateFormat {
    /// 8 x 12 wells.
    Wells96,
    /// 16 x 24 wells.
    Wells384,
    /// 32 x 48 wells.
    Wells1536,
}

impl PlateFormat {
    /// Number of rows.
    pub fn rows(self) -> usize {
        match self {
            PlateFormat::Wells96 => 8,
            PlateFormat::Wells384 => 16,
            PlateFormat::Wells1536 => 32,
        }
    }

    /// Number of columns.
    pub fn cols(self) -> usize {
        match self {
            PlateFormat::Wells96 => 12,
            PlateFormat::Wells384 => 24,
            PlateFormat::Wells1536 => 48,
        }
    }

    /// Total number of wells.
    pub fn wells(self) -> usize {
        self.rows() * self.cols()
    }

    /// Returns the format with the given number of wells.
    pub fn from_wells(wells: u32) -> Result<Self, AssayError> {
        match wells {
            96 => Ok(PlateFormat::Wells96),
            384 => Ok(PlateFormat::Wells384),
            1536 => Ok(PlateFormat::Wells1536),
            other => Err(AssayError::Config(
                ErrorInfo::new("plate.format", "unsupported plate format")
                    .with_context("wells", other.to_string())
                    .with_hint("use 96, 384 or 1536"),
            )),
        }
    }
}

impl Default for PlateFormat {
    fn default() -> Self {
        PlateFormat::Wells384
    }
}

impl TryFrom<u32> for PlateFormat {
    type Error = AssayError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        PlateFormat::from_wells(value)
    }
}

impl From<PlateFormat> for u32 {
    fn from(value: PlateFormat) -> Self {
        value.wells() as u32
    }
}

impl fmt::Display for PlateFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.wells())
    }
}

fn invalid_well(label: &str, fmt: PlateFormat) -> AssayError {
    AssayError::InvalidWell(
        ErrorInfo::new("plate.invalid_well", "well lies outside the plate format")
            .with_context("well", label)
            .with_context("format", fmt.to_string()),
    )
}

/// Number of rows of the given format.
pub fn rows(fmt: PlateFormat) -> usize {
    fmt.rows()
}

/// Number of columns of the given format.
pub fn cols(fmt: PlateFormat) -> usize {
    fmt.cols()
}

/// Letter label of a zero-based row (`0 -> A`, `26 -> AA`).
pub fn row_label(row: usize) -> String {
    if row < 26 {
        ((b'A' + row as u8) as char).to_string()
    } else {
        format!("A{}", (b'A' + (row - 26) as u8) as char)
    }
}

/// Parses a row label back into its zero-based row.
pub fn parse_row_label(label: &str) -> Option<usize> {
    let bytes = label.as_bytes();
    match bytes {
        [single] if single.is_ascii_uppercase() => Some((single - b'A') as usize),
        [b'A', second] if second.is_ascii_uppercase() => Some(26 + (second - b'A') as usize),
        _ => None,
    }
}

/// Splits a label such as `B07` into zero-based `(row, col)`.
pub fn well_to_row_col(label: &str, fmt: PlateFormat) -> Result<(usize, usize), AssayError> {
    let trimmed = label.trim().to_ascii_uppercase();
    let split = trimmed
        .find(|c: char| c.is_ascii_digit())
        .ok_or_else(|| invalid_well(label, fmt))?;
    let (letters, digits) = trimmed.split_at(split);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid_well(label, fmt));
    }
    let row = parse_row_label(letters).ok_or_else(|| invalid_well(label, fmt))?;
    let col: usize = digits.parse().map_err(|_| invalid_well(label, fmt))?;
    if row >= fmt.rows() || col == 0 || col > fmt.cols() {
        return Err(invalid_well(label, fmt));
    }
    Ok((row, col - 1))
}

/// Converts a well label into its zero-based row-major index.
pub fn well_to_index(label: &str, fmt: PlateFormat) -> Result<usize, AssayError> {
    let (row, col) = well_to_row_col(label, fmt)?;
    Ok(row * fmt.cols() + col)
}

/// Converts a zero-based index into a human label (`A1`, `P24`).
pub fn index_to_well(index: usize, fmt: PlateFormat) -> Result<String, AssayError> {
    if index >= fmt.wells() {
        return Err(invalid_well(&index.to_string(), fmt));
    }
    let row = index / fmt.cols();
    let col = index % fmt.cols();
    Ok(format!("{}{}", row_label(row), col + 1))
}

/// Returns `(row, col)` for an index without bounds checking against labels.
pub fn index_to_row_col(index: usize, fmt: PlateFormat) -> Result<(usize, usize), AssayError> {
    if index >= fmt.wells() {
        return Err(invalid_well(&index.to_string(), fmt));
    }
    Ok((index / fmt.cols(), index % fmt.cols()))
}

/// Zero-pads the column so that labels sort lexically (`A01 < A02 < A10`).
pub fn sortable_well(label: &str, fmt: PlateFormat) -> Result<String, AssayError> {
    let (row, col) = well_to_row_col(label, fmt)?;
    Ok(format!("{}{:02}", row_label(row), col + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corners_of_each_format() {
        assert_eq!(index_to_well(0, PlateFormat::Wells96).unwrap(), "A1");
        assert_eq!(index_to_well(95, PlateFormat::Wells96).unwrap(), "H12");
        assert_eq!(index_to_well(383, PlateFormat::Wells384).unwrap(), "P24");
        assert_eq!(index_to_well(1535, PlateFormat::Wells1536).unwrap(), "AF48");
        assert_eq!(well_to_index("AF48", PlateFormat::Wells1536).unwrap(), 1535);
    }

    #[test]
    fn padded_labels_are_accepted() {
        assert_eq!(well_to_index("b07", PlateFormat::Wells96).unwrap(), 18);
        assert_eq!(sortable_well("B7", PlateFormat::Wells96).unwrap(), "B07");
    }

    #[test]
    fn outside_format_is_rejected() {
        let err = well_to_index("I1", PlateFormat::Wells96).unwrap_err();
        assert_eq!(err.info().code, "plate.invalid_well");
        assert!(well_to_index("A13", PlateFormat::Wells96).is_err());
        assert!(well_to_index("A0", PlateFormat::Wells96).is_err());
        assert!(well_to_index("12", PlateFormat::Wells96).is_err());
        assert!(index_to_well(96, PlateFormat::Wells96).is_err());
    }

    #[test]
    fn format_serialises_as_well_count() {
        let json = serde_json::to_string(&PlateFormat::Wells1536).unwrap();
        assert_eq!(json, "1536");
        let back: PlateFormat = serde_json::from_str("96").unwrap();
        assert_eq!(back, PlateFormat::Wells96);
        assert!(serde_json::from_str::<PlateFormat>("100").is_err());
    }
}
