//! Rule sets describing where datasets live inside a foreign tabular file.
//!
//! Users author rule sets in a flat form ([`RuleSetFile`]) with `use_*`
//! switches. The typed [`RuleSet`] is built from it by `TryFrom`, which is
//! the only place the "every switch has a definition" invariant is checked.

use assay_core::{AssayError, ErrorInfo};
use serde::{Deserialize, Serialize};

/// Whether a verification keyword is scanned along a row or down a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    /// Scan the cells of one row.
    Row,
    /// Scan the cells of one column.
    Column,
}

/// Direction in which consecutive datasets follow each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Datasets are stacked down the rows.
    #[default]
    Vertical,
    /// Datasets sit side by side across the columns.
    Horizontal,
}

/// Row/column displacement applied to a keyword match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Offset {
    /// Row displacement.
    #[serde(default)]
    pub rows: isize,
    /// Column displacement.
    #[serde(default)]
    pub cols: isize,
}

impl Offset {
    /// Creates an offset.
    pub fn new(rows: isize, cols: isize) -> Self {
        Self { rows, cols }
    }
}

/// Keyword check confirming that a file is of the expected format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
    pub keyword: String,
    pub axis: Axis,
    pub index: usize,
    #[serde(default)]
    pub exact: bool,
}

/// Where the first dataset starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum Locator {
    ByKeyword {
        keyword: String,
        #[serde(default)]
        exact: bool,
        #[serde(default)]
        offset: Offset,
    },
    ByCoordinates { row: usize, col: usize },
}

/// Where a dataset ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum EndMarker {
    ByKeyword {
        keyword: String,
        #[serde(default)]
        exact: bool,
        #[serde(default)]
        offset: Offset,
    },
    /// Absolute end of the first dataset; later datasets reuse its extent.
    ByCoordinates { row: usize, col: usize },
    EmptyLine,
}

/// How the next (sub-)dataset is found from the previous one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum Separator {
    /// Repeat the locator of the enclosing level.
    SameAsMain,
    ByKeyword {
        keyword: String,
        #[serde(default)]
        exact: bool,
        #[serde(default)]
        offset: Offset,
    },
    FixedOffset { rows: isize, cols: isize },
    EmptyLine,
}

/// Repetition of datasets (or sub-datasets) along one direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repeat {
    #[serde(default)]
    pub direction: Direction,
    pub separator: Separator,
}

/// Whether the data describe a plate (well-keyed) or samples (name-keyed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DataKind {
    #[default]
    Plate,
    Sample,
}

/// Shape of one dataset block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum Arrangement {
    /// Plate-shaped grid, optionally framed by row letters and column numbers.
    Grid {
        #[serde(default)]
        row_labels: bool,
        #[serde(default)]
        col_labels: bool,
    },
    /// Two columns: label then value, optionally under a header row.
    Table {
        #[serde(default)]
        header: bool,
    },
}

impl Default for Arrangement {
    fn default() -> Self {
        Arrangement::Grid {
            row_labels: true,
            col_labels: true,
        }
    }
}

/// Typed rule set. Every variant carries the data it needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification: Option<Verification>,
    #[serde(default)]
    pub kind: DataKind,
    #[serde(default)]
    pub arrangement: Arrangement,
    pub start: Locator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<EndMarker>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datasets: Option<Repeat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_datasets: Option<Repeat>,
}

impl RuleSet {
    /// Structural checks the type system cannot express.
    pub fn validate(&self) -> Result<(), AssayError> {
        if let Some(verification) = &self.verification {
            if verification.keyword.is_empty() {
                return Err(inconsistent("verify_keyword", "verification keyword is empty"));
            }
        }
        if let Locator::ByKeyword { keyword, .. } = &self.start {
            if keyword.is_empty() {
                return Err(inconsistent("start_keyword", "start keyword is empty"));
            }
        }
        if let Some(repeat) = &self.datasets {
            if repeat.separator == Separator::SameAsMain
                && matches!(self.start, Locator::ByCoordinates { .. })
            {
                return Err(inconsistent(
                    "dataset_separator",
                    "same-as-main separator needs a keyword start",
                ));
            }
            check_separator("dataset_separator", &repeat.separator)?;
        }
        if let Some(repeat) = &self.sub_datasets {
            check_separator("sub_separator", &repeat.separator)?;
        }
        Ok(())
    }
}

fn check_separator(field: &str, separator: &Separator) -> Result<(), AssayError> {
    match separator {
        Separator::ByKeyword { keyword, .. } if keyword.is_empty() => {
            Err(inconsistent(field, "separator keyword is empty"))
        }
        Separator::FixedOffset { rows: 0, cols: 0 } => {
            Err(inconsistent(field, "fixed offset separator must move"))
        }
        _ => Ok(()),
    }
}

fn inconsistent(field: &str, message: &str) -> AssayError {
    AssayError::Config(
        ErrorInfo::new("rules.inconsistent", message).with_context("field", field),
    )
}

/// How the flat form selects a locator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LocateBy {
    #[default]
    Keyword,
    Coordinates,
    EmptyLine,
    SameAsMain,
    Offset,
}

/// Flat, user-authored rule set with `use_*` switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RuleSetFile {
    pub use_verification: bool,
    pub verify_keyword: Option<String>,
    pub verify_axis: Option<Axis>,
    pub verify_index: Option<usize>,
    pub verify_exact: bool,

    pub kind: DataKind,
    pub grid: bool,
    pub row_labels: bool,
    pub col_labels: bool,

    pub start_by: LocateBy,
    pub start_keyword: Option<String>,
    pub start_exact: bool,
    pub start_offset_rows: isize,
    pub start_offset_cols: isize,
    pub start_row: Option<usize>,
    pub start_col: Option<usize>,

    pub use_end: bool,
    pub end_by: Option<LocateBy>,
    pub end_keyword: Option<String>,
    pub end_exact: bool,
    pub end_offset_rows: isize,
    pub end_offset_cols: isize,
    pub end_row: Option<usize>,
    pub end_col: Option<usize>,

    pub use_datasets: bool,
    pub dataset_direction: Direction,
    pub dataset_separator: Option<LocateBy>,
    pub dataset_keyword: Option<String>,
    pub dataset_exact: bool,
    pub dataset_offset_rows: isize,
    pub dataset_offset_cols: isize,

    pub use_sub_datasets: bool,
    pub sub_direction: Direction,
    pub sub_separator: Option<LocateBy>,
    pub sub_keyword: Option<String>,
    pub sub_exact: bool,
    pub sub_offset_rows: isize,
    pub sub_offset_cols: isize,
}

fn required<T: Clone>(value: &Option<T>, field: &str) -> Result<T, AssayError> {
    value
        .clone()
        .ok_or_else(|| inconsistent(field, "switch is on but the definition is missing"))
}

fn flat_separator(
    by: &Option<LocateBy>,
    keyword: &Option<String>,
    exact: bool,
    rows: isize,
    cols: isize,
    field: &str,
) -> Result<Separator, AssayError> {
    match required(by, field)? {
        LocateBy::SameAsMain => Ok(Separator::SameAsMain),
        LocateBy::Keyword => Ok(Separator::ByKeyword {
            keyword: required(keyword, field)?,
            exact,
            offset: Offset::new(rows, cols),
        }),
        LocateBy::Offset => Ok(Separator::FixedOffset { rows, cols }),
        LocateBy::EmptyLine => Ok(Separator::EmptyLine),
        LocateBy::Coordinates => Err(inconsistent(field, "coordinates cannot separate datasets")),
    }
}

impl TryFrom<RuleSetFile> for RuleSet {
    type Error = AssayError;

    fn try_from(file: RuleSetFile) -> Result<Self, Self::Error> {
        let verification = if file.use_verification {
            Some(Verification {
                keyword: required(&file.verify_keyword, "verify_keyword")?,
                axis: required(&file.verify_axis, "verify_axis")?,
                index: required(&file.verify_index, "verify_index")?,
                exact: file.verify_exact,
            })
        } else {
            None
        };

        let arrangement = if file.grid {
            Arrangement::Grid {
                row_labels: file.row_labels,
                col_labels: file.col_labels,
            }
        } else {
            Arrangement::Table {
                header: file.col_labels,
            }
        };

        let start = match file.start_by {
            LocateBy::Keyword => Locator::ByKeyword {
                keyword: required(&file.start_keyword, "start_keyword")?,
                exact: file.start_exact,
                offset: Offset::new(file.start_offset_rows, file.start_offset_cols),
            },
            LocateBy::Coordinates => Locator::ByCoordinates {
                row: required(&file.start_row, "start_row")?,
                col: required(&file.start_col, "start_col")?,
            },
            _ => return Err(inconsistent("start_by", "start must be keyword or coordinates")),
        };

        let end = if file.use_end {
            Some(match required(&file.end_by, "end_by")? {
                LocateBy::Keyword => EndMarker::ByKeyword {
                    keyword: required(&file.end_keyword, "end_keyword")?,
                    exact: file.end_exact,
                    offset: Offset::new(file.end_offset_rows, file.end_offset_cols),
                },
                LocateBy::Coordinates => EndMarker::ByCoordinates {
                    row: required(&file.end_row, "end_row")?,
                    col: required(&file.end_col, "end_col")?,
                },
                LocateBy::EmptyLine => EndMarker::EmptyLine,
                _ => return Err(inconsistent("end_by", "unsupported end marker")),
            })
        } else {
            None
        };

        let datasets = if file.use_datasets {
            Some(Repeat {
                direction: file.dataset_direction,
                separator: flat_separator(
                    &file.dataset_separator,
                    &file.dataset_keyword,
                    file.dataset_exact,
                    file.dataset_offset_rows,
                    file.dataset_offset_cols,
                    "dataset_separator",
                )?,
            })
        } else {
            None
        };

        let sub_datasets = if file.use_sub_datasets {
            Some(Repeat {
                direction: file.sub_direction,
                separator: flat_separator(
                    &file.sub_separator,
                    &file.sub_keyword,
                    file.sub_exact,
                    file.sub_offset_rows,
                    file.sub_offset_cols,
                    "sub_separator",
                )?,
            })
        } else {
            None
        };

        let rules = RuleSet {
            verification,
            kind: file.kind,
            arrangement,
            start,
            end,
            datasets,
            sub_datasets,
        };
        rules.validate()?;
        Ok(rules)
    }
}

/// Loads either the flat or the typed YAML form.
pub fn load_rules(path: &std::path::Path) -> Result<RuleSet, AssayError> {
    let bytes = std::fs::read(path).map_err(|err| AssayError::io("rules.read", path, err))?;
    if let Ok(rules) = assay_core::serde::from_yaml_slice::<RuleSet>(&bytes) {
        rules.validate()?;
        return Ok(rules);
    }
    let file: RuleSetFile = assay_core::serde::from_yaml_slice(&bytes)?;
    RuleSet::try_from(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn switch_without_definition_is_inconsistent() {
        let file = RuleSetFile {
            use_verification: true,
            verify_axis: Some(Axis::Row),
            verify_index: Some(0),
            start_keyword: Some("Ratio".into()),
            ..RuleSetFile::default()
        };
        let err = RuleSet::try_from(file).unwrap_err();
        assert_eq!(err.info().code, "rules.inconsistent");
        assert_eq!(err.info().context["field"], "verify_keyword");
    }

    #[test]
    fn flat_form_becomes_typed() {
        let file = RuleSetFile {
            grid: true,
            row_labels: true,
            col_labels: true,
            start_keyword: Some("Ratio".into()),
            start_offset_rows: 1,
            use_datasets: true,
            dataset_separator: Some(LocateBy::SameAsMain),
            ..RuleSetFile::default()
        };
        let rules = RuleSet::try_from(file).unwrap();
        assert_eq!(
            rules.start,
            Locator::ByKeyword {
                keyword: "Ratio".into(),
                exact: false,
                offset: Offset::new(1, 0)
            }
        );
        assert_eq!(rules.datasets.unwrap().separator, Separator::SameAsMain);
    }

    #[test]
    fn same_as_main_needs_keyword_start() {
        let rules = RuleSet {
            verification: None,
            kind: DataKind::Plate,
            arrangement: Arrangement::default(),
            start: Locator::ByCoordinates { row: 0, col: 0 },
            end: None,
            datasets: Some(Repeat {
                direction: Direction::Vertical,
                separator: Separator::SameAsMain,
            }),
            sub_datasets: None,
        };
        assert!(rules.validate().is_err());
    }
}
