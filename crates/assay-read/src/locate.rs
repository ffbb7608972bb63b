//! Rule-driven dataset location and extraction.
//!
//! [`locate`] turns a [`RuleSet`] into dataset coordinates; [`extract`]
//! reads the values found there into label-keyed blocks.

use std::collections::BTreeMap;
use std::ops::Range;

use assay_core::plate::{index_to_well, well_to_index, PlateFormat};
use assay_core::{AssayError, ErrorInfo};
use tracing::debug;

use crate::rules::{
    Arrangement, Axis, Direction, EndMarker, Locator, Offset, RuleSet, Separator,
};
use crate::table::{cell_matches, Table};

type Coord = (usize, usize);

/// Coordinates of one dataset inside a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetLocation {
    /// First cell of the dataset.
    pub start: Coord,
    /// Last cell of the dataset (inclusive).
    pub end: Coord,
    /// Start of every sub-dataset; the first entry equals `start`.
    pub sub_starts: Vec<Coord>,
}

/// Label-keyed values of one (sub-)dataset.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block {
    pub entries: Vec<(String, f64)>,
}

impl Block {
    /// Values keyed by well index; labels that are not wells are skipped.
    pub fn by_well(&self, fmt: PlateFormat) -> BTreeMap<usize, f64> {
        self.entries
            .iter()
            .filter_map(|(label, value)| well_to_index(label, fmt).ok().map(|idx| (idx, *value)))
            .collect()
    }
}

/// A located dataset together with its extracted blocks.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDataset {
    pub location: DatasetLocation,
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone)]
struct Region {
    rows: Range<usize>,
    cols: Range<usize>,
}

impl Region {
    fn whole(table: &Table) -> Self {
        Self {
            rows: 0..table.n_rows(),
            cols: 0..table.n_cols(),
        }
    }

    fn contains(&self, at: Coord) -> bool {
        self.rows.contains(&at.0) && self.cols.contains(&at.1)
    }

    fn last(&self) -> Coord {
        (
            self.rows.end.saturating_sub(1).max(self.rows.start),
            self.cols.end.saturating_sub(1).max(self.cols.start),
        )
    }
}

struct Keyword<'a> {
    text: &'a str,
    exact: bool,
    offset: Offset,
}

fn mismatch(code: &str, message: &str) -> AssayError {
    AssayError::ParseMismatch(ErrorInfo::new(code, message))
}

fn shift(at: Coord, offset: Offset) -> (isize, isize) {
    (at.0 as isize + offset.rows, at.1 as isize + offset.cols)
}

fn clip(table: &Table, at: (isize, isize)) -> Coord {
    let max_row = table.n_rows().saturating_sub(1) as isize;
    let max_col = table.n_cols().saturating_sub(1) as isize;
    (at.0.clamp(0, max_row) as usize, at.1.clamp(0, max_col) as usize)
}

/// Checks the verification keyword, if the rule set asks for one.
pub fn verify(table: &Table, rules: &RuleSet) -> Result<(), AssayError> {
    let Some(verification) = &rules.verification else {
        return Ok(());
    };
    let found = match verification.axis {
        Axis::Row => table
            .find_in_row(verification.index, &verification.keyword, verification.exact)
            .is_some(),
        Axis::Column => table
            .find_in_col(verification.index, &verification.keyword, verification.exact, 0)
            .is_some(),
    };
    if found {
        Ok(())
    } else {
        Err(AssayError::ParseMismatch(
            ErrorInfo::new("rules.not_this_format", "verification keyword not found")
                .with_context("keyword", verification.keyword.clone()),
        ))
    }
}

fn next_keyword(
    table: &Table,
    keyword: &Keyword<'_>,
    after: Coord,
    direction: Direction,
    region: &Region,
) -> Option<Coord> {
    match direction {
        Direction::Vertical => (after.0 + 1..region.rows.end).find_map(|row| {
            region
                .cols
                .clone()
                .find(|&col| cell_matches(table.cell(row, col), keyword.text, keyword.exact))
                .map(|col| (row, col))
        }),
        Direction::Horizontal => (after.1 + 1..region.cols.end).find_map(|col| {
            region
                .rows
                .clone()
                .find(|&row| cell_matches(table.cell(row, col), keyword.text, keyword.exact))
                .map(|row| (row, col))
        }),
    }
}

fn next_block(table: &Table, after: Coord, direction: Direction, region: &Region) -> Option<Coord> {
    match direction {
        Direction::Vertical => {
            let blank = (after.0 + 1..region.rows.end).find(|&row| table.is_blank_row(row))?;
            (blank + 1..region.rows.end)
                .find(|&row| !table.is_blank_row(row))
                .map(|row| (row, after.1))
        }
        Direction::Horizontal => {
            let blank = (after.1 + 1..region.cols.end).find(|&col| table.is_blank_col(col))?;
            (blank + 1..region.cols.end)
                .find(|&col| !table.is_blank_col(col))
                .map(|col| (after.0, col))
        }
    }
}

fn advanced(next: Coord, prev: Coord, direction: Direction) -> bool {
    match direction {
        Direction::Vertical => next.0 > prev.0,
        Direction::Horizontal => next.1 > prev.1,
    }
}

fn lane_is_blank(table: &Table, at: Coord, direction: Direction) -> bool {
    match direction {
        Direction::Vertical => table.is_blank_row(at.0),
        Direction::Horizontal => table.is_blank_col(at.1),
    }
}

/// Walks a separator from a first `(anchor, start)` pair; returns every pair found.
fn repeat(
    table: &Table,
    first: (Coord, Coord),
    separator: &Separator,
    direction: Direction,
    main: Option<&Keyword<'_>>,
    region: &Region,
) -> Vec<(Coord, Coord)> {
    let main_offset = main.map(|kw| kw.offset).unwrap_or_default();
    let mut found = vec![first];
    let (mut anchor, mut start) = first;
    loop {
        let (next, offset) = match separator {
            Separator::SameAsMain => match main {
                Some(kw) => (next_keyword(table, kw, anchor, direction, region), main_offset),
                None => (None, main_offset),
            },
            Separator::ByKeyword {
                keyword,
                exact,
                offset,
            } => {
                let kw = Keyword {
                    text: keyword,
                    exact: *exact,
                    offset: *offset,
                };
                (next_keyword(table, &kw, anchor, direction, region), *offset)
            }
            Separator::FixedOffset { rows, cols } => {
                let stepped = shift(anchor, Offset::new(*rows, *cols));
                let stepped = (stepped.0 >= 0 && stepped.1 >= 0)
                    .then_some((stepped.0 as usize, stepped.1 as usize))
                    .filter(|at| region.contains(*at))
                    .filter(|at| !lane_is_blank(table, *at, direction));
                let keyword_hit = main
                    .and_then(|kw| next_keyword(table, kw, anchor, direction, region))
                    .filter(|hit| match stepped {
                        Some(step) => !advanced(*hit, step, direction),
                        None => false,
                    });
                (keyword_hit.or(stepped), main_offset)
            }
            Separator::EmptyLine => (next_block(table, anchor, direction, region), main_offset),
        };
        let Some(next_anchor) = next else {
            break;
        };
        if !region.contains(next_anchor) || !advanced(next_anchor, anchor, direction) {
            break;
        }
        let next_start = clip(table, shift(next_anchor, offset));
        if !advanced(next_start, start, direction) {
            break;
        }
        found.push((next_anchor, next_start));
        anchor = next_anchor;
        start = next_start;
    }
    found
}

fn dataset_region(table: &Table, starts: &[Coord], index: usize, direction: Direction) -> Region {
    let whole = Region::whole(table);
    let here = starts[index];
    match direction {
        Direction::Vertical => Region {
            rows: here.0..starts.get(index + 1).map(|s| s.0).unwrap_or(whole.rows.end),
            cols: whole.cols,
        },
        Direction::Horizontal => Region {
            rows: whole.rows,
            cols: here.1..starts.get(index + 1).map(|s| s.1).unwrap_or(whole.cols.end),
        },
    }
}

fn dataset_end(
    table: &Table,
    rules: &RuleSet,
    start: Coord,
    first_extent: Option<(isize, isize)>,
    region: &Region,
) -> Coord {
    let bound = region.last();
    let end = match &rules.end {
        Some(EndMarker::ByKeyword {
            keyword,
            exact,
            offset,
        }) => (start.0..region.rows.end)
            .find_map(|row| {
                region
                    .cols
                    .clone()
                    .find(|&col| cell_matches(table.cell(row, col), keyword, *exact))
                    .map(|col| (row, col))
            })
            .map(|hit| clip(table, shift(hit, *offset)))
            .unwrap_or(bound),
        Some(EndMarker::ByCoordinates { row, col }) => match first_extent {
            Some((rows, cols)) => clip(table, shift(start, Offset::new(rows, cols))),
            None => clip(table, (*row as isize, *col as isize)),
        },
        Some(EndMarker::EmptyLine) => (start.0 + 1..region.rows.end)
            .find(|&row| table.is_blank_row(row))
            .map(|row| (row - 1, bound.1))
            .unwrap_or(bound),
        None => bound,
    };
    (end.0.min(bound.0), end.1.min(bound.1))
}

fn start_keyword(rules: &RuleSet) -> Option<Keyword<'_>> {
    match &rules.start {
        Locator::ByKeyword {
            keyword,
            exact,
            offset,
        } => Some(Keyword {
            text: keyword,
            exact: *exact,
            offset: *offset,
        }),
        Locator::ByCoordinates { .. } => None,
    }
}

fn sub_keyword(rules: &RuleSet) -> Option<Keyword<'_>> {
    match rules.datasets.as_ref().map(|repeat| &repeat.separator) {
        Some(Separator::ByKeyword {
            keyword,
            exact,
            offset,
        }) => Some(Keyword {
            text: keyword,
            exact: *exact,
            offset: *offset,
        }),
        _ => start_keyword(rules),
    }
}

/// Finds the coordinates of every dataset (and sub-dataset) described by the rules.
pub fn locate(table: &Table, rules: &RuleSet) -> Result<Vec<DatasetLocation>, AssayError> {
    if table.n_rows() == 0 {
        return Err(mismatch("rules.empty_file", "file holds no rows"));
    }
    verify(table, rules)?;

    let main = start_keyword(rules);
    let first = match &rules.start {
        Locator::ByKeyword { .. } => {
            let kw = main.as_ref().ok_or_else(|| mismatch("rules.start", "missing keyword"))?;
            let anchor = table
                .find_keyword(kw.text, kw.exact, 0)
                .ok_or_else(|| {
                    AssayError::ParseMismatch(
                        ErrorInfo::new("rules.start_not_found", "start keyword not found")
                            .with_context("keyword", kw.text),
                    )
                })?;
            (anchor, clip(table, shift(anchor, kw.offset)))
        }
        Locator::ByCoordinates { row, col } => {
            let at = clip(table, (*row as isize, *col as isize));
            (at, at)
        }
    };

    let whole = Region::whole(table);
    let (pairs, direction) = match &rules.datasets {
        Some(rep) => (
            repeat(table, first, &rep.separator, rep.direction, main.as_ref(), &whole),
            rep.direction,
        ),
        None => (vec![first], Direction::Vertical),
    };
    let starts: Vec<Coord> = pairs.iter().map(|(_, start)| *start).collect();
    let sub_main = sub_keyword(rules);

    let mut locations = Vec::with_capacity(pairs.len());
    let mut first_extent = None;
    for (index, (anchor, start)) in pairs.iter().copied().enumerate() {
        let region = dataset_region(table, &starts, index, direction);
        let end = dataset_end(table, rules, start, first_extent, &region);
        if index == 0 {
            first_extent = Some((
                end.0 as isize - start.0 as isize,
                end.1 as isize - start.1 as isize,
            ));
        }
        let sub_starts = match &rules.sub_datasets {
            Some(rep) => {
                let sub_region = Region {
                    rows: region.rows.start.min(anchor.0)..region.rows.end,
                    cols: region.cols.clone(),
                };
                repeat(
                    table,
                    (anchor, start),
                    &rep.separator,
                    rep.direction,
                    sub_main.as_ref(),
                    &sub_region,
                )
                .into_iter()
                .map(|(_, sub)| sub)
                .collect()
            }
            None => vec![start],
        };
        locations.push(DatasetLocation {
            start,
            end,
            sub_starts,
        });
    }
    debug!(datasets = locations.len(), "located datasets");
    Ok(locations)
}

fn read_grid(table: &Table, origin: Coord, last_row: usize, fmt: PlateFormat) -> Block {
    let mut entries = Vec::new();
    for row in 0..fmt.rows() {
        let at_row = origin.0 + row;
        if at_row > last_row {
            break;
        }
        for col in 0..fmt.cols() {
            let Some(value) = table.float(at_row, origin.1 + col) else {
                continue;
            };
            if let Ok(label) = index_to_well(row * fmt.cols() + col, fmt) {
                entries.push((label, value));
            }
        }
    }
    Block { entries }
}

fn read_pairs(table: &Table, start: Coord, last_row: usize) -> Block {
    let entries = (start.0..=last_row)
        .filter_map(|row| {
            let label = table.cell(row, start.1);
            if label.is_empty() {
                return None;
            }
            table
                .float(row, start.1 + 1)
                .map(|value| (label.to_string(), value))
        })
        .collect();
    Block { entries }
}

/// Locates every dataset and reads its blocks.
pub fn extract(
    table: &Table,
    rules: &RuleSet,
    fmt: PlateFormat,
) -> Result<Vec<ParsedDataset>, AssayError> {
    let locations = locate(table, rules)?;
    let mut parsed = Vec::with_capacity(locations.len());
    for location in locations {
        let mut blocks = Vec::with_capacity(location.sub_starts.len());
        for (idx, sub) in location.sub_starts.iter().enumerate() {
            let last_row = location
                .sub_starts
                .get(idx + 1)
                .map(|next| next.0.saturating_sub(1).max(sub.0))
                .unwrap_or(location.end.0);
            let block = match rules.arrangement {
                Arrangement::Grid {
                    row_labels,
                    col_labels,
                } => {
                    let origin = (sub.0 + col_labels as usize, sub.1 + row_labels as usize);
                    read_grid(table, origin, last_row, fmt)
                }
                Arrangement::Table { header } => {
                    read_pairs(table, (sub.0 + header as usize, sub.1), last_row)
                }
            };
            blocks.push(block);
        }
        parsed.push(ParsedDataset { location, blocks });
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{DataKind, Repeat};

    fn keyword_rules(keyword: &str, offset: Offset) -> RuleSet {
        RuleSet {
            verification: None,
            kind: DataKind::Plate,
            arrangement: Arrangement::Table { header: false },
            start: Locator::ByKeyword {
                keyword: keyword.into(),
                exact: true,
                offset,
            },
            end: Some(EndMarker::EmptyLine),
            datasets: Some(Repeat {
                direction: Direction::Vertical,
                separator: Separator::SameAsMain,
            }),
            sub_datasets: None,
        }
    }

    #[test]
    fn repeated_keyword_finds_every_dataset() {
        let table = Table::from_text("Read,1\nA1,5\nA2,6\n\nRead,2\nA1,7\n");
        let located = locate(&table, &keyword_rules("Read", Offset::new(1, 0))).unwrap();
        assert_eq!(located.len(), 2);
        assert_eq!(located[0].start, (1, 0));
        assert_eq!(located[0].end.0, 2);
        assert_eq!(located[1].start, (5, 0));
    }

    #[test]
    fn missing_verification_keyword_is_a_mismatch() {
        let table = Table::from_text("Hello,1\n");
        let mut rules = keyword_rules("Hello", Offset::default());
        rules.verification = Some(crate::rules::Verification {
            keyword: "Ratio".into(),
            axis: Axis::Row,
            index: 0,
            exact: false,
        });
        let err = locate(&table, &rules).unwrap_err();
        assert_eq!(err.info().code, "rules.not_this_format");
    }

    #[test]
    fn offsets_are_clipped_to_the_file() {
        let table = Table::from_text("Read,1\nA1,5\n");
        let located = locate(&table, &keyword_rules("Read", Offset::new(10, -3))).unwrap();
        assert_eq!(located[0].start, (1, 0));
    }
}
