//! Materialised tabular buffer for foreign device files.

use std::fs;
use std::path::Path;

use assay_core::AssayError;

/// A file read fully into memory as a ragged grid of trimmed cells.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Table {
    rows: Vec<Vec<String>>,
}

/// Guesses the delimiter: tab if present, else `;` unless `,` outnumbers it.
pub fn sniff_delimiter(text: &str) -> u8 {
    let head: String = text.lines().take(50).collect::<Vec<_>>().join("\n");
    if head.contains('\t') {
        return b'\t';
    }
    let semicolons = head.matches(';').count();
    let commas = head.matches(',').count();
    if semicolons > 0 && semicolons >= commas {
        b';'
    } else {
        b','
    }
}

impl Table {
    /// Reads the whole file and closes it before parsing.
    pub fn from_path(path: &Path) -> Result<Self, AssayError> {
        let bytes = fs::read(path).map_err(|err| AssayError::io("table.read", path, err))?;
        let delimiter = sniff_delimiter(&String::from_utf8_lossy(&bytes));
        Ok(Self::from_bytes_with(&bytes, delimiter))
    }

    /// Parses text with a sniffed delimiter.
    pub fn from_text(text: &str) -> Self {
        Self::from_bytes_with(text.as_bytes(), sniff_delimiter(text))
    }

    /// Parses bytes with an explicit delimiter.
    ///
    /// Lines are split before CSV decoding so that blank lines survive as
    /// empty rows; they act as dataset separators.
    pub fn from_bytes_with(bytes: &[u8], delimiter: u8) -> Self {
        let text = String::from_utf8_lossy(bytes);
        let rows = text
            .lines()
            .map(|line| {
                if line.trim().is_empty() {
                    return Vec::new();
                }
                split_line(line, delimiter)
            })
            .collect();
        Self { rows }
    }

    /// Builds a table from explicit rows (used by tests and converters).
    pub fn from_rows(rows: Vec<Vec<String>>) -> Self {
        Self { rows }
    }

    /// Number of rows.
    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    /// Width of the widest row.
    pub fn n_cols(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// Cell content, empty when outside the ragged row.
    pub fn cell(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Cells of a row.
    pub fn row(&self, row: usize) -> &[String] {
        self.rows.get(row).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Parsed numeric value of a cell.
    pub fn float(&self, row: usize, col: usize) -> Option<f64> {
        parse_float(self.cell(row, col))
    }

    /// True when every cell of the row is blank.
    pub fn is_blank_row(&self, row: usize) -> bool {
        self.row(row).iter().all(|cell| cell.is_empty())
    }

    /// True when every cell of the column is blank.
    pub fn is_blank_col(&self, col: usize) -> bool {
        (0..self.n_rows()).all(|row| self.cell(row, col).is_empty())
    }

    /// Column of the first cell in `row` matching the keyword.
    pub fn find_in_row(&self, row: usize, keyword: &str, exact: bool) -> Option<usize> {
        self.row(row)
            .iter()
            .position(|cell| cell_matches(cell, keyword, exact))
    }

    /// Row of the first cell in `col` matching the keyword, starting at `from`.
    pub fn find_in_col(&self, col: usize, keyword: &str, exact: bool, from: usize) -> Option<usize> {
        (from..self.n_rows()).find(|&row| cell_matches(self.cell(row, col), keyword, exact))
    }

    /// First cell matching the keyword in row-major order at or after `from_row`.
    pub fn find_keyword(&self, keyword: &str, exact: bool, from_row: usize) -> Option<(usize, usize)> {
        (from_row..self.n_rows())
            .find_map(|row| self.find_in_row(row, keyword, exact).map(|col| (row, col)))
    }
}

fn split_line(line: &str, delimiter: u8) -> Vec<String> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(line.as_bytes());
    match reader.byte_records().next() {
        Some(Ok(record)) => record
            .iter()
            .map(|field| String::from_utf8_lossy(field).trim().to_string())
            .collect(),
        _ => line
            .split(delimiter as char)
            .map(|field| field.trim().to_string())
            .collect(),
    }
}

/// Keyword comparison used by verification and locators.
pub fn cell_matches(cell: &str, keyword: &str, exact: bool) -> bool {
    if exact {
        cell.trim() == keyword
    } else {
        !keyword.is_empty() && cell.contains(keyword)
    }
}

/// Tolerant float parser for device exports.
///
/// Accepts surrounding whitespace and quotes, `NaN`/`nan`, a single decimal
/// comma, and thousands separators when a decimal point is present.
pub fn parse_float(raw: &str) -> Option<f64> {
    let trimmed = raw
        .trim_matches(|c: char| c.is_whitespace() || c == '"' || c == '\u{a0}')
        .to_string();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.eq_ignore_ascii_case("nan") {
        return Some(f64::NAN);
    }
    let commas = trimmed.matches(',').count();
    let normalised = if commas == 1 && !trimmed.contains('.') {
        trimmed.replace(',', ".")
    } else {
        trimmed.replace(',', "")
    };
    let compact: String = normalised.chars().filter(|c| !c.is_whitespace()).collect();
    compact.parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floats_tolerate_device_noise() {
        assert_eq!(parse_float(" 12.5 "), Some(12.5));
        assert_eq!(parse_float("12,5"), Some(12.5));
        assert_eq!(parse_float("1,234.5"), Some(1234.5));
        assert_eq!(parse_float("\"7\""), Some(7.0));
        assert!(parse_float("nan").unwrap().is_nan());
        assert!(parse_float("NaN").unwrap().is_nan());
        assert_eq!(parse_float("OVER"), None);
        assert_eq!(parse_float(""), None);
    }

    #[test]
    fn tab_delimited_text_is_sniffed() {
        let table = Table::from_text("a\tb\tc\n1\t2\n");
        assert_eq!(table.n_rows(), 2);
        assert_eq!(table.n_cols(), 3);
        assert_eq!(table.cell(1, 1), "2");
        assert_eq!(table.cell(1, 2), "");
        assert_eq!(table.find_keyword("c", true, 0), Some((0, 2)));
    }

    #[test]
    fn semicolons_win_over_decimal_commas() {
        let table = Table::from_text("x;y\n1,5;2,5\n");
        assert_eq!(table.float(1, 0), Some(1.5));
        assert_eq!(table.float(1, 1), Some(2.5));
    }

    #[test]
    fn blank_lines_are_kept() {
        let table = Table::from_text("a,b\n\nc,d\n");
        assert_eq!(table.n_rows(), 3);
        assert!(table.is_blank_row(1));
        assert_eq!(table.cell(2, 1), "d");
    }
}
