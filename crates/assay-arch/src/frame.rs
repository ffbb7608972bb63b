//! String tables backing every CSV entry of an archive.

use assay_core::{AssayError, ErrorInfo};
use csv::{ReaderBuilder, WriterBuilder};

/// Header plus rows of string cells.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Frame {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

fn csv_error(code: &str, name: &str, err: csv::Error) -> AssayError {
    AssayError::Io(ErrorInfo::new(code, err.to_string()).with_context("entry", name))
}

impl Frame {
    pub fn new(headers: &[&str]) -> Self {
        Self {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Cell of `row` under `name`; missing columns are an error, short rows
    /// read as empty.
    pub fn value(&self, row: usize, name: &str) -> Result<&str, AssayError> {
        let col = self.column(name).ok_or_else(|| {
            AssayError::Io(
                ErrorInfo::new("archive.column", "archive table lacks a column")
                    .with_context("column", name),
            )
        })?;
        Ok(self
            .rows
            .get(row)
            .and_then(|cells| cells.get(col))
            .map(String::as_str)
            .unwrap_or(""))
    }

    /// Renames `old` to `new` unless `new` already exists.
    pub fn rename(&mut self, old: &str, new: &str) -> bool {
        if self.has(new) {
            return false;
        }
        match self.column(old) {
            Some(col) => {
                self.headers[col] = new.to_string();
                true
            }
            None => false,
        }
    }

    /// Appends `name` filled with `default` when it is absent.
    pub fn ensure(&mut self, name: &str, default: &str) -> bool {
        if self.has(name) {
            return false;
        }
        self.headers.push(name.to_string());
        let width = self.headers.len();
        for row in &mut self.rows {
            row.resize(width - 1, String::new());
            row.push(default.to_string());
        }
        true
    }

    pub fn map_column(&mut self, name: &str, f: impl Fn(&str) -> String) {
        if let Some(col) = self.column(name) {
            for row in &mut self.rows {
                if let Some(cell) = row.get_mut(col) {
                    *cell = f(cell);
                }
            }
        }
    }

    pub fn to_bytes(&self, name: &str) -> Result<Vec<u8>, AssayError> {
        let mut writer = WriterBuilder::new().from_writer(Vec::new());
        writer
            .write_record(&self.headers)
            .map_err(|err| csv_error("archive.csv_write", name, err))?;
        for row in &self.rows {
            writer
                .write_record(row)
                .map_err(|err| csv_error("archive.csv_write", name, err))?;
        }
        writer.into_inner().map_err(|err| {
            AssayError::Io(ErrorInfo::new("archive.csv_write", err.to_string()).with_context("entry", name))
        })
    }

    pub fn from_bytes(bytes: &[u8], name: &str) -> Result<Self, AssayError> {
        let mut reader = ReaderBuilder::new().flexible(true).from_reader(bytes);
        let headers = reader
            .headers()
            .map_err(|err| csv_error("archive.csv_read", name, err))?
            .iter()
            .map(str::to_string)
            .collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|err| csv_error("archive.csv_read", name, err))?;
            rows.push(record.iter().map(str::to_string).collect());
        }
        Ok(Self { headers, rows })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_cells_survive_quoting() {
        let mut frame = Frame::new(&["SampleID", "Raw"]);
        frame.push(vec!["X, 1".into(), "[1, 2, nan]".into()]);
        let bytes = frame.to_bytes("t.csv").unwrap();
        assert_eq!(Frame::from_bytes(&bytes, "t.csv").unwrap(), frame);
    }

    #[test]
    fn ensure_fills_defaults() {
        let mut frame = Frame::new(&["A"]);
        frame.push(vec!["1".into()]);
        assert!(frame.ensure("B", "x"));
        assert!(!frame.ensure("B", "y"));
        assert_eq!(frame.value(0, "B").unwrap(), "x");
        assert!(frame.value(0, "C").is_err());
    }
}
