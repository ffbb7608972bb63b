//! List-valued CSV cells.
//!
//! Lists are written as `[a, b, c]` and nest freely (`[[1, 2], [3]]`).
//! The reader also accepts a list wrapped in quotes, as older archives
//! stored lists as strings of lists. Floats use their shortest
//! round-trip form; NaN is written `nan`.

use assay_core::{AssayError, ErrorInfo};

/// A parsed cell: a bare atom or a list of cells.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Atom(String),
    List(Vec<Cell>),
}

fn cell_error(message: &str, text: &str) -> AssayError {
    AssayError::Serde(ErrorInfo::new("archive.list_cell", message).with_context("cell", text))
}

pub fn fmt_float(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else {
        format!("{value}")
    }
}

fn bracket<I: IntoIterator<Item = String>>(items: I) -> String {
    format!("[{}]", items.into_iter().collect::<Vec<_>>().join(", "))
}

pub fn encode_floats(values: &[f64]) -> String {
    bracket(values.iter().map(|v| fmt_float(*v)))
}

pub fn encode_nested_floats(groups: &[Vec<f64>]) -> String {
    bracket(groups.iter().map(|group| encode_floats(group)))
}

pub fn encode_indices(values: &[usize]) -> String {
    bracket(values.iter().map(|v| v.to_string()))
}

pub fn encode_nested_indices(groups: &[Vec<usize>]) -> String {
    bracket(groups.iter().map(|group| encode_indices(group)))
}

pub fn encode_bools(values: &[bool]) -> String {
    bracket(values.iter().map(|v| v.to_string()))
}

pub fn encode_points(points: &[[f64; 2]]) -> String {
    bracket(points.iter().map(|p| encode_floats(p)))
}

fn unquote(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if first == last && (first == b'\'' || first == b'"') {
            return Some(&text[1..text.len() - 1]);
        }
    }
    None
}

struct Parser<'a> {
    text: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn skip_ws(&mut self) {
        while self.chars.get(self.pos).is_some_and(|c| c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn list(&mut self) -> Result<Vec<Cell>, AssayError> {
        // caller guarantees '['
        self.pos += 1;
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            match self.chars.get(self.pos).copied() {
                None => return Err(cell_error("unterminated list", self.text)),
                Some(']') => {
                    self.pos += 1;
                    return Ok(items);
                }
                Some('[') => items.push(Cell::List(self.list()?)),
                Some(quote @ ('\'' | '"')) => {
                    let start = self.pos + 1;
                    let end = (start..self.chars.len())
                        .find(|i| self.chars[*i] == quote)
                        .ok_or_else(|| cell_error("unterminated quote", self.text))?;
                    let inner: String = self.chars[start..end].iter().collect();
                    self.pos = end + 1;
                    items.push(parse_cell(&inner)?);
                }
                Some(_) => {
                    let start = self.pos;
                    while self
                        .chars
                        .get(self.pos)
                        .is_some_and(|c| *c != ',' && *c != ']')
                    {
                        self.pos += 1;
                    }
                    let atom: String = self.chars[start..self.pos].iter().collect();
                    items.push(Cell::Atom(atom.trim().to_string()));
                }
            }
            self.skip_ws();
            match self.chars.get(self.pos).copied() {
                Some(',') => self.pos += 1,
                Some(']') => {}
                _ => return Err(cell_error("expected ',' or ']'", self.text)),
            }
        }
    }
}

/// Parses one cell. Anything not starting with `[` is an atom.
pub fn parse_cell(text: &str) -> Result<Cell, AssayError> {
    let trimmed = text.trim();
    if let Some(inner) = unquote(trimmed) {
        return parse_cell(inner);
    }
    if !trimmed.starts_with('[') {
        return Ok(Cell::Atom(trimmed.to_string()));
    }
    let mut parser = Parser {
        text: trimmed,
        chars: trimmed.chars().collect(),
        pos: 0,
    };
    let items = parser.list()?;
    parser.skip_ws();
    if parser.pos != parser.chars.len() {
        return Err(cell_error("trailing characters after list", trimmed));
    }
    Ok(Cell::List(items))
}

/// Parses a float atom; empty and `nan` in any case are NaN.
pub fn parse_float(atom: &str) -> Result<f64, AssayError> {
    let atom = atom.trim();
    if atom.is_empty() || atom.eq_ignore_ascii_case("nan") || atom.eq_ignore_ascii_case("none") {
        return Ok(f64::NAN);
    }
    atom.parse::<f64>()
        .map_err(|_| cell_error("not a number", atom))
}

pub fn parse_index(atom: &str) -> Result<usize, AssayError> {
    let value = parse_float(atom)?;
    if value.is_finite() && value >= 0.0 && value.fract() == 0.0 {
        Ok(value as usize)
    } else {
        Err(cell_error("not an index", atom))
    }
}

pub fn parse_bool(atom: &str) -> Result<bool, AssayError> {
    match atom.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" | "" => Ok(false),
        _ => Err(cell_error("not a boolean", atom)),
    }
}

impl Cell {
    fn items(&self) -> Vec<&Cell> {
        match self {
            Cell::List(items) => items.iter().collect(),
            Cell::Atom(atom) if atom.is_empty() => Vec::new(),
            atom => vec![atom],
        }
    }

    fn atoms<T>(&self, parse: impl Fn(&str) -> Result<T, AssayError>) -> Result<Vec<T>, AssayError> {
        self.items()
            .into_iter()
            .map(|item| match item {
                Cell::Atom(atom) => parse(atom),
                Cell::List(_) => Err(cell_error("unexpected nested list", "")),
            })
            .collect()
    }

    pub fn as_floats(&self) -> Result<Vec<f64>, AssayError> {
        self.atoms(parse_float)
    }

    pub fn as_indices(&self) -> Result<Vec<usize>, AssayError> {
        self.atoms(parse_index)
    }

    pub fn as_bools(&self) -> Result<Vec<bool>, AssayError> {
        self.atoms(parse_bool)
    }

    pub fn as_nested_floats(&self) -> Result<Vec<Vec<f64>>, AssayError> {
        self.items().into_iter().map(Cell::as_floats).collect()
    }

    pub fn as_nested_indices(&self) -> Result<Vec<Vec<usize>>, AssayError> {
        self.items().into_iter().map(Cell::as_indices).collect()
    }

    pub fn as_points(&self) -> Result<Vec<[f64; 2]>, AssayError> {
        self.as_nested_floats()?
            .into_iter()
            .map(|pair| match pair.as_slice() {
                [x, y] => Ok([*x, *y]),
                _ => Err(cell_error("point needs two coordinates", "")),
            })
            .collect()
    }
}

pub fn floats(text: &str) -> Result<Vec<f64>, AssayError> {
    parse_cell(text)?.as_floats()
}

pub fn nested_floats(text: &str) -> Result<Vec<Vec<f64>>, AssayError> {
    parse_cell(text)?.as_nested_floats()
}

pub fn indices(text: &str) -> Result<Vec<usize>, AssayError> {
    parse_cell(text)?.as_indices()
}

pub fn nested_indices(text: &str) -> Result<Vec<Vec<usize>>, AssayError> {
    parse_cell(text)?.as_nested_indices()
}

pub fn bools(text: &str) -> Result<Vec<bool>, AssayError> {
    parse_cell(text)?.as_bools()
}

pub fn points(text: &str) -> Result<Vec<[f64; 2]>, AssayError> {
    parse_cell(text)?.as_points()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_lists_parse() {
        let groups = nested_floats("[[1, 2.5], [nan], []]").unwrap();
        assert_eq!(groups[0], vec![1.0, 2.5]);
        assert!(groups[1][0].is_nan());
        assert!(groups[2].is_empty());
    }

    #[test]
    fn strings_of_lists_are_reparsed() {
        assert_eq!(floats("'[1.0, 2.0]'").unwrap(), vec![1.0, 2.0]);
        assert_eq!(
            nested_indices("[\"[0, 1]\", '[2]']").unwrap(),
            vec![vec![0, 1], vec![2]]
        );
    }

    #[test]
    fn nan_is_written_lowercase() {
        assert_eq!(encode_floats(&[0.1, f64::NAN, 1e-7]), "[0.1, nan, 0.0000001]");
        assert_eq!(encode_bools(&[true, false]), "[true, false]");
    }

    #[test]
    fn malformed_cells_are_errors() {
        assert!(floats("[1, 2").is_err());
        assert!(floats("[1, x]").is_err());
        assert!(indices("[1.5]").is_err());
        assert_eq!(floats("").unwrap(), Vec::<f64>::new());
    }
}
