// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Column-major cell tables over loaded spreadsheet sheets and CSV files.

use crate::error::{Error, Result};
use crate::number::{format_number, normalize_literal};
use rustc_hash::FxHashMap;

/// A single spreadsheet cell
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum CellValue {
    /// Empty cell
    #[default]
    Empty,
    /// Numeric cell (spreadsheets store integers as floats)
    Number(f64),
    /// Boolean cell
    Bool(bool),
    /// Text cell
    Text(String),
}

impl CellValue {
    /// Cell rendered as text, numbers without a trailing `.0`
    pub fn normalized(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Number(n) => format_number(*n),
            CellValue::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            CellValue::Text(s) => normalize_literal(s),
        }
    }

    /// Cell as raw trimmed text (no numeric rewriting of text cells)
    pub fn as_text(&self) -> String {
        match self {
            CellValue::Text(s) => s.trim().to_string(),
            other => other.normalized(),
        }
    }

    #[inline]
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        if s.is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(s.to_string())
        }
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

/// Longest column label a spreadsheet accepts (`XFD`)
const MAX_COLUMN_LETTERS: usize = 3;

/// Convert a spreadsheet column label to a 0-based index: `A`→0, `Z`→25, `AA`→26.
///
/// Non-letters are ignored; returns `None` when no letter is present or the
/// label is longer than [`MAX_COLUMN_LETTERS`], so ordinary words are not columns.
pub fn column_index(letters: &str) -> Option<usize> {
    let mut idx = 0usize;
    let mut count = 0;
    for c in letters.chars().filter(char::is_ascii_alphabetic) {
        count += 1;
        if count > MAX_COLUMN_LETTERS {
            return None;
        }
        idx = idx * 26 + (c.to_ascii_uppercase() as usize - 'A' as usize + 1);
    }
    (count > 0).then(|| idx - 1)
}

/// Like [`column_index`] but for configuration input, where a bad label is an error.
pub fn parse_column(letters: &str) -> Result<usize> {
    column_index(letters).ok_or_else(|| Error::InvalidColumn(letters.to_string()))
}

/// Column-major 2D table
///
/// Out-of-range reads return [`CellValue::Empty`], matching how ragged
/// spreadsheet and CSV rows behave.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CellGrid {
    columns: Vec<Vec<CellValue>>,
    rows: usize,
}

static EMPTY: CellValue = CellValue::Empty;

impl CellGrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from row-major data (the shape readers produce)
    pub fn from_rows<R, C>(rows: R) -> Self
    where
        R: IntoIterator<Item = C>,
        C: IntoIterator<Item = CellValue>,
    {
        let mut grid = Self::new();
        for (r, row) in rows.into_iter().enumerate() {
            for (c, value) in row.into_iter().enumerate() {
                grid.set(r, c, value);
            }
            grid.rows = grid.rows.max(r + 1);
        }
        grid
    }

    /// Build from text rows, treating every value as a text cell
    pub fn from_text_rows<R, C, S>(rows: R) -> Self
    where
        R: IntoIterator<Item = C>,
        C: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::from_rows(
            rows.into_iter()
                .map(|row| row.into_iter().map(|s| CellValue::from(s.as_ref())).collect::<Vec<_>>()),
        )
    }

    /// Write a cell, growing the grid as needed
    pub fn set(&mut self, row: usize, col: usize, value: CellValue) {
        if self.columns.len() <= col {
            self.columns.resize_with(col + 1, Vec::new);
        }
        let column = &mut self.columns[col];
        if column.len() <= row {
            column.resize(row + 1, CellValue::Empty);
        }
        column[row] = value;
        self.rows = self.rows.max(row + 1);
    }

    #[inline]
    pub fn cell(&self, row: usize, col: usize) -> &CellValue {
        self.columns
            .get(col)
            .and_then(|c| c.get(row))
            .unwrap_or(&EMPTY)
    }

    /// Normalized text of a cell
    #[inline]
    pub fn text(&self, row: usize, col: usize) -> String {
        self.cell(row, col).normalized()
    }

    #[inline]
    pub fn row_count(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Row indices after the header row
    pub fn data_rows(&self) -> std::ops::Range<usize> {
        1.min(self.rows)..self.rows
    }

    /// Entire column, padded to the row count on read
    pub fn column(&self, col: usize) -> impl Iterator<Item = &CellValue> + '_ {
        (0..self.rows).map(move |r| self.cell(r, col))
    }
}

/// Named sheets of one workbook file
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Workbook {
    /// Display name used in diagnostics (usually the file name)
    pub name: String,
    sheets: FxHashMap<String, CellGrid>,
}

impl Workbook {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sheets: FxHashMap::default(),
        }
    }

    pub fn insert_sheet(&mut self, sheet: impl Into<String>, grid: CellGrid) {
        self.sheets.insert(sheet.into(), grid);
    }

    pub fn with_sheet(mut self, sheet: impl Into<String>, grid: CellGrid) -> Self {
        self.insert_sheet(sheet, grid);
        self
    }

    #[inline]
    pub fn sheet(&self, sheet: &str) -> Option<&CellGrid> {
        self.sheets.get(sheet)
    }

    /// Sheet lookup that reports a missing sheet as an error
    pub fn require_sheet(&self, sheet: &str) -> Result<&CellGrid> {
        self.sheet(sheet)
            .ok_or_else(|| Error::missing_sheet(&self.name, sheet))
    }

    pub fn sheet_names(&self) -> impl Iterator<Item = &str> {
        self.sheets.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_index() {
        assert_eq!(column_index("A"), Some(0));
        assert_eq!(column_index("b"), Some(1));
        assert_eq!(column_index("Z"), Some(25));
        assert_eq!(column_index("AA"), Some(26));
        assert_eq!(column_index("EE"), Some(134));
        assert_eq!(column_index("DZ"), Some(129));
        assert_eq!(column_index(""), None);
        assert_eq!(column_index("XFD"), Some(16383));
        assert_eq!(column_index("ABCD"), None);
        assert_eq!(column_index("Caratteristiche"), None);
        assert!(parse_column("12").is_err());
    }

    #[test]
    fn test_cell_normalization() {
        assert_eq!(CellValue::Number(100.0).normalized(), "100");
        assert_eq!(CellValue::Number(1.25).normalized(), "1.25");
        assert_eq!(CellValue::Text(" 42.0 ".into()).normalized(), "42");
        assert_eq!(CellValue::Text("Steel".into()).normalized(), "Steel");
        assert_eq!(CellValue::Empty.normalized(), "");
    }

    #[test]
    fn test_ragged_grid_reads() {
        let grid = CellGrid::from_text_rows(vec![vec!["a", "b", "c"], vec!["d"]]);
        assert_eq!(grid.row_count(), 2);
        assert_eq!(grid.column_count(), 3);
        assert_eq!(grid.text(1, 0), "d");
        assert_eq!(grid.cell(1, 2), &CellValue::Empty);
        assert_eq!(grid.cell(10, 10), &CellValue::Empty);
        assert_eq!(grid.data_rows(), 1..2);
    }

    #[test]
    fn test_missing_sheet_is_error() {
        let wb = Workbook::new("rules.xlsx").with_sheet("A", CellGrid::new());
        assert!(wb.require_sheet("A").is_ok());
        let err = wb.require_sheet("B").unwrap_err();
        assert!(err.to_string().contains("rules.xlsx"));
    }
}
