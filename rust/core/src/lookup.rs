// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Lazily built key → row indexes over auxiliary sheets
//!
//! One [`LookupIndex`] lives for one mapping run. A table is built the first
//! time a (source, column, normalization) triple is queried and reused by
//! every later element. Building is a pure function of the grid, so a table
//! never changes once inserted.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::grid::{CellGrid, CellValue};
use crate::number::numeric_key;

/// How a key cell (and a lookup key) is normalized before comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyNorm {
    /// First embedded number, rounded to the nearest integer
    Numeric,
    /// Trimmed text, case-sensitive
    Text,
    /// Trimmed text, upper-cased
    TextUpper,
}

impl KeyNorm {
    /// Normalize a raw key, `None` when it carries nothing to match on
    pub fn normalize(self, raw: &str) -> Option<String> {
        let key = match self {
            KeyNorm::Numeric => numeric_key(raw)?.to_string(),
            KeyNorm::Text => raw.trim().to_string(),
            KeyNorm::TextUpper => raw.trim().to_uppercase(),
        };
        (!key.is_empty()).then_some(key)
    }

    fn normalize_cell(self, cell: &CellValue) -> Option<String> {
        self.normalize(&cell.normalized())
    }
}

/// Rows per normalized key, in sheet order
#[derive(Debug, Clone, Default)]
pub struct LookupTable {
    rows: FxHashMap<String, SmallVec<[usize; 1]>>,
    norm: Option<KeyNorm>,
}

impl LookupTable {
    /// Index the data rows (row 0 is the header) of `grid` by `column`
    pub fn build(grid: &CellGrid, column: usize, norm: KeyNorm) -> Self {
        let mut rows: FxHashMap<String, SmallVec<[usize; 1]>> = FxHashMap::default();
        for row in grid.data_rows() {
            if let Some(key) = norm.normalize_cell(grid.cell(row, column)) {
                rows.entry(key).or_default().push(row);
            }
        }
        Self {
            rows,
            norm: Some(norm),
        }
    }

    /// Every row whose key matches `raw`, first occurrence first
    pub fn rows(&self, raw: &str) -> &[usize] {
        self.norm
            .and_then(|norm| norm.normalize(raw))
            .and_then(|key| self.rows.get(&key))
            .map(|rows| rows.as_slice())
            .unwrap_or(&[])
    }

    /// First row whose key matches `raw`
    #[inline]
    pub fn first(&self, raw: &str) -> Option<usize> {
        self.rows(raw).first().copied()
    }

    /// Last row whose key matches `raw`
    #[inline]
    pub fn last(&self, raw: &str) -> Option<usize> {
        self.rows(raw).last().copied()
    }

    /// Number of distinct keys
    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TableKey {
    source: String,
    column: usize,
    norm: KeyNorm,
}

/// Memoized lookup tables for one run
#[derive(Debug, Default)]
pub struct LookupIndex {
    tables: FxHashMap<TableKey, LookupTable>,
}

impl LookupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table for `grid` keyed by `column`, building it on first use.
    ///
    /// `source` names the grid (e.g. `rules/BARRE_GASD`); the caller must pass
    /// the same grid every time it uses the same name.
    pub fn table(&mut self, source: &str, grid: &CellGrid, column: usize, norm: KeyNorm) -> &LookupTable {
        let key = TableKey {
            source: source.to_string(),
            column,
            norm,
        };
        self.tables
            .entry(key)
            .or_insert_with(|| LookupTable::build(grid, column, norm))
    }

    /// First matching row, `None` on a miss
    pub fn find_row(
        &mut self,
        source: &str,
        grid: &CellGrid,
        column: usize,
        norm: KeyNorm,
        key: &str,
    ) -> Option<usize> {
        self.table(source, grid, column, norm).first(key)
    }

    /// Last matching row, for sources where later rows override earlier ones
    pub fn find_last_row(
        &mut self,
        source: &str,
        grid: &CellGrid,
        column: usize,
        norm: KeyNorm,
        key: &str,
    ) -> Option<usize> {
        self.table(source, grid, column, norm).last(key)
    }

    /// All matching rows, empty on a miss
    pub fn find_rows(
        &mut self,
        source: &str,
        grid: &CellGrid,
        column: usize,
        norm: KeyNorm,
        key: &str,
    ) -> SmallVec<[usize; 4]> {
        SmallVec::from_slice(self.table(source, grid, column, norm).rows(key))
    }

    /// Whether a table has already been built
    pub fn is_built(&self, source: &str, column: usize, norm: KeyNorm) -> bool {
        self.tables.contains_key(&TableKey {
            source: source.to_string(),
            column,
            norm,
        })
    }

    /// Number of tables built so far
    #[inline]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
