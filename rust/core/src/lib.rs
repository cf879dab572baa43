// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # Paramap Core
//!
//! Rule language for spreadsheet-driven parameter mapping, with rule
//! descriptions parsed by [nom](https://docs.rs/nom).
//!
//! ## Overview
//!
//! This crate holds everything that does not touch a host document or the
//! filesystem:
//!
//! - **Cell grids**: column-major tables over loaded sheets and CSV files
//! - **Rule parsing**: one mapping-sheet row into a typed [`Rule`]
//! - **Lookup indexes**: lazily built key → row tables over auxiliary sheets
//! - **Normalization**: shared number formatting, Italian dates, title segments
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use paramap_core::{parse_rule_sheet, CellGrid, RuleKind};
//!
//! let sheet = CellGrid::from_text_rows(vec![
//!     vec!["#", "Parametro", "Codice", "Descrizione"],
//!     vec!["1", "NP100_material", "C", "Steel"],
//! ]);
//! let rules = parse_rule_sheet(&sheet);
//! assert_eq!(rules.rules[0].kind, RuleKind::Constant { value: "Steel".into() });
//! ```
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization support for cells and parsed rules

pub mod dates;
pub mod delimited;
pub mod error;
pub mod grid;
pub mod lookup;
pub mod number;
pub mod parser;
pub mod rule;
pub mod title;
pub mod units;

pub use dates::{normalize_line_value, to_ddmmyyyy, NOT_AVAILABLE};
pub use delimited::{decode_csv, detect_delimiter};
pub use error::{Error, Result};
pub use grid::{column_index, parse_column, CellGrid, CellValue, Workbook};
pub use lookup::{KeyNorm, LookupIndex, LookupTable};
pub use number::{first_number, format_number, normalize_literal, normalize_table_value, numeric_key, parse_number};
pub use parser::{leading_column, parse_rule, parse_rule_sheet};
pub use rule::{ElevationChoice, Rule, RuleCode, RuleKind, RuleSet, TypeAlternative};
pub use title::{line_key, TitleContext};
pub use units::{feet_to_mm, format_length_mm, format_mm, MM_PER_FOOT};
