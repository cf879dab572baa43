// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for rule-language operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while loading reference data for a mapping run
#[derive(Error, Debug)]
pub enum Error {
    #[error("source file not found: {}", .0.display())]
    MissingSourceFile(PathBuf),

    #[error("sheet '{sheet}' not found in {source_name}")]
    MissingSheet { source_name: String, sheet: String },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("invalid column reference: {0}")]
    InvalidColumn(String),
}

impl Error {
    pub fn missing_sheet(source_name: impl Into<String>, sheet: impl Into<String>) -> Self {
        Error::MissingSheet {
            source_name: source_name.into(),
            sheet: sheet.into(),
        }
    }
}
