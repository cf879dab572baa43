// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! CSV decoding for line tables exported from the asset register.
//!
//! Exports come from different tools, so the delimiter is detected from the
//! header line and a UTF-8 byte-order mark is tolerated.

use crate::error::Result;
use crate::grid::{CellGrid, CellValue};

const BOM: char = '\u{feff}';

/// Pick `;` or `,` by which occurs more often in the first line (ties go to `;`)
pub fn detect_delimiter(text: &str) -> u8 {
    let first_line = text.lines().next().unwrap_or("");
    let semicolons = memchr::memchr_iter(b';', first_line.as_bytes()).count();
    let commas = memchr::memchr_iter(b',', first_line.as_bytes()).count();
    if semicolons >= commas {
        b';'
    } else {
        b','
    }
}

/// Decode raw CSV bytes into a grid of trimmed text cells
///
/// Invalid UTF-8 sequences are replaced rather than rejected.
pub fn decode_csv(bytes: &[u8]) -> Result<CellGrid> {
    let text = String::from_utf8_lossy(bytes);
    let text = text.strip_prefix(BOM).unwrap_or(&text);
    let delimiter = detect_delimiter(text);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(
            record
                .iter()
                .map(|field| CellValue::from(field.trim()))
                .collect::<Vec<_>>(),
        );
    }

    Ok(CellGrid::from_rows(rows))
}
