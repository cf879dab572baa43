// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Numeric text helpers shared by every rule.
//!
//! Spreadsheet cells and host attributes carry numbers in many shapes
//! (`100`, `100.0`, `DN 100 mm`, `1.50`). All of them are rendered through
//! [`format_number`]: whole numbers without a decimal point, everything else
//! with at most six fractional digits and no trailing zeros.

/// Render a number the way mapped attributes expect it.
///
/// Never uses scientific notation and never renders `-0`.
pub fn format_number(value: f64) -> String {
    if !value.is_finite() {
        return value.to_string();
    }

    if value.fract() == 0.0 && value.abs() < 1e15 {
        let whole = value as i64;
        return whole.to_string();
    }

    let fixed = format!("{:.6}", value);
    let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
    match trimmed {
        "" | "-0" => "0".to_string(),
        other => other.to_string(),
    }
}

/// Extract the first signed decimal number embedded in `text`.
///
/// Matches `[-+]?\d*\.?\d+` leftmost-first: `"DN 100 mm"` → `100`,
/// `"-2.5m"` → `-2.5`, `".5"` → `0.5`, `"12."` → `12`.
pub fn first_number(text: &str) -> Option<f64> {
    let bytes = text.as_bytes();
    (0..bytes.len()).find_map(|start| {
        let end = number_end(bytes, start)?;
        text[start..end].parse::<f64>().ok()
    })
}

/// End offset of a number starting exactly at `start`, if one does.
fn number_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut pos = start;
    if matches!(bytes.get(pos), Some(b'-') | Some(b'+')) {
        pos += 1;
    }

    let int_start = pos;
    while pos < bytes.len() && bytes[pos].is_ascii_digit() {
        pos += 1;
    }
    let int_digits = pos - int_start;

    if bytes.get(pos) == Some(&b'.') && bytes.get(pos + 1).is_some_and(u8::is_ascii_digit) {
        pos += 1;
        while pos < bytes.len() && bytes[pos].is_ascii_digit() {
            pos += 1;
        }
        return Some(pos);
    }

    (int_digits > 0).then_some(pos)
}

/// First number of `text` rounded half away from zero, used as a lookup key.
pub fn numeric_key(text: &str) -> Option<i64> {
    first_number(text).map(|n| n.round() as i64)
}

/// Parse a whole cell text as a number (`"12.50"`, `"-3"`), rejecting partial matches.
pub fn parse_number(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    fast_float::parse::<f64, _>(trimmed)
        .ok()
        .filter(|n| n.is_finite())
}

/// Normalize a literal typed into a text cell: `"100.0"` → `"100"`.
///
/// Only the exact shape `-?\d+\.0` is rewritten; other text is trimmed and
/// returned untouched so codes like `007` survive.
pub fn normalize_literal(text: &str) -> String {
    let trimmed = text.trim();
    if let Some(head) = trimmed.strip_suffix(".0") {
        let digits = head.strip_prefix('-').unwrap_or(head);
        if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            return head.to_string();
        }
    }
    trimmed.to_string()
}

/// Looked-up table value: text that is a plain number is re-rendered with
/// [`format_number`] (`"3.60"` → `"3.6"`, `"007"` → `"7"`), anything else is trimmed.
pub fn normalize_table_value(text: &str) -> String {
    let trimmed = text.trim();
    match trimmed.parse::<f64>() {
        Ok(value) if value.is_finite() => format_number(value),
        _ => trimmed.to_string(),
    }
}
