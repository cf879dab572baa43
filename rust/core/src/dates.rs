// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Value normalization for line-table lookups: Italian short dates and
//! operating-state wording.

use nom::{
    bytes::complete::take_while_m_n,
    character::complete::one_of,
    combinator::eof,
    sequence::tuple,
    IResult,
};

/// Value written when the line table has nothing for the element
pub const NOT_AVAILABLE: &str = "N/C";

fn italian_month(abbrev: &str) -> Option<&'static str> {
    let month = match abbrev.to_lowercase().as_str() {
        "gen" => "01",
        "feb" => "02",
        "mar" => "03",
        "apr" => "04",
        "mag" => "05",
        "giu" => "06",
        "lug" => "07",
        "ago" => "08",
        "set" => "09",
        "ott" => "10",
        "nov" => "11",
        "dic" => "12",
        _ => return None,
    };
    Some(month)
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// `27-feb-17` → (`27`, `feb`, `17`)
fn short_date(input: &str) -> IResult<&str, (&str, &str, &str)> {
    let (rest, (day, _, month, _, year, _)) = tuple((
        take_while_m_n(1, 2, |c: char| c.is_ascii_digit()),
        one_of("-/."),
        take_while_m_n(3, 3, is_word_char),
        one_of("-/."),
        take_while_m_n(2, 4, |c: char| c.is_ascii_digit()),
        eof,
    ))(input)?;
    Ok((rest, (day, month, year)))
}

/// Rewrite `D-mon-YY` style dates with Italian month abbreviations as `DDMMYYYY`.
///
/// Anything that is not such a date is returned unchanged.
pub fn to_ddmmyyyy(value: &str) -> String {
    let trimmed = value.trim();
    let Ok((_, (day, month, year))) = short_date(trimmed) else {
        return value.to_string();
    };
    let Some(mm) = italian_month(month) else {
        return value.to_string();
    };

    let (Ok(day), Ok(year_num)) = (day.parse::<u32>(), year.parse::<u32>()) else {
        return value.to_string();
    };
    let full_year = if year.len() == 2 {
        if year_num < 50 {
            2000 + year_num
        } else {
            1900 + year_num
        }
    } else {
        year_num
    };

    format!("{:02}{}{:04}", day, mm, full_year)
}

/// Normalize a line-table cell before writing it to an element
pub fn normalize_line_value(raw: &str) -> String {
    let value = raw.trim();
    if value.is_empty() {
        return NOT_AVAILABLE.to_string();
    }
    if value.eq_ignore_ascii_case("esercizio") {
        return "Operativo".to_string();
    }
    to_ddmmyyyy(value)
}
