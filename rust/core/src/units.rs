// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Length conversion from the host's internal unit
//!
//! Hosts store lengths in decimal feet. Only the linear foot → millimeter
//! factor is needed; display-unit handling stays with the host.

use crate::number::format_number;

/// Millimeters per internal length unit (international foot)
pub const MM_PER_FOOT: f64 = 304.8;

#[inline]
pub fn feet_to_mm(feet: f64) -> f64 {
    feet * MM_PER_FOOT
}

/// Internal length as millimeters, rounded to 6 decimals, shared number formatting
pub fn format_length_mm(feet: f64) -> String {
    let mm = (feet_to_mm(feet) * 1e6).round() / 1e6;
    format_number(mm)
}

/// Millimeter distance with up to three decimals, trailing zeros trimmed
pub fn format_mm(mm: f64) -> String {
    let fixed = format!("{:.3}", mm);
    let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
    match trimmed {
        "" | "-0" => "0".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feet_to_mm() {
        assert!((feet_to_mm(1.0) - 304.8).abs() < 1e-9);
    }

    #[test]
    fn test_format_length_mm() {
        assert_eq!(format_length_mm(1.0), "304.8");
        assert_eq!(format_length_mm(100.0 / 304.8), "100");
        assert_eq!(format_length_mm(0.0), "0");
    }

    #[test]
    fn test_format_mm() {
        assert_eq!(format_mm(1500.0), "1500");
        assert_eq!(format_mm(-12.34567), "-12.346");
        assert_eq!(format_mm(0.0004), "0");
        assert_eq!(format_mm(2.5), "2.5");
    }
}
