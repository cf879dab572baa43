// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Project-title conventions.
//!
//! Document titles follow `<org>-<site>-<phase>-<line>-<branch>-...`, where
//! the hyphen-separated segment 3 identifies the building or line and
//! segment 4 the branch.

/// Segment index of the building/line code
pub const LINE_SEGMENT: usize = 3;
/// Segment index of the branch code
pub const BRANCH_SEGMENT: usize = 4;

/// Title of the active document, pre-split into segments
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TitleContext {
    title: String,
    segments: Vec<String>,
}

impl TitleContext {
    pub fn new(title: impl Into<String>) -> Self {
        let title = title.into();
        let segments = title.split('-').map(str::to_string).collect();
        Self { title, segments }
    }

    #[inline]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Segment at `index`, empty when the title is shorter
    pub fn segment(&self, index: usize) -> &str {
        self.segments.get(index).map(String::as_str).unwrap_or("")
    }

    /// Building/line code as written in the title
    pub fn line_segment(&self) -> &str {
        self.segment(LINE_SEGMENT)
    }

    /// Branch code used by title-branch rules
    pub fn branch_segment(&self) -> &str {
        self.segment(BRANCH_SEGMENT)
    }

    /// Line code rewritten into the key format of the line CSV
    pub fn line_key(&self) -> String {
        line_key(self.line_segment())
    }

    /// Digits between a `-` and the following `_` (`ABC-1234_x` → `1234`)
    pub fn model_code(&self) -> Option<&str> {
        let bytes = self.title.as_bytes();
        let mut search_from = 0;
        while let Some(offset) = self.title[search_from..].find('-') {
            let start = search_from + offset + 1;
            let mut end = start;
            while end < bytes.len() && bytes[end].is_ascii_digit() {
                end += 1;
            }
            if end > start && bytes.get(end) == Some(&b'_') {
                return Some(&self.title[start..end]);
            }
            search_from = start;
        }
        None
    }
}

/// Replace the first `_` with `/` and the next one with `.`: `12_34_AB` → `12/34.AB`
pub fn line_key(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    let mut replaced = 0;
    for c in segment.chars() {
        match (c, replaced) {
            ('_', 0) => {
                out.push('/');
                replaced += 1;
            }
            ('_', 1) => {
                out.push('.');
                replaced += 1;
            }
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segments() {
        let title = TitleContext::new("SNAM-MGRC2-P-12_34_AB-B01-ARC");
        assert_eq!(title.segment(0), "SNAM");
        assert_eq!(title.line_segment(), "12_34_AB");
        assert_eq!(title.branch_segment(), "B01");
        assert_eq!(title.segment(9), "");
    }

    #[test]
    fn test_line_key() {
        assert_eq!(line_key("12_34_AB"), "12/34.AB");
        assert_eq!(line_key("12_34_AB_C"), "12/34.AB_C");
        assert_eq!(line_key("1234"), "1234");
        assert_eq!(line_key("12_"), "12/");
    }

    #[test]
    fn test_model_code() {
        assert_eq!(TitleContext::new("SNAM-4410_ARC-X").model_code(), Some("4410"));
        assert_eq!(TitleContext::new("A-B-77_C").model_code(), Some("77"));
        assert_eq!(TitleContext::new("A-B_C").model_code(), None);
        assert_eq!(TitleContext::new("").model_code(), None);
    }
}
