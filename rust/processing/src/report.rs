// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-of-run summary.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

use crate::host::ElementId;

/// Progress of a two-phase run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum RunPhase {
    #[default]
    NotStarted,
    Phase1Running,
    Phase1Done,
    Phase2Running,
    Done,
}

/// A user-visible problem on one element
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunWarning {
    pub element: ElementId,
    pub family: String,
    /// `<family> [<type>][ID:<id>]`
    pub label: String,
    /// Rule target, `None` for element-level warnings
    pub target: Option<String>,
    pub message: String,
}

/// Why a rule was skipped on an element (verbose runs only)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkipNote {
    pub element: ElementId,
    pub target: String,
    pub reason: String,
}

/// Counts and diagnostics of one run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub profile: String,
    pub phase: RunPhase,
    /// Elements that passed the profile's element filters
    pub elements: usize,
    /// Successful attribute writes
    pub writes: usize,
    pub updated_targets: BTreeSet<String>,
    pub warnings: Vec<RunWarning>,
    /// Targets missing or read-only on at least one element
    pub missing_targets: BTreeSet<String>,
    pub skipped: Vec<SkipNote>,
}

impl RunReport {
    pub fn new(profile: impl Into<String>) -> Self {
        Self {
            profile: profile.into(),
            ..Self::default()
        }
    }

    #[inline]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Warnings grouped by family name, families sorted
    pub fn warnings_by_family(&self) -> BTreeMap<&str, Vec<&RunWarning>> {
        let mut groups: BTreeMap<&str, Vec<&RunWarning>> = BTreeMap::new();
        for warning in &self.warnings {
            groups.entry(warning.family.as_str()).or_default().push(warning);
        }
        groups
    }

    pub(crate) fn record_write(&mut self, target: &str) {
        self.writes += 1;
        if !self.updated_targets.contains(target) {
            self.updated_targets.insert(target.to_string());
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Mapping '{}': {} parameters written ({} distinct) on {} elements [{:?}]",
            self.profile,
            self.writes,
            self.updated_targets.len(),
            self.elements,
            self.phase
        )?;

        if self.has_warnings() {
            writeln!(f, "Warnings:")?;
            for (family, warnings) in self.warnings_by_family() {
                writeln!(f, "{}", family)?;
                for w in warnings {
                    match &w.target {
                        Some(target) => writeln!(f, "  {} WARNING {}: {}", w.label, target, w.message)?,
                        None => writeln!(f, "  {} WARNING: {}", w.label, w.message)?,
                    }
                }
            }
        }

        if !self.missing_targets.is_empty() {
            writeln!(f, "Parameters not present on elements:")?;
            for target in &self.missing_targets {
                writeln!(f, "  - {}", target)?;
            }
        }

        if !self.skipped.is_empty() {
            writeln!(f, "Skipped:")?;
            for note in &self.skipped {
                writeln!(f, "  [ID:{}] {}: {}", note.element, note.target, note.reason)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn warning(family: &str, target: Option<&str>) -> RunWarning {
        RunWarning {
            element: ElementId(7),
            family: family.to_string(),
            label: format!("{} [T][ID:7]", family),
            target: target.map(str::to_string),
            message: "missing".to_string(),
        }
    }

    #[test]
    fn test_groups_by_family() {
        let mut report = RunReport::new("accessories");
        report.warnings.push(warning("AP02", Some("NP1")));
        report.warnings.push(warning("AP01", None));
        report.warnings.push(warning("AP02", Some("NP2")));

        let groups = report.warnings_by_family();
        assert_eq!(groups.keys().copied().collect::<Vec<_>>(), vec!["AP01", "AP02"]);
        assert_eq!(groups["AP02"].len(), 2);
    }

    #[test]
    fn test_display_summary() {
        let mut report = RunReport::new("pipes");
        report.record_write("NP100");
        report.record_write("NP100");
        report.elements = 2;
        report.phase = RunPhase::Done;
        report.missing_targets.insert("NP999".to_string());
        report.warnings.push(warning("Tubo", Some("NP101")));

        let text = report.to_string();
        assert!(text.starts_with("Mapping 'pipes': 2 parameters written (1 distinct) on 2 elements [Done]"));
        assert!(text.contains("Tubo [T][ID:7] WARNING NP101: missing"));
        assert!(text.contains("  - NP999"));
        assert!(!text.contains("Skipped:"));
    }
}
