// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Parsed mapping rules.
//!
//! A [`Rule`] is built once per run from one row of the mapping sheet. Every
//! code-specific parameter is parsed up front into [`RuleKind`], so evaluation
//! never re-reads the description text.

use std::collections::BTreeSet;
use std::fmt;

/// Rule code as written in the mapping sheet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RuleCode {
    /// `C` constant
    Constant,
    /// `X` lookup by nominal diameter
    DiameterLookup,
    /// `Z` unit-converted copy of a built-in parameter
    UnitCopy,
    /// `G` branch on the title branch segment
    TitleBranch,
    /// `K` branch on elevation sign
    ElevationBranch,
    /// `J` cross-reference by family/type prefix
    PrefixReference,
    /// `M` value-pair mapping
    ValueMap,
    /// `P` line CSV lookup
    LineLookup,
    /// `N` family/type conditional table
    FamilyTypeTable,
    /// `R` copy from the shadow attribute
    ShadowCopy,
    /// `Y` unit-converted copy of a named attribute
    NamedCopy,
    /// `L` deferred condition on another attribute's text
    SourceCondition,
    /// `D` constant for matching family prefixes
    FamilyPrefixConstant,
    /// `E` family membership flag
    FamilyMembership,
    /// `F` two-way choice on family prefix
    FamilyPrefixChoice,
    /// `W` asset workbook lookup
    AssetLookup,
    /// `T` vertical distance from the reference level
    LevelDelta,
    /// `N/C` explicitly not configured
    NotConfigured,
}

impl RuleCode {
    /// Parse a code cell (already trimmed and upper-cased by the caller or not)
    pub fn from_str(code: &str) -> Option<Self> {
        let code = match code.trim().to_ascii_uppercase().as_str() {
            "C" => RuleCode::Constant,
            "X" => RuleCode::DiameterLookup,
            "Z" => RuleCode::UnitCopy,
            "G" => RuleCode::TitleBranch,
            "K" => RuleCode::ElevationBranch,
            "J" => RuleCode::PrefixReference,
            "M" => RuleCode::ValueMap,
            "P" => RuleCode::LineLookup,
            "N" => RuleCode::FamilyTypeTable,
            "R" => RuleCode::ShadowCopy,
            "Y" => RuleCode::NamedCopy,
            "L" => RuleCode::SourceCondition,
            "D" => RuleCode::FamilyPrefixConstant,
            "E" => RuleCode::FamilyMembership,
            "F" => RuleCode::FamilyPrefixChoice,
            "W" => RuleCode::AssetLookup,
            "T" => RuleCode::LevelDelta,
            "N/C" => RuleCode::NotConfigured,
            _ => return None,
        };
        Some(code)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RuleCode::Constant => "C",
            RuleCode::DiameterLookup => "X",
            RuleCode::UnitCopy => "Z",
            RuleCode::TitleBranch => "G",
            RuleCode::ElevationBranch => "K",
            RuleCode::PrefixReference => "J",
            RuleCode::ValueMap => "M",
            RuleCode::LineLookup => "P",
            RuleCode::FamilyTypeTable => "N",
            RuleCode::ShadowCopy => "R",
            RuleCode::NamedCopy => "Y",
            RuleCode::SourceCondition => "L",
            RuleCode::FamilyPrefixConstant => "D",
            RuleCode::FamilyMembership => "E",
            RuleCode::FamilyPrefixChoice => "F",
            RuleCode::AssetLookup => "W",
            RuleCode::LevelDelta => "T",
            RuleCode::NotConfigured => "N/C",
        }
    }

    /// Deferred codes run in the second pass, after every other rule has been applied
    #[inline]
    pub fn is_deferred(&self) -> bool {
        matches!(self, RuleCode::SourceCondition)
    }
}

impl fmt::Display for RuleCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options of an elevation-sign branch
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ElevationChoice {
    /// `left;right`: left below zero, right otherwise, each falling back to the other
    Split { below: String, otherwise: String },
    /// `above;level;below`: positive, zero, negative (or unknown)
    ThreeWay {
        above: String,
        level: String,
        below: String,
    },
}

/// One `[alternatives](value)` entry of a family/type table
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TypeAlternative {
    /// Upper-cased type-name prefixes (empty when the bracket held only separators)
    pub prefixes: Vec<String>,
    /// Raw bracket text, upper-cased and trimmed, for the no-alternatives case
    pub raw: String,
    pub value: String,
}

/// Code-specific parameters, parsed once
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RuleKind {
    Constant {
        value: String,
    },
    DiameterLookup {
        sheet: String,
        column: usize,
    },
    UnitCopy {
        source: String,
    },
    TitleBranch {
        keys: Vec<String>,
        matched: String,
        otherwise: String,
    },
    ElevationBranch(ElevationChoice),
    PrefixReference {
        column: usize,
    },
    ValueMap {
        source: String,
        pairs: Vec<(String, String)>,
    },
    LineLookup {
        column: usize,
    },
    FamilyTypeTable {
        families: Vec<String>,
        alternatives: Vec<TypeAlternative>,
    },
    ShadowCopy,
    NamedCopy {
        source: String,
    },
    SourceCondition {
        source: String,
        branches: Vec<(String, String)>,
        default: Option<String>,
    },
    FamilyPrefixConstant {
        prefixes: Vec<String>,
        value: String,
    },
    FamilyMembership {
        families: Vec<String>,
    },
    FamilyPrefixChoice {
        prefixes: Vec<String>,
        matched: String,
        otherwise: String,
    },
    AssetLookup {
        sheet: String,
        column: usize,
        /// Target name up to the first `_`, upper-cased
        prefix: String,
    },
    LevelDelta,
    NotConfigured,
    /// Malformed description or unknown code: always skipped with `reason`
    Invalid {
        reason: String,
    },
}

/// A parsed mapping rule
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Rule {
    /// Attribute written by the rule
    pub target: String,
    /// Code cell text, trimmed and upper-cased
    pub code: String,
    /// Original description cell, kept for diagnostics
    pub raw_text: String,
    pub kind: RuleKind,
}

impl Rule {
    /// Parsed code, `None` for unknown codes
    pub fn rule_code(&self) -> Option<RuleCode> {
        RuleCode::from_str(&self.code)
    }

    #[inline]
    pub fn is_deferred(&self) -> bool {
        matches!(self.kind, RuleKind::SourceCondition { .. })
    }

    #[inline]
    pub fn is_invalid(&self) -> bool {
        matches!(self.kind, RuleKind::Invalid { .. })
    }
}

/// Ordered rules of one mapping sheet
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RuleSet {
    pub rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// First-pass rules, in table order
    pub fn immediate(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter().filter(|r| !r.is_deferred())
    }

    /// Second-pass rules, in table order
    pub fn deferred(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter().filter(|r| r.is_deferred())
    }

    pub fn has_deferred(&self) -> bool {
        self.rules.iter().any(Rule::is_deferred)
    }

    /// Every target named by the sheet
    pub fn targets(&self) -> BTreeSet<&str> {
        self.rules.iter().map(|r| r.target.as_str()).collect()
    }

    /// Sheets of the rules workbook read by diameter lookups
    pub fn diameter_sheets(&self) -> BTreeSet<&str> {
        self.rules
            .iter()
            .filter_map(|r| match &r.kind {
                RuleKind::DiameterLookup { sheet, .. } => Some(sheet.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Sheets of the asset workbook read by asset lookups
    pub fn asset_sheets(&self) -> BTreeSet<&str> {
        self.rules
            .iter()
            .filter_map(|r| match &r.kind {
                RuleKind::AssetLookup { sheet, .. } => Some(sheet.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn uses_reference_table(&self) -> bool {
        self.rules
            .iter()
            .any(|r| matches!(r.kind, RuleKind::PrefixReference { .. }))
    }

    pub fn uses_line_table(&self) -> bool {
        self.rules
            .iter()
            .any(|r| matches!(r.kind, RuleKind::LineLookup { .. }))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl FromIterator<Rule> for RuleSet {
    fn from_iter<I: IntoIterator<Item = Rule>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(target: &str, kind: RuleKind) -> Rule {
        Rule {
            target: target.into(),
            code: String::new(),
            raw_text: String::new(),
            kind,
        }
    }

    #[test]
    fn test_code_round_trip_and_deferral() {
        assert_eq!(RuleCode::from_str(" l "), Some(RuleCode::SourceCondition));
        assert_eq!(RuleCode::from_str("n/c"), Some(RuleCode::NotConfigured));
        assert_eq!(RuleCode::from_str("Q"), None);
        assert!(RuleCode::SourceCondition.is_deferred());
        assert!(!RuleCode::Constant.is_deferred());
        assert_eq!(RuleCode::AssetLookup.to_string(), "W");
    }

    #[test]
    fn test_rule_set_partitions() {
        let set: RuleSet = vec![
            rule("A", RuleKind::Constant { value: "1".into() }),
            rule(
                "B",
                RuleKind::SourceCondition {
                    source: "A".into(),
                    branches: vec![],
                    default: Some("x".into()),
                },
            ),
            rule("C", RuleKind::DiameterLookup { sheet: "DN".into(), column: 3 }),
        ]
        .into_iter()
        .collect();

        assert_eq!(set.immediate().count(), 2);
        assert_eq!(set.deferred().count(), 1);
        assert!(set.has_deferred());
        assert_eq!(set.diameter_sheets().into_iter().collect::<Vec<_>>(), vec!["DN"]);
        assert!(set.asset_sheets().is_empty());
    }
}
