// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Mapping profiles.
//!
//! The deployments this engine serves disagree on a handful of policies
//! (what a missing target means, what `N/C` does, which elements qualify).
//! A [`MappingProfile`] pins each of them down for one kind of run.

use std::collections::BTreeMap;

use paramap_core::{parse_column, Result};
use serde::{Deserialize, Serialize};

use crate::common::COMMON_SHEET;

/// What happens when a rule's target is missing or read-only on an element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingTargetPolicy {
    /// Silent skip; the name is listed once in the report
    #[default]
    Skip,
    /// One warning per element
    Warn,
}

/// What the `N/C` code does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotConfiguredPolicy {
    /// Write the literal text `N/C`
    #[default]
    WriteLiteral,
    /// Treat the rule as a no-op
    Ignore,
}

/// Which name provides the five-character key of prefix cross-references
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrefixSource {
    #[default]
    FamilyName,
    TypeName,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrefixCase {
    Sensitive,
    #[default]
    Insensitive,
}

/// Layout of the rules sheet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleLayout {
    /// Target, code and description per row
    #[default]
    MappingSheet,
    /// Name and literal or asset list column per row
    CommonParameters,
}

/// Policies and source conventions of one kind of mapping run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingProfile {
    pub name: String,
    /// Host categories whose instances are mapped
    pub categories: Vec<String>,
    /// Sheet of the rules workbook holding this profile's rules
    pub rules_sheet: String,
    pub rule_layout: RuleLayout,
    pub missing_target: MissingTargetPolicy,
    pub not_configured: NotConfiguredPolicy,
    /// Only map a target when `<shadow_prefix><target>` exists on the instance or its type
    pub require_shadow_marker: bool,
    pub shadow_prefix: String,
    /// Elements whose family does not start with this are ignored
    pub family_prefix: Option<String>,
    /// Elements without a value for this attribute get one warning and no rules
    pub required_attribute: Option<String>,
    /// Warn about shadow attributes that no rule maps
    pub audit_shadow_attributes: bool,
    /// Shadow attribute names (without prefix) the audit never reports
    pub audit_exclusions: Vec<String>,
    pub prefix_source: PrefixSource,
    pub prefix_case: PrefixCase,
    /// Sheet of the reference workbook read by prefix cross-references
    pub reference_sheet: String,
    /// Key column (letters) of diameter lookup sheets
    pub diameter_key_column: String,
    /// Key column (letters) of the line CSV
    pub line_key_column: String,
    /// Key column (letters) per asset workbook sheet
    pub asset_key_columns: BTreeMap<String, String>,
    pub default_asset_key_column: String,
    /// Keep skip diagnostics in the report
    pub verbose: bool,
}

impl Default for MappingProfile {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            categories: Vec::new(),
            rules_sheet: "BARRE (CATEGORIA TUBAZIONI)".to_string(),
            rule_layout: RuleLayout::MappingSheet,
            missing_target: MissingTargetPolicy::Skip,
            not_configured: NotConfiguredPolicy::WriteLiteral,
            require_shadow_marker: false,
            shadow_prefix: "tf_".to_string(),
            family_prefix: None,
            required_attribute: None,
            audit_shadow_attributes: false,
            audit_exclusions: Vec::new(),
            prefix_source: PrefixSource::FamilyName,
            prefix_case: PrefixCase::Insensitive,
            reference_sheet: "Elenco AP".to_string(),
            diameter_key_column: "B".to_string(),
            line_key_column: "G".to_string(),
            asset_key_columns: BTreeMap::from([
                ("Report".to_string(), "B".to_string()),
                ("Consistenza Impiantistica".to_string(), "N".to_string()),
            ]),
            default_asset_key_column: "B".to_string(),
            verbose: false,
        }
    }
}

impl MappingProfile {
    /// Pipe runs: silent skips, `N/C` written literally
    pub fn pipes() -> Self {
        Self {
            name: "pipes".to_string(),
            categories: vec!["Pipes".to_string()],
            ..Self::default()
        }
    }

    /// Accessory runs: `AP` families with a SAP code, shadow markers required,
    /// missing targets warned per element
    pub fn accessories() -> Self {
        Self {
            name: "accessories".to_string(),
            categories: vec!["Pipe Accessories".to_string(), "Pipe Fittings".to_string()],
            rules_sheet: "AP (Accessori per tubazioni)".to_string(),
            missing_target: MissingTargetPolicy::Warn,
            not_configured: NotConfiguredPolicy::Ignore,
            require_shadow_marker: true,
            family_prefix: Some("AP".to_string()),
            required_attribute: Some("NP259_codice_sap".to_string()),
            audit_shadow_attributes: true,
            audit_exclusions: vec![
                "Long Name".to_string(),
                "IfcObjectType".to_string(),
                "IFC Name".to_string(),
            ],
            ..Self::default()
        }
    }

    /// Project-wide common parameters over pipes, fittings and accessories
    pub fn common() -> Self {
        Self {
            name: "common".to_string(),
            categories: vec![
                "Pipes".to_string(),
                "Pipe Fittings".to_string(),
                "Pipe Accessories".to_string(),
            ],
            rules_sheet: COMMON_SHEET.to_string(),
            rule_layout: RuleLayout::CommonParameters,
            ..Self::default()
        }
    }

    /// Preset by name
    pub fn named(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "pipes" => Some(Self::pipes()),
            "accessories" => Some(Self::accessories()),
            "common" => Some(Self::common()),
            _ => None,
        }
    }

    /// Shadow attribute name of a target
    pub fn shadow_name(&self, target: &str) -> String {
        format!("{}{}", self.shadow_prefix, target)
    }

    /// Resolve every configured column label
    pub fn key_columns(&self) -> Result<KeyColumns> {
        let assets = self
            .asset_key_columns
            .iter()
            .map(|(sheet, letters)| Ok((sheet.clone(), parse_column(letters)?)))
            .collect::<Result<BTreeMap<_, _>>>()?;

        Ok(KeyColumns {
            diameter: parse_column(&self.diameter_key_column)?,
            line: parse_column(&self.line_key_column)?,
            assets,
            asset_default: parse_column(&self.default_asset_key_column)?,
        })
    }
}

/// Key column indexes resolved from a profile
#[derive(Debug, Clone, PartialEq)]
pub struct KeyColumns {
    pub diameter: usize,
    pub line: usize,
    assets: BTreeMap<String, usize>,
    asset_default: usize,
}

impl KeyColumns {
    /// Key column of an asset workbook sheet
    pub fn asset(&self, sheet: &str) -> usize {
        self.assets.get(sheet).copied().unwrap_or(self.asset_default)
    }
}
