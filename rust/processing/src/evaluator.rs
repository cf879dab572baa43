// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Rule evaluation
//!
//! [`RuleEvaluator::evaluate`] turns one rule and one element into an
//! [`Outcome`]. It never writes and never fails: a missing source, an
//! unmatched key or a malformed rule all become `Skipped` or `Warning`.
//! The only state it carries across calls is the lazily built
//! [`LookupIndex`].

use std::fmt;

use paramap_core::{
    column_index, feet_to_mm, first_number, format_length_mm, format_mm, format_number, normalize_line_value,
    normalize_literal, normalize_table_value, ElevationChoice, KeyNorm, LookupIndex, Rule, RuleKind,
    TypeAlternative, NOT_AVAILABLE,
};

use crate::context::EvaluationContext;
use crate::host::{
    Attribute, AttributeValue, ElementId, ElementSource, StorageKind, WriteValue, INSTANCE_ELEVATION_PARAM,
    INSTANCE_FREE_HOST_OFFSET_PARAM, RBS_OFFSET_PARAM, RBS_PIPE_DIAMETER_PARAM, RBS_PIPE_OUTER_DIAMETER,
};
use crate::profile::{MissingTargetPolicy, NotConfiguredPolicy, PrefixCase, PrefixSource};

/// Characters of the family/type name used as cross-reference key
pub const REFERENCE_PREFIX_LEN: usize = 5;
/// Characters of the family name matched by family/type tables
pub const FAMILY_KEY_LEN: usize = 5;
/// Characters of the type name matched by family/type tables
pub const TYPE_KEY_LEN: usize = 6;

/// Asset sheet with several rows per SAP code
const REPORT_SHEET: &str = "Report";

/// Why a rule did not apply to an element
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// Target missing or read-only (silent-skip profiles)
    MissingTarget,
    /// Shadow marker attribute not declared on the element or its type
    NoShadowMarker,
    /// `N/C` rule under the ignore policy
    NotConfigured,
    /// Malformed rule
    Invalid(String),
    /// The rule legitimately produced nothing
    NoValue(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingTarget => f.write_str("target not present or read-only"),
            SkipReason::NoShadowMarker => f.write_str("shadow parameter not defined"),
            SkipReason::NotConfigured => f.write_str("not configured"),
            SkipReason::Invalid(reason) => write!(f, "invalid rule: {}", reason),
            SkipReason::NoValue(reason) => write!(f, "no rule value: {}", reason),
        }
    }
}

/// Result of evaluating one rule against one element
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Applied(WriteValue),
    Skipped(SkipReason),
    Warning { target: String, message: String },
}

impl Outcome {
    fn text(value: impl Into<String>) -> Self {
        Outcome::Applied(WriteValue::Text(value.into()))
    }

    fn no_value(reason: impl Into<String>) -> Self {
        Outcome::Skipped(SkipReason::NoValue(reason.into()))
    }

    fn warning(rule: &Rule, message: impl Into<String>) -> Self {
        Outcome::Warning {
            target: rule.target.clone(),
            message: message.into(),
        }
    }

    #[inline]
    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied(_))
    }
}

/// First `n` characters
fn prefix(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((end, _)) => &s[..end],
        None => s,
    }
}

/// Length in millimeters from a real attribute, else the first number of its displayed text
fn millimeter_text(attribute: &Attribute) -> Option<String> {
    match attribute.value {
        AttributeValue::Real(feet) => Some(format_length_mm(feet)),
        _ => first_number(&attribute.display_text()).map(format_number),
    }
}

/// Value of a copied attribute, `None` when unset
fn copied_text(attribute: &Attribute) -> Option<String> {
    let text = attribute.as_text();
    (!text.is_empty()).then_some(text)
}

fn first_real<H: ElementSource + ?Sized>(host: &H, id: ElementId, params: &[&str]) -> Option<f64> {
    params
        .iter()
        .find_map(|param| host.builtin(id, param).and_then(|a| a.as_real()))
}

/// Nominal diameter used as numeric lookup key
fn diameter<H: ElementSource + ?Sized>(host: &H, id: ElementId) -> Option<i64> {
    [RBS_PIPE_DIAMETER_PARAM, RBS_PIPE_OUTER_DIAMETER]
        .iter()
        .filter_map(|param| host.builtin(id, param))
        .find_map(|a| first_number(&a.display_text()))
        .map(|n| n.round() as i64)
}

/// Absolute elevation: level plus offset, else the location point
fn element_elevation<H: ElementSource + ?Sized>(host: &H, id: ElementId) -> Option<f64> {
    let offset = first_real(
        host,
        id,
        &[INSTANCE_FREE_HOST_OFFSET_PARAM, RBS_OFFSET_PARAM, INSTANCE_ELEVATION_PARAM],
    );
    match (host.level_elevation(id), offset) {
        (Some(level), Some(offset)) => Some(level + offset),
        _ => host.location_z(id),
    }
}

fn choose_elevation(choice: &ElevationChoice, elevation: Option<f64>) -> &str {
    match choice {
        ElevationChoice::Split { below, otherwise } => {
            let (first, second) = match elevation {
                Some(e) if e < 0.0 => (below, otherwise),
                _ => (otherwise, below),
            };
            if first.is_empty() {
                second.as_str()
            } else {
                first.as_str()
            }
        }
        ElevationChoice::ThreeWay { above, level, below } => match elevation {
            Some(e) if e > 0.0 => above.as_str(),
            Some(e) if e == 0.0 => level.as_str(),
            _ => below.as_str(),
        },
    }
}

fn match_type_alternative<'t>(alternatives: &'t [TypeAlternative], type_key: &str) -> Option<&'t str> {
    alternatives
        .iter()
        .find(|alt| {
            if alt.prefixes.is_empty() {
                alt.raw == type_key
            } else {
                alt.prefixes.iter().any(|p| p == type_key)
            }
        })
        .map(|alt| alt.value.as_str())
}

/// Evaluates rules against elements for one run
pub struct RuleEvaluator<'a> {
    ctx: EvaluationContext<'a>,
    index: LookupIndex,
}

impl<'a> RuleEvaluator<'a> {
    pub fn new(ctx: EvaluationContext<'a>) -> Self {
        Self {
            ctx,
            index: LookupIndex::new(),
        }
    }

    pub fn context(&self) -> &EvaluationContext<'a> {
        &self.ctx
    }

    /// Lookup tables built so far
    pub fn index(&self) -> &LookupIndex {
        &self.index
    }

    /// Evaluate `rule` against element `id`
    pub fn evaluate<H: ElementSource + ?Sized>(&mut self, rule: &Rule, host: &H, id: ElementId) -> Outcome {
        let profile = self.ctx.profile;

        match &rule.kind {
            RuleKind::Invalid { reason } => return Outcome::Skipped(SkipReason::Invalid(reason.clone())),
            RuleKind::NotConfigured if profile.not_configured == NotConfiguredPolicy::Ignore => {
                return Outcome::Skipped(SkipReason::NotConfigured)
            }
            _ => {}
        }

        let target = match host.attribute(id, &rule.target) {
            Some(attribute) if attribute.is_writable() => attribute,
            _ => {
                return match profile.missing_target {
                    MissingTargetPolicy::Skip => Outcome::Skipped(SkipReason::MissingTarget),
                    MissingTargetPolicy::Warn => Outcome::warning(rule, "parameter not present on element"),
                }
            }
        };

        if profile.require_shadow_marker
            && host
                .attribute_or_type(id, &profile.shadow_name(&rule.target))
                .is_none()
        {
            return Outcome::Skipped(SkipReason::NoShadowMarker);
        }

        match &rule.kind {
            RuleKind::Constant { value } => Outcome::text(value.clone()),
            RuleKind::NotConfigured => Outcome::text(NOT_AVAILABLE),
            RuleKind::DiameterLookup { sheet, column } => self.diameter_lookup(rule, host, id, sheet, *column),
            RuleKind::UnitCopy { source } => match host.builtin(id, source).as_ref().and_then(millimeter_text) {
                Some(text) => Outcome::text(text),
                None => Outcome::no_value(format!("'{}' not available", source)),
            },
            RuleKind::TitleBranch {
                keys,
                matched,
                otherwise,
            } => {
                let segment = self.ctx.title.branch_segment();
                let chosen = if keys.iter().any(|k| k == segment) {
                    matched
                } else {
                    otherwise
                };
                Outcome::text(normalize_literal(chosen))
            }
            RuleKind::ElevationBranch(choice) => {
                let params: &[&str] = match choice {
                    ElevationChoice::ThreeWay { .. } => &[RBS_OFFSET_PARAM],
                    ElevationChoice::Split { .. } => &[INSTANCE_ELEVATION_PARAM, RBS_OFFSET_PARAM],
                };
                let elevation = first_real(host, id, params);
                match choose_elevation(choice, elevation) {
                    "" => Outcome::no_value("no option for this elevation"),
                    chosen => Outcome::text(normalize_literal(chosen)),
                }
            }
            RuleKind::PrefixReference { column } => self.prefix_reference(rule, host, id, *column),
            RuleKind::ValueMap { source, pairs } => {
                let Some(attribute) = host.attribute_or_type(id, source) else {
                    return Outcome::warning(rule, format!("source parameter '{}' not found", source));
                };
                let value = attribute.as_text();
                match pairs.iter().find(|(from, _)| *from == value) {
                    Some((_, to)) => Outcome::text(to.clone()),
                    None => Outcome::no_value(format!("no pair for '{}'", value)),
                }
            }
            RuleKind::LineLookup { column } => self.line_lookup(rule, *column),
            RuleKind::FamilyTypeTable {
                families,
                alternatives,
            } => {
                let family_name = host.family_name(id);
                let type_name = host.type_name(id);
                let family_key = prefix(&family_name, FAMILY_KEY_LEN).to_uppercase();
                let type_key = prefix(&type_name, TYPE_KEY_LEN).to_uppercase();

                let value = families
                    .iter()
                    .any(|k| k.trim().to_uppercase() == family_key)
                    .then(|| match_type_alternative(alternatives, &type_key))
                    .flatten()
                    .unwrap_or(NOT_AVAILABLE);
                Outcome::text(value)
            }
            RuleKind::ShadowCopy => {
                let shadow = profile.shadow_name(&rule.target);
                match host.attribute_or_type(id, &shadow).as_ref().and_then(copied_text) {
                    Some(text) => Outcome::text(text),
                    None => Outcome::no_value(format!("'{}' has no value", shadow)),
                }
            }
            RuleKind::NamedCopy { source } => {
                let Some(attribute) = host.attribute_or_type(id, source) else {
                    return Outcome::warning(rule, format!("source parameter '{}' not found", source));
                };
                if target.kind() != StorageKind::Text {
                    return Outcome::warning(rule, "target parameter is not a text parameter");
                }
                match millimeter_text(&attribute) {
                    Some(text) => Outcome::text(text),
                    None => Outcome::warning(rule, format!("cannot interpret the value of '{}'", source)),
                }
            }
            RuleKind::SourceCondition {
                source,
                branches,
                default,
            } => {
                let value = host
                    .attribute(id, source)
                    .map(|a| a.as_text().to_lowercase())
                    .unwrap_or_default();
                let chosen = branches
                    .iter()
                    .find(|(condition, _)| *condition == value)
                    .map(|(_, v)| v)
                    .or(default.as_ref());
                match chosen {
                    Some(v) if !v.trim().is_empty() => Outcome::text(v.clone()),
                    _ => Outcome::warning(rule, format!("condition \"{}\" not recognized", value)),
                }
            }
            RuleKind::FamilyPrefixConstant { prefixes, value } => {
                let family = host.family_name(id);
                if prefixes.iter().any(|p| family.starts_with(p.as_str())) {
                    Outcome::text(value.clone())
                } else {
                    Outcome::no_value("family prefix not listed")
                }
            }
            RuleKind::FamilyMembership { families } => {
                let family = host.family_name(id);
                Outcome::text(if families.contains(&family) { "SI" } else { "NO" })
            }
            RuleKind::FamilyPrefixChoice {
                prefixes,
                matched,
                otherwise,
            } => {
                let family = host.family_name(id);
                let chosen = if prefixes.iter().any(|p| family.starts_with(p.as_str())) {
                    matched
                } else {
                    otherwise
                };
                Outcome::text(chosen.clone())
            }
            RuleKind::AssetLookup {
                sheet,
                column,
                prefix: target_prefix,
            } => self.asset_lookup(rule, host, id, sheet, *column, target_prefix),
            RuleKind::LevelDelta => self.level_delta(rule, host, id, &target),
            RuleKind::Invalid { reason } => Outcome::Skipped(SkipReason::Invalid(reason.clone())),
        }
    }

    fn note_table(&self, source: &str, column: usize, norm: KeyNorm) {
        if !self.index.is_built(source, column, norm) {
            tracing::debug!(source, column, ?norm, "Building lookup table");
        }
    }

    fn diameter_lookup<H: ElementSource + ?Sized>(
        &mut self,
        rule: &Rule,
        host: &H,
        id: ElementId,
        sheet: &str,
        column: usize,
    ) -> Outcome {
        let sources = self.ctx.sources;
        let Some(grid) = sources.rules_sheet(sheet) else {
            return Outcome::warning(rule, format!("sheet '{}' not loaded", sheet));
        };
        let Some(dn) = diameter(host, id) else {
            return Outcome::warning(rule, "diameter not found");
        };

        let source = format!("rules/{}", sheet);
        self.note_table(&source, self.ctx.columns.diameter, KeyNorm::Numeric);
        match self
            .index
            .find_row(&source, grid, self.ctx.columns.diameter, KeyNorm::Numeric, &dn.to_string())
        {
            Some(row) => Outcome::text(normalize_table_value(&grid.cell(row, column).as_text())),
            None => Outcome::warning(rule, format!("DN {} not in {}", dn, sheet)),
        }
    }

    fn prefix_reference<H: ElementSource + ?Sized>(
        &mut self,
        rule: &Rule,
        host: &H,
        id: ElementId,
        column: usize,
    ) -> Outcome {
        let profile = self.ctx.profile;
        let sheet = profile.reference_sheet.as_str();
        let Some(grid) = self.ctx.sources.reference_sheet(sheet) else {
            return Outcome::warning(rule, format!("reference sheet '{}' not loaded", sheet));
        };

        let name = match profile.prefix_source {
            PrefixSource::FamilyName => host.family_name(id),
            PrefixSource::TypeName => host.type_name(id),
        };
        let key = prefix(&name, REFERENCE_PREFIX_LEN);
        if key.trim().is_empty() {
            return Outcome::warning(rule, "empty name, no reference key");
        }

        let norm = match profile.prefix_case {
            PrefixCase::Sensitive => KeyNorm::Text,
            PrefixCase::Insensitive => KeyNorm::TextUpper,
        };
        let source = format!("reference/{}", sheet);
        self.note_table(&source, 0, norm);
        match self.index.find_row(&source, grid, 0, norm, key) {
            Some(row) => Outcome::text(grid.text(row, column)),
            None => Outcome::warning(rule, format!("prefix '{}' not found in '{}'", key, sheet)),
        }
    }

    fn line_lookup(&mut self, rule: &Rule, column: usize) -> Outcome {
        let Some(grid) = self.ctx.sources.line_csv.as_ref() else {
            return Outcome::warning(rule, "line CSV not loaded");
        };
        let key = self.ctx.title.line_key();
        self.note_table("line", self.ctx.columns.line, KeyNorm::Text);
        // a later row for the same line overrides earlier ones
        let row = self
            .index
            .find_last_row("line", grid, self.ctx.columns.line, KeyNorm::Text, &key);
        match row {
            Some(row) => Outcome::text(normalize_line_value(&grid.cell(row, column).as_text())),
            None => Outcome::text(NOT_AVAILABLE),
        }
    }

    fn asset_lookup<H: ElementSource + ?Sized>(
        &mut self,
        rule: &Rule,
        host: &H,
        id: ElementId,
        sheet: &str,
        column: usize,
        target_prefix: &str,
    ) -> Outcome {
        let profile = self.ctx.profile;
        let code_attribute = profile.required_attribute.as_deref().unwrap_or("NP259_codice_sap");
        let code = host
            .attribute(id, code_attribute)
            .map(|a| a.as_text())
            .unwrap_or_default();
        if code.is_empty() {
            return Outcome::warning(rule, format!("{} missing", code_attribute));
        }

        let Some(grid) = self.ctx.sources.asset_sheet(sheet) else {
            return Outcome::warning(rule, format!("asset sheet '{}' not loaded", sheet));
        };
        let source = format!("assets/{}", sheet);
        let key_column = self.ctx.columns.asset(sheet);
        self.note_table(&source, key_column, KeyNorm::Text);
        let rows = self.index.find_rows(&source, grid, key_column, KeyNorm::Text, &code);
        if rows.is_empty() {
            return Outcome::warning(rule, format!("SAP code {} not in {}", code, sheet));
        }

        let (ee, dz, ea, eg) = (
            column_index("EE"),
            column_index("DZ"),
            column_index("EA"),
            column_index("EG"),
        );
        if sheet != REPORT_SHEET || Some(column) != ee {
            return Outcome::text(grid.text(rows[0], column));
        }

        // Report/EE: one row per parameter prefix, keyed by DZ (or EA when DZ is blank)
        let (Some(dz), Some(ea), Some(eg)) = (dz, ea, eg) else {
            return Outcome::warning(rule, "invalid report columns");
        };
        let (match_column, value_column) = if rows.iter().any(|&r| !grid.cell(r, dz).is_blank()) {
            (dz, column)
        } else {
            (ea, eg)
        };
        let matched = rows.iter().copied().find(|&r| {
            grid.cell(r, match_column)
                .as_text()
                .to_uppercase()
                .starts_with(target_prefix)
        });
        match matched {
            Some(row) => Outcome::text(grid.text(row, value_column)),
            None => Outcome::warning(
                rule,
                format!("no {} row for {} with SAP code {}", sheet, target_prefix, code),
            ),
        }
    }

    fn level_delta<H: ElementSource + ?Sized>(
        &self,
        rule: &Rule,
        host: &H,
        id: ElementId,
        target: &Attribute,
    ) -> Outcome {
        let Some(reference) = self.ctx.reference_level else {
            return Outcome::warning(rule, "no reference level matched to the project base point");
        };
        let Some(elevation) = element_elevation(host, id) else {
            return Outcome::warning(rule, "element elevation not available");
        };

        let delta = elevation - reference;
        if target.kind() == StorageKind::Real {
            Outcome::Applied(WriteValue::Real(delta))
        } else {
            Outcome::text(format_mm(feet_to_mm(delta)))
        }
    }
}
