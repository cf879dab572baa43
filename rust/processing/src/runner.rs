// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Two-phase mapping run
//!
//! Phase 1 applies every immediate rule to every element inside one batch.
//! Phase 2 applies the deferred rules inside a second batch, opened only
//! after the first one is committed, so deferred rules read phase 1 output.
//! A write the host rejects is retried once through the text path and then
//! reported; any other host failure rolls the open batch back and ends the
//! run.

use rustc_hash::FxHashSet;

use paramap_core::{Rule, RuleSet};

use crate::context::EvaluationContext;
use crate::error::{HostError, RunError};
use crate::evaluator::{Outcome, RuleEvaluator, SkipReason};
use crate::host::{ElementId, ElementSource, StorageKind, WriteValue};
use crate::profile::MappingProfile;
use crate::report::{RunPhase, RunReport, RunWarning, SkipNote};

/// Batch name of the first phase
pub const PHASE1_BATCH: &str = "Parameter mapping (phase 1)";
/// Batch name of the deferred-rule phase
pub const PHASE2_BATCH: &str = "Parameter mapping (phase 2)";

/// Runs a rule set over the elements of a host document
pub struct MappingRunner<'a> {
    evaluator: RuleEvaluator<'a>,
    profile: &'a MappingProfile,
    phase: RunPhase,
    /// Targets handled elsewhere (common parameters), exempt from the shadow audit
    known_targets: FxHashSet<String>,
}

impl<'a> MappingRunner<'a> {
    pub fn new(ctx: EvaluationContext<'a>) -> Self {
        let profile = ctx.profile;
        Self {
            evaluator: RuleEvaluator::new(ctx),
            profile,
            phase: RunPhase::NotStarted,
            known_targets: FxHashSet::default(),
        }
    }

    /// Exempt `names` from the shadow attribute audit
    pub fn with_known_targets<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.known_targets.extend(names.into_iter().map(Into::into));
        self
    }

    #[inline]
    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Map every element of the profile's categories
    pub fn run<H: ElementSource + ?Sized>(&mut self, rules: &RuleSet, host: &mut H) -> Result<RunReport, RunError> {
        let elements = host.query_elements(&self.profile.categories);
        self.run_elements(rules, &elements, host)
    }

    /// Map the given elements
    pub fn run_elements<H: ElementSource + ?Sized>(
        &mut self,
        rules: &RuleSet,
        elements: &[ElementId],
        host: &mut H,
    ) -> Result<RunReport, RunError> {
        let mut report = RunReport::new(self.profile.name.clone());
        let selected = self.select_elements(rules, elements, &*host, &mut report);
        report.elements = selected.len();

        tracing::info!(
            profile = %self.profile.name,
            rules = rules.len(),
            elements = selected.len(),
            "Starting mapping run"
        );

        self.phase = RunPhase::Phase1Running;
        report.phase = self.phase;
        let immediate: Vec<&Rule> = rules.immediate().collect();
        self.run_batch(PHASE1_BATCH, &immediate, &selected, host, &mut report)?;
        self.phase = RunPhase::Phase1Done;
        tracing::info!(writes = report.writes, warnings = report.warnings.len(), "Phase 1 committed");

        if rules.has_deferred() {
            self.phase = RunPhase::Phase2Running;
            report.phase = self.phase;
            let deferred: Vec<&Rule> = rules.deferred().collect();
            self.run_batch(PHASE2_BATCH, &deferred, &selected, host, &mut report)?;
            tracing::info!(rules = deferred.len(), "Phase 2 committed");
        }

        self.phase = RunPhase::Done;
        report.phase = self.phase;
        tracing::info!(
            writes = report.writes,
            targets = report.updated_targets.len(),
            warnings = report.warnings.len(),
            "Mapping run complete"
        );
        Ok(report)
    }

    /// Apply the profile's element filters and the shadow attribute audit
    fn select_elements<H: ElementSource + ?Sized>(
        &self,
        rules: &RuleSet,
        elements: &[ElementId],
        host: &H,
        report: &mut RunReport,
    ) -> Vec<ElementId> {
        let profile = self.profile;
        let targets = rules.targets();
        let mut selected = Vec::with_capacity(elements.len());

        for &id in elements {
            let family = host.family_name(id);
            if let Some(required) = &profile.family_prefix {
                if !family.starts_with(required.as_str()) {
                    continue;
                }
            }

            if profile.audit_shadow_attributes {
                for name in host.attribute_names(id) {
                    let Some(base) = name.strip_prefix(profile.shadow_prefix.as_str()) else {
                        continue;
                    };
                    if targets.contains(base)
                        || self.known_targets.contains(base)
                        || profile.audit_exclusions.iter().any(|e| e == base)
                    {
                        continue;
                    }
                    push_warning(
                        &mut report.warnings,
                        host,
                        id,
                        None,
                        format!("'{}' parameter not present in mapping rules", name),
                    );
                }
            }

            if let Some(attribute) = &profile.required_attribute {
                let present = host
                    .attribute(id, attribute)
                    .map(|a| !a.as_text().is_empty())
                    .unwrap_or(false);
                if !present {
                    push_warning(&mut report.warnings, host, id, None, format!("{} missing", attribute));
                    continue;
                }
            }

            selected.push(id);
        }
        selected
    }

    fn run_batch<H: ElementSource + ?Sized>(
        &mut self,
        batch: &str,
        rules: &[&Rule],
        elements: &[ElementId],
        host: &mut H,
        report: &mut RunReport,
    ) -> Result<(), RunError> {
        host.begin_batch(batch)?;
        tracing::debug!(batch, rules = rules.len(), "Opened batch");

        for &id in elements {
            for rule in rules {
                if let Err(source) = self.apply(rule, id, host, report) {
                    tracing::error!(batch, element = %id, target = %rule.target, error = %source, "Rolling back batch");
                    host.rollback_batch();
                    return Err(RunError::BatchAborted {
                        batch: batch.to_string(),
                        source,
                    });
                }
            }
        }

        if let Err(error) = host.commit_batch() {
            host.rollback_batch();
            return Err(error.into());
        }
        Ok(())
    }

    /// Evaluate one rule and record its outcome; only unexpected host failures are errors
    fn apply<H: ElementSource + ?Sized>(
        &mut self,
        rule: &Rule,
        id: ElementId,
        host: &mut H,
        report: &mut RunReport,
    ) -> Result<(), HostError> {
        match self.evaluator.evaluate(rule, &*host, id) {
            Outcome::Applied(value) => self.write(rule, id, &value, host, report)?,
            Outcome::Skipped(reason) => {
                if reason == SkipReason::MissingTarget {
                    report.missing_targets.insert(rule.target.clone());
                }
                if self.profile.verbose {
                    report.skipped.push(SkipNote {
                        element: id,
                        target: rule.target.clone(),
                        reason: reason.to_string(),
                    });
                }
            }
            Outcome::Warning { target, message } => {
                push_warning(&mut report.warnings, &*host, id, Some(target), message);
            }
        }
        Ok(())
    }

    /// Typed write, retried once as text when the host rejects it
    fn write<H: ElementSource + ?Sized>(
        &self,
        rule: &Rule,
        id: ElementId,
        value: &WriteValue,
        host: &mut H,
        report: &mut RunReport,
    ) -> Result<(), HostError> {
        let target = rule.target.as_str();
        let rejected = match host.set_attribute(id, target, value) {
            Ok(()) => {
                tracing::debug!(element = %id, code = %rule.code, target, value = %value, "Set");
                report.record_write(target);
                return Ok(());
            }
            Err(HostError::Rejected(reason)) => reason,
            Err(unexpected) => return Err(unexpected),
        };

        let text_writable = host
            .attribute(id, target)
            .map(|a| a.kind() != StorageKind::Reference)
            .unwrap_or(false);
        if text_writable {
            match host.set_attribute_text(id, target, &value.as_text()) {
                Ok(()) => {
                    tracing::debug!(element = %id, code = %rule.code, target, value = %value, "Set as text");
                    report.record_write(target);
                    return Ok(());
                }
                Err(HostError::Rejected(reason)) => {
                    tracing::debug!(element = %id, target, first = %rejected, second = %reason, "Text write rejected");
                }
                Err(unexpected) => return Err(unexpected),
            }
        }

        push_warning(
            &mut report.warnings,
            &*host,
            id,
            Some(target.to_string()),
            format!("set failed (val={})", value),
        );
        Ok(())
    }
}

pub(crate) fn push_warning<H: ElementSource + ?Sized>(
    warnings: &mut Vec<RunWarning>,
    host: &H,
    id: ElementId,
    target: Option<String>,
    message: String,
) {
    let label = host.element_label(id);
    tracing::warn!(element = %label, target = ?target, %message, "Mapping warning");
    warnings.push(RunWarning {
        element: id,
        family: host.family_name(id),
        label,
        target,
        message,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Attribute;
    use crate::memory::{MemoryDocument, MemoryElement};
    use crate::sources::SourceSet;
    use paramap_core::{parse_rule_sheet, CellGrid};

    fn rules(rows: Vec<Vec<&str>>) -> RuleSet {
        let mut all = vec![vec!["#", "Parametro", "Codice", "Descrizione"]];
        all.extend(rows);
        parse_rule_sheet(&CellGrid::from_text_rows(all))
    }

    fn run(doc: &mut MemoryDocument, rules: &RuleSet, profile: &MappingProfile) -> Result<RunReport, RunError> {
        let sources = SourceSet::default();
        let ctx = EvaluationContext::from_host(&*doc, &sources, profile).unwrap();
        MappingRunner::new(ctx).run(rules, doc)
    }

    #[test]
    fn test_single_batch_without_deferred_rules() {
        let mut doc = MemoryDocument::new("T").with_element(
            MemoryElement::new(1, "Pipes").with_attribute("NP100", Attribute::text("")),
        );
        let report = run(&mut doc, &rules(vec![vec!["1", "NP100", "C", "Steel"]]), &MappingProfile::pipes()).unwrap();

        assert_eq!(report.writes, 1);
        assert_eq!(report.phase, RunPhase::Done);
        assert_eq!(doc.committed_batches(), &[PHASE1_BATCH.to_string()]);
    }

    #[test]
    fn test_rejected_write_retries_as_text() {
        let mut doc = MemoryDocument::new("T").with_element(
            MemoryElement::new(1, "Pipes").with_attribute("NP101", Attribute::real(0.0)),
        );
        let report = run(&mut doc, &rules(vec![vec!["1", "NP101", "C", "12.5"]]), &MappingProfile::pipes()).unwrap();
        assert_eq!(report.writes, 1);
        assert_eq!(doc.value_of(ElementId(1), "NP101").as_deref(), Some("12.5"));
    }

    #[test]
    fn test_double_rejection_is_a_warning() {
        let mut doc = MemoryDocument::new("T").with_element(
            MemoryElement::new(1, "Pipes")
                .with_family("Tubo", "Acciaio")
                .with_attribute("NP101", Attribute::real(0.0)),
        );
        let report = run(&mut doc, &rules(vec![vec!["1", "NP101", "C", "Steel"]]), &MappingProfile::pipes()).unwrap();
        assert_eq!(report.writes, 0);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].label, "Tubo [Acciaio][ID:1]");
        assert_eq!(report.warnings[0].message, "set failed (val=Steel)");
    }

    #[test]
    fn test_unexpected_failure_rolls_back() {
        let mut doc = MemoryDocument::new("T")
            .with_element(MemoryElement::new(1, "Pipes").with_attribute("NP100", Attribute::text("old")))
            .with_element(MemoryElement::new(2, "Pipes").with_attribute("NP100", Attribute::text("old")));
        doc.fail_typed_write(ElementId(2), "NP100", HostError::Unexpected("document locked".into()));

        let err = run(&mut doc, &rules(vec![vec!["1", "NP100", "C", "new"]]), &MappingProfile::pipes()).unwrap_err();
        assert!(matches!(err, RunError::BatchAborted { ref batch, .. } if batch == PHASE1_BATCH));
        assert_eq!(doc.value_of(ElementId(1), "NP100").as_deref(), Some("old"));
        assert!(doc.committed_batches().is_empty());
        assert!(!doc.has_open_batch());
    }

    #[test]
    fn test_missing_targets_listed_once() {
        let mut doc = MemoryDocument::new("T")
            .with_element(MemoryElement::new(1, "Pipes"))
            .with_element(MemoryElement::new(2, "Pipes"));
        let report = run(&mut doc, &rules(vec![vec!["1", "NP999", "C", "x"]]), &MappingProfile::pipes()).unwrap();
        assert_eq!(report.missing_targets.len(), 1);
        assert!(report.warnings.is_empty());
        assert!(report.skipped.is_empty());
    }

    #[test]
    fn test_verbose_keeps_skip_notes() {
        let mut doc = MemoryDocument::new("T").with_element(MemoryElement::new(1, "Pipes"));
        let profile = MappingProfile {
            verbose: true,
            ..MappingProfile::pipes()
        };
        let report = run(&mut doc, &rules(vec![vec!["1", "NP999", "C", "x"]]), &profile).unwrap();
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].reason, "target not present or read-only");
    }

    #[test]
    fn test_element_filters_and_audit() {
        let mut doc = MemoryDocument::new("T")
            .with_element(
                MemoryElement::new(1, "Pipe Accessories")
                    .with_family("AP012_Valvola", "VALV01")
                    .with_attribute("NP259_codice_sap", Attribute::text("1000"))
                    .with_attribute("NP100", Attribute::text(""))
                    .with_attribute("tf_NP100", Attribute::text(""))
                    .with_attribute("tf_NP300", Attribute::text(""))
                    .with_attribute("tf_IFC Name", Attribute::text(""))
                    .with_attribute("tf_NP400", Attribute::text("")),
            )
            .with_element(
                MemoryElement::new(2, "Pipe Accessories")
                    .with_family("AP013_Filtro", "F1")
                    .with_attribute("NP100", Attribute::text("")),
            )
            .with_element(
                MemoryElement::new(3, "Pipe Fittings")
                    .with_family("Curva", "C90")
                    .with_attribute("NP100", Attribute::text("")),
            );

        let profile = MappingProfile::accessories();
        let sources = SourceSet::default();
        let ctx = EvaluationContext::from_host(&doc, &sources, &profile).unwrap();
        let rule_set = rules(vec![vec!["1", "NP100", "C", "x"], vec!["2", "NP200", "C", "y"]]);
        let report = MappingRunner::new(ctx)
            .with_known_targets(["NP400"])
            .run(&rule_set, &mut doc)
            .unwrap();

        assert_eq!(report.elements, 1);
        assert_eq!(report.writes, 1);
        let messages: Vec<&str> = report.warnings.iter().map(|w| w.message.as_str()).collect();
        assert!(messages.contains(&"'tf_NP300' parameter not present in mapping rules"));
        assert!(messages.contains(&"NP259_codice_sap missing"));
        assert!(messages.contains(&"parameter not present on element"));
        assert!(!messages.iter().any(|m| m.contains("IFC Name") || m.contains("NP400")));
        assert_eq!(doc.value_of(ElementId(2), "NP100").as_deref(), Some(""));
        assert_eq!(doc.value_of(ElementId(3), "NP100").as_deref(), Some(""));
    }
}
