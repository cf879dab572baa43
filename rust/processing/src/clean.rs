// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Clearing of mapped parameters
//!
//! Empties every writable text parameter whose name starts with one of the
//! mapped prefixes, on instances and on their types, inside one batch.
//! Values the host refuses are left alone; an unexpected host failure rolls
//! the whole batch back.

use std::fmt;

use serde::Serialize;

use crate::error::{HostError, RunError};
use crate::host::{Attribute, AttributeValue, ElementId, ElementSource, WriteValue};

/// Batch name used by [`clear_prefixed_parameters`]
pub const CLEAN_BATCH: &str = "Clear prefixed parameters";

/// Parameter prefixes owned by the mapping tools (case-sensitive)
pub const MAPPED_PREFIXES: [&str; 4] = ["CA", "NP", "LC", "VAR"];

/// One parameter that was emptied
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClearedParameter {
    pub element: ElementId,
    pub name: String,
    /// Cleared on the element's type rather than the instance
    pub on_type: bool,
}

/// Outcome of a clean run
#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanReport {
    pub cleared: Vec<ClearedParameter>,
}

impl CleanReport {
    #[inline]
    pub fn count(&self) -> usize {
        self.cleared.len()
    }
}

impl fmt::Display for CleanReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Parameters cleared: {}", self.count())
    }
}

fn has_mapped_prefix(name: &str, prefixes: &[&str]) -> bool {
    prefixes.iter().any(|p| name.starts_with(p))
}

/// Writable text attribute holding something other than whitespace
fn has_content(attribute: &Attribute) -> bool {
    attribute.is_writable() && matches!(&attribute.value, AttributeValue::Text(s) if !s.trim().is_empty())
}

/// Clear the [`MAPPED_PREFIXES`] parameters of every element
pub fn clear_prefixed_parameters<H: ElementSource + ?Sized>(host: &mut H) -> Result<CleanReport, RunError> {
    clear_parameters(host, &MAPPED_PREFIXES)
}

/// Clear every non-empty writable text parameter starting with one of `prefixes`
pub fn clear_parameters<H: ElementSource + ?Sized>(host: &mut H, prefixes: &[&str]) -> Result<CleanReport, RunError> {
    let elements = host.query_elements(&[]);
    tracing::info!(elements = elements.len(), ?prefixes, "Clearing prefixed parameters");

    let mut report = CleanReport::default();
    host.begin_batch(CLEAN_BATCH)?;
    for &id in &elements {
        for on_type in [false, true] {
            if let Err(source) = clear_element(host, id, on_type, prefixes, &mut report) {
                tracing::error!(element = %id, error = %source, "Rolling back batch");
                host.rollback_batch();
                return Err(RunError::BatchAborted {
                    batch: CLEAN_BATCH.to_string(),
                    source,
                });
            }
        }
    }

    if let Err(error) = host.commit_batch() {
        host.rollback_batch();
        return Err(error.into());
    }
    tracing::info!(cleared = report.count(), "Cleared prefixed parameters");
    Ok(report)
}

fn clear_element<H: ElementSource + ?Sized>(
    host: &mut H,
    id: ElementId,
    on_type: bool,
    prefixes: &[&str],
    report: &mut CleanReport,
) -> Result<(), HostError> {
    let names = if on_type {
        host.type_attribute_names(id)
    } else {
        host.attribute_names(id)
    };

    for name in names {
        let trimmed = name.trim();
        if !has_mapped_prefix(trimmed, prefixes) {
            continue;
        }
        let attribute = if on_type {
            host.type_attribute(id, &name)
        } else {
            host.attribute(id, &name)
        };
        if !attribute.as_ref().is_some_and(has_content) {
            continue;
        }

        let empty = WriteValue::text("");
        let written = if on_type {
            host.set_type_attribute(id, &name, &empty)
        } else {
            host.set_attribute(id, &name, &empty)
        };
        match written {
            Ok(()) => report.cleared.push(ClearedParameter {
                element: id,
                name: trimmed.to_string(),
                on_type,
            }),
            Err(HostError::Rejected(reason)) => {
                tracing::debug!(element = %id, param = %name, %reason, "Parameter not cleared");
            }
            Err(error) => return Err(error),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryDocument, MemoryElement};

    fn document() -> MemoryDocument {
        MemoryDocument::new("SNAM-X")
            .with_element(
                MemoryElement::new(1, "Pipes")
                    .with_attribute("NP100_materiale", Attribute::text("Acciaio"))
                    .with_attribute("CA001", Attribute::text("  "))
                    .with_attribute("LC010", Attribute::text("B01").read_only())
                    .with_attribute("VAR_1", Attribute::text("x"))
                    .with_attribute("np200", Attribute::text("x"))
                    .with_attribute("NP300_quota", Attribute::real(2.5))
                    .with_attribute("Commenti", Attribute::text("keep"))
                    .with_type_attribute("NP101_tipo", Attribute::text("Saldato")),
            )
            .with_element(MemoryElement::new(2, "Generic Models").with_attribute("CA002", Attribute::text("y")))
    }

    #[test]
    fn test_clears_prefixed_text_on_instances_and_types() {
        let mut doc = document();
        let report = clear_prefixed_parameters(&mut doc).unwrap();

        assert_eq!(report.count(), 4);
        assert!(report.cleared.contains(&ClearedParameter {
            element: ElementId(1),
            name: "NP101_tipo".into(),
            on_type: true,
        }));
        assert_eq!(doc.value_of(ElementId(1), "NP100_materiale").as_deref(), Some(""));
        assert_eq!(doc.value_of(ElementId(1), "VAR_1").as_deref(), Some(""));
        assert_eq!(doc.value_of(ElementId(2), "CA002").as_deref(), Some(""));
        assert_eq!(
            doc.type_attribute(ElementId(1), "NP101_tipo").map(|a| a.as_text()).as_deref(),
            Some("")
        );

        // read-only, lowercase prefix, non-text and unprefixed values survive
        assert_eq!(doc.value_of(ElementId(1), "LC010").as_deref(), Some("B01"));
        assert_eq!(doc.value_of(ElementId(1), "np200").as_deref(), Some("x"));
        assert_eq!(doc.value_of(ElementId(1), "NP300_quota").as_deref(), Some("2.5"));
        assert_eq!(doc.value_of(ElementId(1), "Commenti").as_deref(), Some("keep"));
        assert_eq!(doc.committed_batches(), &[CLEAN_BATCH.to_string()]);
        assert_eq!(report.to_string(), "Parameters cleared: 4\n");
    }

    #[test]
    fn test_rejected_write_is_skipped() {
        let mut doc = document();
        doc.fail_typed_write(ElementId(1), "VAR_1", HostError::Rejected("locked".into()));
        let report = clear_prefixed_parameters(&mut doc).unwrap();

        assert_eq!(report.count(), 3);
        assert_eq!(doc.value_of(ElementId(1), "VAR_1").as_deref(), Some("x"));
    }

    #[test]
    fn test_unexpected_failure_rolls_back() {
        let mut doc = document();
        doc.fail_typed_write(ElementId(2), "CA002", HostError::Unexpected("model closed".into()));
        let err = clear_prefixed_parameters(&mut doc).unwrap_err();

        assert!(matches!(err, RunError::BatchAborted { ref batch, .. } if batch == CLEAN_BATCH));
        assert_eq!(doc.value_of(ElementId(1), "NP100_materiale").as_deref(), Some("Acciaio"));
        assert!(doc.committed_batches().is_empty());
        assert!(!doc.has_open_batch());
    }

    #[test]
    fn test_custom_prefixes() {
        let mut doc = document();
        let report = clear_parameters(&mut doc, &["Comm"]).unwrap();
        assert_eq!(report.count(), 1);
        assert_eq!(doc.value_of(ElementId(1), "Commenti").as_deref(), Some(""));
        assert_eq!(doc.value_of(ElementId(1), "NP100_materiale").as_deref(), Some("Acciaio"));
    }
}
