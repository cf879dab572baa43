// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-memory host document
//!
//! A serializable snapshot of the elements a mapping run touches. Batches
//! are implemented by cloning the element list on `begin_batch` and restoring
//! it on rollback. Write failures can be injected per attribute to exercise
//! the retry and rollback paths.

use std::collections::BTreeMap;
use std::path::Path;

use paramap_core::parse_number;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{HostError, Result};
use crate::host::{Attribute, AttributeValue, ElementId, ElementSource, WriteValue};

/// A named level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryLevel {
    pub name: String,
    /// Internal units
    pub elevation: f64,
}

/// One element instance with its type attributes inlined
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryElement {
    pub id: ElementId,
    pub category: String,
    #[serde(default)]
    pub family: String,
    #[serde(default, rename = "type")]
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_z: Option<f64>,
    #[serde(default)]
    pub attributes: BTreeMap<String, Attribute>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub type_attributes: BTreeMap<String, Attribute>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub builtins: BTreeMap<String, Attribute>,
}

impl MemoryElement {
    pub fn new(id: i64, category: impl Into<String>) -> Self {
        Self {
            id: ElementId(id),
            category: category.into(),
            family: String::new(),
            type_name: String::new(),
            level: None,
            location_z: None,
            attributes: BTreeMap::new(),
            type_attributes: BTreeMap::new(),
            builtins: BTreeMap::new(),
        }
    }

    pub fn with_family(mut self, family: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.family = family.into();
        self.type_name = type_name.into();
        self
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = Some(level.into());
        self
    }

    pub fn with_location_z(mut self, z: f64) -> Self {
        self.location_z = Some(z);
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, attribute: Attribute) -> Self {
        self.attributes.insert(name.into(), attribute);
        self
    }

    pub fn with_type_attribute(mut self, name: impl Into<String>, attribute: Attribute) -> Self {
        self.type_attributes.insert(name.into(), attribute);
        self
    }

    pub fn with_builtin(mut self, param: impl Into<String>, attribute: Attribute) -> Self {
        self.builtins.insert(param.into(), attribute);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum WritePath {
    Typed,
    Text,
}

/// Which attribute map of an element a write goes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Instance,
    Type,
    Builtin,
}

/// Serializable document implementing [`ElementSource`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryDocument {
    pub title: String,
    #[serde(default)]
    pub file_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_base_point: Option<f64>,
    #[serde(default)]
    pub levels: Vec<MemoryLevel>,
    #[serde(default)]
    pub elements: Vec<MemoryElement>,

    #[serde(skip)]
    open_batch: Option<(String, Vec<MemoryElement>)>,
    #[serde(skip)]
    committed: Vec<String>,
    #[serde(skip)]
    faults: FxHashMap<(ElementId, String, WritePath), HostError>,
}

impl MemoryDocument {
    pub fn new(title: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            file_name: format!("{}.rvt", title),
            title,
            ..Self::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let mut document: Self = serde_json::from_str(json)?;
        if document.file_name.is_empty() {
            document.file_name = format!("{}.rvt", document.title);
        }
        Ok(document)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn with_base_point(mut self, elevation: f64) -> Self {
        self.project_base_point = Some(elevation);
        self
    }

    pub fn with_level(mut self, name: impl Into<String>, elevation: f64) -> Self {
        self.levels.push(MemoryLevel {
            name: name.into(),
            elevation,
        });
        self
    }

    pub fn with_element(mut self, element: MemoryElement) -> Self {
        self.elements.push(element);
        self
    }

    /// Make every typed write of `name` on `id` fail with `error`
    pub fn fail_typed_write(&mut self, id: ElementId, name: &str, error: HostError) {
        self.faults.insert((id, name.to_string(), WritePath::Typed), error);
    }

    /// Make every text write of `name` on `id` fail with `error`
    pub fn fail_text_write(&mut self, id: ElementId, name: &str, error: HostError) {
        self.faults.insert((id, name.to_string(), WritePath::Text), error);
    }

    pub fn element(&self, id: ElementId) -> Option<&MemoryElement> {
        self.elements.iter().find(|e| e.id == id)
    }

    /// Current value of an instance attribute as text (test convenience)
    pub fn value_of(&self, id: ElementId, name: &str) -> Option<String> {
        self.element(id)
            .and_then(|e| e.attributes.get(name))
            .map(Attribute::as_text)
    }

    /// Names of the batches committed so far, in order
    pub fn committed_batches(&self) -> &[String] {
        &self.committed
    }

    pub fn has_open_batch(&self) -> bool {
        self.open_batch.is_some()
    }

    fn writable(
        &mut self,
        id: ElementId,
        name: &str,
        scope: Scope,
        path: WritePath,
    ) -> std::result::Result<&mut Attribute, HostError> {
        if self.open_batch.is_none() {
            return Err(HostError::Unexpected(format!("write of '{}' outside a batch", name)));
        }
        if let Some(fault) = self.faults.get(&(id, name.to_string(), path)) {
            return Err(fault.clone());
        }
        let element = self
            .elements
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| HostError::Unexpected(format!("element {} does not exist", id)))?;
        let attributes = match scope {
            Scope::Instance => &mut element.attributes,
            Scope::Type => &mut element.type_attributes,
            Scope::Builtin => &mut element.builtins,
        };
        let attribute = attributes
            .get_mut(name)
            .ok_or_else(|| HostError::Rejected(format!("'{}' is not defined on element {}", name, id)))?;
        if attribute.read_only {
            return Err(HostError::Rejected(format!("'{}' is read-only", name)));
        }
        Ok(attribute)
    }
}

/// Typed store into an existing attribute; the value kind must match
fn store(attribute: &mut Attribute, name: &str, value: &WriteValue) -> std::result::Result<(), HostError> {
    match (&mut attribute.value, value) {
        (AttributeValue::Text(current), WriteValue::Text(text)) => *current = text.clone(),
        (AttributeValue::Real(current), WriteValue::Real(x)) => *current = *x,
        (_, value) => {
            return Err(HostError::Rejected(format!(
                "'{}' cannot store {:?} directly",
                name, value
            )))
        }
    }
    attribute.display = None;
    Ok(())
}

impl ElementSource for MemoryDocument {
    fn title(&self) -> &str {
        &self.title
    }

    fn file_name(&self) -> &str {
        &self.file_name
    }

    fn query_elements(&self, categories: &[String]) -> Vec<ElementId> {
        self.elements
            .iter()
            .filter(|e| categories.is_empty() || categories.iter().any(|c| c == &e.category))
            .map(|e| e.id)
            .collect()
    }

    fn attribute(&self, id: ElementId, name: &str) -> Option<Attribute> {
        self.element(id)?.attributes.get(name).cloned()
    }

    fn type_attribute(&self, id: ElementId, name: &str) -> Option<Attribute> {
        self.element(id)?.type_attributes.get(name).cloned()
    }

    fn builtin(&self, id: ElementId, param: &str) -> Option<Attribute> {
        self.element(id)?.builtins.get(param).cloned()
    }

    fn family_name(&self, id: ElementId) -> String {
        self.element(id).map(|e| e.family.trim().to_string()).unwrap_or_default()
    }

    fn type_name(&self, id: ElementId) -> String {
        self.element(id).map(|e| e.type_name.trim().to_string()).unwrap_or_default()
    }

    fn attribute_names(&self, id: ElementId) -> Vec<String> {
        self.element(id)
            .map(|e| e.attributes.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn type_attribute_names(&self, id: ElementId) -> Vec<String> {
        self.element(id)
            .map(|e| e.type_attributes.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn level_elevation(&self, id: ElementId) -> Option<f64> {
        let level = self.element(id)?.level.as_deref()?;
        self.levels.iter().find(|l| l.name == level).map(|l| l.elevation)
    }

    fn location_z(&self, id: ElementId) -> Option<f64> {
        self.element(id)?.location_z
    }

    fn project_base_point_elevation(&self) -> Option<f64> {
        self.project_base_point
    }

    fn level_elevations(&self) -> Vec<f64> {
        self.levels.iter().map(|l| l.elevation).collect()
    }

    fn set_attribute(&mut self, id: ElementId, name: &str, value: &WriteValue) -> std::result::Result<(), HostError> {
        store(self.writable(id, name, Scope::Instance, WritePath::Typed)?, name, value)
    }

    fn set_attribute_text(&mut self, id: ElementId, name: &str, text: &str) -> std::result::Result<(), HostError> {
        let attribute = self.writable(id, name, Scope::Instance, WritePath::Text)?;
        let rejected = || HostError::Rejected(format!("'{}' cannot parse '{}'", name, text));
        match &mut attribute.value {
            AttributeValue::Text(current) => *current = text.to_string(),
            AttributeValue::Integer(current) => {
                *current = parse_number(text).map(|n| n.round() as i64).ok_or_else(rejected)?
            }
            AttributeValue::Real(current) => *current = parse_number(text).ok_or_else(rejected)?,
            AttributeValue::Reference(_) => return Err(rejected()),
        }
        attribute.display = None;
        Ok(())
    }

    fn set_type_attribute(
        &mut self,
        id: ElementId,
        name: &str,
        value: &WriteValue,
    ) -> std::result::Result<(), HostError> {
        store(self.writable(id, name, Scope::Type, WritePath::Typed)?, name, value)
    }

    fn set_builtin(&mut self, id: ElementId, param: &str, value: &WriteValue) -> std::result::Result<(), HostError> {
        store(self.writable(id, param, Scope::Builtin, WritePath::Typed)?, param, value)
    }

    fn begin_batch(&mut self, name: &str) -> std::result::Result<(), HostError> {
        if let Some((open, _)) = &self.open_batch {
            return Err(HostError::Unexpected(format!(
                "cannot open '{}' while '{}' is open",
                name, open
            )));
        }
        self.open_batch = Some((name.to_string(), self.elements.clone()));
        Ok(())
    }

    fn commit_batch(&mut self) -> std::result::Result<(), HostError> {
        let (name, _) = self
            .open_batch
            .take()
            .ok_or_else(|| HostError::Unexpected("no open batch to commit".to_string()))?;
        self.committed.push(name);
        Ok(())
    }

    fn rollback_batch(&mut self) {
        if let Some((_, snapshot)) = self.open_batch.take() {
            self.elements = snapshot;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document() -> MemoryDocument {
        MemoryDocument::new("SNAM-X-P-12_34_AB-B01")
            .with_level("L0", 0.0)
            .with_element(
                MemoryElement::new(1, "Pipes")
                    .with_family("Tubo", "Acciaio")
                    .with_level("L0")
                    .with_attribute("NP100", Attribute::text(""))
                    .with_attribute("NP101", Attribute::real(0.0))
                    .with_attribute("NP102", Attribute::text("x").read_only()),
            )
    }

    #[test]
    fn test_writes_require_open_batch() {
        let mut doc = document();
        let err = doc.set_attribute(ElementId(1), "NP100", &WriteValue::text("a")).unwrap_err();
        assert!(matches!(err, HostError::Unexpected(_)));
    }

    #[test]
    fn test_typed_and_text_writes() {
        let mut doc = document();
        doc.begin_batch("t").unwrap();
        doc.set_attribute(ElementId(1), "NP100", &WriteValue::text("Steel")).unwrap();
        assert!(matches!(
            doc.set_attribute(ElementId(1), "NP101", &WriteValue::text("12.5")),
            Err(HostError::Rejected(_))
        ));
        doc.set_attribute_text(ElementId(1), "NP101", "12.5").unwrap();
        assert!(matches!(
            doc.set_attribute(ElementId(1), "NP102", &WriteValue::text("y")),
            Err(HostError::Rejected(_))
        ));
        doc.commit_batch().unwrap();

        assert_eq!(doc.value_of(ElementId(1), "NP100").as_deref(), Some("Steel"));
        assert_eq!(doc.value_of(ElementId(1), "NP101").as_deref(), Some("12.5"));
        assert_eq!(doc.committed_batches(), &["t".to_string()]);
    }

    #[test]
    fn test_type_and_builtin_writes() {
        let mut doc = MemoryDocument::new("t").with_element(
            MemoryElement::new(1, "Pipes")
                .with_type_attribute("NP900", Attribute::text("x"))
                .with_builtin("IFC_EXPORT_ELEMENT_AS", Attribute::text("")),
        );
        doc.begin_batch("t").unwrap();
        doc.set_type_attribute(ElementId(1), "NP900", &WriteValue::text("")).unwrap();
        doc.set_builtin(ElementId(1), "IFC_EXPORT_ELEMENT_AS", &WriteValue::text("IfcPipeSegmentType"))
            .unwrap();
        assert!(matches!(
            doc.set_builtin(ElementId(1), "IFC_EXPORT_PREDEFINEDTYPE", &WriteValue::text("BEND")),
            Err(HostError::Rejected(_))
        ));
        doc.commit_batch().unwrap();

        assert_eq!(doc.type_attribute(ElementId(1), "NP900").map(|a| a.as_text()).as_deref(), Some(""));
        assert_eq!(doc.type_attribute_names(ElementId(1)), vec!["NP900".to_string()]);
        assert_eq!(
            doc.builtin(ElementId(1), "IFC_EXPORT_ELEMENT_AS").map(|a| a.as_text()).as_deref(),
            Some("IfcPipeSegmentType")
        );
    }

    #[test]
    fn test_rollback_restores_snapshot() {
        let mut doc = document();
        doc.begin_batch("t").unwrap();
        doc.set_attribute(ElementId(1), "NP100", &WriteValue::text("Steel")).unwrap();
        doc.rollback_batch();
        assert_eq!(doc.value_of(ElementId(1), "NP100").as_deref(), Some(""));
        assert!(!doc.has_open_batch());
        assert!(doc.committed_batches().is_empty());
    }

    #[test]
    fn test_injected_faults() {
        let mut doc = document();
        doc.fail_typed_write(ElementId(1), "NP100", HostError::Rejected("locked".into()));
        doc.begin_batch("t").unwrap();
        assert!(doc.set_attribute(ElementId(1), "NP100", &WriteValue::text("a")).is_err());
        doc.set_attribute_text(ElementId(1), "NP100", "a").unwrap();
        assert_eq!(doc.value_of(ElementId(1), "NP100").as_deref(), Some("a"));
    }

    #[test]
    fn test_json_round_trip_keeps_elements() {
        let doc = document();
        let json = doc.to_json().unwrap();
        let back = MemoryDocument::from_json(&json).unwrap();
        assert_eq!(back.elements, doc.elements);
        assert_eq!(back.level_elevation(ElementId(1)), Some(0.0));
        assert_eq!(back.query_elements(&["Pipes".to_string()]), vec![ElementId(1)]);
        assert!(back.query_elements(&["Ducts".to_string()]).is_empty());
    }
}
