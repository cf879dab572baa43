// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Host capability interface
//!
//! The mapping engine never sees a concrete document model. Everything it
//! needs from the host (element queries, attribute reads, typed writes,
//! batches) goes through [`ElementSource`]. A real deployment adapts its
//! document API to this trait; tests and the CLI use
//! [`MemoryDocument`](crate::memory::MemoryDocument).

use std::fmt;

use paramap_core::format_number;
use serde::{Deserialize, Serialize};

use crate::error::HostError;

/// Built-in parameter: pipe nominal diameter
pub const RBS_PIPE_DIAMETER_PARAM: &str = "RBS_PIPE_DIAMETER_PARAM";
/// Built-in parameter: pipe outer diameter
pub const RBS_PIPE_OUTER_DIAMETER: &str = "RBS_PIPE_OUTER_DIAMETER";
/// Built-in parameter: MEP offset from level
pub const RBS_OFFSET_PARAM: &str = "RBS_OFFSET_PARAM";
/// Built-in parameter: instance elevation from level
pub const INSTANCE_ELEVATION_PARAM: &str = "INSTANCE_ELEVATION_PARAM";
/// Built-in parameter: free-host offset
pub const INSTANCE_FREE_HOST_OFFSET_PARAM: &str = "INSTANCE_FREE_HOST_OFFSET_PARAM";
/// Built-in parameter: IFC export class
pub const IFC_EXPORT_ELEMENT_AS: &str = "IFC_EXPORT_ELEMENT_AS";
/// Built-in parameter: IFC predefined type
pub const IFC_EXPORT_PREDEFINEDTYPE: &str = "IFC_EXPORT_PREDEFINEDTYPE";

/// Host element identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(pub i64);

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Storage kind of an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKind {
    Text,
    Integer,
    Real,
    Reference,
}

/// Stored attribute value; reals are in internal units (feet for lengths)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    Text(String),
    Integer(i64),
    Real(f64),
    Reference(i64),
}

/// One named attribute of an element or element type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub value: AttributeValue,
    #[serde(default)]
    pub read_only: bool,
    /// Value as the host displays it (`"100 mm"`), when it differs from the raw value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

impl Attribute {
    pub fn new(value: AttributeValue) -> Self {
        Self {
            value,
            read_only: false,
            display: None,
        }
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self::new(AttributeValue::Text(value.into()))
    }

    pub fn integer(value: i64) -> Self {
        Self::new(AttributeValue::Integer(value))
    }

    pub fn real(value: f64) -> Self {
        Self::new(AttributeValue::Real(value))
    }

    pub fn reference(id: i64) -> Self {
        Self::new(AttributeValue::Reference(id))
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        self.display = Some(display.into());
        self
    }

    pub fn kind(&self) -> StorageKind {
        match self.value {
            AttributeValue::Text(_) => StorageKind::Text,
            AttributeValue::Integer(_) => StorageKind::Integer,
            AttributeValue::Real(_) => StorageKind::Real,
            AttributeValue::Reference(_) => StorageKind::Reference,
        }
    }

    #[inline]
    pub fn is_writable(&self) -> bool {
        !self.read_only
    }

    /// Raw value as text: trimmed text, decimal integers, formatted reals, reference ids
    pub fn as_text(&self) -> String {
        match &self.value {
            AttributeValue::Text(s) => s.trim().to_string(),
            AttributeValue::Integer(n) | AttributeValue::Reference(n) => n.to_string(),
            AttributeValue::Real(x) => format_number(*x),
        }
    }

    /// Real value in internal units, `None` for other kinds
    pub fn as_real(&self) -> Option<f64> {
        match self.value {
            AttributeValue::Real(x) => Some(x),
            _ => None,
        }
    }

    /// Displayed text, falling back to [`Attribute::as_text`]
    pub fn display_text(&self) -> String {
        match &self.display {
            Some(display) if !display.trim().is_empty() => display.trim().to_string(),
            _ => self.as_text(),
        }
    }
}

/// Value produced by a rule, ready to be written
#[derive(Debug, Clone, PartialEq)]
pub enum WriteValue {
    Text(String),
    /// Internal units
    Real(f64),
}

impl WriteValue {
    pub fn text(value: impl Into<String>) -> Self {
        WriteValue::Text(value.into())
    }

    /// Text used by the fallback write path
    pub fn as_text(&self) -> String {
        match self {
            WriteValue::Text(s) => s.clone(),
            WriteValue::Real(x) => format_number(*x),
        }
    }
}

impl fmt::Display for WriteValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

/// Document access needed by a mapping run
pub trait ElementSource {
    /// Title of the active document
    fn title(&self) -> &str;

    /// File name of the active document, without directories
    fn file_name(&self) -> &str;

    /// Instances (never types) in any of `categories`, in document order
    fn query_elements(&self, categories: &[String]) -> Vec<ElementId>;

    /// Instance attribute by name
    fn attribute(&self, id: ElementId, name: &str) -> Option<Attribute>;

    /// Attribute of the element's type by name
    fn type_attribute(&self, id: ElementId, name: &str) -> Option<Attribute>;

    /// Built-in parameter by identifier (e.g. [`RBS_OFFSET_PARAM`])
    fn builtin(&self, id: ElementId, param: &str) -> Option<Attribute>;

    fn family_name(&self, id: ElementId) -> String;

    fn type_name(&self, id: ElementId) -> String;

    /// Names of every instance attribute
    fn attribute_names(&self, id: ElementId) -> Vec<String>;

    /// Names of every attribute of the element's type
    fn type_attribute_names(&self, id: ElementId) -> Vec<String>;

    /// Elevation of the element's associated level
    fn level_elevation(&self, id: ElementId) -> Option<f64>;

    /// Z of the element's location point or curve start
    fn location_z(&self, id: ElementId) -> Option<f64>;

    fn project_base_point_elevation(&self) -> Option<f64>;

    /// Elevations of every level, in document order
    fn level_elevations(&self) -> Vec<f64>;

    /// Typed write
    fn set_attribute(&mut self, id: ElementId, name: &str, value: &WriteValue) -> Result<(), HostError>;

    /// Write through the host's text parser
    fn set_attribute_text(&mut self, id: ElementId, name: &str, text: &str) -> Result<(), HostError>;

    /// Typed write of an attribute of the element's type
    fn set_type_attribute(&mut self, id: ElementId, name: &str, value: &WriteValue) -> Result<(), HostError>;

    /// Typed write of a built-in parameter
    fn set_builtin(&mut self, id: ElementId, param: &str, value: &WriteValue) -> Result<(), HostError>;

    fn begin_batch(&mut self, name: &str) -> Result<(), HostError>;

    fn commit_batch(&mut self) -> Result<(), HostError>;

    fn rollback_batch(&mut self);

    /// Instance attribute, falling back to the type attribute
    fn attribute_or_type(&self, id: ElementId, name: &str) -> Option<Attribute> {
        self.attribute(id, name)
            .or_else(|| self.type_attribute(id, name))
    }

    /// `"<family> [<type>][ID:<id>]"`
    fn element_label(&self, id: ElementId) -> String {
        format!("{} [{}][ID:{}]", self.family_name(id), self.type_name(id), id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_text_forms() {
        assert_eq!(Attribute::text("  Acciaio ").as_text(), "Acciaio");
        assert_eq!(Attribute::integer(-3).as_text(), "-3");
        assert_eq!(Attribute::real(2.5).as_text(), "2.5");
        assert_eq!(Attribute::reference(4411).as_text(), "4411");
        assert_eq!(Attribute::real(0.328084).with_display("100 mm").display_text(), "100 mm");
        assert_eq!(Attribute::real(1.0).with_display("  ").display_text(), "1");
    }

    #[test]
    fn test_write_value_text() {
        assert_eq!(WriteValue::Real(3.0).to_string(), "3");
        assert_eq!(WriteValue::text("N/C").as_text(), "N/C");
    }

    #[test]
    fn test_attribute_json_shape() {
        let attr: Attribute = serde_json::from_str(r#"{"value":{"Real":1.5},"read_only":true}"#).unwrap();
        assert_eq!(attr.kind(), StorageKind::Real);
        assert!(!attr.is_writable());
        assert_eq!(attr.display, None);
    }
}
