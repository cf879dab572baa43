// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! IFC name and class assignment
//!
//! Fills `IfcName`, `IfcObjectType` and the export class of MEP elements from
//! three workbooks:
//!
//! - the IfcName list (`IfcName` sheet: name, code; `IM` sheet: code, name)
//! - the placeholder list (`FU`, `SE` sheets: full placeholder names)
//! - the class mapping (`Elenco *` sheets: prefix, object type, export class)
//!
//! Families and types are matched on their first five characters, upper-cased.

use std::fmt;

use paramap_core::{CellGrid, Workbook};
use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::error::{HostError, Result, RunError};
use crate::host::{ElementId, ElementSource, WriteValue, IFC_EXPORT_ELEMENT_AS, IFC_EXPORT_PREDEFINEDTYPE};
use crate::report::RunWarning;
use crate::runner::push_warning;

pub const IFC_BATCH: &str = "IFC class mapping";

pub const IFC_NAME_PARAM: &str = "IfcName";
pub const IFC_OBJECT_TYPE_PARAM: &str = "IfcObjectType";

pub const IFC_NAME_SHEET: &str = "IfcName";
pub const IM_SHEET: &str = "IM";
pub const PLACEHOLDER_SHEETS: [&str; 2] = ["FU", "SE"];
pub const CLASS_SHEETS: [&str; 5] = ["Elenco IM", "Elenco SE", "Elenco FU", "Elenco AP", "Elenco NO"];

/// Categories whose instances get IFC data
pub const IFC_CATEGORIES: [&str; 20] = [
    "Air Terminals",
    "Ducts",
    "Duct Fittings",
    "Duct Accessories",
    "Duct Insulations",
    "Duct Linings",
    "Electrical Equipment",
    "Furniture",
    "Flex Ducts",
    "Generic Models",
    "Pipes",
    "Pipe Fittings",
    "Pipe Accessories",
    "Pipe Insulations",
    "Flex Pipes",
    "Cable Trays",
    "Cable Tray Fittings",
    "Conduits",
    "Conduit Fittings",
    "Mechanical Equipment",
];

/// Type name heads marking pipe segments
const SEGMENT_HEADS: [&str; 3] = ["SNAM_", "Tubaz", "BARRE"];
const SEGMENT_CODE: &str = "BARRE";
const SEGMENT_OBJECT_TYPE: &str = "IfcFlowSegment";
const SEGMENT_EXPORT_CLASS: &str = "IfcPipeSegmentType";

const BEND_CODE: &str = "NO025";
const BEND_PREDEFINED_TYPE: &str = "BEND";

/// Valve families named after their actuator; the longest IfcName in the family name wins
const ACTUATED_VALVE_PREFIXES: [&str; 2] = ["AP330", "AP450"];
const ACTUATOR_MARKERS: [&str; 4] = [
    "con_comando_manuale_con_riduttore",
    "con_comando_manuale_a_leva",
    "con_comando_manuale_riduttore",
    "con_comando_manuale_con_chiave_a_T",
];

/// First five characters, upper-cased
fn head(text: &str) -> String {
    text.chars().take(5).collect::<String>().to_uppercase()
}

/// Lookup tables read from the three IFC workbooks
#[derive(Debug, Clone, Default)]
pub struct IfcTables {
    /// `(IfcName, code)` in sheet order; codes upper-cased
    names: Vec<(String, String)>,
    /// Placeholder head to IfcName, from the `IM` sheet
    im_names: FxHashMap<String, String>,
    /// Placeholder head to full placeholder name
    placeholders: FxHashMap<String, String>,
    /// Prefix to `(object type, export class)`
    classes: FxHashMap<String, (String, String)>,
}

impl IfcTables {
    pub fn from_workbooks(names: &Workbook, placeholders: &Workbook, classes: &Workbook) -> Result<Self> {
        let mut tables = Self::default();
        tables.read_names(names.require_sheet(IFC_NAME_SHEET)?);
        tables.read_im_names(names.require_sheet(IM_SHEET)?);
        for sheet in PLACEHOLDER_SHEETS {
            tables.read_placeholders(placeholders.require_sheet(sheet)?);
        }
        for sheet in CLASS_SHEETS {
            tables.read_classes(classes.require_sheet(sheet)?);
        }
        tracing::debug!(
            names = tables.names.len(),
            placeholders = tables.placeholders.len(),
            classes = tables.classes.len(),
            "Loaded IFC tables"
        );
        Ok(tables)
    }

    fn read_names(&mut self, grid: &CellGrid) {
        for r in grid.data_rows() {
            let name = grid.cell(r, 0).as_text();
            if !name.is_empty() {
                self.names.push((name, grid.cell(r, 1).as_text().to_uppercase()));
            }
        }
    }

    fn read_im_names(&mut self, grid: &CellGrid) {
        for r in grid.data_rows() {
            let code = grid.cell(r, 0).as_text();
            let name = grid.cell(r, 1).as_text();
            if !code.is_empty() && !name.is_empty() {
                self.im_names.insert(code.to_uppercase(), name);
            }
        }
    }

    fn read_placeholders(&mut self, grid: &CellGrid) {
        for r in grid.data_rows() {
            let name = grid.cell(r, 0).as_text();
            if !name.is_empty() {
                self.placeholders.insert(head(&name), name);
            }
        }
    }

    fn read_classes(&mut self, grid: &CellGrid) {
        for r in grid.data_rows() {
            let prefix = head(&grid.cell(r, 0).as_text());
            let object_type = grid.cell(r, 4).as_text();
            let export = grid.cell(r, 5).as_text();
            let export = if export.is_empty() { object_type.clone() } else { export };
            self.classes.insert(prefix, (object_type, export));
        }
    }

    /// First IfcName listed for `code`
    fn name_for_code(&self, code: &str) -> Option<&str> {
        self.names.iter().find(|(_, c)| c == code).map(|(name, _)| name.as_str())
    }

    /// Decide the IFC data of an element from its family and type names
    pub fn classify(&self, family: &str, type_name: &str) -> IfcAssignment {
        let mut assignment = IfcAssignment::default();
        let head_family = head(family);
        let head_type = head(type_name);

        if SEGMENT_HEADS.iter().any(|h| type_name.starts_with(h)) {
            if let Some(name) = self.name_for_code(SEGMENT_CODE) {
                assignment.ifc_name = Some(name.to_string());
                assignment.object_type = Some(SEGMENT_OBJECT_TYPE.to_string());
                assignment.export_as = Some(SEGMENT_EXPORT_CLASS.to_string());
            }
            return assignment;
        }

        let mut placeholder = false;
        if head_family == BEND_CODE {
            assignment.predefined_type = Some(BEND_PREDEFINED_TYPE.to_string());
            assignment.ifc_name = self.name_for_code(BEND_CODE).map(str::to_string);
        } else if ACTUATED_VALVE_PREFIXES.iter().any(|p| family.starts_with(p))
            && ACTUATOR_MARKERS.iter().any(|m| family.contains(m))
        {
            assignment.ifc_name = self
                .names
                .iter()
                .map(|(name, _)| name.trim())
                .filter(|name| family.contains(name))
                .max_by_key(|name| name.len())
                .map(str::to_string);
        } else if let Some(name) = self.placeholders.get(&head_type) {
            placeholder = true;
            assignment.ifc_name = Some(name.clone());
        } else if let Some(name) = self.im_names.get(&head_type) {
            placeholder = true;
            assignment.ifc_name = Some(name.clone());
        } else {
            assignment.ifc_name = self
                .name_for_code(&head_type)
                .or_else(|| self.name_for_code(&head_family))
                .map(str::to_string);
        }

        let class_key = if placeholder { &head_type } else { &head_family };
        if let Some((object_type, export)) = self.classes.get(class_key) {
            assignment.object_type = Some(object_type.clone());
            assignment.export_as = Some(export.clone());
        }
        assignment
    }
}

/// IFC values chosen for one element; `None` leaves the parameter untouched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IfcAssignment {
    pub ifc_name: Option<String>,
    pub object_type: Option<String>,
    pub export_as: Option<String>,
    pub predefined_type: Option<String>,
}

/// Outcome of an IFC mapping run
#[derive(Debug, Clone, Default, Serialize)]
pub struct IfcReport {
    pub elements: usize,
    /// Elements that received an IfcName
    pub named: usize,
    pub writes: usize,
    pub warnings: Vec<RunWarning>,
}

impl fmt::Display for IfcReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "IFC mapping: {} parameters written, {} of {} elements named",
            self.writes, self.named, self.elements
        )?;
        for w in &self.warnings {
            writeln!(f, "  {} WARNING {}: {}", w.label, w.target.as_deref().unwrap_or("-"), w.message)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Attribute,
    Builtin,
}

/// Write the IFC data of every element in [`IFC_CATEGORIES`] inside one batch
pub fn map_ifc_classes<H: ElementSource + ?Sized>(
    host: &mut H,
    tables: &IfcTables,
) -> std::result::Result<IfcReport, RunError> {
    let categories: Vec<String> = IFC_CATEGORIES.iter().map(|c| c.to_string()).collect();
    let elements = host.query_elements(&categories);
    tracing::info!(elements = elements.len(), "Mapping IFC classes");

    let mut report = IfcReport::default();
    host.begin_batch(IFC_BATCH)?;
    for &id in &elements {
        if let Err(source) = map_element(host, tables, id, &mut report) {
            tracing::error!(element = %id, error = %source, "Rolling back batch");
            host.rollback_batch();
            return Err(RunError::BatchAborted {
                batch: IFC_BATCH.to_string(),
                source,
            });
        }
    }

    if let Err(error) = host.commit_batch() {
        host.rollback_batch();
        return Err(error.into());
    }
    tracing::info!(writes = report.writes, named = report.named, "Mapped IFC classes");
    Ok(report)
}

fn map_element<H: ElementSource + ?Sized>(
    host: &mut H,
    tables: &IfcTables,
    id: ElementId,
    report: &mut IfcReport,
) -> std::result::Result<(), HostError> {
    let family = host.family_name(id);
    let type_name = host.type_name(id);
    if family.is_empty() && type_name.is_empty() {
        return Ok(());
    }
    report.elements += 1;

    let assignment = tables.classify(&family, &type_name);
    if let Some(predefined) = &assignment.predefined_type {
        write(host, id, Slot::Builtin, IFC_EXPORT_PREDEFINEDTYPE, predefined, report)?;
    }
    if let Some(name) = &assignment.ifc_name {
        if write(host, id, Slot::Attribute, IFC_NAME_PARAM, name, report)? {
            report.named += 1;
        }
    }
    if let Some(object_type) = &assignment.object_type {
        write(host, id, Slot::Attribute, IFC_OBJECT_TYPE_PARAM, object_type, report)?;
    }
    if let Some(export) = &assignment.export_as {
        write(host, id, Slot::Builtin, IFC_EXPORT_ELEMENT_AS, export, report)?;
    }
    Ok(())
}

/// Write one value if the parameter exists and is writable; returns whether it was written
fn write<H: ElementSource + ?Sized>(
    host: &mut H,
    id: ElementId,
    slot: Slot,
    name: &str,
    value: &str,
    report: &mut IfcReport,
) -> std::result::Result<bool, HostError> {
    let current = match slot {
        Slot::Attribute => host.attribute(id, name),
        Slot::Builtin => host.builtin(id, name),
    };
    if !current.is_some_and(|a| a.is_writable()) {
        return Ok(false);
    }

    let value = WriteValue::text(value);
    let written = match slot {
        Slot::Attribute => host.set_attribute(id, name, &value),
        Slot::Builtin => host.set_builtin(id, name, &value),
    };
    match written {
        Ok(()) => {
            report.writes += 1;
            tracing::debug!(element = %id, param = name, %value, "Wrote IFC parameter");
            Ok(true)
        }
        Err(HostError::Rejected(reason)) => {
            push_warning(
                &mut report.warnings,
                &*host,
                id,
                Some(name.to_string()),
                format!("set failed (val={}): {}", value, reason),
            );
            Ok(false)
        }
        Err(error) => Err(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Attribute;
    use crate::memory::{MemoryDocument, MemoryElement};

    fn tables() -> IfcTables {
        let names = Workbook::new("Allegato 1.xlsx")
            .with_sheet(
                IFC_NAME_SHEET,
                CellGrid::from_text_rows(vec![
                    vec!["IfcName", "Codice"],
                    vec!["Tubazione", "barre"],
                    vec!["Curva", "NO025"],
                    vec!["Valvola", "AP330"],
                    vec!["Valvola a sfera", "AP330"],
                    vec!["Filtro", "AP120"],
                    vec!["Giunto", "GI001"],
                ]),
            )
            .with_sheet(
                IM_SHEET,
                CellGrid::from_text_rows(vec![vec!["Codice", "IfcName"], vec!["im001", "Impianto elettrico"]]),
            );
        let placeholders = Workbook::new("PLACEHOLDER.xlsx")
            .with_sheet("FU", CellGrid::from_text_rows(vec![vec!["Nome"], vec!["FU010_Funzionale"]]))
            .with_sheet("SE", CellGrid::from_text_rows(vec![vec!["Nome"]]));

        let mut classes = Workbook::new("Allegato 3.xlsx");
        for sheet in CLASS_SHEETS {
            classes.insert_sheet(sheet, CellGrid::from_text_rows(vec![vec!["Prefisso", "", "", "", "Object", "Export"]]));
        }
        classes.insert_sheet(
            "Elenco AP",
            CellGrid::from_text_rows(vec![
                vec!["Prefisso", "", "", "", "Object", "Export"],
                vec!["AP330_x", "", "", "", "IfcValve", "IfcValveType"],
                vec!["AP120_y", "", "", "", "IfcFilter", ""],
            ]),
        );
        classes.insert_sheet(
            "Elenco FU",
            CellGrid::from_text_rows(vec![
                vec!["Prefisso", "", "", "", "Object", "Export"],
                vec!["FU010", "", "", "", "IfcBuildingElementProxy", "IfcBuildingElementProxyType"],
            ]),
        );

        IfcTables::from_workbooks(&names, &placeholders, &classes).unwrap()
    }

    #[test]
    fn test_segment_types() {
        let a = tables().classify("Tubo", "SNAM_Acciaio");
        assert_eq!(a.ifc_name.as_deref(), Some("Tubazione"));
        assert_eq!(a.object_type.as_deref(), Some("IfcFlowSegment"));
        assert_eq!(a.export_as.as_deref(), Some("IfcPipeSegmentType"));
    }

    #[test]
    fn test_bend_sets_predefined_type() {
        let a = tables().classify("NO025_Curva_90", "C90");
        assert_eq!(a.predefined_type.as_deref(), Some("BEND"));
        assert_eq!(a.ifc_name.as_deref(), Some("Curva"));
        assert_eq!(a.object_type, None);
    }

    #[test]
    fn test_actuated_valve_takes_longest_name() {
        let a = tables().classify("AP330_Valvola a sfera_con_comando_manuale_a_leva", "DN100");
        assert_eq!(a.ifc_name.as_deref(), Some("Valvola a sfera"));
        assert_eq!(a.object_type.as_deref(), Some("IfcValve"));
        assert_eq!(a.export_as.as_deref(), Some("IfcValveType"));
    }

    #[test]
    fn test_placeholders_use_type_head() {
        let t = tables();
        let a = t.classify("Modello generico", "fu010_anything");
        assert_eq!(a.ifc_name.as_deref(), Some("FU010_Funzionale"));
        assert_eq!(a.object_type.as_deref(), Some("IfcBuildingElementProxy"));

        let im = t.classify("Modello generico", "IM001");
        assert_eq!(im.ifc_name.as_deref(), Some("Impianto elettrico"));
        assert_eq!(im.export_as, None);
    }

    #[test]
    fn test_standard_codes_and_export_fallback() {
        let t = tables();
        let a = t.classify("AP120_Filtro", "F1");
        assert_eq!(a.ifc_name.as_deref(), Some("Filtro"));
        assert_eq!(a.object_type.as_deref(), Some("IfcFilter"));
        assert_eq!(a.export_as.as_deref(), Some("IfcFilter"));

        let by_type = t.classify("Altro", "GI001_Giunto");
        assert_eq!(by_type.ifc_name.as_deref(), Some("Giunto"));

        assert_eq!(t.classify("Sconosciuto", "X"), IfcAssignment::default());
    }

    #[test]
    fn test_writes_only_existing_writable_parameters() {
        let mut doc = MemoryDocument::new("SNAM")
            .with_element(
                MemoryElement::new(1, "Pipe Accessories")
                    .with_family("AP120_Filtro", "F1")
                    .with_attribute(IFC_NAME_PARAM, Attribute::text(""))
                    .with_attribute(IFC_OBJECT_TYPE_PARAM, Attribute::text("").read_only())
                    .with_builtin(IFC_EXPORT_ELEMENT_AS, Attribute::text("")),
            )
            .with_element(
                MemoryElement::new(2, "Pipe Fittings")
                    .with_family("NO025_Curva", "C90")
                    .with_attribute(IFC_NAME_PARAM, Attribute::text(""))
                    .with_builtin(IFC_EXPORT_PREDEFINEDTYPE, Attribute::text("")),
            )
            .with_element(
                MemoryElement::new(3, "Walls")
                    .with_family("AP120_Filtro", "F1")
                    .with_attribute(IFC_NAME_PARAM, Attribute::text("")),
            );

        let report = map_ifc_classes(&mut doc, &tables()).unwrap();

        assert_eq!(report.elements, 2);
        assert_eq!(report.named, 2);
        assert_eq!(report.writes, 4);
        assert!(report.warnings.is_empty());
        assert_eq!(doc.value_of(ElementId(1), IFC_NAME_PARAM).as_deref(), Some("Filtro"));
        assert_eq!(doc.value_of(ElementId(1), IFC_OBJECT_TYPE_PARAM).as_deref(), Some(""));
        assert_eq!(
            doc.builtin(ElementId(1), IFC_EXPORT_ELEMENT_AS).map(|a| a.as_text()).as_deref(),
            Some("IfcFilter")
        );
        assert_eq!(
            doc.builtin(ElementId(2), IFC_EXPORT_PREDEFINEDTYPE).map(|a| a.as_text()).as_deref(),
            Some("BEND")
        );
        assert_eq!(doc.value_of(ElementId(3), IFC_NAME_PARAM).as_deref(), Some(""));
        assert_eq!(doc.committed_batches(), &[IFC_BATCH.to_string()]);
    }

    #[test]
    fn test_rejected_write_is_a_warning() {
        let mut doc = MemoryDocument::new("SNAM").with_element(
            MemoryElement::new(1, "Pipe Accessories")
                .with_family("AP120_Filtro", "F1")
                .with_attribute(IFC_NAME_PARAM, Attribute::text("")),
        );
        doc.fail_typed_write(ElementId(1), IFC_NAME_PARAM, HostError::Rejected("locked".into()));

        let report = map_ifc_classes(&mut doc, &tables()).unwrap();
        assert_eq!(report.named, 0);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].target.as_deref(), Some(IFC_NAME_PARAM));
    }
}
