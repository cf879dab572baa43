// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! CLI configuration loaded from environment variables.

use std::path::PathBuf;

use paramap_processing::{ASSET_LIST_SHEET, COMMON_SHEET};

/// Which operation the CLI performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tool {
    /// Run a mapping profile
    #[default]
    Map,
    /// Empty the CA/NP/LC/VAR parameters
    Clean,
    /// Fill IFC names and export classes
    Ifc,
}

impl Tool {
    fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "map" => Some(Tool::Map),
            "clean" => Some(Tool::Clean),
            "ifc" => Some(Tool::Ifc),
            _ => None,
        }
    }
}

/// Run configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// `PARAMAP_TOOL`; unknown names are kept so the CLI can report them.
    pub tool: Result<Tool, String>,
    /// Profile preset name (`pipes`, `accessories`, `common`) or a `.json` profile file.
    pub profile: String,
    /// JSON snapshot of the host document.
    pub document: PathBuf,
    /// Rules workbook.
    pub rules: PathBuf,
    /// Overrides the profile's rules sheet.
    pub rules_sheet: Option<String>,
    /// Common-parameters sheet of the rules workbook, exempt from the shadow audit.
    pub common_sheet: String,
    /// Folder holding `CI_<model code>.xlsx` asset workbooks.
    pub asset_folder: Option<PathBuf>,
    /// Asset list workbook used by common-parameter planning.
    pub asset_list: Option<PathBuf>,
    pub asset_list_sheet: String,
    /// Reference workbook for prefix cross-references.
    pub reference: Option<PathBuf>,
    /// Line CSV for line lookups.
    pub line_csv: Option<PathBuf>,
    /// Where the updated snapshot is written (defaults to the input document).
    pub output: Option<PathBuf>,
    /// Where the JSON report is written, if anywhere.
    pub report: Option<PathBuf>,
    /// Keep skip diagnostics in the report.
    pub verbose: bool,
    /// IfcName list workbook (`IfcName` and `IM` sheets).
    pub ifc_names: Option<PathBuf>,
    /// Placeholder workbook (`FU` and `SE` sheets).
    pub ifc_placeholders: Option<PathBuf>,
    /// Class mapping workbook (`Elenco *` sheets).
    pub ifc_classes: Option<PathBuf>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let path = |key: &str| var(key).map(PathBuf::from);

        Self {
            tool: match var("PARAMAP_TOOL") {
                Some(name) => Tool::parse(&name).ok_or(name),
                None => Ok(Tool::default()),
            },
            profile: var("PARAMAP_PROFILE").unwrap_or_else(|| "pipes".into()),
            document: path("PARAMAP_DOCUMENT").unwrap_or_else(|| "model.json".into()),
            rules: path("PARAMAP_RULES").unwrap_or_else(|| "rules.xlsx".into()),
            rules_sheet: var("PARAMAP_RULES_SHEET"),
            common_sheet: var("PARAMAP_COMMON_SHEET").unwrap_or_else(|| COMMON_SHEET.into()),
            asset_folder: path("PARAMAP_ASSET_FOLDER"),
            asset_list: path("PARAMAP_ASSET_LIST"),
            asset_list_sheet: var("PARAMAP_ASSET_LIST_SHEET").unwrap_or_else(|| ASSET_LIST_SHEET.into()),
            reference: path("PARAMAP_REFERENCE"),
            line_csv: path("PARAMAP_LINE_CSV"),
            output: path("PARAMAP_OUTPUT"),
            report: path("PARAMAP_REPORT"),
            verbose: var("PARAMAP_VERBOSE")
                .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
            ifc_names: path("PARAMAP_IFC_NAMES"),
            ifc_placeholders: path("PARAMAP_IFC_PLACEHOLDERS"),
            ifc_classes: path("PARAMAP_IFC_CLASSES"),
        }
    }

    /// Snapshot path written after a successful run.
    pub fn output_path(&self) -> &PathBuf {
        self.output.as_ref().unwrap_or(&self.document)
    }
}
