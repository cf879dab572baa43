// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Workbook and CSV sources
//!
//! Every file a run reads is loaded up front. [`SourceSet::load`] only opens
//! what the parsed rules actually need, and [`SourceSet::preflight`] checks
//! every referenced sheet, so a missing input fails the run before any batch
//! is opened.

use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, Range, Reader};
use paramap_core::{decode_csv, CellGrid, CellValue, Error as CoreError, RuleSet, TitleContext, Workbook};

use crate::error::{Error, Result};
use crate::profile::MappingProfile;

fn require_file(path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(CoreError::MissingSourceFile(path.to_path_buf()).into())
    }
}

fn cell_from_data(data: &Data) -> CellValue {
    match data {
        Data::Empty => CellValue::Empty,
        Data::Int(n) => CellValue::Number(*n as f64),
        Data::Float(x) => CellValue::Number(*x),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::String(s) => CellValue::from(s.as_str()),
        other => CellValue::from(other.to_string().as_str()),
    }
}

/// Convert a sheet range into a grid addressed from cell A1
fn range_to_grid(range: &Range<Data>) -> CellGrid {
    let mut grid = CellGrid::new();
    let Some((row0, col0)) = range.start() else {
        return grid;
    };
    for (r, row) in range.rows().enumerate() {
        for (c, data) in row.iter().enumerate() {
            let cell = cell_from_data(data);
            if cell != CellValue::Empty {
                grid.set(row0 as usize + r, col0 as usize + c, cell);
            }
        }
    }
    grid
}

/// Load every sheet of an `.xlsx`/`.xls` workbook
pub fn load_workbook(path: &Path) -> Result<Workbook> {
    require_file(path)?;
    let mut sheets = open_workbook_auto(path)?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let mut workbook = Workbook::new(name);
    for sheet in sheets.sheet_names() {
        let range = sheets.worksheet_range(&sheet)?;
        workbook.insert_sheet(sheet, range_to_grid(&range));
    }
    tracing::debug!(path = %path.display(), sheets = workbook.sheet_names().count(), "Loaded workbook");
    Ok(workbook)
}

/// Load a line CSV (delimiter detected, BOM tolerated)
pub fn load_csv(path: &Path) -> Result<CellGrid> {
    require_file(path)?;
    let bytes = std::fs::read(path)?;
    let grid = decode_csv(&bytes)?;
    tracing::debug!(path = %path.display(), rows = grid.row_count(), "Loaded CSV");
    Ok(grid)
}

/// `<folder>/CI_<model code>.xlsx`, the model code taken from the document title
pub fn asset_workbook_path(folder: &Path, title: &TitleContext) -> Result<PathBuf> {
    let code = title
        .model_code()
        .ok_or_else(|| Error::ModelCodeMissing(title.title().to_string()))?;
    Ok(folder.join(format!("CI_{}.xlsx", code)))
}

/// Paths of the optional inputs
#[derive(Debug, Clone, Default)]
pub struct SourceFiles {
    /// Asset workbook (`CI_<code>.xlsx`) read by asset lookups
    pub assets: Option<PathBuf>,
    /// Reference workbook read by prefix cross-references
    pub reference: Option<PathBuf>,
    /// Line CSV read by line lookups
    pub line_csv: Option<PathBuf>,
}

/// Loaded inputs of one run
#[derive(Debug, Clone, Default)]
pub struct SourceSet {
    /// Workbook holding the mapping sheet and diameter lookup sheets
    pub rules: Workbook,
    pub assets: Option<Workbook>,
    pub reference: Option<Workbook>,
    pub line_csv: Option<CellGrid>,
}

impl SourceSet {
    pub fn new(rules: Workbook) -> Self {
        Self {
            rules,
            ..Self::default()
        }
    }

    pub fn with_assets(mut self, assets: Workbook) -> Self {
        self.assets = Some(assets);
        self
    }

    pub fn with_reference(mut self, reference: Workbook) -> Self {
        self.reference = Some(reference);
        self
    }

    pub fn with_line_csv(mut self, grid: CellGrid) -> Self {
        self.line_csv = Some(grid);
        self
    }

    /// Load the files `rules` depend on, then run [`SourceSet::preflight`]
    pub fn load(rules_workbook: Workbook, files: &SourceFiles, rules: &RuleSet, profile: &MappingProfile) -> Result<Self> {
        let mut set = Self::new(rules_workbook);

        if !rules.asset_sheets().is_empty() {
            let path = files
                .assets
                .as_deref()
                .ok_or(Error::SourceNotConfigured("asset workbook"))?;
            set.assets = Some(load_workbook(path)?);
        }
        if rules.uses_reference_table() {
            let path = files
                .reference
                .as_deref()
                .ok_or(Error::SourceNotConfigured("reference workbook"))?;
            set.reference = Some(load_workbook(path)?);
        }
        if rules.uses_line_table() {
            let path = files
                .line_csv
                .as_deref()
                .ok_or(Error::SourceNotConfigured("line CSV"))?;
            set.line_csv = Some(load_csv(path)?);
        }

        set.preflight(rules, profile)?;
        Ok(set)
    }

    /// Check that every source and sheet referenced by `rules` is present
    pub fn preflight(&self, rules: &RuleSet, profile: &MappingProfile) -> Result<()> {
        for sheet in rules.diameter_sheets() {
            self.rules.require_sheet(sheet)?;
        }

        let asset_sheets = rules.asset_sheets();
        if !asset_sheets.is_empty() {
            let assets = self
                .assets
                .as_ref()
                .ok_or(Error::SourceNotConfigured("asset workbook"))?;
            for sheet in asset_sheets {
                assets.require_sheet(sheet)?;
            }
        }

        if rules.uses_reference_table() {
            self.reference
                .as_ref()
                .ok_or(Error::SourceNotConfigured("reference workbook"))?
                .require_sheet(&profile.reference_sheet)?;
        }

        if rules.uses_line_table() && self.line_csv.is_none() {
            return Err(Error::SourceNotConfigured("line CSV"));
        }

        profile.key_columns()?;
        Ok(())
    }

    /// Sheet of the rules workbook
    pub fn rules_sheet(&self, sheet: &str) -> Option<&CellGrid> {
        self.rules.sheet(sheet)
    }

    /// Sheet of the asset workbook
    pub fn asset_sheet(&self, sheet: &str) -> Option<&CellGrid> {
        self.assets.as_ref()?.sheet(sheet)
    }

    /// Sheet of the reference workbook
    pub fn reference_sheet(&self, sheet: &str) -> Option<&CellGrid> {
        self.reference.as_ref()?.sheet(sheet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paramap_core::parse_rule_sheet;
    use std::io::Write;

    fn rules(rows: Vec<Vec<&str>>) -> RuleSet {
        let mut all = vec![vec!["#", "Parametro", "Codice", "Descrizione"]];
        all.extend(rows);
        parse_rule_sheet(&CellGrid::from_text_rows(all))
    }

    #[test]
    fn test_load_csv_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all("\u{feff}a;b;c\n1;2;3\n".as_bytes()).unwrap();
        let grid = load_csv(file.path()).unwrap();
        assert_eq!(grid.row_count(), 2);
        assert_eq!(grid.text(1, 2), "3");
    }

    #[test]
    fn test_missing_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_workbook(&dir.path().join("missing.xlsx")).unwrap_err();
        assert!(matches!(err, Error::Source(CoreError::MissingSourceFile(_))));
        assert!(load_csv(&dir.path().join("missing.csv")).is_err());
    }

    #[test]
    fn test_asset_workbook_path() {
        let title = TitleContext::new("SNAM-4410_ARC-P-12_34-B01");
        let path = asset_workbook_path(Path::new("/data"), &title).unwrap();
        assert_eq!(path, Path::new("/data").join("CI_4410.xlsx"));
        assert!(asset_workbook_path(Path::new("/data"), &TitleContext::new("nocode")).is_err());
    }

    #[test]
    fn test_preflight_reports_missing_sheet() {
        let set = SourceSet::new(Workbook::new("rules.xlsx"));
        let rule_set = rules(vec![vec!["1", "NP1", "X", "colonna C foglio \"BARRE_GASD\""]]);
        let err = set.preflight(&rule_set, &MappingProfile::pipes()).unwrap_err();
        assert!(err.to_string().contains("BARRE_GASD"));

        let set = SourceSet::new(Workbook::new("rules.xlsx").with_sheet("BARRE_GASD", CellGrid::new()));
        assert!(set.preflight(&rule_set, &MappingProfile::pipes()).is_ok());
    }

    #[test]
    fn test_load_requires_configured_sources() {
        let rule_set = rules(vec![
            vec!["1", "NP1", "P", "colonna H"],
            vec!["2", "CA002_x", "W", "colonna EE foglio \"Report\""],
        ]);
        let err = SourceSet::load(
            Workbook::new("rules.xlsx"),
            &SourceFiles::default(),
            &rule_set,
            &MappingProfile::accessories(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::SourceNotConfigured("asset workbook")));
    }
}
