// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Project-wide parameters
//!
//! The common-parameters sheet lists, per parameter, either a literal or a
//! `colonna <L>` reference into the asset list. The asset row is picked once
//! from the building code in the document title, so every parameter turns
//! into a constant rule applied to all elements.

use paramap_core::{leading_column, normalize_literal, CellGrid, Rule, RuleKind, RuleSet, TitleContext};

use crate::error::{Error, Result};

/// Sheet of the rules workbook listing the common parameters
pub const COMMON_SHEET: &str = "PARAMETRI COMUNI";
/// Sheet of the asset list workbook
pub const ASSET_LIST_SHEET: &str = "Lista Asset Affidamento";

const NAME_COLUMN: usize = 1;
const RULE_COLUMN: usize = 2;
/// Building code column of the asset list (F)
const BUILDING_COLUMN: usize = 5;
/// Plant type column of the asset list (J)
const PLANT_TYPE_COLUMN: usize = 9;

/// Only parameters with this prefix are mapped
const PARAMETER_PREFIX: &str = "NP";

/// Asset list row for the building, preferring one whose plant type occurs in `file_name`
fn select_asset_row(asset_list: &CellGrid, building: &str, file_name: &str) -> Option<usize> {
    let rows: Vec<usize> = asset_list
        .data_rows()
        .filter(|&r| asset_list.cell(r, BUILDING_COLUMN).as_text() == building)
        .collect();

    rows.iter()
        .copied()
        .find(|&r| {
            let plant = asset_list.text(r, PLANT_TYPE_COLUMN);
            !plant.is_empty() && file_name.contains(plant.as_str())
        })
        .or_else(|| rows.first().copied())
}

/// Parameter names listed on the common-parameters sheet
pub fn common_parameter_names(common_sheet: &CellGrid) -> Vec<String> {
    common_sheet
        .data_rows()
        .map(|r| common_sheet.text(r, NAME_COLUMN))
        .filter(|name| name.starts_with(PARAMETER_PREFIX))
        .collect()
}

/// Turn the common-parameters sheet into constant rules for this document
pub fn plan_common_parameters(
    common_sheet: &CellGrid,
    asset_list: &CellGrid,
    title: &TitleContext,
    file_name: &str,
) -> Result<RuleSet> {
    let building = title.line_segment().trim();
    if building.is_empty() {
        return Err(Error::BuildingCodeMissing(title.title().to_string()));
    }
    let row = select_asset_row(asset_list, building, file_name)
        .ok_or_else(|| Error::BuildingNotFound(building.to_string()))?;
    tracing::debug!(building, row = row + 1, "Selected asset list row");

    let mut rules = Vec::new();
    for r in common_sheet.data_rows() {
        let name = common_sheet.text(r, NAME_COLUMN);
        if !name.starts_with(PARAMETER_PREFIX) {
            continue;
        }
        let text = common_sheet.text(r, RULE_COLUMN);
        let value = match leading_column(&text) {
            Some(column) => asset_list.cell(row, column).normalized(),
            None => normalize_literal(&text),
        };
        rules.push(Rule {
            target: name,
            code: "C".to_string(),
            raw_text: text,
            kind: RuleKind::Constant { value },
        });
    }

    tracing::info!(parameters = rules.len(), building, "Planned common parameters");
    Ok(RuleSet::new(rules))
}
