// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Rule description parser using nom
//!
//! Descriptions are free text typed into a spreadsheet cell, so the grammar
//! is scanned rather than anchored: `colonna F foglio "BARRE"` and
//! `vedi foglio "BARRE", colonna F` both yield the same column and sheet.
//! Parsing never fails; malformed text becomes [`RuleKind::Invalid`].

use nom::{
    bytes::complete::{tag_no_case, take_while, take_while1},
    character::complete::{alpha1, char, multispace0, multispace1},
    combinator::map_opt,
    sequence::{delimited, pair, preceded, separated_pair, tuple},
    IResult,
};

use crate::grid::{column_index, CellGrid, CellValue};
use crate::rule::{ElevationChoice, Rule, RuleCode, RuleKind, RuleSet, TypeAlternative};

/// Column of the rule target in the mapping sheet (B)
pub const TARGET_COLUMN: usize = 1;
/// Column of the rule code (C)
pub const CODE_COLUMN: usize = 2;
/// Column of the rule description (D)
pub const DESCRIPTION_COLUMN: usize = 3;

/// Parse double-quoted text: "NP100"
fn quoted(input: &str) -> IResult<&str, &str> {
    delimited(char('"'), take_while1(|c: char| c != '"'), char('"'))(input)
}

/// Parse parenthesized text: (value)
fn parenthesized(input: &str) -> IResult<&str, &str> {
    delimited(char('('), take_while1(|c: char| c != ')'), char(')'))(input)
}

/// Parse a type alternative with its value: [TYPE1|TYPE2](value)
fn bracketed_pair(input: &str) -> IResult<&str, (&str, &str)> {
    let (rest, (key, _, value)) = tuple((
        delimited(char('['), take_while1(|c: char| c != ']'), char(']')),
        multispace0,
        delimited(char('('), take_while(|c: char| c != ')'), char(')')),
    ))(input)?;
    Ok((rest, (key, value)))
}

/// Parse a source/output pair: (srcVal,outVal)
fn value_pair(input: &str) -> IResult<&str, (&str, &str)> {
    delimited(
        char('('),
        separated_pair(
            take_while1(|c: char| c != ',' && c != '(' && c != ')'),
            char(','),
            take_while(|c: char| c != '(' && c != ')'),
        ),
        char(')'),
    )(input)
}

/// Parse an output column reference: colonna F
fn column_ref(input: &str) -> IResult<&str, &str> {
    preceded(pair(tag_no_case("colonna"), multispace1), alpha1)(input)
}

/// Parse a sheet reference: foglio "BARRE_GASD"
fn sheet_ref(input: &str) -> IResult<&str, &str> {
    preceded(pair(tag_no_case("foglio"), multispace1), quoted)(input)
}

/// Apply `parser` at every position of `input`, collecting non-overlapping matches
fn scan_all<'a, O>(mut input: &'a str, mut parser: impl FnMut(&'a str) -> IResult<&'a str, O>) -> Vec<O> {
    let mut found = Vec::new();
    while !input.is_empty() {
        match parser(input) {
            Ok((rest, out)) => {
                found.push(out);
                input = rest;
            }
            Err(_) => {
                let mut chars = input.chars();
                chars.next();
                input = chars.as_str();
            }
        }
    }
    found
}

/// First match of `parser` anywhere in `input`
fn scan_first<'a, O>(mut input: &'a str, mut parser: impl FnMut(&'a str) -> IResult<&'a str, O>) -> Option<O> {
    while !input.is_empty() {
        if let Ok((_, out)) = parser(input) {
            return Some(out);
        }
        let mut chars = input.chars();
        chars.next();
        input = chars.as_str();
    }
    None
}

fn owned(items: Vec<&str>) -> Vec<String> {
    items.into_iter().map(|s| s.trim().to_string()).collect()
}

fn invalid(reason: impl Into<String>) -> RuleKind {
    RuleKind::Invalid {
        reason: reason.into(),
    }
}

/// First `colonna <L>` whose label is a real column; longer words are passed over
fn output_column(desc: &str) -> Option<usize> {
    scan_first(desc, map_opt(column_ref, column_index))
}

/// Column named at the very start of `text` (`colonna H ...`), if any
pub fn leading_column(text: &str) -> Option<usize> {
    column_ref(text.trim_start()).ok().and_then(|(_, letters)| column_index(letters))
}

/// Parse one row of the mapping sheet into a rule
///
/// Returns `None` only when the target cell is empty; every other problem
/// produces a rule that is skipped at evaluation time.
pub fn parse_rule(target: &str, code: &str, description: &CellValue) -> Option<Rule> {
    let target = target.trim();
    if target.is_empty() {
        return None;
    }

    let code = code.trim().to_ascii_uppercase();
    let desc = description.as_text();

    let kind = match RuleCode::from_str(&code) {
        Some(rule_code) => parse_kind(rule_code, target, description, &desc),
        None if code.is_empty() => invalid("missing rule code"),
        None => invalid(format!("unknown rule code '{}'", code)),
    };

    Some(Rule {
        target: target.to_string(),
        code,
        raw_text: desc,
        kind,
    })
}

fn parse_kind(code: RuleCode, target: &str, description: &CellValue, desc: &str) -> RuleKind {
    match code {
        RuleCode::Constant => RuleKind::Constant {
            value: description.normalized(),
        },
        RuleCode::NotConfigured => RuleKind::NotConfigured,
        RuleCode::DiameterLookup => match (output_column(desc), scan_first(desc, sheet_ref)) {
            (Some(column), Some(sheet)) => RuleKind::DiameterLookup {
                sheet: sheet.trim().to_string(),
                column,
            },
            _ => invalid("expected `colonna <COL> foglio \"<SHEET>\"`"),
        },
        RuleCode::AssetLookup => match (output_column(desc), scan_first(desc, sheet_ref)) {
            (Some(column), Some(sheet)) => RuleKind::AssetLookup {
                sheet: sheet.trim().to_string(),
                column,
                prefix: target
                    .split('_')
                    .next()
                    .unwrap_or(target)
                    .to_ascii_uppercase(),
            },
            _ => invalid("expected `colonna <COL> foglio \"<SHEET>\"`"),
        },
        RuleCode::PrefixReference => match output_column(desc) {
            Some(column) => RuleKind::PrefixReference { column },
            None => invalid("expected `colonna <COL>`"),
        },
        RuleCode::LineLookup => match output_column(desc) {
            Some(column) => RuleKind::LineLookup { column },
            None => invalid("expected `colonna <COL>`"),
        },
        RuleCode::UnitCopy => match desc.trim() {
            "" => invalid("missing source parameter"),
            source => RuleKind::UnitCopy {
                source: source.to_string(),
            },
        },
        RuleCode::NamedCopy => match desc.trim() {
            "" => invalid("missing source parameter"),
            source => RuleKind::NamedCopy {
                source: source.to_string(),
            },
        },
        RuleCode::TitleBranch => {
            let keys = owned(scan_all(desc, quoted));
            let values = owned(scan_all(desc, parenthesized));
            if keys.is_empty() || values.is_empty() {
                return invalid("expected `\"<key>\"... (<match>)(<otherwise>)`");
            }
            let mut values = values.into_iter();
            RuleKind::TitleBranch {
                keys,
                matched: values.next().unwrap_or_default(),
                otherwise: values.next().unwrap_or_default(),
            }
        }
        RuleCode::ElevationBranch => parse_elevation_choice(desc),
        RuleCode::ValueMap => {
            let Some(source) = scan_first(desc, quoted) else {
                return invalid("missing quoted source parameter");
            };
            let pairs: Vec<(String, String)> = scan_all(desc, value_pair)
                .into_iter()
                .map(|(from, to)| (from.trim().to_string(), to.trim().to_string()))
                .collect();
            if pairs.is_empty() {
                return invalid("expected `(<source>,<output>)` pairs");
            }
            RuleKind::ValueMap {
                source: source.trim().to_string(),
                pairs,
            }
        }
        RuleCode::FamilyTypeTable => {
            let families = owned(scan_all(desc, quoted));
            if families.is_empty() {
                return invalid("missing quoted family keys");
            }
            let alternatives = scan_all(desc, bracketed_pair)
                .into_iter()
                .map(|(key, value)| TypeAlternative {
                    prefixes: key
                        .split(['|', ',', ';', '/'])
                        .map(|a| a.trim().to_uppercase())
                        .filter(|a| !a.is_empty())
                        .collect(),
                    raw: key.trim().to_uppercase(),
                    value: value.trim().to_string(),
                })
                .collect();
            RuleKind::FamilyTypeTable {
                families,
                alternatives,
            }
        }
        RuleCode::ShadowCopy => RuleKind::ShadowCopy,
        RuleCode::SourceCondition => parse_source_condition(desc),
        RuleCode::FamilyPrefixConstant => {
            let prefixes = owned(scan_all(desc, quoted));
            if prefixes.is_empty() {
                return invalid("missing quoted family prefixes");
            }
            RuleKind::FamilyPrefixConstant {
                prefixes,
                value: scan_first(desc, parenthesized)
                    .map(|v| v.trim().to_string())
                    .unwrap_or_default(),
            }
        }
        RuleCode::FamilyMembership => {
            let families = owned(scan_all(desc, quoted));
            if families.is_empty() {
                return invalid("missing quoted family names");
            }
            RuleKind::FamilyMembership { families }
        }
        RuleCode::FamilyPrefixChoice => {
            let prefixes = owned(scan_all(desc, quoted));
            if prefixes.is_empty() {
                return invalid("missing quoted family prefixes");
            }
            let mut values = owned(scan_all(desc, parenthesized)).into_iter();
            RuleKind::FamilyPrefixChoice {
                prefixes,
                matched: values.next().unwrap_or_default(),
                otherwise: values.next().unwrap_or_default(),
            }
        }
        RuleCode::LevelDelta => RuleKind::LevelDelta,
    }
}

fn parse_elevation_choice(desc: &str) -> RuleKind {
    if desc.trim().is_empty() {
        return invalid("expected `<below>;<otherwise>`");
    }

    let parts: Vec<&str> = desc.split(';').map(str::trim).collect();
    if parts.len() >= 3 {
        return RuleKind::ElevationBranch(ElevationChoice::ThreeWay {
            above: parts[0].to_string(),
            level: parts[1].to_string(),
            below: parts[2].to_string(),
        });
    }

    let (below, otherwise) = desc.split_once(';').unwrap_or((desc, ""));
    RuleKind::ElevationBranch(ElevationChoice::Split {
        below: below.trim().to_string(),
        otherwise: otherwise.trim().to_string(),
    })
}

/// `"<source>" cond1 (val1) - cond2 [val2] - default (valD)`
fn parse_source_condition(desc: &str) -> RuleKind {
    let Ok((rest, source)) = preceded(multispace0, quoted)(desc) else {
        return invalid("missing quoted source parameter");
    };

    // a repeated condition overrides the earlier one
    let mut branches: Vec<(String, String)> = Vec::new();
    let mut default = None;
    for (condition, value) in condition_branches(rest) {
        if condition == "default" {
            default = Some(value);
        } else if let Some(existing) = branches.iter_mut().find(|(c, _)| *c == condition) {
            existing.1 = value;
        } else {
            branches.push((condition, value));
        }
    }

    if branches.is_empty() && default.is_none() {
        return invalid("no conditions found");
    }

    RuleKind::SourceCondition {
        source: source.trim().to_string(),
        branches,
        default,
    }
}

/// Split `cond (value) - cond [value] - ...` into lower-cased conditions and values.
///
/// A value ends at the first closing delimiter followed by `-` or the end of
/// the text, so values may themselves contain parentheses.
fn condition_branches(mut input: &str) -> Vec<(String, String)> {
    let mut branches = Vec::new();

    loop {
        input = input.trim_start().trim_start_matches('-').trim_start();
        let Some(open) = input.find(|c: char| c == '(' || c == '[') else {
            break;
        };
        let close = if input.as_bytes()[open] == b'(' { ')' } else { ']' };
        let condition = input[..open]
            .rsplit('-')
            .next()
            .unwrap_or("")
            .trim()
            .to_lowercase();

        let body = &input[open + 1..];
        let Some(end) = value_end(body, close) else {
            break;
        };
        // blank values are kept so a matching condition can report them
        let value = body[..end].trim();
        if !condition.is_empty() {
            branches.push((condition, value.to_string()));
        }
        input = &body[end + close.len_utf8()..];
    }

    branches
}

fn value_end(body: &str, close: char) -> Option<usize> {
    body.match_indices(close).map(|(i, _)| i).find(|&i| {
        let after = body[i + close.len_utf8()..].trim_start();
        i > 0 && (after.is_empty() || after.starts_with('-'))
    })
}

/// Parse every row of a mapping sheet (row 0 is the header)
pub fn parse_rule_sheet(grid: &CellGrid) -> RuleSet {
    grid.data_rows()
        .filter_map(|row| {
            parse_rule(
                &grid.cell(row, TARGET_COLUMN).as_text(),
                &grid.cell(row, CODE_COLUMN).as_text(),
                grid.cell(row, DESCRIPTION_COLUMN),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    fn kind(code: &str, desc: &str) -> RuleKind {
        parse_rule("NP100_x", code, &text(desc)).unwrap().kind
    }

    #[test]
    fn test_leading_column_is_anchored() {
        assert_eq!(leading_column("colonna H"), Some(7));
        assert_eq!(leading_column("  Colonna  ab resto"), Some(27));
        assert_eq!(leading_column("vedi colonna H"), None);
        assert_eq!(leading_column("Acciaio"), None);
    }

    #[test]
    fn test_quoted_and_parenthesized() {
        assert_eq!(quoted("\"abc\" rest"), Ok((" rest", "abc")));
        assert!(quoted("\"\"").is_err());
        assert_eq!(parenthesized("(Si)x"), Ok(("x", "Si")));
        assert_eq!(bracketed_pair("[AB|CD] (v)"), Ok(("", ("AB|CD", "v"))));
        assert_eq!(value_pair("(a,b)"), Ok(("", ("a", "b"))));
    }

    #[test]
    fn test_column_and_sheet_refs() {
        assert_eq!(column_ref("Colonna  AB"), Ok(("", "AB")));
        assert_eq!(sheet_ref("foglio \"BARRE_GASD\""), Ok(("", "BARRE_GASD")));
        assert_eq!(scan_first("vedi foglio \"X\", colonna F", column_ref), Some("F"));
    }

    #[test]
    fn test_empty_target_skips_row() {
        assert!(parse_rule("  ", "C", &text("x")).is_none());
    }

    #[test]
    fn test_constant_normalizes_numbers() {
        assert_eq!(kind("C", "Steel"), RuleKind::Constant { value: "Steel".into() });
        assert_eq!(kind("c", "100.0"), RuleKind::Constant { value: "100".into() });
        let numeric = parse_rule("A", "C", &CellValue::Number(12.0)).unwrap();
        assert_eq!(numeric.kind, RuleKind::Constant { value: "12".into() });
    }

    #[test]
    fn test_diameter_lookup() {
        assert_eq!(
            kind("X", "colonna F foglio \"BARRE_GASD\""),
            RuleKind::DiameterLookup { sheet: "BARRE_GASD".into(), column: 5 }
        );
        assert!(matches!(kind("X", "colonna F"), RuleKind::Invalid { .. }));
    }

    #[test]
    fn test_long_word_after_colonna_is_not_a_column() {
        assert!(matches!(kind("J", "colonna Caratteristiche"), RuleKind::Invalid { .. }));
        assert!(matches!(kind("P", "colonna Caratteristiche"), RuleKind::Invalid { .. }));
        assert_eq!(
            kind("P", "colonna Caratteristiche, altrimenti colonna H"),
            RuleKind::LineLookup { column: 7 }
        );
        assert_eq!(leading_column("colonna Caratteristiche"), None);
    }

    #[test]
    fn test_asset_lookup_prefix() {
        let rule = parse_rule("ca002_pressione", "W", &text("colonna EE foglio \"Report\"")).unwrap();
        assert_eq!(
            rule.kind,
            RuleKind::AssetLookup { sheet: "Report".into(), column: 134, prefix: "CA002".into() }
        );
    }

    #[test]
    fn test_title_branch() {
        assert_eq!(
            kind("G", "\"B01\" \"B02\" (Si)(No)"),
            RuleKind::TitleBranch {
                keys: vec!["B01".into(), "B02".into()],
                matched: "Si".into(),
                otherwise: "No".into(),
            }
        );
        assert!(matches!(kind("G", "(Si)(No)"), RuleKind::Invalid { .. }));
        assert!(matches!(kind("G", "\"B01\" Si No"), RuleKind::Invalid { .. }));
    }

    #[test]
    fn test_elevation_choice() {
        assert_eq!(
            kind("K", "Alta;Bassa"),
            RuleKind::ElevationBranch(ElevationChoice::Split {
                below: "Alta".into(),
                otherwise: "Bassa".into()
            })
        );
        assert_eq!(
            kind("K", "Aerea; Fuori terra ;Interrata"),
            RuleKind::ElevationBranch(ElevationChoice::ThreeWay {
                above: "Aerea".into(),
                level: "Fuori terra".into(),
                below: "Interrata".into(),
            })
        );
        assert_eq!(
            kind("K", "Aerea;Piano;Interrata;"),
            RuleKind::ElevationBranch(ElevationChoice::ThreeWay {
                above: "Aerea".into(),
                level: "Piano".into(),
                below: "Interrata".into(),
            })
        );
        assert_eq!(
            kind("K", "Solo"),
            RuleKind::ElevationBranch(ElevationChoice::Split {
                below: "Solo".into(),
                otherwise: String::new()
            })
        );
        assert!(matches!(kind("K", ""), RuleKind::Invalid { .. }));
    }

    #[test]
    fn test_value_map() {
        assert_eq!(
            kind("M", "\"NP200_tipo\" (A,Acciaio) (P, Polietilene)"),
            RuleKind::ValueMap {
                source: "NP200_tipo".into(),
                pairs: vec![("A".into(), "Acciaio".into()), ("P".into(), "Polietilene".into())],
            }
        );
        assert!(matches!(kind("M", "(A,B)"), RuleKind::Invalid { .. }));
        assert!(matches!(kind("M", "\"NP200\""), RuleKind::Invalid { .. }));
    }

    #[test]
    fn test_family_type_table() {
        let parsed = kind("N", "\"AP001\" \"AP002\" [VALV01|VALV02](Sfera) [ / ](Altro)");
        let RuleKind::FamilyTypeTable { families, alternatives } = parsed else {
            panic!("expected family/type table");
        };
        assert_eq!(families, vec!["AP001", "AP002"]);
        assert_eq!(alternatives[0].prefixes, vec!["VALV01", "VALV02"]);
        assert_eq!(alternatives[0].value, "Sfera");
        assert!(alternatives[1].prefixes.is_empty());
        assert_eq!(alternatives[1].raw, "/");
    }

    #[test]
    fn test_source_condition_with_parentheses() {
        let parsed = kind(
            "L",
            "\"NP100_x\" alta (Alta pressione (AP)) - bassa [BP] - default (N/D)",
        );
        assert_eq!(
            parsed,
            RuleKind::SourceCondition {
                source: "NP100_x".into(),
                branches: vec![
                    ("alta".into(), "Alta pressione (AP)".into()),
                    ("bassa".into(), "BP".into()),
                ],
                default: Some("N/D".into()),
            }
        );
        assert!(matches!(kind("L", "alta (x)"), RuleKind::Invalid { .. }));
        assert!(matches!(kind("L", "\"NP100\" nothing"), RuleKind::Invalid { .. }));
    }

    #[test]
    fn test_source_condition_repeats_keep_last() {
        assert_eq!(
            kind("L", "\"NP100\" alta (A1) - bassa (B) - ALTA (A2) - default (D1) - default (D2)"),
            RuleKind::SourceCondition {
                source: "NP100".into(),
                branches: vec![("alta".into(), "A2".into()), ("bassa".into(), "B".into())],
                default: Some("D2".into()),
            }
        );
    }

    #[test]
    fn test_family_rules() {
        assert_eq!(
            kind("D", "\"AP01\" \"AP02\" (Valvola)"),
            RuleKind::FamilyPrefixConstant {
                prefixes: vec!["AP01".into(), "AP02".into()],
                value: "Valvola".into()
            }
        );
        assert_eq!(
            kind("E", "\"AP01_Sfera\""),
            RuleKind::FamilyMembership { families: vec!["AP01_Sfera".into()] }
        );
        assert_eq!(
            kind("F", "\"AP01\" (Si)"),
            RuleKind::FamilyPrefixChoice {
                prefixes: vec!["AP01".into()],
                matched: "Si".into(),
                otherwise: String::new()
            }
        );
    }

    #[test]
    fn test_unknown_code_degrades() {
        let rule = parse_rule("NP1", "Q", &text("whatever")).unwrap();
        assert!(rule.is_invalid());
        assert_eq!(rule.code, "Q");
        let missing = parse_rule("NP1", "", &text("whatever")).unwrap();
        assert!(missing.is_invalid());
    }

    #[test]
    fn test_parse_rule_sheet() {
        let grid = CellGrid::from_text_rows(vec![
            vec!["#", "Parametro", "Codice", "Descrizione"],
            vec!["1", "NP100_material", "C", "Steel"],
            vec!["2", "", "C", "ignored"],
            vec!["3", "NP101_stato", "l", "\"NP100_material\" steel (Acciaio)"],
            vec!["4", "NP102", "N/C", ""],
        ]);
        let rules = parse_rule_sheet(&grid);
        assert_eq!(rules.len(), 3);
        assert_eq!(rules.rules[0].target, "NP100_material");
        assert!(rules.rules[1].is_deferred());
        assert_eq!(rules.rules[2].kind, RuleKind::NotConfigured);
    }
}
