// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Paramap CLI - spreadsheet-driven parameter mapping.
//!
//! Loads a JSON snapshot of a host document and the rule workbooks, runs one
//! mapping profile and writes the updated snapshot back. `PARAMAP_TOOL=clean`
//! empties the mapped parameters instead, `PARAMAP_TOOL=ifc` fills IFC names
//! and classes. Everything is configured through `PARAMAP_*` environment
//! variables (see [`config`]).
//!
//! The report is printed on stdout, logs go to stderr.

use std::path::Path;

use anyhow::{anyhow, Context};
use paramap_core::{parse_rule_sheet, RuleSet, TitleContext, Workbook};
use paramap_processing::{
    asset_workbook_path, clear_prefixed_parameters, common_parameter_names, load_workbook, map_ifc_classes,
    plan_common_parameters, CleanReport, ElementSource, EvaluationContext, IfcReport, IfcTables, MappingProfile,
    MappingRunner, MemoryDocument, RuleLayout, RunReport, SourceFiles, SourceSet,
};
use serde::Serialize;

mod config;

use config::{Config, Tool};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "info,paramap_processing=debug".into()))
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_env();
    let tool = config
        .tool
        .clone()
        .map_err(|name| anyhow!("unknown tool '{}' (expected map, clean or ifc)", name))?;

    tracing::info!(
        ?tool,
        profile = %config.profile,
        document = %config.document.display(),
        "Starting Paramap"
    );

    match tool {
        Tool::Map => println!("{}", run(&config)?),
        Tool::Clean => println!("{}", clean(&config)?),
        Tool::Ifc => println!("{}", ifc(&config)?),
    }
    Ok(())
}

/// Preset name or path of a JSON profile
fn load_profile(profile: &str) -> anyhow::Result<MappingProfile> {
    if profile.ends_with(".json") {
        let text = std::fs::read_to_string(profile).with_context(|| format!("reading profile {}", profile))?;
        return serde_json::from_str(&text).with_context(|| format!("parsing profile {}", profile));
    }
    MappingProfile::named(profile).ok_or_else(|| {
        anyhow!(
            "unknown profile '{}' (expected pipes, accessories, common or a .json file)",
            profile
        )
    })
}

fn load_rules(
    config: &Config,
    profile: &MappingProfile,
    workbook: &Workbook,
    doc: &MemoryDocument,
    title: &TitleContext,
) -> anyhow::Result<RuleSet> {
    let sheet = workbook.require_sheet(&profile.rules_sheet)?;
    let rules = match profile.rule_layout {
        RuleLayout::MappingSheet => parse_rule_sheet(sheet),
        RuleLayout::CommonParameters => {
            let path = config
                .asset_list
                .as_deref()
                .context("PARAMAP_ASSET_LIST is required to plan common parameters")?;
            let asset_list = load_workbook(path)?;
            plan_common_parameters(sheet, asset_list.require_sheet(&config.asset_list_sheet)?, title, doc.file_name())?
        }
    };

    for rule in rules.rules.iter().filter(|r| r.is_invalid()) {
        tracing::warn!(param = %rule.target, code = %rule.code, kind = ?rule.kind, "Invalid rule");
    }
    tracing::info!(
        sheet = %profile.rules_sheet,
        rules = rules.len(),
        deferred = rules.deferred().count(),
        "Parsed rules"
    );
    Ok(rules)
}

fn run(config: &Config) -> anyhow::Result<RunReport> {
    let mut profile = load_profile(&config.profile)?;
    if let Some(sheet) = &config.rules_sheet {
        profile.rules_sheet = sheet.clone();
    }
    profile.verbose |= config.verbose;

    let mut doc = load_document(config)?;
    let title = TitleContext::new(doc.title());

    let workbook = load_workbook(&config.rules)?;
    let rules = load_rules(config, &profile, &workbook, &doc, &title)?;
    let known_targets = match profile.rule_layout {
        RuleLayout::MappingSheet => workbook
            .sheet(&config.common_sheet)
            .map(common_parameter_names)
            .unwrap_or_default(),
        RuleLayout::CommonParameters => Vec::new(),
    };

    let assets = match &config.asset_folder {
        Some(folder) if !rules.asset_sheets().is_empty() => Some(asset_workbook_path(folder, &title)?),
        _ => None,
    };
    let files = SourceFiles {
        assets,
        reference: config.reference.clone(),
        line_csv: config.line_csv.clone(),
    };
    let sources = SourceSet::load(workbook, &files, &rules, &profile)?;

    let ctx = EvaluationContext::from_host(&doc, &sources, &profile)?;
    let report = MappingRunner::new(ctx)
        .with_known_targets(known_targets)
        .run(&rules, &mut doc)?;

    save_document(config, &doc)?;
    if let Some(path) = &config.report {
        write_report(&report, path)?;
    }
    Ok(report)
}

fn load_document(config: &Config) -> anyhow::Result<MemoryDocument> {
    MemoryDocument::load(&config.document).with_context(|| format!("loading document {}", config.document.display()))
}

fn save_document(config: &Config, doc: &MemoryDocument) -> anyhow::Result<()> {
    let output = config.output_path();
    doc.save(output)
        .with_context(|| format!("writing document {}", output.display()))
}

fn clean(config: &Config) -> anyhow::Result<CleanReport> {
    let mut doc = load_document(config)?;
    let report = clear_prefixed_parameters(&mut doc)?;
    save_document(config, &doc)?;
    if let Some(path) = &config.report {
        write_report(&report, path)?;
    }
    Ok(report)
}

fn ifc(config: &Config) -> anyhow::Result<IfcReport> {
    let workbook = |path: Option<&Path>, var: &str| -> anyhow::Result<Workbook> {
        let path = path.with_context(|| format!("{} is required for the ifc tool", var))?;
        Ok(load_workbook(path)?)
    };
    let names = workbook(config.ifc_names.as_deref(), "PARAMAP_IFC_NAMES")?;
    let placeholders = workbook(config.ifc_placeholders.as_deref(), "PARAMAP_IFC_PLACEHOLDERS")?;
    let classes = workbook(config.ifc_classes.as_deref(), "PARAMAP_IFC_CLASSES")?;
    let tables = IfcTables::from_workbooks(&names, &placeholders, &classes)?;

    let mut doc = load_document(config)?;
    let report = map_ifc_classes(&mut doc, &tables)?;
    save_document(config, &doc)?;
    if let Some(path) = &config.report {
        write_report(&report, path)?;
    }
    Ok(report)
}

fn write_report<T: Serialize>(report: &T, path: &Path) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json).with_context(|| format!("writing report {}", path.display()))?;
    tracing::debug!(path = %path.display(), "Wrote report");
    Ok(())
}
