// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # Paramap Processing
//!
//! Runs parsed mapping rules against the elements of a host document.
//!
//! ## Overview
//!
//! - **Host access**: the [`ElementSource`] trait, plus [`MemoryDocument`],
//!   a JSON-backed in-memory host
//! - **Sources**: rule, asset and reference workbooks via
//!   [calamine](https://docs.rs/calamine), line CSV files
//! - **Evaluation**: [`RuleEvaluator`] turns one rule and one element into an
//!   [`Outcome`]
//! - **Runs**: [`MappingRunner`] applies a rule set in two batches and
//!   returns a [`RunReport`]
//! - **Maintenance**: [`clear_prefixed_parameters`] empties mapped parameters,
//!   [`map_ifc_classes`] fills IFC names and export classes
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use paramap_core::parse_rule_sheet;
//! use paramap_processing::*;
//!
//! let mut doc = MemoryDocument::load("model.json".as_ref())?;
//! let workbook = load_workbook("rules.xlsx".as_ref())?;
//! let rules = parse_rule_sheet(workbook.require_sheet("TUBAZIONI")?);
//!
//! let profile = MappingProfile::pipes();
//! let sources = SourceSet::load(workbook, &SourceFiles::default(), &rules, &profile)?;
//! let ctx = EvaluationContext::from_host(&doc, &sources, &profile)?;
//! let report = MappingRunner::new(ctx).run(&rules, &mut doc)?;
//! println!("{}", report);
//! ```

pub mod clean;
pub mod common;
pub mod context;
pub mod error;
pub mod evaluator;
pub mod host;
pub mod ifc;
pub mod memory;
pub mod profile;
pub mod report;
pub mod runner;
pub mod sources;

pub use clean::{clear_parameters, clear_prefixed_parameters, CleanReport, ClearedParameter, MAPPED_PREFIXES};
pub use common::{common_parameter_names, plan_common_parameters, ASSET_LIST_SHEET, COMMON_SHEET};
pub use context::{reference_level, EvaluationContext};
pub use error::{Error, HostError, Result, RunError};
pub use evaluator::{Outcome, RuleEvaluator, SkipReason};
pub use host::{Attribute, AttributeValue, ElementId, ElementSource, StorageKind, WriteValue};
pub use ifc::{map_ifc_classes, IfcAssignment, IfcReport, IfcTables};
pub use memory::{MemoryDocument, MemoryElement, MemoryLevel};
pub use profile::{MappingProfile, MissingTargetPolicy, NotConfiguredPolicy, PrefixCase, PrefixSource, RuleLayout};
pub use report::{RunPhase, RunReport, RunWarning, SkipNote};
pub use runner::{MappingRunner, PHASE1_BATCH, PHASE2_BATCH};
pub use sources::{asset_workbook_path, load_csv, load_workbook, SourceFiles, SourceSet};
