// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-run evaluation context.

use paramap_core::TitleContext;

use crate::error::Result;
use crate::host::ElementSource;
use crate::profile::{KeyColumns, MappingProfile};
use crate::sources::SourceSet;

/// Levels within this distance of the project base point count as matching it
pub const LEVEL_MATCH_TOLERANCE: f64 = 1e-4;

/// Read-only inputs shared by every element of a run
#[derive(Debug, Clone)]
pub struct EvaluationContext<'a> {
    pub title: TitleContext,
    pub sources: &'a SourceSet,
    pub profile: &'a MappingProfile,
    pub columns: KeyColumns,
    /// Elevation of the level matched to the project base point
    pub reference_level: Option<f64>,
}

impl<'a> EvaluationContext<'a> {
    pub fn new(
        title: TitleContext,
        sources: &'a SourceSet,
        profile: &'a MappingProfile,
        reference_level: Option<f64>,
    ) -> Result<Self> {
        Ok(Self {
            title,
            sources,
            profile,
            columns: profile.key_columns()?,
            reference_level,
        })
    }

    /// Build the context from the active document
    pub fn from_host<H: ElementSource + ?Sized>(
        host: &H,
        sources: &'a SourceSet,
        profile: &'a MappingProfile,
    ) -> Result<Self> {
        let reference = reference_level(host.project_base_point_elevation(), &host.level_elevations());
        tracing::debug!(
            title = host.title(),
            reference_level = ?reference,
            "Built evaluation context"
        );
        Self::new(TitleContext::new(host.title()), sources, profile, reference)
    }
}

/// First level within [`LEVEL_MATCH_TOLERANCE`] of the base point, else the closest one
pub fn reference_level(base_point: Option<f64>, levels: &[f64]) -> Option<f64> {
    let base = base_point?;
    let mut closest: Option<(f64, f64)> = None;
    for &level in levels {
        let distance = (level - base).abs();
        if distance < LEVEL_MATCH_TOLERANCE {
            return Some(level);
        }
        if closest.map_or(true, |(best, _)| distance < best) {
            closest = Some((distance, level));
        }
    }
    closest.map(|(_, level)| level)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_level_prefers_match() {
        assert_eq!(reference_level(Some(0.0), &[3.0, 0.00005, -1.0]), Some(0.00005));
        assert_eq!(reference_level(Some(10.0), &[3.0, 12.0, 7.5]), Some(12.0));
        assert_eq!(reference_level(None, &[0.0]), None);
        assert_eq!(reference_level(Some(0.0), &[]), None);
    }
}
