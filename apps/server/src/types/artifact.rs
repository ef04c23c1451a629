// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! On-disk artifact documents.
//!
//! These are consumed by the viewer as static files, so field names are part
//! of the public contract.

use ifc_catalog_core::{BoundingBox, Catalog, ExtractStats, Point3};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// `components.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentsArtifact {
    #[serde(with = "time::serde::rfc3339")]
    pub generated_at: OffsetDateTime,
    pub model_id: Uuid,
    pub systems: Vec<String>,
    pub count: usize,
    pub components: Vec<ArtifactComponent>,
}

/// One entry of `components.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactComponent {
    pub system_code: String,
    pub component_tag: String,
    pub full_tag: String,
    pub source_guid: Option<String>,
    pub source_type: Option<String>,
    pub name: Option<String>,
    pub floor: Option<String>,
    pub position: Point3,
    pub bounding_box: BoundingBox,
}

impl ComponentsArtifact {
    pub fn new(generated_at: OffsetDateTime, model_id: Uuid, catalog: &Catalog) -> Self {
        let components = catalog
            .entries
            .iter()
            .map(|entry| ArtifactComponent {
                system_code: entry.component.system_code.clone(),
                component_tag: entry.component.component_tag.clone(),
                full_tag: entry.component.full_tag.clone(),
                source_guid: entry.component.source_guid.clone(),
                source_type: entry.component.source_type.clone(),
                name: Some(entry.component.name.clone()),
                floor: None,
                position: entry.placement.position,
                bounding_box: entry.placement.bounding_box,
            })
            .collect::<Vec<_>>();

        Self {
            generated_at,
            model_id,
            systems: catalog.systems.clone(),
            count: components.len(),
            components,
        }
    }
}

/// Progress marker embedded in metadata records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressInfo {
    pub percent: u8,
    pub stage: String,
}

/// `metadata.json`, also stored as the model's progress record once ready.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataArtifact {
    #[serde(with = "time::serde::rfc3339")]
    pub generated_at: OffsetDateTime,
    pub model_id: Uuid,
    pub progress: ProgressInfo,
    pub stats: ArtifactStats,
    pub artifacts: ArtifactLinks,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactStats {
    pub components: usize,
    pub systems: usize,
    pub lines_scanned: u64,
    pub duplicates_dropped: u64,
    pub oversized_lines: u64,
    pub truncated: bool,
}

impl ArtifactStats {
    pub fn new(catalog: &Catalog, extract: &ExtractStats) -> Self {
        Self {
            components: catalog.len(),
            systems: catalog.systems.len(),
            lines_scanned: extract.lines_read,
            duplicates_dropped: extract.duplicates_dropped,
            oversized_lines: extract.oversized_lines,
            truncated: extract.truncated,
        }
    }
}

/// Servable URLs of the generated artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactLinks {
    pub components: String,
    pub metadata: String,
}
