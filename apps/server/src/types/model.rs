// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Model and component records.

use ifc_catalog_core::{BoundingBox, CatalogEntry, Point3};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

/// Declared model format. Only IFC can be converted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ModelFormat {
    Ifc,
    Rvt,
    Nwd,
}

impl ModelFormat {
    /// Every declared format, in extension lookup order.
    pub const ALL: [ModelFormat; 3] = [ModelFormat::Ifc, ModelFormat::Rvt, ModelFormat::Nwd];

    /// Lowercase file extension without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            ModelFormat::Ifc => "ifc",
            ModelFormat::Rvt => "rvt",
            ModelFormat::Nwd => "nwd",
        }
    }

    /// Case-insensitive extension lookup.
    pub fn from_extension(ext: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|format| format.extension().eq_ignore_ascii_case(ext))
    }

    pub fn is_processable(self) -> bool {
        matches!(self, ModelFormat::Ifc)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ModelFormat::Ifc => "IFC",
            ModelFormat::Rvt => "RVT",
            ModelFormat::Nwd => "NWD",
        }
    }
}

impl fmt::Display for ModelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|format| format.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown model format: {}", s))
    }
}

/// Conversion lifecycle: `PENDING -> CONVERTING -> READY | ERROR`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModelStatus {
    Pending,
    Converting,
    Ready,
    Error,
}

impl ModelStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ModelStatus::Pending => "PENDING",
            ModelStatus::Converting => "CONVERTING",
            ModelStatus::Ready => "READY",
            ModelStatus::Error => "ERROR",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ModelStatus::Ready | ModelStatus::Error)
    }
}

impl fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(ModelStatus::Pending),
            "CONVERTING" => Ok(ModelStatus::Converting),
            "READY" => Ok(ModelStatus::Ready),
            "ERROR" => Ok(ModelStatus::Error),
            other => Err(format!("unknown model status: {}", other)),
        }
    }
}

/// An uploaded building model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    pub id: Uuid,
    pub project_id: Uuid,
    pub file_name: String,
    pub format: ModelFormat,
    pub status: ModelStatus,
    pub error_message: Option<String>,
    /// Durable progress/metadata record, replaced on every status transition.
    pub metadata: Value,
    /// Servable path of the generated components catalog.
    pub components_url: Option<String>,
    /// Original upload, relative to the project root.
    pub original_path: String,
    pub size_bytes: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Model {
    /// A freshly uploaded model awaiting conversion.
    pub fn pending(
        id: Uuid,
        project_id: Uuid,
        file_name: impl Into<String>,
        format: ModelFormat,
        original_path: impl Into<String>,
        size_bytes: u64,
    ) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id,
            project_id,
            file_name: file_name.into(),
            format,
            status: ModelStatus::Pending,
            error_message: None,
            metadata: Value::Object(Default::default()),
            components_url: None,
            original_path: original_path.into(),
            size_bytes,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a status transition in place.
    pub fn apply(&mut self, update: StatusUpdate) {
        self.status = update.status;
        self.error_message = update.error_message;
        if let Some(metadata) = update.metadata {
            self.metadata = metadata;
        }
        if let Some(url) = update.components_url {
            self.components_url = Some(url);
        }
        self.updated_at = OffsetDateTime::now_utc();
    }
}

/// A status transition written to the registry.
///
/// `error_message` always overwrites (so `None` clears it); `metadata` and
/// `components_url` are left untouched when `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub status: ModelStatus,
    pub error_message: Option<String>,
    pub metadata: Option<Value>,
    pub components_url: Option<String>,
}

impl StatusUpdate {
    pub fn converting(metadata: Value) -> Self {
        Self {
            status: ModelStatus::Converting,
            error_message: None,
            metadata: Some(metadata),
            components_url: None,
        }
    }

    pub fn ready(components_url: String, metadata: Value) -> Self {
        Self {
            status: ModelStatus::Ready,
            error_message: None,
            metadata: Some(metadata),
            components_url: Some(components_url),
        }
    }

    pub fn error(message: impl Into<String>, metadata: Value) -> Self {
        Self {
            status: ModelStatus::Error,
            error_message: Some(message.into()),
            metadata: Some(metadata),
            components_url: None,
        }
    }
}

/// A catalogued component of a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    pub id: Uuid,
    pub model_id: Uuid,
    pub system_code: String,
    pub component_tag: String,
    pub full_tag: String,
    pub source_guid: Option<String>,
    pub source_type: Option<String>,
    pub name: Option<String>,
    pub floor: Option<String>,
    pub position: Point3,
    pub bounding_box: BoundingBox,
    pub properties: Value,
}

impl Component {
    /// Build the stored record for a catalog entry.
    pub fn from_entry(model_id: Uuid, entry: &CatalogEntry) -> Self {
        let c = &entry.component;
        Self {
            id: Uuid::new_v4(),
            model_id,
            system_code: c.system_code.clone(),
            component_tag: c.component_tag.clone(),
            full_tag: c.full_tag.clone(),
            source_guid: c.source_guid.clone(),
            source_type: c.source_type.clone(),
            name: Some(c.name.clone()),
            floor: None,
            position: entry.placement.position,
            bounding_box: entry.placement.bounding_box,
            properties: serde_json::json!({
                "source": c.provenance,
                "systemIndex": entry.system_index,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_lookup() {
        assert_eq!(ModelFormat::from_extension("IFC"), Some(ModelFormat::Ifc));
        assert_eq!(ModelFormat::from_extension("rvt"), Some(ModelFormat::Rvt));
        assert_eq!(ModelFormat::from_extension("dwg"), None);
        assert_eq!("nwd".parse::<ModelFormat>().unwrap(), ModelFormat::Nwd);
        assert!(ModelFormat::Ifc.is_processable());
        assert!(!ModelFormat::Rvt.is_processable());
        assert!(!ModelFormat::Nwd.is_processable());
    }

    #[test]
    fn test_status_round_trip_strings() {
        for status in [
            ModelStatus::Pending,
            ModelStatus::Converting,
            ModelStatus::Ready,
            ModelStatus::Error,
        ] {
            assert_eq!(status.as_str().parse::<ModelStatus>().unwrap(), status);
        }
        assert_eq!(serde_json::to_value(ModelStatus::Converting).unwrap(), "CONVERTING");
    }

    #[test]
    fn test_apply_keeps_pointer_on_error() {
        let mut model = Model::pending(Uuid::new_v4(), Uuid::new_v4(), "a.ifc", ModelFormat::Ifc, "x", 1);
        model.apply(StatusUpdate::ready("/uploads/a.json".into(), serde_json::json!({"ok": true})));
        model.apply(StatusUpdate::error("boom", serde_json::json!({})));
        assert_eq!(model.status, ModelStatus::Error);
        assert_eq!(model.error_message.as_deref(), Some("boom"));
        assert_eq!(model.components_url.as_deref(), Some("/uploads/a.json"));

        model.apply(StatusUpdate::converting(serde_json::json!({})));
        assert_eq!(model.error_message, None);
    }
}
