// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Response types for the API.

use super::{Component, Model, ModelStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Component list for one model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentListResponse {
    pub model_id: Uuid,
    pub count: usize,
    pub components: Vec<Component>,
}

/// Models of a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelListResponse {
    pub models: Vec<Model>,
}

/// Outcome of a conversion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Enqueued {
    /// A new job was scheduled.
    Started,
    /// A job for this model is already running; it will run once more afterwards.
    Coalesced,
}

/// Response to a conversion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertResponse {
    pub model_id: Uuid,
    pub enqueued: Enqueued,
}

/// Conversion stage reported on the progress channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Queued,
    Extracting,
    Extracted,
    Persisting,
    Persisted,
    WritingArtifacts,
    Ready,
    Failed,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Queued => "queued",
            Stage::Extracting => "extracting",
            Stage::Extracted => "extracted",
            Stage::Persisting => "persisting",
            Stage::Persisted => "persisted",
            Stage::WritingArtifacts => "writing_artifacts",
            Stage::Ready => "ready",
            Stage::Failed => "failed",
        }
    }
}

/// Ephemeral progress tick, published to subscribers and never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub project_id: Uuid,
    pub model_id: Uuid,
    pub status: ModelStatus,
    pub stage: Stage,
    pub percent: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
