// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Model upload, status, component and conversion endpoints.

use crate::error::ApiError;
use crate::services::validate_file_name;
use crate::types::{
    ComponentListResponse, ConvertResponse, Model, ModelListResponse, ProgressEvent,
};
use crate::AppState;
use async_stream::stream;
use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::Stream;
use ifc_catalog_core::validate_system_code;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

/// Query parameters for the component listing.
#[derive(Debug, Deserialize)]
pub struct ComponentQuery {
    pub system: Option<String>,
}

async fn require_model(state: &AppState, project_id: Uuid, model_id: Uuid) -> Result<Model, ApiError> {
    state
        .registry
        .find_model(project_id, model_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("model {}", model_id)))
}

/// POST /api/v1/projects/:project_id/models - Upload a model and start conversion.
pub async fn upload_model(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Model>), ApiError> {
    // An oversized request fails before anything is read or written
    let declared_len = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());

    while let Some(field) = multipart.next_field().await? {
        let field_name = field.name().unwrap_or_default();
        tracing::debug!(field_name = %field_name, "Processing multipart field");
        if field_name != "file" {
            continue;
        }

        let file_name = field.file_name().ok_or(ApiError::MissingFileName)?.to_string();
        let format = validate_file_name(&file_name)?;

        let model_id = Uuid::new_v4();
        let project = project_id.to_string();
        let model_key = model_id.to_string();
        let stored = state
            .storage
            .save_original(&project, &model_key, format, declared_len, field)
            .await?;

        let model = Model::pending(
            model_id,
            project_id,
            file_name,
            format,
            stored.relative_path,
            stored.size_bytes,
        );
        if let Err(e) = state.registry.create_model(&model).await {
            if let Err(cleanup) = state.storage.delete_model_files(&project, &model_key).await {
                tracing::warn!(model_id = %model_id, error = %cleanup, "Failed to remove orphaned upload");
            }
            return Err(e.into());
        }

        tracing::info!(
            project_id = %project_id,
            model_id = %model_id,
            file_name = %model.file_name,
            format = %format,
            size_bytes = stored.size_bytes,
            sha256 = %stored.sha256,
            "Model uploaded"
        );

        state.conversions.convert_model_in_background(project_id, model_id);
        return Ok((StatusCode::ACCEPTED, Json(model)));
    }

    tracing::warn!("No 'file' field found in multipart request");
    Err(ApiError::MissingFile)
}

/// GET /api/v1/projects/:project_id/models
pub async fn list_models(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> Result<Json<ModelListResponse>, ApiError> {
    let models = state.registry.list_models(project_id).await?;
    Ok(Json(ModelListResponse { models }))
}

/// GET /api/v1/projects/:project_id/models/:model_id - Status read model.
pub async fn get_model(
    State(state): State<AppState>,
    Path((project_id, model_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Model>, ApiError> {
    Ok(Json(require_model(&state, project_id, model_id).await?))
}

/// GET /api/v1/projects/:project_id/models/:model_id/components?system=P1
pub async fn list_components(
    State(state): State<AppState>,
    Path((project_id, model_id)): Path<(Uuid, Uuid)>,
    Query(query): Query<ComponentQuery>,
) -> Result<Json<ComponentListResponse>, ApiError> {
    require_model(&state, project_id, model_id).await?;

    let system = query
        .system
        .as_deref()
        .map(validate_system_code)
        .transpose()?;
    let components = state.registry.list_components(model_id, system).await?;

    Ok(Json(ComponentListResponse {
        model_id,
        count: components.len(),
        components,
    }))
}

/// POST /api/v1/projects/:project_id/models/:model_id/convert - Re-run conversion.
pub async fn convert_model(
    State(state): State<AppState>,
    Path((project_id, model_id)): Path<(Uuid, Uuid)>,
) -> Result<(StatusCode, Json<ConvertResponse>), ApiError> {
    require_model(&state, project_id, model_id).await?;

    let enqueued = state.conversions.convert_model_in_background(project_id, model_id);
    tracing::info!(model_id = %model_id, enqueued = ?enqueued, "Conversion requested");

    Ok((StatusCode::ACCEPTED, Json(ConvertResponse { model_id, enqueued })))
}

/// First event of a progress stream: the model as currently stored.
#[derive(Debug, Serialize)]
struct StatusSnapshot<'a> {
    model: &'a Model,
}

fn sse_event<T: Serialize>(name: &str, payload: &T) -> Option<Event> {
    match serde_json::to_string(payload) {
        Ok(json) => Some(Event::default().event(name).data(json)),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to serialize progress event");
            None
        }
    }
}

/// GET /api/v1/projects/:project_id/models/:model_id/events - Progress (SSE).
///
/// Sends a `status` snapshot, then `progress` events until the model reaches
/// a terminal state.
pub async fn model_events(
    State(state): State<AppState>,
    Path((project_id, model_id)): Path<(Uuid, Uuid)>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    // Subscribe before reading the snapshot so no transition falls in between
    let mut rx = state.conversions.subscribe();
    let model = require_model(&state, project_id, model_id).await?;

    let stream = stream! {
        if let Some(event) = sse_event("status", &StatusSnapshot { model: &model }) {
            yield Ok::<_, Infallible>(event);
        }
        if model.status.is_terminal() {
            return;
        }

        loop {
            let progress: ProgressEvent = match rx.recv().await {
                Ok(progress) => progress,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(model_id = %model_id, skipped, "Progress subscriber lagged");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            if progress.model_id != model_id {
                continue;
            }

            let done = progress.status.is_terminal();
            if let Some(event) = sse_event("progress", &progress) {
                yield Ok::<_, Infallible>(event);
            }
            if done {
                break;
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// DELETE /api/v1/projects/:project_id/models/:model_id
///
/// Files are removed first; a sandbox violation aborts before anything is
/// deleted and leaves the record in place.
pub async fn delete_model(
    State(state): State<AppState>,
    Path((project_id, model_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
    require_model(&state, project_id, model_id).await?;

    state
        .storage
        .delete_model_files(&project_id.to_string(), &model_id.to_string())
        .await?;
    state.registry.delete_model(project_id, model_id).await?;

    tracing::info!(project_id = %project_id, model_id = %model_id, "Model deleted");
    Ok(StatusCode::NO_CONTENT)
}
