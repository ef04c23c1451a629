// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Health check and API information endpoints.

use crate::AppState;
use axum::{extract::State, Json};
use serde::Serialize;

const SERVICE: &str = "ifc-catalog-server";

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub service: &'static str,
    /// `postgres` or `memory`.
    pub registry: &'static str,
}

/// API information response.
#[derive(Debug, Serialize)]
pub struct ApiInfoResponse {
    pub service: &'static str,
    pub version: &'static str,
    pub description: &'static str,
    pub endpoints: Vec<EndpointInfo>,
}

/// Endpoint information.
#[derive(Debug, Serialize)]
pub struct EndpointInfo {
    pub method: &'static str,
    pub path: &'static str,
    pub description: &'static str,
}

const fn endpoint(method: &'static str, path: &'static str, description: &'static str) -> EndpointInfo {
    EndpointInfo {
        method,
        path,
        description,
    }
}

/// GET /api/v1/health - Health check endpoint.
pub async fn check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        service: SERVICE,
        registry: if state.config.database_url.is_some() { "postgres" } else { "memory" },
    })
}

/// GET / - API information endpoint.
pub async fn info() -> Json<ApiInfoResponse> {
    const MODELS: &str = "/api/v1/projects/:project_id/models";
    const MODEL: &str = "/api/v1/projects/:project_id/models/:model_id";

    Json(ApiInfoResponse {
        service: SERVICE,
        version: env!("CARGO_PKG_VERSION"),
        description: "IFC model upload and component tag catalog server",
        endpoints: vec![
            endpoint("GET", "/api/v1/health", "Health check endpoint"),
            endpoint("POST", MODELS, "Upload a model (multipart `file`) and start conversion"),
            endpoint("GET", MODELS, "List models of a project"),
            endpoint("GET", MODEL, "Model status and metadata"),
            endpoint("DELETE", MODEL, "Delete a model, its files and components"),
            endpoint("GET", "/api/v1/projects/:project_id/models/:model_id/components", "Component catalog (?system= filter)"),
            endpoint("POST", "/api/v1/projects/:project_id/models/:model_id/convert", "Re-run conversion"),
            endpoint("GET", "/api/v1/projects/:project_id/models/:model_id/events", "Conversion progress (Server-Sent Events)"),
            endpoint("GET", "/uploads/*", "Uploaded originals and generated artifacts"),
        ],
    })
}
