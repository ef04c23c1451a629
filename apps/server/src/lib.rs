// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! IFC Catalog Server - model uploads and component tag catalogs.
//!
//! Uploaded IFC models are scanned in the background for project component
//! tags (`<SYSTEM>-<COMPONENT>`). Each conversion stores the components,
//! writes `components.json` / `metadata.json` next to the upload and moves the
//! model to `READY` or `ERROR`.
//!
//! # Endpoints
//!
//! - `GET /api/v1/health` - Health check
//! - `POST /api/v1/projects/:project_id/models` - Upload (multipart `file`)
//! - `GET /api/v1/projects/:project_id/models` - List models
//! - `GET /api/v1/projects/:project_id/models/:model_id` - Model status
//! - `DELETE /api/v1/projects/:project_id/models/:model_id` - Delete model
//! - `GET /api/v1/projects/:project_id/models/:model_id/components` - Components
//! - `POST /api/v1/projects/:project_id/models/:model_id/convert` - Re-run conversion
//! - `GET /api/v1/projects/:project_id/models/:model_id/events` - Progress (SSE)
//! - `GET /uploads/*` - Originals and artifacts

use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use ifc_catalog_core::ExtractOptions;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    services::ServeDir,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

pub mod config;
pub mod error;
pub mod routes;
pub mod services;
pub mod types;

use config::Config;
use services::{ConversionService, ModelRegistry, StorageGuard, MULTIPART_FRAMING_ALLOWANCE};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub storage: StorageGuard,
    pub registry: Arc<dyn ModelRegistry>,
    pub conversions: ConversionService,
}

impl AppState {
    pub fn new(config: Config, registry: Arc<dyn ModelRegistry>) -> Self {
        let storage = StorageGuard::new(&config.uploads_dir, config.max_upload_bytes());
        let conversions = ConversionService::new(
            registry.clone(),
            storage.clone(),
            config.conversion_workers,
            ExtractOptions {
                max_components: config.max_components,
                ..ExtractOptions::default()
            },
        );

        Self {
            config: Arc::new(config),
            storage,
            registry,
            conversions,
        }
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let config = state.config.clone();
    let body_limit = usize::try_from(config.max_upload_bytes().saturating_add(MULTIPART_FRAMING_ALLOWANCE))
        .unwrap_or(usize::MAX);

    Router::new()
        // Root endpoint - API information
        .route("/", get(routes::health::info))
        .route("/api/v1/health", get(routes::health::check))
        // Models
        .route(
            "/api/v1/projects/:project_id/models",
            post(routes::models::upload_model).get(routes::models::list_models),
        )
        .route(
            "/api/v1/projects/:project_id/models/:model_id",
            get(routes::models::get_model).delete(routes::models::delete_model),
        )
        .route(
            "/api/v1/projects/:project_id/models/:model_id/components",
            get(routes::models::list_components),
        )
        .route(
            "/api/v1/projects/:project_id/models/:model_id/convert",
            post(routes::models::convert_model),
        )
        .route(
            "/api/v1/projects/:project_id/models/:model_id/events",
            get(routes::models::model_events),
        )
        // Originals and artifacts
        .nest_service("/uploads", ServeDir::new(&config.uploads_dir))
        // Middleware
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config.cors_origins))
        .with_state(state)
}
