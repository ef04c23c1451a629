// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types and handling for the server.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::services::{RegistryError, StorageError, UploadError};

/// API error types.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Missing file in request")]
    MissingFile,

    #[error("Missing file name in request")]
    MissingFileName,

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error("Multipart error: {0}")]
    Multipart(#[from] axum::extract::multipart::MultipartError),

    #[error("Invalid system code: {0}")]
    InvalidSystemCode(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Storage sandbox violation")]
    SandboxViolation,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::MissingFile => (StatusCode::BAD_REQUEST, "MISSING_FILE"),
            ApiError::MissingFileName => (StatusCode::BAD_REQUEST, "MISSING_FILE_NAME"),
            ApiError::Upload(e) => match e {
                UploadError::EmptyFileName => (StatusCode::BAD_REQUEST, "EMPTY_FILE_NAME"),
                UploadError::InvalidFileName(_) => (StatusCode::BAD_REQUEST, "INVALID_FILE_NAME"),
                UploadError::MissingExtension(_) => (StatusCode::BAD_REQUEST, "MISSING_EXTENSION"),
                UploadError::UnsupportedExtension(_) => {
                    (StatusCode::UNSUPPORTED_MEDIA_TYPE, "UNSUPPORTED_EXTENSION")
                }
                UploadError::FileTooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, "FILE_TOO_LARGE"),
            },
            ApiError::Multipart(_) => (StatusCode::BAD_REQUEST, "MULTIPART_ERROR"),
            ApiError::InvalidSystemCode(_) => (StatusCode::BAD_REQUEST, "INVALID_SYSTEM_CODE"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            ApiError::SandboxViolation => (StatusCode::INTERNAL_SERVER_ERROR, "SANDBOX_VIOLATION"),
            ApiError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
            ApiError::Registry(_) => (StatusCode::INTERNAL_SERVER_ERROR, "REGISTRY_ERROR"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        if status.is_server_error() {
            tracing::error!(error = %self, code, "Request failed");
        }

        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Upload(e) => ApiError::Upload(e),
            StorageError::AlreadyExists(path) => ApiError::Conflict(format!("{} already exists", path.display())),
            StorageError::SandboxViolation { path, root } => {
                // Details stay in the logs
                tracing::error!(path = %path.display(), root = %root.display(), "Sandbox violation");
                ApiError::SandboxViolation
            }
            StorageError::Stream(e) => ApiError::Storage(e),
            StorageError::Io(e) => ApiError::Storage(e.to_string()),
        }
    }
}

impl From<ifc_catalog_core::Error> for ApiError {
    fn from(err: ifc_catalog_core::Error) -> Self {
        match err {
            ifc_catalog_core::Error::InvalidTag(raw) => ApiError::InvalidSystemCode(raw),
            ifc_catalog_core::Error::Io(e) => ApiError::Internal(e.to_string()),
        }
    }
}
