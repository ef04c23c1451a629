// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Server configuration loaded from environment variables.

use std::path::PathBuf;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port to listen on.
    pub port: u16,
    /// Root directory for uploads and generated artifacts.
    pub uploads_dir: PathBuf,
    /// Maximum upload size in MB.
    pub max_file_size_mb: usize,
    /// Request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Maximum number of conversions running at once.
    pub conversion_workers: usize,
    /// Extraction stops after this many components.
    pub max_components: usize,
    /// PostgreSQL registry. Models are kept in memory when unset.
    pub database_url: Option<String>,
    /// Pool size for the PostgreSQL registry.
    pub database_max_connections: u32,
    /// Allowed CORS origins (comma-separated, or "*" for all in development).
    pub cors_origins: Vec<String>,
    pub log_format: LogFormat,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".into())
                .parse()
                .unwrap_or(8080),
            uploads_dir: std::env::var("UPLOADS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| {
                    // Docker images mount a volume at /app/uploads
                    if std::path::Path::new("/.dockerenv").exists() {
                        PathBuf::from("/app/uploads")
                    } else {
                        std::env::current_dir()
                            .map(|dir| dir.join("uploads"))
                            .unwrap_or_else(|_| PathBuf::from("./uploads"))
                    }
                }),
            max_file_size_mb: std::env::var("MAX_FILE_SIZE_MB")
                .unwrap_or_else(|_| "500".into())
                .parse()
                .unwrap_or(500),
            request_timeout_secs: std::env::var("REQUEST_TIMEOUT_SECS")
                .unwrap_or_else(|_| "300".into())
                .parse()
                .unwrap_or(300),
            conversion_workers: std::env::var("CONVERSION_WORKERS")
                .unwrap_or_else(|_| num_cpus::get().to_string())
                .parse()
                .unwrap_or_else(|_| num_cpus::get()),
            max_components: std::env::var("MAX_COMPONENTS")
                .unwrap_or_else(|_| ifc_catalog_core::DEFAULT_MAX_COMPONENTS.to_string())
                .parse()
                .unwrap_or(ifc_catalog_core::DEFAULT_MAX_COMPONENTS),
            database_url: std::env::var("DATABASE_URL").ok().filter(|s| !s.trim().is_empty()),
            database_max_connections: std::env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "10".into())
                .parse()
                .unwrap_or(10),
            cors_origins: std::env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| {
                    // Default: allow common development origins
                    "http://localhost:3000,http://localhost:5173,http://127.0.0.1:3000,http://127.0.0.1:5173".into()
                })
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            log_format: match std::env::var("LOG_FORMAT").as_deref() {
                Ok("json") => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        }
    }

    /// Upload ceiling in bytes.
    pub fn max_upload_bytes(&self) -> u64 {
        (self.max_file_size_mb as u64).saturating_mul(1024 * 1024)
    }
}
