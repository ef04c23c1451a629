// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! IFC Catalog Server binary.

use anyhow::Context;
use ifc_catalog_server::{
    config::{Config, LogFormat},
    router,
    services::{MemoryRegistry, ModelRegistry, PgRegistry},
    AppState,
};
use std::net::SocketAddr;
use std::sync::Arc;

fn init_tracing(format: LogFormat) {
    let filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "info,tower_http=debug,ifc_catalog_server=debug".into());

    match format {
        LogFormat::Json => tracing_subscriber::fmt().with_env_filter(filter).json().init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).pretty().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();
    init_tracing(config.log_format);

    tracing::info!(
        port = config.port,
        uploads_dir = %config.uploads_dir.display(),
        max_file_size_mb = config.max_file_size_mb,
        conversion_workers = config.conversion_workers,
        max_components = config.max_components,
        "Starting IFC Catalog Server"
    );

    tokio::fs::create_dir_all(&config.uploads_dir)
        .await
        .with_context(|| format!("creating uploads directory {}", config.uploads_dir.display()))?;

    let registry: Arc<dyn ModelRegistry> = match &config.database_url {
        Some(url) => Arc::new(
            PgRegistry::connect(url, config.database_max_connections)
                .await
                .context("connecting to the model registry database")?,
        ),
        None => {
            tracing::warn!("DATABASE_URL not set, models are kept in memory");
            Arc::new(MemoryRegistry::new())
        }
    };

    let port = config.port;
    let app = router(AppState::new(config, registry));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
