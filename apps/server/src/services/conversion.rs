// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Background model conversion.
//!
//! A conversion takes a model from `PENDING` (or any earlier state) through
//! `CONVERTING` to `READY` or `ERROR`:
//!
//! 1. Extract tagged components from the uploaded IFC text (blocking pool)
//! 2. Sort, index and place them
//! 3. Replace the model's stored components
//! 4. Write `components.json` and `metadata.json`
//! 5. Record `READY` with the artifact pointer
//!
//! Jobs run on a bounded pool. At most one job per model is in flight; an
//! enqueue that arrives while one is running schedules exactly one rerun.
//!
//! The registry is only written at state transitions. Intermediate progress
//! is published on a broadcast channel (see [`ConversionService::subscribe`]).

use ifc_catalog_core::{extract_components_with_progress, Catalog, ExtractOptions, Extraction};
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use time::OffsetDateTime;
use tokio::sync::{broadcast, Semaphore};
use uuid::Uuid;

use super::registry::{ModelRegistry, RegistryError};
use super::storage::{
    artifact_relative_path, servable_path, StorageError, StorageGuard, COMPONENTS_ARTIFACT,
    METADATA_ARTIFACT,
};
use crate::types::{
    ArtifactLinks, ArtifactStats, Component, ComponentsArtifact, Enqueued, MetadataArtifact,
    ModelStatus, ProgressEvent, ProgressInfo, Stage, StatusUpdate,
};

/// Error message recorded for formats that cannot be converted.
pub const UNSUPPORTED_FORMAT_MESSAGE: &str = "Only IFC models can be converted at the moment.";

/// Error message recorded for any other conversion failure.
pub const CONVERSION_FAILED_MESSAGE: &str = "Model conversion failed. Check the file and try again.";

const PROGRESS_CHANNEL_CAPACITY: usize = 256;

const PERCENT_QUEUED: u8 = 5;
const PERCENT_EXTRACTING: u8 = 15;
const PERCENT_EXTRACTED: u8 = 45;
const PERCENT_PERSISTING: u8 = 60;
const PERCENT_PERSISTED: u8 = 75;
const PERCENT_WRITING: u8 = 90;
const PERCENT_READY: u8 = 100;

/// Failures inside a conversion run. Never leaves [`ConversionService`]:
/// they are logged and recorded as [`CONVERSION_FAILED_MESSAGE`].
#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Extraction error: {0}")]
    Extract(#[from] ifc_catalog_core::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Extraction task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

struct Inner {
    registry: Arc<dyn ModelRegistry>,
    storage: StorageGuard,
    options: ExtractOptions,
    workers: Arc<Semaphore>,
    /// Models with a job in flight, mapped to "rerun requested".
    in_flight: Mutex<FxHashMap<Uuid, bool>>,
    progress: broadcast::Sender<ProgressEvent>,
}

/// Conversion orchestrator. Cheap to clone.
#[derive(Clone)]
pub struct ConversionService {
    inner: Arc<Inner>,
}

impl ConversionService {
    pub fn new(
        registry: Arc<dyn ModelRegistry>,
        storage: StorageGuard,
        workers: usize,
        options: ExtractOptions,
    ) -> Self {
        let (progress, _) = broadcast::channel(PROGRESS_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                registry,
                storage,
                options,
                workers: Arc::new(Semaphore::new(workers.max(1))),
                in_flight: Mutex::new(FxHashMap::default()),
                progress,
            }),
        }
    }

    /// Receive progress events for every conversion.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.inner.progress.subscribe()
    }

    /// Schedule a conversion and return immediately.
    pub fn convert_model_in_background(&self, project_id: Uuid, model_id: Uuid) -> Enqueued {
        {
            let mut in_flight = self.inner.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(rerun) = in_flight.get_mut(&model_id) {
                *rerun = true;
                tracing::debug!(model_id = %model_id, "Conversion already running, rerun scheduled");
                return Enqueued::Coalesced;
            }
            in_flight.insert(model_id, false);
        }

        let service = self.clone();
        tokio::spawn(async move { service.drive(project_id, model_id).await });
        Enqueued::Started
    }

    /// Run jobs for one model until no rerun is pending.
    async fn drive(&self, project_id: Uuid, model_id: Uuid) {
        loop {
            match self.inner.workers.clone().acquire_owned().await {
                Ok(_permit) => self.convert_model(project_id, model_id).await,
                Err(_) => tracing::warn!(model_id = %model_id, "Worker pool closed, conversion skipped"),
            }

            let again = {
                let mut in_flight = self.inner.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
                match in_flight.get_mut(&model_id) {
                    Some(rerun) if *rerun => {
                        *rerun = false;
                        true
                    }
                    _ => {
                        in_flight.remove(&model_id);
                        false
                    }
                }
            };
            if !again {
                break;
            }
        }
    }

    /// Convert one model now. Every failure ends up recorded on the model.
    pub async fn convert_model(&self, project_id: Uuid, model_id: Uuid) {
        let start = Instant::now();
        match self.run(project_id, model_id).await {
            Ok(Some(status)) => tracing::info!(
                model_id = %model_id,
                status = %status,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Conversion finished"
            ),
            Ok(None) => tracing::debug!(model_id = %model_id, "Model not found, conversion skipped"),
            Err(e) => {
                tracing::error!(model_id = %model_id, error = %e, "Conversion failed");
                self.fail(project_id, model_id).await;
            }
        }
    }

    /// The conversion pipeline. `Ok(None)` if the model is gone.
    async fn run(&self, project_id: Uuid, model_id: Uuid) -> Result<Option<ModelStatus>, ConversionError> {
        let inner = &self.inner;

        let Some(model) = inner.registry.find_model(project_id, model_id).await? else {
            return Ok(None);
        };

        let started = inner
            .registry
            .update_status(model_id, StatusUpdate::converting(progress_record(PERCENT_QUEUED, Stage::Queued)))
            .await?;
        if !started {
            return Ok(None);
        }
        self.publish(project_id, model_id, ModelStatus::Converting, Stage::Queued, PERCENT_QUEUED);

        if !model.format.is_processable() {
            tracing::info!(model_id = %model_id, format = %model.format, "Format not convertible");
            inner
                .registry
                .update_status(
                    model_id,
                    StatusUpdate::error(UNSUPPORTED_FORMAT_MESSAGE, progress_record(0, Stage::Failed)),
                )
                .await?;
            self.publish_failure(project_id, model_id, UNSUPPORTED_FORMAT_MESSAGE);
            return Ok(Some(ModelStatus::Error));
        }

        // Extract
        self.publish(project_id, model_id, ModelStatus::Converting, Stage::Extracting, PERCENT_EXTRACTING);
        let project = project_id.to_string();
        let model_key = model_id.to_string();
        let extraction = self
            .extract(project_id, model_id, inner.storage.absolute_path(&project, &model.original_path), model.size_bytes)
            .await?;
        tracing::info!(
            model_id = %model_id,
            components = extraction.components.len(),
            lines = extraction.stats.lines_read,
            duplicates = extraction.stats.duplicates_dropped,
            oversized_lines = extraction.stats.oversized_lines,
            truncated = extraction.stats.truncated,
            "Extracted components"
        );
        self.publish(project_id, model_id, ModelStatus::Converting, Stage::Extracted, PERCENT_EXTRACTED);

        // Order, index and place
        let stats = extraction.stats;
        let catalog = Catalog::build(extraction.components);

        // Persist
        self.publish(project_id, model_id, ModelStatus::Converting, Stage::Persisting, PERCENT_PERSISTING);
        let components: Vec<Component> = catalog
            .entries
            .iter()
            .map(|entry| Component::from_entry(model_id, entry))
            .collect();
        let inserted = inner.registry.replace_components(model_id, &components).await?;
        tracing::debug!(model_id = %model_id, inserted, "Persisted components");
        self.publish(project_id, model_id, ModelStatus::Converting, Stage::Persisted, PERCENT_PERSISTED);

        // Artifacts. A model deleted while persisting must not get its
        // converted directory recreated.
        if inner.registry.find_model(project_id, model_id).await?.is_none() {
            tracing::debug!(model_id = %model_id, "Model deleted before artifacts were written");
            return Ok(None);
        }
        self.publish(project_id, model_id, ModelStatus::Converting, Stage::WritingArtifacts, PERCENT_WRITING);
        inner.storage.ensure_converted_dir(&project, &model_key).await?;

        let generated_at = OffsetDateTime::now_utc();
        let components_doc = ComponentsArtifact::new(generated_at, model_id, &catalog);
        let components_url = inner
            .storage
            .write_artifact(&project, &model_key, COMPONENTS_ARTIFACT, &serde_json::to_vec_pretty(&components_doc)?)
            .await?;

        let metadata_doc = MetadataArtifact {
            generated_at,
            model_id,
            progress: ProgressInfo {
                percent: PERCENT_READY,
                stage: Stage::Ready.as_str().to_string(),
            },
            stats: ArtifactStats::new(&catalog, &stats),
            artifacts: ArtifactLinks {
                components: components_url.clone(),
                metadata: servable_path(&project, &artifact_relative_path(&model_key, METADATA_ARTIFACT)),
            },
        };
        inner
            .storage
            .write_artifact(&project, &model_key, METADATA_ARTIFACT, &serde_json::to_vec_pretty(&metadata_doc)?)
            .await?;

        // Finalize
        let updated = inner
            .registry
            .update_status(
                model_id,
                StatusUpdate::ready(components_url, serde_json::to_value(&metadata_doc)?),
            )
            .await?;
        if !updated {
            tracing::debug!(model_id = %model_id, "Model deleted during conversion, removing artifacts");
            if let Err(e) = inner.storage.delete_model_files(&project, &model_key).await {
                tracing::warn!(model_id = %model_id, error = %e, "Failed to remove orphaned artifacts");
            }
            return Ok(None);
        }
        self.publish(project_id, model_id, ModelStatus::Ready, Stage::Ready, PERCENT_READY);

        Ok(Some(ModelStatus::Ready))
    }

    /// Run the extractor on the blocking pool, publishing byte-based progress
    /// between the extracting and extracted marks.
    async fn extract(
        &self,
        project_id: Uuid,
        model_id: Uuid,
        path: std::path::PathBuf,
        size_bytes: u64,
    ) -> Result<Extraction, ConversionError> {
        let options = self.inner.options;
        let progress = self.inner.progress.clone();
        let span = u64::from(PERCENT_EXTRACTED - PERCENT_EXTRACTING);

        let extraction = tokio::task::spawn_blocking(move || {
            let mut last = PERCENT_EXTRACTING;
            extract_components_with_progress(&path, &options, |bytes| {
                let done = if size_bytes == 0 { span } else { (bytes.saturating_mul(span) / size_bytes).min(span) };
                let percent = PERCENT_EXTRACTING + done as u8;
                if percent > last && percent < PERCENT_EXTRACTED {
                    last = percent;
                    let _ = progress.send(ProgressEvent {
                        project_id,
                        model_id,
                        status: ModelStatus::Converting,
                        stage: Stage::Extracting,
                        percent,
                        message: None,
                    });
                }
            })
        })
        .await??;

        Ok(extraction)
    }

    /// Record the generic failure. Errors here are logged and dropped.
    async fn fail(&self, project_id: Uuid, model_id: Uuid) {
        let update = StatusUpdate::error(CONVERSION_FAILED_MESSAGE, progress_record(0, Stage::Failed));
        match self.inner.registry.update_status(model_id, update).await {
            Ok(true) => {}
            Ok(false) => tracing::debug!(model_id = %model_id, "Model deleted before failure was recorded"),
            Err(e) => tracing::error!(model_id = %model_id, error = %e, "Failed to record conversion failure"),
        }
        self.publish_failure(project_id, model_id, CONVERSION_FAILED_MESSAGE);
    }

    fn publish(&self, project_id: Uuid, model_id: Uuid, status: ModelStatus, stage: Stage, percent: u8) {
        // No subscribers is fine
        let _ = self.inner.progress.send(ProgressEvent {
            project_id,
            model_id,
            status,
            stage,
            percent,
            message: None,
        });
    }

    fn publish_failure(&self, project_id: Uuid, model_id: Uuid, message: &str) {
        let _ = self.inner.progress.send(ProgressEvent {
            project_id,
            model_id,
            status: ModelStatus::Error,
            stage: Stage::Failed,
            percent: 0,
            message: Some(message.to_string()),
        });
    }
}

/// Durable progress record stored on the model at a transition.
fn progress_record(percent: u8, stage: Stage) -> Value {
    serde_json::json!({
        "progress": ProgressInfo {
            percent,
            stage: stage.as_str().to_string(),
        }
    })
}
