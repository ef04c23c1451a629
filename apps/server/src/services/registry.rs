// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Model registry: model records and their component catalogs.
//!
//! Two backends share the [`ModelRegistry`] trait: an in-process map used when
//! no database is configured, and PostgreSQL (bulk UNNEST inserts).

use async_trait::async_trait;
use ifc_catalog_core::{BoundingBox, Point3};
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::types::{Component, Model, StatusUpdate};

/// Errors from the registry backends.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Model already exists: {0}")]
    Duplicate(Uuid),

    #[error("Corrupt registry row: {0}")]
    Corrupt(String),
}

/// Storage of model records and component catalogs.
#[async_trait]
pub trait ModelRegistry: Send + Sync {
    async fn create_model(&self, model: &Model) -> Result<(), RegistryError>;

    /// Model `model_id` of `project_id`, if it exists.
    async fn find_model(&self, project_id: Uuid, model_id: Uuid) -> Result<Option<Model>, RegistryError>;

    async fn list_models(&self, project_id: Uuid) -> Result<Vec<Model>, RegistryError>;

    /// Apply a status transition. Returns `false` if the model is gone.
    async fn update_status(&self, model_id: Uuid, update: StatusUpdate) -> Result<bool, RegistryError>;

    /// Delete all components of a model, then insert `components`.
    ///
    /// Rows whose full tag repeats within the batch are skipped. Returns the
    /// number of rows inserted, which is zero when the model is gone.
    async fn replace_components(&self, model_id: Uuid, components: &[Component]) -> Result<u64, RegistryError>;

    /// Components ordered by full tag, optionally restricted to one system.
    async fn list_components(
        &self,
        model_id: Uuid,
        system_code: Option<&str>,
    ) -> Result<Vec<Component>, RegistryError>;

    /// Delete a model and its components. Returns `false` if nothing matched.
    async fn delete_model(&self, project_id: Uuid, model_id: Uuid) -> Result<bool, RegistryError>;
}

// ─── In-memory backend ──────────────────────────────────────────────────────

#[derive(Default)]
struct MemoryState {
    models: FxHashMap<Uuid, Model>,
    components: FxHashMap<Uuid, Vec<Component>>,
}

/// Process-local registry. Contents are lost on restart.
#[derive(Default)]
pub struct MemoryRegistry {
    state: RwLock<MemoryState>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ModelRegistry for MemoryRegistry {
    async fn create_model(&self, model: &Model) -> Result<(), RegistryError> {
        let mut state = self.state.write().await;
        if state.models.contains_key(&model.id) {
            return Err(RegistryError::Duplicate(model.id));
        }
        state.models.insert(model.id, model.clone());
        Ok(())
    }

    async fn find_model(&self, project_id: Uuid, model_id: Uuid) -> Result<Option<Model>, RegistryError> {
        let state = self.state.read().await;
        Ok(state
            .models
            .get(&model_id)
            .filter(|m| m.project_id == project_id)
            .cloned())
    }

    async fn list_models(&self, project_id: Uuid) -> Result<Vec<Model>, RegistryError> {
        let state = self.state.read().await;
        let mut models: Vec<Model> = state
            .models
            .values()
            .filter(|m| m.project_id == project_id)
            .cloned()
            .collect();
        models.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(models)
    }

    async fn update_status(&self, model_id: Uuid, update: StatusUpdate) -> Result<bool, RegistryError> {
        let mut state = self.state.write().await;
        match state.models.get_mut(&model_id) {
            Some(model) => {
                model.apply(update);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn replace_components(&self, model_id: Uuid, components: &[Component]) -> Result<u64, RegistryError> {
        let mut state = self.state.write().await;
        if !state.models.contains_key(&model_id) {
            return Ok(0);
        }

        let mut seen = FxHashSet::default();
        let rows: Vec<Component> = components
            .iter()
            .filter(|c| seen.insert(c.full_tag.as_str()))
            .map(|c| Component {
                model_id,
                ..c.clone()
            })
            .collect();
        let inserted = rows.len() as u64;
        state.components.insert(model_id, rows);
        Ok(inserted)
    }

    async fn list_components(
        &self,
        model_id: Uuid,
        system_code: Option<&str>,
    ) -> Result<Vec<Component>, RegistryError> {
        let state = self.state.read().await;
        let mut components: Vec<Component> = state
            .components
            .get(&model_id)
            .map(|rows| {
                rows.iter()
                    .filter(|c| system_code.map_or(true, |s| c.system_code == s))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        components.sort_by(|a, b| a.full_tag.cmp(&b.full_tag));
        Ok(components)
    }

    async fn delete_model(&self, project_id: Uuid, model_id: Uuid) -> Result<bool, RegistryError> {
        let mut state = self.state.write().await;
        let owned = state
            .models
            .get(&model_id)
            .is_some_and(|m| m.project_id == project_id);
        if !owned {
            return Ok(false);
        }
        state.models.remove(&model_id);
        state.components.remove(&model_id);
        Ok(true)
    }
}

// ─── PostgreSQL backend ─────────────────────────────────────────────────────

const BATCH_SIZE: usize = 10_000;

const MODEL_COLUMNS: &str = "id, project_id, file_name, format, status, error_message, metadata, \
     components_url, original_path, size_bytes, created_at, updated_at";

const COMPONENT_COLUMNS: &str = "id, model_id, system_code, component_tag, full_tag, source_guid, \
     source_type, name, floor, pos_x, pos_y, pos_z, min_x, min_y, min_z, max_x, max_y, max_z, properties";

/// PostgreSQL registry.
pub struct PgRegistry {
    pool: PgPool,
}

impl PgRegistry {
    /// Connect and run embedded migrations.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, RegistryError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!(max_connections, "Connected to PostgreSQL model registry");
        Ok(Self { pool })
    }
}

fn model_from_row(row: &PgRow) -> Result<Model, RegistryError> {
    let format: String = row.try_get("format")?;
    let status: String = row.try_get("status")?;
    let size_bytes: i64 = row.try_get("size_bytes")?;

    Ok(Model {
        id: row.try_get("id")?,
        project_id: row.try_get("project_id")?,
        file_name: row.try_get("file_name")?,
        format: format.parse().map_err(RegistryError::Corrupt)?,
        status: status.parse().map_err(RegistryError::Corrupt)?,
        error_message: row.try_get("error_message")?,
        metadata: row.try_get("metadata")?,
        components_url: row.try_get("components_url")?,
        original_path: row.try_get("original_path")?,
        size_bytes: u64::try_from(size_bytes)
            .map_err(|_| RegistryError::Corrupt(format!("negative size_bytes: {}", size_bytes)))?,
        created_at: row.try_get::<OffsetDateTime, _>("created_at")?,
        updated_at: row.try_get::<OffsetDateTime, _>("updated_at")?,
    })
}

fn point(row: &PgRow, x: &str, y: &str, z: &str) -> Result<Point3, sqlx::Error> {
    Ok(Point3::new(row.try_get(x)?, row.try_get(y)?, row.try_get(z)?))
}

fn component_from_row(row: &PgRow) -> Result<Component, RegistryError> {
    Ok(Component {
        id: row.try_get("id")?,
        model_id: row.try_get("model_id")?,
        system_code: row.try_get("system_code")?,
        component_tag: row.try_get("component_tag")?,
        full_tag: row.try_get("full_tag")?,
        source_guid: row.try_get("source_guid")?,
        source_type: row.try_get("source_type")?,
        name: row.try_get("name")?,
        floor: row.try_get("floor")?,
        position: point(row, "pos_x", "pos_y", "pos_z")?,
        bounding_box: BoundingBox {
            min: point(row, "min_x", "min_y", "min_z")?,
            max: point(row, "max_x", "max_y", "max_z")?,
        },
        properties: row.try_get::<Value, _>("properties")?,
    })
}

#[async_trait]
impl ModelRegistry for PgRegistry {
    async fn create_model(&self, model: &Model) -> Result<(), RegistryError> {
        let size_bytes = i64::try_from(model.size_bytes)
            .map_err(|_| RegistryError::Corrupt(format!("size_bytes out of range: {}", model.size_bytes)))?;

        sqlx::query(
            r#"
            INSERT INTO models
                (id, project_id, file_name, format, status, error_message, metadata,
                 components_url, original_path, size_bytes, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(model.id)
        .bind(model.project_id)
        .bind(&model.file_name)
        .bind(model.format.as_str())
        .bind(model.status.as_str())
        .bind(&model.error_message)
        .bind(&model.metadata)
        .bind(&model.components_url)
        .bind(&model.original_path)
        .bind(size_bytes)
        .bind(model.created_at)
        .bind(model.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_model(&self, project_id: Uuid, model_id: Uuid) -> Result<Option<Model>, RegistryError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM models WHERE id = $1 AND project_id = $2",
            MODEL_COLUMNS
        ))
        .bind(model_id)
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(model_from_row).transpose()
    }

    async fn list_models(&self, project_id: Uuid) -> Result<Vec<Model>, RegistryError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM models WHERE project_id = $1 ORDER BY created_at, id",
            MODEL_COLUMNS
        ))
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(model_from_row).collect()
    }

    async fn update_status(&self, model_id: Uuid, update: StatusUpdate) -> Result<bool, RegistryError> {
        let result = sqlx::query(
            r#"
            UPDATE models
            SET status = $2,
                error_message = $3,
                metadata = COALESCE($4::JSONB, metadata),
                components_url = COALESCE($5, components_url),
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(model_id)
        .bind(update.status.as_str())
        .bind(&update.error_message)
        .bind(&update.metadata)
        .bind(&update.components_url)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn replace_components(&self, model_id: Uuid, components: &[Component]) -> Result<u64, RegistryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM components WHERE model_id = $1")
            .bind(model_id)
            .execute(&mut *tx)
            .await?;

        let mut inserted = 0;
        for chunk in components.chunks(BATCH_SIZE) {
            inserted += insert_components(&mut *tx, model_id, chunk).await?;
        }

        tx.commit().await?;

        tracing::debug!(model_id = %model_id, inserted, "Replaced components");
        Ok(inserted)
    }

    async fn list_components(
        &self,
        model_id: Uuid,
        system_code: Option<&str>,
    ) -> Result<Vec<Component>, RegistryError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM components \
             WHERE model_id = $1 AND ($2::TEXT IS NULL OR system_code = $2) \
             ORDER BY full_tag",
            COMPONENT_COLUMNS
        ))
        .bind(model_id)
        .bind(system_code)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(component_from_row).collect()
    }

    async fn delete_model(&self, project_id: Uuid, model_id: Uuid) -> Result<bool, RegistryError> {
        let result = sqlx::query("DELETE FROM models WHERE id = $1 AND project_id = $2")
            .bind(model_id)
            .bind(project_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// Bulk insert one batch with UNNEST. Skips full tags already present and
/// inserts nothing if the model row is gone.
async fn insert_components(
    conn: &mut sqlx::PgConnection,
    model_id: Uuid,
    chunk: &[Component],
) -> Result<u64, sqlx::Error> {
    if chunk.is_empty() {
        return Ok(0);
    }

    let len = chunk.len();
    let mut ids = Vec::with_capacity(len);
    let mut system_codes = Vec::with_capacity(len);
    let mut component_tags = Vec::with_capacity(len);
    let mut full_tags = Vec::with_capacity(len);
    let mut source_guids: Vec<Option<String>> = Vec::with_capacity(len);
    let mut source_types: Vec<Option<String>> = Vec::with_capacity(len);
    let mut names: Vec<Option<String>> = Vec::with_capacity(len);
    let mut floors: Vec<Option<String>> = Vec::with_capacity(len);
    let mut coords: [Vec<f64>; 9] = Default::default();
    let mut properties = Vec::with_capacity(len);

    for c in chunk {
        ids.push(c.id);
        system_codes.push(c.system_code.clone());
        component_tags.push(c.component_tag.clone());
        full_tags.push(c.full_tag.clone());
        source_guids.push(c.source_guid.clone());
        source_types.push(c.source_type.clone());
        names.push(c.name.clone());
        floors.push(c.floor.clone());

        let (p, b) = (c.position, c.bounding_box);
        let values = [p.x, p.y, p.z, b.min.x, b.min.y, b.min.z, b.max.x, b.max.y, b.max.z];
        for (column, value) in coords.iter_mut().zip(values) {
            column.push(value);
        }
        properties.push(c.properties.to_string());
    }

    let [pos_x, pos_y, pos_z, min_x, min_y, min_z, max_x, max_y, max_z] = &coords;

    let result = sqlx::query(
        r#"
        INSERT INTO components
            (id, model_id, system_code, component_tag, full_tag, source_guid, source_type,
             name, floor, pos_x, pos_y, pos_z, min_x, min_y, min_z, max_x, max_y, max_z,
             properties)
        SELECT u.id, $1, u.system_code, u.component_tag, u.full_tag, u.source_guid,
               u.source_type, u.name, u.floor, u.pos_x, u.pos_y, u.pos_z,
               u.min_x, u.min_y, u.min_z, u.max_x, u.max_y, u.max_z, u.properties::JSONB
        FROM UNNEST(
            $2::UUID[],
            $3::VARCHAR[],
            $4::VARCHAR[],
            $5::VARCHAR[],
            $6::TEXT[],
            $7::TEXT[],
            $8::TEXT[],
            $9::TEXT[],
            $10::FLOAT8[], $11::FLOAT8[], $12::FLOAT8[],
            $13::FLOAT8[], $14::FLOAT8[], $15::FLOAT8[],
            $16::FLOAT8[], $17::FLOAT8[], $18::FLOAT8[],
            $19::TEXT[]
        ) AS u(id, system_code, component_tag, full_tag, source_guid, source_type, name, floor,
               pos_x, pos_y, pos_z, min_x, min_y, min_z, max_x, max_y, max_z, properties)
        WHERE EXISTS (SELECT 1 FROM models WHERE id = $1)
        ON CONFLICT (model_id, full_tag) DO NOTHING
        "#,
    )
    .bind(model_id)
    .bind(&ids)
    .bind(&system_codes)
    .bind(&component_tags)
    .bind(&full_tags)
    .bind(&source_guids)
    .bind(&source_types)
    .bind(&names)
    .bind(&floors)
    .bind(pos_x)
    .bind(pos_y)
    .bind(pos_z)
    .bind(min_x)
    .bind(min_y)
    .bind(min_z)
    .bind(max_x)
    .bind(max_y)
    .bind(max_z)
    .bind(&properties)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ModelFormat, ModelStatus};
    use ifc_catalog_core::place;

    fn model(project_id: Uuid) -> Model {
        Model::pending(Uuid::new_v4(), project_id, "plant.ifc", ModelFormat::Ifc, "models/x/original.ifc", 42)
    }

    fn component(system: &str, tag: &str, system_index: usize, index: usize) -> Component {
        let placement = place(index, system_index);
        Component {
            id: Uuid::new_v4(),
            model_id: Uuid::nil(),
            system_code: system.into(),
            component_tag: tag.into(),
            full_tag: format!("{}-{}", system, tag),
            source_guid: None,
            source_type: Some("IFCPIPESEGMENT".into()),
            name: Some(format!("{}-{}", system, tag)),
            floor: None,
            position: placement.position,
            bounding_box: placement.bounding_box,
            properties: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn test_find_is_scoped_to_project() {
        let registry = MemoryRegistry::new();
        let project = Uuid::new_v4();
        let m = model(project);
        registry.create_model(&m).await.unwrap();

        assert_eq!(registry.find_model(project, m.id).await.unwrap(), Some(m.clone()));
        assert_eq!(registry.find_model(Uuid::new_v4(), m.id).await.unwrap(), None);
        assert!(matches!(registry.create_model(&m).await, Err(RegistryError::Duplicate(_))));
        assert_eq!(registry.list_models(project).await.unwrap().len(), 1);
        assert!(registry.list_models(Uuid::new_v4()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_status_on_missing_model() {
        let registry = MemoryRegistry::new();
        let updated = registry
            .update_status(Uuid::new_v4(), StatusUpdate::converting(serde_json::json!({})))
            .await
            .unwrap();
        assert!(!updated);
    }

    #[tokio::test]
    async fn test_update_status() {
        let registry = MemoryRegistry::new();
        let project = Uuid::new_v4();
        let m = model(project);
        registry.create_model(&m).await.unwrap();

        let updated = registry
            .update_status(m.id, StatusUpdate::error("boom", serde_json::json!({"percent": 0})))
            .await
            .unwrap();
        assert!(updated);

        let stored = registry.find_model(project, m.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ModelStatus::Error);
        assert_eq!(stored.error_message.as_deref(), Some("boom"));
        assert_eq!(stored.metadata["percent"], 0);
    }

    #[tokio::test]
    async fn test_replace_components_skips_duplicates() {
        let registry = MemoryRegistry::new();
        let m = model(Uuid::new_v4());
        registry.create_model(&m).await.unwrap();

        let first = vec![component("P1", "A01", 0, 0), component("P1", "A02", 0, 1)];
        assert_eq!(registry.replace_components(m.id, &first).await.unwrap(), 2);

        let second = vec![
            component("S2", "B99", 1, 1),
            component("P1", "A01", 0, 0),
            component("P1", "A01", 0, 0),
        ];
        assert_eq!(registry.replace_components(m.id, &second).await.unwrap(), 2);

        let stored = registry.list_components(m.id, None).await.unwrap();
        let tags: Vec<&str> = stored.iter().map(|c| c.full_tag.as_str()).collect();
        assert_eq!(tags, vec!["P1-A01", "S2-B99"]);
        assert!(stored.iter().all(|c| c.model_id == m.id));

        let p1 = registry.list_components(m.id, Some("P1")).await.unwrap();
        assert_eq!(p1.len(), 1);
        assert!(registry.list_components(m.id, Some("X9")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_replace_components_on_missing_model() {
        let registry = MemoryRegistry::new();
        let missing = Uuid::new_v4();
        let inserted = registry
            .replace_components(missing, &[component("P1", "A01", 0, 0)])
            .await
            .unwrap();
        assert_eq!(inserted, 0);
        assert!(registry.list_components(missing, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_model() {
        let registry = MemoryRegistry::new();
        let project = Uuid::new_v4();
        let m = model(project);
        registry.create_model(&m).await.unwrap();
        registry
            .replace_components(m.id, &[component("P1", "A01", 0, 0)])
            .await
            .unwrap();

        assert!(!registry.delete_model(Uuid::new_v4(), m.id).await.unwrap());
        assert!(registry.delete_model(project, m.id).await.unwrap());
        assert!(!registry.delete_model(project, m.id).await.unwrap());
        assert!(registry.list_components(m.id, None).await.unwrap().is_empty());
    }
}
