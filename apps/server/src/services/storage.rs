// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Sandboxed on-disk storage for model uploads and generated artifacts.
//!
//! Layout under the uploads root:
//!
//! ```text
//! {uploads_root}/projects/{project_id}/models/{model_id}/original.{ext}
//! {uploads_root}/projects/{project_id}/models/{model_id}/converted/components.json
//! {uploads_root}/projects/{project_id}/models/{model_id}/converted/metadata.json
//! ```
//!
//! Everything under the uploads root is served at [`SERVABLE_PREFIX`].

use bytes::Bytes;
use futures::{Stream, StreamExt};
use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::types::ModelFormat;

/// URL prefix the uploads root is served under.
pub const SERVABLE_PREFIX: &str = "/uploads";

/// Multipart framing allowed on top of the file ceiling when only the
/// request length is known.
pub const MULTIPART_FRAMING_ALLOWANCE: u64 = 1024 * 1024;

/// Components catalog artifact name.
pub const COMPONENTS_ARTIFACT: &str = "components.json";

/// Metadata artifact name.
pub const METADATA_ARTIFACT: &str = "metadata.json";

const PROJECTS_DIR: &str = "projects";
const MODELS_DIR: &str = "models";
const CONVERTED_DIR: &str = "converted";
const ORIGINAL_STEM: &str = "original";

/// Upload rejected before anything touches the disk.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UploadError {
    #[error("File name is empty")]
    EmptyFileName,

    #[error("File name contains path components: {0}")]
    InvalidFileName(String),

    #[error("File name has no extension: {0}")]
    MissingExtension(String),

    #[error("Unsupported file extension: .{0} (expected .ifc, .rvt or .nwd)")]
    UnsupportedExtension(String),

    #[error("File too large: {size} bytes exceeds the {max_bytes} byte limit")]
    FileTooLarge { size: u64, max_bytes: u64 },
}

/// Storage guard failures.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error("File already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("Path {path} escapes storage root {root}")]
    SandboxViolation { path: PathBuf, root: PathBuf },

    #[error("Upload stream error: {0}")]
    Stream(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// An original upload written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    /// Path relative to the project root.
    pub relative_path: String,
    pub servable_path: String,
    pub size_bytes: u64,
    /// Hex SHA-256 of the uploaded bytes.
    pub sha256: String,
}

/// What `delete_model_files` removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteReport {
    pub removed: Vec<PathBuf>,
}

/// Validate an upload's file name and map its extension to a format.
///
/// Runs before any path is computed from the name.
pub fn validate_file_name(name: &str) -> Result<ModelFormat, UploadError> {
    if name.trim().is_empty() {
        return Err(UploadError::EmptyFileName);
    }
    if name.contains("..") || name.contains(&['/', '\\', '\0'][..]) {
        return Err(UploadError::InvalidFileName(name.to_string()));
    }

    let ext = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => ext,
        _ => return Err(UploadError::MissingExtension(name.to_string())),
    };

    ModelFormat::from_extension(ext)
        .ok_or_else(|| UploadError::UnsupportedExtension(ext.to_ascii_lowercase()))
}

/// Reject uploads over the byte ceiling.
pub fn validate_file_size(size: u64, max_bytes: u64) -> Result<(), UploadError> {
    if size > max_bytes {
        return Err(UploadError::FileTooLarge { size, max_bytes });
    }
    Ok(())
}

/// `models/{model_id}`
fn model_dir_relative(model_id: &str) -> String {
    format!("{}/{}", MODELS_DIR, model_id)
}

/// `models/{model_id}/original.{ext}`
pub fn original_relative_path(model_id: &str, ext: &str) -> String {
    format!("{}/{}.{}", model_dir_relative(model_id), ORIGINAL_STEM, ext)
}

/// `models/{model_id}/converted`
pub fn converted_dir_relative(model_id: &str) -> String {
    format!("{}/{}", model_dir_relative(model_id), CONVERTED_DIR)
}

/// `models/{model_id}/converted/{name}`
pub fn artifact_relative_path(model_id: &str, name: &str) -> String {
    format!("{}/{}", converted_dir_relative(model_id), name)
}

/// `/uploads/projects/{project_id}/{relative}`
pub fn servable_path(project_id: &str, relative: &str) -> String {
    format!("{}/{}/{}/{}", SERVABLE_PREFIX, PROJECTS_DIR, project_id, relative)
}

/// Lexically resolve `.` and `..` without touching the filesystem.
///
/// Returns `None` if `..` would climb above the first component.
fn normalize(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    return None;
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    Some(out)
}

/// Ensure `path` resolves strictly inside `root`.
fn ensure_within(root: &Path, path: &Path) -> Result<PathBuf, StorageError> {
    let violation = || StorageError::SandboxViolation {
        path: path.to_path_buf(),
        root: root.to_path_buf(),
    };
    let root = normalize(root).ok_or_else(violation)?;
    let resolved = normalize(path).ok_or_else(violation)?;
    if resolved != root && resolved.starts_with(&root) {
        Ok(resolved)
    } else {
        Err(violation())
    }
}

/// Filesystem storage rooted at the uploads directory.
#[derive(Debug, Clone)]
pub struct StorageGuard {
    uploads_root: PathBuf,
    max_upload_bytes: u64,
}

impl StorageGuard {
    /// A relative root is resolved against the working directory once, here,
    /// so containment checks never see a leading `..`.
    pub fn new(uploads_root: impl Into<PathBuf>, max_upload_bytes: u64) -> Self {
        let uploads_root = uploads_root.into();
        let uploads_root = match std::path::absolute(&uploads_root) {
            Ok(absolute) => normalize(&absolute).unwrap_or(absolute),
            Err(e) => {
                tracing::warn!(path = %uploads_root.display(), error = %e, "Could not resolve uploads root");
                uploads_root
            }
        };
        Self {
            uploads_root,
            max_upload_bytes,
        }
    }

    pub fn uploads_root(&self) -> &Path {
        &self.uploads_root
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_bytes
    }

    /// `{uploads_root}/projects/{project_id}`
    pub fn project_root(&self, project_id: &str) -> PathBuf {
        self.uploads_root.join(PROJECTS_DIR).join(project_id)
    }

    /// Absolute path of a project-relative path.
    pub fn absolute_path(&self, project_id: &str, relative: &str) -> PathBuf {
        self.project_root(project_id).join(relative)
    }

    /// Stream an upload to `models/{model_id}/original.{ext}`.
    ///
    /// `declared_request_len` is the enclosing request's `Content-Length`. It
    /// includes multipart framing, so it is only rejected before anything is
    /// created once it exceeds the ceiling plus [`MULTIPART_FRAMING_ALLOWANCE`].
    /// The exact ceiling is enforced while streaming; a partial file is
    /// removed if it is crossed. Never overwrites an existing file.
    pub async fn save_original<S, E>(
        &self,
        project_id: &str,
        model_id: &str,
        format: ModelFormat,
        declared_request_len: Option<u64>,
        stream: S,
    ) -> Result<StoredFile, StorageError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: std::fmt::Display,
    {
        if let Some(len) = declared_request_len {
            if len > self.max_upload_bytes.saturating_add(MULTIPART_FRAMING_ALLOWANCE) {
                return Err(UploadError::FileTooLarge {
                    size: len,
                    max_bytes: self.max_upload_bytes,
                }
                .into());
            }
        }

        let relative = original_relative_path(model_id, format.extension());
        let path = ensure_within(
            &self.project_root(project_id),
            &self.absolute_path(project_id, &relative),
        )?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => StorageError::AlreadyExists(path.clone()),
                _ => StorageError::Io(e),
            })?;

        let written = write_stream(&mut file, stream, self.max_upload_bytes).await;
        let (size_bytes, sha256) = match written {
            Ok(result) => result,
            Err(e) => {
                drop(file);
                if let Err(cleanup) = fs::remove_file(&path).await {
                    tracing::warn!(path = %path.display(), error = %cleanup, "Failed to remove partial upload");
                }
                // The model directory is private to this upload
                if let Some(model_dir) = path.parent() {
                    let _ = fs::remove_dir(model_dir).await;
                }
                return Err(e);
            }
        };

        tracing::debug!(
            path = %path.display(),
            size_bytes,
            sha256 = %sha256,
            "Stored original upload"
        );

        Ok(StoredFile {
            servable_path: servable_path(project_id, &relative),
            relative_path: relative,
            size_bytes,
            sha256,
        })
    }

    /// Create the converted-artifacts directory if missing.
    pub async fn ensure_converted_dir(&self, project_id: &str, model_id: &str) -> Result<PathBuf, StorageError> {
        let dir = ensure_within(
            &self.project_root(project_id),
            &self.absolute_path(project_id, &converted_dir_relative(model_id)),
        )?;
        fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    /// Atomically replace an artifact (temp file + rename).
    ///
    /// Returns the servable path of the artifact.
    pub async fn write_artifact(
        &self,
        project_id: &str,
        model_id: &str,
        name: &str,
        data: &[u8],
    ) -> Result<String, StorageError> {
        let relative = artifact_relative_path(model_id, name);
        let path = ensure_within(
            &self.project_root(project_id),
            &self.absolute_path(project_id, &relative),
        )?;

        let temp_path = path.with_extension("json.tmp");
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&temp_path, &path).await?;

        tracing::debug!(path = %path.display(), size = data.len(), "Wrote artifact");
        Ok(servable_path(project_id, &relative))
    }

    /// Remove the converted directory and every possible original file.
    ///
    /// All target paths are validated against the project root before the
    /// first deletion; a single escaping path aborts the whole operation.
    pub async fn delete_model_files(&self, project_id: &str, model_id: &str) -> Result<DeleteReport, StorageError> {
        let project_root = self.project_root(project_id);
        ensure_within(&self.uploads_root.join(PROJECTS_DIR), &project_root)?;

        let converted = ensure_within(
            &project_root,
            &self.absolute_path(project_id, &converted_dir_relative(model_id)),
        )?;
        let originals = ModelFormat::ALL
            .into_iter()
            .map(|format| {
                ensure_within(
                    &project_root,
                    &self.absolute_path(project_id, &original_relative_path(model_id, format.extension())),
                )
            })
            .collect::<Result<Vec<_>, _>>()?;
        let model_dir = ensure_within(
            &project_root,
            &self.absolute_path(project_id, &model_dir_relative(model_id)),
        )?;

        let mut report = DeleteReport::default();

        match fs::remove_dir_all(&converted).await {
            Ok(()) => report.removed.push(converted),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        for original in originals {
            match fs::remove_file(&original).await {
                Ok(()) => report.removed.push(original),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        // Only succeeds once the directory is empty
        if fs::remove_dir(&model_dir).await.is_ok() {
            report.removed.push(model_dir);
        }

        tracing::info!(
            project_id,
            model_id,
            removed = report.removed.len(),
            "Deleted model files"
        );
        Ok(report)
    }
}

/// Copy a byte stream into `file`, enforcing `max_bytes` before each write.
async fn write_stream<S, E>(file: &mut fs::File, stream: S, max_bytes: u64) -> Result<(u64, String), StorageError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::fmt::Display,
{
    futures::pin_mut!(stream);
    let mut hasher = Sha256::new();
    let mut size: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| StorageError::Stream(e.to_string()))?;
        size += chunk.len() as u64;
        validate_file_size(size, max_bytes)?;
        hasher.update(&chunk);
        file.write_all(&chunk).await?;
    }

    file.sync_all().await?;
    Ok((size, hex::encode(hasher.finalize())))
}
