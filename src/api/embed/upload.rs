// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! POST /embed/image-upload handler
//!
//! Each `images` part is written to a per-request scratch directory and the
//! resulting paths go through the same locator pipeline as /embed/image.
//! The handler awaits [`UploadScratch::cleanup`] on every return path; the
//! scratch's `Drop` removes anything left if the request future is dropped.

use axum::{extract::State, Json};
use axum_extra::extract::Multipart;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::handler::IMAGE_ERROR_PREFIX;
use super::response::EmbeddingResponse;
use crate::api::http_server::AppState;
use crate::api::ApiError;

/// Multipart field carrying image files
pub const UPLOAD_FIELD: &str = "images";

pub const PROCESS_ERROR_PREFIX: &str = "Error processing image";

/// POST /embed/image-upload
///
/// Multipart form with repeated `images` parts. Other fields are ignored.
/// A request without `images` parts returns an empty list.
pub async fn embed_image_upload_handler(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<EmbeddingResponse>, ApiError> {
    let mut scratch = UploadScratch::create(state.upload_root.clone())
        .await
        .map_err(|e| process_err(&e))?;

    let result = embed_parts(&state, &mut scratch, multipart).await;
    scratch.cleanup().await;
    result
}

fn process_err(e: &dyn std::fmt::Display) -> ApiError {
    ApiError::InternalError(format!("{}: {}", PROCESS_ERROR_PREFIX, e))
}

async fn embed_parts(
    state: &AppState,
    scratch: &mut UploadScratch,
    mut multipart: Multipart,
) -> Result<Json<EmbeddingResponse>, ApiError> {
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::InvalidRequest(format!("Malformed multipart body: {}", e)))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            debug!("Skipping multipart field {:?}", field.name());
            continue;
        }

        let path = scratch.next_path(field.file_name());
        let mut file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| process_err(&e))?;

        while let Some(chunk) = field.chunk().await.map_err(|e| process_err(&e))? {
            file.write_all(&chunk).await.map_err(|e| process_err(&e))?;
        }
        file.flush().await.map_err(|e| process_err(&e))?;
    }

    let locators = scratch.locators();
    info!("Embedding {} uploaded images", locators.len());

    let embeddings = state
        .service
        .embed_image_locators(locators)
        .await
        .map_err(|e| ApiError::internal(IMAGE_ERROR_PREFIX, &e))?;

    Ok(Json(embeddings.into()))
}

/// Scratch directory owning every file written for one upload request
pub struct UploadScratch {
    dir: Option<TempDir>,
    files: Vec<PathBuf>,
}

impl UploadScratch {
    pub fn new(root: &Path) -> io::Result<Self> {
        std::fs::create_dir_all(root)?;
        // Locators must be absolute so they never resolve against the mount dir
        let root = std::fs::canonicalize(root)?;
        let dir = tempfile::Builder::new()
            .prefix("clip-upload-")
            .tempdir_in(root)?;

        Ok(Self {
            dir: Some(dir),
            files: Vec::new(),
        })
    }

    /// Blocking setup run off the async runtime
    pub async fn create(root: PathBuf) -> io::Result<Self> {
        tokio::task::spawn_blocking(move || Self::new(&root))
            .await
            .map_err(io::Error::other)?
    }

    #[cfg(test)]
    fn dir(&self) -> Option<&Path> {
        self.dir.as_ref().map(|d| d.path())
    }

    /// Reserve a path for the next part; it is cleaned up even if never written
    pub fn next_path(&mut self, original_name: Option<&str>) -> PathBuf {
        let name = format!(
            "{}-{}",
            Uuid::new_v4(),
            sanitize_filename(original_name.unwrap_or_default())
        );
        let path = match &self.dir {
            Some(dir) => dir.path().join(name),
            None => PathBuf::from(name),
        };
        self.files.push(path.clone());
        path
    }

    /// Paths in upload order, as locator strings
    pub fn locators(&self) -> Vec<String> {
        self.files
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect()
    }

    /// Remove every reserved file and the directory on a blocking thread
    pub async fn cleanup(mut self) {
        let files = std::mem::take(&mut self.files);
        let dir = self.dir.take();
        if let Err(e) = tokio::task::spawn_blocking(move || remove_all(&files, dir)).await {
            warn!("Upload cleanup task failed: {}", e);
        }
    }
}

impl Drop for UploadScratch {
    fn drop(&mut self) {
        remove_all(&self.files, self.dir.take());
    }
}

fn remove_all(files: &[PathBuf], dir: Option<TempDir>) {
    for path in files {
        match std::fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove upload {}: {}", path.display(), e),
        }
    }

    if let Some(dir) = dir {
        let path = dir.path().to_path_buf();
        if let Err(e) = dir.close() {
            warn!("Failed to remove upload dir {}: {}", path.display(), e);
        }
    }
}

/// Reduce a client-supplied filename to a safe single component
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.trim_matches('.').is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}
