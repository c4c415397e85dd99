// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! HTTP client for the embedding API

use anyhow::{anyhow, Context, Result};
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::api::embed::upload::UPLOAD_FIELD;
use crate::api::{
    EmbeddingResponse, ErrorResponse, HealthResponse, ImageEmbeddingRequest, ReadyResponse,
    TextEmbeddingRequest,
};

pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// File extensions picked up when uploading a directory
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif"];

#[derive(Debug, Clone)]
pub struct EmbedClient {
    http: reqwest::Client,
    base_url: String,
}

impl EmbedClient {
    pub fn new(api_url: &str) -> Result<Self> {
        let parsed = url::Url::parse(api_url).with_context(|| format!("Invalid API URL {}", api_url))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            anyhow::bail!("API URL must be http or https: {}", api_url);
        }

        Ok(Self {
            http: reqwest::Client::new(),
            base_url: api_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn embed_texts(&self, texts: Vec<String>) -> Result<EmbeddingResponse> {
        self.post_json("/embed/text", &TextEmbeddingRequest { texts })
            .await
    }

    pub async fn embed_uris(&self, image_uris: Vec<String>) -> Result<EmbeddingResponse> {
        self.post_json("/embed/image", &ImageEmbeddingRequest { image_uris })
            .await
    }

    /// Upload local files as repeated `images` parts
    pub async fn upload(&self, paths: &[PathBuf]) -> Result<EmbeddingResponse> {
        ensure_files_exist(paths)?;

        let mut form = Form::new();
        for path in paths {
            let bytes = tokio::fs::read(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "upload".to_string());
            let part = Part::bytes(bytes)
                .file_name(file_name)
                .mime_str(mime_for(path))?;
            form = form.part(UPLOAD_FIELD, part);
        }

        debug!("Uploading {} files", paths.len());
        let response = self
            .http
            .post(self.url("/embed/image-upload"))
            .multipart(form)
            .send()
            .await
            .context("Failed to send upload request")?;

        decode(response).await
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        let response = self
            .http
            .get(self.url("/health"))
            .send()
            .await
            .context("Failed to reach health endpoint")?;
        decode(response).await
    }

    pub async fn ready(&self) -> Result<ReadyResponse> {
        let response = self
            .http
            .get(self.url("/ready"))
            .send()
            .await
            .context("Failed to reach ready endpoint")?;
        decode(response).await
    }

    async fn post_json<T: Serialize>(&self, path: &str, body: &T) -> Result<EmbeddingResponse> {
        let response = self
            .http
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", path))?;
        decode(response).await
    }
}

async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        return response.json::<T>().await.context("Invalid response body");
    }

    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorResponse>(&body) {
        Ok(err) => Err(anyhow!("Server returned {}: {}", status, err.message)),
        Err(_) => Err(anyhow!("Server returned {}: {}", status, body)),
    }
}

/// Fail with every missing path listed, before any request is made
pub fn ensure_files_exist(paths: &[PathBuf]) -> Result<()> {
    let missing: Vec<String> = paths
        .iter()
        .filter(|p| !p.is_file())
        .map(|p| p.display().to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(anyhow!("Files not found: {}", missing.join(", ")))
    }
}

/// Image files directly inside `dir`, as sorted absolute paths
pub fn find_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let dir = std::fs::canonicalize(dir)
        .with_context(|| format!("Directory not found: {}", dir.display()))?;

    let mut images = Vec::new();
    for entry in std::fs::read_dir(&dir)
        .with_context(|| format!("Failed to list {}", dir.display()))?
    {
        let path = entry?.path();
        if path.is_file() && has_image_extension(&path) {
            images.push(path);
        }
    }

    images.sort();
    Ok(images)
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    }
}
