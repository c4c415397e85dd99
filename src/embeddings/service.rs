// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Async front for the embedding backend
//!
//! Handlers call into [`EmbeddingService`]; it resolves image locators,
//! then runs decoding and inference on the blocking pool.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use super::backend::EmbeddingBackend;
use crate::vision::{decode_image_bytes, ImageLoader};

/// Identity of the loaded model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub model: String,
    pub checkpoint: String,
    pub dimension: usize,
}

pub struct EmbeddingService {
    backend: Arc<dyn EmbeddingBackend>,
    loader: ImageLoader,
}

impl std::fmt::Debug for EmbeddingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingService")
            .field("model", &self.backend.model_name())
            .field("checkpoint", &self.backend.checkpoint())
            .field("loader", &self.loader)
            .finish()
    }
}

impl EmbeddingService {
    pub fn new(backend: Arc<dyn EmbeddingBackend>, loader: ImageLoader) -> Self {
        Self { backend, loader }
    }

    pub fn model_info(&self) -> ModelInfo {
        ModelInfo {
            model: self.backend.model_name().to_string(),
            checkpoint: self.backend.checkpoint().to_string(),
            dimension: self.backend.dimension(),
        }
    }

    /// Embed texts in order; an empty list never reaches the model
    pub async fn embed_texts(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let expected = texts.len();
        let backend = Arc::clone(&self.backend);
        let embeddings = tokio::task::spawn_blocking(move || backend.embed_texts(&texts))
            .await
            .context("Text embedding task failed")??;

        check_count(expected, embeddings)
    }

    /// Load, decode and embed images given by locator
    ///
    /// All-or-nothing: the first locator that cannot be read or decoded
    /// fails the whole call.
    pub async fn embed_image_locators(&self, locators: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if locators.is_empty() {
            return Ok(vec![]);
        }

        let blobs = self.loader.load_all(&locators).await?;
        debug!("Loaded {} images", blobs.len());

        let expected = locators.len();
        let max_bytes = self.loader.max_image_bytes();
        let backend = Arc::clone(&self.backend);
        let embeddings = tokio::task::spawn_blocking(move || {
            let images = blobs
                .iter()
                .zip(&locators)
                .map(|(bytes, locator)| {
                    decode_image_bytes(bytes, max_bytes)
                        .map(|(image, _)| image)
                        .with_context(|| format!("Failed to decode {}", locator))
                })
                .collect::<Result<Vec<_>>>()?;
            backend.embed_images(&images)
        })
        .await
        .context("Image embedding task failed")??;

        check_count(expected, embeddings)
    }
}

fn check_count(expected: usize, embeddings: Vec<Vec<f32>>) -> Result<Vec<Vec<f32>>> {
    if embeddings.len() != expected {
        anyhow::bail!(
            "Model returned {} embeddings for {} inputs",
            embeddings.len(),
            expected
        );
    }
    Ok(embeddings)
}
