// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Embedding backend seam between the HTTP layer and the model

use anyhow::Result;
use image::DynamicImage;

/// Anything that maps texts and images into one shared vector space
///
/// Calls are blocking and CPU-bound; async callers go through
/// [`super::EmbeddingService`], which moves them onto the blocking pool.
/// Output is parallel to input: one vector per item, same order.
pub trait EmbeddingBackend: Send + Sync {
    fn model_name(&self) -> &str;

    fn checkpoint(&self) -> &str;

    /// Length of every returned vector
    fn dimension(&self) -> usize;

    fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn embed_images(&self, images: &[DynamicImage]) -> Result<Vec<Vec<f32>>>;
}
