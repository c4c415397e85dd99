// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! OpenCLIP embeddings
//!
//! - `artifacts`: exported model files and where they come from
//! - `cache`: single-file model cache keyed by (model name, checkpoint)
//! - `bootstrap`: cache-or-fetch startup sequence
//! - `clip_model`: ONNX Runtime handle for the text and image towers
//! - `service`: async wrapper used by the HTTP handlers

pub mod artifacts;
pub mod backend;
pub mod bootstrap;
pub mod cache;
pub mod clip_model;
pub mod service;

pub use artifacts::{
    ArtifactPaths, ArtifactSource, ClipArtifacts, ClipConfig, HubArtifactSource,
    LocalArtifactSource,
};
pub use backend::EmbeddingBackend;
pub use bootstrap::{bootstrap_model, load_or_build};
pub use cache::{CacheError, ModelCache};
pub use clip_model::{l2_normalize, pad_tokens, ClipModel};
pub use service::{EmbeddingService, ModelInfo};
