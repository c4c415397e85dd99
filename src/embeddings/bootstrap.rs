// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Model bootstrap
//!
//! Runs once before the listener binds:
//! 1. Try the cache file for (model name, checkpoint)
//! 2. On a miss or a bad cache, fetch fresh artifacts and build the model
//! 3. Persist the fresh artifacts for the next start
//!
//! Only step 2 can fail startup. Cache problems are logged and skipped.

use anyhow::{Context, Result};
use tracing::{info, warn};

use super::artifacts::{ArtifactSource, ClipArtifacts, HubArtifactSource, LocalArtifactSource};
use super::cache::ModelCache;
use super::clip_model::ClipModel;
use crate::config::ServiceConfig;

/// Load a model from cache, or build it fresh and cache it
///
/// `build` turns artifacts into a usable model; it is called at most twice
/// (once for cached artifacts, once for fresh ones).
pub fn load_or_build<S, M, F>(cache: &ModelCache, source: &S, build: F) -> Result<M>
where
    S: ArtifactSource + ?Sized,
    F: Fn(&ClipArtifacts) -> Result<M>,
{
    let path = cache.path();

    if cache.exists() {
        info!("Loading cached model from {}", path.display());
        match cache.load() {
            Ok(artifacts) => match build(&artifacts) {
                Ok(model) => return Ok(model),
                Err(e) => warn!("Cached model could not be built, reloading: {:#}", e),
            },
            Err(e) => warn!("Failed to load cached model, reloading: {}", e),
        }
    } else {
        info!("No cached model found, loading from scratch");
    }

    let (model_name, checkpoint) = cache.identity();
    let artifacts = source
        .fetch(model_name, checkpoint)
        .context("Failed to load or cache OpenCLIP model")?;
    info!(
        "Fetched {} ({}), {} bytes of ONNX graphs",
        model_name,
        checkpoint,
        artifacts.model_bytes()
    );
    let model = build(&artifacts).context("Failed to load or cache OpenCLIP model")?;

    match cache.store(&artifacts) {
        Ok(path) => info!("Model cached to {}", path.display()),
        Err(e) => warn!("Failed to cache model to {}: {}", path.display(), e),
    }

    Ok(model)
}

/// Produce the service's model handle from configuration
pub fn bootstrap_model(config: &ServiceConfig) -> Result<ClipModel> {
    let cache = ModelCache::new(&config.cache_dir, &config.model_name, &config.checkpoint_id);
    let source: Box<dyn ArtifactSource> = match &config.artifact_dir {
        Some(dir) => Box::new(LocalArtifactSource::new(dir)),
        None => Box::new(HubArtifactSource::new(
            config.hub_repo_id(),
            &config.hub_revision,
            config.cache_dir.join("hub"),
        )),
    };

    let intra_threads = config.intra_threads;
    load_or_build(&cache, source.as_ref(), |artifacts| {
        ClipModel::from_artifacts(artifacts, intra_threads)
    })
}
