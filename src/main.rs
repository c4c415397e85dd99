// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{Context, Result};
use clap::Parser;
use clip_embed_node::{
    api::{start_server, AppState},
    config::ServiceConfig,
    embeddings::{bootstrap_model, EmbeddingBackend, EmbeddingService},
    version,
    vision::ImageLoader,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "clip-embed-node", version, about = "OpenCLIP embedding HTTP service")]
struct NodeArgs {
    #[command(flatten)]
    config: ServiceConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = NodeArgs::parse().config;
    let addr = config.listen_addr().await?;

    info!("🚀 Starting {}", version::get_version_string());
    info!(
        "Model: {} ({}), cache dir: {}",
        config.model_name,
        config.checkpoint_id,
        config.cache_dir.display()
    );

    // The listener only binds once a model is available
    let model = {
        let config = config.clone();
        tokio::task::spawn_blocking(move || bootstrap_model(&config))
            .await
            .context("Model bootstrap task failed")??
    };
    let backend: Arc<dyn EmbeddingBackend> = Arc::new(model);

    let loader = ImageLoader::new(&config.image_mount_dir, config.max_image_bytes);
    let state = Arc::new(AppState {
        service: Arc::new(EmbeddingService::new(backend, loader)),
        upload_root: config.upload_root(),
        max_upload_bytes: config.max_upload_bytes,
    });

    start_server(state, addr).await
}
