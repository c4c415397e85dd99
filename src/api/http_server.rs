// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use super::embed::{embed_image_handler, embed_image_upload_handler, embed_text_handler};
use super::handlers::{health_handler, ready_handler};
use crate::embeddings::EmbeddingService;

/// Shared state handed to every handler
#[derive(Debug)]
pub struct AppState {
    pub service: Arc<EmbeddingService>,
    /// Parent of the per-request upload scratch directories
    pub upload_root: PathBuf,
    pub max_upload_bytes: usize,
}

pub fn create_app(state: Arc<AppState>) -> Router {
    let upload_limit = DefaultBodyLimit::max(state.max_upload_bytes);

    Router::new()
        // Liveness and readiness
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        // Embedding endpoints
        .route("/embed/text", post(embed_text_handler))
        .route("/embed/image", post(embed_image_handler))
        .route(
            "/embed/image-upload",
            post(embed_image_upload_handler).layer(upload_limit),
        )
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Serve until Ctrl+C
pub async fn start_server(state: Arc<AppState>, addr: SocketAddr) -> anyhow::Result<()> {
    let app = create_app(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Embedding API listening on {}", listener.local_addr()?);
    for endpoint in crate::version::ENDPOINTS {
        debug!("  {}", endpoint);
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = signal::ctrl_c().await;
            info!("Shutting down...");
        })
        .await?;

    Ok(())
}
