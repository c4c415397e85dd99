// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! POST /embed/text and POST /embed/image handlers

use axum::{extract::State, Json};
use std::sync::Arc;
use tracing::{debug, info};

use super::request::{ImageEmbeddingRequest, TextEmbeddingRequest};
use super::response::EmbeddingResponse;
use crate::api::http_server::AppState;
use crate::api::ApiError;

pub const TEXT_ERROR_PREFIX: &str = "Error embedding text";
pub const IMAGE_ERROR_PREFIX: &str = "Error embedding image";

/// POST /embed/text
///
/// Returns one vector per text, in request order. An empty list returns
/// `{"embeddings": []}` without running the model.
pub async fn embed_text_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TextEmbeddingRequest>,
) -> Result<Json<EmbeddingResponse>, ApiError> {
    info!("Embedding {} texts", request.texts.len());

    let embeddings = state
        .service
        .embed_texts(request.texts)
        .await
        .map_err(|e| ApiError::internal(TEXT_ERROR_PREFIX, &e))?;

    debug!("Returning {} text embeddings", embeddings.len());
    Ok(Json(embeddings.into()))
}

/// POST /embed/image
///
/// Loads every locator, then embeds them as one batch. Any locator that
/// cannot be fetched or decoded fails the whole request.
pub async fn embed_image_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ImageEmbeddingRequest>,
) -> Result<Json<EmbeddingResponse>, ApiError> {
    info!("Embedding {} images by locator", request.image_uris.len());

    let embeddings = state
        .service
        .embed_image_locators(request.image_uris)
        .await
        .map_err(|e| ApiError::internal(IMAGE_ERROR_PREFIX, &e))?;

    debug!("Returning {} image embeddings", embeddings.len());
    Ok(Json(embeddings.into()))
}
