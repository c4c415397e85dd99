// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::http_server::AppState;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReadyResponse {
    pub status: String,
    pub model: String,
    pub checkpoint: String,
    pub dimension: usize,
}

/// GET /health
///
/// Liveness only; never touches the model.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// GET /ready
pub async fn ready_handler(State(state): State<Arc<AppState>>) -> Json<ReadyResponse> {
    let info = state.service.model_info();
    Json(ReadyResponse {
        status: "ready".to_string(),
        model: info.model,
        checkpoint: info.checkpoint,
        dimension: info.dimension,
    })
}
