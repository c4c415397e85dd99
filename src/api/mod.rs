// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod embed;
pub mod errors;
pub mod handlers;
pub mod http_server;

pub use embed::{
    embed_image_handler, embed_image_upload_handler, embed_text_handler, EmbeddingResponse,
    ImageEmbeddingRequest, TextEmbeddingRequest,
};
pub use errors::{ApiError, ErrorResponse};
pub use handlers::{health_handler, ready_handler, HealthResponse, ReadyResponse};
pub use http_server::{create_app, start_server, AppState};
