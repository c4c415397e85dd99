// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Embedding endpoints
//!
//! - POST /embed/text
//! - POST /embed/image
//! - POST /embed/image-upload

pub mod handler;
pub mod request;
pub mod response;
pub mod upload;

pub use handler::{embed_image_handler, embed_text_handler};
pub use request::{ImageEmbeddingRequest, TextEmbeddingRequest};
pub use response::EmbeddingResponse;
pub use upload::{embed_image_upload_handler, sanitize_filename, UploadScratch};
