// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Request bodies for the embedding endpoints

use serde::{Deserialize, Serialize};

/// Request body for POST /embed/text
///
/// ```json
/// { "texts": ["a dog", "a cat"] }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextEmbeddingRequest {
    pub texts: Vec<String>,
}

/// Request body for POST /embed/image
///
/// Each entry is an `http(s)://` URL, a `file://` URL, or a path. Relative
/// paths are resolved against the image mount directory.
///
/// ```json
/// { "image_uris": ["https://example.com/dog.jpg", "/images_host/cat.png"] }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageEmbeddingRequest {
    pub image_uris: Vec<String>,
}
