// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Version information for the CLIP embedding node

/// Semantic version number
pub const VERSION_NUMBER: &str = env!("CARGO_PKG_VERSION");

/// Endpoints served by this version
pub const ENDPOINTS: &[&str] = &[
    "GET /health",
    "GET /ready",
    "POST /embed/text",
    "POST /embed/image",
    "POST /embed/image-upload",
];

/// Get formatted version string for logging
pub fn get_version_string() -> String {
    format!("CLIP Embed Node {}", VERSION_NUMBER)
}
