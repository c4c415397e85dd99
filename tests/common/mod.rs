// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Shared helpers for integration tests
#![allow(dead_code)]

use anyhow::Result;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use clip_embed_node::api::{create_app, AppState};
use clip_embed_node::embeddings::{l2_normalize, EmbeddingBackend, EmbeddingService};
use clip_embed_node::vision::ImageLoader;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

pub const FAKE_DIM: usize = 8;

/// Deterministic stand-in for the CLIP model
///
/// Vectors are derived from a hash of the input, so equal inputs give
/// equal vectors and different inputs almost surely differ.
#[derive(Debug, Default)]
pub struct FakeModel {
    pub text_calls: AtomicUsize,
    pub image_calls: AtomicUsize,
}

impl FakeModel {
    pub fn new() -> Self {
        Self::default()
    }
}

fn hashed_vector(seed: u64) -> Vec<f32> {
    let mut state = seed;
    let mut v: Vec<f32> = (0..FAKE_DIM)
        .map(|i| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407 ^ i as u64);
            ((state >> 40) as f32 / (1u64 << 24) as f32) * 2.0 - 1.0
        })
        .collect();
    l2_normalize(&mut v);
    v
}

impl EmbeddingBackend for FakeModel {
    fn model_name(&self) -> &str {
        "fake-clip"
    }

    fn checkpoint(&self) -> &str {
        "test"
    }

    fn dimension(&self) -> usize {
        FAKE_DIM
    }

    fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.text_calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|t| {
                let mut hasher = DefaultHasher::new();
                t.hash(&mut hasher);
                hashed_vector(hasher.finish())
            })
            .collect())
    }

    fn embed_images(&self, images: &[DynamicImage]) -> Result<Vec<Vec<f32>>> {
        self.image_calls.fetch_add(1, Ordering::SeqCst);
        Ok(images
            .iter()
            .map(|img| {
                let mut hasher = DefaultHasher::new();
                img.width().hash(&mut hasher);
                img.height().hash(&mut hasher);
                img.to_rgb8().as_raw().hash(&mut hasher);
                hashed_vector(hasher.finish())
            })
            .collect())
    }
}

/// Backend whose inference always fails
#[derive(Debug, Default)]
pub struct FailingModel;

impl EmbeddingBackend for FailingModel {
    fn model_name(&self) -> &str {
        "failing-clip"
    }

    fn checkpoint(&self) -> &str {
        "test"
    }

    fn dimension(&self) -> usize {
        FAKE_DIM
    }

    fn embed_texts(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        anyhow::bail!("inference exploded")
    }

    fn embed_images(&self, _images: &[DynamicImage]) -> Result<Vec<Vec<f32>>> {
        anyhow::bail!("inference exploded")
    }
}

/// Router plus the directories it writes to and reads from
pub struct TestApp {
    pub app: Router,
    pub state: Arc<AppState>,
    pub upload_root: TempDir,
    pub mount_dir: TempDir,
}

impl TestApp {
    pub fn new(backend: Arc<dyn EmbeddingBackend>) -> Self {
        let upload_root = tempfile::tempdir().unwrap();
        let mount_dir = tempfile::tempdir().unwrap();

        let loader = ImageLoader::new(mount_dir.path(), 1024 * 1024);
        let state = Arc::new(AppState {
            service: Arc::new(EmbeddingService::new(backend, loader)),
            upload_root: upload_root.path().to_path_buf(),
            max_upload_bytes: 4 * 1024 * 1024,
        });

        Self {
            app: create_app(state.clone()),
            state,
            upload_root,
            mount_dir,
        }
    }

    pub fn with_fake() -> Self {
        Self::new(Arc::new(FakeModel::new()))
    }

    /// Entries left under the upload root
    pub fn upload_leftovers(&self) -> usize {
        std::fs::read_dir(self.upload_root.path()).unwrap().count()
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        send(self.app.clone(), request).await
    }
}

pub async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(&bytes).into()))
    };
    (status, body)
}

pub fn json_request(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub const BOUNDARY: &str = "clip-test-boundary";

/// One multipart part: (field name, file name, bytes)
pub type Part<'a> = (&'a str, &'a str, &'a [u8]);

pub fn multipart_request(uri: &str, parts: &[Part<'_>]) -> Request<Body> {
    let mut body = Vec::new();
    for (field, file_name, bytes) in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                field, file_name
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

/// Small solid-color image encoded in `format`
pub fn image_bytes(color: [u8; 3], format: ImageFormat) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 12, Rgb(color)));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, format).unwrap();
    buf.into_inner()
}

pub fn png_bytes(color: [u8; 3]) -> Vec<u8> {
    image_bytes(color, ImageFormat::Png)
}

pub fn write_png(dir: &Path, name: &str, color: [u8; 3]) -> std::path::PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, png_bytes(color)).unwrap();
    path
}

pub fn embeddings_of(body: &serde_json::Value) -> Vec<Vec<f32>> {
    serde_json::from_value(body["embeddings"].clone()).unwrap()
}

/// In-memory artifacts with placeholder model bytes
pub fn sample_artifacts(model_name: &str, checkpoint: &str) -> clip_embed_node::embeddings::ClipArtifacts {
    use clip_embed_node::embeddings::{ClipArtifacts, ClipConfig};
    use clip_embed_node::vision::PreprocessConfig;

    ClipArtifacts {
        model_name: model_name.to_string(),
        checkpoint: checkpoint.to_string(),
        config: ClipConfig {
            embed_dim: Some(512),
            ..Default::default()
        },
        preprocess: PreprocessConfig::default(),
        tokenizer_json: r#"{"version": "1.0"}"#.to_string(),
        text_model: (0..=255u8).cycle().take(4096).collect(),
        image_model: vec![7u8; 2048],
    }
}

/// Write an export directory in the standard layout
pub fn write_export_dir(root: &Path) {
    let write = |rel: &str, contents: &[u8]| {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    };

    write(
        "config.json",
        br#"{"embed_dim": 512, "vision_cfg": {"image_size": 224}, "text_cfg": {"context_length": 77}}"#,
    );
    write(
        "visual/preprocess_cfg.json",
        br#"{"size": [224, 224], "mode": "RGB", "mean": [0.48145466, 0.4578275, 0.40821073], "std": [0.26862954, 0.26130258, 0.27577711], "interpolation": "bicubic", "resize_mode": "shortest", "fill_color": 0}"#,
    );
    write("textual/tokenizer.json", br#"{"version": "1.0"}"#);
    write("textual/model.onnx", b"text-onnx-bytes");
    write("visual/model.onnx", b"image-onnx-bytes");
}
