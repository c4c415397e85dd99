// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Service configuration
//!
//! Every option can be given as a command-line flag or through the
//! environment. `main` loads a `.env` file before parsing.

use anyhow::Context;
use clap::Args;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Default OpenCLIP architecture
pub const DEFAULT_MODEL_NAME: &str = "ViT-B-32";

/// Default pretrained checkpoint for [`DEFAULT_MODEL_NAME`]
pub const DEFAULT_CHECKPOINT: &str = "laion2b_s34b_b79k";

/// Configuration for the embedding service
#[derive(Args, Debug, Clone)]
pub struct ServiceConfig {
    /// OpenCLIP model architecture name
    #[arg(long = "model-name", env = "CLIP_MODEL_NAME", default_value = DEFAULT_MODEL_NAME)]
    pub model_name: String,

    /// Pretrained checkpoint identifier
    #[arg(long = "checkpoint", env = "CLIP_CHECKPOINT", default_value = DEFAULT_CHECKPOINT)]
    pub checkpoint_id: String,

    /// Directory holding the cached model file
    #[arg(long, env = "MODEL_CACHE_DIR", default_value = "/model_cache")]
    pub cache_dir: PathBuf,

    /// Directory that relative image paths are resolved against
    #[arg(long, env = "IMAGE_MOUNT_DIR", default_value = "/images_host")]
    pub image_mount_dir: PathBuf,

    #[arg(long = "host", env = "HOST", default_value = "0.0.0.0")]
    pub listen_host: String,

    #[arg(long = "port", env = "PORT", default_value_t = 8000)]
    pub listen_port: u16,

    /// HuggingFace namespace publishing `<model>__<checkpoint>` exports
    #[arg(long, env = "CLIP_HUB_NAMESPACE", default_value = "immich-app")]
    pub hub_namespace: String,

    /// Explicit HuggingFace repository, overrides the namespace lookup
    #[arg(long, env = "CLIP_HUB_REPO")]
    pub hub_repo: Option<String>,

    #[arg(long, env = "CLIP_HUB_REVISION", default_value = "main")]
    pub hub_revision: String,

    /// Local export directory used instead of the HuggingFace Hub
    #[arg(long, env = "CLIP_ARTIFACT_DIR")]
    pub artifact_dir: Option<PathBuf>,

    /// ONNX Runtime intra-op threads per session
    #[arg(long, env = "ORT_INTRA_THREADS", default_value_t = 4)]
    pub intra_threads: usize,

    /// Parent directory for per-request upload scratch directories
    #[arg(long, env = "UPLOAD_TMP_DIR")]
    pub upload_dir: Option<PathBuf>,

    /// Request body limit for multipart uploads
    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value_t = 50 * 1024 * 1024)]
    pub max_upload_bytes: usize,

    /// Largest single image accepted from a locator or upload
    #[arg(long, env = "MAX_IMAGE_BYTES", default_value_t = 20 * 1024 * 1024)]
    pub max_image_bytes: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            model_name: DEFAULT_MODEL_NAME.to_string(),
            checkpoint_id: DEFAULT_CHECKPOINT.to_string(),
            cache_dir: PathBuf::from("/model_cache"),
            image_mount_dir: PathBuf::from("/images_host"),
            listen_host: "0.0.0.0".to_string(),
            listen_port: 8000,
            hub_namespace: "immich-app".to_string(),
            hub_repo: None,
            hub_revision: "main".to_string(),
            artifact_dir: None,
            intra_threads: 4,
            upload_dir: None,
            max_upload_bytes: 50 * 1024 * 1024,
            max_image_bytes: 20 * 1024 * 1024,
        }
    }
}

impl ServiceConfig {
    /// HuggingFace repository holding the exported towers for this model
    pub fn hub_repo_id(&self) -> String {
        match &self.hub_repo {
            Some(repo) => repo.clone(),
            None => format!(
                "{}/{}__{}",
                self.hub_namespace, self.model_name, self.checkpoint_id
            ),
        }
    }

    /// Parent directory for upload scratch space
    pub fn upload_root(&self) -> PathBuf {
        self.upload_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Resolve the listen host, which may be an IPv4/IPv6 literal or a hostname
    pub async fn listen_addr(&self) -> anyhow::Result<SocketAddr> {
        let host = self.listen_host.as_str();
        tokio::net::lookup_host((host, self.listen_port))
            .await
            .with_context(|| format!("Invalid listen host {}", host))?
            .next()
            .ok_or_else(|| anyhow::anyhow!("Listen host {} resolved to no addresses", host))
    }
}
