// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! OpenCLIP model artifacts
//!
//! An exported OpenCLIP model is a directory (or HuggingFace repository)
//! with this layout:
//!
//! ```text
//! config.json                 embed_dim, vision_cfg.image_size, text_cfg.context_length
//! textual/model.onnx          text tower
//! textual/tokenizer.json      CLIP BPE tokenizer
//! visual/model.onnx           image tower
//! visual/preprocess_cfg.json  size, mean, std, interpolation, resize_mode
//! ```
//!
//! [`ClipArtifacts`] holds all of it in memory and is what the model cache
//! persists between restarts.

use anyhow::{Context, Result};
use hf_hub::api::sync::ApiBuilder;
use hf_hub::{Repo, RepoType};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::vision::preprocessing::{
    Interpolation, PreprocessConfig, ResizeMode, CLIP_INPUT_SIZE, CLIP_MEAN, CLIP_STD,
};

pub const CONFIG_FILE: &str = "config.json";
pub const TEXT_MODEL_FILE: &str = "textual/model.onnx";
pub const TOKENIZER_FILE: &str = "textual/tokenizer.json";
pub const IMAGE_MODEL_FILE: &str = "visual/model.onnx";
pub const PREPROCESS_FILE: &str = "visual/preprocess_cfg.json";

/// CLIP text context length used when config.json omits it
pub const DEFAULT_CONTEXT_LENGTH: usize = 77;

/// Model-level settings read from config.json
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipConfig {
    /// Declared embedding width, checked against the probed output
    pub embed_dim: Option<usize>,
    pub context_length: usize,
    pub image_size: u32,
}

impl Default for ClipConfig {
    fn default() -> Self {
        Self {
            embed_dim: None,
            context_length: DEFAULT_CONTEXT_LENGTH,
            image_size: CLIP_INPUT_SIZE,
        }
    }
}

/// Everything needed to construct a model handle, held in memory
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipArtifacts {
    pub model_name: String,
    pub checkpoint: String,
    pub config: ClipConfig,
    pub preprocess: PreprocessConfig,
    pub tokenizer_json: String,
    pub text_model: Vec<u8>,
    pub image_model: Vec<u8>,
}

impl std::fmt::Debug for ClipArtifacts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClipArtifacts")
            .field("model_name", &self.model_name)
            .field("checkpoint", &self.checkpoint)
            .field("config", &self.config)
            .field("text_model_bytes", &self.text_model.len())
            .field("image_model_bytes", &self.image_model.len())
            .finish_non_exhaustive()
    }
}

/// On-disk locations of the five artifact files
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    pub config: PathBuf,
    pub text_model: PathBuf,
    pub tokenizer: PathBuf,
    pub image_model: PathBuf,
    pub preprocess: PathBuf,
}

impl ArtifactPaths {
    /// Standard layout under an export directory
    pub fn in_dir(root: &Path) -> Self {
        Self {
            config: root.join(CONFIG_FILE),
            text_model: root.join(TEXT_MODEL_FILE),
            tokenizer: root.join(TOKENIZER_FILE),
            image_model: root.join(IMAGE_MODEL_FILE),
            preprocess: root.join(PREPROCESS_FILE),
        }
    }
}

impl ClipArtifacts {
    /// Read and parse artifact files into memory
    pub fn from_files(model_name: &str, checkpoint: &str, paths: &ArtifactPaths) -> Result<Self> {
        let read = |path: &Path| {
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
        };
        let read_string = |path: &Path| {
            std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))
        };

        let config = parse_model_config(&read_string(&paths.config)?)
            .with_context(|| format!("Invalid model config {}", paths.config.display()))?;
        let preprocess = parse_preprocess_config(&read_string(&paths.preprocess)?)
            .with_context(|| format!("Invalid preprocess config {}", paths.preprocess.display()))?;

        if preprocess.image_size != config.image_size {
            anyhow::bail!(
                "Image size mismatch: config.json declares {}, preprocess_cfg.json declares {}",
                config.image_size,
                preprocess.image_size
            );
        }

        Ok(Self {
            model_name: model_name.to_string(),
            checkpoint: checkpoint.to_string(),
            config,
            preprocess,
            tokenizer_json: read_string(&paths.tokenizer)?,
            text_model: read(&paths.text_model)?,
            image_model: read(&paths.image_model)?,
        })
    }

    /// Total bytes of both ONNX graphs
    pub fn model_bytes(&self) -> usize {
        self.text_model.len() + self.image_model.len()
    }
}

/// Produces fresh artifacts for a (model name, checkpoint) pair
pub trait ArtifactSource {
    fn fetch(&self, model_name: &str, checkpoint: &str) -> Result<ClipArtifacts>;
}

/// Reads artifacts from a local export directory
#[derive(Debug, Clone)]
pub struct LocalArtifactSource {
    root: PathBuf,
}

impl LocalArtifactSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ArtifactSource for LocalArtifactSource {
    fn fetch(&self, model_name: &str, checkpoint: &str) -> Result<ClipArtifacts> {
        info!(
            "Loading {} ({}) artifacts from {}",
            model_name,
            checkpoint,
            self.root.display()
        );
        ClipArtifacts::from_files(model_name, checkpoint, &ArtifactPaths::in_dir(&self.root))
    }
}

/// Downloads artifacts from a HuggingFace Hub repository
#[derive(Debug, Clone)]
pub struct HubArtifactSource {
    repo_id: String,
    revision: String,
    download_dir: PathBuf,
}

impl HubArtifactSource {
    pub fn new(repo_id: impl Into<String>, revision: impl Into<String>, download_dir: PathBuf) -> Self {
        Self {
            repo_id: repo_id.into(),
            revision: revision.into(),
            download_dir,
        }
    }
}

impl ArtifactSource for HubArtifactSource {
    fn fetch(&self, model_name: &str, checkpoint: &str) -> Result<ClipArtifacts> {
        info!(
            "Downloading {} ({}) from HuggingFace repo {}@{}",
            model_name, checkpoint, self.repo_id, self.revision
        );

        let api = ApiBuilder::new()
            .with_cache_dir(self.download_dir.clone())
            .with_token(std::env::var("HF_TOKEN").ok())
            .with_progress(false)
            .build()
            .context("Failed to create HuggingFace Hub client")?;

        let repo = api.repo(Repo::with_revision(
            self.repo_id.clone(),
            RepoType::Model,
            self.revision.clone(),
        ));

        let get = |file: &str| {
            repo.get(file)
                .with_context(|| format!("Failed to download {} from {}", file, self.repo_id))
        };

        let paths = ArtifactPaths {
            config: get(CONFIG_FILE)?,
            text_model: get(TEXT_MODEL_FILE)?,
            tokenizer: get(TOKENIZER_FILE)?,
            image_model: get(IMAGE_MODEL_FILE)?,
            preprocess: get(PREPROCESS_FILE)?,
        };

        ClipArtifacts::from_files(model_name, checkpoint, &paths)
    }
}

/// Either a square edge length or an explicit `[h, w]` pair
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SizeSpec {
    Square(u32),
    Pair([u32; 2]),
}

impl SizeSpec {
    fn square(&self) -> Result<u32> {
        match *self {
            SizeSpec::Square(size) => Ok(size),
            SizeSpec::Pair([h, w]) if h == w => Ok(h),
            SizeSpec::Pair([h, w]) => anyhow::bail!("Non-square image size {}x{} is not supported", w, h),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawModelConfig {
    embed_dim: Option<usize>,
    #[serde(default)]
    vision_cfg: RawVisionConfig,
    #[serde(default)]
    text_cfg: RawTextConfig,
}

#[derive(Debug, Default, Deserialize)]
struct RawVisionConfig {
    image_size: Option<SizeSpec>,
}

#[derive(Debug, Default, Deserialize)]
struct RawTextConfig {
    context_length: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct RawPreprocessConfig {
    size: Option<SizeSpec>,
    mean: Option<[f32; 3]>,
    std: Option<[f32; 3]>,
    interpolation: Option<String>,
    resize_mode: Option<String>,
    fill_color: Option<u8>,
}

pub fn parse_model_config(json: &str) -> Result<ClipConfig> {
    let raw: RawModelConfig = serde_json::from_str(json)?;
    let image_size = match raw.vision_cfg.image_size {
        Some(spec) => spec.square()?,
        None => CLIP_INPUT_SIZE,
    };
    let context_length = raw.text_cfg.context_length.unwrap_or(DEFAULT_CONTEXT_LENGTH);
    if context_length < 2 {
        anyhow::bail!("context_length must be at least 2, got {}", context_length);
    }

    Ok(ClipConfig {
        embed_dim: raw.embed_dim,
        context_length,
        image_size,
    })
}

pub fn parse_preprocess_config(json: &str) -> Result<PreprocessConfig> {
    let raw: RawPreprocessConfig = serde_json::from_str(json)?;

    let interpolation = match raw.interpolation.as_deref() {
        None | Some("bicubic") => Interpolation::Bicubic,
        Some("bilinear") => Interpolation::Bilinear,
        Some("nearest") => Interpolation::Nearest,
        Some(other) => anyhow::bail!("Unsupported interpolation: {}", other),
    };

    let resize_mode = match raw.resize_mode.as_deref() {
        None | Some("shortest") => ResizeMode::Shortest,
        Some("longest") => ResizeMode::Longest,
        Some("squash") => ResizeMode::Squash,
        Some(other) => anyhow::bail!("Unsupported resize_mode: {}", other),
    };

    let std = raw.std.unwrap_or(CLIP_STD);
    if std.iter().any(|s| *s == 0.0) {
        anyhow::bail!("std values must be non-zero");
    }

    Ok(PreprocessConfig {
        image_size: match raw.size {
            Some(spec) => spec.square()?,
            None => CLIP_INPUT_SIZE,
        },
        mean: raw.mean.unwrap_or(CLIP_MEAN),
        std,
        interpolation,
        resize_mode,
        fill_color: raw.fill_color.unwrap_or(0),
    })
}
