// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! OpenCLIP model handle
//!
//! Wraps ONNX Runtime sessions for the two OpenCLIP towers:
//! - text tower: CLIP BPE tokens `[batch, context_length]` -> `[batch, dim]`
//! - image tower: normalized pixels `[batch, 3, size, size]` -> `[batch, dim]`
//!
//! Both towers project into the same space, so text and image vectors are
//! directly comparable. Outputs are L2-normalized before they leave here.

use anyhow::{Context, Result};
use image::DynamicImage;
use ndarray::{Array2, ArrayViewD, Ix2};
use ort::execution_providers::{CPUExecutionProvider, CUDAExecutionProvider};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::tensor::TensorElementType;
use ort::value::{Value, ValueType};
use std::sync::Mutex;
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use super::artifacts::ClipArtifacts;
use super::backend::EmbeddingBackend;
use crate::vision::preprocessing::{preprocess_batch, PreprocessConfig};

/// End-of-text marker in the CLIP BPE vocabulary
pub const EOT_TOKEN: &str = "<|endoftext|>";

const PROBE_TEXT: &str = "a photo of a cat";

/// Loaded OpenCLIP model
///
/// Built once at startup and shared read-only. `Session::run` needs
/// exclusive access, so each tower sits behind its own mutex and concurrent
/// requests queue per tower.
pub struct ClipModel {
    text_session: Mutex<Session>,
    image_session: Mutex<Session>,
    tokenizer: Tokenizer,
    text_input: String,
    text_input_is_i32: bool,
    image_input: String,
    preprocess: PreprocessConfig,
    model_name: String,
    checkpoint: String,
    dimension: usize,
    context_length: usize,
    eot_token_id: Option<u32>,
}

impl std::fmt::Debug for ClipModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClipModel")
            .field("model_name", &self.model_name)
            .field("checkpoint", &self.checkpoint)
            .field("dimension", &self.dimension)
            .field("context_length", &self.context_length)
            .field("text_input", &self.text_input)
            .field("image_input", &self.image_input)
            .finish_non_exhaustive()
    }
}

impl ClipModel {
    /// Build a model handle from in-memory artifacts
    ///
    /// Runs one probe input through each tower to learn the embedding
    /// dimension.
    ///
    /// # Errors
    /// Returns error if:
    /// - Either ONNX graph or the tokenizer fails to load
    /// - The towers disagree on output dimension
    /// - The probed dimension differs from `embed_dim` in config.json
    pub fn from_artifacts(artifacts: &ClipArtifacts, intra_threads: usize) -> Result<Self> {
        info!(
            "Building OpenCLIP model {} ({})",
            artifacts.model_name, artifacts.checkpoint
        );

        let text_session = build_session("text", &artifacts.text_model, intra_threads)?;
        let image_session = build_session("image", &artifacts.image_model, intra_threads)?;

        let mut tokenizer = Tokenizer::from_bytes(artifacts.tokenizer_json.as_bytes())
            .map_err(|e| anyhow::anyhow!("Failed to load tokenizer: {}", e))?;
        // Padding and truncation are applied by pad_tokens
        tokenizer.with_padding(None);
        tokenizer
            .with_truncation(None)
            .map_err(|e| anyhow::anyhow!("Failed to configure tokenizer: {}", e))?;
        let eot_token_id = tokenizer.token_to_id(EOT_TOKEN);
        if eot_token_id.is_none() {
            warn!("Tokenizer has no {} token, truncation keeps the raw prefix", EOT_TOKEN);
        }

        let text = text_session
            .inputs
            .first()
            .context("Text model has no inputs")?;
        let text_input = text.name.clone();
        let text_input_is_i32 = matches!(
            text.input_type,
            ValueType::Tensor {
                ty: TensorElementType::Int32,
                ..
            }
        );

        let image_input = image_session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .context("Image model has no inputs")?;

        debug!(
            "Text input: {} ({}), image input: {}",
            text_input,
            if text_input_is_i32 { "int32" } else { "int64" },
            image_input
        );

        let mut model = Self {
            text_session: Mutex::new(text_session),
            image_session: Mutex::new(image_session),
            tokenizer,
            text_input,
            text_input_is_i32,
            image_input,
            preprocess: artifacts.preprocess.clone(),
            model_name: artifacts.model_name.clone(),
            checkpoint: artifacts.checkpoint.clone(),
            dimension: 0,
            context_length: artifacts.config.context_length,
            eot_token_id,
        };

        let text_dim = model
            .run_text_tower(&[PROBE_TEXT.to_string()])
            .context("Text tower probe failed")?
            .ncols();
        let size = model.preprocess.image_size;
        let image_dim = model
            .run_image_tower(&[DynamicImage::new_rgb8(size, size)])
            .context("Image tower probe failed")?
            .ncols();

        if text_dim != image_dim {
            anyhow::bail!(
                "Text tower outputs {} dimensions but image tower outputs {}",
                text_dim,
                image_dim
            );
        }
        if let Some(declared) = artifacts.config.embed_dim {
            if declared != text_dim {
                anyhow::bail!(
                    "Model outputs {} dimensions (config.json declares {})",
                    text_dim,
                    declared
                );
            }
        }

        model.dimension = text_dim;
        info!(
            "✅ OpenCLIP model {} ({}) ready, {}D embeddings",
            model.model_name, model.checkpoint, model.dimension
        );

        Ok(model)
    }

    pub fn context_length(&self) -> usize {
        self.context_length
    }

    fn tokenize(&self, text: &str) -> Result<Vec<i64>> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| anyhow::anyhow!("Tokenization failed: {}", e))?;
        Ok(pad_tokens(
            encoding.get_ids(),
            self.context_length,
            self.eot_token_id,
        ))
    }

    /// Raw text tower output `[texts.len(), dim]`
    fn run_text_tower(&self, texts: &[String]) -> Result<Array2<f32>> {
        let ctx = self.context_length;
        let mut ids = Vec::with_capacity(texts.len() * ctx);
        for text in texts {
            ids.extend(self.tokenize(text)?);
        }

        let ids = Array2::from_shape_vec((texts.len(), ctx), ids)
            .context("Failed to create token array")?;
        let input = if self.text_input_is_i32 {
            Value::from_array(ids.mapv(|id| id as i32))?.into_dyn()
        } else {
            Value::from_array(ids)?.into_dyn()
        };

        let mut session = self
            .text_session
            .lock()
            .map_err(|_| anyhow::anyhow!("Text session lock poisoned"))?;
        let outputs = session
            .run(ort::inputs![self.text_input.as_str() => input])
            .context("Text tower inference failed")?;
        let output = outputs[0]
            .try_extract_array::<f32>()
            .context("Failed to extract text output tensor")?;

        to_rows(output, texts.len())
    }

    /// Raw image tower output `[images.len(), dim]`
    fn run_image_tower(&self, images: &[DynamicImage]) -> Result<Array2<f32>> {
        let pixels = preprocess_batch(images, &self.preprocess);
        let input = Value::from_array(pixels).context("Failed to create image tensor")?;

        let mut session = self
            .image_session
            .lock()
            .map_err(|_| anyhow::anyhow!("Image session lock poisoned"))?;
        let outputs = session
            .run(ort::inputs![self.image_input.as_str() => input])
            .context("Image tower inference failed")?;
        let output = outputs[0]
            .try_extract_array::<f32>()
            .context("Failed to extract image output tensor")?;

        to_rows(output, images.len())
    }

    fn finish(&self, rows: Array2<f32>) -> Result<Vec<Vec<f32>>> {
        if rows.ncols() != self.dimension {
            anyhow::bail!(
                "Unexpected embedding dimension: {} (expected {})",
                rows.ncols(),
                self.dimension
            );
        }

        Ok(rows
            .outer_iter()
            .map(|row| {
                let mut v = row.to_vec();
                l2_normalize(&mut v);
                v
            })
            .collect())
    }
}

impl EmbeddingBackend for ClipModel {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn checkpoint(&self) -> &str {
        &self.checkpoint
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        let rows = self.run_text_tower(texts)?;
        self.finish(rows)
    }

    fn embed_images(&self, images: &[DynamicImage]) -> Result<Vec<Vec<f32>>> {
        if images.is_empty() {
            return Ok(vec![]);
        }
        let rows = self.run_image_tower(images)?;
        self.finish(rows)
    }
}

/// Create a session, preferring CUDA and falling back to CPU
fn build_session(label: &str, model_bytes: &[u8], intra_threads: usize) -> Result<Session> {
    let cuda_result = Session::builder()
        .context("Failed to create session builder")?
        .with_execution_providers([CUDAExecutionProvider::default().build()])
        .context("Failed to set CUDA execution provider")?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .context("Failed to set optimization level")?
        .with_intra_threads(intra_threads)
        .context("Failed to set intra threads")?
        .commit_from_memory(model_bytes);

    match cuda_result {
        Ok(session) => {
            info!("{} tower loaded with CUDA execution provider", label);
            Ok(session)
        }
        Err(e) => {
            warn!("⚠️  CUDA execution provider failed for {} tower: {}", label, e);
            let session = Session::builder()
                .context("Failed to create session builder")?
                .with_execution_providers([CPUExecutionProvider::default().build()])
                .context("Failed to set CPU execution provider")?
                .with_optimization_level(GraphOptimizationLevel::Level3)
                .context("Failed to set optimization level")?
                .with_intra_threads(intra_threads)
                .context("Failed to set intra threads")?
                .commit_from_memory(model_bytes)
                .with_context(|| format!("Failed to load {} tower", label))?;
            info!("{} tower loaded with CPU execution provider", label);
            Ok(session)
        }
    }
}

fn to_rows(output: ArrayViewD<'_, f32>, expected_rows: usize) -> Result<Array2<f32>> {
    let shape = output.shape().to_vec();
    let rows = output
        .into_dimensionality::<Ix2>()
        .map_err(|_| anyhow::anyhow!("Model output has shape {:?}, expected [batch, dim]", shape))?;
    if rows.nrows() != expected_rows {
        anyhow::bail!(
            "Model returned {} rows for {} inputs",
            rows.nrows(),
            expected_rows
        );
    }
    Ok(rows.to_owned())
}

/// Fit token ids to exactly `context_length` entries
///
/// Long sequences are cut and, when `eot` is known, end with it so the text
/// tower still pools on the end-of-text position. Short ones are zero-padded.
pub fn pad_tokens(ids: &[u32], context_length: usize, eot: Option<u32>) -> Vec<i64> {
    let mut out: Vec<i64> = ids
        .iter()
        .take(context_length)
        .map(|&id| id as i64)
        .collect();

    if ids.len() > context_length {
        if let (Some(eot), Some(last)) = (eot, out.last_mut()) {
            *last = eot as i64;
        }
    }

    out.resize(context_length, 0);
    out
}

/// Scale a vector to unit length; zero vectors are left unchanged
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}
