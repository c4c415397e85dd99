// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Real OpenCLIP model tests
//!
//! Need an export of ViT-B-32 / laion2b_s34b_b79k in the standard layout at
//! MODEL_DIR. Run with `--ignored`.

use clip_embed_node::embeddings::{
    ArtifactSource, ClipModel, EmbeddingBackend, LocalArtifactSource,
};
use image::{DynamicImage, Rgb, RgbImage};

const MODEL_DIR: &str = "/workspace/models/ViT-B-32__laion2b_s34b_b79k";

fn load() -> ClipModel {
    let artifacts = LocalArtifactSource::new(MODEL_DIR)
        .fetch("ViT-B-32", "laion2b_s34b_b79k")
        .unwrap();
    ClipModel::from_artifacts(&artifacts, 4).unwrap()
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[test]
#[ignore] // Only run if model files are downloaded
fn test_dimension_is_512() {
    let model = load();
    assert_eq!(model.dimension(), 512);
    assert_eq!(model.context_length(), 77);
}

#[test]
#[ignore] // Only run if model files are downloaded
fn test_text_embeddings_normalized_and_deterministic() {
    let model = load();
    let texts = vec!["a photo of a dog".to_string(), "a photo of a dog".to_string()];
    let embeddings = model.embed_texts(&texts).unwrap();

    assert_eq!(embeddings.len(), 2);
    assert_eq!(embeddings[0], embeddings[1]);
    let norm = cosine(&embeddings[0], &embeddings[0]).sqrt();
    assert!((norm - 1.0).abs() < 1e-3);
}

#[test]
#[ignore] // Only run if model files are downloaded
fn test_long_text_is_truncated() {
    let model = load();
    let long = "word ".repeat(500);
    let embeddings = model.embed_texts(&[long]).unwrap();
    assert_eq!(embeddings[0].len(), 512);
}

#[test]
#[ignore] // Only run if model files are downloaded
fn test_image_closer_to_matching_text() {
    let model = load();
    let red = DynamicImage::ImageRgb8(RgbImage::from_pixel(256, 256, Rgb([230, 20, 20])));
    let image = &model.embed_images(&[red]).unwrap()[0];
    let texts = model
        .embed_texts(&["a solid red square".to_string(), "a photo of a forest".to_string()])
        .unwrap();

    assert!(cosine(image, &texts[0]) > cosine(image, &texts[1]));
}
