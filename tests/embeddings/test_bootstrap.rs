// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Cache-or-fetch startup sequence

use crate::common::sample_artifacts;
use anyhow::Result;
use clip_embed_node::embeddings::{load_or_build, ArtifactSource, ClipArtifacts, ModelCache};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Source that hands out synthetic artifacts and counts fetches
#[derive(Default)]
struct CountingSource {
    fetches: AtomicUsize,
    fail: bool,
}

impl CountingSource {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl ArtifactSource for CountingSource {
    fn fetch(&self, model_name: &str, checkpoint: &str) -> Result<ClipArtifacts> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("hub unreachable");
        }
        Ok(sample_artifacts(model_name, checkpoint))
    }
}

/// Stand-in model: just remembers which artifacts built it
#[derive(Debug, PartialEq)]
struct Built {
    model_name: String,
    checkpoint: String,
}

fn build_ok(artifacts: &ClipArtifacts) -> Result<Built> {
    Ok(Built {
        model_name: artifacts.model_name.clone(),
        checkpoint: artifacts.checkpoint.clone(),
    })
}

#[test]
fn test_cold_start_fetches_and_caches() {
    let dir = tempfile::tempdir().unwrap();
    let cache = ModelCache::new(dir.path(), "ViT-B-32", "laion2b_s34b_b79k");
    let source = CountingSource::default();

    let model = load_or_build(&cache, &source, build_ok).unwrap();

    assert_eq!(model.model_name, "ViT-B-32");
    assert_eq!(source.fetches(), 1);
    assert!(cache.exists());
}

#[test]
fn test_warm_start_skips_fetch() {
    let dir = tempfile::tempdir().unwrap();
    let cache = ModelCache::new(dir.path(), "ViT-B-32", "openai");
    let source = CountingSource::default();

    load_or_build(&cache, &source, build_ok).unwrap();
    let model = load_or_build(&cache, &source, build_ok).unwrap();

    assert_eq!(model.checkpoint, "openai");
    assert_eq!(source.fetches(), 1);
}

#[test]
fn test_warm_start_needs_no_source() {
    let dir = tempfile::tempdir().unwrap();
    let cache = ModelCache::new(dir.path(), "m", "c");
    cache.store(&sample_artifacts("m", "c")).unwrap();

    // Offline source is never consulted on a good cache hit
    let offline = CountingSource::failing();
    let model = load_or_build(&cache, &offline, build_ok).unwrap();

    assert_eq!(model.model_name, "m");
    assert_eq!(offline.fetches(), 0);
}

#[test]
fn test_corrupt_cache_falls_back_and_rewrites() {
    let dir = tempfile::tempdir().unwrap();
    let cache = ModelCache::new(dir.path(), "m", "c");
    std::fs::write(cache.path(), b"garbage").unwrap();
    let source = CountingSource::default();

    let model = load_or_build(&cache, &source, build_ok).unwrap();

    assert_eq!(model.model_name, "m");
    assert_eq!(source.fetches(), 1);
    // The bad file was replaced with a readable one
    assert_eq!(cache.load().unwrap(), sample_artifacts("m", "c"));
}

#[test]
fn test_cached_build_failure_falls_back() {
    let dir = tempfile::tempdir().unwrap();
    let cache = ModelCache::new(dir.path(), "m", "c");
    let mut stale = sample_artifacts("m", "c");
    stale.text_model = b"stale".to_vec();
    cache.store(&stale).unwrap();
    let source = CountingSource::default();

    let calls = AtomicUsize::new(0);
    let model = load_or_build(&cache, &source, |artifacts: &ClipArtifacts| {
        calls.fetch_add(1, Ordering::SeqCst);
        if artifacts.text_model == b"stale" {
            anyhow::bail!("cannot build from stale bytes");
        }
        build_ok(artifacts)
    })
    .unwrap();

    assert_eq!(model.model_name, "m");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(source.fetches(), 1);
}

#[test]
fn test_fetch_failure_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let cache = ModelCache::new(dir.path(), "m", "c");
    let source = CountingSource::failing();

    let err = load_or_build(&cache, &source, build_ok).unwrap_err();

    let message = format!("{:#}", err);
    assert!(message.contains("Failed to load or cache OpenCLIP model"), "{}", message);
    assert!(message.contains("hub unreachable"), "{}", message);
    assert!(!cache.exists());
}

#[test]
fn test_fresh_build_failure_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let cache = ModelCache::new(dir.path(), "m", "c");
    let source = CountingSource::default();

    let result: Result<Built> = load_or_build(&cache, &source, |_: &ClipArtifacts| {
        anyhow::bail!("bad graph")
    });

    assert!(result.is_err());
    assert!(!cache.exists());
}

#[test]
fn test_persist_failure_is_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    // A regular file where the cache directory should be
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"x").unwrap();
    let cache = ModelCache::new(&blocker, "m", "c");
    let source = CountingSource::default();

    let model = load_or_build(&cache, &source, build_ok).unwrap();

    assert_eq!(model.model_name, "m");
    assert!(!cache.exists());
}
