// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! On-disk model cache
//!
//! One file per (model name, checkpoint) pair holding the full
//! [`ClipArtifacts`] as zstd-compressed bincode behind a short magic header.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use super::artifacts::ClipArtifacts;

/// File header identifying the cache format version
const CACHE_MAGIC: &[u8; 8] = b"CLIPART1";

const ZSTD_LEVEL: i32 = 3;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cache file {} is not a model cache", path.display())]
    BadMagic { path: PathBuf },

    #[error("Failed to decode cache file {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: bincode::Error,
    },

    #[error("Failed to encode model cache: {0}")]
    Encode(#[source] bincode::Error),

    #[error("Cache file holds {found_model} ({found_checkpoint}), expected {model} ({checkpoint})")]
    Mismatch {
        model: String,
        checkpoint: String,
        found_model: String,
        found_checkpoint: String,
    },
}

/// Cache file for one (model name, checkpoint) pair
#[derive(Debug, Clone)]
pub struct ModelCache {
    dir: PathBuf,
    model_name: String,
    checkpoint: String,
}

impl ModelCache {
    pub fn new(dir: impl Into<PathBuf>, model_name: &str, checkpoint: &str) -> Self {
        Self {
            dir: dir.into(),
            model_name: model_name.to_string(),
            checkpoint: checkpoint.to_string(),
        }
    }

    /// `<dir>/<model>_<checkpoint>.bin`
    pub fn path(&self) -> PathBuf {
        self.dir.join(format!(
            "{}_{}.bin",
            sanitize_component(&self.model_name),
            sanitize_component(&self.checkpoint)
        ))
    }

    /// (model name, checkpoint) this cache file belongs to
    pub fn identity(&self) -> (&str, &str) {
        (&self.model_name, &self.checkpoint)
    }

    pub fn exists(&self) -> bool {
        self.path().is_file()
    }

    pub fn load(&self) -> Result<ClipArtifacts, CacheError> {
        let path = self.path();
        let io_err = |source| CacheError::Io {
            path: path.clone(),
            source,
        };

        let file = File::open(&path).map_err(io_err)?;
        let mut reader = BufReader::new(file);

        let mut magic = [0u8; 8];
        reader.read_exact(&mut magic).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                CacheError::BadMagic { path: path.clone() }
            } else {
                io_err(e)
            }
        })?;
        if &magic != CACHE_MAGIC {
            return Err(CacheError::BadMagic { path: path.clone() });
        }

        let decoder = zstd::stream::Decoder::new(reader).map_err(io_err)?;
        let artifacts: ClipArtifacts =
            bincode::deserialize_from(decoder).map_err(|source| CacheError::Decode {
                path: path.clone(),
                source,
            })?;

        if artifacts.model_name != self.model_name || artifacts.checkpoint != self.checkpoint {
            return Err(CacheError::Mismatch {
                model: self.model_name.clone(),
                checkpoint: self.checkpoint.clone(),
                found_model: artifacts.model_name,
                found_checkpoint: artifacts.checkpoint,
            });
        }

        debug!("Decoded cache file {}", path.display());
        Ok(artifacts)
    }

    /// Write artifacts to the cache path
    ///
    /// Data goes to a temp file in the same directory that is renamed over
    /// the final path, so readers never see a partial file.
    pub fn store(&self, artifacts: &ClipArtifacts) -> Result<PathBuf, CacheError> {
        let path = self.path();
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| CacheError::Io { path, source }
        };

        std::fs::create_dir_all(&self.dir).map_err(io_err(&self.dir))?;

        let temp = tempfile::Builder::new()
            .prefix(".clip-cache-")
            .tempfile_in(&self.dir)
            .map_err(io_err(&self.dir))?;

        {
            let mut writer = BufWriter::new(temp.as_file());
            writer.write_all(CACHE_MAGIC).map_err(io_err(temp.path()))?;

            let mut encoder =
                zstd::stream::Encoder::new(&mut writer, ZSTD_LEVEL).map_err(io_err(temp.path()))?;
            bincode::serialize_into(&mut encoder, artifacts).map_err(CacheError::Encode)?;
            encoder.finish().map_err(io_err(temp.path()))?;

            writer.flush().map_err(io_err(temp.path()))?;
        }
        temp.as_file().sync_all().map_err(io_err(temp.path()))?;

        temp.persist(&path)
            .map_err(|e| CacheError::Io {
                path: path.clone(),
                source: e.error,
            })?;

        Ok(path)
    }
}

/// Keep a name usable as a single path component
fn sanitize_component(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();

    match cleaned.as_str() {
        "" | "." | ".." => cleaned.replace('.', "_") + "_",
        _ => cleaned,
    }
}
