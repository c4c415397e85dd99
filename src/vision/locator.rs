// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Image locator resolution
//!
//! A locator is either an `http(s)` URL, a `file://` URL, or a filesystem
//! path. Relative paths are resolved against the mounted image directory.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use url::Url;

#[derive(Debug, Error)]
pub enum LocatorError {
    #[error("Failed to fetch {locator}")]
    Fetch {
        locator: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to fetch {locator}: HTTP status {status}")]
    Status { locator: String, status: u16 },

    #[error("Failed to read {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Image at {locator} is too large: at least {size} bytes (max: {max} bytes)")]
    TooLarge {
        locator: String,
        size: usize,
        max: usize,
    },

    #[error("Invalid file URL: {0}")]
    InvalidFileUrl(String),
}

/// Where an image is read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageLocator {
    Remote(Url),
    Local(PathBuf),
}

impl ImageLocator {
    pub fn parse(raw: &str, mount_dir: &Path) -> Result<Self, LocatorError> {
        if let Ok(url) = Url::parse(raw) {
            match url.scheme() {
                "http" | "https" => return Ok(ImageLocator::Remote(url)),
                "file" => {
                    return url
                        .to_file_path()
                        .map(ImageLocator::Local)
                        .map_err(|_| LocatorError::InvalidFileUrl(raw.to_string()));
                }
                // Anything else (including Windows drive letters) is a path
                _ => {}
            }
        }

        let path = Path::new(raw);
        if path.is_absolute() {
            Ok(ImageLocator::Local(path.to_path_buf()))
        } else {
            Ok(ImageLocator::Local(mount_dir.join(path)))
        }
    }
}

/// Reads image bytes for locators
#[derive(Debug, Clone)]
pub struct ImageLoader {
    client: reqwest::Client,
    mount_dir: PathBuf,
    max_image_bytes: usize,
}

impl ImageLoader {
    pub fn new(mount_dir: impl Into<PathBuf>, max_image_bytes: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            mount_dir: mount_dir.into(),
            max_image_bytes,
        }
    }

    pub fn max_image_bytes(&self) -> usize {
        self.max_image_bytes
    }

    /// Load one locator's raw bytes, never buffering more than the size cap
    pub async fn load(&self, raw: &str) -> Result<Vec<u8>, LocatorError> {
        match ImageLocator::parse(raw, &self.mount_dir)? {
            ImageLocator::Remote(url) => self.fetch_remote(raw, url).await,
            ImageLocator::Local(path) => self.read_local(raw, path).await,
        }
    }

    /// Load every locator in order, failing on the first error
    pub async fn load_all(&self, locators: &[String]) -> Result<Vec<Vec<u8>>, LocatorError> {
        let mut blobs = Vec::with_capacity(locators.len());
        for locator in locators {
            blobs.push(self.load(locator).await?);
        }
        Ok(blobs)
    }

    async fn fetch_remote(&self, raw: &str, url: Url) -> Result<Vec<u8>, LocatorError> {
        debug!("Fetching image from {}", url);
        let fetch_err = |source| LocatorError::Fetch {
            locator: raw.to_string(),
            source,
        };

        let mut response = self.client.get(url).send().await.map_err(fetch_err)?;
        if !response.status().is_success() {
            return Err(LocatorError::Status {
                locator: raw.to_string(),
                status: response.status().as_u16(),
            });
        }

        if let Some(len) = response.content_length() {
            self.check_size(raw, usize::try_from(len).unwrap_or(usize::MAX))?;
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(fetch_err)? {
            self.check_size(raw, bytes.len() + chunk.len())?;
            bytes.extend_from_slice(&chunk);
        }
        Ok(bytes)
    }

    async fn read_local(&self, raw: &str, path: PathBuf) -> Result<Vec<u8>, LocatorError> {
        debug!("Reading image from {}", path.display());
        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(source) => return Err(LocatorError::Read { path, source }),
        };
        self.check_size(raw, usize::try_from(metadata.len()).unwrap_or(usize::MAX))?;

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(source) => return Err(LocatorError::Read { path, source }),
        };
        // The file may have grown since the metadata call
        self.check_size(raw, bytes.len())?;
        Ok(bytes)
    }

    fn check_size(&self, raw: &str, size: usize) -> Result<(), LocatorError> {
        if size > self.max_image_bytes {
            return Err(LocatorError::TooLarge {
                locator: raw.to_string(),
                size,
                max: self.max_image_bytes,
            });
        }
        Ok(())
    }
}
