// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Image loading and preprocessing for the CLIP image tower
//!
//! This module provides:
//! - Locator resolution (URLs, `file://` URLs, mounted paths)
//! - Decoding of raw image payloads
//! - CLIP preprocessing into NCHW tensors

pub mod image_utils;
pub mod locator;
pub mod preprocessing;

pub use image_utils::{decode_image_bytes, detect_format, ImageError, ImageInfo};
pub use locator::{ImageLoader, ImageLocator, LocatorError};
pub use preprocessing::{
    preprocess_batch, preprocess_image, Interpolation, PreprocessConfig, ResizeMode,
};
