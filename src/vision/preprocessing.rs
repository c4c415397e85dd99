// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Image preprocessing for the CLIP image tower

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, Rgb, RgbImage};
use ndarray::{s, Array3, Array4};
use serde::{Deserialize, Serialize};

/// Default input resolution for ViT-B-32
pub const CLIP_INPUT_SIZE: u32 = 224;

/// CLIP normalization mean values
pub const CLIP_MEAN: [f32; 3] = [0.481_454_66, 0.457_827_5, 0.408_210_73];

/// CLIP normalization std values
pub const CLIP_STD: [f32; 3] = [0.268_629_54, 0.261_302_58, 0.275_777_1];

/// How the source image is fitted to the square model input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ResizeMode {
    /// Scale the shortest side to the target, then center crop
    #[default]
    Shortest,
    /// Scale the longest side to the target, then pad with the fill color
    Longest,
    /// Resize to exact size (may distort aspect ratio)
    Squash,
}

/// Resampling filter used when resizing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Interpolation {
    #[default]
    Bicubic,
    Bilinear,
    Nearest,
}

impl Interpolation {
    fn filter(self) -> FilterType {
        match self {
            Interpolation::Bicubic => FilterType::CatmullRom,
            Interpolation::Bilinear => FilterType::Triangle,
            Interpolation::Nearest => FilterType::Nearest,
        }
    }
}

/// Preprocessing parameters shipped with an exported image tower
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessConfig {
    pub image_size: u32,
    pub mean: [f32; 3],
    pub std: [f32; 3],
    pub interpolation: Interpolation,
    pub resize_mode: ResizeMode,
    pub fill_color: u8,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            image_size: CLIP_INPUT_SIZE,
            mean: CLIP_MEAN,
            std: CLIP_STD,
            interpolation: Interpolation::Bicubic,
            resize_mode: ResizeMode::Shortest,
            fill_color: 0,
        }
    }
}

/// Preprocess one image into a CHW tensor `[3, size, size]`
///
/// Steps:
/// 1. Fit to `image_size` x `image_size` using the configured resize mode
/// 2. Convert to RGB
/// 3. Normalize: (pixel/255 - mean) / std
pub fn preprocess_image(image: &DynamicImage, config: &PreprocessConfig) -> Array3<f32> {
    let resized = resize_for_encoder(image, config);
    let rgb = resized.to_rgb8();

    let size = config.image_size as usize;
    let mut tensor = Array3::zeros((3, size, size));

    for (x, y, pixel) in rgb.enumerate_pixels() {
        for c in 0..3 {
            tensor[[c, y as usize, x as usize]] =
                (pixel[c] as f32 / 255.0 - config.mean[c]) / config.std[c];
        }
    }

    tensor
}

/// Preprocess a batch of images into an NCHW tensor `[n, 3, size, size]`
pub fn preprocess_batch(images: &[DynamicImage], config: &PreprocessConfig) -> Array4<f32> {
    let size = config.image_size as usize;
    let mut batch = Array4::zeros((images.len(), 3, size, size));

    for (i, image) in images.iter().enumerate() {
        batch
            .slice_mut(s![i, .., .., ..])
            .assign(&preprocess_image(image, config));
    }

    batch
}

/// Resize image to the square target using the configured mode
pub fn resize_for_encoder(image: &DynamicImage, config: &PreprocessConfig) -> DynamicImage {
    let target = config.image_size;
    let (orig_w, orig_h) = image.dimensions();

    if orig_w == 0 || orig_h == 0 {
        let fill = config.fill_color;
        return DynamicImage::ImageRgb8(RgbImage::from_pixel(
            target,
            target,
            Rgb([fill, fill, fill]),
        ));
    }

    let filter = config.interpolation.filter();
    match config.resize_mode {
        ResizeMode::Squash => image.resize_exact(target, target, filter),
        ResizeMode::Shortest => center_crop_resize(image, target, filter),
        ResizeMode::Longest => letterbox_resize(image, target, filter, config.fill_color),
    }
}

fn center_crop_resize(image: &DynamicImage, target: u32, filter: FilterType) -> DynamicImage {
    let (orig_w, orig_h) = image.dimensions();

    let scale = (target as f32 / orig_w as f32).max(target as f32 / orig_h as f32);
    let new_w = ((orig_w as f32 * scale).round() as u32).max(target);
    let new_h = ((orig_h as f32 * scale).round() as u32).max(target);

    let resized = image.resize_exact(new_w, new_h, filter);

    let crop_x = (new_w - target) / 2;
    let crop_y = (new_h - target) / 2;

    resized.crop_imm(crop_x, crop_y, target, target)
}

fn letterbox_resize(image: &DynamicImage, target: u32, filter: FilterType, fill: u8) -> DynamicImage {
    let (orig_w, orig_h) = image.dimensions();

    let scale = (target as f32 / orig_w as f32).min(target as f32 / orig_h as f32);
    let new_w = ((orig_w as f32 * scale).round() as u32).clamp(1, target);
    let new_h = ((orig_h as f32 * scale).round() as u32).clamp(1, target);

    let rgb = image.resize_exact(new_w, new_h, filter).to_rgb8();
    let mut output = RgbImage::from_pixel(target, target, Rgb([fill, fill, fill]));

    let offset_x = (target - new_w) / 2;
    let offset_y = (target - new_h) / 2;
    image::imageops::overlay(&mut output, &rgb, offset_x as i64, offset_y as i64);

    DynamicImage::ImageRgb8(output)
}
