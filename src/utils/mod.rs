//! Utility functions for image loading, preview generation, and cropping.

use crate::core::errors::PipelineError;
use crate::geometry::{ImagePlane, PixelRect};
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, RgbImage};
use std::path::{Path, PathBuf};

/// Loads an image from a file path and converts it to RGB.
pub fn load_image(path: &Path) -> Result<RgbImage, PipelineError> {
    let img = image::open(path).map_err(PipelineError::ImageLoad)?;
    Ok(img.to_rgb8())
}

/// Loads an image from a file path and converts it to grayscale.
pub fn load_gray_image(path: &Path) -> Result<GrayImage, PipelineError> {
    let img = image::open(path).map_err(PipelineError::ImageLoad)?;
    Ok(img.to_luma8())
}

/// Saves an image, creating parent directories as needed.
pub fn save_image(image: &DynamicImage, path: &Path) -> Result<(), PipelineError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    image.save(path).map_err(PipelineError::ImageLoad)
}

/// Saves an RGB image, creating parent directories as needed.
pub fn save_rgb_image(image: &RgbImage, path: &Path) -> Result<(), PipelineError> {
    save_image(&DynamicImage::ImageRgb8(image.clone()), path)
}

/// Saves a grayscale image, creating parent directories as needed.
pub fn save_gray_image(image: &GrayImage, path: &Path) -> Result<(), PipelineError> {
    save_image(&DynamicImage::ImageLuma8(image.clone()), path)
}

/// Produces a detection preview bounded to `max_dim` on the longer side.
///
/// Aspect ratio is preserved; images already within the bound are returned
/// unchanged (previews are never upscaled).
pub fn make_preview(image: &RgbImage, max_dim: u32) -> RgbImage {
    let (width, height) = image.dimensions();
    let longest = width.max(height);
    if longest <= max_dim || longest == 0 {
        return image.clone();
    }
    let scale = max_dim as f32 / longest as f32;
    let new_w = ((width as f32 * scale).round() as u32).max(1);
    let new_h = ((height as f32 * scale).round() as u32).max(1);
    image::imageops::resize(image, new_w, new_h, FilterType::Triangle)
}

/// Crops a rectangle out of a native-plane image.
pub fn crop_rect(image: &RgbImage, rect: PixelRect) -> RgbImage {
    image::imageops::crop_imm(image, rect.x1, rect.y1, rect.width(), rect.height()).to_image()
}

/// Reads the pixel dimensions of an image file without decoding pixel data.
pub fn image_plane_of(path: &Path) -> Result<ImagePlane, PipelineError> {
    let (width, height) = image::image_dimensions(path).map_err(PipelineError::ImageLoad)?;
    Ok(ImagePlane::new(width, height))
}

/// Lists image files in a directory, sorted by file name.
///
/// A missing directory yields an empty list. Only common raster extensions
/// are included.
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    let mut paths = Vec::new();
    if !dir.exists() {
        return Ok(paths);
    }
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_image = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| {
                matches!(
                    e.to_ascii_lowercase().as_str(),
                    "png" | "jpg" | "jpeg" | "tif" | "tiff" | "bmp"
                )
            })
            .unwrap_or(false);
        if path.is_file() && is_image {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// File stem of a path as an owned string, empty when absent.
pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string()
}
