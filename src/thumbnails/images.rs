use anyhow::{Context, Result};
use image::{DynamicImage, GenericImageView, ImageFormat};
use std::path::Path;

/// Extension of the derived file for a source image extension.
pub fn output_extension(source_extension: &str) -> &'static str {
    match source_extension.to_lowercase().as_str() {
        "png" | "gif" | "bmp" | "tif" | "tiff" => "png",
        "webp" => "webp",
        _ => "jpg",
    }
}

fn output_format(target: &Path) -> ImageFormat {
    match target.extension().and_then(|e| e.to_str()) {
        Some("png") => ImageFormat::Png,
        Some("webp") => ImageFormat::WebP,
        _ => ImageFormat::Jpeg,
    }
}

/// Shrink `source` to fit within `max_dimension` on both sides and write it
/// to `target`. Images already small enough are re-encoded at their size.
pub fn resize(source: &Path, target: &Path, max_dimension: u32) -> Result<()> {
    let img = image::open(source)
        .with_context(|| format!("Failed to decode {}", source.display()))?;

    let (width, height) = img.dimensions();
    let thumb = if width > max_dimension || height > max_dimension {
        img.thumbnail(max_dimension, max_dimension)
    } else {
        img
    };

    let format = output_format(target);
    // JPEG has no alpha channel; WebP only encodes 8-bit RGB(A).
    let encoded = match format {
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(thumb.to_rgb8()),
        ImageFormat::WebP => DynamicImage::ImageRgba8(thumb.to_rgba8()),
        _ => thumb,
    };

    encoded
        .save_with_format(target, format)
        .with_context(|| format!("Failed to write {}", target.display()))?;
    Ok(())
}
