//! Image decode/encode and overlay asset loading.

use goggles_core::{OverlayAsset, OverlayError};
use image::{DynamicImage, ImageError, ImageFormat};
use std::io::Cursor;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode image: {0}")]
    Decode(#[source] ImageError),
    #[error("failed to encode image: {0}")]
    Encode(#[source] ImageError),
    #[error("image dimensions are zero")]
    ZeroDimensions,
    #[error("unusable overlay asset: {0}")]
    Overlay(#[from] OverlayError),
}

impl MediaError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        MediaError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Decode an image from memory, guessing the format from its content.
pub fn decode(bytes: &[u8]) -> Result<DynamicImage, MediaError> {
    let image = image::load_from_memory(bytes).map_err(MediaError::Decode)?;
    if image.width() == 0 || image.height() == 0 {
        return Err(MediaError::ZeroDimensions);
    }
    Ok(image)
}

/// Read and decode an image file.
pub fn open(path: impl AsRef<Path>) -> Result<DynamicImage, MediaError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|e| MediaError::io(path, e))?;
    let image = decode(&bytes)?;
    tracing::debug!(
        path = %path.display(),
        width = image.width(),
        height = image.height(),
        color = ?image.color(),
        "decoded image"
    );
    Ok(image)
}

/// Encode an image into `format`.
///
/// Formats without an alpha channel (JPEG) get the image flattened to RGB first.
pub fn encode(image: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>, MediaError> {
    let mut out = Cursor::new(Vec::new());
    let result = if format == ImageFormat::Jpeg && image.color().has_alpha() {
        DynamicImage::ImageRgb8(image.to_rgb8()).write_to(&mut out, format)
    } else {
        image.write_to(&mut out, format)
    };
    result.map_err(MediaError::Encode)?;
    Ok(out.into_inner())
}

/// Encode `image` and write it to `path`, picking the format from the extension.
pub fn save(image: &DynamicImage, path: impl AsRef<Path>) -> Result<(), MediaError> {
    let path = path.as_ref();
    let format = ImageFormat::from_path(path).map_err(MediaError::Encode)?;
    let bytes = encode(image, format)?;
    std::fs::write(path, bytes).map_err(|e| MediaError::io(path, e))?;
    tracing::info!(path = %path.display(), ?format, "image written");
    Ok(())
}

/// Load the overlay graphic. The file must decode to an image with alpha.
pub fn load_asset(path: impl AsRef<Path>) -> Result<OverlayAsset, MediaError> {
    let path = path.as_ref();
    let asset = OverlayAsset::new(open(path)?)?;
    tracing::info!(
        path = %path.display(),
        width = asset.width(),
        height = asset.height(),
        "overlay asset loaded"
    );
    Ok(asset)
}
