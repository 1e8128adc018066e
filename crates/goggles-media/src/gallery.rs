//! Gallery storage: processed images saved as `{filter}_{unix_millis}.png`.

use crate::codec::{encode, MediaError};
use chrono::{DateTime, Utc};
use goggles_core::FilterKind;
use image::{DynamicImage, ImageFormat};
use std::path::{Path, PathBuf};

/// A directory that receives saved photos.
#[derive(Debug, Clone)]
pub struct Gallery {
    dir: PathBuf,
}

impl Gallery {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name for an image produced by `filter` at `at`.
    pub fn file_name(filter: FilterKind, at: DateTime<Utc>) -> String {
        format!("{}_{}.png", filter.as_str(), at.timestamp_millis())
    }

    /// Save `image` as PNG, creating the gallery directory if needed.
    pub fn save(&self, image: &DynamicImage, filter: FilterKind) -> Result<PathBuf, MediaError> {
        self.save_at(image, filter, Utc::now())
    }

    pub fn save_at(
        &self,
        image: &DynamicImage,
        filter: FilterKind,
        at: DateTime<Utc>,
    ) -> Result<PathBuf, MediaError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| MediaError::io(&self.dir, e))?;
        let path = self.dir.join(Self::file_name(filter, at));
        let bytes = encode(image, ImageFormat::Png)?;
        std::fs::write(&path, bytes).map_err(|e| MediaError::io(&path, e))?;
        tracing::info!(path = %path.display(), %filter, "saved to gallery");
        Ok(path)
    }
}
