use goggles_core::{DetectionParams, OverlaySettings};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

const OPENCV_CASCADE_DIR: &str = "/usr/share/opencv4/haarcascades";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize default config: {0}")]
    Defaults(#[from] toml::ser::Error),
}

/// Filter configuration.
///
/// Defaults, then an optional TOML file named by `GOGGLES_CONFIG`, then
/// `GOGGLES_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Haar cascade XML for faces.
    pub face_cascade: PathBuf,
    /// Haar cascade XML for eyes, searched inside each face.
    pub eye_cascade: PathBuf,
    /// Glasses graphic (must have an alpha channel).
    pub glasses_asset: PathBuf,
    /// Directory processed images are saved into.
    pub gallery_dir: PathBuf,
    pub overlay: OverlaySettings,
    pub face_detection: DetectionParams,
    pub eye_detection: DetectionParams,
}

impl Config {
    /// Load the configuration from the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Load using `var` to look up environment variables.
    pub fn load_with(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = match var("GOGGLES_CONFIG") {
            Some(path) => {
                let path = PathBuf::from(path);
                let config = Self::from_file(&path, &var)?;
                tracing::debug!(path = %path.display(), "loaded config file");
                config
            }
            None => Self::defaults_with(&var),
        };
        config.apply_env(&var);
        Ok(config)
    }

    pub fn from_file(
        path: &Path,
        var: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text, var)
    }

    /// Parse a TOML document; missing keys keep the defaults built from `var`.
    pub fn from_toml(text: &str, var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let file: toml::Table = toml::from_str(text)?;
        let mut merged: toml::Table = toml::from_str(&toml::to_string(&Self::defaults_with(var))?)?;
        merge_tables(&mut merged, file);
        Ok(toml::Value::Table(merged).try_into()?)
    }

    fn defaults_with(var: impl Fn(&str) -> Option<String>) -> Self {
        let home = var("HOME").unwrap_or_else(|| "/tmp".to_string());

        let data_dir = var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(&home).join(".local/share"))
            .join("goggles");

        let gallery_dir = var("XDG_PICTURES_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(&home).join("Pictures"));

        Self {
            face_cascade: Path::new(OPENCV_CASCADE_DIR).join("haarcascade_frontalface_default.xml"),
            eye_cascade: Path::new(OPENCV_CASCADE_DIR).join("haarcascade_eye.xml"),
            glasses_asset: data_dir.join("glasses.png"),
            gallery_dir,
            overlay: OverlaySettings::default(),
            face_detection: DetectionParams::default(),
            eye_detection: DetectionParams::default(),
        }
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("GOGGLES_FACE_CASCADE") {
            self.face_cascade = v.into();
        }
        if let Some(v) = var("GOGGLES_EYE_CASCADE") {
            self.eye_cascade = v.into();
        }
        if let Some(v) = var("GOGGLES_GLASSES_ASSET") {
            self.glasses_asset = v.into();
        }
        if let Some(v) = var("GOGGLES_GALLERY_DIR") {
            self.gallery_dir = v.into();
        }
        self.overlay.width_multiplier =
            env_parse(&var, "GOGGLES_WIDTH_MULTIPLIER", self.overlay.width_multiplier);
        // One pyramid step for both detectors.
        if var("GOGGLES_SCALE_FACTOR").is_some() {
            let scale_factor =
                env_parse(&var, "GOGGLES_SCALE_FACTOR", self.face_detection.scale_factor);
            self.face_detection.scale_factor = scale_factor;
            self.eye_detection.scale_factor = scale_factor;
        }
        self.face_detection.min_neighbors =
            env_parse(&var, "GOGGLES_MIN_NEIGHBORS", self.face_detection.min_neighbors);
        self.eye_detection.min_neighbors =
            env_parse(&var, "GOGGLES_EYE_MIN_NEIGHBORS", self.eye_detection.min_neighbors);
    }
}

/// Overlay `file` onto `base`, recursing into nested tables.
fn merge_tables(base: &mut toml::Table, file: toml::Table) {
    for (key, value) in file {
        match value {
            toml::Value::Table(nested) => {
                if let Some(toml::Value::Table(existing)) = base.get_mut(&key) {
                    merge_tables(existing, nested);
                    continue;
                }
                base.insert(key, toml::Value::Table(nested));
            }
            other => {
                base.insert(key, other);
            }
        }
    }
}

fn env_parse<T: std::str::FromStr>(var: impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match var(key) {
        Some(v) => v.parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %v, "ignoring unparsable value");
            default
        }),
        None => default,
    }
}
