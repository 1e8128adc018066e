use crate::config::Config;
use goggles_core::{
    apply_grayscale, CascadeDetector, CascadeError, FaceDetection, FaceOutcome, FilterKind,
    GlassesFilter, OverlayError,
};
use goggles_media::{Gallery, MediaError};
use image::DynamicImage;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("media error: {0}")]
    Media(#[from] MediaError),
    #[error("cascade error: {0}")]
    Cascade(#[from] CascadeError),
    #[error("overlay error: {0}")]
    Overlay(#[from] OverlayError),
    #[error("no image selected")]
    NoImageSelected,
    #[error("nothing to save; apply a filter first")]
    NothingToSave,
    #[error("glasses filter not loaded")]
    GlassesUnavailable,
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Result of selecting an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selected {
    pub width: u32,
    pub height: u32,
}

/// Result of the glasses filter.
#[derive(Debug, Clone)]
pub struct GlassesResult {
    pub outcomes: Vec<FaceOutcome>,
}

impl GlassesResult {
    pub fn faces(&self) -> usize {
        self.outcomes.len()
    }

    pub fn applied(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_applied()).count()
    }
}

/// Editing state: the selected photo, the last filter result and its kind.
///
/// Filters always start from the selected photo, so applying one after
/// another replaces the previous result instead of stacking.
pub struct Session {
    glasses: Option<GlassesFilter>,
    gallery: Gallery,
    selected: Option<DynamicImage>,
    processed: Option<DynamicImage>,
    filter: FilterKind,
}

impl Session {
    pub fn new(glasses: Option<GlassesFilter>, gallery: Gallery) -> Self {
        Self {
            glasses,
            gallery,
            selected: None,
            processed: None,
            filter: FilterKind::Original,
        }
    }

    /// Decode and select a photo, discarding any previous result.
    pub fn select(&mut self, path: &Path) -> Result<Selected, EngineError> {
        let image = goggles_media::open(path)?;
        Ok(self.select_image(image))
    }

    pub fn select_image(&mut self, image: DynamicImage) -> Selected {
        let selected = Selected {
            width: image.width(),
            height: image.height(),
        };
        tracing::info!(width = selected.width, height = selected.height, "image selected");
        self.selected = Some(image);
        self.processed = None;
        self.filter = FilterKind::Original;
        selected
    }

    fn source(&self) -> Result<&DynamicImage, EngineError> {
        self.selected.as_ref().ok_or(EngineError::NoImageSelected)
    }

    fn glasses_filter(&self) -> Result<&GlassesFilter, EngineError> {
        self.glasses.as_ref().ok_or(EngineError::GlassesUnavailable)
    }

    pub fn grayscale(&mut self) -> Result<(), EngineError> {
        let gray = apply_grayscale(self.source()?);
        self.processed = Some(gray);
        self.filter = FilterKind::Grayscale;
        Ok(())
    }

    pub fn glasses(&mut self) -> Result<GlassesResult, EngineError> {
        let output = self.glasses_filter()?.apply(self.source()?)?;
        self.processed = Some(DynamicImage::ImageRgba8(output.image));
        self.filter = FilterKind::Glasses;
        Ok(GlassesResult {
            outcomes: output.outcomes,
        })
    }

    pub fn detect(&self) -> Result<Vec<FaceDetection>, EngineError> {
        Ok(self.glasses_filter()?.detect(self.source()?))
    }

    /// Save the processed image to `output`, or into the gallery when `None`.
    pub fn save(&self, output: Option<&Path>) -> Result<PathBuf, EngineError> {
        let image = self.processed.as_ref().ok_or(EngineError::NothingToSave)?;
        match output {
            Some(path) => {
                goggles_media::save(image, path)?;
                Ok(path.to_path_buf())
            }
            None => Ok(self.gallery.save(image, self.filter)?),
        }
    }
}

/// Messages sent from the front end to the engine thread.
enum EngineRequest {
    Select {
        path: PathBuf,
        reply: oneshot::Sender<Result<Selected, EngineError>>,
    },
    Grayscale {
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    Glasses {
        reply: oneshot::Sender<Result<GlassesResult, EngineError>>,
    },
    Detect {
        reply: oneshot::Sender<Result<Vec<FaceDetection>, EngineError>>,
    },
    Save {
        output: Option<PathBuf>,
        reply: oneshot::Sender<Result<PathBuf, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T, EngineError>>) -> EngineRequest,
    ) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    pub async fn select(&self, path: PathBuf) -> Result<Selected, EngineError> {
        self.request(|reply| EngineRequest::Select { path, reply }).await
    }

    pub async fn grayscale(&self) -> Result<(), EngineError> {
        self.request(|reply| EngineRequest::Grayscale { reply }).await
    }

    pub async fn glasses(&self) -> Result<GlassesResult, EngineError> {
        self.request(|reply| EngineRequest::Glasses { reply }).await
    }

    pub async fn detect(&self) -> Result<Vec<FaceDetection>, EngineError> {
        self.request(|reply| EngineRequest::Detect { reply }).await
    }

    pub async fn save(&self, output: Option<PathBuf>) -> Result<PathBuf, EngineError> {
        self.request(|reply| EngineRequest::Save { output, reply })
            .await
    }
}

/// Build a session from `config` and run it on a dedicated OS thread.
///
/// With `with_glasses` the cascades and the glasses asset are loaded up
/// front and any failure is returned before the thread starts.
pub fn spawn_engine(config: &Config, with_glasses: bool) -> Result<EngineHandle, EngineError> {
    let glasses = if with_glasses {
        let face = CascadeDetector::load(&config.face_cascade, config.face_detection)?;
        let eye = CascadeDetector::load(&config.eye_cascade, config.eye_detection)?;
        let asset = goggles_media::load_asset(&config.glasses_asset)?;
        Some(GlassesFilter::new(
            Box::new(face),
            Box::new(eye),
            asset,
            config.overlay,
        ))
    } else {
        tracing::debug!("glasses filter not requested; skipping cascade load");
        None
    };

    spawn_session(Session::new(glasses, Gallery::new(&config.gallery_dir)))
}

/// Run an already-built session on a dedicated OS thread.
pub fn spawn_session(mut session: Session) -> Result<EngineHandle, EngineError> {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("goggles-engine".into())
        .spawn(move || {
            tracing::debug!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Select { path, reply } => {
                        let _ = reply.send(session.select(&path));
                    }
                    EngineRequest::Grayscale { reply } => {
                        let _ = reply.send(session.grayscale());
                    }
                    EngineRequest::Glasses { reply } => {
                        let _ = reply.send(session.glasses());
                    }
                    EngineRequest::Detect { reply } => {
                        let _ = reply.send(session.detect());
                    }
                    EngineRequest::Save { output, reply } => {
                        let _ = reply.send(session.save(output.as_deref()));
                    }
                }
            }
            tracing::debug!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx })
}
