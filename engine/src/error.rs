use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Unknown aspect ratio: {0}")]
    InvalidAspectRatio(String),

    #[error("No base image in the scene")]
    MissingBaseImage,

    #[error("Backend task failed: {0}")]
    BackendTaskFailed(String),

    #[error("Backend unreachable: {0}")]
    BackendUnreachable(String),

    #[error("Nothing to inpaint: draw a mask first")]
    EmptyMaskSubmission,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Raster error: {0}")]
    Raster(String),

    #[error("Object not found: {0}")]
    ObjectNotFound(u32),

    #[error("No object selected")]
    NoSelection,

    #[error("A request is still running")]
    Busy,

    #[error("Unknown or finished run: {0}")]
    StaleRun(u64),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),
}

impl EngineError {
    /// True for errors produced by the remote side rather than local state.
    pub fn is_backend(&self) -> bool {
        matches!(self, EngineError::BackendTaskFailed(_) | EngineError::BackendUnreachable(_))
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
