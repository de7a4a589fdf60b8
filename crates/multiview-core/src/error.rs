use thiserror::Error;

use crate::view::ViewId;

#[derive(Error, Debug)]
pub enum FusionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image format error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("Bounding box '{0}' not found")]
    BoundingBoxNotFound(String),

    #[error("Label '{label}' does not exist for view {view}")]
    LabelNotFound { view: ViewId, label: String },

    #[error("Failed to assemble corresponding points: {0}")]
    CorrespondenceAssembly(String),

    #[error("Unknown view {0}")]
    UnknownView(ViewId),

    #[error("Registration of view {0} is not invertible")]
    SingularTransform(ViewId),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid volume: {0}")]
    InvalidVolume(String),

    #[error("Invalid dataset manifest: {0}")]
    Manifest(String),

    #[error("Worker pool error: {0}")]
    ThreadPool(String),

    #[error("No views to fuse")]
    EmptyViewSet,
}

pub type Result<T> = std::result::Result<T, FusionError>;
