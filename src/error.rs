use std::path::PathBuf;

use thiserror::Error;

use crate::window::{Extent, Window};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Image Error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("IO Error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Json Error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Shape Error: {0}")]
    ShapeError(#[from] ndarray::ShapeError),

    #[error("window {window:?} lies outside of frame {frame:?}")]
    WindowOutOfBounds { window: Window, frame: Extent },

    #[error("detector returned {got} results for {expected} windows")]
    BatchMismatch { expected: usize, got: usize },

    #[error("model output has unexpected shape {0:?}")]
    ModelOutput(Vec<usize>),

    #[error("detector failed: {0}")]
    Detector(String),

    #[error("segmenter failed: {0}")]
    Segmenter(String),

    #[error("tracker failed: {0}")]
    Tracker(String),

    #[error("no metadata for image {0:?}")]
    MissingMetadata(PathBuf),

    #[error("invalid configuration: {0}")]
    Config(String),
}
