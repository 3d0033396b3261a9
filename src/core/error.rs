use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("Could not open video file: {0}")]
    Decode(String),
    #[error("No frames could be extracted from the video")]
    EmptySequence,
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),
    #[error("Failed to load weights from {path:?}: {reason}")]
    WeightsLoad { path: PathBuf, reason: String },
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Device error: {0}")]
    Device(#[from] candle_core::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] json5::Error),
    #[error("Download failed: {0}")]
    Download(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, DetectorError>;
