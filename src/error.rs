//! Error types for the places callers branch on what went wrong.

use thiserror::Error;

/// A single frame could not be turned into landmarks. Never fatal.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame payload too small ({len} < {min} bytes)")]
    TooSmall { len: usize, min: usize },

    #[error("undecodable frame: {0}")]
    Decode(#[from] image::ImageError),

    #[error("landmark provider failed: {0}")]
    Provider(String),
}

/// Model strategy failures; the classifier fails closed on every variant.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("no model loaded")]
    Unavailable,

    #[error("failed to load model: {0}")]
    Load(String),

    #[error("shape mismatch: expected {expected} inputs, got {actual}")]
    Shape { expected: usize, actual: usize },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("inference failed: {0}")]
    Inference(String),
}

/// The peer is gone; the connection task ends.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("send failed: {0}")]
    Send(String),

    #[error("encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Presentation upload rejected at the HTTP boundary.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("missing file name")]
    MissingName,

    #[error("unsupported file type '{0}'")]
    Extension(String),

    #[error("empty upload")]
    Empty,

    #[error("upload too large ({size} > {max} bytes)")]
    TooLarge { size: usize, max: usize },

    #[error("slide count must be positive")]
    NoSlides,

    #[error("storage failed: {0}")]
    Storage(#[from] std::io::Error),
}
