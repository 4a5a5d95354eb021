//! Error types for webcam-focus.

use thiserror::Error;

use crate::camera::CameraError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("motion error: {0}")]
    Motion(String),

    /// A user-facing command failed; the message is reported verbatim.
    #[error("{0}")]
    Command(String),

    #[error("plot error: {0}")]
    Plot(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
