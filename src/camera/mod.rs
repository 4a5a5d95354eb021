//! Camera control collaborator.
//!
//! Focus and the other image controls are set through an external OS
//! utility. Every failure mode is a [`CameraError`]; callers treat any error
//! as "value unavailable" and carry on.

pub mod v4l2;

use std::future::Future;

use thiserror::Error;

pub use v4l2::{Control, V4l2Ctl};

#[derive(Debug, Error)]
pub enum CameraError {
    #[error("camera utility not found: {0}")]
    NotFound(String),

    #[error("camera utility exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("unparsable camera utility output: {0}")]
    Unparsable(String),

    #[error("camera does not report control '{0}'")]
    UnknownControl(String),

    #[error("camera utility io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Set and read named camera controls (`focus_absolute`, `focus_auto`, ...).
pub trait CameraControl {
    fn set(&self, property: &str, value: i64) -> impl Future<Output = Result<(), CameraError>>;

    fn query(&self, property: &str) -> impl Future<Output = Result<i64, CameraError>>;
}
