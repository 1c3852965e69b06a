mod encoder;
mod loop_worker;
mod source;

use thiserror::Error;

pub use loop_worker::{CaptureLoop, EndedCallback, FrameCallback};
pub use source::{DisplayProvider, FrameSource, PrimaryDisplay};

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("screen capture permission denied: {0}")]
    PermissionDenied(String),
    #[error("screen capture is already running")]
    AlreadyRunning,
    #[error("capture source ended")]
    SourceEnded,
    #[error("frame grab failed: {0}")]
    Grab(String),
    #[error("frame encoding failed: {0}")]
    Encode(#[from] image::ImageError),
    #[error("capture worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}
