use thiserror::Error;

use super::PixelFormat;

/// Errors raised by the capture layer
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("screen capture permission denied")]
    PermissionDenied,

    #[error("failed to create capture session: {0}")]
    SessionCreate(String),

    #[error("failed to stop capture session: {0}")]
    SessionStop(String),

    #[error("invalid capture target {width}x{height}")]
    InvalidTarget { width: u32, height: u32 },

    #[error("frame buffer too small for {format:?}: expected {expected} bytes, got {actual}")]
    FrameTooSmall {
        format: PixelFormat,
        expected: usize,
        actual: usize,
    },

    #[error("row stride {row_stride} cannot hold {width} pixels of {format:?}")]
    InvalidStride {
        format: PixelFormat,
        width: u32,
        row_stride: usize,
    },
}
