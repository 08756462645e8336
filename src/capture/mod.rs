//! Screen capture primitives
//!
//! This module holds the value types that travel between the coordinator,
//! the session worker and the platform collaborators. The platform itself
//! (permission broker, session factory, display geometry) is abstracted
//! behind the traits in [`platform`], so the coordinator never talks to an
//! OS capture API directly.

mod error;
mod frame;
pub mod platform;
mod synthetic;
mod worker;

use serde::{Deserialize, Serialize};

pub use error::CaptureError;
pub use frame::{RawFrame, Thumbnail};
pub use platform::{
    CaptureSession, CaptureSessionFactory, DisplayGeometrySource, DisplayInfo, PermissionBroker,
};
pub use synthetic::SyntheticPlatform;
pub use worker::{SessionEvent, SessionEventSink, SessionRequest, SessionWorker};

/// Snapshot of the capture lifecycle
///
/// `frame_available` can only be true while `capturing` is true.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureState {
    pub capturing: bool,
    pub frame_available: bool,
}

/// Which flags changed in a single committed transition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateChange {
    pub capturing: bool,
    pub frame_available: bool,
}

impl StateChange {
    pub fn is_empty(&self) -> bool {
        !self.capturing && !self.frame_available
    }
}

/// Pixel layout of frame buffers delivered by a capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// 4 bytes per pixel: red, green, blue, alpha.
    #[default]
    Rgba8888,
    /// 4 bytes per pixel, alpha byte ignored.
    Rgbx8888,
    /// 2 bytes per pixel, little-endian 5/6/5.
    Rgb565,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgba8888 | PixelFormat::Rgbx8888 => 4,
            PixelFormat::Rgb565 => 2,
        }
    }
}

/// Geometry of the physical display, read once per capture start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayGeometry {
    pub width: u32,
    pub height: u32,
    pub density_dpi: u32,
}

/// Dimensions of the off-screen capture target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureTarget {
    pub width: u32,
    pub height: u32,
    pub density_dpi: u32,
}

/// Opaque result of a granted projection request
///
/// The payload is handed to the session factory untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectionGrant {
    pub result_code: i32,
    pub payload: Vec<u8>,
}

/// Everything the session factory needs to open a capture session
#[derive(Debug, Clone)]
pub struct SessionParams {
    pub grant: ProjectionGrant,
    pub display: DisplayGeometry,
    pub pixel_format: PixelFormat,
    pub buffer_count: u32,
    pub scale_factor: f32,
}

impl SessionParams {
    /// Capture target derived from the display geometry and scale factor
    ///
    /// Dimensions are multiplied in `f32`, truncated toward zero and never
    /// drop below one pixel.
    pub fn target(&self) -> CaptureTarget {
        let scaled = |v: u32| ((v as f32 * self.scale_factor) as u32).max(1);
        CaptureTarget {
            width: scaled(self.display.width),
            height: scaled(self.display.height),
            density_dpi: self.display.density_dpi,
        }
    }
}
