//! Platform collaborator traits
//!
//! The coordinator treats the OS capture stack as opaque. These traits are
//! the whole contract: a permission broker, a session factory producing
//! stoppable sessions, and a display geometry query.

use super::{
    CaptureError, CaptureTarget, DisplayGeometry, PixelFormat, ProjectionGrant, SessionEventSink,
};

/// Grants (or refuses) permission to project the screen
pub trait PermissionBroker: Send + Sync {
    /// Ask for permission. `None` means the user or the OS declined.
    fn request_projection(&self) -> Option<ProjectionGrant>;
}

/// A live, OS-managed capture pipeline
pub trait CaptureSession: Send {
    /// Release the capture target and stop the session.
    ///
    /// Called on the session thread only, so it may block.
    fn stop(&mut self) -> Result<(), CaptureError>;
}

/// Creates capture sessions from a projection grant
pub trait CaptureSessionFactory: Send + Sync {
    /// Open a session mirroring the display into a `target`-sized buffer queue.
    ///
    /// Frames and out-of-band termination are reported through `events`.
    fn create_session(
        &self,
        grant: &ProjectionGrant,
        target: CaptureTarget,
        pixel_format: PixelFormat,
        buffer_count: u32,
        events: SessionEventSink,
    ) -> Result<Box<dyn CaptureSession>, CaptureError>;
}

/// One attached display as reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayInfo {
    pub id: u32,
    pub is_on: bool,
    pub is_presentation: bool,
}

/// Reports the geometry of the current display
pub trait DisplayGeometrySource: Send + Sync {
    fn current_geometry(&self) -> DisplayGeometry;

    /// All displays known to the platform, including the built-in one.
    fn displays(&self) -> Vec<DisplayInfo>;
}
