//! Capture coordinator - serializes start/stop and fans out state changes

mod engine;
mod observers;
mod state;

pub use engine::CaptureCoordinator;
pub use observers::{CaptureObserver, ObserverId, ObserverSet};
