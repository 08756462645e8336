//! Capture coordinator
//!
//! Single authority for "are we capturing". Lives on the UI-affine context:
//! every state mutation and every observer notification happens on the
//! thread that owns it. Session setup and teardown are handed to the session
//! thread as [`SessionRequest`]s and their outcomes come back as
//! [`SessionEvent`]s through [`CaptureCoordinator::handle_session_event`].
//!
//! Observers are told `capturing = true` as soon as `start` is accepted. If
//! the platform then fails to create the session, the flag is rolled back
//! and observers are told again.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::observers::{CaptureObserver, ObserverId, ObserverSet};
use super::state::CaptureStateRegister;
use crate::capture::{
    CaptureState, CaptureTarget, SessionEvent, SessionParams, SessionRequest, StateChange,
    Thumbnail,
};

pub struct CaptureCoordinator {
    state: CaptureStateRegister,
    observers: Arc<ObserverSet>,
    session_tx: mpsc::UnboundedSender<SessionRequest>,
    /// Incremented on every accepted `start`
    generation: u64,
    /// Target of the current generation, once derived
    target: Option<CaptureTarget>,
    /// Last decoded frame, kept across stop for late snapshot requests
    last_frame: Option<Thumbnail>,
}

impl CaptureCoordinator {
    pub fn new(
        session_tx: mpsc::UnboundedSender<SessionRequest>,
        observers: Arc<ObserverSet>,
    ) -> Self {
        Self {
            state: CaptureStateRegister::new(),
            observers,
            session_tx,
            generation: 0,
            target: None,
            last_frame: None,
        }
    }

    /// Begin capturing. No-op while already capturing.
    pub fn start(&mut self, params: SessionParams) {
        if self.state.get().capturing {
            debug!("start ignored, already capturing (generation {})", self.generation);
            return;
        }

        self.generation += 1;
        let generation = self.generation;
        let target = params.target();
        self.target = Some(target);
        info!(
            "Capture start requested (generation {}): {}x{} @ {}dpi",
            generation, target.width, target.height, target.density_dpi
        );

        self.set_capturing(true);

        if self
            .session_tx
            .send(SessionRequest::Open { generation, params })
            .is_err()
        {
            warn!("Capture session thread is gone, rolling back start");
            self.set_capturing(false);
        }
    }

    /// Stop capturing. No-op while idle.
    pub fn stop(&mut self) {
        if !self.state.get().capturing {
            debug!("stop ignored, not capturing");
            return;
        }

        let generation = self.generation;
        info!("Capture stop requested (generation {})", generation);
        self.set_capturing(false);

        if self
            .session_tx
            .send(SessionRequest::Close { generation })
            .is_err()
        {
            warn!("Capture session thread is gone, nothing to tear down");
        }
    }

    /// Last committed state snapshot
    pub fn query(&self) -> CaptureState {
        self.state.get()
    }

    /// Non-blocking state reader for other contexts
    pub fn subscribe(&self) -> watch::Receiver<CaptureState> {
        self.state.subscribe()
    }

    pub fn add_observer(&self, observer: Arc<dyn CaptureObserver>) -> ObserverId {
        self.observers.add(observer)
    }

    pub fn remove_observer(&self, id: ObserverId) -> bool {
        self.observers.remove(id)
    }

    pub fn observers(&self) -> &Arc<ObserverSet> {
        &self.observers
    }

    /// Most recent decoded frame, if any was ever captured
    pub fn last_frame(&self) -> Option<Thumbnail> {
        self.last_frame.clone()
    }

    /// Capture target of the current or most recent session
    pub fn target(&self) -> Option<CaptureTarget> {
        self.target
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Apply an event reported by the session thread
    ///
    /// Events from superseded generations, or arriving after the current
    /// generation already stopped, are dropped.
    pub fn handle_session_event(&mut self, event: SessionEvent) {
        if event.generation() != self.generation {
            debug!(
                "Dropping event from generation {} (current {})",
                event.generation(),
                self.generation
            );
            return;
        }

        match event {
            SessionEvent::Started {
                session_id, target, ..
            } => {
                info!(
                    "Capture session {} live at {}x{}",
                    session_id, target.width, target.height
                );
            }
            SessionEvent::StartFailed { reason, .. } => self.on_session_failed(&reason),
            SessionEvent::FrameReady { thumbnail, .. } => self.on_frame_ready(thumbnail),
            SessionEvent::Ended { .. } => self.on_session_ended(),
        }
    }

    fn on_frame_ready(&mut self, thumbnail: Thumbnail) {
        if !self.state.get().capturing {
            return;
        }
        self.last_frame = Some(thumbnail);
        let change = self.state.set_frame_available(true);
        self.notify(change);
    }

    fn on_session_ended(&mut self) {
        if self.state.get().capturing {
            info!("Capture session ended by the platform");
            self.stop();
        }
    }

    fn on_session_failed(&mut self, reason: &str) {
        if self.state.get().capturing {
            warn!("Capture session could not start: {}", reason);
            self.set_capturing(false);
        }
    }

    fn set_capturing(&mut self, capturing: bool) {
        let change = self.state.set_capturing(capturing);
        self.notify(change);
    }

    fn notify(&self, change: StateChange) {
        if change.is_empty() {
            return;
        }
        let state = self.state.get();
        debug!("Capture state changed: {:?} ({:?})", state, change);
        self.observers.notify(state, change);
    }
}
