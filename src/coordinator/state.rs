//! Capture state register
//!
//! Single writer, many readers. The coordinator holds the only writer;
//! readers on any thread get the last committed snapshot without blocking.

use tokio::sync::watch;
use tracing::warn;

use crate::capture::{CaptureState, StateChange};

pub struct CaptureStateRegister {
    tx: watch::Sender<CaptureState>,
}

impl CaptureStateRegister {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(CaptureState::default());
        Self { tx }
    }

    /// Last committed snapshot
    pub fn get(&self) -> CaptureState {
        *self.tx.borrow()
    }

    /// Reader handle for other contexts
    pub fn subscribe(&self) -> watch::Receiver<CaptureState> {
        self.tx.subscribe()
    }

    /// Commit a new `capturing` value
    ///
    /// Leaving the capturing state also clears `frame_available`.
    pub fn set_capturing(&self, capturing: bool) -> StateChange {
        self.commit(|state| {
            state.capturing = capturing;
            if !capturing {
                state.frame_available = false;
            }
        })
    }

    /// Commit a new `frame_available` value
    ///
    /// Frames cannot exist without an active session, so raising the flag
    /// while idle is refused.
    pub fn set_frame_available(&self, available: bool) -> StateChange {
        if available && !self.get().capturing {
            warn!("Ignoring frame availability while not capturing");
            return StateChange::default();
        }
        self.commit(|state| state.frame_available = available)
    }

    fn commit(&self, update: impl FnOnce(&mut CaptureState)) -> StateChange {
        let mut change = StateChange::default();
        self.tx.send_if_modified(|state| {
            let before = *state;
            update(state);
            change = StateChange {
                capturing: before.capturing != state.capturing,
                frame_available: before.frame_available != state.frame_available,
            };
            !change.is_empty()
        });
        change
    }
}

impl Default for CaptureStateRegister {
    fn default() -> Self {
        Self::new()
    }
}
