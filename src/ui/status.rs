//! Status view model
//!
//! Mirrors the coordinator state for display. Registers itself as an
//! observer while attached and refreshes from a snapshot on attach, since
//! observers never hear about transitions that happened before they joined.

use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::capture::{CaptureState, DisplayGeometrySource, StateChange};
use crate::coordinator::{CaptureObserver, ObserverId, ObserverSet};

/// Counts shown next to the capture toggle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisplayCounts {
    pub total: usize,
    pub presentation: usize,
}

#[derive(Debug, Default)]
struct ViewState {
    capture: CaptureState,
    displays: Option<DisplayCounts>,
}

#[derive(Default)]
pub struct StatusView {
    state: Mutex<ViewState>,
}

impl StatusView {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register with the observer set and sync to the current state
    pub fn attach(
        self: &Arc<Self>,
        observers: &ObserverSet,
        current: CaptureState,
    ) -> ObserverId {
        self.lock().capture = current;
        observers.add(self.clone())
    }

    pub fn detach(&self, observers: &ObserverSet, id: ObserverId) {
        observers.remove(id);
    }

    pub fn capture_state(&self) -> CaptureState {
        self.lock().capture
    }

    /// Recount attached displays
    ///
    /// Only displays that are on and flagged for presentation count toward
    /// `presentation`.
    pub fn update_display_counts(&self, source: &dyn DisplayGeometrySource) -> DisplayCounts {
        let displays = source.displays();
        for d in &displays {
            debug!("Display {}: on={} presentation={}", d.id, d.is_on, d.is_presentation);
        }
        let counts = DisplayCounts {
            total: displays.len(),
            presentation: displays
                .iter()
                .filter(|d| d.is_on && d.is_presentation)
                .count(),
        };
        self.lock().displays = Some(counts);
        counts
    }

    /// One-line rendering of the view
    pub fn render(&self) -> String {
        let capture = self.capture_state();
        let displays = match self.lock().displays {
            Some(c) => format!("{} ({} presentation)", c.total, c.presentation),
            None => "-".to_string(),
        };
        format!(
            "capturing: {}, frame: {}, displays: {}",
            on_off(capture.capturing),
            if capture.frame_available { "available" } else { "none" },
            displays
        )
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ViewState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl CaptureObserver for StatusView {
    fn on_capture_state_changed(&self, state: CaptureState, change: StateChange) {
        self.lock().capture = state;
        if change.capturing {
            info!("Capturing: {}", on_off(state.capturing));
        }
        if change.frame_available && state.frame_available {
            info!("First frame available");
        }
    }
}

fn on_off(v: bool) -> &'static str {
    if v {
        "on"
    } else {
        "off"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{DisplayGeometry, DisplayInfo};

    struct Displays(Vec<DisplayInfo>);

    impl DisplayGeometrySource for Displays {
        fn current_geometry(&self) -> DisplayGeometry {
            DisplayGeometry {
                width: 1,
                height: 1,
                density_dpi: 1,
            }
        }

        fn displays(&self) -> Vec<DisplayInfo> {
            self.0.clone()
        }
    }

    #[test]
    fn test_attach_syncs_and_detach_stops_updates() {
        let observers = ObserverSet::new();
        let view = StatusView::new();
        let current = CaptureState {
            capturing: true,
            frame_available: false,
        };
        let id = view.attach(&observers, current);
        assert_eq!(view.capture_state(), current);

        view.detach(&observers, id);
        observers.notify(
            CaptureState::default(),
            StateChange {
                capturing: true,
                frame_available: false,
            },
        );
        assert!(view.capture_state().capturing);
    }

    #[test]
    fn test_presentation_count_requires_display_on() {
        let view = StatusView::new();
        let source = Displays(vec![
            DisplayInfo { id: 0, is_on: true, is_presentation: false },
            DisplayInfo { id: 1, is_on: true, is_presentation: true },
            DisplayInfo { id: 2, is_on: false, is_presentation: true },
        ]);
        let counts = view.update_display_counts(&source);
        assert_eq!(counts, DisplayCounts { total: 3, presentation: 1 });
        assert!(view.render().contains("3 (1 presentation)"));
    }

    #[test]
    fn test_render_before_counts() {
        let view = StatusView::new();
        assert_eq!(view.render(), "capturing: off, frame: none, displays: -");
    }
}
