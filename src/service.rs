//! Background capture service
//!
//! Turns user-level commands into coordinator calls. Starting capture asks
//! the permission broker first; a refusal never reaches the coordinator.
//! While attached, the service keeps the persistent notification in step
//! with the capture state and reposts the latest frame on request.

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, error, info};

use crate::capture::{
    CaptureError, CaptureState, DisplayGeometrySource, PermissionBroker, SessionParams,
    StateChange,
};
use crate::config::{CaptureConfig, NotificationConfig};
use crate::coordinator::{CaptureCoordinator, CaptureObserver, ObserverId};
use crate::ui::{CaptureNotification, NotificationChannel, NotificationSink};

pub struct CaptureService {
    capture: CaptureConfig,
    notification: NotificationConfig,
    broker: Arc<dyn PermissionBroker>,
    geometry: Arc<dyn DisplayGeometrySource>,
    notifications: Arc<dyn NotificationSink>,
    observer_id: Option<ObserverId>,
}

impl CaptureService {
    pub fn new(
        capture: CaptureConfig,
        notification: NotificationConfig,
        broker: Arc<dyn PermissionBroker>,
        geometry: Arc<dyn DisplayGeometrySource>,
        notifications: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            capture,
            notification,
            broker,
            geometry,
            notifications,
            observer_id: None,
        }
    }

    /// Create the notification channel and start following capture state
    pub fn attach(&mut self, coordinator: &CaptureCoordinator) -> Result<()> {
        if self.observer_id.is_some() {
            return Ok(());
        }
        self.notifications
            .create_channel(&NotificationChannel::from_config(&self.notification))?;

        let notifier = ForegroundNotifier {
            config: self.notification.clone(),
            sink: self.notifications.clone(),
        };
        self.observer_id = Some(coordinator.add_observer(Arc::new(notifier)));
        Ok(())
    }

    pub fn detach(&mut self, coordinator: &CaptureCoordinator) {
        if let Some(id) = self.observer_id.take() {
            coordinator.remove_observer(id);
            if let Err(e) = self.notifications.cancel(self.notification.id) {
                error!("Failed to remove capture notification: {}", e);
            }
        }
    }

    /// Ask for projection permission and start capturing
    ///
    /// Returns [`CaptureError::PermissionDenied`] without touching the
    /// coordinator when the broker refuses.
    pub fn start(&self, coordinator: &mut CaptureCoordinator) -> Result<(), CaptureError> {
        if coordinator.query().capturing {
            debug!("Already capturing, not asking for permission again");
            return Ok(());
        }

        let grant = self
            .broker
            .request_projection()
            .ok_or(CaptureError::PermissionDenied)?;

        let geometry = self.geometry.current_geometry();
        info!(
            "Projection granted (result code {}), display {}x{} @ {}dpi",
            grant.result_code, geometry.width, geometry.height, geometry.density_dpi
        );

        coordinator.start(SessionParams {
            grant,
            display: geometry,
            pixel_format: self.capture.pixel_format,
            buffer_count: self.capture.max_images,
            scale_factor: self.capture.scale_factor,
        });
        Ok(())
    }

    pub fn stop(&self, coordinator: &mut CaptureCoordinator) {
        coordinator.stop();
    }

    /// Repost the notification with the latest captured frame
    ///
    /// Returns false when not capturing.
    pub fn snapshot(&self, coordinator: &CaptureCoordinator) -> Result<bool> {
        if !coordinator.query().capturing {
            debug!("Snapshot requested while not capturing");
            return Ok(false);
        }

        let notification = CaptureNotification::build(&self.notification);
        let notification = match coordinator.last_frame() {
            Some(frame) => notification.with_large_icon(frame),
            None => {
                debug!("Snapshot requested before the first frame");
                notification
            }
        };
        self.notifications.notify(&notification)?;
        Ok(true)
    }
}

/// Posts the notification when capture starts and removes it when it ends
struct ForegroundNotifier {
    config: NotificationConfig,
    sink: Arc<dyn NotificationSink>,
}

impl CaptureObserver for ForegroundNotifier {
    fn on_capture_state_changed(&self, state: CaptureState, change: StateChange) {
        if !change.capturing {
            return;
        }
        let result = if state.capturing {
            self.sink.notify(&CaptureNotification::build(&self.config))
        } else {
            self.sink.cancel(self.config.id)
        };
        if let Err(e) = result {
            error!("Failed to update capture notification: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{
        DisplayGeometry, DisplayInfo, PixelFormat, ProjectionGrant, RawFrame, SessionEvent,
        SessionRequest, Thumbnail,
    };
    use crate::coordinator::ObserverSet;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    struct Broker(bool);

    impl PermissionBroker for Broker {
        fn request_projection(&self) -> Option<ProjectionGrant> {
            self.0.then(|| ProjectionGrant {
                result_code: -1,
                payload: Vec::new(),
            })
        }
    }

    struct Geometry;

    impl DisplayGeometrySource for Geometry {
        fn current_geometry(&self) -> DisplayGeometry {
            DisplayGeometry {
                width: 1080,
                height: 1920,
                density_dpi: 320,
            }
        }

        fn displays(&self) -> Vec<DisplayInfo> {
            Vec::new()
        }
    }

    #[derive(Debug, PartialEq)]
    enum Posted {
        Notify { with_icon: bool },
        Cancel(u32),
    }

    #[derive(Default)]
    struct RecordingSink {
        posted: Mutex<Vec<Posted>>,
    }

    impl NotificationSink for RecordingSink {
        fn create_channel(&self, _channel: &NotificationChannel) -> Result<()> {
            Ok(())
        }

        fn notify(&self, notification: &CaptureNotification) -> Result<()> {
            self.posted.lock().unwrap().push(Posted::Notify {
                with_icon: notification.large_icon.is_some(),
            });
            Ok(())
        }

        fn cancel(&self, id: u32) -> Result<()> {
            self.posted.lock().unwrap().push(Posted::Cancel(id));
            Ok(())
        }
    }

    struct Fixture {
        service: CaptureService,
        coordinator: CaptureCoordinator,
        session_rx: mpsc::UnboundedReceiver<SessionRequest>,
        sink: Arc<RecordingSink>,
    }

    fn fixture(granted: bool) -> Fixture {
        let (session_tx, session_rx) = mpsc::unbounded_channel();
        let coordinator = CaptureCoordinator::new(session_tx, Arc::new(ObserverSet::new()));
        let sink = Arc::new(RecordingSink::default());
        let capture = CaptureConfig {
            scale_factor: 0.1,
            ..Default::default()
        };
        let mut service = CaptureService::new(
            capture,
            NotificationConfig::default(),
            Arc::new(Broker(granted)),
            Arc::new(Geometry),
            sink.clone(),
        );
        service.attach(&coordinator).unwrap();
        Fixture {
            service,
            coordinator,
            session_rx,
            sink,
        }
    }

    fn thumbnail() -> Thumbnail {
        let frame = RawFrame {
            width: 1,
            height: 1,
            row_stride: 4,
            format: PixelFormat::Rgba8888,
            pts_ms: 0,
            data: vec![0; 4],
        };
        Thumbnail::from_frame(&frame, 0).unwrap()
    }

    #[test]
    fn test_denied_permission_changes_nothing() {
        let mut f = fixture(false);
        let err = f.service.start(&mut f.coordinator).unwrap_err();
        assert!(matches!(err, CaptureError::PermissionDenied));
        assert_eq!(f.coordinator.query(), CaptureState::default());
        assert!(f.session_rx.try_recv().is_err());
        assert!(f.sink.posted.lock().unwrap().is_empty());
    }

    #[test]
    fn test_start_derives_target_and_posts_notification() {
        let mut f = fixture(true);
        f.service.start(&mut f.coordinator).unwrap();

        assert!(f.coordinator.query().capturing);
        match f.session_rx.try_recv().unwrap() {
            SessionRequest::Open { params, .. } => {
                assert_eq!(params.display, Geometry.current_geometry());
                let target = params.target();
                assert_eq!((target.width, target.height, target.density_dpi), (108, 192, 320));
                assert_eq!(params.buffer_count, 2);
            }
            other => panic!("unexpected request: {:?}", other),
        }
        assert_eq!(
            *f.sink.posted.lock().unwrap(),
            vec![Posted::Notify { with_icon: false }]
        );
    }

    #[test]
    fn test_stop_cancels_notification() {
        let mut f = fixture(true);
        f.service.start(&mut f.coordinator).unwrap();
        f.service.stop(&mut f.coordinator);
        assert_eq!(
            *f.sink.posted.lock().unwrap(),
            vec![Posted::Notify { with_icon: false }, Posted::Cancel(1000)]
        );
    }

    #[test]
    fn test_snapshot_reposts_latest_frame() {
        let mut f = fixture(true);
        assert!(!f.service.snapshot(&f.coordinator).unwrap());

        f.service.start(&mut f.coordinator).unwrap();
        assert!(f.service.snapshot(&f.coordinator).unwrap());

        f.coordinator.handle_session_event(SessionEvent::FrameReady {
            generation: f.coordinator.generation(),
            thumbnail: thumbnail(),
        });
        assert!(f.service.snapshot(&f.coordinator).unwrap());

        assert_eq!(
            *f.sink.posted.lock().unwrap(),
            vec![
                Posted::Notify { with_icon: false },
                Posted::Notify { with_icon: false },
                Posted::Notify { with_icon: true },
            ]
        );
    }

    #[test]
    fn test_detach_stops_following_state() {
        let mut f = fixture(true);
        f.service.detach(&f.coordinator);
        f.service.start(&mut f.coordinator).unwrap();
        assert_eq!(*f.sink.posted.lock().unwrap(), vec![Posted::Cancel(1000)]);
    }
}
