//! App main loop
//!
//! Runs on one task, which plays the role of the UI thread: it is the only
//! place the coordinator is touched. User commands, session events and
//! notification actions all arrive as messages and are applied in order.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::{AppCommand, AppHandle};
use crate::capture::{DisplayGeometrySource, SessionEvent};
use crate::coordinator::CaptureCoordinator;
use crate::service::CaptureService;
use crate::ui::{NotificationAction, StatusView};

pub struct App {
    coordinator: CaptureCoordinator,
    service: CaptureService,
    status: Arc<StatusView>,
    geometry: Arc<dyn DisplayGeometrySource>,
    config_path: Option<PathBuf>,
    cmd_rx: mpsc::Receiver<AppCommand>,
    session_rx: mpsc::UnboundedReceiver<SessionEvent>,
    action_rx: mpsc::UnboundedReceiver<NotificationAction>,
    snapshot_interval: Option<Duration>,
}

impl App {
    /// Assemble the loop and a handle for talking to it
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        coordinator: CaptureCoordinator,
        service: CaptureService,
        status: Arc<StatusView>,
        geometry: Arc<dyn DisplayGeometrySource>,
        config_path: Option<PathBuf>,
        session_rx: mpsc::UnboundedReceiver<SessionEvent>,
        action_rx: mpsc::UnboundedReceiver<NotificationAction>,
        snapshot_interval_secs: u64,
    ) -> (Self, AppHandle) {
        let (cmd_tx, cmd_rx) = super::create_app_channels();
        let handle = AppHandle {
            cmd_tx,
            state_rx: coordinator.subscribe(),
        };
        let app = Self {
            coordinator,
            service,
            status,
            geometry,
            config_path,
            cmd_rx,
            session_rx,
            action_rx,
            snapshot_interval: (snapshot_interval_secs > 0)
                .then(|| Duration::from_secs(snapshot_interval_secs)),
        };
        (app, handle)
    }

    /// Run until shutdown is requested or every handle is dropped
    pub async fn run(mut self) -> Result<()> {
        self.service.attach(&self.coordinator)?;
        let status_id = self
            .status
            .attach(self.coordinator.observers(), self.coordinator.query());
        let counts = self.status.update_display_counts(self.geometry.as_ref());
        info!(
            "App loop started ({} displays, {} presentation)",
            counts.total, counts.presentation
        );

        let mut snapshot_timer = self.snapshot_interval.map(|period| {
            let mut timer = tokio::time::interval_at(Instant::now() + period, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
            timer
        });

        loop {
            tokio::select! {
                // Handle commands
                cmd = self.cmd_rx.recv() => {
                    let Some(cmd) = cmd else {
                        info!("All app handles dropped");
                        break;
                    };
                    if !self.handle_command(cmd) {
                        break;
                    }
                }

                // Session thread results and platform callbacks
                Some(event) = self.session_rx.recv() => {
                    self.coordinator.handle_session_event(event);
                }

                // Handle notification actions (user pressed a notification button)
                Some(action) = self.action_rx.recv() => {
                    match action {
                        NotificationAction::TakeSnapshot => self.snapshot(),
                        NotificationAction::OpenSettings => self.open_settings(),
                        NotificationAction::Dismissed => debug!("Capture notification dismissed"),
                    }
                }

                // Periodic thumbnail refresh (if enabled)
                _ = async {
                    match snapshot_timer.as_mut() {
                        Some(timer) => timer.tick().await,
                        None => std::future::pending().await,
                    }
                } => {
                    if self.coordinator.query().capturing {
                        self.snapshot();
                    }
                }
            }
        }

        self.coordinator.stop();
        self.service.detach(&self.coordinator);
        self.status.detach(self.coordinator.observers(), status_id);
        info!("App loop stopped");
        Ok(())
    }

    /// Apply one command; returns false on shutdown
    fn handle_command(&mut self, cmd: AppCommand) -> bool {
        match cmd {
            AppCommand::StartCapture => {
                if let Err(e) = self.service.start(&mut self.coordinator) {
                    warn!("Capture not started: {}", e);
                }
            }
            AppCommand::StopCapture => self.service.stop(&mut self.coordinator),
            AppCommand::Snapshot => self.snapshot(),
            AppCommand::OpenSettings => self.open_settings(),
            AppCommand::Status => {
                self.status.update_display_counts(self.geometry.as_ref());
                info!("Status: {}", self.status.render());
            }
            AppCommand::Shutdown => {
                info!("Shutdown command received");
                return false;
            }
        }
        true
    }

    fn snapshot(&self) {
        match self.service.snapshot(&self.coordinator) {
            Ok(true) => {}
            Ok(false) => debug!("No snapshot, capture is off"),
            Err(e) => error!("Failed to post snapshot: {}", e),
        }
    }

    fn open_settings(&self) {
        match &self.config_path {
            Some(path) => info!("Settings: edit {:?}", path),
            None => info!("Settings: using built-in defaults"),
        }
        if let Some(target) = self.coordinator.target() {
            info!(
                "Session {}: {}x{} @ {}dpi",
                self.coordinator.generation(),
                target.width,
                target.height,
                target.density_dpi
            );
        }
        info!("Status: {}", self.status.render());
    }
}
