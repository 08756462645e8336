//! UI-affine event loop - owns the coordinator and marshals requests onto it

mod runner;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, watch};

use crate::capture::CaptureState;

pub use runner::App;

/// Commands that can be sent to the app loop from any context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppCommand {
    /// Ask for permission and start capturing
    StartCapture,
    /// Stop capturing
    StopCapture,
    /// Repost the latest frame into the notification
    Snapshot,
    /// Show settings
    OpenSettings,
    /// Log the status view
    Status,
    /// Stop capturing and exit the loop
    Shutdown,
}

/// Cloneable handle for talking to the app loop
#[derive(Clone)]
pub struct AppHandle {
    cmd_tx: mpsc::Sender<AppCommand>,
    state_rx: watch::Receiver<CaptureState>,
}

impl AppHandle {
    pub async fn send(&self, cmd: AppCommand) -> Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .with_context(|| format!("App loop is gone, dropped {:?}", cmd))
    }

    /// Send from a thread outside the async runtime
    pub fn blocking_send(&self, cmd: AppCommand) -> Result<()> {
        self.cmd_tx
            .blocking_send(cmd)
            .with_context(|| format!("App loop is gone, dropped {:?}", cmd))
    }

    /// Last committed capture state; never blocks
    pub fn query(&self) -> CaptureState {
        *self.state_rx.borrow()
    }
}

/// Create the command channel for the app loop
pub fn create_app_channels() -> (mpsc::Sender<AppCommand>, mpsc::Receiver<AppCommand>) {
    mpsc::channel(32)
}
