//! Capture status notification
//!
//! One persistent notification reports that the screen is being captured.
//! It carries the latest frame as its large icon and two actions, "open
//! settings" and "take snapshot". Activating an action delivers a
//! [`NotificationAction`] back into the process over a channel, never by
//! calling into the coordinator directly.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::capture::Thumbnail;
use crate::config::NotificationConfig;

/// Action identifier for the settings button
pub const ACTION_OPEN_SETTINGS: &str = "open_settings";
/// Action identifier for the snapshot button
pub const ACTION_DO_SNAPSHOT: &str = "do_snapshot";

/// Actions that can be triggered from notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationAction {
    /// User asked to open the settings view
    OpenSettings,
    /// User asked to repost the latest frame
    TakeSnapshot,
    /// User dismissed or tapped the notification
    Dismissed,
}

impl NotificationAction {
    /// Map a platform action identifier to an action
    pub fn from_action_id(action_id: &str) -> Self {
        match action_id {
            ACTION_OPEN_SETTINGS => NotificationAction::OpenSettings,
            ACTION_DO_SNAPSHOT => NotificationAction::TakeSnapshot,
            "dismiss" | "default" => NotificationAction::Dismissed,
            other => {
                warn!("Unknown notification action: {}", other);
                NotificationAction::Dismissed
            }
        }
    }
}

/// Channel the capture notification is posted on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationChannel {
    pub id: String,
    pub name: String,
    pub description: String,
}

impl NotificationChannel {
    pub fn from_config(config: &NotificationConfig) -> Self {
        Self {
            id: config.channel_id.clone(),
            name: config.channel_name.clone(),
            description: config.channel_description.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationButton {
    pub action_id: &'static str,
    pub label: String,
}

/// Fully built capture notification
#[derive(Debug, Clone)]
pub struct CaptureNotification {
    pub id: u32,
    pub channel_id: String,
    pub title: String,
    pub text: String,
    pub when: DateTime<Local>,
    pub large_icon: Option<Thumbnail>,
    pub buttons: Vec<NotificationButton>,
}

impl CaptureNotification {
    /// Build the notification without a thumbnail
    pub fn build(config: &NotificationConfig) -> Self {
        Self {
            id: config.id,
            channel_id: config.channel_id.clone(),
            title: config.title.clone(),
            text: config.text.clone(),
            when: Local::now(),
            large_icon: None,
            buttons: vec![
                NotificationButton {
                    action_id: ACTION_OPEN_SETTINGS,
                    label: config.settings_label.clone(),
                },
                NotificationButton {
                    action_id: ACTION_DO_SNAPSHOT,
                    label: config.snapshot_label.clone(),
                },
            ],
        }
    }

    pub fn with_large_icon(mut self, icon: Thumbnail) -> Self {
        self.large_icon = Some(icon);
        self
    }
}

/// Platform notification renderer
pub trait NotificationSink: Send + Sync {
    fn create_channel(&self, channel: &NotificationChannel) -> Result<()>;

    /// Post or replace the notification with the same id
    fn notify(&self, notification: &CaptureNotification) -> Result<()>;

    fn cancel(&self, id: u32) -> Result<()>;
}

/// Notification sink that renders to the log
///
/// Large icons are written as PNG files on the blocking pool when a snapshot
/// directory is set.
/// Button presses are simulated with [`LogNotificationSink::activate`].
pub struct LogNotificationSink {
    action_tx: mpsc::UnboundedSender<NotificationAction>,
    snapshot_dir: Option<PathBuf>,
    shown: Mutex<Option<u32>>,
}

impl LogNotificationSink {
    pub fn new(
        action_tx: mpsc::UnboundedSender<NotificationAction>,
        snapshot_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            action_tx,
            snapshot_dir,
            shown: Mutex::new(None),
        }
    }

    /// Press a button on the visible notification
    ///
    /// Returns false when no notification is showing.
    pub fn activate(&self, action_id: &str) -> bool {
        let Some(id) = *self.shown.lock().unwrap_or_else(|e| e.into_inner()) else {
            warn!("No notification showing, ignoring action {}", action_id);
            return false;
        };

        debug!("Notification {} action received: {}", id, action_id);
        let action = NotificationAction::from_action_id(action_id);
        self.action_tx.send(action).is_ok()
    }

    /// Hand the large icon to the blocking pool to be written as PNG
    ///
    /// Returns the path the icon will be written to, if any.
    fn save_icon(&self, notification: &CaptureNotification) -> Option<PathBuf> {
        let (Some(dir), Some(icon)) = (&self.snapshot_dir, &notification.large_icon) else {
            return None;
        };
        let path = dir.join(format!(
            "snapshot-{}.png",
            notification.when.format("%Y%m%d-%H%M%S%.3f")
        ));

        let dir = dir.clone();
        let icon = icon.clone();
        let target = path.clone();
        let write = move || {
            if let Err(e) = write_snapshot(&dir, &icon, &target) {
                error!("Failed to save snapshot: {:#}", e);
            }
        };
        match Handle::try_current() {
            Ok(pool) => {
                pool.spawn_blocking(write);
            }
            Err(_) => write(),
        }
        Some(path)
    }
}

fn write_snapshot(dir: &Path, icon: &Thumbnail, path: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create snapshot directory: {:?}", dir))?;
    icon.save_png(path)
}

impl NotificationSink for LogNotificationSink {
    fn create_channel(&self, channel: &NotificationChannel) -> Result<()> {
        info!(
            "Notification channel {} ready: {} ({})",
            channel.id, channel.name, channel.description
        );
        Ok(())
    }

    fn notify(&self, notification: &CaptureNotification) -> Result<()> {
        let icon_path = self.save_icon(notification);
        *self.shown.lock().unwrap_or_else(|e| e.into_inner()) = Some(notification.id);

        let buttons: Vec<String> = notification
            .buttons
            .iter()
            .map(|b| format!("{} ({})", b.label, b.action_id))
            .collect();
        match (&notification.large_icon, icon_path) {
            (Some(icon), Some(path)) => info!(
                "[notification {} on {}] {}: {} - {}x{} thumbnail @{}ms saving to {:?} {:?}",
                notification.id,
                notification.channel_id,
                notification.title,
                notification.text,
                icon.width(),
                icon.height(),
                icon.pts_ms(),
                path,
                buttons
            ),
            (Some(icon), None) => info!(
                "[notification {} on {}] {}: {} - {}x{} thumbnail @{}ms {:?}",
                notification.id,
                notification.channel_id,
                notification.title,
                notification.text,
                icon.width(),
                icon.height(),
                icon.pts_ms(),
                buttons
            ),
            (None, _) => info!(
                "[notification {} on {}] {}: {} {:?}",
                notification.id,
                notification.channel_id,
                notification.title,
                notification.text,
                buttons
            ),
        }
        Ok(())
    }

    fn cancel(&self, id: u32) -> Result<()> {
        let mut shown = self.shown.lock().unwrap_or_else(|e| e.into_inner());
        if *shown == Some(id) {
            *shown = None;
            info!("[notification {}] removed", id);
        }
        Ok(())
    }
}
