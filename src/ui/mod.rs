//! Status view and notifications

pub mod notifications;
mod status;

pub use notifications::{
    CaptureNotification, LogNotificationSink, NotificationAction, NotificationChannel,
    NotificationSink, ACTION_DO_SNAPSHOT, ACTION_OPEN_SETTINGS,
};
pub use status::StatusView;
