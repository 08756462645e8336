//! Configuration management for projection-test

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::capture::PixelFormat;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Capture target configuration
    #[serde(default)]
    pub capture: CaptureConfig,

    /// Notification appearance and snapshot behavior
    #[serde(default)]
    pub notification: NotificationConfig,

    /// Display geometry reported by the synthetic platform
    #[serde(default)]
    pub display: DisplayConfig,

    /// Synthetic platform behavior
    #[serde(default)]
    pub synthetic: SyntheticConfig,

    /// Path to config file (not serialized)
    #[serde(skip)]
    config_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Multiplier applied to display dimensions to size the capture target
    #[serde(default = "default_scale_factor")]
    pub scale_factor: f32,

    /// Pixel layout requested from the capture session
    #[serde(default)]
    pub pixel_format: PixelFormat,

    /// Number of frame buffers the session may hold at once
    #[serde(default = "default_max_images")]
    pub max_images: u32,

    /// Thumbnails wider than this are downscaled (0 = keep capture size)
    #[serde(default = "default_thumbnail_max_width")]
    pub thumbnail_max_width: u32,

    /// Whether to request capture automatically on launch
    #[serde(default = "default_true")]
    pub autostart_on_launch: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Identifier of the persistent capture notification
    #[serde(default = "default_notification_id")]
    pub id: u32,

    #[serde(default = "default_channel_id")]
    pub channel_id: String,

    #[serde(default = "default_channel_name")]
    pub channel_name: String,

    #[serde(default = "default_channel_description")]
    pub channel_description: String,

    #[serde(default = "default_title")]
    pub title: String,

    #[serde(default = "default_text")]
    pub text: String,

    #[serde(default = "default_settings_label")]
    pub settings_label: String,

    #[serde(default = "default_snapshot_label")]
    pub snapshot_label: String,

    /// Repost the latest frame this often while capturing (0 = never)
    #[serde(default = "default_snapshot_interval")]
    pub snapshot_interval_secs: u64,

    /// Directory where snapshot PNGs are written
    pub snapshot_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_display_width")]
    pub width: u32,

    #[serde(default = "default_display_height")]
    pub height: u32,

    #[serde(default = "default_density_dpi")]
    pub density_dpi: u32,

    /// Extra presentation displays reported alongside the built-in one
    #[serde(default)]
    pub presentation_displays: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntheticConfig {
    /// Frames per second rendered by synthetic sessions
    #[serde(default = "default_fps")]
    pub fps: u32,

    /// Refuse every projection request
    #[serde(default)]
    pub deny_permission: bool,

    /// Fail session creation after permission was granted
    #[serde(default)]
    pub fail_session: bool,

    /// End each session on the platform side after this many seconds
    pub revoke_after_secs: Option<u64>,
}

// Default value functions
fn default_scale_factor() -> f32 {
    0.05
}

fn default_max_images() -> u32 {
    2
}

fn default_thumbnail_max_width() -> u32 {
    256
}

fn default_true() -> bool {
    true
}

fn default_notification_id() -> u32 {
    1000
}

fn default_channel_id() -> String {
    "screen_capturing_status_notification".to_string()
}

fn default_channel_name() -> String {
    "Screen capturing status".to_string()
}

fn default_channel_description() -> String {
    "Shows whether the screen is being captured".to_string()
}

fn default_title() -> String {
    "ProjectionTest".to_string()
}

fn default_text() -> String {
    "Capturing screen".to_string()
}

fn default_settings_label() -> String {
    "Settings".to_string()
}

fn default_snapshot_label() -> String {
    "Snapshot".to_string()
}

fn default_snapshot_interval() -> u64 {
    5
}

fn default_display_width() -> u32 {
    1080
}

fn default_display_height() -> u32 {
    1920
}

fn default_density_dpi() -> u32 {
    320
}

fn default_fps() -> u32 {
    10
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            scale_factor: default_scale_factor(),
            pixel_format: PixelFormat::default(),
            max_images: default_max_images(),
            thumbnail_max_width: default_thumbnail_max_width(),
            autostart_on_launch: true,
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            id: default_notification_id(),
            channel_id: default_channel_id(),
            channel_name: default_channel_name(),
            channel_description: default_channel_description(),
            title: default_title(),
            text: default_text(),
            settings_label: default_settings_label(),
            snapshot_label: default_snapshot_label(),
            snapshot_interval_secs: default_snapshot_interval(),
            snapshot_dir: None,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: default_display_width(),
            height: default_display_height(),
            density_dpi: default_density_dpi(),
            presentation_displays: 0,
        }
    }
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            fps: default_fps(),
            deny_permission: false,
            fail_session: false,
            revoke_after_secs: None,
        }
    }
}

impl Config {
    /// Load configuration from default location or create default
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let mut config = Config::default();
            config.config_path = Some(config_path);
            config.save()?;
            Ok(config)
        }
    }

    /// Load and validate configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let mut config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        config
            .validate()
            .with_context(|| format!("Invalid config file: {:?}", path))?;
        config.config_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = self.config_path()?;

        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, contents)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        Ok(())
    }

    /// Get the config file path
    pub fn config_path(&self) -> Result<PathBuf> {
        match &self.config_path {
            Some(path) => Ok(path.clone()),
            None => Self::default_config_path(),
        }
    }

    /// Get default config path
    fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = directories::ProjectDirs::from("dev", "hogelab", "projection-test")
            .context("Failed to determine config directory")?;

        Ok(proj_dirs.config_dir().join("config.toml"))
    }

    /// Reject values the capture pipeline cannot honor
    pub fn validate(&self) -> Result<()> {
        let scale = self.capture.scale_factor;
        if !(scale > 0.0 && scale <= 1.0) {
            bail!("capture.scale_factor must be in (0, 1], got {}", scale);
        }
        if self.capture.max_images == 0 {
            bail!("capture.max_images must be at least 1");
        }
        if self.display.width == 0 || self.display.height == 0 || self.display.density_dpi == 0 {
            bail!(
                "display geometry must be non-zero, got {}x{} @ {}dpi",
                self.display.width,
                self.display.height,
                self.display.density_dpi
            );
        }
        if self.synthetic.fps == 0 {
            bail!("synthetic.fps must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.capture.scale_factor, 0.05);
        assert_eq!(config.capture.pixel_format, PixelFormat::Rgba8888);
        assert_eq!(config.capture.max_images, 2);
        assert_eq!(config.notification.id, 1000);
        assert_eq!(config.notification.channel_id, "screen_capturing_status_notification");
        assert_eq!(config.display.width, 1080);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_sections_merge_with_defaults() {
        let config: Config = toml::from_str(
            r#"
            [capture]
            scale_factor = 0.1
            pixel_format = "rgb565"

            [synthetic]
            revoke_after_secs = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.capture.scale_factor, 0.1);
        assert_eq!(config.capture.pixel_format, PixelFormat::Rgb565);
        assert_eq!(config.capture.thumbnail_max_width, 256);
        assert_eq!(config.synthetic.revoke_after_secs, Some(3));
        assert_eq!(config.synthetic.fps, 10);
    }

    #[test]
    fn test_validate_rejects_bad_scale() {
        let mut config = Config::default();
        config.capture.scale_factor = 0.0;
        assert!(config.validate().is_err());
        config.capture.scale_factor = 1.5;
        assert!(config.validate().is_err());
        config.capture.scale_factor = 1.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_then_load_from() {
        let dir = std::env::temp_dir().join(format!("projection-test-{}", uuid::Uuid::new_v4()));
        let path = dir.join("config.toml");

        let mut config = Config::default();
        config.config_path = Some(path.clone());
        config.capture.scale_factor = 0.25;
        config.notification.snapshot_dir = Some(dir.join("snaps"));
        config.save().unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.capture.scale_factor, 0.25);
        assert_eq!(loaded.notification.snapshot_dir, Some(dir.join("snaps")));
        assert_eq!(loaded.config_path().unwrap(), path);

        std::fs::remove_dir_all(&dir).ok();
    }
}
