//! Synthetic capture platform
//!
//! Stands in for the OS projection stack on hosts without one. Sessions
//! render a moving test pattern at a fixed rate, and permission denial,
//! session creation failure and out-of-band revocation can all be simulated
//! from configuration.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::{
    CaptureError, CaptureSession, CaptureSessionFactory, CaptureTarget, DisplayGeometry,
    DisplayGeometrySource, DisplayInfo, PermissionBroker, PixelFormat, ProjectionGrant, RawFrame,
    SessionEventSink,
};
use crate::config::{DisplayConfig, SyntheticConfig};

/// Result code reported with a granted projection
const RESULT_OK: i32 = -1;

/// Test-pattern implementation of every platform collaborator
#[derive(Debug, Clone)]
pub struct SyntheticPlatform {
    display: DisplayConfig,
    options: SyntheticConfig,
}

impl SyntheticPlatform {
    pub fn new(display: DisplayConfig, options: SyntheticConfig) -> Self {
        Self { display, options }
    }
}

impl PermissionBroker for SyntheticPlatform {
    fn request_projection(&self) -> Option<ProjectionGrant> {
        if self.options.deny_permission {
            info!("Synthetic permission broker: projection denied");
            return None;
        }
        Some(ProjectionGrant {
            result_code: RESULT_OK,
            payload: b"synthetic-projection".to_vec(),
        })
    }
}

impl DisplayGeometrySource for SyntheticPlatform {
    fn current_geometry(&self) -> DisplayGeometry {
        DisplayGeometry {
            width: self.display.width,
            height: self.display.height,
            density_dpi: self.display.density_dpi,
        }
    }

    fn displays(&self) -> Vec<DisplayInfo> {
        let builtin = DisplayInfo {
            id: 0,
            is_on: true,
            is_presentation: false,
        };
        std::iter::once(builtin)
            .chain((1..=self.display.presentation_displays).map(|id| DisplayInfo {
                id,
                is_on: true,
                is_presentation: true,
            }))
            .collect()
    }
}

impl CaptureSessionFactory for SyntheticPlatform {
    fn create_session(
        &self,
        grant: &ProjectionGrant,
        target: CaptureTarget,
        pixel_format: PixelFormat,
        buffer_count: u32,
        events: SessionEventSink,
    ) -> Result<Box<dyn CaptureSession>, CaptureError> {
        if self.options.fail_session {
            return Err(CaptureError::SessionCreate(
                "synthetic platform configured to fail".to_string(),
            ));
        }
        if grant.result_code != RESULT_OK {
            return Err(CaptureError::PermissionDenied);
        }
        if target.width == 0 || target.height == 0 {
            return Err(CaptureError::InvalidTarget {
                width: target.width,
                height: target.height,
            });
        }

        debug!(
            "Synthetic session for generation {} with {} buffers ({} byte grant)",
            events.generation(),
            buffer_count,
            grant.payload.len()
        );

        let interval = Duration::from_millis(1000 / u64::from(self.options.fps.max(1)));
        let revoke_after = self.options.revoke_after_secs.map(Duration::from_secs);
        let (stop_tx, stop_rx) = mpsc::channel();

        let thread = std::thread::Builder::new()
            .name("synthetic_display".to_string())
            .spawn(move || {
                render_loop(target, pixel_format, interval, revoke_after, events, stop_rx)
            })
            .map_err(|e| CaptureError::SessionCreate(e.to_string()))?;

        Ok(Box::new(SyntheticSession {
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        }))
    }
}

struct SyntheticSession {
    stop_tx: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl CaptureSession for SyntheticSession {
    fn stop(&mut self) -> Result<(), CaptureError> {
        drop(self.stop_tx.take());
        if let Some(thread) = self.thread.take() {
            thread
                .join()
                .map_err(|_| CaptureError::SessionStop("render thread panicked".to_string()))?;
        }
        Ok(())
    }
}

impl Drop for SyntheticSession {
    fn drop(&mut self) {
        if self.thread.is_some() {
            if let Err(e) = self.stop() {
                warn!("Synthetic session dropped uncleanly: {}", e);
            }
        }
    }
}

fn render_loop(
    target: CaptureTarget,
    format: PixelFormat,
    interval: Duration,
    revoke_after: Option<Duration>,
    events: SessionEventSink,
    stop_rx: mpsc::Receiver<()>,
) {
    let started = Instant::now();
    let mut frame_index: u64 = 0;

    loop {
        let elapsed = started.elapsed();
        if revoke_after.is_some_and(|limit| elapsed >= limit) {
            info!("Synthetic platform revoking projection after {:?}", elapsed);
            events.session_ended();
            return;
        }

        events.frame_ready(test_pattern(target, format, frame_index, elapsed));
        frame_index += 1;

        match stop_rx.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => continue,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}

/// Diagonal gradient that scrolls one step per frame
fn test_pattern(target: CaptureTarget, format: PixelFormat, index: u64, elapsed: Duration) -> RawFrame {
    let bpp = format.bytes_per_pixel();
    let row_stride = target.width as usize * bpp;
    let mut data = Vec::with_capacity(row_stride * target.height as usize);
    let shift = (index % 256) as u32;

    for y in 0..target.height {
        for x in 0..target.width {
            let r = ((x * 255) / target.width.max(1)) as u8;
            let g = ((y * 255) / target.height.max(1)) as u8;
            let b = ((x + y + shift) % 256) as u8;
            match format {
                PixelFormat::Rgba8888 | PixelFormat::Rgbx8888 => {
                    data.extend_from_slice(&[r, g, b, 0xff])
                }
                PixelFormat::Rgb565 => {
                    let v = (u16::from(r >> 3) << 11) | (u16::from(g >> 2) << 5) | u16::from(b >> 3);
                    data.extend_from_slice(&v.to_le_bytes());
                }
            }
        }
    }

    RawFrame {
        width: target.width,
        height: target.height,
        row_stride,
        format,
        pts_ms: elapsed.as_millis() as u64,
        data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn platform(options: SyntheticConfig) -> SyntheticPlatform {
        SyntheticPlatform::new(DisplayConfig::default(), options)
    }

    #[test]
    fn test_broker_grants_unless_denied() {
        assert!(platform(SyntheticConfig::default()).request_projection().is_some());

        let denied = platform(SyntheticConfig {
            deny_permission: true,
            ..Default::default()
        });
        assert!(denied.request_projection().is_none());
    }

    #[test]
    fn test_display_listing_counts_presentation_displays() {
        let p = SyntheticPlatform::new(
            DisplayConfig {
                presentation_displays: 2,
                ..Default::default()
            },
            SyntheticConfig::default(),
        );
        let displays = p.displays();
        assert_eq!(displays.len(), 3);
        assert_eq!(displays.iter().filter(|d| d.is_presentation).count(), 2);
        assert_eq!(p.current_geometry().width, 1080);
    }

    #[test]
    fn test_pattern_matches_target_layout() {
        let target = CaptureTarget {
            width: 54,
            height: 96,
            density_dpi: 320,
        };
        let frame = test_pattern(target, PixelFormat::Rgb565, 3, Duration::from_millis(250));
        assert_eq!(frame.row_stride, 108);
        assert_eq!(frame.data.len(), 108 * 96);
        assert_eq!(frame.pts_ms, 250);
    }
}
