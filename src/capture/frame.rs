//! Frame buffers and thumbnail decoding
//!
//! Raw frames come straight from the capture session with whatever row
//! padding the platform uses. Decoding into an RGBA thumbnail runs on the
//! blocking worker pool, never on the session thread.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use image::{imageops, Rgba, RgbaImage};

use super::{CaptureError, PixelFormat};

/// One frame buffer as delivered by a capture session
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    /// Bytes between the start of consecutive rows (may include padding).
    pub row_stride: usize,
    pub format: PixelFormat,
    /// Presentation timestamp in milliseconds since session start.
    pub pts_ms: u64,
    pub data: Vec<u8>,
}

impl RawFrame {
    /// Minimum buffer length required to hold this frame
    fn required_len(&self) -> usize {
        let row = self.width as usize * self.format.bytes_per_pixel();
        match self.height as usize {
            0 => 0,
            h => self.row_stride * (h - 1) + row,
        }
    }
}

/// Decoded, display-ready image of the latest frame
///
/// Cloning is cheap; the pixels are shared.
#[derive(Debug, Clone)]
pub struct Thumbnail {
    image: Arc<RgbaImage>,
    pts_ms: u64,
}

impl Thumbnail {
    /// Decode a raw frame, downscaling so the width is at most `max_width`
    pub fn from_frame(frame: &RawFrame, max_width: u32) -> Result<Self, CaptureError> {
        if frame.width == 0 || frame.height == 0 {
            return Err(CaptureError::InvalidTarget {
                width: frame.width,
                height: frame.height,
            });
        }

        let bpp = frame.format.bytes_per_pixel();
        if frame.row_stride < frame.width as usize * bpp {
            return Err(CaptureError::InvalidStride {
                format: frame.format,
                width: frame.width,
                row_stride: frame.row_stride,
            });
        }

        let expected = frame.required_len();
        if frame.data.len() < expected {
            return Err(CaptureError::FrameTooSmall {
                format: frame.format,
                expected,
                actual: frame.data.len(),
            });
        }

        let mut image = RgbaImage::new(frame.width, frame.height);
        for (y, row) in frame
            .data
            .chunks(frame.row_stride)
            .take(frame.height as usize)
            .enumerate()
        {
            for x in 0..frame.width {
                let offset = x as usize * bpp;
                let pixel = &row[offset..offset + bpp];
                image.put_pixel(x, y as u32, Rgba(decode_pixel(frame.format, pixel)));
            }
        }

        let image = if max_width > 0 && frame.width > max_width {
            let height = ((u64::from(frame.height) * u64::from(max_width)) / u64::from(frame.width))
                .max(1) as u32;
            imageops::thumbnail(&image, max_width, height)
        } else {
            image
        };

        Ok(Self {
            image: Arc::new(image),
            pts_ms: frame.pts_ms,
        })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn pts_ms(&self) -> u64 {
        self.pts_ms
    }

    #[cfg(test)]
    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Write the thumbnail as a PNG file
    pub fn save_png(&self, path: &Path) -> Result<()> {
        self.image
            .save_with_format(path, image::ImageFormat::Png)
            .with_context(|| format!("Failed to write snapshot: {:?}", path))
    }
}

fn decode_pixel(format: PixelFormat, px: &[u8]) -> [u8; 4] {
    match format {
        PixelFormat::Rgba8888 => [px[0], px[1], px[2], px[3]],
        PixelFormat::Rgbx8888 => [px[0], px[1], px[2], 0xff],
        PixelFormat::Rgb565 => {
            let v = u16::from_le_bytes([px[0], px[1]]);
            let r = ((v >> 11) & 0x1f) as u8;
            let g = ((v >> 5) & 0x3f) as u8;
            let b = (v & 0x1f) as u8;
            [
                (r << 3) | (r >> 2),
                (g << 2) | (g >> 4),
                (b << 3) | (b >> 2),
                0xff,
            ]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_frame(width: u32, height: u32, padding: usize, rgba: [u8; 4]) -> RawFrame {
        let row_stride = width as usize * 4 + padding;
        let mut data = vec![0u8; row_stride * height as usize];
        for row in data.chunks_mut(row_stride) {
            for px in row[..width as usize * 4].chunks_mut(4) {
                px.copy_from_slice(&rgba);
            }
        }
        RawFrame {
            width,
            height,
            row_stride,
            format: PixelFormat::Rgba8888,
            pts_ms: 42,
            data,
        }
    }

    #[test]
    fn test_decode_skips_row_padding() {
        let frame = solid_frame(4, 3, 16, [10, 20, 30, 255]);
        let thumb = Thumbnail::from_frame(&frame, 0).unwrap();
        assert_eq!((thumb.width(), thumb.height()), (4, 3));
        assert_eq!(thumb.pts_ms(), 42);
        for px in thumb.image().pixels() {
            assert_eq!(px.0, [10, 20, 30, 255]);
        }
    }

    #[test]
    fn test_decode_downscales_to_max_width() {
        let frame = solid_frame(108, 192, 0, [0, 0, 0, 255]);
        let thumb = Thumbnail::from_frame(&frame, 54).unwrap();
        assert_eq!((thumb.width(), thumb.height()), (54, 96));
    }

    #[test]
    fn test_rgbx_forces_opaque_alpha() {
        let mut frame = solid_frame(2, 2, 0, [1, 2, 3, 0]);
        frame.format = PixelFormat::Rgbx8888;
        let thumb = Thumbnail::from_frame(&frame, 0).unwrap();
        assert_eq!(thumb.image().get_pixel(1, 1).0, [1, 2, 3, 255]);
    }

    #[test]
    fn test_rgb565_expands_channels() {
        let white = 0xffffu16.to_le_bytes();
        let frame = RawFrame {
            width: 1,
            height: 1,
            row_stride: 2,
            format: PixelFormat::Rgb565,
            pts_ms: 0,
            data: white.to_vec(),
        };
        let thumb = Thumbnail::from_frame(&frame, 0).unwrap();
        assert_eq!(thumb.image().get_pixel(0, 0).0, [255, 255, 255, 255]);
    }

    #[test]
    fn test_short_buffer_is_rejected() {
        let mut frame = solid_frame(4, 4, 0, [0; 4]);
        frame.data.truncate(20);
        let err = Thumbnail::from_frame(&frame, 0).unwrap_err();
        assert!(matches!(err, CaptureError::FrameTooSmall { expected: 64, actual: 20, .. }));
    }

    #[test]
    fn test_narrow_stride_is_rejected() {
        let mut frame = solid_frame(4, 1, 0, [0; 4]);
        frame.row_stride = 8;
        assert!(matches!(
            Thumbnail::from_frame(&frame, 0),
            Err(CaptureError::InvalidStride { .. })
        ));
    }
}
