//! Raw video frames and the format they are declared with to the encoder.

use std::time::Duration;

/// Bytes per pixel in the `rgb24` layout.
pub const BYTES_PER_PIXEL: usize = 3;

/// An 8-bit RGB colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const BLACK: Self = Rgb(0, 0, 0);
    pub const WHITE: Self = Rgb(255, 255, 255);
}

/// Dimensions and rate of the raw frame stream.
///
/// The encoder arguments and every [`Frame`] are derived from the same value, which is the only
/// thing that keeps them in agreement: the raw stream has no framing of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoFormat {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl VideoFormat {
    /// Number of bytes in one serialized frame.
    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * BYTES_PER_PIXEL
    }

    /// The `WxH` form used by ffmpeg's `-video_size`.
    pub fn video_size(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }

    /// Nominal time between two frames.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.fps.max(1)
    }
}

impl Default for VideoFormat {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 30,
        }
    }
}

/// A single raster image in interleaved `rgb24`, row-major, no padding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Frame {
    /// A frame of the given size with every pixel set to `color`.
    pub fn filled(width: u32, height: u32, color: Rgb) -> Self {
        let pixels = width as usize * height as usize;
        let mut data = Vec::with_capacity(pixels * BYTES_PER_PIXEL);
        for _ in 0..pixels {
            data.extend_from_slice(&[color.0, color.1, color.2]);
        }
        Self {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// The serialized frame, exactly as it goes to the encoder.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgb> {
        let i = self.offset(x, y)?;
        Some(Rgb(self.data[i], self.data[i + 1], self.data[i + 2]))
    }

    /// Sets one pixel; coordinates outside the frame are ignored.
    pub fn put_pixel(&mut self, x: u32, y: u32, color: Rgb) {
        if let Some(i) = self.offset(x, y) {
            self.data[i..i + BYTES_PER_PIXEL].copy_from_slice(&[color.0, color.1, color.2]);
        }
    }

    fn offset(&self, x: u32, y: u32) -> Option<usize> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some((y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL)
    }
}
