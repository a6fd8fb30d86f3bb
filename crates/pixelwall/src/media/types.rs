use std::time::Duration;

use crate::error::MediaError;

/// Panel width in pixels.
pub const GRID_WIDTH: usize = 32;
/// Panel height in pixels.
pub const GRID_HEIGHT: usize = 32;
/// Number of LEDs on the strip.
pub const GRID_PIXELS: usize = GRID_WIDTH * GRID_HEIGHT;

/// One pixel colour.
pub type Rgb = [u8; 3];

/// A decoded 32x32 frame ready for the renderer.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    /// Row-major RGB pixels.
    pub pixels: Box<[Rgb; GRID_PIXELS]>,
    /// How long this frame stays up. Set for GIF frames; video and still
    /// frames use a cadence chosen by their worker.
    pub duration: Option<Duration>,
}

impl Frame {
    /// All-black frame.
    pub fn black() -> Self {
        Self::solid([0, 0, 0])
    }

    /// Frame filled with a single colour.
    pub fn solid(color: Rgb) -> Self {
        Self {
            pixels: Box::new([color; GRID_PIXELS]),
            duration: None,
        }
    }

    /// Build from a packed RGB24 buffer (3 bytes per pixel, row-major).
    pub fn from_rgb_bytes(data: &[u8]) -> Result<Self, MediaError> {
        Self::from_packed(data, 3)
    }

    /// Build from a packed RGBA8 buffer; alpha is composited onto black.
    pub fn from_rgba_bytes(data: &[u8]) -> Result<Self, MediaError> {
        Self::from_packed(data, 4)
    }

    fn from_packed(data: &[u8], stride: usize) -> Result<Self, MediaError> {
        let expected = GRID_PIXELS * stride;
        if data.len() != expected {
            return Err(MediaError::FrameSize {
                got: data.len(),
                expected,
            });
        }

        let mut frame = Self::black();
        for (dst, src) in frame.pixels.iter_mut().zip(data.chunks_exact(stride)) {
            if stride == 4 {
                let a = src[3] as u16;
                *dst = [
                    ((src[0] as u16 * a) / 255) as u8,
                    ((src[1] as u16 * a) / 255) as u8,
                    ((src[2] as u16 * a) / 255) as u8,
                ];
            } else {
                *dst = [src[0], src[1], src[2]];
            }
        }
        Ok(frame)
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Pixel at logical (row, col).
    pub fn pixel(&self, row: usize, col: usize) -> Rgb {
        self.pixels[row * GRID_WIDTH + col]
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("first_pixel", &self.pixels[0])
            .field("duration", &self.duration)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn black_frame_is_black() {
        let f = Frame::black();
        assert!(f.pixels.iter().all(|p| *p == [0, 0, 0]));
        assert!(f.duration.is_none());
    }

    #[test]
    fn rgb_bytes_row_major() {
        let mut data = vec![0u8; GRID_PIXELS * 3];
        // row 1, col 2
        let i = (GRID_WIDTH + 2) * 3;
        data[i..i + 3].copy_from_slice(&[10, 20, 30]);
        let f = Frame::from_rgb_bytes(&data).unwrap();
        assert_eq!(f.pixel(1, 2), [10, 20, 30]);
        assert_eq!(f.pixel(2, 1), [0, 0, 0]);
    }

    #[test]
    fn rgba_alpha_composites_onto_black() {
        let mut data = vec![0u8; GRID_PIXELS * 4];
        data[0..4].copy_from_slice(&[200, 100, 50, 255]);
        data[4..8].copy_from_slice(&[200, 100, 50, 0]);
        let f = Frame::from_rgba_bytes(&data).unwrap();
        assert_eq!(f.pixel(0, 0), [200, 100, 50]);
        assert_eq!(f.pixel(0, 1), [0, 0, 0]);
    }

    #[test]
    fn wrong_payload_size_rejected() {
        let err = Frame::from_rgb_bytes(&[0u8; 12]).unwrap_err();
        assert!(matches!(
            err,
            MediaError::FrameSize { got: 12, expected } if expected == GRID_PIXELS * 3
        ));
    }
}
