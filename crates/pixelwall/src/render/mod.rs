pub mod sink;

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use crate::error::{RenderError, SinkError};
use crate::media::types::{Frame, GRID_HEIGHT, GRID_PIXELS, GRID_WIDTH};
use sink::LedSink;

/// Retries after the first failed write.
pub const WRITE_RETRIES: u32 = 3;
/// Backoff before the first retry; doubles on each further retry.
pub const RETRY_BACKOFF: Duration = Duration::from_millis(5);

/// Map a logical (row, col) to the strip position of the LED wall.
///
/// The wall is one strip of 1024 LEDs laid out so the top-left pixel is the
/// last LED, with even and odd rows running in opposite directions. The same
/// wiring on a 3x3 panel:
///
/// ```text
///   (0,0)=8  (0,1)=7  (0,2)=6
///   (1,0)=3  (1,1)=4  (1,2)=5
///   (2,0)=2  (2,1)=1  (2,2)=0
/// ```
pub fn physical_index(row: usize, col: usize) -> usize {
    let last = GRID_PIXELS - 1;
    if row % 2 == 0 {
        last - (row * GRID_WIDTH + col)
    } else {
        last - (((row + 1) * GRID_WIDTH - 1) - col)
    }
}

/// Inverse of [`physical_index`].
pub fn logical_position(index: usize) -> (usize, usize) {
    let linear = GRID_PIXELS - 1 - index;
    let row = linear / GRID_WIDTH;
    let offset = linear % GRID_WIDTH;
    let col = if row % 2 == 0 {
        offset
    } else {
        GRID_WIDTH - 1 - offset
    };
    (row, col)
}

/// Sole owner of the LED sink. Every device write, from any worker or from
/// the engine's reset path, goes through the one hardware lock in here.
pub struct Renderer {
    hardware: Mutex<Box<dyn LedSink>>,
}

impl Renderer {
    pub fn new(sink: Box<dyn LedSink>) -> Self {
        Self {
            hardware: Mutex::new(sink),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Box<dyn LedSink>> {
        self.hardware.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write every pixel in strip order, then flush once.
    pub fn display_frame(&self, frame: &Frame) -> Result<(), RenderError> {
        let mut sink = self.lock();
        with_retries(|| {
            for row in 0..GRID_HEIGHT {
                for col in 0..GRID_WIDTH {
                    sink.set_pixel(physical_index(row, col), frame.pixel(row, col))?;
                }
            }
            sink.flush()
        })
    }

    /// Blank the wall.
    pub fn reset(&self) -> Result<(), RenderError> {
        self.display_frame(&Frame::black())
    }

    /// Apply a global brightness in [0, 1]; the sink receives 0..=255.
    pub fn set_brightness(&self, level: f64) -> Result<(), RenderError> {
        let scaled = (level.clamp(0.0, 1.0) * 255.0).round() as u8;
        let mut sink = self.lock();
        with_retries(|| sink.set_global_brightness(scaled))
    }
}

/// Run a hardware operation, retrying with exponential backoff.
///
/// Called with the hardware lock held so a retried frame cannot interleave
/// with another writer.
fn with_retries(mut op: impl FnMut() -> Result<(), SinkError>) -> Result<(), RenderError> {
    let mut backoff = RETRY_BACKOFF;
    let mut attempt = 1;
    loop {
        match op() {
            Ok(()) => return Ok(()),
            Err(e) if attempt > WRITE_RETRIES => {
                return Err(RenderError {
                    attempts: attempt,
                    last: e,
                });
            }
            Err(e) => {
                log::warn!("LED write failed (attempt {attempt}): {e}; retrying in {backoff:?}");
                thread::sleep(backoff);
                backoff *= 2;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::types::Rgb;
    use crate::render::sink::recording::RecordingSink;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn serpentine_corners() {
        assert_eq!(physical_index(0, 0), 1023);
        assert_eq!(physical_index(0, 31), 992);
        assert_eq!(physical_index(1, 0), 960);
        assert_eq!(physical_index(1, 31), 991);
        assert_eq!(physical_index(31, 0), 0);
    }

    #[test]
    fn serpentine_is_a_bijection() {
        let mut seen = HashSet::new();
        for row in 0..GRID_HEIGHT {
            for col in 0..GRID_WIDTH {
                let idx = physical_index(row, col);
                assert!(idx < GRID_PIXELS);
                assert!(seen.insert(idx), "collision at ({row}, {col})");
                assert_eq!(logical_position(idx), (row, col));
            }
        }
        assert_eq!(seen.len(), GRID_PIXELS);
    }

    #[test]
    fn frame_lands_in_strip_order() {
        let (sink, log) = RecordingSink::new();
        let renderer = Renderer::new(Box::new(sink));
        let mut frame = Frame::black();
        frame.pixels[0] = [1, 2, 3];
        frame.pixels[GRID_WIDTH] = [4, 5, 6];
        renderer.display_frame(&frame).unwrap();

        let last = log.last().unwrap();
        assert_eq!(last.strip[1023], [1, 2, 3]);
        assert_eq!(last.strip[physical_index(1, 0)], [4, 5, 6]);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn reset_writes_black() {
        let (sink, log) = RecordingSink::new();
        let renderer = Renderer::new(Box::new(sink));
        renderer.display_frame(&Frame::solid([9, 9, 9])).unwrap();
        renderer.reset().unwrap();
        assert!(log.last().unwrap().is_black());
    }

    #[test]
    fn brightness_scaled_and_clamped() {
        let (sink, log) = RecordingSink::new();
        let renderer = Renderer::new(Box::new(sink));
        renderer.set_brightness(0.5).unwrap();
        assert_eq!(log.brightness(), 128);
        renderer.set_brightness(7.0).unwrap();
        assert_eq!(log.brightness(), 255);
        renderer.set_brightness(-1.0).unwrap();
        assert_eq!(log.brightness(), 0);
    }

    /// Fails its first `failures` flushes.
    struct FlakySink {
        failures: Arc<AtomicU32>,
        flushes: Arc<AtomicU32>,
    }

    impl LedSink for FlakySink {
        fn set_pixel(&mut self, _index: usize, _rgb: Rgb) -> Result<(), SinkError> {
            Ok(())
        }

        fn flush(&mut self) -> Result<(), SinkError> {
            self.flushes.fetch_add(1, Ordering::SeqCst);
            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                return Err(SinkError::Io(std::io::Error::other("bus glitch")));
            }
            Ok(())
        }

        fn set_global_brightness(&mut self, _level: u8) -> Result<(), SinkError> {
            Ok(())
        }
    }

    fn flaky(failures: u32) -> (Renderer, Arc<AtomicU32>) {
        let flushes = Arc::new(AtomicU32::new(0));
        let sink = FlakySink {
            failures: Arc::new(AtomicU32::new(failures)),
            flushes: flushes.clone(),
        };
        (Renderer::new(Box::new(sink)), flushes)
    }

    #[test]
    fn transient_failures_are_retried() {
        let (renderer, flushes) = flaky(2);
        renderer.display_frame(&Frame::black()).unwrap();
        assert_eq!(flushes.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn persistent_failure_gives_up() {
        let (renderer, flushes) = flaky(100);
        let err = renderer.display_frame(&Frame::black()).unwrap_err();
        assert_eq!(err.attempts, WRITE_RETRIES + 1);
        assert_eq!(flushes.load(Ordering::SeqCst), WRITE_RETRIES + 1);
    }
}
