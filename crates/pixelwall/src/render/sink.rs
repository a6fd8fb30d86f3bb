//! LED strip sinks. The concrete device binding lives outside this crate;
//! anything that can set a pixel, flush and dim can drive the wall.

use std::io::Write;

use super::logical_position;
use crate::error::SinkError;
use crate::media::types::{GRID_HEIGHT, GRID_PIXELS, GRID_WIDTH, Rgb};

/// Hardware abstraction consumed by the renderer.
pub trait LedSink: Send {
    /// Stage a colour at a physical strip index. Nothing is shown until flush.
    fn set_pixel(&mut self, index: usize, rgb: Rgb) -> Result<(), SinkError>;
    /// Push the staged strip to the LEDs.
    fn flush(&mut self) -> Result<(), SinkError>;
    /// Global brightness, 0..=255.
    fn set_global_brightness(&mut self, level: u8) -> Result<(), SinkError>;
}

/// In-memory strip; the headless null device.
pub struct MemorySink {
    strip: Vec<Rgb>,
    flushes: u64,
}

impl MemorySink {
    pub fn new() -> Self {
        Self {
            strip: vec![[0, 0, 0]; GRID_PIXELS],
            flushes: 0,
        }
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

fn stage(strip: &mut [Rgb], index: usize, rgb: Rgb) -> Result<(), SinkError> {
    let len = strip.len();
    let slot = strip
        .get_mut(index)
        .ok_or(SinkError::IndexOutOfRange { index, len })?;
    *slot = rgb;
    Ok(())
}

impl LedSink for MemorySink {
    fn set_pixel(&mut self, index: usize, rgb: Rgb) -> Result<(), SinkError> {
        stage(&mut self.strip, index, rgb)
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.flushes += 1;
        if self.flushes % 1000 == 0 {
            log::trace!("memory sink: {} flushes", self.flushes);
        }
        Ok(())
    }

    fn set_global_brightness(&mut self, _level: u8) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Draws the wall in a truecolor terminal, two pixel rows per text line using
/// upper-half blocks (foreground = upper row, background = lower row).
pub struct TerminalSink<W: Write + Send = std::io::Stdout> {
    out: W,
    strip: Vec<Rgb>,
    brightness: u8,
}

impl TerminalSink {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> TerminalSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            strip: vec![[0, 0, 0]; GRID_PIXELS],
            brightness: 255,
        }
    }

    fn scaled(&self, rgb: Rgb) -> Rgb {
        let b = self.brightness as u16;
        rgb.map(|c| ((c as u16 * b) / 255) as u8)
    }

    fn render_text(&self) -> String {
        let mut grid = vec![[0u8; 3]; GRID_PIXELS];
        for (index, rgb) in self.strip.iter().enumerate() {
            let (row, col) = logical_position(index);
            grid[row * GRID_WIDTH + col] = self.scaled(*rgb);
        }

        // Cursor home, then one line per pair of rows
        let mut text = String::from("\x1b[H");
        for pair in 0..GRID_HEIGHT / 2 {
            for col in 0..GRID_WIDTH {
                let [ur, ug, ub] = grid[(pair * 2) * GRID_WIDTH + col];
                let [lr, lg, lb] = grid[(pair * 2 + 1) * GRID_WIDTH + col];
                text.push_str(&format!(
                    "\x1b[38;2;{ur};{ug};{ub}m\x1b[48;2;{lr};{lg};{lb}m\u{2580}"
                ));
            }
            text.push_str("\x1b[0m\n");
        }
        text
    }
}

impl<W: Write + Send> LedSink for TerminalSink<W> {
    fn set_pixel(&mut self, index: usize, rgb: Rgb) -> Result<(), SinkError> {
        stage(&mut self.strip, index, rgb)
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        let text = self.render_text();
        self.out.write_all(text.as_bytes())?;
        self.out.flush()?;
        Ok(())
    }

    fn set_global_brightness(&mut self, level: u8) -> Result<(), SinkError> {
        self.brightness = level;
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::recording::RecordingSink;
    use super::*;
    use crate::render::physical_index;

    #[test]
    fn memory_sink_rejects_out_of_range() {
        let mut sink = MemorySink::new();
        assert!(sink.set_pixel(GRID_PIXELS - 1, [1, 1, 1]).is_ok());
        assert!(matches!(
            sink.set_pixel(GRID_PIXELS, [1, 1, 1]),
            Err(SinkError::IndexOutOfRange { index: 1024, len: 1024 })
        ));
    }

    #[test]
    fn recording_sink_logs_flushes() {
        let (mut sink, log) = RecordingSink::new();
        assert!(log.is_empty());
        sink.set_pixel(5, [9, 8, 7]).unwrap();
        sink.flush().unwrap();
        sink.flush().unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log.last().unwrap().strip[5], [9, 8, 7]);
        assert!(log.last().unwrap().writer.is_some());
        log.clear();
        assert!(log.is_empty());
    }

    #[test]
    fn terminal_sink_draws_half_blocks() {
        let mut sink = TerminalSink::new(Vec::new());
        sink.set_pixel(physical_index(0, 0), [255, 0, 0]).unwrap();
        sink.set_pixel(physical_index(1, 0), [0, 0, 255]).unwrap();
        sink.flush().unwrap();

        let text = String::from_utf8(sink.out.clone()).unwrap();
        assert!(text.starts_with("\x1b[H\x1b[38;2;255;0;0m\x1b[48;2;0;0;255m\u{2580}"));
        assert_eq!(text.matches('\n').count(), GRID_HEIGHT / 2);
    }

    #[test]
    fn terminal_sink_applies_brightness() {
        let mut sink = TerminalSink::new(Vec::new());
        sink.set_global_brightness(0).unwrap();
        sink.set_pixel(physical_index(0, 0), [255, 255, 255]).unwrap();
        sink.flush().unwrap();
        let text = String::from_utf8(sink.out.clone()).unwrap();
        assert!(!text.contains("255;255;255"));
    }
}
