use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

use super::types::{Frame, GRID_HEIGHT, GRID_PIXELS, GRID_WIDTH};
use crate::error::MediaError;

/// Minimum GIF frame delay; zero-delay frames would spin the pacer.
pub const MIN_GIF_DELAY: Duration = Duration::from_millis(20);

/// Playlist item kind, resolved once from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Static,
    Animated,
    Video,
}

impl MediaKind {
    pub fn from_path(path: &Path) -> Result<Self, MediaError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        match ext.as_str() {
            "png" | "jpg" | "jpeg" | "webp" | "bmp" => Ok(MediaKind::Static),
            "gif" => Ok(MediaKind::Animated),
            "mp4" | "m4v" | "mov" | "webm" | "mkv" | "avi" => Ok(MediaKind::Video),
            _ => Err(MediaError::Unsupported {
                path: path.to_path_buf(),
            }),
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            MediaKind::Static => "image",
            MediaKind::Animated => "animation",
            MediaKind::Video => "video",
        }
    }
}

fn check_dimensions(width: u32, height: u32) -> Result<(), MediaError> {
    if width as usize != GRID_WIDTH || height as usize != GRID_HEIGHT {
        return Err(MediaError::Dimensions {
            width,
            height,
            expected_w: GRID_WIDTH as u32,
            expected_h: GRID_HEIGHT as u32,
        });
    }
    Ok(())
}

/// Load a static image (PNG, JPEG, etc.) via the `image` crate.
pub fn load_static_image(path: &Path) -> Result<Frame, MediaError> {
    let img = image::open(path)?;
    let rgba = img.to_rgba8();
    let (w, h) = rgba.dimensions();
    check_dimensions(w, h)?;
    Frame::from_rgba_bytes(rgba.as_raw())
}

/// Streaming GIF reader that yields composited frames with their delays.
///
/// Frames are decoded lazily so the producer can loop the source forever
/// without holding the whole animation in memory.
pub struct GifSource {
    reader: gif::Decoder<BufReader<File>>,
    // Accumulator for compositing (GIF frames can be partial updates)
    canvas: Vec<u8>,
}

impl GifSource {
    pub fn open(path: &Path) -> Result<Self, MediaError> {
        let file = File::open(path).map_err(|source| MediaError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let mut options = gif::DecodeOptions::new();
        options.set_color_output(gif::ColorOutput::RGBA);
        let reader = options.read_info(BufReader::new(file))?;
        check_dimensions(reader.width() as u32, reader.height() as u32)?;

        Ok(Self {
            reader,
            canvas: vec![0u8; GRID_PIXELS * 4],
        })
    }

    /// Next frame, or `None` at end of stream.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, MediaError> {
        let Some(frame) = self.reader.read_next_frame()? else {
            return Ok(None);
        };

        // GIF delay is in centiseconds
        let delay = Duration::from_millis(frame.delay as u64 * 10).max(MIN_GIF_DELAY);

        // Composite frame onto canvas at the correct offset
        let fx = frame.left as usize;
        let fy = frame.top as usize;
        let fw = frame.width as usize;
        let fh = frame.height as usize;

        for y in 0..fh {
            for x in 0..fw {
                let src_idx = (y * fw + x) * 4;
                let dst_x = fx + x;
                let dst_y = fy + y;
                if dst_x < GRID_WIDTH && dst_y < GRID_HEIGHT {
                    let dst_idx = (dst_y * GRID_WIDTH + dst_x) * 4;
                    let src = &frame.buffer[src_idx..src_idx + 4];
                    // Only overwrite if source pixel is not fully transparent
                    if src[3] > 0 {
                        self.canvas[dst_idx..dst_idx + 4].copy_from_slice(src);
                    }
                }
            }
        }

        Ok(Some(
            Frame::from_rgba_bytes(&self.canvas)?.with_duration(delay),
        ))
    }
}

/// Natural playback length of one pass over the item. `None` for still images.
pub fn natural_length(path: &Path) -> Result<Option<Duration>, MediaError> {
    match MediaKind::from_path(path)? {
        MediaKind::Static => Ok(None),
        MediaKind::Animated => {
            let mut source = GifSource::open(path)?;
            let mut total = Duration::ZERO;
            let mut frames = 0usize;
            while let Some(frame) = source.next_frame()? {
                total += frame.duration.unwrap_or(MIN_GIF_DELAY);
                frames += 1;
            }
            if frames == 0 {
                return Err(MediaError::Empty {
                    path: path.to_path_buf(),
                });
            }
            Ok(Some(total))
        }
        MediaKind::Video => {
            let meta = super::video::probe_video(path)?;
            Ok(Some(Duration::from_secs_f64(meta.duration_secs.max(0.0))))
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Write a 32x32 solid-colour PNG.
    pub(crate) fn write_png(path: &Path, color: [u8; 3]) {
        let img = image::RgbImage::from_pixel(GRID_WIDTH as u32, GRID_HEIGHT as u32, image::Rgb(color));
        img.save(path).unwrap();
    }

    /// Write a 32x32 GIF with one solid frame per colour, `delay_cs` each.
    pub(crate) fn write_gif(path: &Path, colors: &[[u8; 3]], delay_cs: u16) {
        let file = File::create(path).unwrap();
        let mut encoder =
            gif::Encoder::new(file, GRID_WIDTH as u16, GRID_HEIGHT as u16, &[]).unwrap();
        encoder.set_repeat(gif::Repeat::Infinite).unwrap();
        for color in colors {
            let mut rgb = Vec::with_capacity(GRID_PIXELS * 3);
            for _ in 0..GRID_PIXELS {
                rgb.extend_from_slice(color);
            }
            let mut frame =
                gif::Frame::from_rgb(GRID_WIDTH as u16, GRID_HEIGHT as u16, &rgb);
            frame.delay = delay_cs;
            encoder.write_frame(&frame).unwrap();
        }
    }

    #[test]
    fn kind_from_extension() {
        assert_eq!(MediaKind::from_path(Path::new("a.png")).unwrap(), MediaKind::Static);
        assert_eq!(MediaKind::from_path(Path::new("a.JPG")).unwrap(), MediaKind::Static);
        assert_eq!(MediaKind::from_path(Path::new("a.gif")).unwrap(), MediaKind::Animated);
        assert_eq!(MediaKind::from_path(Path::new("dir/a.mp4")).unwrap(), MediaKind::Video);
        assert!(matches!(
            MediaKind::from_path(Path::new("notes.txt")),
            Err(MediaError::Unsupported { .. })
        ));
        assert!(MediaKind::from_path(Path::new("no_extension")).is_err());
    }

    #[test]
    fn static_png_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("red.png");
        write_png(&path, [255, 0, 0]);
        let frame = load_static_image(&path).unwrap();
        assert_eq!(frame.pixel(0, 0), [255, 0, 0]);
        assert_eq!(frame.pixel(31, 31), [255, 0, 0]);
    }

    #[test]
    fn wrong_size_image_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.png");
        image::RgbImage::new(64, 64).save(&path).unwrap();
        assert!(matches!(
            load_static_image(&path),
            Err(MediaError::Dimensions { width: 64, height: 64, .. })
        ));
    }

    #[test]
    fn missing_image_is_an_error() {
        assert!(load_static_image(Path::new("/nonexistent/x.png")).is_err());
    }

    #[test]
    fn gif_frames_and_delays() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("anim.gif");
        write_gif(&path, &[[255, 0, 0], [0, 0, 255]], 5);

        let mut source = GifSource::open(&path).unwrap();
        let first = source.next_frame().unwrap().unwrap();
        let second = source.next_frame().unwrap().unwrap();
        assert!(source.next_frame().unwrap().is_none());

        assert_eq!(first.duration, Some(Duration::from_millis(50)));
        assert!(first.pixel(0, 0)[0] > 200);
        assert!(second.pixel(0, 0)[2] > 200);
    }

    #[test]
    fn zero_delay_is_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fast.gif");
        write_gif(&path, &[[1, 2, 3]], 0);
        let mut source = GifSource::open(&path).unwrap();
        let frame = source.next_frame().unwrap().unwrap();
        assert_eq!(frame.duration, Some(MIN_GIF_DELAY));
    }

    #[test]
    fn natural_length_sums_gif_delays() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("anim.gif");
        write_gif(&path, &[[255, 0, 0], [0, 255, 0], [0, 0, 255]], 10);
        assert_eq!(
            natural_length(&path).unwrap(),
            Some(Duration::from_millis(300))
        );

        let png = dir.path().join("still.png");
        write_png(&png, [0, 0, 0]);
        assert_eq!(natural_length(&png).unwrap(), None);
    }
}
