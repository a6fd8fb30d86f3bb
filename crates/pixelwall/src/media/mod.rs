pub mod buffer;
pub mod decoder;
pub mod types;
pub mod video;
pub mod worker;

use std::path::Path;

use crate::error::MediaError;
use types::Frame;

/// A re-openable stream of frames. One `open` is one pass over the source;
/// producers loop by opening it again after `next_frame` returns `None`.
pub trait FrameSource: Sized {
    fn open(path: &Path) -> Result<Self, MediaError>;
    fn next_frame(&mut self) -> Result<Option<Frame>, MediaError>;
}

impl FrameSource for decoder::GifSource {
    fn open(path: &Path) -> Result<Self, MediaError> {
        decoder::GifSource::open(path)
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, MediaError> {
        decoder::GifSource::next_frame(self)
    }
}

impl FrameSource for video::VideoSource {
    fn open(path: &Path) -> Result<Self, MediaError> {
        video::VideoSource::open(path)
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, MediaError> {
        video::VideoSource::next_frame(self)
    }
}
