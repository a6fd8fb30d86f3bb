//! Error types shared across the engine.

use std::path::PathBuf;

/// Failures while resolving, opening or decoding a playlist item.
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    /// Extension does not map to a supported media kind.
    #[error("unsupported media kind for '{}'", path.display())]
    Unsupported { path: PathBuf },

    /// IO error while opening the source.
    #[error("failed to open '{}': {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Still image could not be decoded.
    #[error("failed to decode image: {0}")]
    Image(#[from] image::ImageError),

    /// GIF stream could not be decoded.
    #[error("failed to decode GIF: {0}")]
    Gif(#[from] gif::DecodingError),

    /// Source is not pre-normalized to the panel size.
    #[error("expected {expected_w}x{expected_h} media, got {width}x{height}")]
    Dimensions {
        width: u32,
        height: u32,
        expected_w: u32,
        expected_h: u32,
    },

    /// Raw pixel payload had the wrong length.
    #[error("frame payload is {got} bytes, expected {expected}")]
    FrameSize { got: usize, expected: usize },

    /// Source yielded no frames at all.
    #[error("'{}' contains no frames", path.display())]
    Empty { path: PathBuf },

    /// ffprobe/ffmpeg failed to run or produced unusable output.
    #[error("video tool error: {0}")]
    Video(String),
}

/// Failure reported by a concrete LED sink.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("pixel index {index} out of range (strip has {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Frame write failed even after the renderer's retries.
#[derive(Debug, thiserror::Error)]
#[error("hardware write failed after {attempts} attempts: {last}")]
pub struct RenderError {
    pub attempts: u32,
    #[source]
    pub last: SinkError,
}

/// Why a media worker ended other than by being killed.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error(transparent)]
    Media(#[from] MediaError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("failed to spawn thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("worker thread panicked")]
    Panicked,
}

/// Errors surfaced to callers of the engine handle.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The engine thread has exited; controls are no longer accepted.
    #[error("engine is not running")]
    Stopped,

    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[source] std::io::Error),
}

impl<T> From<crossbeam_channel::SendError<T>> for EngineError {
    fn from(_: crossbeam_channel::SendError<T>) -> Self {
        EngineError::Stopped
    }
}

impl From<crossbeam_channel::RecvError> for EngineError {
    fn from(_: crossbeam_channel::RecvError) -> Self {
        EngineError::Stopped
    }
}
