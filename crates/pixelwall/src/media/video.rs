//! Video decode via ffmpeg subprocess.
//!
//! - `ffprobe` probes metadata (dimensions, fps, duration) synchronously when
//!   the worker is built
//! - `ffmpeg -f rawvideo -pix_fmt rgb24` streams frames over a pipe, one
//!   3072-byte read per 32x32 frame
//! - End of stream and decode failure both end the current pass; the worker's
//!   producer reopens the source and keeps looping

use std::io::Read;
use std::path::Path;
use std::process::{Child, ChildStdout, Command, Stdio};
use std::time::Duration;

use super::types::{Frame, GRID_HEIGHT, GRID_PIXELS, GRID_WIDTH};
use crate::error::MediaError;

/// Frame rate assumed when the container does not report a usable one.
pub const FALLBACK_FPS: f64 = 30.0;

/// Video metadata from ffprobe.
#[derive(Debug, Clone)]
pub struct VideoMeta {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub duration_secs: f64,
}

impl VideoMeta {
    /// Fixed display interval derived from the source frame rate.
    pub fn frame_interval(&self) -> Duration {
        frame_interval(self.fps)
    }
}

pub fn frame_interval(fps: f64) -> Duration {
    let fps = if fps.is_finite() && fps > 0.0 { fps } else { FALLBACK_FPS };
    Duration::from_secs_f64(1.0 / fps)
}

/// Probe video metadata using ffprobe.
pub fn probe_video(path: &Path) -> Result<VideoMeta, MediaError> {
    let output = Command::new("ffprobe")
        .args([
            "-v", "quiet",
            "-print_format", "json",
            "-show_streams",
            "-show_format",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .map_err(|e| MediaError::Video(format!("ffprobe failed to execute: {e}")))?;

    if !output.status.success() {
        return Err(MediaError::Video(
            "ffprobe returned non-zero exit code".to_string(),
        ));
    }

    parse_probe_output(&output.stdout)
}

fn parse_probe_output(stdout: &[u8]) -> Result<VideoMeta, MediaError> {
    let json: serde_json::Value = serde_json::from_slice(stdout)
        .map_err(|e| MediaError::Video(format!("Failed to parse ffprobe JSON: {e}")))?;

    let missing = |what: &str| MediaError::Video(what.to_string());

    let streams = json["streams"]
        .as_array()
        .ok_or_else(|| missing("No streams in ffprobe output"))?;

    let video_stream = streams
        .iter()
        .find(|s| s["codec_type"].as_str() == Some("video"))
        .ok_or_else(|| missing("No video stream found"))?;

    let width = video_stream["width"]
        .as_u64()
        .ok_or_else(|| missing("Missing width"))? as u32;
    let height = video_stream["height"]
        .as_u64()
        .ok_or_else(|| missing("Missing height"))? as u32;

    let fps = parse_frame_rate(video_stream["r_frame_rate"].as_str().unwrap_or("30/1"));

    let duration_secs = json["format"]["duration"]
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .or_else(|| {
            video_stream["duration"]
                .as_str()
                .and_then(|s| s.parse::<f64>().ok())
        })
        .unwrap_or(0.0);

    Ok(VideoMeta {
        width,
        height,
        fps,
        duration_secs,
    })
}

fn parse_frame_rate(rate: &str) -> f64 {
    if let Some((num, den)) = rate.split_once('/') {
        let n: f64 = num.parse().unwrap_or(FALLBACK_FPS);
        let d: f64 = den.parse().unwrap_or(1.0);
        if d > 0.0 && n > 0.0 { n / d } else { FALLBACK_FPS }
    } else {
        rate.parse::<f64>()
            .ok()
            .filter(|r| *r > 0.0)
            .unwrap_or(FALLBACK_FPS)
    }
}

/// One ffmpeg decode pass over a video file.
///
/// The child process is killed and reaped on drop.
pub struct VideoSource {
    child: Child,
    stdout: ChildStdout,
    buf: Vec<u8>,
}

impl VideoSource {
    pub fn open(path: &Path) -> Result<Self, MediaError> {
        let mut child = Command::new("ffmpeg")
            .args(["-i"])
            .arg(path)
            .args([
                "-f", "rawvideo",
                "-pix_fmt", "rgb24",
                "-s", &format!("{GRID_WIDTH}x{GRID_HEIGHT}"),
                "-v", "quiet",
                "pipe:1",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| MediaError::Video(format!("Failed to spawn ffmpeg: {e}")))?;

        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(MediaError::Video("ffmpeg: no stdout pipe".to_string()));
        };

        Ok(Self {
            child,
            stdout,
            buf: vec![0u8; GRID_PIXELS * 3],
        })
    }

    /// Next frame, or `None` once ffmpeg stops producing full frames.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, MediaError> {
        match self.stdout.read_exact(&mut self.buf) {
            Ok(()) => Frame::from_rgb_bytes(&self.buf).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(MediaError::Video(format!("ffmpeg read failed: {e}"))),
        }
    }
}

impl Drop for VideoSource {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
