//! Media workers: one thread per playlist item being shown or warmed up.
//!
//! A worker starts decoding as soon as it is spawned but renders nothing
//! until its start signal fires. Animated and video workers run a decode
//! producer inside a thread scope, so the producer is always joined before
//! the worker thread itself returns, whatever path it exits by.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::select;

use super::FrameSource;
use super::buffer::FrameBuffer;
use super::decoder::{self, GifSource, MediaKind};
use super::types::Frame;
use super::video::{self, VideoSource};
use crate::error::WorkerError;
use crate::render::Renderer;
use crate::signal::{Listener, Trigger, signal};

/// Re-render interval for still images, so the wall recovers from any
/// external state loss.
pub const STATIC_REFRESH: Duration = Duration::from_millis(200);
/// Upper bound on how long a blocked producer or consumer goes without
/// checking its stop/kill signal.
pub const SIGNAL_POLL: Duration = Duration::from_millis(50);
/// Pause before reopening a source that failed or produced nothing.
pub const REOPEN_BACKOFF: Duration = Duration::from_millis(500);

static NEXT_WORKER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique worker identity, used in thread names and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerId(pub u64);

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "w{}", self.0)
    }
}

/// Everything a worker thread needs besides its media path.
struct WorkerContext {
    id: WorkerId,
    renderer: Arc<Renderer>,
    start: Listener,
    kill: Listener,
    buffer_capacity: usize,
}

impl WorkerContext {
    /// Block until start or kill, whichever comes first. True if started.
    fn wait_for_start(&self) -> bool {
        select! {
            recv(self.start.receiver()) -> _ => !self.kill.is_fired(),
            recv(self.kill.receiver()) -> _ => false,
        }
    }

    /// Best-effort blank on the way out.
    fn blank(&self) {
        if let Err(e) = self.renderer.reset() {
            log::warn!("{}: failed to blank wall: {e}", self.id);
        }
    }
}

/// Handle to one in-flight worker. Dropping it kills and joins the worker.
pub struct WorkerHandle {
    id: WorkerId,
    index: usize,
    media: PathBuf,
    kind: MediaKind,
    start: Trigger,
    kill: Trigger,
    thread: Option<JoinHandle<Result<(), WorkerError>>>,
    started_at: Option<Instant>,
}

impl WorkerHandle {
    /// Spawn a warming worker for playlist entry `index`.
    ///
    /// The media kind is resolved here, so unsupported entries fail before any
    /// thread exists.
    pub fn spawn(
        index: usize,
        media: &Path,
        renderer: Arc<Renderer>,
        buffer_capacity: usize,
    ) -> Result<Self, WorkerError> {
        let kind = MediaKind::from_path(media)?;
        let id = WorkerId(NEXT_WORKER_ID.fetch_add(1, Ordering::Relaxed));
        let (start, start_listener) = signal();
        let (kill, kill_listener) = signal();

        let ctx = WorkerContext {
            id,
            renderer,
            start: start_listener,
            kill: kill_listener,
            buffer_capacity,
        };
        let path = media.to_path_buf();

        let thread = thread::Builder::new()
            .name(format!("pixelwall-{id}"))
            .spawn(move || {
                let result = match kind {
                    MediaKind::Static => run_static(&path, &ctx),
                    MediaKind::Animated => run_streamed::<GifSource>(&path, &ctx, None),
                    MediaKind::Video => {
                        let interval = match video::probe_video(&path) {
                            Ok(meta) => {
                                log::debug!(
                                    "{id}: source {}x{} at {:.2} fps",
                                    meta.width,
                                    meta.height,
                                    meta.fps
                                );
                                meta.frame_interval()
                            }
                            Err(e) => {
                                log::warn!(
                                    "{id}: probe failed for {}: {e}; assuming {} fps",
                                    path.display(),
                                    video::FALLBACK_FPS
                                );
                                video::frame_interval(video::FALLBACK_FPS)
                            }
                        };
                        run_streamed::<VideoSource>(&path, &ctx, Some(interval))
                    }
                };
                match &result {
                    Ok(()) => log::debug!("{id}: finished"),
                    Err(e) => log::error!("{id}: {} failed: {e}", path.display()),
                }
                result
            })?;

        log::debug!(
            "{id}: warming {} #{index} {}",
            kind.display_name(),
            media.display()
        );

        Ok(Self {
            id,
            index,
            media: media.to_path_buf(),
            kind,
            start,
            kill,
            thread: Some(thread),
            started_at: None,
        })
    }

    /// Let the worker render from its warmed buffer.
    pub fn start(&mut self) {
        if self.started_at.is_none() {
            self.start.fire();
            self.started_at = Some(Instant::now());
            log::info!("{}: showing #{} {}", self.id, self.index, self.media.display());
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn media(&self) -> &Path {
        &self.media
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    /// False once the worker thread has returned (killed or failed).
    pub fn is_alive(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Signal the worker to stop and wait for it (and its producer) to exit.
    /// Returns how the worker ended.
    pub fn kill(mut self) -> Result<(), WorkerError> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<(), WorkerError> {
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };
        self.kill.fire();
        let result = thread.join().unwrap_or(Err(WorkerError::Panicked));
        log::debug!("{}: joined", self.id);
        result
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::debug!("{}: ended with error: {e}", self.id);
        }
    }
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("id", &self.id)
            .field("index", &self.index)
            .field("media", &self.media)
            .field("started", &self.started_at.is_some())
            .finish_non_exhaustive()
    }
}

fn run_static(path: &Path, ctx: &WorkerContext) -> Result<(), WorkerError> {
    let frame = decoder::load_static_image(path)?;

    if !ctx.wait_for_start() {
        return Ok(());
    }

    loop {
        if let Err(e) = ctx.renderer.display_frame(&frame) {
            ctx.blank();
            return Err(e.into());
        }
        if ctx.kill.wait_timeout(STATIC_REFRESH) {
            break;
        }
    }

    ctx.blank();
    Ok(())
}

/// Animated and video playback: a looping decode producer feeding a paced
/// consumer. `interval` is the cadence for frames without their own duration.
fn run_streamed<S: FrameSource>(
    path: &Path,
    ctx: &WorkerContext,
    interval: Option<Duration>,
) -> Result<(), WorkerError> {
    let buffer = FrameBuffer::new(ctx.buffer_capacity);
    let (stop, stop_listener) = signal();

    thread::scope(|s| {
        // Moved in so an unwinding consumer drops (and so fires) it.
        let mut stop = stop;
        let producer = thread::Builder::new()
            .name(format!("pixelwall-{}-decode", ctx.id))
            .spawn_scoped(s, || produce::<S>(path, &buffer, &stop_listener))?;

        let result = if ctx.wait_for_start() {
            consume(&buffer, ctx, interval.unwrap_or(decoder::MIN_GIF_DELAY))
        } else {
            Ok(())
        };

        stop.fire();
        if producer.join().is_err() {
            log::error!("{}: decode thread panicked", ctx.id);
        }
        result
    })
}

/// Loop the source forever into `buffer` until `stop` fires. End of stream
/// and decode errors both restart the source from the beginning.
fn produce<S: FrameSource>(path: &Path, buffer: &FrameBuffer, stop: &Listener) {
    let mut passes = 0u64;
    while !stop.is_fired() {
        let mut source = match S::open(path) {
            Ok(source) => source,
            Err(e) => {
                log::warn!("failed to open {}: {e}", path.display());
                if stop.wait_timeout(REOPEN_BACKOFF) {
                    break;
                }
                continue;
            }
        };

        let mut yielded = 0usize;
        loop {
            match source.next_frame() {
                Ok(Some(frame)) => {
                    yielded += 1;
                    if !push_until_stopped(buffer, frame, stop) {
                        return;
                    }
                }
                // Wrap to the first frame
                Ok(None) => break,
                Err(e) => {
                    log::warn!("decode error in {}, restarting: {e}", path.display());
                    break;
                }
            }
            if stop.is_fired() {
                return;
            }
        }

        passes += 1;
        log::trace!("{}: pass {passes} done, {yielded} frames", path.display());
        if yielded == 0 && stop.wait_timeout(REOPEN_BACKOFF) {
            break;
        }
    }
}

/// Insert `frame`, withholding it while the buffer is full. False if `stop`
/// fired before there was room.
fn push_until_stopped(buffer: &FrameBuffer, mut frame: Frame, stop: &Listener) -> bool {
    loop {
        match buffer.push_timeout(frame, SIGNAL_POLL) {
            Ok(()) => return true,
            Err(returned) => {
                if stop.is_fired() {
                    return false;
                }
                frame = returned;
            }
        }
    }
}

/// Catch-up-by-skipping clock.
///
/// `scheduled` is the summed display time of every frame taken so far. A frame
/// is due while `scheduled <= elapsed`; frames whose window already passed are
/// taken but not rendered. With a constant interval this is the same as
/// showing frame `elapsed / interval`.
#[derive(Debug, Clone)]
pub struct CatchUpPacer {
    scheduled: Duration,
    default_interval: Duration,
    taken: u64,
}

impl CatchUpPacer {
    pub fn new(default_interval: Duration) -> Self {
        Self {
            scheduled: Duration::ZERO,
            default_interval,
            taken: 0,
        }
    }

    pub fn is_due(&self, elapsed: Duration) -> bool {
        self.scheduled <= elapsed
    }

    pub fn advance(&mut self, frame: &Frame) {
        self.scheduled += frame.duration.unwrap_or(self.default_interval);
        self.taken += 1;
    }

    /// Time left until the next frame is due.
    pub fn until_next(&self, elapsed: Duration) -> Duration {
        self.scheduled.saturating_sub(elapsed)
    }

    pub fn frames_taken(&self) -> u64 {
        self.taken
    }
}

fn consume(
    buffer: &FrameBuffer,
    ctx: &WorkerContext,
    interval: Duration,
) -> Result<(), WorkerError> {
    let origin = Instant::now();
    let mut pacer = CatchUpPacer::new(interval);
    let mut skipped = 0u64;

    loop {
        let mut due: Option<Frame> = None;
        while pacer.is_due(origin.elapsed()) {
            // Once a frame is in hand, don't wait on a dry buffer for a later
            // one: show what we have.
            let next = if due.is_some() {
                buffer.try_pop()
            } else {
                buffer.pop_timeout(SIGNAL_POLL)
            };
            match next {
                Some(frame) => {
                    pacer.advance(&frame);
                    if due.replace(frame).is_some() {
                        skipped += 1;
                    }
                }
                None if due.is_some() => break,
                None => {
                    if ctx.kill.is_fired() {
                        ctx.blank();
                        return Ok(());
                    }
                }
            }
        }

        if let Some(frame) = due {
            if let Err(e) = ctx.renderer.display_frame(&frame) {
                ctx.blank();
                return Err(e.into());
            }
        }

        if ctx.kill.wait_timeout(pacer.until_next(origin.elapsed())) {
            break;
        }
    }

    if skipped > 0 {
        log::debug!(
            "{}: skipped {skipped} of {} frames to keep up",
            ctx.id,
            pacer.frames_taken()
        );
    }
    ctx.blank();
    Ok(())
}
