//! Rotation state machine. Owned by the engine thread, so every transition
//! (control calls and the periodic tick) runs one at a time.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{EngineState, EngineStatus, ItemStatus};
use crate::media::decoder::MediaKind;
use crate::media::worker::WorkerHandle;
use crate::render::Renderer;

/// Pause before rebuilding workers after both died on their own.
pub const FAILURE_BACKOFF: Duration = Duration::from_secs(1);

/// Initial engine settings.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub rotation_secs: f64,
    pub brightness: f64,
    pub on: bool,
    pub buffer_capacity: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            rotation_secs: 10.0,
            brightness: 0.5,
            on: true,
            buffer_capacity: crate::media::buffer::DEFAULT_CAPACITY,
        }
    }
}

pub struct Scheduler {
    renderer: Arc<Renderer>,
    playlist: Vec<PathBuf>,
    current: Option<WorkerHandle>,
    next: Option<WorkerHandle>,
    rotation_ms: f64,
    on: bool,
    brightness: f64,
    /// Index of the item most recently made current.
    position: usize,
    /// Where to pick up when turned back on.
    resume_index: usize,
    retry_after: Option<Instant>,
    buffer_capacity: usize,
}

/// Clamp anything that isn't a finite non-negative number to zero.
fn non_negative(v: f64) -> f64 {
    if v.is_finite() && v > 0.0 { v } else { 0.0 }
}

/// A playlist entry is playable if it exists and has a supported kind.
fn is_playable(path: &Path) -> bool {
    path.is_file() && MediaKind::from_path(path).is_ok()
}

impl Scheduler {
    pub fn new(renderer: Arc<Renderer>, options: EngineOptions) -> Self {
        let mut scheduler = Self {
            renderer,
            playlist: Vec::new(),
            current: None,
            next: None,
            rotation_ms: non_negative(options.rotation_secs) * 1000.0,
            on: options.on,
            brightness: 0.0,
            position: 0,
            resume_index: 0,
            retry_after: None,
            buffer_capacity: options.buffer_capacity,
        };
        scheduler.set_brightness(options.brightness);
        scheduler
    }

    pub fn turn_on(&mut self) {
        if !self.on {
            log::info!("Display on");
        }
        self.on = true;
    }

    /// Stop both workers and blank the wall before returning.
    pub fn turn_off(&mut self) {
        if self.on {
            log::info!("Display off");
        }
        self.on = false;
        if self.current.is_some() {
            self.resume_index = self.position;
        }
        self.kill_workers();
        self.blank();
    }

    /// Replace the playlist. Returns the entries that were rejected (missing
    /// or unsupported), in input order.
    pub fn set_playlist(&mut self, refs: Vec<PathBuf>) -> Vec<PathBuf> {
        let (accepted, rejected): (Vec<PathBuf>, Vec<PathBuf>) =
            refs.into_iter().partition(|p| is_playable(p));

        for path in &rejected {
            log::warn!("Rejected playlist entry: {}", path.display());
        }
        log::info!("Playlist set: {} item(s)", accepted.len());

        self.kill_workers();
        self.playlist = accepted;
        self.position = 0;
        self.resume_index = 0;
        self.retry_after = None;

        if self.on && !self.playlist.is_empty() {
            self.initialize(0);
        }
        rejected
    }

    pub fn playlist(&self) -> Vec<PathBuf> {
        self.playlist.clone()
    }

    pub fn set_rotation_duration(&mut self, secs: f64) {
        self.rotation_ms = non_negative(secs) * 1000.0;
        log::info!("Rotation duration: {:.2}s", self.rotation_ms / 1000.0);
    }

    pub fn rotation_duration(&self) -> f64 {
        self.rotation_ms / 1000.0
    }

    pub fn set_brightness(&mut self, value: f64) {
        self.brightness = if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) };
        if let Err(e) = self.renderer.set_brightness(self.brightness) {
            log::error!("Failed to apply brightness: {e}");
        }
    }

    pub fn brightness(&self) -> f64 {
        self.brightness
    }

    pub fn brightness_percent(&self) -> u8 {
        (self.brightness * 100.0).round() as u8
    }

    pub fn state(&self) -> EngineState {
        if !self.on {
            EngineState::Off
        } else if self.playlist.is_empty() {
            EngineState::Idle
        } else {
            EngineState::Active
        }
    }

    pub fn status(&self) -> EngineStatus {
        let item = |w: &WorkerHandle| ItemStatus {
            index: w.index(),
            media: w.media().to_path_buf(),
            kind: w.kind(),
            shown_for: w.started_at().map(|t| t.elapsed()),
        };
        EngineStatus {
            state: self.state(),
            current: self.current.as_ref().map(item),
            next: self.next.as_ref().map(item),
            playlist_len: self.playlist.len(),
            live_workers: self.live_workers(),
            rotation_secs: self.rotation_duration(),
            brightness: self.brightness(),
            brightness_percent: self.brightness_percent(),
        }
    }

    /// Live worker threads (current and next).
    pub fn live_workers(&self) -> usize {
        [&self.current, &self.next]
            .into_iter()
            .flatten()
            .filter(|w| w.is_alive())
            .count()
    }

    /// One pass of the control loop.
    pub fn tick(&mut self, now: Instant) {
        if !self.on {
            if self.current.is_some() || self.next.is_some() {
                self.kill_workers();
            }
            return;
        }
        if self.playlist.is_empty() {
            return;
        }
        if self.retry_after.is_some_and(|t| now < t) {
            return;
        }

        let current_alive = self.current.as_ref().is_some_and(|w| w.is_alive());
        let next_alive = self.next.as_ref().is_some_and(|w| w.is_alive());

        if !current_alive && !next_alive {
            let len = self.playlist.len();
            if let Some(dead) = &self.current {
                // Both died on their own: rebuild past the failed item once
                // the backoff has passed
                log::warn!("Workers stopped unexpectedly; restarting after #{}", dead.index());
                self.resume_index = (dead.index() + 1) % len;
                self.retry_after = Some(now + FAILURE_BACKOFF);
                self.kill_workers();
                return;
            }
            self.kill_workers();
            self.initialize(self.resume_index.min(len - 1));
            return;
        }

        let due = match &self.current {
            Some(w) if current_alive => w.started_at().is_none_or(|started| {
                now.saturating_duration_since(started).as_secs_f64() * 1000.0 > self.rotation_ms
            }),
            Some(w) => {
                log::warn!("#{} {} stopped early; skipping ahead", w.index(), w.media().display());
                true
            }
            None => true,
        };
        if due {
            self.rotate();
        }
    }

    /// Kill the current worker, promote the warmed next one, and start
    /// warming the item after it.
    fn rotate(&mut self) {
        let len = self.playlist.len();

        if let Some(old) = self.current.take() {
            let index = old.index();
            if let Err(e) = old.kill() {
                log::debug!("#{index} ended with error: {e}");
            }
        }

        let promoted = match self.next.take() {
            Some(next) if next.is_alive() => Some(next),
            Some(dead) => {
                let from = (dead.index() + 1) % len;
                log::warn!("#{} failed while warming; skipping", dead.index());
                drop(dead);
                self.spawn_first_viable(from)
            }
            None => self.spawn_first_viable((self.position + 1) % len),
        };

        let Some(mut promoted) = promoted else {
            log::warn!("No playable item to rotate to");
            return;
        };

        promoted.start();
        self.position = promoted.index();
        self.next = self.spawn_first_viable((promoted.index() + 1) % len);
        self.current = Some(promoted);
    }

    /// Start `from` (or the first buildable item after it) immediately and
    /// warm the one after.
    fn initialize(&mut self, from: usize) {
        let len = self.playlist.len();
        let Some(mut current) = self.spawn_first_viable(from) else {
            log::warn!("No playable item in playlist");
            return;
        };
        current.start();
        self.position = current.index();
        self.retry_after = None;
        self.next = self.spawn_first_viable((current.index() + 1) % len);
        self.current = Some(current);
    }

    /// Build a warming worker for `from`, walking forward past entries that
    /// cannot be built. Gives up after one full lap.
    fn spawn_first_viable(&self, from: usize) -> Option<WorkerHandle> {
        let len = self.playlist.len();
        for offset in 0..len {
            let index = (from + offset) % len;
            let path = &self.playlist[index];
            match WorkerHandle::spawn(index, path, self.renderer.clone(), self.buffer_capacity) {
                Ok(worker) => return Some(worker),
                Err(e) => log::warn!("Skipping #{index} {}: {e}", path.display()),
            }
        }
        None
    }

    fn kill_workers(&mut self) {
        for worker in [self.current.take(), self.next.take()].into_iter().flatten() {
            let index = worker.index();
            if let Err(e) = worker.kill() {
                log::debug!("#{index} ended with error: {e}");
            }
        }
    }

    fn blank(&self) {
        if let Err(e) = self.renderer.reset() {
            log::error!("Failed to blank wall: {e}");
        }
    }

    /// Stop everything and leave the wall dark.
    pub fn shutdown(&mut self) {
        self.kill_workers();
        self.blank();
    }
}
