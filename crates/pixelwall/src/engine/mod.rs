//! Engine handle. All playlist and worker state lives on a single engine
//! thread; the handle talks to it over a command channel.

pub mod scheduler;

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::error::EngineError;
use crate::media::decoder::MediaKind;
use crate::render::Renderer;
pub use scheduler::EngineOptions;
use scheduler::Scheduler;

/// Control loop period.
pub const TICK_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Off,
    Idle,
    Active,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            EngineState::Off => "off",
            EngineState::Idle => "idle",
            EngineState::Active => "active",
        })
    }
}

/// A worker slot as reported by [`Engine::status`].
#[derive(Debug, Clone)]
pub struct ItemStatus {
    pub index: usize,
    pub media: PathBuf,
    pub kind: MediaKind,
    /// `None` while the item is still warming up.
    pub shown_for: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct EngineStatus {
    pub state: EngineState,
    pub current: Option<ItemStatus>,
    pub next: Option<ItemStatus>,
    pub playlist_len: usize,
    pub live_workers: usize,
    pub rotation_secs: f64,
    /// Stored brightness, 0.0..=1.0.
    pub brightness: f64,
    pub brightness_percent: u8,
}

enum Command {
    TurnOn,
    TurnOff(Sender<()>),
    SetPlaylist(Vec<PathBuf>, Sender<Vec<PathBuf>>),
    GetPlaylist(Sender<Vec<PathBuf>>),
    SetRotationDuration(f64),
    GetRotationDuration(Sender<f64>),
    SetBrightness(f64),
    GetBrightness(Sender<u8>),
    Status(Sender<EngineStatus>),
    Shutdown,
}

/// Owning handle to the engine thread. Dropping it shuts the engine down.
pub struct Engine {
    commands: Sender<Command>,
    thread: Option<JoinHandle<()>>,
}

impl Engine {
    /// Spawn the engine thread. Nothing plays until a playlist is set.
    pub fn start(renderer: Arc<Renderer>, options: EngineOptions) -> Result<Self, EngineError> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let thread = thread::Builder::new()
            .name("pixelwall-engine".into())
            .spawn(move || {
                let scheduler = Scheduler::new(renderer, options);
                run(scheduler, &rx);
            })
            .map_err(EngineError::Spawn)?;

        log::info!("Engine started");
        Ok(Self {
            commands: tx,
            thread: Some(thread),
        })
    }

    fn request<T>(&self, build: impl FnOnce(Sender<T>) -> Command) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        self.commands.send(build(reply_tx))?;
        Ok(reply_rx.recv()?)
    }

    pub fn turn_on(&self) -> Result<(), EngineError> {
        Ok(self.commands.send(Command::TurnOn)?)
    }

    /// Returns once both workers are gone and the wall is dark.
    pub fn turn_off(&self) -> Result<(), EngineError> {
        self.request(Command::TurnOff)
    }

    /// Returns the rejected entries (missing or unsupported), in input order.
    pub fn set_playlist(&self, refs: Vec<PathBuf>) -> Result<Vec<PathBuf>, EngineError> {
        self.request(|reply| Command::SetPlaylist(refs, reply))
    }

    pub fn get_playlist(&self) -> Result<Vec<PathBuf>, EngineError> {
        self.request(Command::GetPlaylist)
    }

    /// Seconds; negative values are treated as zero.
    pub fn set_rotation_duration(&self, secs: f64) -> Result<(), EngineError> {
        Ok(self.commands.send(Command::SetRotationDuration(secs))?)
    }

    pub fn get_rotation_duration(&self) -> Result<f64, EngineError> {
        self.request(Command::GetRotationDuration)
    }

    /// Clamped to 0.0..=1.0.
    pub fn set_brightness(&self, value: f64) -> Result<(), EngineError> {
        Ok(self.commands.send(Command::SetBrightness(value))?)
    }

    /// Brightness as a whole percentage.
    pub fn get_brightness(&self) -> Result<u8, EngineError> {
        self.request(Command::GetBrightness)
    }

    pub fn status(&self) -> Result<EngineStatus, EngineError> {
        self.request(Command::Status)
    }

    /// Stop the engine thread, killing workers and blanking the wall.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("Engine thread panicked");
            }
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(mut scheduler: Scheduler, commands: &Receiver<Command>) {
    loop {
        match commands.recv_timeout(TICK_INTERVAL) {
            Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Ok(cmd) => apply(&mut scheduler, cmd),
            Err(RecvTimeoutError::Timeout) => {}
        }
        scheduler.tick(Instant::now());
    }
    scheduler.shutdown();
    log::info!("Engine stopped");
}

fn apply(scheduler: &mut Scheduler, cmd: Command) {
    // Reply failures mean the caller went away; nothing to do
    match cmd {
        Command::TurnOn => scheduler.turn_on(),
        Command::TurnOff(reply) => {
            scheduler.turn_off();
            let _ = reply.send(());
        }
        Command::SetPlaylist(refs, reply) => {
            let _ = reply.send(scheduler.set_playlist(refs));
        }
        Command::GetPlaylist(reply) => {
            let _ = reply.send(scheduler.playlist());
        }
        Command::SetRotationDuration(secs) => scheduler.set_rotation_duration(secs),
        Command::GetRotationDuration(reply) => {
            let _ = reply.send(scheduler.rotation_duration());
        }
        Command::SetBrightness(value) => scheduler.set_brightness(value),
        Command::GetBrightness(reply) => {
            let _ = reply.send(scheduler.brightness_percent());
        }
        Command::Status(reply) => {
            let _ = reply.send(scheduler.status());
        }
        Command::Shutdown => {}
    }
}
