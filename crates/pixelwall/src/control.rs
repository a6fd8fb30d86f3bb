//! Line-oriented control console. A reader thread parses stdin into
//! [`ControlCommand`]s and forwards them over a channel; the main thread
//! applies them to the engine.

use std::fmt::Write as _;
use std::io::BufRead;
use std::path::PathBuf;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Sender;

use crate::engine::{Engine, EngineStatus, ItemStatus};
use crate::error::EngineError;
use crate::media::decoder::{MediaKind, natural_length};
use crate::settings::SettingsConfig;

pub const HELP: &str = "\
commands:
  on                    turn the wall on
  off                   turn the wall off (blanks it)
  brightness <0..1>     set global brightness
  duration <secs>       set rotation duration
  play <file>...        replace the playlist
  playlist              list the playlist
  status                show what is playing
  info <file>           show media kind and length
  help                  this text
  quit                  exit";

#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    On,
    Off,
    Brightness(f64),
    Duration(f64),
    Play(Vec<String>),
    Playlist,
    Status,
    Info(String),
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("unknown command '{0}' (try 'help')")]
    Unknown(String),
    #[error("'{0}' needs an argument")]
    MissingArgument(&'static str),
    #[error("'{0}' is not a number")]
    NotANumber(String),
}

fn number(arg: Option<&str>, command: &'static str) -> Result<f64, ParseError> {
    let arg = arg.ok_or(ParseError::MissingArgument(command))?;
    arg.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ParseError::NotANumber(arg.to_string()))
}

/// Parse one console line. Blank lines yield `Ok(None)`.
pub fn parse_line(line: &str) -> Result<Option<ControlCommand>, ParseError> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Ok(None);
    };

    let cmd = match head.to_ascii_lowercase().as_str() {
        "on" => ControlCommand::On,
        "off" => ControlCommand::Off,
        "brightness" => ControlCommand::Brightness(number(words.next(), "brightness")?),
        "duration" => ControlCommand::Duration(number(words.next(), "duration")?),
        "play" => {
            let refs: Vec<String> = words.map(str::to_string).collect();
            if refs.is_empty() {
                return Err(ParseError::MissingArgument("play"));
            }
            ControlCommand::Play(refs)
        }
        "playlist" => ControlCommand::Playlist,
        "status" => ControlCommand::Status,
        "info" => ControlCommand::Info(
            words
                .next()
                .ok_or(ParseError::MissingArgument("info"))?
                .to_string(),
        ),
        "help" | "?" => ControlCommand::Help,
        "quit" | "exit" => ControlCommand::Quit,
        other => return Err(ParseError::Unknown(other.to_string())),
    };
    Ok(Some(cmd))
}

/// Spawn the console reader. The thread ends at EOF, after forwarding
/// `Quit`, or once the receiver is gone.
pub fn spawn_console<R: BufRead + Send + 'static>(
    input: R,
    tx: Sender<Result<ControlCommand, ParseError>>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("pixelwall-console".into())
        .spawn(move || {
            for line in input.lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        log::error!("Console read error: {e}");
                        break;
                    }
                };
                match parse_line(&line) {
                    Ok(None) => {}
                    Ok(Some(cmd)) => {
                        let quit = cmd == ControlCommand::Quit;
                        if tx.send(Ok(cmd)).is_err() || quit {
                            break;
                        }
                    }
                    Err(e) => {
                        if tx.send(Err(e)).is_err() {
                            break;
                        }
                    }
                }
            }
            let _ = tx.send(Ok(ControlCommand::Quit));
            log::debug!("Console reader shutting down");
        })
}

/// What the caller should do after a command.
#[derive(Debug, PartialEq)]
pub enum Flow {
    Continue(String),
    Quit,
}

fn describe(item: &ItemStatus) -> String {
    let mut line = format!("#{} {} ({})", item.index, item.media.display(), item.kind.display_name());
    if let Some(shown) = item.shown_for {
        let _ = write!(line, ", showing for {:.1}s", shown.as_secs_f64());
    }
    line
}

pub fn format_status(status: &EngineStatus) -> String {
    let mut out = format!(
        "state: {}\nplaylist: {} item(s)\nworkers: {}\nrotation: {:.2}s\nbrightness: {}%",
        status.state,
        status.playlist_len,
        status.live_workers,
        status.rotation_secs,
        status.brightness_percent
    );
    if let Some(current) = &status.current {
        let _ = write!(out, "\ncurrent: {}", describe(current));
    }
    if let Some(next) = &status.next {
        let _ = write!(out, "\nnext: {}", describe(next));
    }
    out
}

fn info(path: &std::path::Path) -> String {
    let kind = match MediaKind::from_path(path) {
        Ok(kind) => kind,
        Err(e) => return e.to_string(),
    };
    match natural_length(path) {
        Ok(Some(len)) => format!("{}: {}, {:.2}s", path.display(), kind.display_name(), len.as_secs_f64()),
        Ok(None) => format!("{}: {}", path.display(), kind.display_name()),
        Err(e) => format!("{}: {e}", path.display()),
    }
}

/// Apply a command to the engine. Accepted playlists are written back into
/// `settings` so they persist.
pub fn execute(
    cmd: ControlCommand,
    engine: &Engine,
    settings: &mut SettingsConfig,
) -> Result<Flow, EngineError> {
    let reply = match cmd {
        ControlCommand::On => {
            engine.turn_on()?;
            "on".to_string()
        }
        ControlCommand::Off => {
            engine.turn_off()?;
            "off".to_string()
        }
        ControlCommand::Brightness(v) => {
            engine.set_brightness(v)?;
            format!("brightness {}%", engine.get_brightness()?)
        }
        ControlCommand::Duration(secs) => {
            engine.set_rotation_duration(secs)?;
            format!("rotation {:.2}s", engine.get_rotation_duration()?)
        }
        ControlCommand::Play(refs) => {
            let resolved: Vec<PathBuf> = refs.iter().map(|r| settings.resolve(r)).collect();
            let rejected = engine.set_playlist(resolved.clone())?;
            settings.playlist = refs
                .into_iter()
                .zip(&resolved)
                .filter(|(_, path)| !rejected.contains(path))
                .map(|(entry, _)| entry)
                .collect();
            let mut reply = format!("playing {} item(s)", settings.playlist.len());
            for path in &rejected {
                let _ = write!(reply, "\nrejected: {}", path.display());
            }
            reply
        }
        ControlCommand::Playlist => {
            let playlist = engine.get_playlist()?;
            if playlist.is_empty() {
                "playlist is empty".to_string()
            } else {
                playlist
                    .iter()
                    .enumerate()
                    .map(|(i, p)| format!("{i:>3}  {}", p.display()))
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        }
        ControlCommand::Status => format_status(&engine.status()?),
        ControlCommand::Info(entry) => info(&settings.resolve(&entry)),
        ControlCommand::Help => HELP.to_string(),
        ControlCommand::Quit => return Ok(Flow::Quit),
    };
    Ok(Flow::Continue(reply))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineOptions;
    use crate::media::decoder::tests::{write_gif, write_png};
    use crate::render::Renderer;
    use crate::render::sink::MemorySink;
    use std::io::Cursor;
    use std::sync::Arc;

    #[test]
    fn parses_commands() {
        assert_eq!(parse_line("on"), Ok(Some(ControlCommand::On)));
        assert_eq!(parse_line("  OFF "), Ok(Some(ControlCommand::Off)));
        assert_eq!(parse_line("brightness 0.25"), Ok(Some(ControlCommand::Brightness(0.25))));
        assert_eq!(parse_line("duration 3"), Ok(Some(ControlCommand::Duration(3.0))));
        assert_eq!(
            parse_line("play a.png b.gif"),
            Ok(Some(ControlCommand::Play(vec!["a.png".into(), "b.gif".into()])))
        );
        assert_eq!(parse_line("info a.gif"), Ok(Some(ControlCommand::Info("a.gif".into()))));
        assert_eq!(parse_line(""), Ok(None));
        assert_eq!(parse_line("exit"), Ok(Some(ControlCommand::Quit)));
    }

    #[test]
    fn parse_errors() {
        assert_eq!(parse_line("dance"), Err(ParseError::Unknown("dance".into())));
        assert_eq!(parse_line("brightness"), Err(ParseError::MissingArgument("brightness")));
        assert_eq!(parse_line("duration soon"), Err(ParseError::NotANumber("soon".into())));
        assert_eq!(parse_line("brightness NaN"), Err(ParseError::NotANumber("NaN".into())));
        assert_eq!(parse_line("play"), Err(ParseError::MissingArgument("play")));
    }

    #[test]
    fn console_forwards_lines_then_quits_at_eof() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let input = Cursor::new("status\nbogus\n\nduration 2\n");
        spawn_console(input, tx).unwrap().join().unwrap();

        let got: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            got,
            vec![
                Ok(ControlCommand::Status),
                Err(ParseError::Unknown("bogus".into())),
                Ok(ControlCommand::Duration(2.0)),
                Ok(ControlCommand::Quit),
            ]
        );
    }

    #[test]
    fn execute_play_keeps_accepted_entries() {
        let dir = tempfile::tempdir().unwrap();
        write_png(&dir.path().join("a.png"), [9, 9, 9]);
        let renderer = Arc::new(Renderer::new(Box::new(MemorySink::new())));
        let engine = Engine::start(renderer, EngineOptions { on: false, ..EngineOptions::default() }).unwrap();
        let mut settings = SettingsConfig {
            media_dir: Some(dir.path().to_string_lossy().into_owned()),
            ..SettingsConfig::default()
        };

        let flow = execute(
            ControlCommand::Play(vec!["a.png".into(), "gone.png".into()]),
            &engine,
            &mut settings,
        )
        .unwrap();
        let Flow::Continue(reply) = flow else { panic!("unexpected quit") };
        assert!(reply.contains("playing 1 item(s)"));
        assert!(reply.contains("gone.png"));
        assert_eq!(settings.playlist, vec!["a.png".to_string()]);
        assert_eq!(engine.get_playlist().unwrap(), vec![dir.path().join("a.png")]);

        let Flow::Continue(status) = execute(ControlCommand::Status, &engine, &mut settings).unwrap()
        else {
            panic!("unexpected quit")
        };
        assert!(status.contains("state: off"));
        assert_eq!(execute(ControlCommand::Quit, &engine, &mut settings).unwrap(), Flow::Quit);
    }

    #[test]
    fn info_reports_animation_length() {
        let dir = tempfile::tempdir().unwrap();
        let gif = dir.path().join("blink.gif");
        write_gif(&gif, &[[255, 0, 0], [0, 0, 255]], 10);
        let text = info(&gif);
        assert!(text.contains("0.20s"), "{text}");
        assert!(info(&dir.path().join("x.txt")).contains("unsupported"));
    }
}
