mod control;
mod engine;
mod error;
mod media;
mod render;
mod settings;
mod signal;

use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};

use control::Flow;
use engine::Engine;
use render::Renderer;
use render::sink::{LedSink, MemorySink, TerminalSink};
use settings::SettingsConfig;

#[derive(Debug, Default, PartialEq)]
struct Args {
    config: Option<PathBuf>,
    preview: bool,
    off: bool,
    duration: Option<f64>,
    media: Vec<String>,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Args> {
    let mut parsed = Args::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let path = args.next().context("--config needs a path")?;
                parsed.config = Some(PathBuf::from(path));
            }
            "--preview" => parsed.preview = true,
            "--off" => parsed.off = true,
            "--duration" => {
                let secs = args.next().context("--duration needs a value")?;
                parsed.duration = Some(
                    secs.parse::<f64>()
                        .with_context(|| format!("invalid --duration '{secs}'"))?,
                );
            }
            flag if flag.starts_with("--") => bail!("unknown flag {flag}"),
            _ => parsed.media.push(arg),
        }
    }
    Ok(parsed)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = parse_args(std::env::args().skip(1))?;

    let mut settings = match &args.config {
        Some(path) => SettingsConfig::load_from(path),
        None => SettingsConfig::load(),
    };
    if args.preview {
        settings.preview = true;
    }
    if args.off {
        settings.on = false;
    }
    if let Some(secs) = args.duration {
        settings.rotation_secs = secs;
    }
    if !args.media.is_empty() {
        settings.playlist = args.media.clone();
    }

    let sink: Box<dyn LedSink> = if settings.preview {
        // Clear the terminal once; the sink redraws from the home position
        print!("\x1b[2J");
        Box::new(TerminalSink::stdout())
    } else {
        Box::new(MemorySink::new())
    };
    let renderer = Arc::new(Renderer::new(sink));
    let engine = Engine::start(renderer, settings.engine_options())?;

    let rejected = engine.set_playlist(settings.resolved_playlist())?;
    if !rejected.is_empty() {
        log::warn!("{} playlist item(s) could not be used", rejected.len());
    }

    let (tx, rx) = crossbeam_channel::unbounded();
    let _console = control::spawn_console(BufReader::new(std::io::stdin()), tx)?;
    println!("pixelwall ready; type 'help' for commands");

    while let Ok(line) = rx.recv() {
        match line {
            Ok(cmd) => match control::execute(cmd, &engine, &mut settings)? {
                Flow::Continue(reply) => println!("{reply}"),
                Flow::Quit => break,
            },
            Err(e) => eprintln!("{e}"),
        }
    }

    // Persist the live state
    settings.record_status(&engine.status()?);
    match &args.config {
        Some(path) => settings.save_to(path),
        None => settings.save(),
    }

    engine.shutdown();
    Ok(())
}
