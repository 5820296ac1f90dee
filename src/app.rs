//! Terminal frontend for Clipper
//!
//! A current-thread tokio loop owns the [`EditorSession`]. It reads one
//! command per stdin line and ticks the playback cursor on a fixed interval,
//! redrawing a one-line text waveform in place while audio plays.

use crate::cli::Args;
use crate::presentation::{format_time, render_text, PointerInput, WaveformView};
use crate::audio::{SaveFormat, TickOutcome};
use crate::settings::Config;
use crate::state::EditorSession;
use anyhow::Context;
use log::{debug, info};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::MissedTickBehavior;

/// Pointer commands address columns; hit-testing works in pixels of this cell width
const COLUMN_PX: f64 = 8.0;

const HELP: &str = "\
Commands:
  record                 start recording from the microphone
  stop-rec               stop recording and open the take
  load <path>            open an audio file
  play | pause | toggle  control playback
  stop                   stop playback and rewind
  seek <s>               move the cursor (not while playing)
  start <s> | end <s>    place the selection markers
  click <col>            press on the waveform column
  drag <col>             drag whatever was pressed
  release                end a drag
  remove                 delete the selected region
  trim                   keep only the selected region
  clear                  clear the markers
  gain <db>              set gain (-20 to 20 dB)
  apply                  apply the gain to the clip
  save <path> [wav|mp3]  save the clip
  status                 show the clip and status
  help                   show this help
  quit                   exit";

/// A parsed terminal command
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Record,
    StopRecording,
    Load(PathBuf),
    Play,
    Pause,
    Toggle,
    Stop,
    Seek(f64),
    Start(f64),
    End(f64),
    Click(f64),
    Drag(f64),
    Release,
    Remove,
    Trim,
    Clear,
    Gain(f64),
    Apply,
    Save(PathBuf, Option<String>),
    Status,
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq)]
pub enum CommandError {
    #[error("Unknown command '{0}' (try 'help')")]
    Unknown(String),
    #[error("'{0}' needs an argument")]
    MissingArgument(&'static str),
    #[error("'{0}' is not a number")]
    InvalidNumber(String),
}

impl Command {
    /// Parse one input line; `Ok(None)` for a blank line
    pub fn parse(line: &str) -> Result<Option<Self>, CommandError> {
        let mut words = line.split_whitespace();
        let Some(word) = words.next() else {
            return Ok(None);
        };
        let mut number = |name: &'static str| -> Result<f64, CommandError> {
            let raw = words.next().ok_or(CommandError::MissingArgument(name))?;
            raw.parse::<f64>()
                .map_err(|_| CommandError::InvalidNumber(raw.to_string()))
        };

        let command = match word.to_ascii_lowercase().as_str() {
            "record" | "rec" => Command::Record,
            "stop-rec" | "stoprec" => Command::StopRecording,
            "play" => Command::Play,
            "pause" => Command::Pause,
            "toggle" | "space" => Command::Toggle,
            "stop" => Command::Stop,
            "seek" => Command::Seek(number("seek")?),
            "start" => Command::Start(number("start")?),
            "end" => Command::End(number("end")?),
            "click" => Command::Click(number("click")?),
            "drag" => Command::Drag(number("drag")?),
            "release" => Command::Release,
            "remove" => Command::Remove,
            "trim" => Command::Trim,
            "clear" => Command::Clear,
            "gain" => Command::Gain(number("gain")?),
            "apply" => Command::Apply,
            "status" => Command::Status,
            "help" | "?" => Command::Help,
            "quit" | "exit" | "q" => Command::Quit,
            "load" | "open" => {
                let rest = line.trim_start()[word.len()..].trim();
                if rest.is_empty() {
                    return Err(CommandError::MissingArgument("load"));
                }
                Command::Load(PathBuf::from(rest))
            }
            "save" => {
                let path = words.next().ok_or(CommandError::MissingArgument("save"))?;
                Command::Save(PathBuf::from(path), words.next().map(str::to_string))
            }
            other => return Err(CommandError::Unknown(other.to_string())),
        };
        Ok(Some(command))
    }
}

/// Whether the loop keeps going
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// The terminal editor
pub struct App {
    session: EditorSession,
    pointer: PointerInput,
    columns: usize,
}

impl App {
    pub fn new(session: EditorSession, columns: usize) -> Self {
        Self {
            session,
            pointer: PointerInput::new(),
            columns: columns.max(2),
        }
    }

    pub fn session(&self) -> &EditorSession {
        &self.session
    }

    /// The waveform line as a pixel view, one cell per column
    fn view(&self) -> WaveformView {
        WaveformView::new((self.columns - 1) as f64 * COLUMN_PX, self.session.duration())
    }

    /// Handle one line of input and print the outcome
    pub fn handle_line(&mut self, line: &str) -> Flow {
        match Command::parse(line) {
            Ok(Some(command)) => {
                debug!("Command: {:?}", command);
                let flow = self.execute(command);
                if flow == Flow::Continue {
                    self.render();
                }
                flow
            }
            Ok(None) => Flow::Continue,
            Err(e) => {
                println!("{}", e);
                Flow::Continue
            }
        }
    }

    /// Apply a command to the session. Failures are already in the status line.
    pub fn execute(&mut self, command: Command) -> Flow {
        let view = self.view();
        match command {
            Command::Record => {
                let _ = self.session.record();
            }
            Command::StopRecording => {
                let _ = self.session.stop_recording();
            }
            Command::Load(path) => {
                let _ = self.session.load(path);
            }
            Command::Play => {
                let _ = self.session.play();
            }
            Command::Pause => self.session.pause(),
            Command::Toggle => {
                let _ = self.session.toggle();
            }
            Command::Stop => self.session.stop_playback(),
            Command::Seek(time) => {
                let _ = self.session.seek(time);
            }
            Command::Start(time) => {
                let _ = self.session.set_start_marker(time);
            }
            Command::End(time) => {
                let _ = self.session.set_end_marker(time);
            }
            Command::Click(column) => {
                let _ = self.pointer.press(&mut self.session, &view, column * COLUMN_PX);
            }
            Command::Drag(column) => {
                let _ = self.pointer.drag(&mut self.session, &view, column * COLUMN_PX);
            }
            Command::Release => self.pointer.release(),
            Command::Remove => {
                let _ = self.session.remove_selection();
            }
            Command::Trim => {
                let _ = self.session.trim_to_selection();
            }
            Command::Clear => self.session.clear_markers(),
            Command::Gain(db) => {
                let _ = self.session.set_gain_db(db);
            }
            Command::Apply => {
                let _ = self.session.apply_gain();
            }
            Command::Save(path, format) => {
                let bitrate = self.session.mp3_bitrate_kbps();
                match format.map(|name| (SaveFormat::parse(&name, bitrate), name)) {
                    Some((None, name)) => println!("Unknown format '{}' (use wav or mp3)", name),
                    Some((Some(format), _)) => {
                        let _ = self.session.save_as(path, Some(format));
                    }
                    None => {
                        let _ = self.session.save_as(path, None);
                    }
                }
            }
            Command::Status => {}
            Command::Help => println!("{}", HELP),
            Command::Quit => return Flow::Quit,
        }
        Flow::Continue
    }

    /// Advance playback; redraw the cursor line while it moves
    pub fn on_tick(&mut self) {
        match self.session.tick() {
            TickOutcome::Advanced(cursor) => {
                print!("\r{} {}", render_text(&self.session, self.columns), format_time(cursor));
                let _ = std::io::stdout().flush();
            }
            TickOutcome::Finished | TickOutcome::Failed(_) => {
                println!();
                self.render();
            }
            TickOutcome::Idle | TickOutcome::Waiting => {
                if let Some(levels) = self.session.capture_levels() {
                    let filled = (levels.volume_level() * 4.0 * self.columns as f32).min(self.columns as f32);
                    print!(
                        "\rREC {} {:<width$}",
                        format_time(levels.duration()),
                        "#".repeat(filled as usize),
                        width = self.columns
                    );
                    let _ = std::io::stdout().flush();
                }
            }
        }
    }

    /// Print the waveform line and the status
    pub fn render(&self) {
        let session = &self.session;
        println!("{}", render_text(session, self.columns));
        let markers = session.markers();
        let marker = |m: Option<f64>| m.map(format_time).unwrap_or_else(|| "--".to_string());
        println!(
            "{} / {}  start {}  end {}  gain {:+.1} dB",
            format_time(session.playback().cursor),
            format_time(session.duration()),
            marker(markers.start()),
            marker(markers.end()),
            session.gain_db()
        );
        println!("{}", session.status());
    }

    /// Read commands and tick until `quit` or end of input
    pub async fn event_loop(&mut self, tick_interval: Duration) -> anyhow::Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut ticker = tokio::time::interval(tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        self.render();
        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line.context("Failed to read command")? else {
                        debug!("End of input");
                        break;
                    };
                    if self.handle_line(&line) == Flow::Quit {
                        break;
                    }
                }
                _ = ticker.tick() => self.on_tick(),
            }
        }
        Ok(())
    }

    pub fn shutdown(&mut self) {
        self.session.shutdown();
    }
}

/// Build the session from settings and run the terminal loop
pub fn run(args: &Args, config: &Config) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create Tokio runtime")?;

    let mut session = EditorSession::from_config(config);
    if let Some(file) = &args.file {
        let _ = session.load(file);
    }

    let mut app = App::new(session, args.columns);
    println!("Clipper - type 'help' for commands");
    let result = runtime.block_on(app.event_loop(config.tick_interval()));
    app.shutdown();
    info!("Clipper exiting");
    result
}
