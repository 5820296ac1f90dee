//! Toolkit-neutral waveform view: coordinates, pointer handling and drawing
//!
//! A frontend maps its widget to a [`WaveformView`], feeds pointer events to
//! [`PointerInput`], and paints the [`Frame`] built from the session.

use crate::audio::playback::PlaybackState;
use crate::audio::waveform::WaveformSnapshot;
use crate::error::Result;
use crate::state::markers::{Marker, MarkerState};
use crate::state::session::EditorSession;

/// How close (in pixels) a press must land to grab a marker or the cursor
pub const GRAB_WIDTH_PX: f64 = 10.0;

/// Space kept free under the waveform for time labels
pub const LABEL_STRIP_PX: f64 = 25.0;

/// Number of time labels along the bottom
const TIME_LABELS: usize = 5;

/// Maps between widget pixels and clip time
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WaveformView {
    width: f64,
    duration: f64,
}

impl WaveformView {
    pub fn new(width: f64, duration: f64) -> Self {
        Self {
            width: width.max(0.0),
            duration: duration.max(0.0),
        }
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn pixel_to_time(&self, x: f64) -> f64 {
        if self.width <= 0.0 || self.duration <= 0.0 {
            return 0.0;
        }
        (x.clamp(0.0, self.width) / self.width) * self.duration
    }

    pub fn time_to_pixel(&self, time: f64) -> f64 {
        if self.duration <= 0.0 {
            return 0.0;
        }
        (time / self.duration) * self.width
    }

    fn near(&self, x: f64, time: Option<f64>) -> bool {
        time.is_some_and(|t| (x - self.time_to_pixel(t)).abs() < GRAB_WIDTH_PX)
    }
}

/// Something a press can grab
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DragTarget {
    Cursor,
    Marker(Marker),
}

/// What sits under `x`: the cursor (only when not playing), then start, then end
pub fn hit_test(
    view: &WaveformView,
    markers: &MarkerState,
    playback: &PlaybackState,
    x: f64,
) -> Option<DragTarget> {
    if !playback.is_playing() && view.near(x, Some(playback.cursor)) {
        return Some(DragTarget::Cursor);
    }
    if view.near(x, markers.start()) {
        return Some(DragTarget::Marker(Marker::Start));
    }
    if view.near(x, markers.end()) {
        return Some(DragTarget::Marker(Marker::End));
    }
    None
}

/// Press, drag and release handling for the waveform
#[derive(Debug, Default)]
pub struct PointerInput {
    dragging: Option<DragTarget>,
}

impl PointerInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dragging(&self) -> Option<DragTarget> {
        self.dragging
    }

    /// Grab whatever is under `x`, or place a marker there.
    ///
    /// Empty space places the start marker, then the end marker; once both
    /// exist it moves the nearer one. The placed marker stays grabbed.
    pub fn press(
        &mut self,
        session: &mut EditorSession,
        view: &WaveformView,
        x: f64,
    ) -> Result<Option<DragTarget>> {
        if !session.has_audio() {
            return Ok(None);
        }
        if let Some(target) = hit_test(view, session.markers(), session.playback(), x) {
            self.dragging = Some(target);
            return Ok(Some(target));
        }

        let time = view.pixel_to_time(x);
        let markers = session.markers();
        let marker = markers
            .missing()
            .or_else(|| markers.nearest(time))
            .unwrap_or(Marker::Start);
        session.set_marker(marker, time)?;
        let target = DragTarget::Marker(marker);
        self.dragging = Some(target);
        Ok(Some(target))
    }

    /// Move the grabbed target to `x` (clamped to the view)
    pub fn drag(&mut self, session: &mut EditorSession, view: &WaveformView, x: f64) -> Result<()> {
        let time = view.pixel_to_time(x);
        match self.dragging {
            None => Ok(()),
            Some(DragTarget::Cursor) => {
                if session.playback().is_playing() {
                    return Ok(());
                }
                session.seek(time)
            }
            Some(DragTarget::Marker(marker)) => session.set_marker(marker, time).map(|_| ()),
        }
    }

    pub fn release(&mut self) {
        self.dragging = None;
    }
}

/// One drawing primitive, in widget coordinates
#[derive(Clone, Debug, PartialEq)]
pub enum DrawCommand {
    Waveform { points: Vec<(f64, f64)> },
    Selection { x0: f64, x1: f64 },
    MarkerLine { x: f64, label: &'static str },
    /// `grabbable` is false while playing
    CursorLine { x: f64, grabbable: bool },
    TimeLabel { x: f64, text: String },
}

/// Everything needed to paint the waveform widget once
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    pub width: f64,
    pub height: f64,
    pub commands: Vec<DrawCommand>,
}

impl Frame {
    /// Build the frame for `session` drawn into a `width` x `height` widget
    pub fn build(session: &EditorSession, width: f64, height: f64) -> Self {
        let view = WaveformView::new(width, session.duration());
        let mut commands = Vec::new();

        if !session.waveform().is_empty() {
            commands.push(DrawCommand::Waveform {
                points: waveform_polyline(session.waveform(), width, height),
            });
        }

        let markers = session.markers();
        if let Some((from, to)) = markers.selection() {
            commands.push(DrawCommand::Selection {
                x0: view.time_to_pixel(from),
                x1: view.time_to_pixel(to),
            });
        }
        if let Some(start) = markers.start() {
            commands.push(DrawCommand::MarkerLine {
                x: view.time_to_pixel(start),
                label: "START",
            });
        }
        if let Some(end) = markers.end() {
            commands.push(DrawCommand::MarkerLine {
                x: view.time_to_pixel(end),
                label: "END",
            });
        }

        if session.has_audio() {
            let playback = session.playback();
            commands.push(DrawCommand::CursorLine {
                x: view.time_to_pixel(playback.cursor),
                grabbable: !playback.is_playing(),
            });
            for i in 0..TIME_LABELS {
                let time = session.duration() * i as f64 / (TIME_LABELS - 1) as f64;
                commands.push(DrawCommand::TimeLabel {
                    x: view.time_to_pixel(time),
                    text: format_time(time),
                });
            }
        }

        Self {
            width,
            height,
            commands,
        }
    }
}

/// Waveform points scaled to fill the area above the label strip
fn waveform_polyline(waveform: &WaveformSnapshot, width: f64, height: f64) -> Vec<(f64, f64)> {
    let area = (height - LABEL_STRIP_PX).max(0.0);
    let center = area / 2.0;
    let scale = center * 0.9 / waveform.peak() as f64;
    let count = waveform.points().len();

    waveform
        .points()
        .iter()
        .enumerate()
        .map(|(i, &amplitude)| {
            let x = i as f64 * width / count as f64;
            (x, center - amplitude as f64 * scale)
        })
        .collect()
}

/// `MM:SS.s`
pub fn format_time(seconds: f64) -> String {
    let tenths = (seconds.max(0.0) * 10.0).round() as u64;
    format!("{:02}:{:02}.{}", tenths / 600, tenths % 600 / 10, tenths % 10)
}

const LEVEL_GLYPHS: [char; 9] = [' ', '▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// One line of text: amplitude blocks with `[` `]` for markers and `|` for the cursor
pub fn render_text(session: &EditorSession, columns: usize) -> String {
    if columns == 0 {
        return String::new();
    }
    let waveform = session.waveform();
    if waveform.is_empty() {
        return "-".repeat(columns);
    }

    let points = waveform.points();
    let peak = waveform.peak() as f64;
    let mut line: Vec<char> = (0..columns)
        .map(|col| {
            let from = col * points.len() / columns;
            let to = ((col + 1) * points.len() / columns).max(from + 1).min(points.len());
            let level = points[from.min(points.len() - 1)..to]
                .iter()
                .map(|&p| (p as i32).unsigned_abs() as f64)
                .fold(0.0, f64::max)
                / peak;
            LEVEL_GLYPHS[((level * 8.0).round() as usize).min(8)]
        })
        .collect();

    // Columns act as pixels; the last column holds the end of the clip
    let view = WaveformView::new((columns - 1) as f64, session.duration());
    let mut mark = |time: f64, glyph: char| {
        let col = view.time_to_pixel(time).round() as usize;
        line[col.min(columns - 1)] = glyph;
    };
    if let Some(start) = session.markers().start() {
        mark(start, '[');
    }
    if let Some(end) = session.markers().end() {
        mark(end, ']');
    }
    mark(session.playback().cursor, '|');

    line.into_iter().collect()
}
