//! Editor session: the clip, its waveform, markers, playback and capture
//!
//! Every user control goes through here. Controls return their `Result` so
//! callers can react, and also leave a status line describing the outcome;
//! errors never leave the session half-updated.

use super::markers::{Marker, MarkerState};
use crate::audio::capture::{CaptureController, SharedCaptureState};
use crate::audio::codec::{Codec, SaveFormat};
use crate::audio::edit;
use crate::audio::playback::{PlaybackController, PlaybackState, TickOutcome};
use crate::audio::waveform::WaveformSnapshot;
use crate::audio::AudioBuffer;
use crate::error::{ClipError, Result};
use crate::settings::Config;
use log::{info, warn};
use std::path::{Path, PathBuf};

/// Range offered by the gain control; the edit itself accepts more
pub const GAIN_SLIDER_MIN_DB: f64 = -20.0;
pub const GAIN_SLIDER_MAX_DB: f64 = 20.0;

pub struct EditorSession {
    buffer: AudioBuffer,
    waveform: WaveformSnapshot,
    markers: MarkerState,
    playback: PlaybackController,
    capture: Option<CaptureController>,
    codec: Codec,
    gain_db: f64,
    waveform_points: usize,
    mp3_bitrate_kbps: u32,
    source_name: Option<String>,
    status: String,
}

impl EditorSession {
    pub fn new(
        playback: PlaybackController,
        capture: Option<CaptureController>,
        codec: Codec,
        waveform_points: usize,
        mp3_bitrate_kbps: u32,
    ) -> Self {
        Self {
            buffer: AudioBuffer::default(),
            waveform: WaveformSnapshot::default(),
            markers: MarkerState::new(),
            playback,
            capture,
            codec,
            gain_db: 0.0,
            waveform_points,
            mp3_bitrate_kbps,
            source_name: None,
            status: "Ready".to_string(),
        }
    }

    /// Build a session with the devices and tools named by `config`
    pub fn from_config(config: &Config) -> Self {
        let playback = PlaybackController::new(config.player_backend(), config.playback_config());
        let capture = config
            .capture_device()
            .map(|device| CaptureController::new(device, config.capture_spec()));
        Self::new(
            playback,
            capture,
            config.codec(),
            config.waveform_points,
            config.mp3_bitrate_kbps,
        )
    }

    pub fn buffer(&self) -> &AudioBuffer {
        &self.buffer
    }

    pub fn waveform(&self) -> &WaveformSnapshot {
        &self.waveform
    }

    pub fn markers(&self) -> &MarkerState {
        &self.markers
    }

    pub fn playback(&self) -> &PlaybackState {
        self.playback.state()
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn gain_db(&self) -> f64 {
        self.gain_db
    }

    pub fn source_name(&self) -> Option<&str> {
        self.source_name.as_deref()
    }

    pub fn duration(&self) -> f64 {
        self.buffer.duration()
    }

    pub fn has_audio(&self) -> bool {
        !self.buffer.is_empty()
    }

    pub fn is_recording(&self) -> bool {
        self.capture.as_ref().is_some_and(|c| c.has_session())
    }

    /// Live capture meters while recording
    pub fn capture_levels(&self) -> Option<SharedCaptureState> {
        self.capture
            .as_ref()
            .filter(|c| c.has_session())
            .map(|c| c.shared_state())
    }

    // Recording

    pub fn record(&mut self) -> Result<()> {
        let outcome = self.start_recording();
        self.report(outcome)
    }

    fn start_recording(&mut self) -> Result<()> {
        let capture = self
            .capture
            .as_mut()
            .ok_or_else(|| ClipError::CaptureDevice("no capture program found".to_string()))?;
        self.playback.stop();
        capture.start_capture()?;
        self.status = "Recording...".to_string();
        Ok(())
    }

    pub fn stop_recording(&mut self) -> Result<()> {
        let outcome = self
            .capture
            .as_mut()
            .ok_or(ClipError::CaptureInactive)
            .and_then(|capture| capture.stop_capture());
        let buffer = self.report(outcome)?;

        let duration = buffer.duration();
        self.replace_clip(buffer, Some("recording".to_string()));
        self.status = format!("Recording complete ({:.2}s)", duration);
        Ok(())
    }

    // Loading and saving

    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let outcome = self.ensure_not_recording().and_then(|_| self.codec.decode(path));
        let buffer = self.report(outcome)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        self.open_buffer(buffer, &name);
        Ok(())
    }

    /// Install an in-memory clip as if it had been loaded from `name`
    pub fn open_buffer(&mut self, buffer: AudioBuffer, name: &str) {
        let duration = buffer.duration();
        self.replace_clip(buffer, Some(name.to_string()));
        self.status = format!("Loaded: {} ({:.2}s)", name, duration);
    }

    pub fn save_as(&mut self, path: impl AsRef<Path>, format: Option<SaveFormat>) -> Result<PathBuf> {
        let path = path.as_ref();
        let format = format.unwrap_or_else(|| SaveFormat::from_path(path, self.mp3_bitrate_kbps));
        let outcome = self
            .require_audio()
            .and_then(|_| self.codec.encode(&self.buffer, path, format));
        let saved = self.report(outcome)?;
        let name = saved
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.status = format!("Saved: {}", name);
        Ok(saved)
    }

    pub fn mp3_bitrate_kbps(&self) -> u32 {
        self.mp3_bitrate_kbps
    }

    // Playback

    pub fn play(&mut self) -> Result<()> {
        let outcome = self.ensure_not_recording().and_then(|_| self.playback.play());
        self.report(outcome)?;
        self.status = format!("Playing from {:.2}s", self.playback.state().start_position);
        Ok(())
    }

    pub fn pause(&mut self) {
        if self.playback.is_playing() {
            self.playback.pause();
            self.status = format!("Paused at {:.2}s", self.playback.cursor());
        }
    }

    pub fn toggle(&mut self) -> Result<()> {
        if self.playback.is_playing() {
            self.pause();
            Ok(())
        } else {
            self.play()
        }
    }

    pub fn stop_playback(&mut self) {
        self.playback.stop();
        self.status = "Stopped".to_string();
    }

    pub fn seek(&mut self, position: f64) -> Result<()> {
        let outcome = self.playback.seek(position);
        self.report(outcome)
    }

    /// Advance the cursor and pick up background events
    pub fn tick(&mut self) -> TickOutcome {
        if let Some(capture) = &self.capture {
            if capture.has_session() && !capture.is_active() {
                // The capture worker gave up on its own; collect what it got
                let _ = self.stop_recording();
            }
        }

        let outcome = self.playback.tick();
        match &outcome {
            TickOutcome::Finished => self.status = "Playback finished".to_string(),
            TickOutcome::Failed(e) => self.status = e.to_string(),
            _ => {}
        }
        outcome
    }

    // Markers

    pub fn set_marker(&mut self, marker: Marker, time: f64) -> Result<f64> {
        let outcome = self.require_audio().and_then(|_| {
            let duration = self.buffer.duration();
            self.markers.set(marker, time, duration)
        });
        let placed = self.report(outcome)?;
        let label = match marker {
            Marker::Start => "Start",
            Marker::End => "End",
        };
        self.status = format!("{} marker at {:.2}s", label, placed);
        Ok(placed)
    }

    pub fn set_start_marker(&mut self, time: f64) -> Result<f64> {
        self.set_marker(Marker::Start, time)
    }

    pub fn set_end_marker(&mut self, time: f64) -> Result<f64> {
        self.set_marker(Marker::End, time)
    }

    pub fn clear_markers(&mut self) {
        self.markers.clear();
        self.status = "Markers cleared".to_string();
    }

    // Edits

    pub fn trim_to_selection(&mut self) -> Result<()> {
        let outcome = self.edit_selection(edit::trim_to_range);
        let (start, end) = self.report(outcome)?;
        self.status = format!("Trimmed to: {:.2}s to {:.2}s", start, end);
        Ok(())
    }

    pub fn remove_selection(&mut self) -> Result<()> {
        let outcome = self.edit_selection(edit::excise_range);
        let (start, end) = self.report(outcome)?;
        self.status = format!("Removed region: {:.2}s to {:.2}s", start, end);
        Ok(())
    }

    fn edit_selection(
        &mut self,
        op: fn(&AudioBuffer, f64, f64) -> Result<AudioBuffer>,
    ) -> Result<(f64, f64)> {
        self.require_audio()?;
        let (start, end) = self.markers.require_selection()?;
        let edited = op(&self.buffer, start, end)?;
        self.replace_buffer(edited);
        self.markers.clear();
        Ok((start, end))
    }

    /// Set the pending gain; applied by [`apply_gain`](Self::apply_gain)
    pub fn set_gain_db(&mut self, db: f64) -> Result<()> {
        if !db.is_finite() || !(GAIN_SLIDER_MIN_DB..=GAIN_SLIDER_MAX_DB).contains(&db) {
            return self.report(Err(ClipError::InvalidGain(db)));
        }
        self.gain_db = db;
        self.status = format!("Gain set to {:.1} dB", db);
        Ok(())
    }

    pub fn apply_gain(&mut self) -> Result<()> {
        let gain = self.gain_db;
        let outcome = self
            .require_audio()
            .and_then(|_| edit::apply_gain(&self.buffer, gain));
        let gained = self.report(outcome)?;
        self.replace_buffer(gained);
        self.status = format!("Volume adjusted by {:.1} dB", gain);
        Ok(())
    }

    /// Stop background work before exit
    pub fn shutdown(&mut self) {
        if self.is_recording() {
            if let Some(capture) = self.capture.as_mut() {
                let _ = capture.stop_capture();
            }
        }
        self.playback.shutdown();
    }

    fn require_audio(&self) -> Result<()> {
        if self.buffer.is_empty() {
            Err(ClipError::NoAudio)
        } else {
            Ok(())
        }
    }

    fn ensure_not_recording(&self) -> Result<()> {
        if self.is_recording() {
            Err(ClipError::CaptureActive)
        } else {
            Ok(())
        }
    }

    /// New clip: markers and cursor start over
    fn replace_clip(&mut self, buffer: AudioBuffer, name: Option<String>) {
        self.replace_buffer(buffer);
        self.markers.clear();
        self.source_name = name;
    }

    /// Swap in an edited buffer and regenerate everything derived from it
    fn replace_buffer(&mut self, buffer: AudioBuffer) {
        self.waveform = WaveformSnapshot::generate(&buffer, self.waveform_points);
        self.playback.set_buffer(buffer.clone());
        self.buffer = buffer;
        info!("Clip is now {:.2}s", self.buffer.duration());
    }

    /// Turn an error into the status line and pass the outcome through
    fn report<T>(&mut self, outcome: Result<T>) -> Result<T> {
        if let Err(e) = &outcome {
            warn!("{}", e);
            self.status = e.to_string();
        }
        outcome
    }
}

impl Drop for EditorSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}
