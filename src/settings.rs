//! Application settings loaded from JSON
//!
//! Settings live in `<config_dir>/clipper/config.json`. A missing file means
//! defaults; unknown keys are ignored and missing keys take their default.

use crate::audio::capture::{CaptureDevice, CaptureSpec, ProcessCaptureDevice};
use crate::audio::codec::{Codec, DEFAULT_MP3_BITRATE_KBPS};
use crate::audio::playback::PlaybackConfig;
use crate::audio::player::{CommandPlayer, PlayerBackend};
use crate::audio::temp;
use crate::audio::waveform::DEFAULT_WAVEFORM_POINTS;
use crate::audio::DEFAULT_SAMPLE_RATE;
use anyhow::{bail, Context};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Tunables for the editor
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sample_rate: u32,
    pub waveform_points: usize,
    pub tick_interval_ms: u64,
    pub terminate_timeout_ms: u64,
    pub temp_cleanup_grace_ms: u64,
    /// Player command line; the audio path is appended
    pub player_command: Option<String>,
    /// Recorder command line writing raw s16le to stdout
    pub capture_command: Option<String>,
    pub ffmpeg_path: Option<PathBuf>,
    pub temp_dir: Option<PathBuf>,
    pub mp3_bitrate_kbps: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            waveform_points: DEFAULT_WAVEFORM_POINTS,
            tick_interval_ms: 50,
            terminate_timeout_ms: 500,
            temp_cleanup_grace_ms: 300,
            player_command: None,
            capture_command: None,
            ffmpeg_path: None,
            temp_dir: None,
            mp3_bitrate_kbps: DEFAULT_MP3_BITRATE_KBPS,
        }
    }
}

impl Config {
    /// `<config_dir>/clipper/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("clipper").join("config.json"))
    }

    /// Read settings from `path`
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = serde_json::from_str(&text)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        config.validate()?;
        info!("Loaded settings from {}", path.display());
        Ok(config)
    }

    /// Load an explicitly given file, or the default file if it exists
    pub fn load_or_default(explicit: Option<&Path>) -> anyhow::Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => {
                debug!("No config file, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.sample_rate == 0 {
            bail!("sample_rate must be positive");
        }
        if self.waveform_points == 0 {
            bail!("waveform_points must be positive");
        }
        if self.tick_interval_ms == 0 {
            bail!("tick_interval_ms must be positive");
        }
        if !(32..=320).contains(&self.mp3_bitrate_kbps) {
            bail!("mp3_bitrate_kbps must be between 32 and 320");
        }
        Ok(())
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(temp::default_temp_dir)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn playback_config(&self) -> PlaybackConfig {
        PlaybackConfig {
            temp_dir: self.temp_dir(),
            terminate_timeout: Duration::from_millis(self.terminate_timeout_ms),
            cleanup_grace: Duration::from_millis(self.temp_cleanup_grace_ms),
            ..PlaybackConfig::default()
        }
    }

    pub fn capture_spec(&self) -> CaptureSpec {
        CaptureSpec {
            sample_rate: self.sample_rate,
            ..CaptureSpec::default()
        }
    }

    /// Configured player, or the first one found on `PATH`
    pub fn player_backend(&self) -> Option<Arc<dyn PlayerBackend>> {
        let player = match &self.player_command {
            Some(command) => CommandPlayer::from_command_line(command),
            None => CommandPlayer::detect(),
        };
        if player.is_none() {
            warn!("No audio player available; playback disabled");
        }
        player.map(|p| Arc::new(p) as Arc<dyn PlayerBackend>)
    }

    /// Configured recorder, the native PipeWire device, or a recorder found on `PATH`
    pub fn capture_device(&self) -> Option<Box<dyn CaptureDevice>> {
        if let Some(command) = &self.capture_command {
            return ProcessCaptureDevice::from_command_line(command)
                .map(|d| Box::new(d) as Box<dyn CaptureDevice>);
        }
        #[cfg(feature = "pipewire")]
        let device: Option<Box<dyn CaptureDevice>> =
            Some(Box::new(crate::audio::PipeWireCaptureDevice::new()));
        #[cfg(not(feature = "pipewire"))]
        let device = ProcessCaptureDevice::detect().map(|d| Box::new(d) as Box<dyn CaptureDevice>);

        if device.is_none() {
            warn!("No capture program available; recording disabled");
        }
        device
    }

    pub fn codec(&self) -> Codec {
        match &self.ffmpeg_path {
            Some(path) => Codec::new(Some(path.clone()), self.temp_dir()),
            None => Codec::detect(self.temp_dir()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "sample_rate": 48000, "player_command": "aplay -q" }"#).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.sample_rate, 48000);
        assert_eq!(config.player_command.as_deref(), Some("aplay -q"));
        assert_eq!(config.waveform_points, DEFAULT_WAVEFORM_POINTS);
        assert_eq!(config.mp3_bitrate_kbps, 192);
        assert_eq!(config.capture_spec().sample_rate, 48000);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "sample_rate": 0 }"#).unwrap();
        assert!(Config::load(&path).is_err());

        std::fs::write(&path, "not json").unwrap();
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load_or_default(Some(&dir.path().join("nope.json"))).is_err());
    }

    #[test]
    fn test_playback_config_from_settings() {
        let config = Config {
            terminate_timeout_ms: 250,
            temp_cleanup_grace_ms: 0,
            temp_dir: Some(PathBuf::from("/tmp/clipper-test")),
            ..Config::default()
        };
        let playback = config.playback_config();
        assert_eq!(playback.terminate_timeout, Duration::from_millis(250));
        assert!(playback.cleanup_grace.is_zero());
        assert_eq!(playback.temp_dir, PathBuf::from("/tmp/clipper-test"));
    }

    #[test]
    fn test_round_trip_json() {
        let config = Config::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }
}
