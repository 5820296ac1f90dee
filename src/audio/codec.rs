//! Clip decode/encode
//!
//! WAV is read and written directly with hound. Other containers are
//! converted through an external `ffmpeg` process.

use super::buffer::AudioBuffer;
use super::temp::TempAudioFile;
use crate::error::{ClipError, Result};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use log::{debug, info};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

/// Default bitrate for compressed exports
pub const DEFAULT_MP3_BITRATE_KBPS: u32 = 192;

/// Output container for "save as"
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveFormat {
    Wav,
    Mp3 { bitrate_kbps: u32 },
}

impl SaveFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            SaveFormat::Wav => "wav",
            SaveFormat::Mp3 { .. } => "mp3",
        }
    }

    /// Parse a user-facing format name
    pub fn parse(name: &str, mp3_bitrate_kbps: u32) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "wav" => Some(SaveFormat::Wav),
            "mp3" => Some(SaveFormat::Mp3 {
                bitrate_kbps: mp3_bitrate_kbps,
            }),
            _ => None,
        }
    }

    /// Guess the format from a path's extension, defaulting to WAV
    pub fn from_path(path: &Path, mp3_bitrate_kbps: u32) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| Self::parse(ext, mp3_bitrate_kbps))
            .unwrap_or(SaveFormat::Wav)
    }
}

/// Decoder/encoder for clips on disk
#[derive(Clone, Debug)]
pub struct Codec {
    ffmpeg: Option<PathBuf>,
    temp_dir: PathBuf,
}

impl Codec {
    /// Create a codec using an explicit ffmpeg path (or none)
    pub fn new(ffmpeg: Option<PathBuf>, temp_dir: impl AsRef<Path>) -> Self {
        Self {
            ffmpeg,
            temp_dir: temp_dir.as_ref().to_path_buf(),
        }
    }

    /// Create a codec, searching `PATH` for ffmpeg
    pub fn detect(temp_dir: impl AsRef<Path>) -> Self {
        let ffmpeg = which::which("ffmpeg").ok();
        match &ffmpeg {
            Some(path) => debug!("Found ffmpeg at {}", path.display()),
            None => info!("ffmpeg not found; only WAV files can be loaded and saved"),
        }
        Self::new(ffmpeg, temp_dir)
    }

    /// Load a clip from disk as mono 16-bit PCM
    pub fn decode(&self, path: impl AsRef<Path>) -> Result<AudioBuffer> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ClipError::decode(path, "file not found"));
        }

        if is_wav(path) {
            return read_wav(path);
        }

        let ffmpeg = self
            .ffmpeg
            .as_ref()
            .ok_or_else(|| ClipError::decode(path, "FFmpeg not found"))?;

        let temp = TempAudioFile::create(&self.temp_dir, "decode", "wav", Duration::ZERO)?;
        let mut cmd = Command::new(ffmpeg);
        cmd.args(["-y", "-loglevel", "error", "-i"])
            .arg(path)
            .args(["-ac", "1", "-c:a", "pcm_s16le"])
            .arg(temp.path());
        run_ffmpeg(cmd).map_err(|reason| ClipError::decode(path, reason))?;

        read_wav(temp.path()).map_err(|e| match e {
            ClipError::DecodeUnavailable { reason, .. } => ClipError::decode(path, reason),
            other => other,
        })
    }

    /// Save a clip, returning the path actually written.
    ///
    /// The format's extension is appended when the path lacks it.
    pub fn encode(&self, buffer: &AudioBuffer, path: impl AsRef<Path>, format: SaveFormat) -> Result<PathBuf> {
        let path = with_extension(path.as_ref(), format.extension());
        if buffer.is_empty() {
            return Err(ClipError::encode(&path, "clip is empty"));
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| ClipError::encode(&path, format!("Failed to create directory: {}", e)))?;
        }

        match format {
            SaveFormat::Wav => {
                write_wav(&path, buffer).map_err(|e| ClipError::encode(&path, e))?;
            }
            SaveFormat::Mp3 { bitrate_kbps } => {
                let ffmpeg = self
                    .ffmpeg
                    .as_ref()
                    .ok_or_else(|| ClipError::encode(&path, "FFmpeg not found. Required for MP3 export"))?;

                let temp = TempAudioFile::create(&self.temp_dir, "encode", "wav", Duration::ZERO)?;
                write_wav(temp.path(), buffer).map_err(|e| ClipError::encode(&path, e))?;

                let mut cmd = Command::new(ffmpeg);
                cmd.args(["-y", "-loglevel", "error", "-i"])
                    .arg(temp.path())
                    .args(["-codec:a", "libmp3lame", "-b:a"])
                    .arg(format!("{}k", bitrate_kbps))
                    .arg(&path);
                run_ffmpeg(cmd).map_err(|reason| ClipError::encode(&path, reason))?;
            }
        }

        info!("Saved {} ({:.2}s)", path.display(), buffer.duration());
        Ok(path)
    }
}

/// Write a clip as 16-bit mono PCM WAV
pub fn write_wav(path: &Path, buffer: &AudioBuffer) -> std::result::Result<(), hound::Error> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: buffer.sample_rate(),
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let file = File::create(path)?;
    let mut writer = WavWriter::new(BufWriter::new(file), spec)?;
    for &sample in buffer.samples() {
        writer.write_sample(sample)?;
    }
    writer.finalize()
}

/// Read any PCM WAV, down-mixing to mono and converting to 16-bit
pub fn read_wav(path: &Path) -> Result<AudioBuffer> {
    let reader = WavReader::open(path).map_err(|e| ClipError::decode(path, e))?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let mono: Vec<i16> = match spec.sample_format {
        SampleFormat::Float => {
            let samples = reader
                .into_samples::<f32>()
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| ClipError::decode(path, e))?;
            let mixed: Vec<f32> = samples
                .chunks(channels)
                .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
                .collect();
            return Ok(AudioBuffer::from_f32(&mixed, spec.sample_rate));
        }
        SampleFormat::Int => {
            let bits = spec.bits_per_sample as i32;
            let samples = reader
                .into_samples::<i32>()
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| ClipError::decode(path, e))?;
            samples
                .chunks(channels)
                .map(|frame| {
                    let sum: i64 = frame.iter().map(|&v| to_16_bit(v, bits) as i64).sum();
                    (sum / frame.len() as i64) as i16
                })
                .collect()
        }
    };

    Ok(AudioBuffer::new(mono, spec.sample_rate))
}

fn to_16_bit(value: i32, bits: i32) -> i16 {
    let scaled = if bits > 16 {
        value >> (bits - 16)
    } else {
        value << (16 - bits)
    };
    scaled.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

fn is_wav(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case("wav"))
        .unwrap_or(false)
}

fn with_extension(path: &Path, extension: &str) -> PathBuf {
    let has_it = path
        .extension()
        .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case(extension))
        .unwrap_or(false);
    if has_it {
        path.to_path_buf()
    } else {
        let mut name = path.as_os_str().to_os_string();
        name.push(".");
        name.push(extension);
        PathBuf::from(name)
    }
}

fn run_ffmpeg(mut cmd: Command) -> std::result::Result<(), String> {
    debug!("Running {:?}", cmd);
    let output = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| format!("Failed to run ffmpeg: {}", e))?;

    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(format!("ffmpeg failed ({}): {}", output.status, stderr.trim()))
    }
}
