//! Audio buffers, editing, codecs, playback and capture
//!
//! This module provides:
//! - Mono 16-bit sample buffers and waveform decimation
//! - Trim, excise and gain edits
//! - WAV and MP3 load/save (hound, ffmpeg)
//! - Playback through an external player with a live cursor
//! - Microphone capture with level metering

pub mod buffer;
pub mod capture;
pub mod codec;
pub mod edit;
#[cfg(feature = "pipewire")]
pub mod pipewire_device;
pub mod playback;
pub mod player;
pub mod temp;
pub mod waveform;

pub use buffer::{AudioBuffer, DEFAULT_SAMPLE_RATE};
pub use capture::{
    CaptureController, CaptureDevice, CaptureSpec, CaptureState, ProcessCaptureDevice,
    SharedCaptureState,
};
pub use codec::{Codec, SaveFormat};
#[cfg(feature = "pipewire")]
pub use pipewire_device::PipeWireCaptureDevice;
pub use playback::{
    Clock, PlaybackConfig, PlaybackController, PlaybackPhase, PlaybackState, SystemClock,
    TickOutcome,
};
pub use player::{CommandPlayer, PlayerBackend, PlayerProcess, ProcessStatus};
pub use waveform::WaveformSnapshot;
