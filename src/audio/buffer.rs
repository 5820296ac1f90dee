//! In-memory PCM clip
//!
//! Samples are mono 16-bit signed, shared behind an `Arc` so that waveform
//! snapshots and the playback worker can hold the clip they were given while
//! edits produce new buffers.

use std::sync::Arc;

/// Default capture and playback rate
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// An immutable mono PCM clip
#[derive(Clone, Debug, PartialEq)]
pub struct AudioBuffer {
    samples: Arc<[i16]>,
    sample_rate: u32,
}

impl AudioBuffer {
    /// Create a buffer from owned samples
    pub fn new(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self {
            samples: samples.into(),
            sample_rate: sample_rate.max(1),
        }
    }

    /// An empty clip at the given rate
    pub fn empty(sample_rate: u32) -> Self {
        Self::new(Vec::new(), sample_rate)
    }

    /// Build a buffer from little-endian 16-bit frame bytes.
    ///
    /// A trailing odd byte is dropped.
    pub fn from_le_bytes(bytes: &[u8], sample_rate: u32) -> Self {
        let samples = bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Self::new(samples, sample_rate)
    }

    /// Build a buffer from float samples in [-1, 1], saturating out-of-range values
    pub fn from_f32(samples: &[f32], sample_rate: u32) -> Self {
        let samples = samples
            .iter()
            .map(|&s| (s * i16::MAX as f32).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16)
            .collect();
        Self::new(samples, sample_rate)
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Length of one sample in seconds
    pub fn sample_period(&self) -> f64 {
        1.0 / self.sample_rate as f64
    }

    /// Convert a time in seconds to a sample index, truncating and clamping to `len`
    pub fn index_at(&self, seconds: f64) -> usize {
        if !seconds.is_finite() || seconds <= 0.0 {
            return 0;
        }
        let index = (seconds * self.sample_rate as f64) as usize;
        index.min(self.samples.len())
    }

    /// Sample value at a time, if inside the clip
    pub fn sample_at(&self, seconds: f64) -> Option<i16> {
        self.samples.get(self.index_at(seconds)).copied()
    }

    /// Whether two buffers share the same sample storage
    pub fn shares_storage(&self, other: &AudioBuffer) -> bool {
        Arc::ptr_eq(&self.samples, &other.samples)
    }
}

impl Default for AudioBuffer {
    fn default() -> Self {
        Self::empty(DEFAULT_SAMPLE_RATE)
    }
}

/// Calculate RMS level from samples, normalized to 0.0 - 1.0
pub fn calculate_rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f64 = samples
        .iter()
        .map(|&s| {
            let v = s as f64 / i16::MAX as f64;
            v * v
        })
        .sum();
    (sum_squares / samples.len() as f64).sqrt() as f32
}

/// Calculate peak level from samples, normalized to 0.0 - 1.0
pub fn calculate_peak(samples: &[i16]) -> f32 {
    samples
        .iter()
        .map(|&s| (s as i32).unsigned_abs())
        .max()
        .map(|peak| (peak as f32 / i16::MAX as f32).min(1.0))
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_calculation() {
        assert_eq!(AudioBuffer::new(vec![0; 44100], 44100).duration(), 1.0);
        assert_eq!(AudioBuffer::new(vec![0; 32000], 16000).duration(), 2.0);
        assert_eq!(AudioBuffer::new(vec![0; 8000], 16000).duration(), 0.5);
        assert_eq!(AudioBuffer::empty(44100).duration(), 0.0);
    }

    #[test]
    fn test_index_at_clamps() {
        let buffer = AudioBuffer::new(vec![0; 100], 10);
        assert_eq!(buffer.index_at(-1.0), 0);
        assert_eq!(buffer.index_at(2.55), 25);
        assert_eq!(buffer.index_at(100.0), 100);
        assert_eq!(buffer.index_at(f64::NAN), 0);
    }

    #[test]
    fn test_from_le_bytes() {
        let bytes = [0x01, 0x00, 0xff, 0x7f, 0x00, 0x80, 0x05];
        let buffer = AudioBuffer::from_le_bytes(&bytes, 8000);
        assert_eq!(buffer.samples(), &[1, i16::MAX, i16::MIN]);
    }

    #[test]
    fn test_from_f32_saturates() {
        let buffer = AudioBuffer::from_f32(&[0.0, 1.5, -1.5, 0.5], 8000);
        assert_eq!(buffer.samples()[0], 0);
        assert_eq!(buffer.samples()[1], i16::MAX);
        assert_eq!(buffer.samples()[2], i16::MIN);
        assert_eq!(buffer.samples()[3], 16384);
    }

    #[test]
    fn test_levels() {
        assert_eq!(calculate_rms(&[]), 0.0);
        assert_eq!(calculate_peak(&[]), 0.0);
        assert!((calculate_peak(&[100, i16::MIN, 5]) - 1.0).abs() < 1e-6);
        let rms = calculate_rms(&[i16::MAX; 16]);
        assert!((rms - 1.0).abs() < 1e-6);
    }
}
