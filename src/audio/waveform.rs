//! Waveform snapshot for display
//!
//! Decimates the clip by keeping every Nth sample.

use super::buffer::AudioBuffer;

/// Number of points the editor asks for by default
pub const DEFAULT_WAVEFORM_POINTS: usize = 2000;

/// Immutable downsampled amplitudes of one buffer
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WaveformSnapshot {
    points: Vec<i16>,
    step: usize,
    duration: f64,
}

impl WaveformSnapshot {
    /// Downsample `buffer` to roughly `target_points` amplitudes.
    ///
    /// Picks every `max(1, len / target_points)`-th sample. An empty buffer
    /// or a zero target gives an empty snapshot.
    pub fn generate(buffer: &AudioBuffer, target_points: usize) -> Self {
        if buffer.is_empty() || target_points == 0 {
            return Self {
                points: Vec::new(),
                step: 1,
                duration: buffer.duration(),
            };
        }

        let step = (buffer.len() / target_points).max(1);
        let points = buffer.samples().iter().step_by(step).copied().collect();

        Self {
            points,
            step,
            duration: buffer.duration(),
        }
    }

    pub fn points(&self) -> &[i16] {
        &self.points
    }

    /// Source samples per point
    pub fn step(&self) -> usize {
        self.step
    }

    /// Duration of the buffer this snapshot was taken from
    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Largest absolute amplitude, never below 1 so it can be used as a divisor
    pub fn peak(&self) -> i32 {
        self.points
            .iter()
            .map(|&p| (p as i32).abs())
            .max()
            .unwrap_or(0)
            .max(1)
    }
}
