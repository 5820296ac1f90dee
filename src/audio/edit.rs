//! Buffer-level edits: trim, excise and gain
//!
//! Every operation returns a new [`AudioBuffer`]; the input is never touched.
//! Callers regenerate the waveform afterwards.

use super::buffer::AudioBuffer;
use crate::error::{ClipError, Result};

/// Largest gain change accepted, in either direction
pub const MAX_GAIN_DB: f64 = 60.0;

/// Keep only `[start, end)` of the clip
pub fn trim_to_range(buffer: &AudioBuffer, start: f64, end: f64) -> Result<AudioBuffer> {
    let (from, to) = sample_range(buffer, start, end)?;
    Ok(AudioBuffer::new(
        buffer.samples()[from..to].to_vec(),
        buffer.sample_rate(),
    ))
}

/// Remove `[start, end)` and join what remains on either side
pub fn excise_range(buffer: &AudioBuffer, start: f64, end: f64) -> Result<AudioBuffer> {
    let (from, to) = sample_range(buffer, start, end)?;
    let samples = buffer.samples();

    let mut kept = Vec::with_capacity(samples.len() - (to - from));
    kept.extend_from_slice(&samples[..from]);
    kept.extend_from_slice(&samples[to..]);

    Ok(AudioBuffer::new(kept, buffer.sample_rate()))
}

/// Scale every sample by `10^(db/20)`, saturating at the i16 limits
pub fn apply_gain(buffer: &AudioBuffer, db: f64) -> Result<AudioBuffer> {
    if !db.is_finite() || db.abs() > MAX_GAIN_DB {
        return Err(ClipError::InvalidGain(db));
    }

    let factor = db_to_linear(db);
    let samples = buffer
        .samples()
        .iter()
        .map(|&s| (s as f64 * factor).round().clamp(i16::MIN as f64, i16::MAX as f64) as i16)
        .collect();

    Ok(AudioBuffer::new(samples, buffer.sample_rate()))
}

/// The tail of the clip from `start` to the end; `start` is clamped into the clip
pub fn slice_from(buffer: &AudioBuffer, start: f64) -> AudioBuffer {
    let from = buffer.index_at(start);
    AudioBuffer::new(buffer.samples()[from..].to_vec(), buffer.sample_rate())
}

/// Convert decibels to a linear amplitude factor
pub fn db_to_linear(db: f64) -> f64 {
    10f64.powf(db / 20.0)
}

/// Validate a time range and convert it to sample indices.
///
/// `end` may overshoot the duration by up to one sample period to absorb
/// rounding from pixel-to-time conversion.
fn sample_range(buffer: &AudioBuffer, start: f64, end: f64) -> Result<(usize, usize)> {
    let duration = buffer.duration();
    let invalid = || ClipError::InvalidRange {
        start,
        end,
        duration,
    };

    if !start.is_finite() || !end.is_finite() {
        return Err(invalid());
    }
    if start < 0.0 || start >= end || end > duration + buffer.sample_period() {
        return Err(invalid());
    }

    let from = buffer.index_at(start);
    let to = buffer.index_at(end);
    if from >= to {
        return Err(invalid());
    }
    Ok((from, to))
}
