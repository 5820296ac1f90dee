//! Start/end selection markers

use crate::error::{ClipError, Result};

/// Which marker
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Marker {
    Start,
    End,
}

/// User-placed selection boundaries, in seconds.
///
/// Placement clamps into the clip but does not order the two markers; a
/// start marker may sit after the end marker. [`MarkerState::selection`]
/// normalizes on read.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MarkerState {
    start: Option<f64>,
    end: Option<f64>,
}

impl MarkerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self) -> Option<f64> {
        self.start
    }

    pub fn end(&self) -> Option<f64> {
        self.end
    }

    pub fn get(&self, marker: Marker) -> Option<f64> {
        match marker {
            Marker::Start => self.start,
            Marker::End => self.end,
        }
    }

    /// Place `marker` at `time`, clamped to `[0, duration]`. Returns the stored value.
    pub fn set(&mut self, marker: Marker, time: f64, duration: f64) -> Result<f64> {
        if !time.is_finite() {
            return Err(ClipError::InvalidPosition(time));
        }
        let time = time.clamp(0.0, duration.max(0.0));
        match marker {
            Marker::Start => self.start = Some(time),
            Marker::End => self.end = Some(time),
        }
        Ok(time)
    }

    pub fn set_start(&mut self, time: f64, duration: f64) -> Result<f64> {
        self.set(Marker::Start, time, duration)
    }

    pub fn set_end(&mut self, time: f64, duration: f64) -> Result<f64> {
        self.set(Marker::End, time, duration)
    }

    pub fn clear(&mut self) {
        self.start = None;
        self.end = None;
    }

    pub fn is_empty(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    /// The ordered `(from, to)` range once both markers are placed
    pub fn selection(&self) -> Option<(f64, f64)> {
        match (self.start, self.end) {
            (Some(a), Some(b)) => Some((a.min(b), a.max(b))),
            _ => None,
        }
    }

    /// Like [`selection`](Self::selection) but reports why it is unusable
    pub fn require_selection(&self) -> Result<(f64, f64)> {
        self.selection().ok_or(ClipError::NoSelection)
    }

    /// The marker still missing, start first
    pub fn missing(&self) -> Option<Marker> {
        if self.start.is_none() {
            Some(Marker::Start)
        } else if self.end.is_none() {
            Some(Marker::End)
        } else {
            None
        }
    }

    /// The placed marker closest to `time`; end wins ties
    pub fn nearest(&self, time: f64) -> Option<Marker> {
        match (self.start, self.end) {
            (Some(s), Some(e)) => {
                if (time - s).abs() < (time - e).abs() {
                    Some(Marker::Start)
                } else {
                    Some(Marker::End)
                }
            }
            (Some(_), None) => Some(Marker::Start),
            (None, Some(_)) => Some(Marker::End),
            (None, None) => None,
        }
    }
}
