// src/window.rs
//! # Window planning
//! Pure, deterministic computation of the next half-open interval `[start, end)`
//! to request from a source. No I/O.
//!
//! A window never exceeds the configured maximum span and never crosses the
//! run's target end, so a long backlog drains in bounded steps.

use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WindowError {
    #[error("nothing left to plan: position {position} is not before target end {target_end}")]
    Exhausted {
        position: DateTime<Utc>,
        target_end: DateTime<Utc>,
    },
    #[error("maximum window span must be positive, got {0}")]
    NonPositiveSpan(TimeDelta),
}

impl Window {
    /// Plan the window starting at `position`.
    ///
    /// `end = min(target_end, position + max_span)`. Callers must stop looping
    /// once `position >= target_end`; asking anyway is an error.
    pub fn next(
        position: DateTime<Utc>,
        target_end: DateTime<Utc>,
        max_span: TimeDelta,
    ) -> Result<Self, WindowError> {
        if max_span <= TimeDelta::zero() {
            return Err(WindowError::NonPositiveSpan(max_span));
        }
        if position >= target_end {
            return Err(WindowError::Exhausted {
                position,
                target_end,
            });
        }
        // Overflow past the representable range means "unbounded", so the target wins.
        let end = position
            .checked_add_signed(max_span)
            .map_or(target_end, |e| e.min(target_end));
        Ok(Self {
            start: position,
            end,
        })
    }

    pub fn span(&self) -> TimeDelta {
        self.end - self.start
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts < self.end
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {})",
            self.start.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            self.end.to_rfc3339_opts(SecondsFormat::AutoSi, true)
        )
    }
}

/// Storage name for data covering `[start, end)`: `<start>--<end>` rendered with
/// `time_format` (strftime). Deterministic, so a re-harvested interval lands on
/// the same name at the sink.
pub fn interval_name(start: DateTime<Utc>, end: DateTime<Utc>, time_format: &str) -> String {
    format!("{}--{}", start.format(time_format), end.format(time_format))
}
