// src/timefmt.rs
//! Timestamp encodings shared by the checkpoint document, artifact names,
//! CSV feeds and CLI arguments. Everything is UTC.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer};

/// Compact ISO form written to `last_successful_run`.
pub const COMPACT_ISO: &str = "%Y%m%dT%H%M%SZ";

/// Patterns tried (in order) by [`TimestampFormat::Flexible`] after RFC 3339.
const FLEXIBLE_PATTERNS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    COMPACT_ISO,
    "%Y-%m-%d",
];

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TimestampFormat {
    #[default]
    Rfc3339,
    /// RFC 3339 first, then a handful of common naive layouts (read as UTC).
    /// Formats as RFC 3339.
    Flexible,
    /// A chrono strftime pattern. Date-only patterns parse as midnight UTC.
    Pattern(String),
}

impl TimestampFormat {
    pub fn pattern(p: impl Into<String>) -> Self {
        Self::Pattern(p.into())
    }

    pub fn format(&self, ts: DateTime<Utc>) -> String {
        match self {
            Self::Rfc3339 | Self::Flexible => ts.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            Self::Pattern(p) => ts.format(p).to_string(),
        }
    }

    /// Format `ts`, failing if the text would read back as a different instant
    /// (e.g. a date-only pattern for a non-midnight position).
    pub fn format_exact(&self, ts: DateTime<Utc>) -> Result<String> {
        let text = self.format(ts);
        let back = self
            .parse(&text)
            .with_context(|| format!("{text:?} does not parse back"))?;
        if back != ts {
            return Err(anyhow!(
                "format cannot represent {ts} exactly: {text:?} reads back as {back}"
            ));
        }
        Ok(text)
    }

    pub fn parse(&self, raw: &str) -> Result<DateTime<Utc>> {
        let s = raw.trim();
        match self {
            Self::Rfc3339 => parse_rfc3339(s),
            Self::Pattern(p) => parse_with_pattern(s, p),
            Self::Flexible => parse_rfc3339(s)
                .ok()
                .or_else(|| {
                    FLEXIBLE_PATTERNS
                        .iter()
                        .find_map(|p| parse_with_pattern(s, p).ok())
                })
                .ok_or_else(|| anyhow!("unrecognized timestamp {s:?}")),
        }
    }
}

impl<'de> Deserialize<'de> for TimestampFormat {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.trim().to_ascii_lowercase().as_str() {
            "rfc3339" | "iso8601" => Self::Rfc3339,
            "auto" | "flexible" => Self::Flexible,
            _ => Self::Pattern(raw),
        })
    }
}

fn parse_rfc3339(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("parsing {s:?} as RFC 3339"))
}

fn parse_with_pattern(s: &str, pattern: &str) -> Result<DateTime<Utc>> {
    // Patterns carrying an offset (%z, %:z) keep it.
    if let Ok(dt) = DateTime::parse_from_str(s, pattern) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, pattern) {
        return Ok(naive.and_utc());
    }
    NaiveDate::parse_from_str(s, pattern)
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| anyhow!("timestamp {s:?} does not match pattern {pattern:?}"))
}
