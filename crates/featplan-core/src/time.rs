//! Event-time representation and timestamp formats.
//!
//! Every compiled intermediate table carries a synthetic event-time column
//! named [`EVENT_TIME_COLUMN`], holding epoch milliseconds as `I64`. It is
//! visible to every internal step and stripped only from the table returned
//! to the caller.

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::Scalar;

/// Epoch milliseconds.
pub type EventTime = i64;

/// Name of the internal synthetic event-time column.
pub const EVENT_TIME_COLUMN: &str = "__event_time";

/// How a descriptor's declared timestamp field encodes an instant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimestampFormat {
    /// Numeric seconds since the epoch.
    EpochSeconds,
    /// Numeric milliseconds since the epoch.
    EpochMillis,
    /// Calendar string in a chrono strftime pattern,
    /// e.g. `"%Y-%m-%d %H:%M:%S"`. Interpreted as UTC.
    Pattern(String),
}

impl TimestampFormat {
    /// Decode a timestamp column value into epoch millis.
    pub fn parse_millis(&self, value: &Scalar) -> Result<EventTime> {
        match self {
            TimestampFormat::EpochSeconds => match value.as_f64() {
                Some(secs) => Ok((secs * 1000.0) as i64),
                None => Err(bad_timestamp(value, "epoch seconds")),
            },
            TimestampFormat::EpochMillis => match value.as_i64() {
                Some(ms) => Ok(ms),
                None => Err(bad_timestamp(value, "epoch millis")),
            },
            TimestampFormat::Pattern(pattern) => match value {
                Scalar::Str(s) => {
                    let parsed = NaiveDateTime::parse_from_str(s, pattern).map_err(|e| {
                        Error::Schema(format!(
                            "cannot parse timestamp '{}' with pattern '{}': {}",
                            s, pattern, e
                        ))
                    })?;
                    Ok(parsed.and_utc().timestamp_millis())
                }
                other => Err(bad_timestamp(other, pattern)),
            },
        }
    }

}

/// Format epoch millis as a UTC calendar string.
pub fn format_millis(millis: EventTime, pattern: &str) -> Result<String> {
    let dt = DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| Error::Schema(format!("event time {} out of range", millis)))?;
    Ok(dt.format(pattern).to_string())
}

fn bad_timestamp(value: &Scalar, format: &str) -> Error {
    Error::Schema(format!(
        "timestamp value {:?} does not match format '{}'",
        value, format
    ))
}
