//! Parsing of raw sensor lines into heart-rate readings.
//!
//! All assumptions about the wire format of the sensor live here. The sensor
//! prints one tagged value per line (`BPM: 72`); anything else on the line
//! stream is chatter and is skipped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tag the sensor firmware prefixes every heart-rate line with.
pub const DEFAULT_PREFIX: &str = "BPM: ";

/// One parsed heart-rate sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reading {
    /// Arrival time of the line
    pub timestamp: DateTime<Utc>,
    /// Heart rate in beats per minute
    pub value: i32,
}

/// A tagged line whose payload is not a number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    InvalidNumber { line: String },
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::InvalidNumber { line } => write!(f, "Invalid BPM data: {line}"),
        }
    }
}

impl std::error::Error for ParseError {}

/// Turns raw lines into readings.
#[derive(Debug, Clone)]
pub struct LineParser {
    prefix: String,
}

impl Default for LineParser {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

impl LineParser {
    /// Create a parser for lines tagged with `prefix`.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Parse one line received at `timestamp`.
    ///
    /// Returns `Ok(None)` for lines that carry no reading (blank lines or
    /// lines without the tag), and an error only when the tag is present but
    /// the payload is not an integer.
    pub fn parse(
        &self,
        line: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<Option<Reading>, ParseError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let Some(payload) = line.strip_prefix(self.prefix.as_str()) else {
            return Ok(None);
        };

        payload
            .trim()
            .parse::<i32>()
            .map(|value| Some(Reading { timestamp, value }))
            .map_err(|_| ParseError::InvalidNumber {
                line: line.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Result<Option<i32>, ParseError> {
        LineParser::default()
            .parse(line, Utc::now())
            .map(|r| r.map(|r| r.value))
    }

    #[test]
    fn test_tagged_lines_yield_embedded_value() {
        assert_eq!(parse("BPM: 72"), Ok(Some(72)));
        assert_eq!(parse("BPM: 130\r\n"), Ok(Some(130)));
        assert_eq!(parse("  BPM: 95  "), Ok(Some(95)));
        assert_eq!(parse("BPM: 0"), Ok(Some(0)));
    }

    #[test]
    fn test_untagged_lines_are_ignored() {
        assert_eq!(parse("garbage"), Ok(None));
        assert_eq!(parse(""), Ok(None));
        assert_eq!(parse("   "), Ok(None));
        assert_eq!(parse("Signal lost"), Ok(None));
        assert_eq!(parse("bpm: 80"), Ok(None));
    }

    #[test]
    fn test_bad_payload_is_an_error() {
        assert!(matches!(
            parse("BPM: abc"),
            Err(ParseError::InvalidNumber { .. })
        ));
        assert!(matches!(
            parse("BPM: 72.5"),
            Err(ParseError::InvalidNumber { .. })
        ));
    }

    #[test]
    fn test_bare_tag_is_ignored() {
        // Trimming drops the tag's trailing space, so the prefix no longer matches.
        assert_eq!(parse("BPM:"), Ok(None));
        assert_eq!(parse("BPM:   "), Ok(None));
        assert_eq!(parse("BPM:72"), Ok(None));
    }

    #[test]
    fn test_error_message_contains_line() {
        let err = parse("BPM: ???").unwrap_err();
        assert_eq!(err.to_string(), "Invalid BPM data: BPM: ???");
    }

    #[test]
    fn test_custom_prefix() {
        let parser = LineParser::new("HR=");
        let reading = parser.parse("HR=88", Utc::now()).unwrap().unwrap();
        assert_eq!(reading.value, 88);
        assert_eq!(parser.parse("BPM: 88", Utc::now()), Ok(None));
    }
}
