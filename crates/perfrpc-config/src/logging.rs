//! Telemetry output formats.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// How the daemon renders its `tracing` events on stderr.
///
/// Accepted spellings are `json` and `compact` in any case, from every
/// configuration layer.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// One flattened JSON object per event.
    #[default]
    Json,
    /// Single-line text for interactive use.
    Compact,
}

impl LogFormat {
    /// Returns true when events are machine-readable records.
    ///
    /// Structured output never carries terminal colour codes.
    #[must_use]
    pub const fn is_structured(self) -> bool {
        matches!(self, Self::Json)
    }
}

/// Errors encountered while parsing a [`LogFormat`] from text.
pub type LogFormatParseError = strum::ParseError;

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::lower("json", LogFormat::Json)]
    #[case::upper("COMPACT", LogFormat::Compact)]
    fn parses_case_insensitively(#[case] input: &str, #[case] expected: LogFormat) {
        assert_eq!(input.parse::<LogFormat>().ok(), Some(expected));
    }

    #[test]
    fn only_json_is_structured() {
        assert!(LogFormat::Json.is_structured());
        assert!(!LogFormat::Compact.is_structured());
        assert!("pretty".parse::<LogFormat>().is_err());
    }
}
